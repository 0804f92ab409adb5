//! Constant/export inlining decisions.
//!
//! The [`Inliner`] decides, per export, whether its value is a compile-time
//! constant that can be substituted at use sites, and produces an
//! [`InlinePlan`] of per-use-site [`Rewrite`]s for code generation. It never
//! mutates the graph.

mod inliner;

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};

use super::{DeclarationKind, InlineValue, ModuleId, UseSiteId};

pub use inliner::Inliner;

/// Why an export cannot be inlined.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum NotInlinable {
    /// Value only known at runtime.
    Opaque,
    /// Reassigned, possibly conditionally, before evaluation completes.
    Mutated,
    /// Some consumer indexes the value with a computed key.
    ComputedAccess,
    /// A consumer exposes the module to direct `eval`.
    EvalAccess,
    /// The consumer-visible exports object is the module's own (CommonJS).
    ExportsIdentityObserved,
    /// The namespace of a side-effecting module escapes.
    NamespaceEscapes,
    /// A destructuring pattern mixes inlinable and live exports of this module
    /// while one of them has `Unknown` usage.
    MixedDestructure,
    /// The name does not resolve to a local binding.
    Unresolvable,
    /// Inlining is switched off.
    Disabled,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum InlineDecision {
    Inlinable(InlineValue),
    NotInlinable(NotInlinable),
}

impl InlineDecision {
    pub fn value(&self) -> Option<&InlineValue> {
        match self {
            Self::Inlinable(value) => Some(value),
            Self::NotInlinable(_) => None,
        }
    }

    pub fn is_inlinable(&self) -> bool {
        matches!(self, Self::Inlinable(_))
    }
}

/// One `local = value` produced from an inlined destructuring pattern.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InlinedBinding {
    pub local: String,
    pub export: String,
    pub value: InlineValue,
}

/// Rewrite instruction for one use site.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Rewrite {
    /// Emit a live reference.
    Keep,
    /// Replace the reference with the literal.
    Inline { export: String, value: InlineValue },
    /// Replace the destructuring declaration with one declarator per binding.
    InlineDestructure {
        declaration: DeclarationKind,
        bindings: Vec<InlinedBinding>,
    },
}

static KEEP: Rewrite = Rewrite::Keep;

/// Output of the inliner for a whole build.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct InlinePlan {
    decisions: BTreeMap<ModuleId, BTreeMap<String, InlineDecision>>,
    rewrites: BTreeMap<ModuleId, BTreeMap<UseSiteId, Rewrite>>,
    fully_inlined: BTreeMap<ModuleId, BTreeSet<String>>,
}

impl InlinePlan {
    /// A plan that keeps every use site live.
    pub fn disabled() -> Self {
        Self::default()
    }

    pub(crate) fn new(
        decisions: BTreeMap<ModuleId, BTreeMap<String, InlineDecision>>,
        rewrites: BTreeMap<ModuleId, BTreeMap<UseSiteId, Rewrite>>,
        fully_inlined: BTreeMap<ModuleId, BTreeSet<String>>,
    ) -> Self {
        Self {
            decisions,
            rewrites,
            fully_inlined,
        }
    }

    /// Decisions for the declared exports of `module`.
    pub fn decisions(&self, module: &ModuleId) -> Option<&BTreeMap<String, InlineDecision>> {
        self.decisions.get(module)
    }

    pub fn decision(&self, module: &ModuleId, export: &str) -> Option<&InlineDecision> {
        self.decisions.get(module)?.get(export)
    }

    /// Rewrite for a use site in `consumer`; `Keep` when none was planned.
    pub fn rewrite(&self, consumer: &ModuleId, site: UseSiteId) -> &Rewrite {
        self.rewrites
            .get(consumer)
            .and_then(|sites| sites.get(&site))
            .unwrap_or(&KEEP)
    }

    /// All planned rewrites in `consumer`, ordered by use site id.
    pub fn rewrites_for(&self, consumer: &ModuleId) -> Option<&BTreeMap<UseSiteId, Rewrite>> {
        self.rewrites.get(consumer)
    }

    /// True when every use of `export` was replaced by its value, so the
    /// export can be left out of the module's getter table.
    pub fn is_fully_inlined(&self, module: &ModuleId, export: &str) -> bool {
        self.fully_inlined
            .get(module)
            .is_some_and(|names| names.contains(export))
    }

    /// Number of use sites rewritten to literals.
    pub fn inlined_site_count(&self) -> usize {
        self.rewrites
            .values()
            .flat_map(|sites| sites.values())
            .filter(|rewrite| !matches!(rewrite, Rewrite::Keep))
            .count()
    }
}
