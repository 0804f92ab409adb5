//! Export usage analysis (tree-shaking).
//!
//! [`UsageAnalyzer`] walks the graph from the entry points and produces a
//! [`UsageMap`]: for every module whether it is retained in the output and,
//! per export, a [`UsageState`].
//!
//! States form the lattice `Unused < Used < Unknown` and only ever move up,
//! so adding entry points can never downgrade an export.

mod analyzer;

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use super::ModuleId;

pub use analyzer::UsageAnalyzer;

/// Usage classification of one export.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
pub enum UsageState {
    #[default]
    Unused,
    Used,
    /// Reached through reflective or dynamic access; treated as used.
    Unknown,
}

impl UsageState {
    /// Anything but `Unused` must be kept.
    pub fn is_live(self) -> bool {
        !matches!(self, Self::Unused)
    }

    /// Least upper bound.
    pub fn merge(self, other: Self) -> Self {
        self.max(other)
    }
}

/// Why a module is part of the output.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum RetainReason {
    Entry,
    UsedExports,
    SideEffects,
    Critical,
}

/// Usage facts for one module.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModuleUsage {
    pub retained: bool,
    pub reason: Option<RetainReason>,
    /// State of every declared export.
    pub exports: BTreeMap<String, UsageState>,
    /// Floor applied to every name, including ones forwarded through
    /// `export *`. Raised when the namespace object itself is consumed.
    pub namespace: UsageState,
    /// The module's exports were never finalized, so nothing about them is
    /// known statically.
    pub exports_unknown: bool,
}

impl ModuleUsage {
    /// State of `name` on this module.
    pub fn state(&self, name: &str) -> UsageState {
        if !self.retained {
            return UsageState::Unused;
        }
        if self.exports_unknown {
            return UsageState::Unknown;
        }
        self.exports
            .get(name)
            .copied()
            .unwrap_or_default()
            .merge(self.namespace)
    }

    /// Names of declared exports that must be kept, in sorted order.
    pub fn live_exports(&self) -> impl Iterator<Item = &str> {
        self.exports
            .iter()
            .filter(|(_, state)| state.is_live())
            .map(|(name, _)| name.as_str())
    }
}

/// Result of one usage analysis pass.
///
/// Keys are ordered by module id so the map serializes identically for
/// identical inputs.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UsageMap {
    modules: BTreeMap<ModuleId, ModuleUsage>,
    entries: Vec<ModuleId>,
    tree_shaken: bool,
}

impl UsageMap {
    pub(crate) fn new(
        modules: BTreeMap<ModuleId, ModuleUsage>,
        entries: Vec<ModuleId>,
        tree_shaken: bool,
    ) -> Self {
        Self {
            modules,
            entries,
            tree_shaken,
        }
    }

    pub fn get(&self, id: &ModuleId) -> Option<&ModuleUsage> {
        self.modules.get(id)
    }

    pub fn is_retained(&self, id: &ModuleId) -> bool {
        self.modules.get(id).is_some_and(|usage| usage.retained)
    }

    /// State of an export; modules outside the map are `Unused`.
    pub fn export_state(&self, id: &ModuleId, name: &str) -> UsageState {
        self.modules
            .get(id)
            .map_or(UsageState::Unused, |usage| usage.state(name))
    }

    pub fn is_entry(&self, id: &ModuleId) -> bool {
        self.entries.contains(id)
    }

    /// Entry modules, sorted.
    pub fn entries(&self) -> &[ModuleId] {
        &self.entries
    }

    /// False when the map was produced with tree-shaking disabled.
    pub fn is_tree_shaken(&self) -> bool {
        self.tree_shaken
    }

    /// Retained modules in id order.
    pub fn retained_modules(&self) -> impl Iterator<Item = &ModuleId> {
        self.modules
            .iter()
            .filter(|(_, usage)| usage.retained)
            .map(|(id, _)| id)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&ModuleId, &ModuleUsage)> {
        self.modules.iter()
    }

    pub fn len(&self) -> usize {
        self.modules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.modules.is_empty()
    }
}
