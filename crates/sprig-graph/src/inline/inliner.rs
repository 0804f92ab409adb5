use std::collections::{BTreeMap, BTreeSet};

use rustc_hash::{FxHashMap as HashMap, FxHashSet as HashSet};
use tracing::debug;

use super::super::{
    EdgeCategory, ExportBinding, ExportResolution, ExportValue, GraphError, ImportedNames, Module,
    ModuleGraph, ModuleId, ModuleIdx, Mutation, Result, UsageMap, UsageState, UseSiteKind,
};
use super::{InlineDecision, InlinePlan, InlinedBinding, NotInlinable, Rewrite};

/// Computes inline decisions and use-site rewrites from a usage map.
pub struct Inliner<'a> {
    graph: &'a ModuleGraph,
    usage: &'a UsageMap,
    enabled: bool,
}

impl<'a> Inliner<'a> {
    pub fn new(graph: &'a ModuleGraph, usage: &'a UsageMap) -> Self {
        Self {
            graph,
            usage,
            enabled: true,
        }
    }

    pub fn enabled(mut self, enabled: bool) -> Self {
        self.enabled = enabled;
        self
    }

    /// Decisions for every declared export of one module.
    pub fn compute_inline_decisions(
        &self,
        module: &ModuleId,
    ) -> Result<BTreeMap<String, InlineDecision>> {
        let idx = self.graph.require_index(module)?;
        let Some(node) = self.graph.module(idx) else {
            return Err(GraphError::UnknownModule(module.to_string()));
        };

        if !self.enabled {
            return Ok(node
                .exports
                .names()
                .map(|name| {
                    (
                        name.to_string(),
                        InlineDecision::NotInlinable(NotInlinable::Disabled),
                    )
                })
                .collect());
        }

        let consumers = self.retained_consumers();
        let mut facts = AccessFacts::collect(self.graph, &consumers);
        facts.settle_destructures(self.graph, self.usage, &consumers);

        Ok(node
            .exports
            .names()
            .map(|name| (name.to_string(), facts.decide(self.graph, idx, name)))
            .collect())
    }

    /// Plan rewrites for every use site in every retained module.
    pub fn plan(&self) -> InlinePlan {
        if !self.enabled {
            return InlinePlan::disabled();
        }

        let consumers = self.retained_consumers();
        let mut facts = AccessFacts::collect(self.graph, &consumers);
        facts.settle_destructures(self.graph, self.usage, &consumers);

        let plan = facts.build_plan(self.graph, self.usage, &consumers);
        debug!(
            inlined_sites = plan.inlined_site_count(),
            "inline plan computed"
        );
        plan
    }

    /// Retained modules in id order.
    fn retained_consumers(&self) -> Vec<(ModuleIdx, &'a Module)> {
        self.graph
            .modules_sorted()
            .into_iter()
            .filter(|(_, module)| self.usage.is_retained(&module.id))
            .collect()
    }
}

/// What consumers do with the modules they import.
#[derive(Default)]
struct AccessFacts {
    eval: HashSet<ModuleIdx>,
    namespace_observed: HashSet<ModuleIdx>,
    /// `(defining module, export)` pairs indexed with a computed key.
    computed: HashSet<(ModuleIdx, String)>,
    blocked: HashMap<ModuleIdx, NotInlinable>,
}

/// Edges whose use sites evaluate to the target's bindings synchronously.
fn rewritable(category: EdgeCategory) -> bool {
    matches!(category, EdgeCategory::Esm | EdgeCategory::CommonJs)
}

impl AccessFacts {
    fn collect(graph: &ModuleGraph, consumers: &[(ModuleIdx, &Module)]) -> Self {
        let mut facts = Self::default();

        for (consumer, _) in consumers {
            for (_, edge) in graph.outgoing_edges(*consumer) {
                let Some(target) = edge.target.module() else {
                    continue;
                };

                let reflective = edge.edge.category == EdgeCategory::Unknown
                    || (edge.edge.category.is_async()
                        && edge.edge.imported == ImportedNames::Namespace);
                if reflective {
                    facts.namespace_observed.insert(target);
                }

                for site in &edge.edge.use_sites {
                    match &site.kind {
                        UseSiteKind::Eval => {
                            facts.eval.insert(target);
                        }
                        UseSiteKind::NamespaceEscape | UseSiteKind::ComputedMember { export: None } => {
                            facts.namespace_observed.insert(target);
                        }
                        UseSiteKind::ComputedMember {
                            export: Some(name),
                        } => {
                            if let ExportResolution::Local { module, export } =
                                graph.resolve_export(target, name)
                            {
                                facts.computed.insert((module, export.name.clone()));
                            }
                        }
                        UseSiteKind::Reference { .. } | UseSiteKind::Destructure { .. } => {}
                    }
                }
            }
        }

        for (idx, module) in graph.modules() {
            let reason = if module.kind.exports_identity_observable() {
                Some(NotInlinable::ExportsIdentityObserved)
            } else if facts.eval.contains(&idx) {
                Some(NotInlinable::EvalAccess)
            } else if facts.namespace_observed.contains(&idx) && module.side_effects.assumed() {
                Some(NotInlinable::NamespaceEscapes)
            } else {
                None
            };
            if let Some(reason) = reason {
                facts.blocked.insert(idx, reason);
            }
        }

        facts
    }

    /// Decision for `name` as imported from `target`.
    fn decide(&self, graph: &ModuleGraph, target: ModuleIdx, name: &str) -> InlineDecision {
        if let Some(reason) = self.blocked.get(&target) {
            return InlineDecision::NotInlinable(*reason);
        }

        let ExportResolution::Local { module, export } = graph.resolve_export(target, name) else {
            return InlineDecision::NotInlinable(NotInlinable::Unresolvable);
        };
        if let Some(reason) = self.blocked.get(&module) {
            return InlineDecision::NotInlinable(*reason);
        }

        let ExportBinding::Local {
            value, mutation, ..
        } = &export.binding
        else {
            return InlineDecision::NotInlinable(NotInlinable::Unresolvable);
        };

        if *mutation != Mutation::None {
            return InlineDecision::NotInlinable(NotInlinable::Mutated);
        }

        match value {
            ExportValue::Opaque => InlineDecision::NotInlinable(NotInlinable::Opaque),
            ExportValue::Literal(_) if self.computed.contains(&(module, export.name.clone())) => {
                InlineDecision::NotInlinable(NotInlinable::ComputedAccess)
            }
            ExportValue::Literal(value) => InlineDecision::Inlinable(value.clone()),
        }
    }

    /// Block every module that is destructured with a mix of inlinable and
    /// live exports where one of the names has `Unknown` usage. Blocking a
    /// module can turn patterns over its re-exporters into mixed ones, so this
    /// runs to a fixpoint.
    fn settle_destructures(
        &mut self,
        graph: &ModuleGraph,
        usage: &UsageMap,
        consumers: &[(ModuleIdx, &Module)],
    ) {
        loop {
            let mut newly_blocked = Vec::new();

            for (consumer, _) in consumers {
                for (_, edge) in graph.outgoing_edges(*consumer) {
                    let Some(target) = edge.target.module() else {
                        continue;
                    };
                    if self.blocked.contains_key(&target) {
                        continue;
                    }
                    let Some(target_module) = graph.module(target) else {
                        continue;
                    };

                    for site in &edge.edge.use_sites {
                        let UseSiteKind::Destructure { properties, .. } = &site.kind else {
                            continue;
                        };
                        let inlinable = properties
                            .iter()
                            .filter(|p| self.decide(graph, target, &p.export).is_inlinable())
                            .count();
                        let mixed = inlinable > 0 && inlinable < properties.len();
                        let unknown = properties.iter().any(|p| {
                            usage.export_state(&target_module.id, &p.export) == UsageState::Unknown
                        });

                        if mixed && unknown {
                            newly_blocked.push(target);
                        }
                    }
                }
            }

            if newly_blocked.is_empty() {
                break;
            }
            for target in newly_blocked {
                self.blocked.insert(target, NotInlinable::MixedDestructure);
            }
        }
    }

    fn build_plan(
        &self,
        graph: &ModuleGraph,
        usage: &UsageMap,
        consumers: &[(ModuleIdx, &Module)],
    ) -> InlinePlan {
        let mut decisions = BTreeMap::new();
        let mut rewrites = BTreeMap::new();
        // (target, export) -> (references, inlined references)
        let mut references: HashMap<(ModuleIdx, String), (usize, usize)> = HashMap::default();

        for (idx, module) in consumers {
            let module_decisions: BTreeMap<String, InlineDecision> = module
                .exports
                .names()
                .map(|name| (name.to_string(), self.decide(graph, *idx, name)))
                .collect();
            decisions.insert(module.id.clone(), module_decisions);

            let mut site_rewrites = BTreeMap::new();
            for (_, edge) in graph.outgoing_edges(*idx) {
                let Some(target) = edge.target.module() else {
                    continue;
                };

                for site in &edge.edge.use_sites {
                    let rewrite = if rewritable(edge.edge.category) {
                        self.rewrite_site(graph, target, &site.kind)
                    } else {
                        Rewrite::Keep
                    };

                    let inlined = !matches!(rewrite, Rewrite::Keep);
                    for export in site.kind.exports() {
                        let counts = references.entry((target, export.to_string())).or_default();
                        counts.0 += 1;
                        if inlined {
                            counts.1 += 1;
                        }
                    }

                    site_rewrites.insert(site.id, rewrite);
                }
            }
            if !site_rewrites.is_empty() {
                rewrites.insert(module.id.clone(), site_rewrites);
            }
        }

        let fully_inlined = self.fully_inlined(graph, usage, consumers, &references);
        InlinePlan::new(decisions, rewrites, fully_inlined)
    }

    fn rewrite_site(&self, graph: &ModuleGraph, target: ModuleIdx, kind: &UseSiteKind) -> Rewrite {
        match kind {
            UseSiteKind::Reference { export } => match self.decide(graph, target, export) {
                InlineDecision::Inlinable(value) => Rewrite::Inline {
                    export: export.clone(),
                    value,
                },
                InlineDecision::NotInlinable(_) => Rewrite::Keep,
            },
            UseSiteKind::Destructure {
                declaration,
                properties,
            } => {
                let mut bindings = Vec::with_capacity(properties.len());
                for property in properties {
                    // One live sibling keeps the whole pattern live at this site.
                    let InlineDecision::Inlinable(value) =
                        self.decide(graph, target, &property.export)
                    else {
                        return Rewrite::Keep;
                    };
                    bindings.push(InlinedBinding {
                        local: property.local.clone(),
                        export: property.export.clone(),
                        value,
                    });
                }
                Rewrite::InlineDestructure {
                    declaration: *declaration,
                    bindings,
                }
            }
            UseSiteKind::ComputedMember { .. }
            | UseSiteKind::Eval
            | UseSiteKind::NamespaceEscape => Rewrite::Keep,
        }
    }

    /// Exports whose every reference was inlined and that nothing else can
    /// observe through a namespace or a re-export.
    fn fully_inlined(
        &self,
        graph: &ModuleGraph,
        usage: &UsageMap,
        consumers: &[(ModuleIdx, &Module)],
        references: &HashMap<(ModuleIdx, String), (usize, usize)>,
    ) -> BTreeMap<ModuleId, BTreeSet<String>> {
        let mut reexported: HashSet<(ModuleIdx, String)> = HashSet::default();
        let mut whole_namespace: HashSet<ModuleIdx> = HashSet::default();

        for (idx, module) in consumers {
            for export in module.exports.iter() {
                match &export.binding {
                    ExportBinding::ReExport {
                        specifier,
                        imported,
                    } => {
                        if let Some(target) = graph.resolve_specifier(*idx, specifier) {
                            reexported.insert((target, imported.clone()));
                        }
                    }
                    ExportBinding::Namespace { specifier } => {
                        if let Some(target) = graph.resolve_specifier(*idx, specifier) {
                            whole_namespace.insert(target);
                        }
                    }
                    ExportBinding::Local { .. } => {}
                }
            }
            for specifier in &module.star_reexports {
                if let Some(target) = graph.resolve_specifier(*idx, specifier) {
                    whole_namespace.insert(target);
                }
            }
        }

        let mut result = BTreeMap::new();
        for (idx, module) in consumers {
            if usage.is_entry(&module.id)
                || whole_namespace.contains(idx)
                || self.namespace_observed.contains(idx)
            {
                continue;
            }

            let names: BTreeSet<String> = module
                .exports
                .names()
                .filter(|name| usage.export_state(&module.id, name) == UsageState::Used)
                .filter(|name| !reexported.contains(&(*idx, name.to_string())))
                .filter(|name| {
                    references
                        .get(&(*idx, name.to_string()))
                        .is_some_and(|(total, inlined)| *total > 0 && total == inlined)
                })
                .map(str::to_string)
                .collect();

            if !names.is_empty() {
                result.insert(module.id.clone(), names);
            }
        }

        result
    }
}
