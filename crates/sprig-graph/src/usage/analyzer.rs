use std::collections::{BTreeMap, VecDeque};

use rustc_hash::{FxHashMap as HashMap, FxHashSet as HashSet};
use tracing::{debug, trace};

use super::super::{
    EdgeCategory, ExportBinding, ExportResolution, ImportedNames, ModuleGraph, ModuleId, ModuleIdx, Result,
};
use super::{ModuleUsage, RetainReason, UsageMap, UsageState};

/// Computes a [`UsageMap`] for a set of entry points.
///
/// The analysis is a single coordinated worklist fixpoint over the whole
/// graph. It borrows the graph immutably, so the graph cannot change while it
/// runs.
pub struct UsageAnalyzer<'g> {
    graph: &'g ModuleGraph,
    tree_shake: bool,
}

impl<'g> UsageAnalyzer<'g> {
    pub fn new(graph: &'g ModuleGraph) -> Self {
        Self {
            graph,
            tree_shake: true,
        }
    }

    /// With tree-shaking disabled every module reachable from an entry is
    /// retained and every export is `Unknown`.
    pub fn tree_shake(mut self, enabled: bool) -> Self {
        self.tree_shake = enabled;
        self
    }

    /// Run the analysis.
    ///
    /// Fails if an entry is not in the graph or if the graph has dangling
    /// edges. "Cannot tell statically" is never an error; it shows up as
    /// `Unknown` in the result.
    pub fn analyze(&self, entries: &[ModuleId]) -> Result<UsageMap> {
        self.graph.validate()?;

        let mut entry_ids: Vec<ModuleId> = entries.to_vec();
        entry_ids.sort();
        entry_ids.dedup();

        let entry_indices = entry_ids
            .iter()
            .map(|id| self.graph.require_index(id))
            .collect::<Result<Vec<_>>>()?;

        let mut propagation = Propagation::new(self.graph);
        if self.tree_shake {
            propagation.run(&entry_indices);
        } else {
            propagation.retain_reachable(&entry_indices);
        }

        let map = propagation.finish(&entry_indices, entry_ids, self.tree_shake);
        debug!(
            modules = map.len(),
            retained = map.retained_modules().count(),
            tree_shake = self.tree_shake,
            "usage analysis complete"
        );
        Ok(map)
    }
}

enum Work {
    Visit(ModuleIdx),
    Mark(ModuleIdx, String, UsageState),
    MarkAll(ModuleIdx, UsageState),
}

#[derive(Default)]
struct ModuleState {
    active: bool,
    visited: bool,
    critical: bool,
    namespace: UsageState,
    exports: HashMap<String, UsageState>,
}

struct Propagation<'g> {
    graph: &'g ModuleGraph,
    states: HashMap<ModuleIdx, ModuleState>,
    queue: VecDeque<Work>,
}

impl<'g> Propagation<'g> {
    fn new(graph: &'g ModuleGraph) -> Self {
        Self {
            graph,
            states: HashMap::default(),
            queue: VecDeque::new(),
        }
    }

    fn run(&mut self, entries: &[ModuleIdx]) {
        for entry in entries {
            self.activate(*entry);
            self.queue.push_back(Work::MarkAll(*entry, UsageState::Used));
        }

        while let Some(work) = self.queue.pop_front() {
            match work {
                Work::Visit(module) => self.visit(module),
                Work::Mark(module, name, state) => self.mark(module, &name, state),
                Work::MarkAll(module, state) => self.mark_all(module, state),
            }
        }
    }

    fn retain_reachable(&mut self, entries: &[ModuleIdx]) {
        for idx in self.graph.reachable_from(entries) {
            let state = self.states.entry(idx).or_default();
            state.active = true;
            state.visited = true;
            state.namespace = UsageState::Unknown;
        }
    }

    /// A module becomes active once something requires it in the output. Its
    /// outgoing edges are only examined after that.
    fn activate(&mut self, module: ModuleIdx) {
        let state = self.states.entry(module).or_default();
        if !state.active {
            state.active = true;
            self.queue.push_back(Work::Visit(module));
        }
    }

    fn visit(&mut self, idx: ModuleIdx) {
        {
            let state = self.states.entry(idx).or_default();
            if state.visited {
                return;
            }
            state.visited = true;
        }
        trace!(module = idx.index(), "visiting module");

        let graph = self.graph;
        for (_, edge) in graph.outgoing_edges(idx) {
            let Some(target) = edge.target.module() else {
                continue;
            };
            let Some(target_module) = graph.module(target) else {
                continue;
            };

            if target_module.side_effects.assumed() {
                self.activate(target);
            }
            if edge.edge.critical {
                self.states.entry(target).or_default().critical = true;
                self.activate(target);
            }

            if edge.edge.category == EdgeCategory::Unknown {
                self.queue.push_back(Work::MarkAll(target, UsageState::Unknown));
                continue;
            }

            match &edge.edge.imported {
                ImportedNames::Named(bindings) => {
                    for binding in bindings {
                        self.queue.push_back(Work::Mark(
                            target,
                            binding.imported.clone(),
                            UsageState::Used,
                        ));
                    }
                }
                ImportedNames::Namespace => {
                    let precise = !edge.edge.category.is_async()
                        && edge.edge.use_sites.iter().all(|site| site.kind.is_static());

                    if precise {
                        for site in &edge.edge.use_sites {
                            for export in site.kind.exports() {
                                self.queue.push_back(Work::Mark(
                                    target,
                                    export.to_string(),
                                    UsageState::Used,
                                ));
                            }
                        }
                    } else {
                        self.queue.push_back(Work::MarkAll(target, UsageState::Unknown));
                    }
                }
                // Re-exported names flow through the export bindings when
                // the re-exporting module's own exports get marked.
                ImportedNames::SideEffectOnly | ImportedNames::ReExport => {}
            }
        }
    }

    fn mark(&mut self, idx: ModuleIdx, name: &str, state: UsageState) {
        {
            let module_state = self.states.entry(idx).or_default();
            let slot = module_state.exports.entry(name.to_string()).or_default();
            if *slot >= state {
                return;
            }
            *slot = state;
        }
        self.activate(idx);

        let graph = self.graph;
        let Some(module) = graph.module(idx) else {
            return;
        };

        match module.exports.get(name).map(|export| &export.binding) {
            Some(ExportBinding::Local { .. }) => {}
            Some(ExportBinding::ReExport {
                specifier,
                imported,
            }) => {
                if let Some(target) = graph.resolve_specifier(idx, specifier) {
                    self.queue
                        .push_back(Work::Mark(target, imported.clone(), state));
                }
            }
            Some(ExportBinding::Namespace { specifier }) => {
                // The namespace object is handed out as a value.
                if let Some(target) = graph.resolve_specifier(idx, specifier) {
                    self.queue
                        .push_back(Work::MarkAll(target, UsageState::Unknown));
                }
            }
            None if name != "default" => {
                // Only star targets that can provide the name; unknown
                // answers are forwarded as well.
                for specifier in &module.star_reexports {
                    let Some(target) = graph.resolve_specifier(idx, specifier) else {
                        continue;
                    };
                    if !matches!(
                        graph.resolve_export(target, name),
                        ExportResolution::Missing { .. }
                    ) {
                        self.queue
                            .push_back(Work::Mark(target, name.to_string(), state));
                    }
                }
            }
            None => {}
        }
    }

    fn mark_all(&mut self, idx: ModuleIdx, state: UsageState) {
        {
            let module_state = self.states.entry(idx).or_default();
            if module_state.namespace >= state {
                return;
            }
            module_state.namespace = state;
        }
        self.activate(idx);

        let graph = self.graph;
        let Some(module) = graph.module(idx) else {
            return;
        };

        for export in module.exports.iter() {
            self.queue
                .push_back(Work::Mark(idx, export.name.clone(), state));
        }
        for specifier in &module.star_reexports {
            if let Some(target) = graph.resolve_specifier(idx, specifier) {
                self.queue.push_back(Work::MarkAll(target, state));
            }
        }
    }

    fn finish(self, entries: &[ModuleIdx], entry_ids: Vec<ModuleId>, tree_shaken: bool) -> UsageMap {
        let entry_set: HashSet<ModuleIdx> = entries.iter().copied().collect();
        let mut modules = BTreeMap::new();

        for (idx, module) in self.graph.modules() {
            let state = self.states.get(&idx);
            let retained = state.is_some_and(|state| state.visited);
            let namespace = state.map_or(UsageState::Unused, |state| state.namespace);
            // Includes names forwarded through `export *` that are not declared here.
            let marked_live =
                state.is_some_and(|state| state.exports.values().any(|state| state.is_live()));

            let exports: BTreeMap<String, UsageState> = module
                .exports
                .iter()
                .map(|export| {
                    let marked = state
                        .and_then(|state| state.exports.get(&export.name))
                        .copied()
                        .unwrap_or_default();
                    let effective = if retained {
                        marked.merge(namespace)
                    } else {
                        UsageState::Unused
                    };
                    (export.name.clone(), effective)
                })
                .collect();

            let reason = if !retained {
                None
            } else if entry_set.contains(&idx) {
                Some(RetainReason::Entry)
            } else if namespace.is_live() || marked_live {
                Some(RetainReason::UsedExports)
            } else if state.is_some_and(|state| state.critical) && !module.side_effects.assumed() {
                Some(RetainReason::Critical)
            } else {
                Some(RetainReason::SideEffects)
            };

            modules.insert(
                module.id.clone(),
                ModuleUsage {
                    retained,
                    reason,
                    exports,
                    namespace: if retained { namespace } else { UsageState::Unused },
                    exports_unknown: retained && !module.exports.is_finalized(),
                },
            );
        }

        UsageMap::new(modules, entry_ids, tree_shaken)
    }
}
