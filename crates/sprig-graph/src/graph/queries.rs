//! Read-only queries over ModuleGraph.

use rustc_hash::FxHashSet as HashSet;

use super::super::{
    EdgeTarget, ExportsState, GraphEdge, GraphError, ImportedNames, Module, ModuleId, Result,
};
use super::{EdgeIdx, ModuleGraph, ModuleIdx};

impl ModuleGraph {
    /// Look up a live module.
    pub fn module(&self, idx: ModuleIdx) -> Option<&Module> {
        self.modules.get(idx).and_then(Option::as_ref)
    }

    pub(crate) fn module_ref(&self, idx: ModuleIdx) -> Result<&Module> {
        self.module(idx)
            .ok_or_else(|| GraphError::UnknownModule(format!("#{}", idx.index())))
    }

    pub(crate) fn module_mut(&mut self, idx: ModuleIdx) -> Result<&mut Module> {
        self.modules
            .get_mut(idx)
            .and_then(Option::as_mut)
            .ok_or_else(|| GraphError::UnknownModule(format!("#{}", idx.index())))
    }

    /// Index of the module with the given id.
    pub fn index_of(&self, id: &ModuleId) -> Option<ModuleIdx> {
        self.ids.get(id).copied()
    }

    /// Index of the module with the given id, or `UnknownModule`.
    pub fn require_index(&self, id: &ModuleId) -> Result<ModuleIdx> {
        self.index_of(id)
            .ok_or_else(|| GraphError::UnknownModule(id.to_string()))
    }

    pub fn module_by_id(&self, id: &ModuleId) -> Option<&Module> {
        self.index_of(id).and_then(|idx| self.module(idx))
    }

    pub fn contains(&self, id: &ModuleId) -> bool {
        self.ids.contains_key(id)
    }

    /// Exports of a module, or `NotYetResolved` while its content is pending.
    pub fn get_exports(&self, id: &ModuleId) -> Result<ExportsState<'_>> {
        let module = self
            .module_by_id(id)
            .ok_or_else(|| GraphError::UnknownModule(id.to_string()))?;

        if module.exports.is_finalized() {
            Ok(ExportsState::Resolved(&module.exports))
        } else {
            Ok(ExportsState::NotYetResolved)
        }
    }

    pub fn edge(&self, idx: EdgeIdx) -> Option<&GraphEdge> {
        self.edges.get(idx).and_then(Option::as_ref)
    }

    /// Live modules in arena order.
    pub fn modules(&self) -> impl Iterator<Item = (ModuleIdx, &Module)> {
        self.modules
            .iter_enumerated()
            .filter_map(|(idx, slot)| slot.as_ref().map(|module| (idx, module)))
    }

    /// Live modules ordered by id, independent of insertion order.
    pub fn modules_sorted(&self) -> Vec<(ModuleIdx, &Module)> {
        let mut modules: Vec<_> = self.modules().collect();
        modules.sort_by(|a, b| a.1.id.cmp(&b.1.id));
        modules
    }

    /// Outgoing edges of a module in declaration order.
    pub fn outgoing_edges(&self, idx: ModuleIdx) -> impl Iterator<Item = (EdgeIdx, &GraphEdge)> {
        self.module(idx)
            .map(|module| module.outgoing.as_slice())
            .unwrap_or_default()
            .iter()
            .filter_map(|edge_idx| self.edge(*edge_idx).map(|edge| (*edge_idx, edge)))
    }

    pub fn incoming_edges(&self, idx: ModuleIdx) -> impl Iterator<Item = (EdgeIdx, &GraphEdge)> {
        self.module(idx)
            .map(|module| module.incoming.as_slice())
            .unwrap_or_default()
            .iter()
            .filter_map(|edge_idx| self.edge(*edge_idx).map(|edge| (*edge_idx, edge)))
    }

    /// Distinct resolved targets of a module, in first-seen order.
    pub fn dependencies(&self, idx: ModuleIdx) -> Vec<ModuleIdx> {
        let mut seen = HashSet::default();
        self.outgoing_edges(idx)
            .filter_map(|(_, edge)| edge.target.module())
            .filter(|target| seen.insert(*target))
            .collect()
    }

    /// Distinct modules with an edge onto `idx`, in first-seen order.
    pub fn dependents(&self, idx: ModuleIdx) -> Vec<ModuleIdx> {
        let mut seen = HashSet::default();
        self.incoming_edges(idx)
            .map(|(_, edge)| edge.from)
            .filter(|from| seen.insert(*from))
            .collect()
    }

    /// Resolved target of the first edge in `from` that requests `specifier`.
    pub fn resolve_specifier(&self, from: ModuleIdx, specifier: &str) -> Option<ModuleIdx> {
        self.outgoing_edges(from)
            .find(|(_, edge)| edge.edge.specifier == specifier)
            .and_then(|(_, edge)| edge.target.module())
    }

    /// The `export ... from` edge of `from` that requests `specifier`.
    pub fn reexport_edge(&self, from: ModuleIdx, specifier: &str) -> Option<(EdgeIdx, &GraphEdge)> {
        self.outgoing_edges(from).find(|(_, edge)| {
            edge.edge.specifier == specifier && edge.edge.imported == ImportedNames::ReExport
        })
    }

    /// Edges whose target could not be resolved.
    pub fn unresolved_edges(&self) -> impl Iterator<Item = (EdgeIdx, &GraphEdge)> {
        self.edges.iter_enumerated().filter_map(|(idx, slot)| {
            slot.as_ref()
                .filter(|edge| edge.target == EdgeTarget::Unresolved)
                .map(|edge| (idx, edge))
        })
    }
}
