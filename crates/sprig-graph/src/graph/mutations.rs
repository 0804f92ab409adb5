//! Mutation methods for ModuleGraph.

use rustc_hash::FxHashSet as HashSet;
use tracing::debug;

use super::super::{EdgeTarget, GraphError, ModuleId, ModuleStatus, Result};
use super::{EdgeIdx, ModuleGraph, ModuleIdx};

impl ModuleGraph {
    /// Reset a module to `Pending`: its exports are cleared and unfinalized
    /// and its outgoing edges are dropped. Incoming edges stay in place.
    pub fn invalidate_module(&mut self, idx: ModuleIdx) -> Result<()> {
        let outgoing = {
            let module = self.module_mut(idx)?;
            module.exports.reset();
            module.star_reexports.clear();
            module.status = ModuleStatus::Pending;
            std::mem::take(&mut module.outgoing)
        };

        for edge in outgoing {
            self.detach_edge(edge);
        }

        Ok(())
    }

    /// Remove a module and its outgoing edges.
    ///
    /// Fails with [`GraphError::HasIncomingEdges`] while another module still
    /// points at it; prune those edges (or their owners) first.
    pub fn remove_module(&mut self, idx: ModuleIdx) -> Result<ModuleId> {
        let module = self.module_ref(idx)?;
        let foreign_incoming = module
            .incoming
            .iter()
            .filter_map(|edge| self.edge(*edge))
            .filter(|edge| edge.from != idx)
            .count();

        if foreign_incoming > 0 {
            return Err(GraphError::HasIncomingEdges {
                module: module.id.clone(),
                count: foreign_incoming,
            });
        }

        Ok(self.remove_unchecked(idx))
    }

    fn remove_unchecked(&mut self, idx: ModuleIdx) -> ModuleId {
        let Some(module) = self.modules.get_mut(idx).and_then(Option::take) else {
            unreachable!("remove_unchecked called on a tombstone")
        };

        for edge in module.outgoing {
            self.detach_edge(edge);
        }
        // Self edges were already detached above.
        for edge_idx in module.incoming {
            let Some(edge) = self.edges.get_mut(edge_idx).and_then(Option::take) else {
                continue;
            };
            if let Ok(owner) = self.module_mut(edge.from) {
                owner.outgoing.retain(|outgoing| *outgoing != edge_idx);
            }
        }

        self.ids.remove(&module.id);
        module.id
    }

    /// Drop an edge and unlink it from its target's incoming list.
    fn detach_edge(&mut self, idx: EdgeIdx) {
        let Some(edge) = self.edges.get_mut(idx).and_then(Option::take) else {
            return;
        };

        if let EdgeTarget::Resolved(target) = edge.target {
            if let Ok(target) = self.module_mut(target) {
                target.incoming.retain(|incoming| *incoming != idx);
            }
        }
    }

    /// Destroy every module not reachable from `entries` through any edge.
    ///
    /// Returns the removed ids in sorted order. Afterwards no live edge points
    /// at a removed module.
    pub fn prune_unreachable(&mut self, entries: &[ModuleIdx]) -> Vec<ModuleId> {
        let reachable: HashSet<ModuleIdx> = self.reachable_from(entries).into_iter().collect();
        let doomed: Vec<ModuleIdx> = self
            .modules()
            .map(|(idx, _)| idx)
            .filter(|idx| !reachable.contains(idx))
            .collect();

        // Edges out of doomed modules go first so the remaining incoming
        // lists only reference reachable owners.
        for idx in &doomed {
            let outgoing = self
                .module_mut(*idx)
                .map(|module| std::mem::take(&mut module.outgoing))
                .unwrap_or_default();
            for edge in outgoing {
                self.detach_edge(edge);
            }
        }

        let mut removed: Vec<ModuleId> = doomed
            .into_iter()
            .map(|idx| self.remove_unchecked(idx))
            .collect();
        removed.sort();

        if !removed.is_empty() {
            debug!(count = removed.len(), "pruned unreachable modules");
        }

        removed
    }
}
