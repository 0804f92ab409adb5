//! Structural integrity checks.

use super::super::{EdgeTarget, GraphError, Result};
use super::ModuleGraph;

impl ModuleGraph {
    /// Check that no live edge references a destroyed module and that the
    /// adjacency lists agree with the edge arena.
    ///
    /// Usage analysis refuses to run on a graph that fails this check.
    pub fn validate(&self) -> Result<()> {
        for (edge_idx, slot) in self.edges.iter_enumerated() {
            let Some(edge) = slot else { continue };

            let Some(owner) = self.module(edge.from) else {
                return Err(GraphError::GraphIntegrity(format!(
                    "edge #{} ('{}') is owned by a removed module",
                    edge_idx.index(),
                    edge.edge.specifier
                )));
            };
            if !owner.outgoing.contains(&edge_idx) {
                return Err(GraphError::GraphIntegrity(format!(
                    "edge #{} ('{}') is missing from the outgoing list of {}",
                    edge_idx.index(),
                    edge.edge.specifier,
                    owner.id
                )));
            }

            if let EdgeTarget::Resolved(target) = edge.target {
                let Some(target) = self.module(target) else {
                    return Err(GraphError::GraphIntegrity(format!(
                        "dangling edge '{}' from {} points at a removed module",
                        edge.edge.specifier, owner.id
                    )));
                };
                if !target.incoming.contains(&edge_idx) {
                    return Err(GraphError::GraphIntegrity(format!(
                        "edge '{}' from {} is missing from the incoming list of {}",
                        edge.edge.specifier, owner.id, target.id
                    )));
                }
            }
        }

        for (idx, module) in self.modules() {
            if self.index_of(&module.id) != Some(idx) {
                return Err(GraphError::GraphIntegrity(format!(
                    "id index out of sync for {}",
                    module.id
                )));
            }
            for edge in module.outgoing.iter().chain(&module.incoming) {
                if self.edge(*edge).is_none() {
                    return Err(GraphError::GraphIntegrity(format!(
                        "{} references removed edge #{}",
                        module.id,
                        edge.index()
                    )));
                }
            }
        }

        Ok(())
    }
}
