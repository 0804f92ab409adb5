//! Cycle-tolerant traversals.

use std::collections::VecDeque;

use rustc_hash::FxHashSet as HashSet;

use super::super::GraphEdge;
use super::{ModuleGraph, ModuleIdx};

impl ModuleGraph {
    /// Every module reachable from `roots` through resolved edges, in
    /// breadth-first discovery order (roots first).
    pub fn reachable_from(&self, roots: &[ModuleIdx]) -> Vec<ModuleIdx> {
        self.reachable_via(roots, |_| true)
    }

    /// Breadth-first reachability following only edges accepted by `follow`.
    pub fn reachable_via<F>(&self, roots: &[ModuleIdx], follow: F) -> Vec<ModuleIdx>
    where
        F: Fn(&GraphEdge) -> bool,
    {
        let mut visited = HashSet::default();
        let mut order = Vec::new();
        let mut queue = VecDeque::new();

        for root in roots {
            if self.module(*root).is_some() && visited.insert(*root) {
                queue.push_back(*root);
            }
        }

        while let Some(idx) = queue.pop_front() {
            order.push(idx);
            for (_, edge) in self.outgoing_edges(idx) {
                if !follow(edge) {
                    continue;
                }
                if let Some(target) = edge.target.module() {
                    if visited.insert(target) {
                        queue.push_back(target);
                    }
                }
            }
        }

        order
    }
}

#[cfg(test)]
mod tests {
    use super::super::super::{DependencyEdge, EdgeCategory, ModuleId, StaticResolver};
    use super::*;

    fn id(raw: &str) -> ModuleId {
        ModuleId::new(raw).unwrap()
    }

    #[test]
    fn filtered_reachability_skips_async_edges() {
        let mut graph = ModuleGraph::new();
        let resolver = StaticResolver::new()
            .with_module(id("/sync.js"))
            .with_module(id("/lazy.js"));
        let entry = graph.add_module(id("/entry.js"));
        graph.add_edge(entry, DependencyEdge::side_effect("./sync"), &resolver).unwrap();
        graph.add_edge(entry, DependencyEdge::dynamic("./lazy"), &resolver).unwrap();

        let sync_only = graph.reachable_via(&[entry], |edge| edge.edge.category != EdgeCategory::Dynamic);
        assert_eq!(sync_only.len(), 2);
        assert_eq!(graph.reachable_from(&[entry]).len(), 3);
    }
}
