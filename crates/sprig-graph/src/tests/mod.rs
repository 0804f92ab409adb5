mod inline_tests;
mod usage_tests;

use crate::{
    ModuleContent, ModuleGraph, ModuleId, ModuleIdx, StaticResolver, UsageAnalyzer, UsageMap,
};

pub(crate) fn id(raw: &str) -> ModuleId {
    ModuleId::new(raw).unwrap()
}

/// Small harness that loads modules into a graph by path.
pub(crate) struct Fixture {
    pub graph: ModuleGraph,
    resolver: StaticResolver,
}

impl Fixture {
    /// All paths that will be loaded must be known up front so the resolver
    /// can find them.
    pub fn new(paths: &[&str]) -> Self {
        Self {
            graph: ModuleGraph::new(),
            resolver: StaticResolver::new().with_modules(paths.iter().map(|p| id(p))),
        }
    }

    pub fn load(&mut self, path: &str, content: ModuleContent) -> ModuleIdx {
        let idx = self.graph.add_module(id(path));
        let outcomes = self
            .graph
            .set_module_content(idx, content, &self.resolver)
            .unwrap();
        for outcome in outcomes {
            assert!(
                outcome.resolution_error.is_none(),
                "fixture edge failed to resolve: {:?}",
                outcome.resolution_error
            );
        }
        idx
    }

    pub fn usage(&self, entries: &[&str]) -> UsageMap {
        let entries: Vec<ModuleId> = entries.iter().map(|p| id(p)).collect();
        UsageAnalyzer::new(&self.graph).analyze(&entries).unwrap()
    }
}
