//! Arena-backed module graph.
//!
//! Modules and edges live in index vectors and are addressed by
//! [`ModuleIdx`]/[`EdgeIdx`]. Removing a module leaves a tombstone so indices
//! handed out earlier never alias a different module. Methods are grouped by
//! concern across the sibling files.

mod construction;
mod exports;
mod mutations;
mod queries;
mod traversal;
mod validation;

use oxc_index::IndexVec;
use rustc_hash::FxHashMap as HashMap;

use super::{GraphEdge, Module, ModuleId};

pub use construction::EdgeOutcome;
pub use exports::ExportResolution;

oxc_index::define_index_type! {
    pub struct ModuleIdx = u32;
}

oxc_index::define_index_type! {
    pub struct EdgeIdx = u32;
}

/// The module dependency graph.
///
/// Mutation takes `&mut self` and analysis takes `&self`, so the
/// resolve/update phase and the analysis/generation phases cannot overlap.
/// Cycles are representable; every traversal keeps a visited set.
#[derive(Debug, Clone, Default)]
pub struct ModuleGraph {
    modules: IndexVec<ModuleIdx, Option<Module>>,
    edges: IndexVec<EdgeIdx, Option<GraphEdge>>,
    ids: HashMap<ModuleId, ModuleIdx>,
}

impl ModuleGraph {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of live modules.
    pub fn module_count(&self) -> usize {
        self.ids.len()
    }

    /// Number of live edges.
    pub fn edge_count(&self) -> usize {
        self.edges.iter().filter(|edge| edge.is_some()).count()
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }
}
