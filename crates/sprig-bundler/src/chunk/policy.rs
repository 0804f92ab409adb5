//! Pluggable split-chunks policies.

use std::collections::{BTreeMap, BTreeSet};

use sprig_config::{SplitChunksOptions, SplitPolicyKind};
use sprig_graph::ModuleId;

use super::ChunkKind;

/// A chunk before it gets an id: the unit split policies operate on.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChunkGroup {
    pub name: String,
    pub kind: ChunkKind,
    pub roots: Vec<ModuleId>,
    pub modules: BTreeSet<ModuleId>,
}

impl ChunkGroup {
    pub fn new(
        name: impl Into<String>,
        kind: ChunkKind,
        roots: Vec<ModuleId>,
        modules: BTreeSet<ModuleId>,
    ) -> Self {
        Self {
            name: name.into(),
            kind,
            roots,
            modules,
        }
    }
}

/// Decides how the modules of async chunk groups are distributed.
///
/// A policy receives every group (entry groups first, then async groups
/// sorted by root) and returns the final groups. It may move modules
/// between non-entry groups and add new ones, but must not touch entry
/// groups and must be deterministic: same input, same output.
pub trait SplitPolicy: Send + Sync {
    fn name(&self) -> &str;

    /// Changes whenever the policy's parameters or algorithm change. Mixed
    /// into chunk etags.
    fn version(&self) -> String;

    fn split(&self, groups: Vec<ChunkGroup>) -> Vec<ChunkGroup>;
}

/// One async chunk per dynamic import target. Modules needed by several
/// targets are duplicated into each of their chunks.
#[derive(Debug, Default, Clone, Copy)]
pub struct PerDynamicImport;

impl SplitPolicy for PerDynamicImport {
    fn name(&self) -> &str {
        "per-dynamic-import"
    }

    fn version(&self) -> String {
        format!("{}@1", self.name())
    }

    fn split(&self, groups: Vec<ChunkGroup>) -> Vec<ChunkGroup> {
        groups
    }
}

/// Modules that appear in at least `min_chunks` async groups move into a
/// single `shared` chunk.
#[derive(Debug, Clone, Copy)]
pub struct ShareCommonModules {
    pub min_chunks: usize,
}

impl ShareCommonModules {
    pub const SHARED_CHUNK_NAME: &'static str = "shared";

    pub fn new(min_chunks: usize) -> Self {
        Self { min_chunks }
    }
}

impl SplitPolicy for ShareCommonModules {
    fn name(&self) -> &str {
        "share-common-modules"
    }

    fn version(&self) -> String {
        format!("{}:{}@1", self.name(), self.min_chunks)
    }

    fn split(&self, groups: Vec<ChunkGroup>) -> Vec<ChunkGroup> {
        let mut counts: BTreeMap<&ModuleId, usize> = BTreeMap::new();
        for group in groups.iter().filter(|group| group.kind == ChunkKind::Async) {
            for module in &group.modules {
                *counts.entry(module).or_default() += 1;
            }
        }

        let shared: BTreeSet<ModuleId> = counts
            .into_iter()
            .filter(|(_, count)| *count >= self.min_chunks.max(2))
            .map(|(module, _)| module.clone())
            .collect();

        if shared.is_empty() {
            return groups;
        }

        let mut result: Vec<ChunkGroup> = groups
            .into_iter()
            .map(|mut group| {
                if group.kind == ChunkKind::Async {
                    group.modules.retain(|module| !shared.contains(module));
                }
                group
            })
            .filter(|group| !group.modules.is_empty())
            .collect();

        tracing::debug!(modules = shared.len(), "extracted shared chunk");
        result.push(ChunkGroup::new(
            Self::SHARED_CHUNK_NAME,
            ChunkKind::Shared,
            Vec::new(),
            shared,
        ));
        result
    }
}

/// Policy selected by the bundle configuration.
pub fn policy_from_options(options: &SplitChunksOptions) -> Box<dyn SplitPolicy> {
    match options.policy {
        SplitPolicyKind::PerDynamicImport => Box::new(PerDynamicImport),
        SplitPolicyKind::ShareCommonModules => Box::new(ShareCommonModules::new(options.min_chunks)),
    }
}
