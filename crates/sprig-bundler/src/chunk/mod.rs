//! Chunk assembly.
//!
//! Groups retained modules into output chunks: one per named entry, one per
//! dynamically imported root that is not already available where it is
//! imported, and whatever extra groups the [`SplitPolicy`] carves out.
//!
//! Chunk ids are content-derived (name plus sorted module ids), never
//! counters, so identical graphs produce identical ids regardless of the
//! order modules were discovered in.

mod assembler;
mod policy;

pub use assembler::{ChunkAssembler, Conflict};
pub use policy::{ChunkGroup, PerDynamicImport, ShareCommonModules, SplitPolicy, policy_from_options};

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use serde::{Deserialize, Serialize};
use sprig_graph::{GraphError, ModuleId};

use crate::codegen::RuntimeFeature;

/// Deterministic chunk identifier.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ChunkId(String);

impl ChunkId {
    /// First 16 hex chars of BLAKE3 over the name and the sorted module ids.
    pub fn derive<'a>(name: &str, modules: impl IntoIterator<Item = &'a ModuleId>) -> Self {
        let sorted: BTreeSet<&ModuleId> = modules.into_iter().collect();
        let mut hasher = blake3::Hasher::new();
        hasher.update(name.as_bytes());
        hasher.update(&[0]);
        for id in sorted {
            hasher.update(id.as_str().as_bytes());
            hasher.update(&[0]);
        }
        let hex = hasher.finalize().to_hex();
        Self(hex.as_str()[..16].to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ChunkId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChunkKind {
    /// Loaded by the host page; carries the runtime.
    Entry,
    /// Loaded on demand by a dynamic import.
    Async,
    /// Modules extracted from several async chunks by the split policy.
    Shared,
}

/// One output unit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Chunk {
    pub id: ChunkId,
    pub name: String,
    pub kind: ChunkKind,
    /// Sorted by module id.
    pub modules: Vec<ModuleId>,
    /// Entry module or dynamic import targets this chunk was created for.
    pub roots: Vec<ModuleId>,
    /// Bootstrap features the chunk needs regardless of its modules.
    pub runtime: BTreeSet<RuntimeFeature>,
}

impl Chunk {
    pub(crate) fn from_group(group: ChunkGroup) -> Self {
        let id = ChunkId::derive(&group.name, &group.modules);
        let runtime = match group.kind {
            ChunkKind::Entry => BTreeSet::from([RuntimeFeature::Require]),
            ChunkKind::Async | ChunkKind::Shared => BTreeSet::from([RuntimeFeature::ChunkRegistry]),
        };
        Self {
            id,
            name: group.name,
            kind: group.kind,
            modules: group.modules.into_iter().collect(),
            roots: group.roots,
            runtime,
        }
    }

    pub fn is_entry(&self) -> bool {
        self.kind == ChunkKind::Entry
    }

    pub fn contains(&self, module: &ModuleId) -> bool {
        self.modules.binary_search(module).is_ok()
    }

    /// Output file name handed to the writer.
    pub fn file_name(&self) -> String {
        format!("{}.{}.js", self.name, self.id)
    }
}

/// Result of chunk assembly for one build.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChunkSet {
    chunks: Vec<Chunk>,
    module_chunks: BTreeMap<ModuleId, BTreeSet<ChunkId>>,
    async_targets: BTreeMap<ModuleId, Vec<ChunkId>>,
    async_modules: BTreeSet<ModuleId>,
    policy_version: String,
}

impl ChunkSet {
    pub(crate) fn new(
        chunks: Vec<Chunk>,
        async_targets: BTreeMap<ModuleId, Vec<ChunkId>>,
        async_modules: BTreeSet<ModuleId>,
        policy_version: String,
    ) -> Self {
        let mut module_chunks: BTreeMap<ModuleId, BTreeSet<ChunkId>> = BTreeMap::new();
        for chunk in &chunks {
            for module in &chunk.modules {
                module_chunks
                    .entry(module.clone())
                    .or_default()
                    .insert(chunk.id.clone());
            }
        }
        Self {
            chunks,
            module_chunks,
            async_targets,
            async_modules,
            policy_version,
        }
    }

    /// Entry chunks in entry order, then the remaining chunks sorted by kind,
    /// name and id.
    pub fn chunks(&self) -> &[Chunk] {
        &self.chunks
    }

    pub fn chunk(&self, id: &ChunkId) -> Option<&Chunk> {
        self.chunks.iter().find(|chunk| &chunk.id == id)
    }

    pub fn ids(&self) -> BTreeSet<ChunkId> {
        self.chunks.iter().map(|chunk| chunk.id.clone()).collect()
    }

    /// Chunks containing `module`.
    pub fn chunks_of(&self, module: &ModuleId) -> impl Iterator<Item = &ChunkId> {
        self.module_chunks.get(module).into_iter().flatten()
    }

    /// Chunks to load before a dynamic import of `module` can run. Empty when
    /// the module is already available wherever it is imported.
    pub fn async_chunks_for(&self, module: &ModuleId) -> &[ChunkId] {
        self.async_targets
            .get(module)
            .map(Vec::as_slice)
            .unwrap_or_default()
    }

    /// True for modules that use top-level await or import one through ESM.
    pub fn is_async_module(&self, module: &ModuleId) -> bool {
        self.async_modules.contains(module)
    }

    pub fn async_modules(&self) -> impl Iterator<Item = &ModuleId> {
        self.async_modules.iter()
    }

    /// Name and version of the split policy that produced this set.
    pub fn policy_version(&self) -> &str {
        &self.policy_version
    }

    pub fn len(&self) -> usize {
        self.chunks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.chunks.is_empty()
    }
}

/// Errors from chunk assembly.
#[derive(Debug, Clone, thiserror::Error)]
pub enum ChunkError {
    /// A module is required synchronously but has to load asynchronously.
    #[error("{importer} requires {module} synchronously, but {module} is an async module")]
    ConflictingRequirements { importer: ModuleId, module: ModuleId },

    #[error("entry '{name}' ({module}) is not part of the module graph")]
    MissingEntry { name: String, module: ModuleId },

    #[error(transparent)]
    Graph(#[from] GraphError),
}

#[cfg(test)]
mod tests {
    use super::*;

    fn id(path: &str) -> ModuleId {
        ModuleId::new(path).unwrap()
    }

    #[test]
    fn chunk_id_ignores_module_order() {
        let a = id("/src/a.js");
        let b = id("/src/b.js");
        assert_eq!(ChunkId::derive("main", [&a, &b]), ChunkId::derive("main", [&b, &a]));
        assert_ne!(ChunkId::derive("main", [&a, &b]), ChunkId::derive("other", [&a, &b]));
        assert_eq!(ChunkId::derive("main", [&a]).as_str().len(), 16);
    }

    #[test]
    fn file_name_includes_id() {
        let chunk = Chunk::from_group(ChunkGroup::new(
            "lazy",
            ChunkKind::Async,
            vec![id("/src/lazy.js")],
            [id("/src/lazy.js")].into_iter().collect(),
        ));
        assert_eq!(chunk.file_name(), format!("lazy.{}.js", chunk.id));
        assert!(chunk.runtime.contains(&RuntimeFeature::ChunkRegistry));
    }
}
