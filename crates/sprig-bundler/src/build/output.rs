use std::collections::{BTreeMap, BTreeSet};
use std::time::Duration;

use serde::Serialize;
use sprig_graph::ModuleId;

use crate::cache::{CacheStats, Etag};
use crate::chunk::{ChunkId, ChunkKind};
use crate::codegen::RuntimeFeature;
use crate::diagnostics::Diagnostic;

/// One rendered chunk, as handed to the [`OutputWriter`](super::OutputWriter).
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ChunkOutput {
    pub id: ChunkId,
    pub name: String,
    pub kind: ChunkKind,
    /// Suggested file name, `{name}.{id}.js`.
    pub file_name: String,
    /// Etag over the chunk's module etags and the split policy version.
    pub etag: Etag,
    /// BLAKE3 digest of `code`.
    pub content_hash: String,
    /// Generated body of every module in the chunk.
    pub module_bodies: BTreeMap<ModuleId, String>,
    /// Runtime helpers the chunk's modules call.
    pub runtime: BTreeSet<RuntimeFeature>,
    /// Final chunk text.
    pub code: String,
}

/// Counters for one build.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct BuildStats {
    /// Modules whose content was applied to the graph.
    pub loaded: usize,
    /// Modules whose loader output was unchanged since the previous build.
    pub reused: usize,
    /// Modules pruned because no entry reaches them anymore.
    pub removed: usize,
    /// Modules kept by usage analysis.
    pub retained: usize,
    pub chunks: usize,
    /// Use sites replaced by an inlined literal.
    pub inlined_sites: usize,
    /// Edges whose specifier could not be resolved.
    pub unresolved: usize,
    /// Cache activity of this build only.
    pub cache: CacheStats,
    pub duration: Duration,
}

/// Result of [`Compiler::build`](super::Compiler::build).
#[derive(Debug, Clone, Default)]
pub struct BuildOutput {
    /// Entry chunks first, in entry order.
    pub chunks: Vec<ChunkOutput>,
    /// Non-fatal diagnostics reported during the build.
    pub diagnostics: Vec<Diagnostic>,
    pub stats: BuildStats,
}

impl BuildOutput {
    pub fn chunk(&self, name: &str) -> Option<&ChunkOutput> {
        self.chunks.iter().find(|chunk| chunk.name == name)
    }

    /// Generated body of `module` in the first chunk that holds it.
    pub fn module_body(&self, module: &ModuleId) -> Option<&str> {
        self.chunks
            .iter()
            .find_map(|chunk| chunk.module_bodies.get(module))
            .map(String::as_str)
    }

    /// Every module present in any chunk.
    pub fn modules(&self) -> BTreeSet<&ModuleId> {
        self.chunks
            .iter()
            .flat_map(|chunk| chunk.module_bodies.keys())
            .collect()
    }
}
