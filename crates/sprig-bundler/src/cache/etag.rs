//! Content-addressed etags.
//!
//! Every etag is a BLAKE3 hex digest over length-prefixed fields, so two
//! different field sequences can never produce the same byte stream.

use std::collections::BTreeSet;
use std::fmt;

use blake3::Hasher;
use serde::{Deserialize, Serialize};
use sprig_graph::{ModuleGraph, ModuleIdx, property_access};

use crate::codegen::CodegenContext;

/// Bump when the hashed field layout changes.
const ETAG_FORMAT_VERSION: u32 = 1;

/// Content-addressed identifier used to validate cache entries.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Etag(String);

impl Etag {
    /// Create an etag from a hex string.
    pub fn from_hex(hex: impl Into<String>) -> Self {
        Self(hex.into())
    }

    /// Get the etag as a hex string.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Etag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

struct EtagHasher(Hasher);

impl EtagHasher {
    fn new(domain: &str) -> Self {
        let mut hasher = Self(Hasher::new());
        hasher.0.update(&ETAG_FORMAT_VERSION.to_le_bytes());
        hasher.field(domain.as_bytes());
        hasher
    }

    fn field(&mut self, bytes: &[u8]) -> &mut Self {
        self.0.update(&(bytes.len() as u64).to_le_bytes());
        self.0.update(bytes);
        self
    }

    fn str(&mut self, value: &str) -> &mut Self {
        self.field(value.as_bytes())
    }

    fn flag(&mut self, value: bool) -> &mut Self {
        self.field(&[u8::from(value)])
    }

    /// Hash the `Debug` rendering. Only used for types whose `Debug` output is
    /// deterministic (no hash maps).
    fn debug(&mut self, value: &impl fmt::Debug) -> &mut Self {
        self.str(&format!("{value:?}"))
    }

    fn finish(&self) -> Etag {
        Etag(self.0.finalize().to_hex().to_string())
    }
}

/// Etag of one module: source content, compiler options relevant to it and
/// the ids its edges resolved to.
///
/// Returns `None` for indices that do not refer to a live module.
pub fn module_etag(graph: &ModuleGraph, idx: ModuleIdx, options_fingerprint: &str) -> Option<Etag> {
    let module = graph.module(idx)?;
    let mut hasher = EtagHasher::new("module");

    hasher
        .str(module.id.as_str())
        .str(module.kind.as_str())
        .str(&module.source)
        .str(options_fingerprint)
        .debug(&module.side_effects)
        .flag(module.top_level_await)
        .debug(&module.exports)
        .debug(&module.star_reexports);

    for (_, edge) in graph.outgoing_edges(idx) {
        hasher.debug(&edge.edge);
        match edge.target.module().and_then(|target| graph.module(target)) {
            Some(target) => hasher.str(target.id.as_str()),
            None => hasher.str("unresolved"),
        };
    }

    Some(hasher.finish())
}

/// Etag of a chunk: its module etags (order-insensitive) and the version of
/// the split policy that assembled it.
pub fn chunk_etag<'a>(module_etags: impl IntoIterator<Item = &'a Etag>, policy_version: &str) -> Etag {
    let sorted: BTreeSet<&Etag> = module_etags.into_iter().collect();
    let mut hasher = EtagHasher::new("chunk");
    hasher.str(policy_version);
    for etag in sorted {
        hasher.str(etag.as_str());
    }
    hasher.finish()
}

/// Etag of the generated code of one module.
///
/// Covers everything code generation reads besides the module itself: the
/// module's usage facts, the rewrites planned for its use sites, which of
/// its exports are fully inlined and, per edge, the facts about the target
/// that change the emitted import.
pub fn codegen_etag(module_etag: &Etag, ctx: &CodegenContext, idx: ModuleIdx) -> Etag {
    let mut hasher = EtagHasher::new("codegen");
    hasher.str(module_etag.as_str());

    let Some(module) = ctx.graph.module(idx) else {
        return hasher.str("missing").finish();
    };

    hasher
        .debug(&ctx.usage.get(&module.id))
        .debug(&ctx.plan.rewrites_for(&module.id))
        .flag(ctx.chunks.is_async_module(&module.id));

    for name in module.exports.names() {
        if ctx.plan.is_fully_inlined(&module.id, name) {
            hasher.str(&property_access(name));
        }
    }

    for (_, edge) in ctx.graph.outgoing_edges(idx) {
        let Some(target) = edge.target.module().and_then(|target| ctx.graph.module(target)) else {
            hasher.str("unresolved");
            continue;
        };
        hasher
            .str(target.id.as_str())
            .str(target.kind.as_str())
            .flag(ctx.usage.is_retained(&target.id))
            .flag(target.side_effects.assumed())
            .flag(ctx.chunks.is_async_module(&target.id));
        if edge.edge.category.is_async() {
            for chunk in ctx.chunks.async_chunks_for(&target.id) {
                hasher.str(chunk.as_str());
            }
        }
    }

    hasher.finish()
}

/// Combine etags independent of their order.
pub fn merge_etags<'a>(etags: impl IntoIterator<Item = &'a Etag>) -> Etag {
    let mut sorted: Vec<&Etag> = etags.into_iter().collect();
    sorted.sort();
    let mut hasher = EtagHasher::new("merge");
    for etag in sorted {
        hasher.str(etag.as_str());
    }
    hasher.finish()
}

/// BLAKE3 hex digest of arbitrary content, used for output file hashes.
pub fn content_hash(content: &[u8]) -> String {
    blake3::hash(content).to_hex().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn merge_is_order_insensitive() {
        let a = Etag::from_hex("a");
        let b = Etag::from_hex("b");
        assert_eq!(merge_etags([&a, &b]), merge_etags([&b, &a]));
        assert_ne!(merge_etags([&a]), merge_etags([&a, &b]));
    }

    #[test]
    fn chunk_etag_tracks_policy_version() {
        let a = Etag::from_hex("a");
        assert_ne!(chunk_etag([&a], "per-dynamic-import@1"), chunk_etag([&a], "share-common-modules:2@1"));
    }

    #[test]
    fn fields_are_length_prefixed() {
        let mut left = EtagHasher::new("test");
        left.str("ab").str("c");
        let mut right = EtagHasher::new("test");
        right.str("a").str("bc");
        assert_ne!(left.finish(), right.finish());
    }
}
