use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

/// A helper of the chunk runtime.
///
/// Module bodies record the helpers they call; entry chunks embed the union
/// of every chunk's requirements, closed over [`RuntimeFeature::requires`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RuntimeFeature {
    /// `__sprig_require__` and the module cache.
    Require,
    /// `__sprig_require__.d`: getters for ESM exports.
    DefineGetters,
    /// `__sprig_require__.r`: marks an exports object as an ES namespace.
    MakeNamespace,
    /// `__sprig_require__.i`: namespace view of a CommonJS/JSON/asset module.
    Interop,
    /// `__sprig_require__.s`: `export * from`.
    ExportStar,
    /// `__sprig_require__.e`: loads async chunks.
    EnsureChunk,
    /// `__sprig_require__.a`: factories that return a promise.
    AsyncModule,
    /// Receives modules pushed by non-entry chunks.
    ChunkRegistry,
    /// `__sprig_require__.w`: import of a module that may not be loaded.
    WeakRequire,
}

impl RuntimeFeature {
    pub const ALL: [RuntimeFeature; 9] = [
        Self::Require,
        Self::DefineGetters,
        Self::MakeNamespace,
        Self::Interop,
        Self::ExportStar,
        Self::EnsureChunk,
        Self::AsyncModule,
        Self::ChunkRegistry,
        Self::WeakRequire,
    ];

    /// Features this one calls into.
    pub fn requires(self) -> &'static [RuntimeFeature] {
        match self {
            Self::Require => &[],
            Self::DefineGetters
            | Self::MakeNamespace
            | Self::Interop
            | Self::ExportStar
            | Self::WeakRequire
            | Self::AsyncModule => &[Self::Require],
            Self::ChunkRegistry => &[Self::Require],
            Self::EnsureChunk => &[Self::Require, Self::ChunkRegistry],
        }
    }

    pub fn snippet(self) -> &'static str {
        match self {
            Self::Require => include_str!("snippets/require.js"),
            Self::DefineGetters => include_str!("snippets/define_getters.js"),
            Self::MakeNamespace => include_str!("snippets/make_namespace.js"),
            Self::Interop => include_str!("snippets/interop.js"),
            Self::ExportStar => include_str!("snippets/export_star.js"),
            Self::EnsureChunk => include_str!("snippets/ensure_chunk.js"),
            Self::WeakRequire => include_str!("snippets/weak_require.js"),
            Self::AsyncModule => include_str!("snippets/async_module.js"),
            Self::ChunkRegistry => include_str!("snippets/chunk_registry.js"),
        }
    }

    /// `features` plus everything they transitively require.
    pub fn closure(features: impl IntoIterator<Item = RuntimeFeature>) -> BTreeSet<RuntimeFeature> {
        let mut result = BTreeSet::new();
        let mut stack: Vec<RuntimeFeature> = features.into_iter().collect();
        while let Some(feature) = stack.pop() {
            if result.insert(feature) {
                stack.extend_from_slice(feature.requires());
            }
        }
        result
    }
}
