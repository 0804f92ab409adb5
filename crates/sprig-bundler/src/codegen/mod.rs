//! Code generation.
//!
//! Turns retained modules into module bodies for the chunk runtime:
//!
//! - imports become `__sprig_require__` calls (or disappear when their target
//!   was eliminated),
//! - use sites planned for inlining are replaced by their literal, wrapped in
//!   an `/* inlined export .NAME */` marker,
//! - unused or fully inlined exports drop out of the getter table, and unused
//!   pure literal declarations are removed.
//!
//! Bodies are produced per module from a frozen graph, so [`generate`] fans
//! out over the modules of a chunk with rayon. [`render_chunk`] wraps the
//! bodies into the module map and, for entry chunks, the runtime.

mod edits;
mod module;
mod render;
mod runtime;

pub use module::generate_module;
pub use render::{RuntimeContext, render_chunk};
pub use runtime::RuntimeFeature;

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use sprig_graph::{InlinePlan, ModuleGraph, ModuleId, UsageMap};

use crate::chunk::{Chunk, ChunkSet};

/// Everything code generation reads. Shared read-only between workers.
#[derive(Debug, Clone)]
pub struct CodegenContext {
    pub graph: Arc<ModuleGraph>,
    pub usage: Arc<UsageMap>,
    pub plan: Arc<InlinePlan>,
    pub chunks: Arc<ChunkSet>,
}

impl CodegenContext {
    pub fn new(
        graph: Arc<ModuleGraph>,
        usage: Arc<UsageMap>,
        plan: Arc<InlinePlan>,
        chunks: Arc<ChunkSet>,
    ) -> Self {
        Self {
            graph,
            usage,
            plan,
            chunks,
        }
    }
}

/// Generated body of one module. This is the value stored in the build cache.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GeneratedModule {
    pub id: ModuleId,
    /// Body of the module factory, without the wrapper.
    pub code: String,
    /// Runtime helpers the body calls.
    pub runtime: BTreeSet<RuntimeFeature>,
    /// The factory must be an `async function`.
    pub is_async: bool,
}

/// Output of [`generate`] for one chunk.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ChunkCode {
    pub module_bodies: BTreeMap<ModuleId, String>,
    /// Union of the chunk's own requirements and those of its modules.
    pub runtime_requirements: BTreeSet<RuntimeFeature>,
    pub async_modules: BTreeSet<ModuleId>,
}

impl ChunkCode {
    pub fn from_modules(chunk: &Chunk, modules: impl IntoIterator<Item = GeneratedModule>) -> Self {
        let mut code = Self {
            runtime_requirements: chunk.runtime.clone(),
            ..Self::default()
        };
        for module in modules {
            code.runtime_requirements.extend(module.runtime.iter().copied());
            if module.is_async {
                code.async_modules.insert(module.id.clone());
            }
            code.module_bodies.insert(module.id, module.code);
        }
        code
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CodegenError {
    /// A prior phase handed over inconsistent data. Fatal for the build.
    #[error("graph integrity violated in {module}: {message}")]
    GraphIntegrity { module: ModuleId, message: String },

    #[error("code generation was cancelled")]
    Cancelled,
}

impl CodegenError {
    pub(crate) fn integrity(module: &ModuleId, message: impl Into<String>) -> Self {
        Self::GraphIntegrity {
            module: module.clone(),
            message: message.into(),
        }
    }
}

/// Generate every module of `chunk` in parallel.
pub fn generate(ctx: &CodegenContext, chunk: &Chunk) -> Result<ChunkCode, CodegenError> {
    let modules = chunk
        .modules
        .par_iter()
        .map(|id| {
            let idx = ctx
                .graph
                .index_of(id)
                .ok_or_else(|| CodegenError::integrity(id, "chunk references a module missing from the graph"))?;
            generate_module(ctx, idx)
        })
        .collect::<Result<Vec<_>, _>>()?;

    Ok(ChunkCode::from_modules(chunk, modules))
}

/// JavaScript string literal for `value`.
pub(crate) fn js_string(value: &str) -> String {
    sprig_graph::InlineValue::String(value.to_string()).to_js()
}
