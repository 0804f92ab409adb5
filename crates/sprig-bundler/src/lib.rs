#![cfg_attr(docsrs, feature(doc_cfg))]

//! # sprig-bundler
//!
//! Sprig bundler - chunk assembly, code generation and incremental build
//! caching on top of the `sprig-graph` module graph.
//!
//! The crate never touches the filesystem on its own. Module content comes
//! from a [`Loader`], specifiers are resolved by a [`Resolver`] and finished
//! chunks go to an [`OutputWriter`].
//!
//! ## Quick Start
//!
//! ```no_run
//! use std::sync::Arc;
//!
//! use sprig_bundler::sprig_config::BundleOptions;
//! use sprig_bundler::{
//!     Compiler, MemoryLoader, MemoryWriter, ModuleContent, ModuleId, ModuleKind, StaticResolver,
//! };
//!
//! # #[tokio::main]
//! # async fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let main = ModuleId::new("/src/main.js")?;
//! let loader = Arc::new(MemoryLoader::new().with_module(
//!     main.clone(),
//!     ModuleContent::builder(ModuleKind::Esm, "console.log('hello');").build(),
//! ));
//! let writer = Arc::new(MemoryWriter::new());
//!
//! let mut compiler = Compiler::builder(BundleOptions::default().with_entry("main", "/src/main.js"))
//!     .loader(loader)
//!     .resolver(Arc::new(StaticResolver::new().with_module(main)))
//!     .writer(writer.clone())
//!     .build()?;
//!
//! let output = compiler.build().await?;
//! for chunk in &output.chunks {
//!     println!("{} ({} bytes)", chunk.file_name, chunk.code.len());
//! }
//! # Ok(()) }
//! ```
//!
//! Running [`Compiler::build`] again after changing a module in the loader
//! only re-applies that module to the graph, and only regenerates the
//! modules whose code generation inputs changed.

// Foundation crates
pub use sprig_config;
pub use sprig_graph;

pub use sprig_graph::{
    DeclarationKind, DependencyEdge, DestructuredProperty, EdgeCategory, EdgeIdx, EdgeOutcome,
    EdgeTarget, Export, ExportBinding, ExportKeyword, ExportList, ExportResolution, ExportValue,
    ExportsState, GraphEdge, GraphError, ImportedBinding, ImportedNames, InlineDecision,
    InlinePlan, InlineValue, InlinedBinding, Inliner, Module, ModuleContent, ModuleContentBuilder,
    ModuleGraph, ModuleId, ModuleIdError, ModuleIdx, ModuleKind, ModuleStatus, ModuleUsage,
    Mutation, NotInlinable, ResolutionError, ResolveError, Resolver, RetainReason, Rewrite,
    SideEffects, SourceSpan, StaticResolver, UsageAnalyzer, UsageMap, UsageState, UseSite,
    UseSiteId, UseSiteKind, property_access,
};

pub mod build;
pub mod cache;
pub mod chunk;
pub mod codegen;
pub mod diagnostics;
mod error;

// Logging utilities (optional, enabled with "logging" feature)
#[cfg(feature = "logging")]
#[cfg_attr(docsrs, doc(cfg(feature = "logging")))]
pub mod logging;

#[cfg(feature = "logging")]
#[cfg_attr(docsrs, doc(cfg(feature = "logging")))]
pub use logging::{LogLevel, init_logging, init_logging_from_env, init_logging_from_settings};

pub use build::{
    BuildOutput, BuildStats, CancellationFlag, ChunkOutput, Compiler, CompilerBuilder, DirWriter,
    Loader, MemoryLoader, MemoryWriter, OutputWriter,
};
pub use cache::{CacheError, CacheHandle, CacheKey, CacheStats, CacheStore, Etag, MemoryStore, RedbStore};
pub use chunk::{
    Chunk, ChunkAssembler, ChunkError, ChunkId, ChunkKind, ChunkSet, PerDynamicImport,
    ShareCommonModules, SplitPolicy,
};
pub use codegen::{ChunkCode, CodegenContext, CodegenError, RuntimeFeature};
pub use diagnostics::{
    CollectingSink, Diagnostic, DiagnosticContext, DiagnosticKind, DiagnosticSeverity,
    DiagnosticSink, TracingSink,
};
pub use error::{BuildError, Result};
