//! # sprig-graph
//!
//! Module dependency graph, export usage analysis and constant inlining for
//! the sprig bundler.
//!
//! This crate holds the parts of a build that reason about *what* ends up in
//! the output, with no I/O and no code generation:
//!
//! - **[`ModuleGraph`]**: an arena of modules and dependency edges addressed
//!   by [`ModuleIdx`]/[`EdgeIdx`]. Cycles are legal; every traversal keeps a
//!   visited set.
//! - **[`usage`]**: tree-shaking. Walks the graph from the entry points and
//!   classifies every export as `Unused`, `Used` or `Unknown`.
//! - **[`inline`]**: decides which exports are compile-time constants and
//!   which use sites can have the literal substituted.
//!
//! ## Architecture
//!
//! ```text
//!   Loader output ──► ModuleGraph ──► UsageAnalyzer ──► Inliner
//!   (ModuleContent)   (arena)         (UsageMap)        (InlinePlan)
//!         │               ▲
//!         └── Resolver ───┘
//! ```
//!
//! ## Quick Start
//!
//! ```rust
//! use sprig_graph::{
//!     DependencyEdge, Export, InlineValue, ModuleContent, ModuleGraph, ModuleId, ModuleKind,
//!     StaticResolver, UsageAnalyzer, UseSite,
//! };
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let entry = ModuleId::new("/src/main.js")?;
//! let config = ModuleId::new("/src/config.js")?;
//! let resolver = StaticResolver::new().with_module(config.clone());
//!
//! let mut graph = ModuleGraph::new();
//! let entry_idx = graph.add_module(entry.clone());
//! graph.set_module_content(
//!     entry_idx,
//!     ModuleContent::builder(ModuleKind::Esm, "import { DEBUG } from './config'; log(DEBUG);")
//!         .dependency(
//!             DependencyEdge::esm_named("./config", ["DEBUG"])
//!                 .with_use_site(UseSite::reference(0, "DEBUG")),
//!         )
//!         .build(),
//!     &resolver,
//! )?;
//!
//! let config_idx = graph.require_index(&config)?;
//! graph.set_module_content(
//!     config_idx,
//!     ModuleContent::builder(ModuleKind::Esm, "export const DEBUG = false; export const LEVEL = 3;")
//!         .export(Export::constant("DEBUG", InlineValue::Bool(false)))
//!         .export(Export::constant("LEVEL", InlineValue::Number(3.0)))
//!         .side_effects(false)
//!         .build(),
//!     &resolver,
//! )?;
//!
//! let usage = UsageAnalyzer::new(&graph).analyze(&[entry])?;
//! assert!(usage.is_retained(&config));
//! assert!(usage.export_state(&config, "DEBUG").is_live());
//! assert!(!usage.export_state(&config, "LEVEL").is_live());
//! # Ok(())
//! # }
//! ```

pub mod dependency;
pub mod error;
pub mod export;
mod graph;
pub mod inline;
pub mod module;
pub mod module_id;
pub mod resolver;
pub mod span;
pub mod usage;

#[cfg(test)]
mod tests;

pub use dependency::{
    DeclarationKind, DependencyEdge, DestructuredProperty, EdgeCategory, EdgeTarget, GraphEdge,
    ImportedBinding, ImportedNames, UseSite, UseSiteId, UseSiteKind,
};
pub use error::{GraphError, ResolutionError, ResolveError, Result};
pub use export::{
    Export, ExportBinding, ExportKeyword, ExportList, ExportValue, ExportsState, InlineValue,
    Mutation, property_access,
};
pub use graph::{EdgeIdx, EdgeOutcome, ExportResolution, ModuleGraph, ModuleIdx};
pub use inline::{InlineDecision, InlinePlan, InlinedBinding, Inliner, NotInlinable, Rewrite};
pub use module::{Module, ModuleContent, ModuleContentBuilder, ModuleKind, ModuleStatus, SideEffects};
pub use module_id::{ModuleId, ModuleIdError};
pub use resolver::{Resolver, StaticResolver};
pub use span::SourceSpan;
pub use usage::{ModuleUsage, RetainReason, UsageAnalyzer, UsageMap, UsageState};
