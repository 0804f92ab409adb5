use thiserror::Error;

use super::{ModuleId, ModuleIdError, SourceSpan};

/// Errors raised by structural graph operations.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum GraphError {
    #[error("module not found in graph: {0}")]
    UnknownModule(String),

    #[error("module {module} still has {count} incoming edge(s) from reachable modules")]
    HasIncomingEdges { module: ModuleId, count: usize },

    #[error("module {0} is already loaded; invalidate it before applying new content")]
    AlreadyLoaded(ModuleId),

    #[error("exports of {module} are finalized; `{name}` cannot be redefined without invalidating the module")]
    ExportsFinalized { module: ModuleId, name: String },

    /// A prior phase left the graph inconsistent. Fatal for the build.
    #[error("graph integrity violated: {0}")]
    GraphIntegrity(String),

    #[error(transparent)]
    InvalidModuleId(#[from] ModuleIdError),
}

/// Result type for graph operations.
pub type Result<T> = std::result::Result<T, GraphError>;

/// Failure reported by a [`crate::Resolver`].
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ResolveError {
    #[error("module not found")]
    NotFound,

    #[error("{0}")]
    Invalid(String),
}

/// A specifier that could not be resolved, attributed to the importing module.
///
/// Recoverable: the edge is kept as `Unresolved` and the build continues.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("cannot resolve '{specifier}' from {importer}: {reason}")]
pub struct ResolutionError {
    pub importer: ModuleId,
    pub specifier: String,
    pub span: Option<SourceSpan>,
    #[source]
    pub reason: ResolveError,
}
