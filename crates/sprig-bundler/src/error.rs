use sprig_config::ConfigError;
use sprig_graph::{GraphError, ModuleId};

use crate::cache::CacheError;
use crate::chunk::ChunkError;
use crate::codegen::CodegenError;
use crate::diagnostics::Diagnostic;

/// Error types for sprig-bundler operations.
#[derive(Debug, thiserror::Error)]
pub enum BuildError {
    /// Structural graph failure. Integrity violations are bugs in an earlier
    /// phase and abort the build.
    #[error(transparent)]
    Graph(#[from] GraphError),

    #[error(transparent)]
    Chunk(#[from] ChunkError),

    #[error(transparent)]
    Codegen(#[from] CodegenError),

    #[error(transparent)]
    Cache(#[from] CacheError),

    #[error(transparent)]
    Config(#[from] ConfigError),

    /// The loader could not produce a module.
    #[error("failed to load {module}: {source}")]
    Load {
        module: ModuleId,
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    /// The output writer failed.
    #[error("failed to write {file}: {source}")]
    Write {
        file: String,
        #[source]
        source: std::io::Error,
    },

    /// Reported diagnostics prevent the build from producing output.
    #[error("{}", format_failed(.diagnostics))]
    Failed { diagnostics: Vec<Diagnostic> },

    #[error("build was cancelled")]
    Cancelled,

    /// The compiler was assembled from inconsistent parts.
    #[error("invalid compiler setup: {0}")]
    Setup(String),
}

/// Result type alias for sprig-bundler operations.
pub type Result<T> = std::result::Result<T, BuildError>;

impl BuildError {
    /// Diagnostics carried by a [`BuildError::Failed`].
    pub fn diagnostics(&self) -> &[Diagnostic] {
        match self {
            BuildError::Failed { diagnostics } => diagnostics,
            _ => &[],
        }
    }
}

fn format_failed(diagnostics: &[Diagnostic]) -> String {
    match diagnostics {
        [] => "build failed".to_string(),
        [single] => single.to_string(),
        many => format!(
            "{} errors: {}",
            many.len(),
            many.iter()
                .map(ToString::to_string)
                .collect::<Vec<_>>()
                .join("; ")
        ),
    }
}

impl miette::Diagnostic for BuildError {
    fn code(&self) -> Option<Box<dyn std::fmt::Display + '_>> {
        Some(Box::new(match self {
            BuildError::Graph(GraphError::GraphIntegrity(_)) => "sprig::graph_integrity",
            BuildError::Graph(_) => "sprig::graph",
            BuildError::Chunk(ChunkError::ConflictingRequirements { .. }) => {
                "sprig::conflicting_requirements"
            }
            BuildError::Chunk(_) => "sprig::chunk",
            BuildError::Codegen(_) => "sprig::codegen",
            BuildError::Cache(_) => "sprig::cache",
            BuildError::Config(_) => "sprig::config",
            BuildError::Load { .. } => "sprig::load",
            BuildError::Write { .. } => "sprig::write",
            BuildError::Failed { .. } => "sprig::build_failed",
            BuildError::Cancelled => "sprig::cancelled",
            BuildError::Setup(_) => "sprig::setup",
        }))
    }

    fn severity(&self) -> Option<miette::Severity> {
        Some(miette::Severity::Error)
    }

    fn help(&self) -> Option<Box<dyn std::fmt::Display + '_>> {
        match self {
            BuildError::Graph(GraphError::GraphIntegrity(_)) | BuildError::Codegen(_) => Some(
                Box::new("this is a bug in sprig; please report it with the module graph that triggered it"),
            ),
            BuildError::Chunk(ChunkError::ConflictingRequirements { module, .. }) => Some(Box::new(
                format!("load {module} with `import()` or a static `import`, or remove its top-level await"),
            )),
            BuildError::Load { .. } => Some(Box::new("check that the loader knows this module")),
            BuildError::Write { .. } => Some(Box::new("check disk space and permissions of the output directory")),
            BuildError::Failed { diagnostics } if diagnostics.len() == 1 => diagnostics[0]
                .help
                .as_ref()
                .map(|help| Box::new(help.clone()) as Box<dyn std::fmt::Display>),
            BuildError::Failed { .. } => Some(Box::new("multiple errors occurred, see details below")),
            _ => None,
        }
    }

    fn related(&self) -> Option<Box<dyn Iterator<Item = &dyn miette::Diagnostic> + '_>> {
        match self {
            BuildError::Failed { diagnostics } if diagnostics.len() > 1 => Some(Box::new(
                diagnostics.iter().map(|d| d as &dyn miette::Diagnostic),
            )),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::diagnostics::{DiagnosticKind, DiagnosticSeverity};
    use miette::Diagnostic as _;

    fn diagnostic(message: &str) -> Diagnostic {
        Diagnostic::new(DiagnosticKind::MissingExport, DiagnosticSeverity::Error, message)
    }

    #[test]
    fn failed_lists_every_diagnostic() {
        let error = BuildError::Failed {
            diagnostics: vec![diagnostic("first"), diagnostic("second")],
        };
        let message = error.to_string();
        assert!(message.starts_with("2 errors"));
        assert!(message.contains("first") && message.contains("second"));
        assert_eq!(error.related().map(Iterator::count), Some(2));
        assert_eq!(error.diagnostics().len(), 2);
    }

    #[test]
    fn integrity_errors_have_a_stable_code() {
        let error = BuildError::from(GraphError::GraphIntegrity("dangling edge".into()));
        assert_eq!(error.code().map(|code| code.to_string()).as_deref(), Some("sprig::graph_integrity"));
        assert!(error.help().is_some());
    }
}
