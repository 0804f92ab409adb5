//! Structured build diagnostics.
//!
//! The pipeline never prints. Recoverable problems (an unresolved import, a
//! sync require of an async module) are turned into [`Diagnostic`] values
//! and handed to a [`DiagnosticSink`]; fatal ones additionally abort the
//! build with a [`BuildError`](crate::BuildError) that carries them.

mod miette;

pub use self::miette::DiagnosticReport;

use std::fmt;
use std::sync::Arc;

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use sprig_graph::{ModuleId, ResolutionError, SourceSpan};

/// Diagnostic kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DiagnosticKind {
    UnresolvedImport,
    ConflictingRequirements,
    GraphIntegrity,
    CacheCompute,
    MissingExport,
}

impl DiagnosticKind {
    pub fn code(self) -> &'static str {
        match self {
            Self::UnresolvedImport => "sprig::unresolved_import",
            Self::ConflictingRequirements => "sprig::conflicting_requirements",
            Self::GraphIntegrity => "sprig::graph_integrity",
            Self::CacheCompute => "sprig::cache_compute",
            Self::MissingExport => "sprig::missing_export",
        }
    }
}

impl fmt::Display for DiagnosticKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::UnresolvedImport => write!(f, "UnresolvedImport"),
            Self::ConflictingRequirements => write!(f, "ConflictingRequirements"),
            Self::GraphIntegrity => write!(f, "GraphIntegrity"),
            Self::CacheCompute => write!(f, "CacheCompute"),
            Self::MissingExport => write!(f, "MissingExport"),
        }
    }
}

/// Diagnostic severity level.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DiagnosticSeverity {
    Error,
    Warning,
}

/// Structured context for different diagnostic kinds.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum DiagnosticContext {
    UnresolvedImport {
        /// Import specifier that couldn't be resolved
        specifier: String,
        /// Module that tried to import
        importer: String,
    },
    ConflictingRequirements {
        /// Module whose sync require targets an async module
        importer: String,
        /// The async module
        module: String,
    },
    MissingExport {
        export_name: String,
        /// Module that requested the export
        importer: String,
        /// Module expected to provide it
        module: String,
        available_exports: Vec<String>,
    },
    CacheCompute {
        scope: String,
        identifier: String,
    },
}

/// A user-facing build problem.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Diagnostic {
    pub kind: DiagnosticKind,
    pub severity: DiagnosticSeverity,
    pub message: String,
    /// Module the diagnostic is attributed to.
    pub module_id: Option<ModuleId>,
    /// Location inside that module.
    pub span: Option<SourceSpan>,
    pub help: Option<String>,
    pub context: Option<DiagnosticContext>,
}

impl Diagnostic {
    pub fn new(kind: DiagnosticKind, severity: DiagnosticSeverity, message: impl Into<String>) -> Self {
        Self {
            kind,
            severity,
            message: message.into(),
            module_id: None,
            span: None,
            help: None,
            context: None,
        }
    }

    pub fn in_module(mut self, module: ModuleId) -> Self {
        self.module_id = Some(module);
        self
    }

    pub fn at(mut self, span: Option<SourceSpan>) -> Self {
        self.span = span;
        self
    }

    pub fn with_help(mut self, help: impl Into<String>) -> Self {
        self.help = Some(help.into());
        self
    }

    pub fn with_context(mut self, context: DiagnosticContext) -> Self {
        self.context = Some(context);
        self
    }

    pub fn unresolved_import(error: &ResolutionError) -> Self {
        Self::new(
            DiagnosticKind::UnresolvedImport,
            DiagnosticSeverity::Error,
            format!(
                "cannot resolve '{}' from {}: {}",
                error.specifier, error.importer, error.reason
            ),
        )
        .in_module(error.importer.clone())
        .at(error.span)
        .with_help("check the specifier; the import is replaced by code that throws at runtime")
        .with_context(DiagnosticContext::UnresolvedImport {
            specifier: error.specifier.clone(),
            importer: error.importer.to_string(),
        })
    }

    pub fn conflicting_requirements(importer: &ModuleId, module: &ModuleId, span: Option<SourceSpan>) -> Self {
        Self::new(
            DiagnosticKind::ConflictingRequirements,
            DiagnosticSeverity::Error,
            format!("{importer} loads {module} synchronously, but {module} is an async module"),
        )
        .in_module(importer.clone())
        .at(span)
        .with_help(format!(
            "use `import()` or a static `import` in {importer}, or remove the top-level await from {module}"
        ))
        .with_context(DiagnosticContext::ConflictingRequirements {
            importer: importer.to_string(),
            module: module.to_string(),
        })
    }

    pub fn missing_export(
        importer: &ModuleId,
        module: &ModuleId,
        export_name: &str,
        available_exports: Vec<String>,
        span: Option<SourceSpan>,
    ) -> Self {
        let help = if available_exports.is_empty() {
            format!("{module} has no exports")
        } else {
            format!("available exports: {}", available_exports.join(", "))
        };
        Self::new(
            DiagnosticKind::MissingExport,
            DiagnosticSeverity::Error,
            format!("'{export_name}' is not exported by {module}"),
        )
        .in_module(importer.clone())
        .at(span)
        .with_help(help)
        .with_context(DiagnosticContext::MissingExport {
            export_name: export_name.to_string(),
            importer: importer.to_string(),
            module: module.to_string(),
            available_exports,
        })
    }

    pub fn graph_integrity(message: impl Into<String>, module: Option<ModuleId>) -> Self {
        let mut diagnostic = Self::new(
            DiagnosticKind::GraphIntegrity,
            DiagnosticSeverity::Error,
            message,
        );
        diagnostic.module_id = module;
        diagnostic
    }

    pub fn cache_compute(scope: &str, module: &ModuleId, error: &dyn std::error::Error) -> Self {
        Self::new(
            DiagnosticKind::CacheCompute,
            DiagnosticSeverity::Error,
            format!("{scope} for {module} failed: {error}"),
        )
        .in_module(module.clone())
        .with_help("the entry was not cached and is recomputed on the next build")
        .with_context(DiagnosticContext::CacheCompute {
            scope: scope.to_string(),
            identifier: module.to_string(),
        })
    }

    pub fn is_error(&self) -> bool {
        self.severity == DiagnosticSeverity::Error
    }
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.kind, self.message)
    }
}

impl std::error::Error for Diagnostic {}

/// Receiver of build diagnostics.
pub trait DiagnosticSink: Send + Sync {
    fn report(&self, diagnostic: Diagnostic);
}

impl<S: DiagnosticSink + ?Sized> DiagnosticSink for Arc<S> {
    fn report(&self, diagnostic: Diagnostic) {
        (**self).report(diagnostic);
    }
}

/// Keeps every diagnostic in memory.
#[derive(Debug, Default)]
pub struct CollectingSink {
    diagnostics: Mutex<Vec<Diagnostic>>,
}

impl CollectingSink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Remove and return everything reported so far.
    pub fn take(&self) -> Vec<Diagnostic> {
        std::mem::take(&mut *self.diagnostics.lock())
    }

    pub fn snapshot(&self) -> Vec<Diagnostic> {
        self.diagnostics.lock().clone()
    }

    pub fn has_errors(&self) -> bool {
        self.diagnostics.lock().iter().any(Diagnostic::is_error)
    }

    pub fn len(&self) -> usize {
        self.diagnostics.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.diagnostics.lock().is_empty()
    }
}

impl DiagnosticSink for CollectingSink {
    fn report(&self, diagnostic: Diagnostic) {
        self.diagnostics.lock().push(diagnostic);
    }
}

/// Forwards diagnostics to `tracing`.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingSink;

impl DiagnosticSink for TracingSink {
    fn report(&self, diagnostic: Diagnostic) {
        let module = diagnostic
            .module_id
            .as_ref()
            .map(ToString::to_string)
            .unwrap_or_default();
        match diagnostic.severity {
            DiagnosticSeverity::Error => {
                tracing::error!(kind = %diagnostic.kind, module = %module, "{}", diagnostic.message)
            }
            DiagnosticSeverity::Warning => {
                tracing::warn!(kind = %diagnostic.kind, module = %module, "{}", diagnostic.message)
            }
        }
    }
}
