//! Miette rendering for build diagnostics.

use std::fmt;

use miette::{LabeledSpan, NamedSource, Severity, SourceCode};

use super::{Diagnostic, DiagnosticKind, DiagnosticSeverity};

fn severity(diagnostic: &Diagnostic) -> Severity {
    match diagnostic.severity {
        DiagnosticSeverity::Error => Severity::Error,
        DiagnosticSeverity::Warning => Severity::Warning,
    }
}

fn label(kind: DiagnosticKind) -> &'static str {
    match kind {
        DiagnosticKind::UnresolvedImport => "unresolved import",
        DiagnosticKind::ConflictingRequirements => "synchronous load of an async module",
        DiagnosticKind::GraphIntegrity => "here",
        DiagnosticKind::CacheCompute => "here",
        DiagnosticKind::MissingExport => "missing export",
    }
}

impl miette::Diagnostic for Diagnostic {
    fn code(&self) -> Option<Box<dyn fmt::Display + '_>> {
        Some(Box::new(self.kind.code()))
    }

    fn severity(&self) -> Option<Severity> {
        Some(severity(self))
    }

    fn help(&self) -> Option<Box<dyn fmt::Display + '_>> {
        self.help
            .as_ref()
            .map(|help| Box::new(help) as Box<dyn fmt::Display + '_>)
    }
}

/// A diagnostic paired with the source text of the module it points into,
/// so miette can underline the offending span.
#[derive(Debug)]
pub struct DiagnosticReport {
    diagnostic: Diagnostic,
    source: Option<NamedSource<String>>,
}

impl DiagnosticReport {
    pub fn new(diagnostic: Diagnostic, source: Option<String>) -> Self {
        let source = source.map(|text| {
            let name = diagnostic
                .module_id
                .as_ref()
                .map(ToString::to_string)
                .unwrap_or_default();
            NamedSource::new(name, text)
        });
        Self { diagnostic, source }
    }

    pub fn diagnostic(&self) -> &Diagnostic {
        &self.diagnostic
    }
}

impl fmt::Display for DiagnosticReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.diagnostic.message)
    }
}

impl std::error::Error for DiagnosticReport {}

impl miette::Diagnostic for DiagnosticReport {
    fn code(&self) -> Option<Box<dyn fmt::Display + '_>> {
        Some(Box::new(self.diagnostic.kind.code()))
    }

    fn severity(&self) -> Option<Severity> {
        Some(severity(&self.diagnostic))
    }

    fn help(&self) -> Option<Box<dyn fmt::Display + '_>> {
        self.diagnostic
            .help
            .as_ref()
            .map(|help| Box::new(help) as Box<dyn fmt::Display + '_>)
    }

    fn source_code(&self) -> Option<&dyn SourceCode> {
        self.source.as_ref().map(|source| source as &dyn SourceCode)
    }

    fn labels(&self) -> Option<Box<dyn Iterator<Item = LabeledSpan> + '_>> {
        // Labels without source text cannot be rendered.
        self.source.as_ref()?;
        let span = self.diagnostic.span?;
        Some(Box::new(std::iter::once(LabeledSpan::new(
            Some(label(self.diagnostic.kind).to_string()),
            span.start as usize,
            span.len() as usize,
        ))))
    }
}

impl Diagnostic {
    /// Convert into a [`miette::Report`], optionally attaching the source of
    /// the module the diagnostic points into.
    pub fn to_report(&self, source: Option<String>) -> miette::Report {
        miette::Report::new(DiagnosticReport::new(self.clone(), source))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use miette::Diagnostic as _;
    use sprig_graph::{ModuleId, SourceSpan};

    #[test]
    fn report_labels_span_when_source_is_known() {
        let importer = ModuleId::new("/src/main.js").unwrap();
        let module = ModuleId::new("/src/tla.js").unwrap();
        let diagnostic =
            Diagnostic::conflicting_requirements(&importer, &module, Some(SourceSpan::new(10, 30)));

        let report = DiagnosticReport::new(diagnostic.clone(), Some("x".repeat(40)));
        let labels: Vec<_> = report.labels().unwrap().collect();
        assert_eq!(labels.len(), 1);
        assert_eq!(labels[0].offset(), 10);
        assert_eq!(labels[0].len(), 20);

        let bare = DiagnosticReport::new(diagnostic, None);
        assert!(bare.labels().is_none());
    }

    #[test]
    fn code_is_namespaced() {
        let diagnostic = Diagnostic::graph_integrity("dangling edge", None);
        let code = miette::Diagnostic::code(&diagnostic).unwrap().to_string();
        assert_eq!(code, "sprig::graph_integrity");
    }
}
