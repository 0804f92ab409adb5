//! Span-based source edits.

use sprig_graph::{ModuleId, SourceSpan};

use super::CodegenError;

#[derive(Debug, Clone, PartialEq, Eq)]
struct Edit {
    span: SourceSpan,
    text: String,
}

/// Replacements over one module's source, applied back to front so earlier
/// offsets stay valid.
#[derive(Debug, Default)]
pub(crate) struct EditSet {
    edits: Vec<Edit>,
}

impl EditSet {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn replace(&mut self, span: SourceSpan, text: impl Into<String>) {
        self.edits.push(Edit {
            span,
            text: text.into(),
        });
    }

    pub(crate) fn remove(&mut self, span: SourceSpan) {
        self.replace(span, "");
    }

    /// Apply every edit to `source`.
    ///
    /// Identical edits collapse into one. Overlapping edits and spans outside
    /// `source` or off a character boundary are integrity errors.
    pub(crate) fn apply(mut self, source: &str, module: &ModuleId) -> Result<String, CodegenError> {
        self.edits.sort_by_key(|edit| (edit.span.start, edit.span.end));
        self.edits.dedup();

        for edit in &self.edits {
            if edit.span.slice(source).is_none() {
                return Err(CodegenError::integrity(
                    module,
                    format!("edit span {} is outside the module source", edit.span),
                ));
            }
        }
        for pair in self.edits.windows(2) {
            if pair[0].span.end > pair[1].span.start {
                return Err(CodegenError::integrity(
                    module,
                    format!("overlapping edits at {} and {}", pair[0].span, pair[1].span),
                ));
            }
        }

        let mut output = source.to_string();
        for edit in self.edits.iter().rev() {
            output.replace_range(edit.span.start as usize..edit.span.end as usize, &edit.text);
        }
        Ok(output)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn module() -> ModuleId {
        ModuleId::new("/src/a.js").unwrap()
    }

    #[test]
    fn applies_back_to_front() {
        let source = "import a from 'a';\nuse(a);";
        let mut edits = EditSet::new();
        edits.remove(SourceSpan::new(0, 18));
        edits.replace(SourceSpan::new(23, 24), "__sprig_import_0__.default");

        let output = edits.apply(source, &module()).unwrap();
        assert_eq!(output, "\nuse(__sprig_import_0__.default);");
    }

    #[test]
    fn overlapping_edits_are_rejected() {
        let mut edits = EditSet::new();
        edits.remove(SourceSpan::new(0, 5));
        edits.replace(SourceSpan::new(3, 8), "x");

        let error = edits.apply("0123456789", &module()).unwrap_err();
        assert!(matches!(error, CodegenError::GraphIntegrity { .. }));
    }

    #[test]
    fn duplicate_edits_collapse() {
        let mut edits = EditSet::new();
        edits.remove(SourceSpan::new(0, 2));
        edits.remove(SourceSpan::new(0, 2));
        assert_eq!(edits.apply("abc", &module()).unwrap(), "c");
    }

    #[test]
    fn out_of_bounds_is_an_integrity_error() {
        let mut edits = EditSet::new();
        edits.remove(SourceSpan::new(2, 10));
        assert!(edits.apply("abc", &module()).is_err());
    }
}
