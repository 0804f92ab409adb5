use std::fmt::Write as _;

use serde::{Deserialize, Serialize};

use super::SourceSpan;

/// A compile-time constant value an export may be substituted with.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum InlineValue {
    Null,
    Undefined,
    Bool(bool),
    Number(f64),
    String(String),
    /// Object literal whose shape is known and never mutated (`Object.freeze({...})`
    /// or an equivalent `as const` literal).
    FrozenObject(Vec<(String, InlineValue)>),
}

impl InlineValue {
    /// Render the value as JavaScript expression source text.
    ///
    /// ```
    /// use sprig_graph::InlineValue;
    ///
    /// assert_eq!(InlineValue::Number(1.0).to_js(), "1");
    /// assert_eq!(InlineValue::String("a\"b".into()).to_js(), r#""a\"b""#);
    /// assert_eq!(InlineValue::Undefined.to_js(), "void 0");
    /// ```
    pub fn to_js(&self) -> String {
        let mut out = String::new();
        self.write_js(&mut out);
        out
    }

    fn write_js(&self, out: &mut String) {
        match self {
            Self::Null => out.push_str("null"),
            Self::Undefined => out.push_str("void 0"),
            Self::Bool(value) => out.push_str(if *value { "true" } else { "false" }),
            Self::Number(value) => out.push_str(&render_number(*value)),
            Self::String(value) => out.push_str(&quote_string(value)),
            Self::FrozenObject(entries) => {
                out.push_str("Object.freeze({");
                for (i, (key, value)) in entries.iter().enumerate() {
                    if i > 0 {
                        out.push_str(", ");
                    }
                    out.push_str(&quote_string(key));
                    out.push_str(": ");
                    value.write_js(out);
                }
                out.push_str("})");
            }
        }
    }

    /// True for object values, which keep their identity at runtime.
    pub fn is_object(&self) -> bool {
        matches!(self, Self::FrozenObject(_))
    }
}

/// Shortest round-trip rendering of a number, valid in any expression position.
fn render_number(value: f64) -> String {
    if value.is_nan() {
        return "NaN".to_string();
    }
    if value.is_infinite() {
        return if value > 0.0 { "Infinity" } else { "(-Infinity)" }.to_string();
    }
    if value == 0.0 && value.is_sign_negative() {
        return "(-0)".to_string();
    }

    let mut text = String::new();
    let _ = write!(text, "{value}");
    if value < 0.0 { format!("({text})") } else { text }
}

fn quote_string(value: &str) -> String {
    // serde_json escaping is a valid JS string literal except for the
    // line/paragraph separators, which older engines reject inside strings.
    serde_json::to_string(value)
        .unwrap_or_else(|_| format!("\"{}\"", value.escape_default()))
        .replace('\u{2028}', "\\u2028")
        .replace('\u{2029}', "\\u2029")
}

/// Statically known value of a local export.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ExportValue {
    Literal(InlineValue),
    /// Anything computed at runtime.
    Opaque,
}

/// Mutation facts the loader found for a local binding.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Mutation {
    #[default]
    None,
    Reassigned,
    /// Reassigned inside a branch or loop before module evaluation completes.
    ConditionallyReassigned,
}

/// How an export name is bound.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ExportBinding {
    /// `export const name = ...` and friends.
    Local {
        /// Name of the binding inside the module body.
        local: String,
        value: ExportValue,
        mutation: Mutation,
        /// True if the module body itself references the binding.
        locally_referenced: bool,
    },
    /// `export { imported as name } from "specifier"`.
    ReExport { specifier: String, imported: String },
    /// `export * as name from "specifier"`.
    Namespace { specifier: String },
}

/// The `export` keyword of a local declaration, removed during codegen.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExportKeyword {
    pub span: SourceSpan,
    /// `export default <expr>`; codegen turns the keyword into a variable
    /// declaration of the local binding.
    pub default_expression: bool,
}

/// Complete metadata describing a module export.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Export {
    pub name: String,
    pub binding: ExportBinding,
    /// The full declaration statement, when the export owns one.
    pub declaration: Option<SourceSpan>,
    pub keyword: Option<ExportKeyword>,
}

impl Export {
    /// A local export with an opaque value.
    pub fn local(name: impl Into<String>, local: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            binding: ExportBinding::Local {
                local: local.into(),
                value: ExportValue::Opaque,
                mutation: Mutation::None,
                locally_referenced: false,
            },
            declaration: None,
            keyword: None,
        }
    }

    /// A local export bound to a literal value.
    pub fn constant(name: impl Into<String>, value: InlineValue) -> Self {
        let name = name.into();
        let mut export = Self::local(name.clone(), name);
        if let ExportBinding::Local { value: slot, .. } = &mut export.binding {
            *slot = ExportValue::Literal(value);
        }
        export
    }

    /// `export { imported as name } from "specifier"`.
    pub fn re_export(
        name: impl Into<String>,
        specifier: impl Into<String>,
        imported: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            binding: ExportBinding::ReExport {
                specifier: specifier.into(),
                imported: imported.into(),
            },
            declaration: None,
            keyword: None,
        }
    }

    /// `export * as name from "specifier"`.
    pub fn namespace(name: impl Into<String>, specifier: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            binding: ExportBinding::Namespace {
                specifier: specifier.into(),
            },
            declaration: None,
            keyword: None,
        }
    }

    pub fn with_declaration(mut self, span: SourceSpan) -> Self {
        self.declaration = Some(span);
        self
    }

    pub fn with_keyword(mut self, span: SourceSpan) -> Self {
        self.keyword = Some(ExportKeyword {
            span,
            default_expression: false,
        });
        self
    }

    pub fn with_default_keyword(mut self, span: SourceSpan) -> Self {
        self.keyword = Some(ExportKeyword {
            span,
            default_expression: true,
        });
        self
    }

    pub fn with_mutation(mut self, mutation: Mutation) -> Self {
        if let ExportBinding::Local { mutation: slot, .. } = &mut self.binding {
            *slot = mutation;
        }
        self
    }

    pub fn locally_referenced(mut self) -> Self {
        if let ExportBinding::Local {
            locally_referenced, ..
        } = &mut self.binding
        {
            *locally_referenced = true;
        }
        self
    }

    /// Local binding name, for locally declared exports.
    pub fn local_name(&self) -> Option<&str> {
        match &self.binding {
            ExportBinding::Local { local, .. } => Some(local),
            _ => None,
        }
    }

    /// True if the declaration can be dropped without changing behaviour when
    /// the export is unused.
    pub fn is_removable_when_unused(&self) -> bool {
        matches!(
            &self.binding,
            ExportBinding::Local {
                value: ExportValue::Literal(_),
                mutation: Mutation::None,
                locally_referenced: false,
                ..
            }
        ) && self.declaration.is_some()
    }
}

/// Export list of one module.
///
/// The list is append-only once finalized: new names may be added, existing
/// ones can never be replaced. Replacing the list requires invalidating the
/// module first.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ExportList {
    entries: Vec<Export>,
    finalized: bool,
}

impl ExportList {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_finalized(&self) -> bool {
        self.finalized
    }

    pub fn get(&self, name: &str) -> Option<&Export> {
        self.entries.iter().find(|export| export.name == name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.get(name).is_some()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Export> {
        self.entries.iter()
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|export| export.name.as_str())
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Insert or replace an export. Returns `false` if the list is finalized
    /// and `export.name` is already present.
    pub(crate) fn insert(&mut self, export: Export) -> bool {
        match self.entries.iter_mut().find(|e| e.name == export.name) {
            Some(_) if self.finalized => false,
            Some(existing) => {
                *existing = export;
                true
            }
            None => {
                self.entries.push(export);
                true
            }
        }
    }

    pub(crate) fn finalize(&mut self) {
        self.finalized = true;
    }

    pub(crate) fn reset(&mut self) {
        self.entries.clear();
        self.finalized = false;
    }
}

/// Result of asking the graph for a module's exports.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ExportsState<'a> {
    Resolved(&'a ExportList),
    NotYetResolved,
}

impl<'a> ExportsState<'a> {
    pub fn resolved(self) -> Option<&'a ExportList> {
        match self {
            Self::Resolved(list) => Some(list),
            Self::NotYetResolved => None,
        }
    }
}

/// Render `.name` or `["name"]` for a property access on `name`.
pub fn property_access(name: &str) -> String {
    if is_identifier_name(name) {
        format!(".{name}")
    } else {
        format!("[{}]", quote_string(name))
    }
}

fn is_identifier_name(name: &str) -> bool {
    let mut chars = name.chars();
    match chars.next() {
        Some(first) if first.is_alphabetic() || first == '_' || first == '$' => {}
        _ => return false,
    }
    chars.all(|c| c.is_alphanumeric() || c == '_' || c == '$')
}
