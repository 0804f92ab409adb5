use serde::{Deserialize, Serialize};

use super::{ModuleIdx, SourceSpan};

/// How a dependency is loaded.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum EdgeCategory {
    /// Static `import` / `export ... from`.
    Esm,
    /// Synchronous `require()`.
    CommonJs,
    /// `import()`; the target may live in an async chunk.
    Dynamic,
    /// Lazy reference that does not force the target to load.
    Weak,
    /// Reflective access the loader could not classify.
    Unknown,
}

impl EdgeCategory {
    /// True when the dependency must be available synchronously.
    pub fn is_sync(self) -> bool {
        matches!(self, Self::Esm | Self::CommonJs | Self::Unknown)
    }

    /// True for edges that start a new chunk group.
    pub fn is_async(self) -> bool {
        matches!(self, Self::Dynamic | Self::Weak)
    }
}

/// A single `imported as local` pair of a named import.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ImportedBinding {
    pub imported: String,
    pub local: String,
}

impl ImportedBinding {
    pub fn new(imported: impl Into<String>, local: impl Into<String>) -> Self {
        Self {
            imported: imported.into(),
            local: local.into(),
        }
    }
}

/// What a dependency edge binds from its target.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ImportedNames {
    Named(Vec<ImportedBinding>),
    /// `import * as ns`, `require(...)` used as a value, `import(...)`.
    Namespace,
    /// `import "./polyfill"`.
    SideEffectOnly,
    /// `export ... from`; usage flows through the re-exporting module's
    /// export bindings instead of through the edge.
    ReExport,
}

/// Identifies a use site within its module.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct UseSiteId(pub u32);

/// One property of a destructuring pattern over an imported namespace.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DestructuredProperty {
    pub export: String,
    pub local: String,
}

impl DestructuredProperty {
    pub fn new(export: impl Into<String>, local: impl Into<String>) -> Self {
        Self {
            export: export.into(),
            local: local.into(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DeclarationKind {
    Const,
    Let,
    Var,
}

impl DeclarationKind {
    pub fn keyword(self) -> &'static str {
        match self {
            Self::Const => "const",
            Self::Let => "let",
            Self::Var => "var",
        }
    }
}

/// How the consuming module touches an imported binding.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum UseSiteKind {
    /// Direct read of one export, e.g. `CONST_A` or `ns.CONST_A`. The span
    /// covers the whole expression that evaluates to the export.
    Reference { export: String },
    /// `const { A, B: b } = require("./m")`. The span covers the whole
    /// declaration statement.
    Destructure {
        declaration: DeclarationKind,
        properties: Vec<DestructuredProperty>,
    },
    /// `x[key]`; `export` is the export the access is performed on, or `None`
    /// when the namespace object itself is indexed.
    ComputedMember { export: Option<String> },
    /// The binding is visible to a direct `eval`.
    Eval,
    /// The namespace object flows into code the analysis cannot follow.
    NamespaceEscape,
}

impl UseSiteKind {
    /// Exports this use site reads by name.
    pub fn exports(&self) -> Vec<&str> {
        match self {
            Self::Reference { export } => vec![export.as_str()],
            Self::Destructure { properties, .. } => {
                properties.iter().map(|p| p.export.as_str()).collect()
            }
            Self::ComputedMember {
                export: Some(export),
            } => vec![export.as_str()],
            Self::ComputedMember { export: None } | Self::Eval | Self::NamespaceEscape => {
                Vec::new()
            }
        }
    }

    /// True if the set of accessed exports is statically known.
    pub fn is_static(&self) -> bool {
        matches!(
            self,
            Self::Reference { .. }
                | Self::Destructure { .. }
                | Self::ComputedMember { export: Some(_) }
        )
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UseSite {
    pub id: UseSiteId,
    pub kind: UseSiteKind,
    pub span: Option<SourceSpan>,
}

impl UseSite {
    pub fn new(id: u32, kind: UseSiteKind) -> Self {
        Self {
            id: UseSiteId(id),
            kind,
            span: None,
        }
    }

    pub fn reference(id: u32, export: impl Into<String>) -> Self {
        Self::new(
            id,
            UseSiteKind::Reference {
                export: export.into(),
            },
        )
    }

    pub fn at(mut self, span: SourceSpan) -> Self {
        self.span = Some(span);
        self
    }
}

/// One import/require site, as declared by the loader.
///
/// `span` covers the statement or call expression that performs the import.
/// It is `None` when every use of the import is already covered by a use
/// site span (e.g. `const { a } = require("./m")`).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DependencyEdge {
    pub specifier: String,
    pub imported: ImportedNames,
    pub category: EdgeCategory,
    /// The edge must be kept even if none of its bindings are used.
    pub critical: bool,
    pub span: Option<SourceSpan>,
    pub use_sites: Vec<UseSite>,
    /// `webpackChunkName`-style hint for async chunks.
    pub chunk_name: Option<String>,
}

impl DependencyEdge {
    pub fn new(specifier: impl Into<String>, category: EdgeCategory, imported: ImportedNames) -> Self {
        Self {
            specifier: specifier.into(),
            imported,
            category,
            critical: false,
            span: None,
            use_sites: Vec::new(),
            chunk_name: None,
        }
    }

    /// `import { a, b as c } from "specifier"`.
    pub fn esm_named<I, S>(specifier: impl Into<String>, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let bindings = names
            .into_iter()
            .map(|name| {
                let name = name.into();
                ImportedBinding::new(name.clone(), name)
            })
            .collect();
        Self::new(specifier, EdgeCategory::Esm, ImportedNames::Named(bindings))
    }

    pub fn esm_namespace(specifier: impl Into<String>) -> Self {
        Self::new(specifier, EdgeCategory::Esm, ImportedNames::Namespace)
    }

    pub fn side_effect(specifier: impl Into<String>) -> Self {
        Self::new(specifier, EdgeCategory::Esm, ImportedNames::SideEffectOnly)
    }

    pub fn re_export(specifier: impl Into<String>) -> Self {
        Self::new(specifier, EdgeCategory::Esm, ImportedNames::ReExport)
    }

    pub fn require(specifier: impl Into<String>) -> Self {
        Self::new(specifier, EdgeCategory::CommonJs, ImportedNames::Namespace)
    }

    pub fn dynamic(specifier: impl Into<String>) -> Self {
        Self::new(specifier, EdgeCategory::Dynamic, ImportedNames::Namespace)
    }

    pub fn weak(specifier: impl Into<String>) -> Self {
        Self::new(specifier, EdgeCategory::Weak, ImportedNames::Namespace)
    }

    pub fn critical(mut self) -> Self {
        self.critical = true;
        self
    }

    pub fn at(mut self, span: SourceSpan) -> Self {
        self.span = Some(span);
        self
    }

    pub fn with_use_site(mut self, site: UseSite) -> Self {
        self.use_sites.push(site);
        self
    }

    pub fn with_chunk_name(mut self, name: impl Into<String>) -> Self {
        self.chunk_name = Some(name.into());
        self
    }

    /// Named bindings, if the edge imports by name.
    pub fn named_bindings(&self) -> &[ImportedBinding] {
        match &self.imported {
            ImportedNames::Named(bindings) => bindings,
            _ => &[],
        }
    }
}

/// Where an edge points after resolution.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EdgeTarget {
    Resolved(ModuleIdx),
    Unresolved,
}

impl EdgeTarget {
    pub fn module(self) -> Option<ModuleIdx> {
        match self {
            Self::Resolved(idx) => Some(idx),
            Self::Unresolved => None,
        }
    }
}

/// A dependency edge stored in the graph arena.
#[derive(Debug, Clone, PartialEq)]
pub struct GraphEdge {
    pub from: ModuleIdx,
    pub target: EdgeTarget,
    pub edge: DependencyEdge,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn static_use_sites_list_their_exports() {
        let destructure = UseSiteKind::Destructure {
            declaration: DeclarationKind::Const,
            properties: vec![
                DestructuredProperty::new("CONST_A", "CONST_A"),
                DestructuredProperty::new("LIVE_B", "b"),
            ],
        };
        assert!(destructure.is_static());
        assert_eq!(destructure.exports(), ["CONST_A", "LIVE_B"]);

        assert!(!UseSiteKind::ComputedMember { export: None }.is_static());
        assert!(!UseSiteKind::NamespaceEscape.is_static());
        assert!(UseSiteKind::Eval.exports().is_empty());
    }

    #[test]
    fn categories_split_sync_and_async() {
        assert!(EdgeCategory::Esm.is_sync());
        assert!(EdgeCategory::CommonJs.is_sync());
        assert!(EdgeCategory::Dynamic.is_async());
        assert!(EdgeCategory::Weak.is_async());
        assert!(!EdgeCategory::Weak.is_sync());
    }
}
