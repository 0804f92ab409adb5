use std::sync::Arc;

use serde::{Deserialize, Serialize};

use super::{DependencyEdge, EdgeIdx, Export, ExportList, ModuleId};

/// Module type tag.
///
/// Every piece of kind-specific behaviour is an exhaustive `match` on this
/// enum, so adding a kind is checked by the compiler everywhere it matters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ModuleKind {
    Esm,
    CommonJs,
    Json,
    Asset,
}

impl ModuleKind {
    /// Whether the identity of the exports object is observable by consumers.
    ///
    /// CommonJS modules hand out `module.exports` itself, so any consumer may
    /// compare or mutate it. Other kinds only expose a namespace object that
    /// escapes when a use site says so.
    pub fn exports_identity_observable(self) -> bool {
        match self {
            Self::CommonJs => true,
            Self::Esm | Self::Json | Self::Asset => false,
        }
    }

    /// ESM-shaped namespace objects (getters defined per export).
    pub fn has_namespace_getters(self) -> bool {
        match self {
            Self::Esm => true,
            Self::CommonJs | Self::Json | Self::Asset => false,
        }
    }

    /// Consumers importing by name from this kind need namespace interop.
    pub fn needs_interop(self) -> bool {
        match self {
            Self::Esm => false,
            Self::CommonJs | Self::Json | Self::Asset => true,
        }
    }

    /// Whether exports are known statically or only at runtime.
    pub fn has_static_exports(self) -> bool {
        match self {
            Self::Esm | Self::Json | Self::Asset => true,
            Self::CommonJs => false,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Esm => "esm",
            Self::CommonJs => "commonjs",
            Self::Json => "json",
            Self::Asset => "asset",
        }
    }
}

/// Declared side-effect flag.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SideEffects {
    True,
    False,
    /// Not declared; treated as `True`.
    #[default]
    Unknown,
}

impl SideEffects {
    /// Conservative reading of the flag.
    pub fn assumed(self) -> bool {
        !matches!(self, Self::False)
    }
}

impl From<bool> for SideEffects {
    fn from(value: bool) -> Self {
        if value { Self::True } else { Self::False }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ModuleStatus {
    /// Discovered through an edge or entry, content not applied yet.
    Pending,
    Loaded,
}

/// Module node stored in the graph arena.
#[derive(Debug, Clone)]
pub struct Module {
    pub id: ModuleId,
    pub kind: ModuleKind,
    pub source: Arc<str>,
    pub exports: ExportList,
    /// Specifiers of `export * from` statements, in source order.
    pub star_reexports: Vec<String>,
    pub side_effects: SideEffects,
    /// Module body uses top-level `await`.
    pub top_level_await: bool,
    pub status: ModuleStatus,
    pub(crate) outgoing: Vec<EdgeIdx>,
    pub(crate) incoming: Vec<EdgeIdx>,
}

impl Module {
    pub(crate) fn pending(id: ModuleId) -> Self {
        Self {
            id,
            kind: ModuleKind::Esm,
            source: Arc::from(""),
            exports: ExportList::new(),
            star_reexports: Vec::new(),
            side_effects: SideEffects::Unknown,
            top_level_await: false,
            status: ModuleStatus::Pending,
            outgoing: Vec::new(),
            incoming: Vec::new(),
        }
    }

    pub fn is_loaded(&self) -> bool {
        self.status == ModuleStatus::Loaded
    }

    /// Outgoing edges in declaration order.
    pub fn outgoing(&self) -> &[EdgeIdx] {
        &self.outgoing
    }

    pub fn incoming(&self) -> &[EdgeIdx] {
        &self.incoming
    }
}

/// Loader output for one module: `(source, exports, dependencies, side effects)`.
#[derive(Debug, Clone)]
pub struct ModuleContent {
    pub kind: ModuleKind,
    pub source: Arc<str>,
    pub exports: Vec<Export>,
    pub star_reexports: Vec<String>,
    pub dependencies: Vec<DependencyEdge>,
    pub side_effects: SideEffects,
    pub top_level_await: bool,
}

impl ModuleContent {
    pub fn builder(kind: ModuleKind, source: impl Into<Arc<str>>) -> ModuleContentBuilder {
        ModuleContentBuilder {
            inner: Self {
                kind,
                source: source.into(),
                exports: Vec::new(),
                star_reexports: Vec::new(),
                dependencies: Vec::new(),
                side_effects: SideEffects::Unknown,
                top_level_await: false,
            },
        }
    }
}

/// Builder for [`ModuleContent`].
#[derive(Debug)]
pub struct ModuleContentBuilder {
    inner: ModuleContent,
}

impl ModuleContentBuilder {
    pub fn export(mut self, export: Export) -> Self {
        self.inner.exports.push(export);
        self
    }

    pub fn exports(mut self, exports: impl IntoIterator<Item = Export>) -> Self {
        self.inner.exports.extend(exports);
        self
    }

    /// `export * from "specifier"`. The matching re-export edge must be added
    /// with [`Self::dependency`] as well.
    pub fn star_reexport(mut self, specifier: impl Into<String>) -> Self {
        self.inner.star_reexports.push(specifier.into());
        self
    }

    pub fn dependency(mut self, edge: DependencyEdge) -> Self {
        self.inner.dependencies.push(edge);
        self
    }

    pub fn side_effects(mut self, side_effects: impl Into<SideEffects>) -> Self {
        self.inner.side_effects = side_effects.into();
        self
    }

    pub fn top_level_await(mut self, value: bool) -> Self {
        self.inner.top_level_await = value;
        self
    }

    pub fn build(self) -> ModuleContent {
        self.inner
    }
}
