use rustc_hash::{FxHashMap as HashMap, FxHashSet as HashSet};

use super::module_id::normalize_path;
use super::{ModuleId, ResolveError};

/// Resolution collaborator used by the graph when adding edges.
///
/// Implementations map a raw specifier in a requesting module to the id of
/// the target module. The graph never touches the filesystem itself.
pub trait Resolver: Send + Sync {
    fn resolve(&self, importer: &ModuleId, specifier: &str) -> Result<ModuleId, ResolveError>;
}

impl<F> Resolver for F
where
    F: Fn(&ModuleId, &str) -> Result<ModuleId, ResolveError> + Send + Sync,
{
    fn resolve(&self, importer: &ModuleId, specifier: &str) -> Result<ModuleId, ResolveError> {
        self(importer, specifier)
    }
}

const PROBE_SUFFIXES: &[&str] = &[
    "",
    ".js",
    ".mjs",
    ".cjs",
    ".ts",
    ".json",
    "/index.js",
    "/index.mjs",
    "/index.ts",
];

/// Resolver over a fixed set of known module ids.
///
/// Relative specifiers are joined with the importer's directory and probed
/// with common extensions; bare specifiers are looked up in an alias table.
#[derive(Debug, Clone, Default)]
pub struct StaticResolver {
    known: HashSet<ModuleId>,
    aliases: HashMap<String, ModuleId>,
}

impl StaticResolver {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_module(mut self, id: ModuleId) -> Self {
        self.known.insert(id);
        self
    }

    pub fn with_modules(mut self, ids: impl IntoIterator<Item = ModuleId>) -> Self {
        self.known.extend(ids);
        self
    }

    pub fn with_alias(mut self, specifier: impl Into<String>, id: ModuleId) -> Self {
        self.known.insert(id.clone());
        self.aliases.insert(specifier.into(), id);
        self
    }

    pub fn insert(&mut self, id: ModuleId) {
        self.known.insert(id);
    }
}

impl Resolver for StaticResolver {
    fn resolve(&self, importer: &ModuleId, specifier: &str) -> Result<ModuleId, ResolveError> {
        if let Some(id) = self.aliases.get(specifier) {
            return Ok(id.clone());
        }

        if specifier.starts_with("virtual:") {
            let id = ModuleId::new_virtual(specifier);
            return if self.known.contains(&id) {
                Ok(id)
            } else {
                Err(ResolveError::NotFound)
            };
        }

        let is_relative = specifier.starts_with("./") || specifier.starts_with("../");
        let base = if is_relative {
            let dir = importer.dir();
            if dir.is_empty() {
                normalize_path(specifier)
            } else {
                normalize_path(&format!("{dir}/{specifier}"))
            }
        } else if specifier.starts_with('/') {
            normalize_path(specifier)
        } else {
            return Err(ResolveError::NotFound);
        };

        for suffix in PROBE_SUFFIXES {
            let candidate = ModuleId::new(format!("{base}{suffix}"))
                .map_err(|err| ResolveError::Invalid(err.to_string()))?;
            if self.known.contains(&candidate) {
                return Ok(candidate);
            }
        }

        Err(ResolveError::NotFound)
    }
}
