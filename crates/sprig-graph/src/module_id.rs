//! Stable module identifiers.

use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

const VIRTUAL_PREFIX: &str = "virtual:";

/// Errors produced when constructing a [`ModuleId`].
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ModuleIdError {
    #[error("module id must not be empty")]
    Empty,

    #[error("module id contains a NUL byte: {0:?}")]
    NulByte(String),
}

/// Stable identifier of a module in the graph.
///
/// The identifier is the resolved path plus optional `?query` and `#fragment`
/// disambiguators, so that one file loaded twice with different queries
/// produces two distinct modules. Virtual modules are prefixed with
/// `virtual:` and skip path normalisation.
///
/// The full string is the ordering key, which makes `ModuleId` suitable as
/// the stable tie-breaker for every deterministic traversal in the crate.
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ModuleId(Arc<str>);

impl ModuleId {
    /// Create a module id from a resolved path (optionally with query/fragment).
    ///
    /// Separators are normalised to `/` and `.`/`..` segments are collapsed.
    ///
    /// ```
    /// use sprig_graph::ModuleId;
    ///
    /// let id = ModuleId::new("src\\utils/../index.js?raw").unwrap();
    /// assert_eq!(id.as_str(), "src/index.js?raw");
    /// assert_eq!(id.query(), Some("raw"));
    /// ```
    pub fn new(raw: impl AsRef<str>) -> Result<Self, ModuleIdError> {
        let raw = raw.as_ref();
        if raw.is_empty() {
            return Err(ModuleIdError::Empty);
        }
        if raw.contains('\0') {
            return Err(ModuleIdError::NulByte(raw.to_string()));
        }
        if raw.starts_with(VIRTUAL_PREFIX) {
            return Ok(Self(Arc::from(raw)));
        }

        let (path, suffix) = split_suffix(raw);
        let normalized = normalize_path(path);
        if normalized.is_empty() {
            return Err(ModuleIdError::Empty);
        }

        Ok(Self(Arc::from(format!("{normalized}{suffix}"))))
    }

    /// Create a virtual module id (`virtual:<name>`).
    pub fn new_virtual(name: impl AsRef<str>) -> Self {
        let name = name.as_ref();
        if name.starts_with(VIRTUAL_PREFIX) {
            Self(Arc::from(name))
        } else {
            Self(Arc::from(format!("{VIRTUAL_PREFIX}{name}")))
        }
    }

    /// Full identifier string.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Returns true for `virtual:` modules.
    pub fn is_virtual(&self) -> bool {
        self.0.starts_with(VIRTUAL_PREFIX)
    }

    /// The path portion, without query and fragment.
    pub fn path(&self) -> &str {
        split_suffix(&self.0).0
    }

    /// The query string (without the leading `?`), if any.
    pub fn query(&self) -> Option<&str> {
        let suffix = split_suffix(&self.0).1;
        let query = suffix.strip_prefix('?')?;
        Some(query.split('#').next().unwrap_or(query))
    }

    /// The fragment (without the leading `#`), if any.
    pub fn fragment(&self) -> Option<&str> {
        let suffix = split_suffix(&self.0).1;
        suffix.find('#').map(|pos| &suffix[pos + 1..])
    }

    /// Directory portion of the path, used to resolve relative specifiers.
    pub fn dir(&self) -> &str {
        let path = self.path();
        match path.rfind('/') {
            Some(0) => "/",
            Some(pos) => &path[..pos],
            None => "",
        }
    }
}

impl fmt::Debug for ModuleId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ModuleId({})", self.0)
    }
}

impl fmt::Display for ModuleId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for ModuleId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl TryFrom<&str> for ModuleId {
    type Error = ModuleIdError;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

/// Split `raw` into `(path, "?query#fragment")`.
fn split_suffix(raw: &str) -> (&str, &str) {
    match raw.find(['?', '#']) {
        Some(pos) => raw.split_at(pos),
        None => (raw, ""),
    }
}

/// Collapse `.`/`..` segments and normalise separators.
///
/// Leading `..` segments that would escape a relative root are preserved.
pub(crate) fn normalize_path(path: &str) -> String {
    let path = path.replace('\\', "/");
    let absolute = path.starts_with('/');
    let mut segments: Vec<&str> = Vec::new();

    for segment in path.split('/') {
        match segment {
            "" | "." => {}
            ".." => match segments.last() {
                Some(last) if *last != ".." => {
                    segments.pop();
                }
                _ if absolute => {}
                _ => segments.push(".."),
            },
            other => segments.push(other),
        }
    }

    let joined = segments.join("/");
    if absolute { format!("/{joined}") } else { joined }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalizes_separators_and_dots() {
        let id = ModuleId::new("./src\\a/./b/../c.js").unwrap();
        assert_eq!(id.as_str(), "src/a/c.js");
        assert_eq!(id.dir(), "src/a");
    }

    #[test]
    fn keeps_query_and_fragment() {
        let id = ModuleId::new("/app/style.css?inline#frag").unwrap();
        assert_eq!(id.path(), "/app/style.css");
        assert_eq!(id.query(), Some("inline"));
        assert_eq!(id.fragment(), Some("frag"));
        assert_eq!(ModuleId::new("/main.js").unwrap().dir(), "/");
    }

    #[test]
    fn virtual_ids_are_untouched() {
        let id = ModuleId::new_virtual("entry/../x.js");
        assert!(id.is_virtual());
        assert_eq!(id.as_str(), "virtual:entry/../x.js");
        assert_eq!(ModuleId::new("virtual:a").unwrap(), ModuleId::new_virtual("a"));
    }

    #[test]
    fn rejects_empty_and_nul() {
        assert_eq!(ModuleId::new(""), Err(ModuleIdError::Empty));
        assert!(matches!(ModuleId::new("a\0b"), Err(ModuleIdError::NulByte(_))));
    }

    #[test]
    fn canonicalization_is_idempotent() {
        for raw in ["a/b/../c", "../x/./y", "/abs/../root", "q.js?x=1"] {
            let once = ModuleId::new(raw).unwrap();
            let twice = ModuleId::new(once.as_str()).unwrap();
            assert_eq!(once, twice, "canonicalization of {raw} is not idempotent");
        }
    }
}
