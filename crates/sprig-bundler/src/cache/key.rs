//! Cache keys.
//!
//! A key is `(scope, identifier, etag)`. The scope names the kind of
//! derived data (`"codegen"`, `"chunk"`, ...), the identifier names the
//! subject within that scope and the etag pins the inputs it was derived
//! from.

use std::fmt;

use super::etag::Etag;

/// Separator between key components in the storage encoding.
const SEPARATOR: char = '\0';

/// Identifies one cached value.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CacheKey {
    pub scope: String,
    pub identifier: String,
    pub etag: Etag,
}

impl CacheKey {
    pub fn new(scope: impl Into<String>, identifier: impl Into<String>, etag: Etag) -> Self {
        Self {
            scope: scope.into(),
            identifier: identifier.into(),
            etag,
        }
    }

    /// Flat string used as the key in a [`CacheStore`](super::CacheStore).
    pub fn storage_key(&self) -> String {
        format!(
            "{}{SEPARATOR}{}{SEPARATOR}{}",
            self.scope, self.identifier, self.etag
        )
    }

    /// Prefix shared by every etag of `(scope, identifier)`.
    pub fn prefix(scope: &str, identifier: &str) -> String {
        format!("{scope}{SEPARATOR}{identifier}{SEPARATOR}")
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}@{}", self.scope, self.identifier, self.etag)
    }
}
