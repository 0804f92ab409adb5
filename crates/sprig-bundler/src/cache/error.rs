use std::sync::Arc;

/// Error types for cache operations.
///
/// Cloneable so that every caller coalesced onto one computation receives
/// the same failure.
#[derive(Debug, Clone, thiserror::Error)]
pub enum CacheError {
    /// The compute function failed. Only this entry is affected; the next
    /// request for the key computes again.
    #[error("computing {key} failed: {source}")]
    Compute {
        key: String,
        #[source]
        source: Arc<dyn std::error::Error + Send + Sync>,
    },

    /// The computation this caller was waiting on was dropped before it
    /// produced a value.
    #[error("computation of {key} was abandoned before it completed")]
    Cancelled { key: String },

    /// Cache database error.
    #[error("cache storage error: {0}")]
    Storage(String),

    /// A value could not be encoded for storage.
    #[error("cache serialization error: {0}")]
    Serialization(String),
}

impl CacheError {
    /// The compute error, if this is a compute failure of type `E`.
    pub fn compute_source<E: std::error::Error + 'static>(&self) -> Option<&E> {
        match self {
            CacheError::Compute { source, .. } => source.downcast_ref::<E>(),
            _ => None,
        }
    }
}

impl From<redb::Error> for CacheError {
    fn from(err: redb::Error) -> Self {
        CacheError::Storage(err.to_string())
    }
}

impl From<redb::DatabaseError> for CacheError {
    fn from(err: redb::DatabaseError) -> Self {
        CacheError::Storage(err.to_string())
    }
}

impl From<redb::TableError> for CacheError {
    fn from(err: redb::TableError) -> Self {
        CacheError::Storage(err.to_string())
    }
}

impl From<redb::TransactionError> for CacheError {
    fn from(err: redb::TransactionError) -> Self {
        CacheError::Storage(err.to_string())
    }
}

impl From<redb::StorageError> for CacheError {
    fn from(err: redb::StorageError) -> Self {
        CacheError::Storage(err.to_string())
    }
}

impl From<redb::CommitError> for CacheError {
    fn from(err: redb::CommitError) -> Self {
        CacheError::Storage(err.to_string())
    }
}

impl From<std::io::Error> for CacheError {
    fn from(err: std::io::Error) -> Self {
        CacheError::Storage(err.to_string())
    }
}

impl From<bincode::Error> for CacheError {
    fn from(err: bincode::Error) -> Self {
        CacheError::Serialization(err.to_string())
    }
}

/// Result type for cache operations.
pub type CacheResult<T> = std::result::Result<T, CacheError>;
