//! Incremental build cache.
//!
//! Generated module code is cached under content-addressed keys, so
//! invalidation is automatic: when any input of a value changes its etag
//! changes and the old entry is simply never asked for again. Stale entries
//! are dropped by generation-based garbage collection.
//!
//! # Architecture
//!
//! - **[`Etag`]**: BLAKE3 digests over module content, chunk membership and
//!   the facts code generation reads
//! - **[`CacheHandle`]**: single-flight `get_or_compute`, shared by every
//!   task of a build
//! - **[`CacheStore`]**: byte storage; [`MemoryStore`] for one process,
//!   [`RedbStore`] for a single-file database that survives restarts
//! - **[`ChangeDetector`]**: decides which loaded modules must be applied to
//!   the graph again

pub mod changes;
mod error;
pub mod etag;
mod handle;
mod key;
mod redb_store;
mod store;

pub use changes::{ChangeDetector, ContentHash};
pub use error::{CacheError, CacheResult};
pub use etag::{Etag, chunk_etag, codegen_etag, content_hash, merge_etags, module_etag};
pub use handle::{CacheHandle, CacheStats};
pub use key::CacheKey;
pub use redb_store::RedbStore;
pub use store::{CacheStore, MemoryStore};
