//! Single-flight cache handle.
//!
//! [`CacheHandle::get_or_compute`] guarantees that concurrent requests for
//! the same key run the compute function once. The first caller becomes the
//! leader; later callers subscribe to a `watch` channel and receive the
//! leader's value or the leader's failure.

use std::collections::BTreeMap;
use std::future::Future;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tokio::sync::watch;

use super::{CacheError, CacheKey, CacheResult, CacheStore, MemoryStore};

/// Reserved storage key holding the generation table. Never a valid
/// [`CacheKey::storage_key`] because scopes cannot start with `\0`.
const GENERATIONS_KEY: &str = "\0sprig\0generations";

#[derive(Clone)]
enum PendingState {
    Running,
    Done(Arc<[u8]>),
    Failed(CacheError),
}

enum Slot {
    Ready(Arc<[u8]>),
    Pending {
        flight: u64,
        rx: watch::Receiver<PendingState>,
    },
}

enum Role {
    Hit(Arc<[u8]>),
    Wait(watch::Receiver<PendingState>),
    Lead {
        flight: u64,
        tx: watch::Sender<PendingState>,
    },
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct GenerationTable {
    current: u64,
    touched: BTreeMap<String, u64>,
}

#[derive(Default)]
struct Counters {
    hits: AtomicU64,
    misses: AtomicU64,
    coalesced: AtomicU64,
    computations: AtomicU64,
    failures: AtomicU64,
}

/// Snapshot of cache activity since the handle was created.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheStats {
    /// Values served from memory or the store without computing.
    pub hits: u64,
    /// Lookups that had to compute.
    pub misses: u64,
    /// Callers that waited on another caller's computation.
    pub coalesced: u64,
    /// Compute functions actually run.
    pub computations: u64,
    /// Compute functions that returned an error.
    pub failures: u64,
}

struct Inner {
    store: Box<dyn CacheStore>,
    slots: DashMap<String, Slot>,
    next_flight: AtomicU64,
    generation: AtomicU64,
    touched: DashMap<String, u64>,
    counters: Counters,
    enabled: bool,
}

/// Shared, cloneable handle to the build cache.
#[derive(Clone)]
pub struct CacheHandle {
    inner: Arc<Inner>,
}

impl std::fmt::Debug for CacheHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CacheHandle")
            .field("enabled", &self.inner.enabled)
            .field("generation", &self.generation())
            .field("slots", &self.inner.slots.len())
            .finish()
    }
}

/// Removes the leader's pending slot if the leader goes away without
/// publishing a value.
struct FlightGuard<'a> {
    slots: &'a DashMap<String, Slot>,
    key: &'a str,
    flight: u64,
    armed: bool,
}

impl FlightGuard<'_> {
    fn disarm(mut self) {
        self.armed = false;
    }
}

impl Drop for FlightGuard<'_> {
    fn drop(&mut self) {
        if self.armed {
            let flight = self.flight;
            self.slots.remove_if(self.key, |_, slot| {
                matches!(slot, Slot::Pending { flight: current, .. } if *current == flight)
            });
        }
    }
}

impl CacheHandle {
    /// Wrap a store. The generation table persisted by an earlier
    /// [`flush`](Self::flush) is restored.
    pub fn new(store: impl CacheStore + 'static) -> Self {
        let table = match store.get(GENERATIONS_KEY) {
            Ok(Some(bytes)) => bincode::deserialize::<GenerationTable>(&bytes).unwrap_or_else(|err| {
                tracing::warn!(error = %err, "discarding unreadable cache generation table");
                GenerationTable::default()
            }),
            Ok(None) => GenerationTable::default(),
            Err(err) => {
                tracing::warn!(error = %err, "failed to read cache generation table");
                GenerationTable::default()
            }
        };

        Self::with_parts(Box::new(store), table, true)
    }

    /// A handle over a fresh [`MemoryStore`].
    pub fn memory() -> Self {
        Self::new(MemoryStore::new())
    }

    /// A handle that never stores anything; every call computes.
    pub fn disabled() -> Self {
        Self::with_parts(Box::new(MemoryStore::new()), GenerationTable::default(), false)
    }

    fn with_parts(store: Box<dyn CacheStore>, table: GenerationTable, enabled: bool) -> Self {
        Self {
            inner: Arc::new(Inner {
                store,
                slots: DashMap::new(),
                next_flight: AtomicU64::new(0),
                generation: AtomicU64::new(table.current),
                touched: table.touched.into_iter().collect(),
                counters: Counters::default(),
                enabled,
            }),
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.inner.enabled
    }

    /// Return the cached value for `key`, computing it at most once.
    ///
    /// Concurrent callers with the same key share one computation. If it
    /// fails, every waiting caller receives the same error and nothing is
    /// cached, so the next call computes again. If the leading caller is
    /// dropped mid-computation, waiters receive [`CacheError::Cancelled`].
    ///
    /// Failing to persist a computed value is logged and otherwise ignored.
    pub async fn get_or_compute<T, F, Fut, E>(&self, key: &CacheKey, compute: F) -> CacheResult<T>
    where
        T: Serialize + DeserializeOwned,
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: std::error::Error + Send + Sync + 'static,
    {
        let inner = &self.inner;

        if !inner.enabled {
            inner.counters.computations.fetch_add(1, Ordering::Relaxed);
            return compute().await.map_err(|err| {
                inner.counters.failures.fetch_add(1, Ordering::Relaxed);
                CacheError::Compute {
                    key: key.to_string(),
                    source: Arc::new(err),
                }
            });
        }

        let storage_key = key.storage_key();
        inner
            .touched
            .insert(storage_key.clone(), inner.generation.load(Ordering::Relaxed));

        let role = match inner.slots.entry(storage_key.clone()) {
            Entry::Occupied(entry) => match entry.get() {
                Slot::Ready(bytes) => Role::Hit(bytes.clone()),
                Slot::Pending { rx, .. } => Role::Wait(rx.clone()),
            },
            Entry::Vacant(entry) => {
                let flight = inner.next_flight.fetch_add(1, Ordering::Relaxed);
                let (tx, rx) = watch::channel(PendingState::Running);
                entry.insert(Slot::Pending { flight, rx });
                Role::Lead { flight, tx }
            }
        };

        match role {
            Role::Hit(bytes) => {
                inner.counters.hits.fetch_add(1, Ordering::Relaxed);
                Ok(bincode::deserialize(&bytes)?)
            }
            Role::Wait(mut rx) => {
                inner.counters.coalesced.fetch_add(1, Ordering::Relaxed);
                let state = match rx
                    .wait_for(|state| !matches!(state, PendingState::Running))
                    .await
                {
                    Ok(state) => state.clone(),
                    Err(_) => {
                        return Err(CacheError::Cancelled {
                            key: key.to_string(),
                        });
                    }
                };
                match state {
                    PendingState::Done(bytes) => Ok(bincode::deserialize(&bytes)?),
                    PendingState::Failed(err) => Err(err),
                    PendingState::Running => Err(CacheError::Cancelled {
                        key: key.to_string(),
                    }),
                }
            }
            Role::Lead { flight, tx } => {
                let guard = FlightGuard {
                    slots: &inner.slots,
                    key: &storage_key,
                    flight,
                    armed: true,
                };

                match inner.store.get(&storage_key) {
                    Ok(Some(bytes)) => match bincode::deserialize::<T>(&bytes) {
                        Ok(value) => {
                            inner.counters.hits.fetch_add(1, Ordering::Relaxed);
                            let bytes: Arc<[u8]> = bytes.into();
                            inner
                                .slots
                                .insert(storage_key.clone(), Slot::Ready(bytes.clone()));
                            guard.disarm();
                            tx.send_replace(PendingState::Done(bytes));
                            return Ok(value);
                        }
                        Err(err) => {
                            tracing::debug!(key = %key, error = %err, "discarding undecodable cache entry");
                        }
                    },
                    Ok(None) => {}
                    Err(err) => {
                        tracing::warn!(key = %key, error = %err, "cache read failed, recomputing");
                    }
                }

                inner.counters.misses.fetch_add(1, Ordering::Relaxed);
                inner.counters.computations.fetch_add(1, Ordering::Relaxed);

                let outcome = compute().await.map_err(|err| CacheError::Compute {
                    key: key.to_string(),
                    source: Arc::new(err),
                });
                let encoded = outcome.and_then(|value| {
                    let bytes: Arc<[u8]> = bincode::serialize(&value)?.into();
                    Ok((value, bytes))
                });

                match encoded {
                    Ok((value, bytes)) => {
                        if let Err(err) = inner.store.set(&storage_key, &bytes) {
                            tracing::warn!(key = %key, error = %err, "failed to persist cache entry");
                        }
                        inner
                            .slots
                            .insert(storage_key.clone(), Slot::Ready(bytes.clone()));
                        guard.disarm();
                        tx.send_replace(PendingState::Done(bytes));
                        Ok(value)
                    }
                    Err(err) => {
                        inner.counters.failures.fetch_add(1, Ordering::Relaxed);
                        drop(guard);
                        tx.send_replace(PendingState::Failed(err.clone()));
                        Err(err)
                    }
                }
            }
        }
    }

    /// Drop every cached etag of `(scope, identifier)`.
    pub fn invalidate(&self, scope: &str, identifier: &str) -> CacheResult<usize> {
        let prefix = CacheKey::prefix(scope, identifier);
        self.inner
            .slots
            .retain(|key, slot| !(key.starts_with(&prefix) && matches!(slot, Slot::Ready(_))));
        self.inner.touched.retain(|key, _| !key.starts_with(&prefix));
        self.inner.store.remove_prefix(&prefix)
    }

    /// Start a new build generation. Entries read or written from now on are
    /// stamped with the returned generation.
    pub fn begin_generation(&self) -> u64 {
        self.inner.generation.fetch_add(1, Ordering::Relaxed) + 1
    }

    pub fn generation(&self) -> u64 {
        self.inner.generation.load(Ordering::Relaxed)
    }

    /// Remove entries not touched during the last `max_age` generations.
    ///
    /// Returns the number of entries removed.
    pub fn collect_garbage(&self, max_age: u64) -> CacheResult<usize> {
        let current = self.generation();
        let mut removed = 0;

        for key in self.inner.store.keys()? {
            if key == GENERATIONS_KEY {
                continue;
            }
            let touched = self.inner.touched.get(&key).map(|entry| *entry).unwrap_or(0);
            if current.saturating_sub(touched) >= max_age {
                self.inner.store.remove(&key)?;
                self.inner.slots.remove(&key);
                self.inner.touched.remove(&key);
                removed += 1;
            }
        }

        if removed > 0 {
            tracing::debug!(removed, generation = current, "collected stale cache entries");
        }
        Ok(removed)
    }

    /// Number of entries in the underlying store.
    pub fn len(&self) -> CacheResult<usize> {
        Ok(self
            .inner
            .store
            .keys()?
            .iter()
            .filter(|key| key.as_str() != GENERATIONS_KEY)
            .count())
    }

    pub fn is_empty(&self) -> CacheResult<bool> {
        Ok(self.len()? == 0)
    }

    /// Persist the generation table and make pending writes durable.
    pub fn flush(&self) -> CacheResult<()> {
        if !self.inner.enabled {
            return Ok(());
        }

        let table = GenerationTable {
            current: self.generation(),
            touched: self
                .inner
                .touched
                .iter()
                .map(|entry| (entry.key().clone(), *entry.value()))
                .collect(),
        };
        self.inner
            .store
            .set(GENERATIONS_KEY, &bincode::serialize(&table)?)?;
        self.inner.store.flush()
    }

    pub fn stats(&self) -> CacheStats {
        let counters = &self.inner.counters;
        CacheStats {
            hits: counters.hits.load(Ordering::Relaxed),
            misses: counters.misses.load(Ordering::Relaxed),
            coalesced: counters.coalesced.load(Ordering::Relaxed),
            computations: counters.computations.load(Ordering::Relaxed),
            failures: counters.failures.load(Ordering::Relaxed),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::Etag;

    fn key(identifier: &str) -> CacheKey {
        CacheKey::new("test", identifier, Etag::from_hex("e1"))
    }

    #[tokio::test]
    async fn second_call_is_a_hit() {
        let cache = CacheHandle::memory();

        let first: u32 = cache
            .get_or_compute(&key("a"), || async { Ok::<_, std::io::Error>(7) })
            .await
            .unwrap();
        let second: u32 = cache
            .get_or_compute(&key("a"), || async { Ok::<_, std::io::Error>(8) })
            .await
            .unwrap();

        assert_eq!((first, second), (7, 7));
        assert_eq!(cache.stats().computations, 1);
        assert_eq!(cache.stats().hits, 1);
    }

    #[tokio::test]
    async fn disabled_handle_always_computes() {
        let cache = CacheHandle::disabled();
        for expected in [1u32, 2] {
            let value: u32 = cache
                .get_or_compute(&key("a"), || async move { Ok::<_, std::io::Error>(expected) })
                .await
                .unwrap();
            assert_eq!(value, expected);
        }
        assert_eq!(cache.stats().computations, 2);
        assert!(cache.is_empty().unwrap());
    }

    #[tokio::test]
    async fn invalidate_forces_recompute() {
        let cache = CacheHandle::memory();
        let _: u32 = cache
            .get_or_compute(&key("a"), || async { Ok::<_, std::io::Error>(1) })
            .await
            .unwrap();

        assert_eq!(cache.invalidate("test", "a").unwrap(), 1);

        let value: u32 = cache
            .get_or_compute(&key("a"), || async { Ok::<_, std::io::Error>(2) })
            .await
            .unwrap();
        assert_eq!(value, 2);
    }

    #[test]
    fn generation_key_is_not_counted() {
        let cache = CacheHandle::memory();
        cache.begin_generation();
        cache.flush().unwrap();
        assert_eq!(cache.len().unwrap(), 0);
    }
}
