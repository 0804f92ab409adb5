//! Storage backends for the build cache.

use dashmap::DashMap;

use super::CacheResult;

/// Byte-level key/value storage underneath a [`CacheHandle`](super::CacheHandle).
///
/// Backends only store bytes; single-flight, encoding and generation
/// tracking live in the handle.
pub trait CacheStore: Send + Sync {
    fn get(&self, key: &str) -> CacheResult<Option<Vec<u8>>>;

    fn set(&self, key: &str, value: &[u8]) -> CacheResult<()>;

    fn remove(&self, key: &str) -> CacheResult<()>;

    /// Every stored key, in no particular order.
    fn keys(&self) -> CacheResult<Vec<String>>;

    /// Make pending writes durable. A no-op for volatile stores.
    fn flush(&self) -> CacheResult<()> {
        Ok(())
    }

    /// Remove every key starting with `prefix`, returning how many were removed.
    fn remove_prefix(&self, prefix: &str) -> CacheResult<usize> {
        let mut removed = 0;
        for key in self.keys()? {
            if key.starts_with(prefix) {
                self.remove(&key)?;
                removed += 1;
            }
        }
        Ok(removed)
    }
}

/// Volatile in-process store.
#[derive(Debug, Default)]
pub struct MemoryStore {
    entries: DashMap<String, Vec<u8>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl CacheStore for MemoryStore {
    fn get(&self, key: &str) -> CacheResult<Option<Vec<u8>>> {
        Ok(self.entries.get(key).map(|entry| entry.value().clone()))
    }

    fn set(&self, key: &str, value: &[u8]) -> CacheResult<()> {
        self.entries.insert(key.to_string(), value.to_vec());
        Ok(())
    }

    fn remove(&self, key: &str) -> CacheResult<()> {
        self.entries.remove(key);
        Ok(())
    }

    fn keys(&self) -> CacheResult<Vec<String>> {
        Ok(self.entries.iter().map(|entry| entry.key().clone()).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn remove_prefix_only_touches_matching_keys() {
        let store = MemoryStore::new();
        store.set("codegen\0a\0e1", b"1").unwrap();
        store.set("codegen\0a\0e2", b"2").unwrap();
        store.set("codegen\0ab\0e1", b"3").unwrap();

        assert_eq!(store.remove_prefix("codegen\0a\0").unwrap(), 2);
        assert_eq!(store.len(), 1);
        assert_eq!(store.get("codegen\0ab\0e1").unwrap(), Some(b"3".to_vec()));
    }
}
