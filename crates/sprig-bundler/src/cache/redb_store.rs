//! redb-backed cache storage.
//!
//! Provides persistent key-value storage using redb, an embedded ACID
//! database. Writes are buffered in memory and committed in a single
//! transaction by [`CacheStore::flush`], so a build pays for one commit no
//! matter how many entries it produced.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use parking_lot::Mutex;
use redb::{Database, ReadableDatabase, ReadableTable, TableDefinition};

use super::{CacheResult, CacheStore};

/// Cache table: maps storage keys to encoded values.
const ENTRIES_TABLE: TableDefinition<&str, &[u8]> = TableDefinition::new("entries");

const DB_FILE: &str = "cache.redb";

/// Persistent cache store using redb.
pub struct RedbStore {
    db: Database,
    path: PathBuf,
    /// `Some` is a pending write, `None` a pending removal.
    pending: Mutex<BTreeMap<String, Option<Vec<u8>>>>,
}

impl RedbStore {
    /// Open or create a cache store in `cache_dir`.
    ///
    /// Creates the directory and database file if they don't exist. The
    /// database file is stored at `<cache_dir>/cache.redb`.
    pub fn open(cache_dir: &Path) -> CacheResult<Self> {
        std::fs::create_dir_all(cache_dir)?;

        let path = cache_dir.join(DB_FILE);
        let db = Database::create(&path)?;

        let write_txn = db.begin_write()?;
        {
            let _ = write_txn.open_table(ENTRIES_TABLE)?;
        }
        write_txn.commit()?;

        tracing::debug!(path = %path.display(), "opened build cache");

        Ok(Self {
            db,
            path,
            pending: Mutex::new(BTreeMap::new()),
        })
    }

    /// Location of the database file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Number of writes not yet committed.
    pub fn pending_len(&self) -> usize {
        self.pending.lock().len()
    }
}

impl CacheStore for RedbStore {
    fn get(&self, key: &str) -> CacheResult<Option<Vec<u8>>> {
        if let Some(pending) = self.pending.lock().get(key) {
            return Ok(pending.clone());
        }

        let read_txn = self.db.begin_read()?;
        let table = read_txn.open_table(ENTRIES_TABLE)?;
        Ok(table.get(key)?.map(|value| value.value().to_vec()))
    }

    fn set(&self, key: &str, value: &[u8]) -> CacheResult<()> {
        self.pending
            .lock()
            .insert(key.to_string(), Some(value.to_vec()));
        Ok(())
    }

    fn remove(&self, key: &str) -> CacheResult<()> {
        self.pending.lock().insert(key.to_string(), None);
        Ok(())
    }

    fn keys(&self) -> CacheResult<Vec<String>> {
        let read_txn = self.db.begin_read()?;
        let table = read_txn.open_table(ENTRIES_TABLE)?;

        let mut keys = std::collections::BTreeSet::new();
        for entry in table.iter()? {
            let (key, _) = entry?;
            keys.insert(key.value().to_string());
        }

        for (key, value) in self.pending.lock().iter() {
            match value {
                Some(_) => keys.insert(key.clone()),
                None => keys.remove(key),
            };
        }

        Ok(keys.into_iter().collect())
    }

    fn flush(&self) -> CacheResult<()> {
        let pending = std::mem::take(&mut *self.pending.lock());
        if pending.is_empty() {
            return Ok(());
        }

        let count = pending.len();
        let write_txn = self.db.begin_write()?;
        {
            let mut table = write_txn.open_table(ENTRIES_TABLE)?;
            for (key, value) in &pending {
                match value {
                    Some(bytes) => {
                        table.insert(key.as_str(), bytes.as_slice())?;
                    }
                    None => {
                        table.remove(key.as_str())?;
                    }
                }
            }
        }
        write_txn.commit()?;

        tracing::debug!(writes = count, "flushed build cache");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn open_creates_directory() {
        let dir = TempDir::new().unwrap();
        let cache_dir = dir.path().join("new_cache");

        let store = RedbStore::open(&cache_dir).unwrap();

        assert!(cache_dir.join("cache.redb").exists());
        assert_eq!(store.path(), cache_dir.join("cache.redb"));
    }

    #[test]
    fn pending_writes_are_visible_before_flush() {
        let dir = TempDir::new().unwrap();
        let store = RedbStore::open(dir.path()).unwrap();

        store.set("a", b"1").unwrap();
        assert_eq!(store.get("a").unwrap(), Some(b"1".to_vec()));
        assert_eq!(store.keys().unwrap(), vec!["a".to_string()]);

        store.remove("a").unwrap();
        assert_eq!(store.get("a").unwrap(), None);
        assert!(store.keys().unwrap().is_empty());
    }

    #[test]
    fn flush_persists_across_reopen() {
        let dir = TempDir::new().unwrap();
        {
            let store = RedbStore::open(dir.path()).unwrap();
            store.set("kept", b"value").unwrap();
            store.set("dropped", b"value").unwrap();
            store.flush().unwrap();
            store.remove("dropped").unwrap();
            store.flush().unwrap();
            assert_eq!(store.pending_len(), 0);
        }

        let reopened = RedbStore::open(dir.path()).unwrap();
        assert_eq!(reopened.get("kept").unwrap(), Some(b"value".to_vec()));
        assert_eq!(reopened.get("dropped").unwrap(), None);
    }

    #[test]
    fn unflushed_writes_are_lost() {
        let dir = TempDir::new().unwrap();
        {
            let store = RedbStore::open(dir.path()).unwrap();
            store.set("volatile", b"value").unwrap();
        }

        let reopened = RedbStore::open(dir.path()).unwrap();
        assert_eq!(reopened.get("volatile").unwrap(), None);
    }
}
