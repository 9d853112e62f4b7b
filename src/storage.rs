//! Shared persistent store on RocksDB.
//!
//! Every record family lives under its own key prefix and is encoded as a
//! serde_json row. Multi-row mutations go through [`Batch`], which commits
//! atomically; row-level mutual exclusion comes from [`RowLocks`].

use crate::errors::{EngineError, Result};
use dashmap::DashMap;
use rocksdb::{Direction, IteratorMode, Options, WriteBatch, DB};
use serde::{de::DeserializeOwned, Serialize};
use std::{path::Path, sync::Arc};
use tokio::sync::Mutex;

#[derive(Clone)]
pub struct Store {
    db: Arc<DB>,
}

impl Store {
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let mut opts = Options::default();
        opts.create_if_missing(true);
        opts.set_write_buffer_size(64 * 1024 * 1024);
        opts.set_compression_type(rocksdb::DBCompressionType::Lz4);

        let db = DB::open(&opts, path)?;
        Ok(Self { db: Arc::new(db) })
    }

    pub fn get<T: DeserializeOwned>(&self, key: &[u8]) -> Result<Option<T>> {
        match self.db.get(key)? {
            Some(bytes) => {
                let row = serde_json::from_slice(&bytes).map_err(|source| {
                    EngineError::Corrupted {
                        key: String::from_utf8_lossy(key).into_owned(),
                        source,
                    }
                })?;
                Ok(Some(row))
            }
            None => Ok(None),
        }
    }

    pub fn put<T: Serialize>(&self, key: &[u8], value: &T) -> Result<()> {
        self.db.put(key, serde_json::to_vec(value)?)?;
        Ok(())
    }

    pub fn delete(&self, key: &[u8]) -> Result<()> {
        self.db.delete(key)?;
        Ok(())
    }

    /// All rows under `prefix`, in key order.
    pub fn scan_prefix<T: DeserializeOwned>(&self, prefix: &[u8]) -> Result<Vec<(Vec<u8>, T)>> {
        let mut rows = Vec::new();
        let iter = self
            .db
            .iterator(IteratorMode::From(prefix, Direction::Forward));
        for entry in iter {
            let (key, value) = entry?;
            if !key.starts_with(prefix) {
                break;
            }
            let row = serde_json::from_slice(&value).map_err(|source| EngineError::Corrupted {
                key: String::from_utf8_lossy(&key).into_owned(),
                source,
            })?;
            rows.push((key.to_vec(), row));
        }
        Ok(rows)
    }

    pub fn batch(&self) -> Batch {
        Batch {
            inner: WriteBatch::default(),
        }
    }

    /// Commit a batch atomically: all rows land or none do.
    pub fn commit(&self, batch: Batch) -> Result<()> {
        self.db.write(batch.inner)?;
        Ok(())
    }
}

/// Buffered multi-row mutation.
pub struct Batch {
    inner: WriteBatch,
}

impl Batch {
    pub fn put<T: Serialize>(&mut self, key: &[u8], value: &T) -> Result<()> {
        self.inner.put(key, serde_json::to_vec(value)?);
        Ok(())
    }

    pub fn delete(&mut self, key: &[u8]) {
        self.inner.delete(key);
    }
}

/// Keyed async locks serializing read-modify-write sequences on one row.
///
/// Lock keys follow the row keys they guard (`account:…`, `deposit:intent:…`),
/// so two requests touching the same account queue up while unrelated rows
/// proceed in parallel.
#[derive(Clone, Default)]
pub struct RowLocks {
    inner: Arc<DashMap<String, Arc<Mutex<()>>>>,
}

impl RowLocks {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn key(&self, key: &str) -> Arc<Mutex<()>> {
        self.inner
            .entry(key.to_string())
            .or_default()
            .clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::{Deserialize, Serialize};

    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    struct Row {
        name: String,
        value: u64,
    }

    fn temp_store() -> (tempfile::TempDir, Store) {
        let dir = tempfile::tempdir().expect("tempdir");
        let store = Store::open(dir.path()).expect("open store");
        (dir, store)
    }

    #[test]
    fn put_get_roundtrip() {
        let (_dir, store) = temp_store();
        let row = Row {
            name: "teddy".into(),
            value: 420,
        };
        store.put(b"price:name:teddy", &row).unwrap();
        let loaded: Option<Row> = store.get(b"price:name:teddy").unwrap();
        assert_eq!(loaded, Some(row));
    }

    #[test]
    fn scan_prefix_is_key_ordered_and_bounded() {
        let (_dir, store) = temp_store();
        for (name, value) in [("alpha", 1u64), ("beta", 2), ("gamma", 3)] {
            let row = Row {
                name: name.into(),
                value,
            };
            store
                .put(format!("price:name:{name}").as_bytes(), &row)
                .unwrap();
        }
        store
            .put(
                b"pricx:other",
                &Row {
                    name: "out".into(),
                    value: 9,
                },
            )
            .unwrap();

        let rows: Vec<(Vec<u8>, Row)> = store.scan_prefix(b"price:name:").unwrap();
        let names: Vec<_> = rows.iter().map(|(_, r)| r.name.as_str()).collect();
        assert_eq!(names, vec!["alpha", "beta", "gamma"]);
    }

    #[test]
    fn batch_commit_is_all_or_nothing_per_write() {
        let (_dir, store) = temp_store();
        let mut batch = store.batch();
        batch
            .put(
                b"a",
                &Row {
                    name: "a".into(),
                    value: 1,
                },
            )
            .unwrap();
        batch
            .put(
                b"b",
                &Row {
                    name: "b".into(),
                    value: 2,
                },
            )
            .unwrap();
        batch.delete(b"missing");
        store.commit(batch).unwrap();

        assert!(store.get::<Row>(b"a").unwrap().is_some());
        assert!(store.get::<Row>(b"b").unwrap().is_some());
    }
}
