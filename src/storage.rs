//! Transactional storage layer using RocksDB
//!
//! All ledger writes go through [`LedgerDb::transaction`], which runs a closure inside a
//! pessimistic `TransactionDB` transaction. Rows read with [`TxnScope::lock_json`] stay
//! exclusively locked until commit, so check-then-write sequences serialize.

use crate::errors::{StorageError, VoidError, VoidResult};
use rocksdb::{
    Direction, IteratorMode, Options, Transaction, TransactionDB, TransactionDBOptions,
};
use serde::{de::DeserializeOwned, Serialize};
use std::{path::Path, sync::Arc, time::Duration};

/// Attempts before lock contention is surfaced to the caller
const MAX_TXN_ATTEMPTS: u32 = 5;

/// Lock wait per key before RocksDB reports `TimedOut`
const LOCK_TIMEOUT_MS: i64 = 2_000;

/// Run ledger work on the blocking pool. Transactions may sleep between lock
/// retries and must stay off the async workers.
pub async fn run_blocking<T, F>(op: F) -> VoidResult<T>
where
    T: Send + 'static,
    F: FnOnce() -> VoidResult<T> + Send + 'static,
{
    tokio::task::spawn_blocking(op).await?
}

#[derive(Clone)]
pub struct LedgerDb {
    db: Arc<TransactionDB>,
}

impl LedgerDb {
    pub fn open<P: AsRef<Path>>(path: P) -> VoidResult<Self> {
        let mut opts = Options::default();
        opts.create_if_missing(true);
        opts.set_write_buffer_size(64 * 1024 * 1024);
        opts.set_max_write_buffer_number(4);
        opts.set_compression_type(rocksdb::DBCompressionType::Lz4);

        let mut txn_opts = TransactionDBOptions::default();
        txn_opts.set_txn_lock_timeout(LOCK_TIMEOUT_MS);

        let db = TransactionDB::open(&opts, &txn_opts, path)
            .map_err(|e| StorageError::DatabaseOpenFailed(e.to_string()))?;
        Ok(Self { db: Arc::new(db) })
    }

    /// Read and decode a JSON row outside of any transaction
    pub fn get_json<T: DeserializeOwned>(&self, key: &[u8]) -> VoidResult<Option<T>> {
        let bytes = self
            .db
            .get(key)
            .map_err(|e| StorageError::ReadFailed(e.to_string()))?;
        decode_row(key, bytes)
    }

    /// Prefix scan in key order, at most `limit` rows
    pub fn scan_prefix(&self, prefix: &[u8], limit: usize) -> VoidResult<Vec<(Vec<u8>, Vec<u8>)>> {
        let mut rows = Vec::new();
        let iter = self.db.iterator(IteratorMode::From(prefix, Direction::Forward));
        for item in iter {
            let (key, value) = item.map_err(|e| StorageError::ReadFailed(e.to_string()))?;
            if !key.starts_with(prefix) || rows.len() >= limit {
                break;
            }
            rows.push((key.to_vec(), value.to_vec()));
        }
        Ok(rows)
    }

    /// Run `op` inside a transaction, committing on `Ok`.
    ///
    /// Lock conflicts retry the whole closure with a short backoff; any other error
    /// rolls back and is returned unchanged. The closure must not perform I/O outside
    /// of the transaction since it may run more than once.
    pub fn transaction<T, F>(&self, label: &str, mut op: F) -> VoidResult<T>
    where
        F: FnMut(&TxnScope<'_>) -> VoidResult<T>,
    {
        let mut attempt = 0;
        loop {
            attempt += 1;
            let scope = TxnScope {
                txn: self.db.transaction(),
            };

            let outcome = match op(&scope) {
                Ok(value) => scope
                    .txn
                    .commit()
                    .map(|_| value)
                    .map_err(|e| VoidError::Storage(e.into())),
                Err(e) => {
                    let _ = scope.txn.rollback();
                    Err(e)
                }
            };

            match outcome {
                Err(VoidError::Storage(StorageError::Busy(reason))) if attempt < MAX_TXN_ATTEMPTS => {
                    tracing::debug!(label, attempt, %reason, "transaction contended, retrying");
                    std::thread::sleep(Duration::from_millis(5 * attempt as u64));
                }
                other => return other,
            }
        }
    }
}

/// Handle passed to transaction closures
pub struct TxnScope<'db> {
    txn: Transaction<'db, TransactionDB>,
}

impl<'db> TxnScope<'db> {
    /// Read a row and hold an exclusive lock on its key until commit.
    /// Locks are taken even when the key does not exist yet.
    pub fn lock_json<T: DeserializeOwned>(&self, key: &[u8]) -> VoidResult<Option<T>> {
        let bytes = self
            .txn
            .get_for_update(key, true)
            .map_err(|e| VoidError::Storage(e.into()))?;
        decode_row(key, bytes)
    }

    /// Read a row without locking it (sees this transaction's own writes)
    pub fn read_json<T: DeserializeOwned>(&self, key: &[u8]) -> VoidResult<Option<T>> {
        let bytes = self
            .txn
            .get(key)
            .map_err(|e| VoidError::Storage(e.into()))?;
        decode_row(key, bytes)
    }

    pub fn put_json<T: Serialize>(&self, key: &[u8], value: &T) -> VoidResult<()> {
        let bytes = serde_json::to_vec(value).map_err(|e| {
            StorageError::WriteFailed(format!(
                "Failed to encode {}: {}",
                String::from_utf8_lossy(key),
                e
            ))
        })?;
        self.put_raw(key, &bytes)
    }

    pub fn put_raw(&self, key: &[u8], value: &[u8]) -> VoidResult<()> {
        self.txn
            .put(key, value)
            .map_err(|e| VoidError::Storage(e.into()))
    }

    pub fn delete(&self, key: &[u8]) -> VoidResult<()> {
        self.txn
            .delete(key)
            .map_err(|e| VoidError::Storage(e.into()))
    }
}

fn decode_row<T: DeserializeOwned>(key: &[u8], bytes: Option<Vec<u8>>) -> VoidResult<Option<T>> {
    let Some(bytes) = bytes else {
        return Ok(None);
    };
    serde_json::from_slice(&bytes).map(Some).map_err(|e| {
        VoidError::Storage(StorageError::CorruptedData(format!(
            "Failed to decode {}: {}",
            String::from_utf8_lossy(key),
            e
        )))
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_transaction_commit_and_rollback() {
        let dir = TempDir::new().unwrap();
        let db = LedgerDb::open(dir.path()).unwrap();

        db.transaction("write", |txn| txn.put_json(b"k:1", &41u64)).unwrap();
        assert_eq!(db.get_json::<u64>(b"k:1").unwrap(), Some(41));

        let result: VoidResult<()> = db.transaction("fail", |txn| {
            txn.put_json(b"k:1", &99u64)?;
            Err(VoidError::Validation("abort".into()))
        });
        assert!(result.is_err());
        assert_eq!(db.get_json::<u64>(b"k:1").unwrap(), Some(41));
    }

    #[test]
    fn test_scan_prefix_stops_at_boundary() {
        let dir = TempDir::new().unwrap();
        let db = LedgerDb::open(dir.path()).unwrap();
        db.transaction("seed", |txn| {
            txn.put_raw(b"a:1", b"1")?;
            txn.put_raw(b"a:2", b"2")?;
            txn.put_raw(b"b:1", b"3")
        })
        .unwrap();

        let rows = db.scan_prefix(b"a:", 10).unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[1].0, b"a:2".to_vec());
        assert_eq!(db.scan_prefix(b"a:", 1).unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_run_blocking_surfaces_panics_as_errors() {
        let dir = TempDir::new().unwrap();
        let db = LedgerDb::open(dir.path()).unwrap();

        let writer = db.clone();
        run_blocking(move || writer.transaction("write", |txn| txn.put_json(b"k:1", &7u64)))
            .await
            .unwrap();
        assert_eq!(db.get_json::<u64>(b"k:1").unwrap(), Some(7));

        let err = run_blocking::<(), _>(|| panic!("worker died")).await.unwrap_err();
        assert!(matches!(err, VoidError::TaskFailed(_)));
    }
}
