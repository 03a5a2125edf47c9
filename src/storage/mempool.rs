//! Pending-transaction pool (mempool) stores
//!
//! The node reaches the pool only through `MempoolStore`. Each call is one
//! critical section; callers combining several calls into a larger
//! read-modify-write must serialise that themselves.

use crate::core::Transaction;
use crate::storage::persistence::{JsonFile, StoreError};
use parking_lot::Mutex;
use std::collections::HashSet;
use std::path::PathBuf;

/// File name of the mempool inside the data directory
pub const MEMPOOL_FILE: &str = "mempool.json";

/// Narrow interface to the pending-transaction pool
pub trait MempoolStore: Send + Sync {
    /// Add transactions after the ones already pending
    fn append(&self, transactions: &[Transaction]) -> Result<(), StoreError>;
    /// Pending transactions in arrival order
    fn list(&self) -> Result<Vec<Transaction>, StoreError>;
    /// Drop every pending transaction
    fn clear(&self) -> Result<(), StoreError>;
    /// Drop the pending transactions with the given hashes
    fn remove(&self, hashes: &[String]) -> Result<(), StoreError>;
}

fn retain_unlisted(pending: &mut Vec<Transaction>, hashes: &[String]) {
    let hashes: HashSet<&str> = hashes.iter().map(String::as_str).collect();
    pending.retain(|tx| !hashes.contains(tx.hash().as_str()));
}

/// Process-local mempool
#[derive(Debug, Default)]
pub struct MemoryMempool {
    pending: Mutex<Vec<Transaction>>,
}

impl MemoryMempool {
    pub fn new() -> Self {
        Self::default()
    }
}

impl MempoolStore for MemoryMempool {
    fn append(&self, transactions: &[Transaction]) -> Result<(), StoreError> {
        self.pending.lock().extend_from_slice(transactions);
        Ok(())
    }

    fn list(&self) -> Result<Vec<Transaction>, StoreError> {
        Ok(self.pending.lock().clone())
    }

    fn clear(&self) -> Result<(), StoreError> {
        self.pending.lock().clear();
        Ok(())
    }

    fn remove(&self, hashes: &[String]) -> Result<(), StoreError> {
        retain_unlisted(&mut self.pending.lock(), hashes);
        Ok(())
    }
}

/// Mempool kept in a JSON array on disk
#[derive(Debug)]
pub struct JsonFileMempool {
    file: Mutex<JsonFile<Vec<Transaction>>>,
}

impl JsonFileMempool {
    pub fn new(path: impl Into<PathBuf>) -> Result<Self, StoreError> {
        Ok(Self {
            file: Mutex::new(JsonFile::new(path)?),
        })
    }

    /// `mempool.json` inside `data_dir`
    pub fn in_dir(data_dir: impl Into<PathBuf>) -> Result<Self, StoreError> {
        Self::new(data_dir.into().join(MEMPOOL_FILE))
    }
}

impl MempoolStore for JsonFileMempool {
    fn append(&self, transactions: &[Transaction]) -> Result<(), StoreError> {
        let file = self.file.lock();
        let mut pending = file.load()?;
        pending.extend_from_slice(transactions);
        file.save(&pending)
    }

    fn list(&self) -> Result<Vec<Transaction>, StoreError> {
        self.file.lock().load()
    }

    fn clear(&self) -> Result<(), StoreError> {
        self.file.lock().save(&Vec::new())
    }

    fn remove(&self, hashes: &[String]) -> Result<(), StoreError> {
        let file = self.file.lock();
        let mut pending = file.load()?;
        retain_unlisted(&mut pending, hashes);
        file.save(&pending)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    fn sample(amount: u64) -> Transaction {
        Transaction::coinbase("miner", amount)
    }

    fn exercise(store: &dyn MempoolStore) {
        assert!(store.list().unwrap().is_empty());

        store.append(&[sample(1), sample(2)]).unwrap();
        store.append(&[sample(3)]).unwrap();
        let amounts: Vec<u64> = store.list().unwrap().iter().map(|t| t.total_output()).collect();
        assert_eq!(amounts, vec![1, 2, 3]);

        store.remove(&[sample(2).hash()]).unwrap();
        assert_eq!(store.list().unwrap().len(), 2);

        store.clear().unwrap();
        assert!(store.list().unwrap().is_empty());
    }

    #[test]
    fn test_memory_mempool() {
        exercise(&MemoryMempool::new());
    }

    #[test]
    fn test_json_file_mempool() {
        let temp_dir = tempfile::tempdir().unwrap();
        exercise(&JsonFileMempool::in_dir(temp_dir.path()).unwrap());
    }

    #[test]
    fn test_json_file_mempool_survives_reopen() {
        let temp_dir = tempfile::tempdir().unwrap();
        JsonFileMempool::in_dir(temp_dir.path())
            .unwrap()
            .append(&[sample(9)])
            .unwrap();

        let reopened = JsonFileMempool::in_dir(temp_dir.path()).unwrap();
        assert_eq!(reopened.list().unwrap(), vec![sample(9)]);
    }

    #[test]
    fn test_concurrent_appends_are_not_lost() {
        let temp_dir = tempfile::tempdir().unwrap();
        let store = Arc::new(JsonFileMempool::in_dir(temp_dir.path()).unwrap());

        let handles: Vec<_> = (0..8)
            .map(|i| {
                let store = Arc::clone(&store);
                std::thread::spawn(move || store.append(&[sample(i)]).unwrap())
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }

        assert_eq!(store.list().unwrap().len(), 8);
    }
}
