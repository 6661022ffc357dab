//! Content hashing using Blake3

use crate::error::StoreError;
use crate::store::KVStore;
use crate::types::{StoreHash, TxHash};
use blake3::Hasher as Blake3Hasher;

/// Hash raw transaction bytes
pub fn tx_hash(tx_bytes: &[u8]) -> TxHash {
    TxHash(*blake3::hash(tx_bytes).as_bytes())
}

/// StoreHasher computes a commitment over the contents of a store
///
/// Entries are fed to Blake3 in key order with length prefixes, so two stores
/// hash equal exactly when they hold the same key/value pairs.
#[derive(Debug, Clone, Default)]
pub struct StoreHasher {}

impl StoreHasher {
    pub fn new() -> Self {
        Self {}
    }

    /// Hash every entry visible through `store`
    pub fn hash_store(&self, store: &dyn KVStore) -> Result<StoreHash, StoreError> {
        let entries = store.prefix_scan(&[])?;
        Ok(self.hash_entries(&entries))
    }

    /// Hash an already-sorted list of entries
    pub fn hash_entries(&self, entries: &[(Vec<u8>, Vec<u8>)]) -> StoreHash {
        let mut hasher = Blake3Hasher::new();
        hasher.update(&(entries.len() as u64).to_be_bytes());

        for (key, value) in entries {
            hasher.update(&(key.len() as u64).to_be_bytes());
            hasher.update(key);
            hasher.update(&(value.len() as u64).to_be_bytes());
            hasher.update(value);
        }

        StoreHash(*hasher.finalize().as_bytes())
    }
}
