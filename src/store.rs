//! Local fragment store.
//!
//! An in-memory content-addressed map from fragment hash to fragment bytes.
//! Every inbound fragment request is answered from this store, so lookups
//! run concurrently with the upload and download paths that populate it; a
//! read/write lock sized for read-heavy traffic guards the map. Entries are
//! never pruned.

use crate::fragmenter::{content_hash, Fragment};
use std::collections::HashMap;
use thiserror::Error;
use tokio::sync::RwLock;

/// Errors that can occur when inserting into the store
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("fragment {hash} does not hash to its declared identity (computed {computed})")]
    Integrity { hash: String, computed: String },

    #[error("fragment {hash} is already stored with different bytes")]
    HashMismatch { hash: String },
}

/// Content-addressed map from hash to fragment
#[derive(Debug, Default)]
pub struct FragmentStore {
    fragments: RwLock<HashMap<String, Fragment>>,
}

impl FragmentStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a fragment under its content hash.
    ///
    /// The declared hash is recomputed before insertion; a mismatch is
    /// rejected rather than stored. Re-inserting an existing hash with
    /// identical bytes is a no-op; with different bytes it fails, since a
    /// colliding insert is either corruption or a broken producer.
    pub async fn insert(&self, fragment: Fragment) -> Result<(), StoreError> {
        let computed = content_hash(&fragment.data);
        if computed != fragment.hash {
            return Err(StoreError::Integrity {
                hash: fragment.hash,
                computed,
            });
        }

        let mut fragments = self.fragments.write().await;
        if let Some(existing) = fragments.get(&fragment.hash) {
            if existing.data != fragment.data {
                return Err(StoreError::HashMismatch {
                    hash: fragment.hash,
                });
            }
            return Ok(());
        }

        fragments.insert(fragment.hash.clone(), fragment);
        Ok(())
    }

    /// Look up a fragment by hash. Absence is `None`, never an error.
    pub async fn get(&self, hash: &str) -> Option<Fragment> {
        self.fragments.read().await.get(hash).cloned()
    }

    pub async fn contains(&self, hash: &str) -> bool {
        self.fragments.read().await.contains_key(hash)
    }

    pub async fn len(&self) -> usize {
        self.fragments.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.fragments.read().await.is_empty()
    }

    /// Hashes of all stored fragments, in no particular order.
    pub async fn hashes(&self) -> Vec<String> {
        self.fragments.read().await.keys().cloned().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fragmenter::fragment_bytes;
    use std::sync::Arc;

    fn fragment_of(data: &[u8]) -> Fragment {
        fragment_bytes(data, "test.bin", data.len().max(1))
            .unwrap()
            .remove(0)
    }

    #[tokio::test]
    async fn test_get_after_insert() {
        let store = FragmentStore::new();
        let fragment = fragment_of(b"some fragment bytes");

        store.insert(fragment.clone()).await.unwrap();

        let fetched = store.get(&fragment.hash).await.unwrap();
        assert_eq!(fetched.data, fragment.data);
        assert_eq!(store.len().await, 1);
    }

    #[tokio::test]
    async fn test_get_unknown_hash_is_none() {
        let store = FragmentStore::new();
        assert!(store.get("deadbeef").await.is_none());
        assert!(!store.contains("deadbeef").await);
    }

    #[tokio::test]
    async fn test_identical_reinsert_is_noop() {
        let store = FragmentStore::new();
        let fragment = fragment_of(b"idempotent");

        store.insert(fragment.clone()).await.unwrap();
        store.insert(fragment.clone()).await.unwrap();

        assert_eq!(store.len().await, 1);
    }

    #[tokio::test]
    async fn test_conflicting_reinsert_leaves_entry_untouched() {
        let store = FragmentStore::new();
        let fragment = fragment_of(b"original bytes");
        store.insert(fragment.clone()).await.unwrap();

        // An insert claiming the same hash over different bytes never
        // replaces the stored entry.
        let mut conflicting = fragment.clone();
        conflicting.data[0] ^= 0x01;

        let result = store.insert(conflicting).await;
        assert!(result.is_err());

        let stored = store.get(&fragment.hash).await.unwrap();
        assert_eq!(stored.data, fragment.data);
    }

    #[tokio::test]
    async fn test_insert_verifies_declared_hash() {
        let store = FragmentStore::new();
        let mut fragment = fragment_of(b"will be corrupted");
        fragment.data[0] ^= 0xFF;

        let result = store.insert(fragment).await;
        assert!(matches!(result, Err(StoreError::Integrity { .. })));
        assert!(store.is_empty().await);
    }

    #[tokio::test]
    async fn test_concurrent_readers_see_distinct_fragments() {
        let store = Arc::new(FragmentStore::new());

        let mut expected = Vec::new();
        for i in 0..32u32 {
            let fragment = fragment_of(format!("fragment payload {i}").as_bytes());
            expected.push((fragment.hash.clone(), fragment.data.clone()));
            store.insert(fragment).await.unwrap();
        }

        let mut handles = Vec::new();
        for (hash, data) in expected {
            let store = Arc::clone(&store);
            handles.push(tokio::spawn(async move {
                let fetched = store.get(&hash).await.expect("fragment must be present");
                assert_eq!(fetched.data, data);
            }));
        }

        for handle in handles {
            handle.await.unwrap();
        }
    }
}
