//! File catalog.
//!
//! The local mapping from filename to the ordered fragment-hash list that
//! reassembles it. Entries are written by the upload path (and by the
//! download path once a file has been fetched and verified, so the node can
//! re-serve it). Re-uploading a filename overwrites its entry; the
//! coordinator re-publishes the distributed-index record in that case.

use crate::fragmenter::Fragment;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tokio::sync::RwLock;

/// Metadata describing how to reassemble one file.
///
/// This is the record published to the distributed index: position `i` in
/// `fragment_hashes` is fragment `i`. Created once at fragmentation time and
/// immutable thereafter.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileInfo {
    pub filename: String,
    pub fragment_hashes: Vec<String>,
    pub total_fragments: usize,
}

impl FileInfo {
    /// Build the record for an ordered fragment sequence.
    pub fn from_fragments(filename: &str, fragments: &[Fragment]) -> Self {
        Self {
            filename: filename.to_string(),
            fragment_hashes: fragments.iter().map(|f| f.hash.clone()).collect(),
            total_fragments: fragments.len(),
        }
    }
}

/// Map from filename to `FileInfo`
#[derive(Debug, Default)]
pub struct FileCatalog {
    files: RwLock<HashMap<String, FileInfo>>,
}

impl FileCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or overwrite the entry for `info.filename`, returning the
    /// replaced record if there was one.
    pub async fn insert(&self, info: FileInfo) -> Option<FileInfo> {
        self.files.write().await.insert(info.filename.clone(), info)
    }

    pub async fn get(&self, filename: &str) -> Option<FileInfo> {
        self.files.read().await.get(filename).cloned()
    }

    pub async fn len(&self) -> usize {
        self.files.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.files.read().await.is_empty()
    }

    /// Filenames of all cataloged files, in no particular order.
    pub async fn file_names(&self) -> Vec<String> {
        self.files.read().await.keys().cloned().collect()
    }
}
