//! Distributed index client.
//!
//! Publishes and resolves `FileInfo` records through the Kademlia record
//! store. The index key is derived purely from the filename (the SHA-256 of
//! its bytes), making the index a name-to-fragment-list directory: two
//! unrelated files sharing a name collide, and callers that need
//! disambiguation namespace their filenames. Fragment provider
//! announcements use the fragment hash itself as the key.

use crate::catalog::FileInfo;
use crate::networking::NetworkServiceHandle;
use sha2::{Digest, Sha256};
use thiserror::Error;
use tracing::{debug, info};

/// Errors that can occur during index operations
#[derive(Error, Debug)]
pub enum IndexError {
    #[error("failed to publish index record for {filename}: {reason}")]
    Publish { filename: String, reason: String },

    #[error("failed to resolve index record for {filename}: {reason}")]
    Resolve { filename: String, reason: String },

    #[error("index record for {filename} is not valid: {source}")]
    Decode {
        filename: String,
        #[source]
        source: serde_json::Error,
    },
}

/// Index key for a filename: the raw SHA-256 digest of its bytes.
pub fn index_key(filename: &str) -> Vec<u8> {
    Sha256::digest(filename.as_bytes()).to_vec()
}

/// Provider-record key for a fragment hash.
///
/// The hash is already a content identifier, so its byte representation is
/// the key under which holders announce themselves.
pub fn fragment_key(hash: &str) -> Vec<u8> {
    hash.as_bytes().to_vec()
}

/// Client-side access to the distributed index
#[derive(Debug, Clone)]
pub struct IndexClient {
    network: NetworkServiceHandle,
}

impl IndexClient {
    pub fn new(network: NetworkServiceHandle) -> Self {
        Self { network }
    }

    /// Publish `info` under its filename-derived key.
    ///
    /// Failures are surfaced to the caller: an unpublished file is
    /// invisible to every other peer, so the upload path must report it.
    pub async fn publish(&self, info: &FileInfo) -> Result<(), IndexError> {
        let value = serde_json::to_vec(info).map_err(|source| IndexError::Decode {
            filename: info.filename.clone(),
            source,
        })?;

        self.network
            .put_record(index_key(&info.filename), value)
            .await
            .map_err(|e| IndexError::Publish {
                filename: info.filename.clone(),
                reason: e.to_string(),
            })?;

        info!(
            filename = %info.filename,
            fragments = info.total_fragments,
            "Published file record to distributed index"
        );
        Ok(())
    }

    /// Resolve a filename to its published record.
    ///
    /// `Ok(None)` means the key was never published; transport failures and
    /// malformed records are errors, so callers can tell absence apart from
    /// a lookup that could not complete.
    pub async fn resolve(&self, filename: &str) -> Result<Option<FileInfo>, IndexError> {
        let value = self
            .network
            .get_record(index_key(filename))
            .await
            .map_err(|e| IndexError::Resolve {
                filename: filename.to_string(),
                reason: e.to_string(),
            })?;

        let Some(bytes) = value else {
            debug!(filename, "No index record found");
            return Ok(None);
        };

        let info: FileInfo =
            serde_json::from_slice(&bytes).map_err(|source| IndexError::Decode {
                filename: filename.to_string(),
                source,
            })?;

        debug!(
            filename,
            fragments = info.total_fragments,
            "Resolved file record from distributed index"
        );
        Ok(Some(info))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_index_key_is_stable() {
        assert_eq!(index_key("movie.mkv"), index_key("movie.mkv"));
        assert_eq!(index_key("movie.mkv").len(), 32);
    }

    #[test]
    fn test_index_key_differs_per_filename() {
        assert_ne!(index_key("movie.mkv"), index_key("movie2.mkv"));
    }

    #[test]
    fn test_fragment_key_wraps_hash_bytes() {
        let hash = "ab".repeat(32);
        assert_eq!(fragment_key(&hash), hash.as_bytes());
    }

    #[test]
    fn test_file_info_record_roundtrip() {
        let info = FileInfo {
            filename: "archive.tar".to_string(),
            fragment_hashes: vec!["11".repeat(32), "22".repeat(32)],
            total_fragments: 2,
        };

        let bytes = serde_json::to_vec(&info).unwrap();
        let decoded: FileInfo = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(decoded, info);
    }

    #[test]
    fn test_malformed_record_fails_decode() {
        let result: Result<FileInfo, _> = serde_json::from_slice(b"{not json");
        assert!(result.is_err());
    }
}
