//! Fragmentation and reassembly.
//!
//! A file is split into contiguous fixed-size windows; each window becomes a
//! `Fragment` addressed by the SHA-256 of its bytes. Reassembly sorts the
//! fragments by index, checks the index range for gaps and duplicates,
//! re-verifies every content hash, and concatenates the data in order.

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Errors that can occur during fragmentation or reassembly
#[derive(Error, Debug)]
pub enum FragmentError {
    #[error("failed to read source file {path:?}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("fragment size must be greater than zero")]
    InvalidFragmentSize,

    #[error("incomplete fragment set: {reason}")]
    Incomplete { reason: String },

    #[error("integrity failure on fragment {index}: declared hash {declared}, computed {computed}")]
    Integrity {
        index: usize,
        declared: String,
        computed: String,
    },
}

/// A hashed, ordered chunk of a file's byte sequence.
///
/// `hash` is the lowercase hex SHA-256 digest of `data` and is the fragment's
/// identity everywhere: in the local store, in published catalogs, and on the
/// wire.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Fragment {
    pub hash: String,
    pub data: Vec<u8>,
    /// Zero-based position within the parent file's fragment sequence
    pub index: usize,
    /// Count of fragments composing the parent file
    pub total_fragments: usize,
    /// Originating file's identifier
    pub filename: String,
}

impl Fragment {
    /// Recompute the content hash and compare it against the declared one.
    pub fn verify(&self) -> Result<(), FragmentError> {
        let computed = content_hash(&self.data);
        if computed != self.hash {
            return Err(FragmentError::Integrity {
                index: self.index,
                declared: self.hash.clone(),
                computed,
            });
        }
        Ok(())
    }
}

/// Lowercase hex SHA-256 digest of `data`.
pub fn content_hash(data: &[u8]) -> String {
    hex::encode(Sha256::digest(data))
}

/// Split `data` into fragments of at most `fragment_size` bytes.
///
/// Windows are contiguous and non-overlapping; the final window is truncated
/// to the remaining byte count. A zero-byte input yields zero fragments,
/// which is a valid (empty) file.
pub fn fragment_bytes(
    data: &[u8],
    filename: &str,
    fragment_size: usize,
) -> Result<Vec<Fragment>, FragmentError> {
    if fragment_size == 0 {
        return Err(FragmentError::InvalidFragmentSize);
    }

    let total_fragments = data.len().div_ceil(fragment_size);
    let mut fragments = Vec::with_capacity(total_fragments);

    for index in 0..total_fragments {
        let start = index * fragment_size;
        let end = (start + fragment_size).min(data.len());
        let window = data[start..end].to_vec();

        fragments.push(Fragment {
            hash: content_hash(&window),
            data: window,
            index,
            total_fragments,
            filename: filename.to_string(),
        });
    }

    Ok(fragments)
}

/// Read a file and split it into fragments.
///
/// The whole file is buffered in memory before windowing. The filename
/// recorded on the fragments is the final path component.
pub fn fragment_file<P: AsRef<Path>>(
    path: P,
    fragment_size: usize,
) -> Result<Vec<Fragment>, FragmentError> {
    let path = path.as_ref();
    let data = fs::read(path).map_err(|source| FragmentError::Read {
        path: path.to_path_buf(),
        source,
    })?;
    fragment_bytes(&data, &file_name_of(path), fragment_size)
}

/// The filename a path contributes to fragment and catalog records.
pub fn file_name_of(path: &Path) -> String {
    path.file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.to_string_lossy().into_owned())
}

/// Reassemble the original byte sequence from `fragments`.
///
/// The input may arrive in any order. Fails with `Incomplete` unless the
/// fragment indices form exactly `0..expected_total`, and with `Integrity`
/// if any fragment's data no longer matches its declared hash. Pure
/// function, no side effects.
pub fn assemble(fragments: &[Fragment], expected_total: usize) -> Result<Vec<u8>, FragmentError> {
    if fragments.len() != expected_total {
        return Err(FragmentError::Incomplete {
            reason: format!("have {} fragments, expected {}", fragments.len(), expected_total),
        });
    }

    let mut ordered: Vec<&Fragment> = fragments.iter().collect();
    ordered.sort_by_key(|fragment| fragment.index);

    // After sorting, position i must hold index i; anything else means a
    // gap or a duplicate.
    for (position, fragment) in ordered.iter().enumerate() {
        if fragment.index != position {
            return Err(FragmentError::Incomplete {
                reason: format!(
                    "fragment indices are not contiguous: expected index {} at position {}, found {}",
                    position, position, fragment.index
                ),
            });
        }
    }

    for fragment in &ordered {
        fragment.verify()?;
    }

    let total_len = ordered.iter().map(|fragment| fragment.data.len()).sum();
    let mut assembled = Vec::with_capacity(total_len);
    for fragment in &ordered {
        assembled.extend_from_slice(&fragment.data);
    }

    Ok(assembled)
}
