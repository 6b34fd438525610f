//! Integration tests for fragmentation and reassembly.
//!
//! These exercise the documented size arithmetic end to end, including the
//! reference scenarios: a 5,100-byte file at a 256 KiB fragment size and a
//! 600 KiB file spanning three fragments.

use fragnet::fragmenter::{
    assemble, content_hash, fragment_bytes, fragment_file, FragmentError,
};
use std::fs;
use tempfile::TempDir;

const FRAGMENT_SIZE_256K: usize = 256 * 1024;

fn patterned(len: usize) -> Vec<u8> {
    (0..len).map(|i| ((i * 31 + 7) % 256) as u8).collect()
}

#[test]
fn test_small_file_yields_single_fragment() {
    let data = patterned(5_100);
    let fragments = fragment_bytes(&data, "small.bin", FRAGMENT_SIZE_256K).unwrap();

    assert_eq!(fragments.len(), 1);
    assert_eq!(fragments[0].index, 0);
    assert_eq!(fragments[0].total_fragments, 1);
    assert_eq!(fragments[0].data.len(), 5_100);
    assert_eq!(fragments[0].hash, content_hash(&data));
}

#[test]
fn test_600kib_file_spans_three_fragments() {
    let data = patterned(600 * 1024);
    let fragments = fragment_bytes(&data, "medium.bin", FRAGMENT_SIZE_256K).unwrap();

    assert_eq!(fragments.len(), 3);
    assert_eq!(fragments[0].data.len(), 262_144);
    assert_eq!(fragments[1].data.len(), 262_144);
    assert_eq!(fragments[2].data.len(), 600 * 1024 - 2 * 262_144);
    assert!(fragments.iter().all(|f| f.total_fragments == 3));

    let assembled = assemble(&fragments, 3).unwrap();
    assert_eq!(assembled, data);
}

#[test]
fn test_fragment_count_matches_ceiling_division() {
    for (len, size) in [(1usize, 1usize), (999, 1000), (1000, 1000), (1001, 1000), (10_000, 333)] {
        let data = patterned(len);
        let fragments = fragment_bytes(&data, "count.bin", size).unwrap();
        assert_eq!(
            fragments.len(),
            len.div_ceil(size),
            "wrong count for len={len} size={size}"
        );
    }
}

#[test]
fn test_file_roundtrip_through_disk() {
    let temp_dir = TempDir::new().unwrap();
    let source = temp_dir.path().join("source.dat");
    let data = patterned(70_000);
    fs::write(&source, &data).unwrap();

    let fragments = fragment_file(&source, 16 * 1024).unwrap();
    assert_eq!(fragments.len(), 5);
    assert!(fragments.iter().all(|f| f.filename == "source.dat"));

    let assembled = assemble(&fragments, fragments.len()).unwrap();
    assert_eq!(assembled, data);
}

#[test]
fn test_missing_file_reports_read_error() {
    let temp_dir = TempDir::new().unwrap();
    let missing = temp_dir.path().join("no-such-file.dat");

    let result = fragment_file(&missing, 1024);
    assert!(matches!(result, Err(FragmentError::Read { .. })));
}

#[test]
fn test_subset_of_fragments_is_incomplete() {
    let data = patterned(50_000);
    let fragments = fragment_bytes(&data, "subset.bin", 10_000).unwrap();
    let subset = &fragments[..3];

    let result = assemble(subset, fragments.len());
    assert!(matches!(result, Err(FragmentError::Incomplete { .. })));
}

#[test]
fn test_mutated_fragment_is_integrity_failure() {
    let data = patterned(50_000);
    let mut fragments = fragment_bytes(&data, "mutated.bin", 10_000).unwrap();
    let last = fragments.len() - 1;
    fragments[last].data.push(0x00);

    let result = assemble(&fragments, fragments.len());
    assert!(matches!(result, Err(FragmentError::Integrity { .. })));
}
