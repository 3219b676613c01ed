//! Test assertions for records and output trees.

use crate::core::{paths, FileRecord};
use ignore::WalkBuilder;
use std::path::Path;

/// Asserts that `records` carry exactly `expected` paths, in any order.
pub fn assert_paths(records: &[FileRecord], expected: &[&str]) {
    let mut actual: Vec<&str> = records.iter().map(|r| r.path.as_str()).collect();
    let mut expected = expected.to_vec();
    actual.sort_unstable();
    expected.sort_unstable();
    assert_eq!(actual, expected, "Record paths differ");
}

/// Asserts that `dir` holds exactly the files `expected` (logical paths).
pub fn assert_output_tree(dir: &Path, expected: &[&str]) {
    let mut actual: Vec<String> = WalkBuilder::new(dir)
        .standard_filters(false)
        .build()
        .filter_map(Result::ok)
        .filter(|entry| entry.file_type().is_some_and(|t| t.is_file()))
        .filter_map(|entry| paths::from_fs_path(dir, entry.path()))
        .collect();
    actual.sort();
    let mut expected: Vec<String> = expected.iter().map(|p| (*p).to_string()).collect();
    expected.sort();
    assert_eq!(actual, expected, "Output tree of '{}' differs", dir.display());
}

/// Reads an output file by logical path.
///
/// # Panics
///
/// Panics if the file cannot be read as UTF-8.
#[must_use]
pub fn read_output(dir: &Path, logical: &str) -> String {
    let path = logical.split('/').fold(dir.to_path_buf(), |p, s| p.join(s));
    std::fs::read_to_string(&path)
        .unwrap_or_else(|e| panic!("Could not read output '{}': {e}", path.display()))
}
