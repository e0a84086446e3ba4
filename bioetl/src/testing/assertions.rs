//! Assertions over hashes and written files.

use crate::record::Value;
use std::path::Path;

/// Asserts a lowercase 64-character hex digest.
pub fn assert_hex64(value: &Value) {
    let text = value.as_str().unwrap_or_default();
    assert!(
        text.len() == 64 && text.chars().all(|c| matches!(c, '0'..='9' | 'a'..='f')),
        "Expected 64-hex digest, got {value:?}"
    );
}

/// Reads a CSV into its header and string rows.
///
/// # Panics
///
/// Panics when the file is missing or malformed.
#[allow(clippy::expect_used)]
pub fn read_csv(path: &Path) -> (Vec<String>, Vec<Vec<String>>) {
    let mut reader = csv::Reader::from_path(path)
        .unwrap_or_else(|e| panic!("cannot open {}: {e}", path.display()));
    let header = reader
        .headers()
        .expect("csv header")
        .iter()
        .map(str::to_string)
        .collect();
    let rows = reader
        .records()
        .map(|r| r.expect("csv row").iter().map(str::to_string).collect())
        .collect();
    (header, rows)
}

/// Asserts the CSV header equals `expected`.
pub fn assert_csv_header(path: &Path, expected: &[String]) {
    let (header, _) = read_csv(path);
    assert_eq!(header, expected, "Unexpected column order in {}", path.display());
}
