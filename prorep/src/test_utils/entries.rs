use std::fs;
use std::path::{Path, PathBuf};

use serde_json::{Value, json};

use crate::queue::fs::PARTIAL_SUFFIX;

/// Publishes an entry named `file_name` into `dir` carrying `rows` under the `tt` key.
///
/// The payload is written to a `_partial` file first and renamed into place, the way the
/// producer publishes entries. Returns the final path.
pub fn write_entry(dir: &Path, file_name: &str, rows: &[Value]) -> PathBuf {
    let payload = json!({ "tt": rows });
    write_raw_entry(dir, file_name, payload.to_string().as_bytes())
}

/// Publishes an entry with arbitrary bytes as payload.
pub fn write_raw_entry(dir: &Path, file_name: &str, contents: &[u8]) -> PathBuf {
    let path = dir.join(file_name);
    let partial = dir.join(format!("{file_name}{PARTIAL_SUFFIX}"));

    fs::write(&partial, contents).expect("failed to write partial entry");
    fs::rename(&partial, &path).expect("failed to publish entry");

    path
}

/// Writes an entry that is still being published and must not be picked up.
pub fn write_partial_entry(dir: &Path, file_name: &str, rows: &[Value]) -> PathBuf {
    let path = dir.join(format!("{file_name}{PARTIAL_SUFFIX}"));
    fs::write(&path, json!({ "tt": rows }).to_string()).expect("failed to write partial entry");

    path
}
