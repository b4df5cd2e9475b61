use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

use crate::bail;
use crate::error::{ErrorKind, ProrepError, ProrepResult};
use crate::types::Epoch;

/// Operation kind encoded in a queue entry name.
///
/// `Write` is applied exactly like `Insert` and `Update`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operation {
    Insert,
    Update,
    Write,
    Delete,
}

impl Operation {
    pub fn as_str(&self) -> &'static str {
        match self {
            Operation::Insert => "insert",
            Operation::Update => "update",
            Operation::Write => "write",
            Operation::Delete => "delete",
        }
    }

    pub fn is_delete(&self) -> bool {
        matches!(self, Operation::Delete)
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Operation {
    type Err = ProrepError;

    fn from_str(value: &str) -> ProrepResult<Self> {
        match value {
            "insert" => Ok(Operation::Insert),
            "update" => Ok(Operation::Update),
            "write" => Ok(Operation::Write),
            "delete" => Ok(Operation::Delete),
            other => bail!(
                ErrorKind::MalformedEntry,
                "Unknown operation in queue entry name",
                other
            ),
        }
    }
}

/// A candidate queue entry discovered by listing the queue.
///
/// `seq` is the 1-based discovery position within a poll cycle and is used for reporting only.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueueEntry {
    pub path: PathBuf,
    pub file_name: String,
    pub seq: usize,
}

impl QueueEntry {
    pub fn new(path: PathBuf, seq: usize) -> Self {
        let file_name = path
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_default();

        Self {
            path,
            file_name,
            seq,
        }
    }
}

impl fmt::Display for QueueEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{} '{}'", self.seq, self.path.display())
    }
}

/// Metadata decoded from a queue entry file name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EntryMetadata {
    /// Constant kind marker leading the name (`t` or `1`).
    pub marker: String,
    /// Source-side table name.
    pub table: String,
    pub epoch: Epoch,
    pub operation: Operation,
}
