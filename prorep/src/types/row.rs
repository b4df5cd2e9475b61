use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

/// Name of the payload key holding the change row sequence.
pub const PAYLOAD_ROWS_KEY: &str = "tt";

/// Field carrying the stable row identity inside a change row.
pub const REC_ID_FIELD: &str = "rec_id";

/// Field carrying the logical timestamp inside a change row.
pub const EPOCH_TIME_FIELD: &str = "epoch_time";

/// Stable identity of a source row, stored in the target's primary-key column.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RecId(pub i64);

impl RecId {
    pub fn into_inner(self) -> i64 {
        self.0
    }
}

impl fmt::Display for RecId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Producer-assigned logical timestamp used as the conflict-resolution clock.
///
/// Epochs are only comparable for the same [`RecId`]; they are not synchronized across
/// producers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Epoch(pub i64);

impl Epoch {
    pub fn into_inner(self) -> i64 {
        self.0
    }
}

impl fmt::Display for Epoch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// One logical row mutation carried inside a queue entry payload.
///
/// Every key other than `rec_id` and `epoch_time` is a source column name. Delete payloads
/// usually carry no columns at all.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChangeRow {
    pub rec_id: RecId,
    pub epoch_time: Epoch,
    #[serde(flatten)]
    pub columns: BTreeMap<String, serde_json::Value>,
}

impl ChangeRow {
    pub fn new(rec_id: i64, epoch_time: i64) -> Self {
        Self {
            rec_id: RecId(rec_id),
            epoch_time: Epoch(epoch_time),
            columns: BTreeMap::new(),
        }
    }

    /// Adds a source column value, returning the row for chaining.
    pub fn with_column(mut self, name: impl Into<String>, value: serde_json::Value) -> Self {
        self.columns.insert(name.into(), value);
        self
    }
}

/// Body of a queue entry file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Payload {
    pub tt: Vec<ChangeRow>,
}
