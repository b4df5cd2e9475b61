//! Metrics emitted while draining the change queue.
//!
//! Nothing is exported unless the binary installs a recorder, so emitting is free otherwise.

use std::sync::Once;

use metrics::{Unit, describe_counter, describe_gauge};

static REGISTER_METRICS: Once = Once::new();

/// Label for the target table name.
pub const TABLE_LABEL: &str = "table";

/// Label for the per-row outcome (`insert`, `update`, `delete`, `skip`).
pub const OUTCOME_LABEL: &str = "outcome";

/// Label for the per-entry disposition.
pub const DISPOSITION_LABEL: &str = "disposition";

/// Counter for rows applied, labelled by table and outcome.
pub const PROREP_ROWS_APPLIED_TOTAL: &str = "prorep_rows_applied_total";

/// Counter for queue entries processed, labelled by disposition.
pub const PROREP_ENTRIES_PROCESSED_TOTAL: &str = "prorep_entries_processed_total";

/// Counter for reconnects performed after a transient disconnect.
pub const PROREP_RECONNECTS_TOTAL: &str = "prorep_reconnects_total";

/// Gauge for the number of entries listed in the last poll cycle.
pub const PROREP_QUEUE_ENTRIES: &str = "prorep_queue_entries";

/// Registers metric descriptions. Safe to call multiple times.
pub fn register_metrics() {
    REGISTER_METRICS.call_once(|| {
        describe_counter!(
            PROREP_ROWS_APPLIED_TOTAL,
            Unit::Count,
            "Rows applied to the target store, by table and outcome"
        );

        describe_counter!(
            PROREP_ENTRIES_PROCESSED_TOTAL,
            Unit::Count,
            "Queue entries processed, by disposition"
        );

        describe_counter!(
            PROREP_RECONNECTS_TOTAL,
            Unit::Count,
            "Reconnects to the target store after a lost connection"
        );

        describe_gauge!(
            PROREP_QUEUE_ENTRIES,
            Unit::Count,
            "Entries found in the queue directory by the last poll cycle"
        );
    });
}
