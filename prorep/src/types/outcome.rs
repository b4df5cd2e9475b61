use std::fmt;
use std::ops::AddAssign;

use uuid::Uuid;

use crate::types::Operation;

/// Result of applying a single change row.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RowOutcome {
    Insert,
    Update,
    Delete,
    /// The stored row is at least as new as the incoming one, or there is nothing to delete.
    Skip,
}

impl RowOutcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            RowOutcome::Insert => "insert",
            RowOutcome::Update => "update",
            RowOutcome::Delete => "delete",
            RowOutcome::Skip => "skip",
        }
    }
}

/// How a queue entry was handled by the worker that picked it up.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Disposition {
    /// Rows were applied (possibly zero of them).
    Applied,
    /// The entry was already claimed and was left alone.
    Locked,
    /// The file name did not decode. The file is preserved.
    MalformedEntry,
    /// The payload did not parse. The file is preserved.
    UnreadablePayload,
}

impl Disposition {
    pub fn as_str(&self) -> &'static str {
        match self {
            Disposition::Applied => "applied",
            Disposition::Locked => "locked",
            Disposition::MalformedEntry => "malformed_entry",
            Disposition::UnreadablePayload => "unreadable_payload",
        }
    }
}

impl fmt::Display for Disposition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Row counters shared by unit, entry and cycle summaries.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct OutcomeCounts {
    pub rows: usize,
    pub inserts: usize,
    pub updates: usize,
    pub deletes: usize,
    pub skips: usize,
}

impl OutcomeCounts {
    pub fn record(&mut self, outcome: RowOutcome) {
        match outcome {
            RowOutcome::Insert => self.inserts += 1,
            RowOutcome::Update => self.updates += 1,
            RowOutcome::Delete => self.deletes += 1,
            RowOutcome::Skip => self.skips += 1,
        }
    }
}

impl AddAssign for OutcomeCounts {
    fn add_assign(&mut self, other: Self) {
        self.rows += other.rows;
        self.inserts += other.inserts;
        self.updates += other.updates;
        self.deletes += other.deletes;
        self.skips += other.skips;
    }
}

impl fmt::Display for OutcomeCounts {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "rows={} inserts={} updates={} deletes={} skips={}",
            self.rows, self.inserts, self.updates, self.deletes, self.skips
        )
    }
}

/// Outcome of one unit of work: a whole entry, or one batch of an entry's rows.
#[derive(Debug, Clone, PartialEq)]
pub struct ApplyOutcome {
    pub counts: OutcomeCounts,
    pub table: Option<String>,
    pub operation: Option<Operation>,
    pub seq: usize,
    pub worker_id: Uuid,
    /// 1-based batch number when rows of an entry are split across workers.
    pub batch: Option<usize>,
    pub disposition: Disposition,
}

impl ApplyOutcome {
    /// Creates an empty outcome with a fresh worker identity.
    pub fn new(seq: usize, disposition: Disposition) -> Self {
        Self {
            counts: OutcomeCounts::default(),
            table: None,
            operation: None,
            seq,
            worker_id: Uuid::new_v4(),
            batch: None,
            disposition,
        }
    }

    pub fn with_target(mut self, table: impl Into<String>, operation: Operation) -> Self {
        self.table = Some(table.into());
        self.operation = Some(operation);
        self
    }

    pub fn with_batch(mut self, batch: usize) -> Self {
        self.batch = Some(batch);
        self
    }

    /// Records the outcome of one applied row.
    pub fn record(&mut self, outcome: RowOutcome) {
        self.counts.rows += 1;
        self.counts.record(outcome);
    }
}

/// Aggregate of every unit outcome produced for one queue entry.
#[derive(Debug, Clone, PartialEq)]
pub struct EntrySummary {
    pub seq: usize,
    pub file_name: String,
    pub table: Option<String>,
    pub operation: Option<Operation>,
    pub disposition: Disposition,
    pub counts: OutcomeCounts,
    pub units: Vec<ApplyOutcome>,
}

impl EntrySummary {
    /// Builds the summary for an entry from its unit outcomes.
    ///
    /// A non-applied disposition on any unit wins over `Applied`.
    pub fn from_units(seq: usize, file_name: impl Into<String>, units: Vec<ApplyOutcome>) -> Self {
        let mut counts = OutcomeCounts::default();
        let mut disposition = Disposition::Applied;
        let mut table = None;
        let mut operation = None;

        for unit in &units {
            counts += unit.counts;
            if unit.disposition != Disposition::Applied {
                disposition = unit.disposition;
            }
            if table.is_none() {
                table.clone_from(&unit.table);
            }
            if operation.is_none() {
                operation = unit.operation;
            }
        }

        Self {
            seq,
            file_name: file_name.into(),
            table,
            operation,
            disposition,
            counts,
            units,
        }
    }
}

/// Aggregate of every entry handled in one poll cycle.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CycleSummary {
    pub listed: usize,
    pub applied: usize,
    pub locked: usize,
    pub malformed: usize,
    pub unreadable: usize,
    pub counts: OutcomeCounts,
}

impl CycleSummary {
    pub fn new(listed: usize) -> Self {
        Self {
            listed,
            ..Self::default()
        }
    }

    pub fn record(&mut self, entry: &EntrySummary) {
        match entry.disposition {
            Disposition::Applied => self.applied += 1,
            Disposition::Locked => self.locked += 1,
            Disposition::MalformedEntry => self.malformed += 1,
            Disposition::UnreadablePayload => self.unreadable += 1,
        }
        self.counts += entry.counts;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unit_outcome_counts_rows() {
        let mut outcome = ApplyOutcome::new(1, Disposition::Applied)
            .with_target("customer", Operation::Insert);
        outcome.record(RowOutcome::Insert);
        outcome.record(RowOutcome::Update);
        outcome.record(RowOutcome::Skip);

        assert_eq!(
            outcome.counts,
            OutcomeCounts {
                rows: 3,
                inserts: 1,
                updates: 1,
                deletes: 0,
                skips: 1,
            }
        );
    }

    #[test]
    fn entry_summary_sums_batches() {
        let mut first = ApplyOutcome::new(2, Disposition::Applied)
            .with_target("customer", Operation::Insert)
            .with_batch(1);
        first.record(RowOutcome::Insert);
        let mut second = ApplyOutcome::new(2, Disposition::Applied)
            .with_target("customer", Operation::Insert)
            .with_batch(2);
        second.record(RowOutcome::Skip);

        let summary = EntrySummary::from_units(2, "t__customer__e__1__insert.json", vec![first, second]);

        assert_eq!(summary.counts.rows, 2);
        assert_eq!(summary.counts.inserts, 1);
        assert_eq!(summary.counts.skips, 1);
        assert_eq!(summary.table.as_deref(), Some("customer"));
        assert_eq!(summary.disposition, Disposition::Applied);
    }

    #[test]
    fn cycle_summary_tracks_dispositions() {
        let mut cycle = CycleSummary::new(2);
        cycle.record(&EntrySummary::from_units(
            1,
            "bogus.json",
            vec![ApplyOutcome::new(1, Disposition::MalformedEntry)],
        ));
        cycle.record(&EntrySummary::from_units(
            2,
            "t__customer__e__1__insert.json",
            vec![ApplyOutcome::new(2, Disposition::Locked)],
        ));

        assert_eq!(cycle.malformed, 1);
        assert_eq!(cycle.locked, 1);
        assert_eq!(cycle.applied, 0);
    }
}
