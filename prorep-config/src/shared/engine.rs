use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use std::time::Duration;

use crate::shared::ValidationError;

/// How queue entries are carved into units of work for the worker pool.
#[derive(Clone, Copy, Debug, Serialize, Deserialize, Eq, PartialEq)]
#[serde(rename_all = "snake_case")]
pub enum ConcurrencyStrategy {
    /// Each worker processes one whole queue entry end-to-end.
    Files,
    /// Entries are processed one at a time and their rows are split into batches that are
    /// applied in parallel.
    Rows,
}

impl ConcurrencyStrategy {
    pub fn as_str(&self) -> &'static str {
        match self {
            ConcurrencyStrategy::Files => "files",
            ConcurrencyStrategy::Rows => "rows",
        }
    }
}

impl fmt::Display for ConcurrencyStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Runtime configuration of the change-apply engine.
///
/// Built once at startup and shared read-only (behind an `Arc`) with every component.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Directory that acts as the change queue.
    pub queue_dir: PathBuf,
    /// Pattern matched against file names in [`EngineConfig::queue_dir`].
    pub glob_pattern: String,
    /// Worker-pool strategy.
    pub strategy: ConcurrencyStrategy,
    /// Size of the worker pool.
    pub processes: u16,
    /// Number of rows assigned to each batch in the [`ConcurrencyStrategy::Rows`] strategy.
    pub process_rows: usize,
    /// Seconds to sleep before each poll cycle.
    pub delay_secs: u64,
    /// Stop after a single poll cycle.
    pub one_pass: bool,
    /// Skip existence and staleness checks and commit once per unit of work.
    ///
    /// Unsafe when several writers replicate the same rows: out-of-order and duplicated changes
    /// are accepted silently.
    pub fast_insert: bool,
    /// Keep queue entries on disk after they were applied.
    pub keep_json: bool,
    /// Disable all pooling and run every unit of work inline.
    pub debug: bool,
    /// Create missing target tables and indexes at startup.
    pub create_tables: bool,
    /// Port of the Prometheus scrape endpoint, disabled when absent.
    pub metrics_port: Option<u16>,
}

impl EngineConfig {
    /// Default glob pattern for queue entries.
    pub const DEFAULT_GLOB_PATTERN: &'static str = "*.json";

    /// Default worker pool size.
    pub const DEFAULT_PROCESSES: u16 = 1;

    /// Default number of rows per batch.
    pub const DEFAULT_PROCESS_ROWS: usize = 5000;

    /// Default delay between poll cycles, in seconds.
    pub const DEFAULT_DELAY_SECS: u64 = 5;

    /// Creates a configuration for `queue_dir` with every other setting at its default.
    pub fn new(queue_dir: impl Into<PathBuf>) -> Self {
        Self {
            queue_dir: queue_dir.into(),
            glob_pattern: Self::DEFAULT_GLOB_PATTERN.to_string(),
            strategy: ConcurrencyStrategy::Rows,
            processes: Self::DEFAULT_PROCESSES,
            process_rows: Self::DEFAULT_PROCESS_ROWS,
            delay_secs: Self::DEFAULT_DELAY_SECS,
            one_pass: false,
            fast_insert: false,
            keep_json: false,
            debug: false,
            create_tables: false,
            metrics_port: None,
        }
    }

    /// Validates the engine settings.
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.processes == 0 {
            return Err(ValidationError::ProcessesZero);
        }

        if self.process_rows == 0 {
            return Err(ValidationError::ProcessRowsZero);
        }

        if self.glob_pattern.trim().is_empty() {
            return Err(ValidationError::InvalidGlobPattern(self.glob_pattern.clone()));
        }

        Ok(())
    }

    /// Returns the delay between poll cycles.
    pub fn delay(&self) -> Duration {
        Duration::from_secs(self.delay_secs)
    }

    /// Returns whether inserts must tolerate primary-key conflicts.
    ///
    /// Fast-insert mode never checks for an existing row, and in the per-file strategy two
    /// entries for the same row may be applied concurrently, so both write with conflict-ignoring
    /// inserts.
    pub fn ignore_insert_conflicts(&self) -> bool {
        self.fast_insert || self.strategy == ConcurrencyStrategy::Files
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        let config = EngineConfig::new("/var/spool/prorep");

        assert!(config.validate().is_ok());
        assert_eq!(config.strategy, ConcurrencyStrategy::Rows);
        assert_eq!(config.delay(), Duration::from_secs(5));
    }

    #[test]
    fn rejects_zero_processes() {
        let mut config = EngineConfig::new("/tmp");
        config.processes = 0;

        assert_eq!(config.validate(), Err(ValidationError::ProcessesZero));
    }

    #[test]
    fn rejects_zero_process_rows() {
        let mut config = EngineConfig::new("/tmp");
        config.process_rows = 0;

        assert_eq!(config.validate(), Err(ValidationError::ProcessRowsZero));
    }

    #[test]
    fn conflict_tolerant_inserts() {
        let mut config = EngineConfig::new("/tmp");
        assert!(!config.ignore_insert_conflicts());

        config.strategy = ConcurrencyStrategy::Files;
        assert!(config.ignore_insert_conflicts());

        config.strategy = ConcurrencyStrategy::Rows;
        config.fast_insert = true;
        assert!(config.ignore_insert_conflicts());
    }
}
