use prorep::error::ProrepError;
use std::backtrace::{Backtrace, BacktraceStatus};
use std::error::Error;
use std::fmt::{self, Write as _};

/// Result type for replicator operations.
pub type ReplicatorResult<T> = Result<T, ReplicatorError>;

/// Error type for the replicator binary.
///
/// Engine failures keep the [`ProrepError`] intact so the report can show where in the queue
/// and in the target store they happened.
#[derive(Debug)]
pub enum ReplicatorError {
    /// Engine error raised while bootstrapping or draining the queue.
    Engine(ProrepError),
    /// Invalid command line, artifact or connection settings.
    Config {
        source: Box<dyn Error + Send + Sync>,
        backtrace: Backtrace,
    },
    /// I/O error outside the engine.
    Io {
        source: std::io::Error,
        backtrace: Backtrace,
    },
}

/// Where an engine failure happened, recovered from the context lines the engine appends to an
/// error's detail as it bubbles up.
#[derive(Debug, Default, PartialEq, Eq)]
pub struct FailureSite<'a> {
    /// Queue entry being processed.
    pub entry: Option<&'a str>,
    /// Table, operation and row identity of the change being applied.
    pub change: Option<&'a str>,
    /// Statement sent to the target store.
    pub statement: Option<&'a str>,
    /// Bound row values of that statement.
    pub row: Option<&'a str>,
    /// Any other detail lines, in order.
    pub notes: Vec<&'a str>,
}

impl<'a> FailureSite<'a> {
    pub fn from_detail(detail: &'a str) -> Self {
        let mut site = FailureSite::default();
        for line in detail.lines().map(str::trim).filter(|line| !line.is_empty()) {
            if let Some(entry) = line.strip_prefix("entry: ") {
                site.entry = Some(entry);
            } else if let Some(statement) = line.strip_prefix("statement: ") {
                site.statement = Some(statement);
            } else if let Some(row) = line.strip_prefix("row: ") {
                site.row = Some(row);
            } else if line.starts_with("table: ") {
                site.change = Some(line);
            } else {
                site.notes.push(line);
            }
        }

        site
    }
}

impl ReplicatorError {
    /// Returns a short category label for this error.
    pub fn category(&self) -> &'static str {
        match self {
            ReplicatorError::Engine(_) => "replication error",
            ReplicatorError::Config { .. } => "configuration error",
            ReplicatorError::Io { .. } => "i/o error",
        }
    }

    pub fn backtrace(&self) -> Option<&Backtrace> {
        let backtrace = match self {
            ReplicatorError::Engine(err) => err.backtrace()?,
            ReplicatorError::Config { backtrace, .. } | ReplicatorError::Io { backtrace, .. } => {
                backtrace
            }
        };

        (backtrace.status() == BacktraceStatus::Captured).then_some(backtrace)
    }

    /// Creates a configuration error from any error.
    pub fn config<E: Error + Send + Sync + 'static>(err: E) -> Self {
        ReplicatorError::Config {
            source: Box::new(err),
            backtrace: Backtrace::capture(),
        }
    }

    /// Returns the diagnostic block printed before exiting with a failure.
    ///
    /// Every failed unit of work gets its own section naming the entry, change, statement and
    /// row it failed on, followed by its cause chain. The backtrace is appended when one was
    /// captured, which depends on `RUST_BACKTRACE`.
    pub fn render_report(&self) -> String {
        let mut out = String::new();
        let _ = writeln!(out, "prorep replicator stopped ({})", self.category());

        match self {
            ReplicatorError::Engine(err) => {
                let failures = leaf_errors(err);
                if failures.len() > 1 {
                    let _ = writeln!(out, "{} units of work failed", failures.len());
                }
                for (index, failure) in failures.iter().enumerate() {
                    render_engine_failure(&mut out, index + 1, failure);
                }
            }
            ReplicatorError::Config { source, .. } => {
                let _ = writeln!(out, "failure 1: {source}");
                render_causes(&mut out, source.source());
            }
            ReplicatorError::Io { source, .. } => {
                let _ = writeln!(out, "failure 1: {source}");
                render_causes(&mut out, source.source());
            }
        }

        if let Some(backtrace) = self.backtrace() {
            let _ = writeln!(out, "backtrace:\n{backtrace}");
        }

        out
    }
}

/// Flattens aggregated engine errors into the failures of individual units.
fn leaf_errors(err: &ProrepError) -> Vec<&ProrepError> {
    match err.errors() {
        Some(errors) => errors.iter().flat_map(leaf_errors).collect(),
        None => vec![err],
    }
}

fn render_engine_failure(out: &mut String, index: usize, err: &ProrepError) {
    let location = err.location();
    let _ = writeln!(
        out,
        "failure {index}: [{:?}] {} @ {}:{}",
        err.kind(),
        err.description(),
        location.file(),
        location.line()
    );

    let site = FailureSite::from_detail(err.detail().unwrap_or_default());
    let sections = [
        ("entry", site.entry),
        ("change", site.change),
        ("statement", site.statement),
        ("row", site.row),
    ];
    for (label, value) in sections {
        if let Some(value) = value {
            let _ = writeln!(out, "  {label}: {value}");
        }
    }
    for note in site.notes {
        let _ = writeln!(out, "  detail: {note}");
    }

    render_causes(out, err.source());
}

fn render_causes(out: &mut String, mut cause: Option<&(dyn Error + 'static)>) {
    while let Some(err) = cause {
        let _ = writeln!(out, "  caused by: {err}");
        cause = err.source();
    }
}

impl fmt::Display for ReplicatorError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ReplicatorError::Engine(err) => write!(f, "{err}"),
            ReplicatorError::Config { source, .. } => write!(f, "invalid configuration: {source}"),
            ReplicatorError::Io { source, .. } => write!(f, "i/o failure: {source}"),
        }
    }
}

impl Error for ReplicatorError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            ReplicatorError::Engine(err) => Some(err),
            ReplicatorError::Config { source, .. } => Some(source.as_ref()),
            ReplicatorError::Io { source, .. } => Some(source),
        }
    }
}

impl From<std::io::Error> for ReplicatorError {
    fn from(source: std::io::Error) -> Self {
        ReplicatorError::Io {
            source,
            backtrace: Backtrace::capture(),
        }
    }
}

impl From<ProrepError> for ReplicatorError {
    fn from(err: ProrepError) -> Self {
        ReplicatorError::Engine(err)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use prorep::error::ErrorKind;
    use prorep::prorep_error;
    use prorep_config::shared::ValidationError;

    fn failed_insert(rec_id: i64) -> ProrepError {
        prorep_error!(
            ErrorKind::DestinationConstraintViolation,
            "Target statement violated a constraint",
            "duplicate key value violates unique constraint"
        )
        .with_context(r#"statement: INSERT INTO "customer" ("repl_recid") VALUES ($1)"#)
        .with_context(format!(r#"row: {{"repl_recid": {rec_id}}}"#))
        .with_context(format!(
            "table: customer, operation: insert, rec_id: {rec_id}, epoch_time: 7"
        ))
        .with_context("entry: /queue/t__customer__e__7__insert.json")
    }

    #[test]
    fn failure_site_splits_context_lines() {
        let detail = "connection reset\nstatement: DELETE FROM \"customer\"\nrow: {}\n\
                      table: customer, operation: delete, rec_id: 3, epoch_time: 9\n\
                      entry: /queue/a.json";

        let site = FailureSite::from_detail(detail);

        assert_eq!(site.entry, Some("/queue/a.json"));
        assert_eq!(
            site.change,
            Some("table: customer, operation: delete, rec_id: 3, epoch_time: 9")
        );
        assert_eq!(site.statement, Some("DELETE FROM \"customer\""));
        assert_eq!(site.row, Some("{}"));
        assert_eq!(site.notes, vec!["connection reset"]);
    }

    #[test]
    fn report_has_a_section_per_failure_site() {
        let report = ReplicatorError::from(failed_insert(42)).render_report();

        assert!(report.starts_with("prorep replicator stopped (replication error)\n"));
        assert!(report.contains("failure 1: [DestinationConstraintViolation]"));
        assert!(report.contains("\n  entry: /queue/t__customer__e__7__insert.json\n"));
        assert!(
            report.contains("\n  change: table: customer, operation: insert, rec_id: 42, ")
        );
        assert!(report.contains("\n  statement: INSERT INTO \"customer\""));
        assert!(report.contains("\n  row: {\"repl_recid\": 42}\n"));
        assert!(report.contains("\n  detail: duplicate key value violates unique constraint\n"));
    }

    #[test]
    fn report_lists_every_failed_unit() {
        let err = ProrepError::from(vec![failed_insert(1), failed_insert(2)]);

        let report = ReplicatorError::from(err).render_report();

        assert!(report.contains("2 units of work failed\n"));
        assert!(report.contains("failure 1: "));
        assert!(report.contains("failure 2: "));
        assert!(report.contains("row: {\"repl_recid\": 1}"));
        assert!(report.contains("row: {\"repl_recid\": 2}"));
    }

    #[test]
    fn report_lists_causes_of_configuration_errors() {
        let err = ReplicatorError::config(ValidationError::ProcessesZero);

        let report = err.render_report();

        assert!(report.starts_with("prorep replicator stopped (configuration error)\n"));
        assert!(report.contains("failure 1: `processes` cannot be zero\n"));
    }
}
