//! Replicator binary draining a queue of 4GL change entries into PostgreSQL.
//!
//! Parses the command line, initializes tracing, and runs the poll loop on a multi-threaded
//! runtime. Exits with `0` after a clean single pass or shutdown, and with `1` after printing a
//! diagnostic report for any startup or poll loop error.

use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Parser, ValueEnum};
use prorep_config::shared::{ConcurrencyStrategy, EngineConfig};
use prorep_telemetry::tracing::init_tracing;
use tracing::error;

use crate::core::start_replicator;
use crate::error::{ReplicatorError, ReplicatorResult};

mod core;
mod error;

/// Concurrency strategy accepted on the command line.
#[derive(Debug, Clone, Copy, ValueEnum)]
enum Concurrency {
    /// One worker per entry.
    Files,
    /// One entry at a time, rows split across workers.
    Rows,
}

impl From<Concurrency> for ConcurrencyStrategy {
    fn from(value: Concurrency) -> Self {
        match value {
            Concurrency::Files => ConcurrencyStrategy::Files,
            Concurrency::Rows => ConcurrencyStrategy::Rows,
        }
    }
}

#[derive(Debug, Parser)]
#[command(name = "prorep-replicator", version, about, arg_required_else_help = true)]
struct Args {
    /// DDL artifact with table mappings and target connection settings
    #[arg(long)]
    input: PathBuf,

    /// Directory containing incoming JSON change entries
    #[arg(long = "jsondir")]
    json_dir: PathBuf,

    /// Concurrency strategy; 'files' applies whole entries concurrently
    #[arg(long, value_enum, default_value_t = Concurrency::Rows)]
    concurrency: Concurrency,

    /// Number of concurrent workers
    #[arg(long, value_name = "N", default_value_t = EngineConfig::DEFAULT_PROCESSES)]
    processes: u16,

    /// Rows assigned to each worker in the 'rows' strategy
    #[arg(long = "processrows", value_name = "N", default_value_t = EngineConfig::DEFAULT_PROCESS_ROWS)]
    process_rows: usize,

    /// Seconds to sleep before each poll cycle
    #[arg(long, value_name = "N", default_value_t = EngineConfig::DEFAULT_DELAY_SECS)]
    delay: u64,

    /// Drain the queue directory once and exit
    #[arg(long = "onepass")]
    one_pass: bool,

    /// Insert rows without checking for existing ones, committing once per unit of work
    #[arg(long = "fastinsert")]
    fast_insert: bool,

    /// Keep entries after they were applied
    #[arg(long = "keepjson")]
    keep_json: bool,

    /// Disable all concurrency and log at debug level
    #[arg(long)]
    debug: bool,

    /// Glob pattern selecting entries in the queue directory
    #[arg(long = "globpattern", default_value = EngineConfig::DEFAULT_GLOB_PATTERN)]
    glob_pattern: String,

    /// Create missing target tables and indexes at startup
    #[arg(long)]
    create_tables: bool,

    /// Serve Prometheus metrics on this port
    #[arg(long, value_name = "PORT")]
    metrics_port: Option<u16>,
}

impl Args {
    fn engine_config(&self) -> EngineConfig {
        EngineConfig {
            queue_dir: self.json_dir.clone(),
            glob_pattern: self.glob_pattern.clone(),
            strategy: self.concurrency.into(),
            processes: self.processes,
            process_rows: self.process_rows,
            delay_secs: self.delay,
            one_pass: self.one_pass,
            fast_insert: self.fast_insert,
            keep_json: self.keep_json,
            debug: self.debug,
            create_tables: self.create_tables,
            metrics_port: self.metrics_port,
        }
    }
}

fn main() -> ExitCode {
    let args = Args::parse();

    match run(args) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            error!(category = err.category(), "{err}");
            eprint!("{}", err.render_report());

            ExitCode::FAILURE
        }
    }
}

fn run(args: Args) -> ReplicatorResult<()> {
    init_tracing(env!("CARGO_BIN_NAME"), args.debug).map_err(ReplicatorError::config)?;

    let config = args.engine_config();
    config.validate().map_err(ReplicatorError::config)?;

    tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()?
        .block_on(start_replicator(config, &args.input))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_the_engine_defaults() {
        let args = Args::parse_from(["prorep-replicator", "--input", "ddl.json", "--jsondir", "/q"]);

        let config = args.engine_config();

        assert_eq!(config.queue_dir, PathBuf::from("/q"));
        assert_eq!(config.strategy, ConcurrencyStrategy::Rows);
        assert_eq!(config.processes, 1);
        assert_eq!(config.process_rows, 5000);
        assert_eq!(config.delay_secs, 5);
        assert_eq!(config.glob_pattern, "*.json");
        assert!(!config.one_pass);
        assert!(config.metrics_port.is_none());
    }

    #[test]
    fn flags_are_mapped_to_the_engine_config() {
        let args = Args::parse_from([
            "prorep-replicator",
            "--input",
            "ddl.json",
            "--jsondir",
            "/q",
            "--concurrency",
            "files",
            "--processes",
            "4",
            "--processrows",
            "100",
            "--delay",
            "0",
            "--onepass",
            "--fastinsert",
            "--keepjson",
            "--debug",
            "--globpattern",
            "t__*.json",
            "--create-tables",
            "--metrics-port",
            "9000",
        ]);

        let config = args.engine_config();

        assert_eq!(config.strategy, ConcurrencyStrategy::Files);
        assert_eq!(config.processes, 4);
        assert_eq!(config.process_rows, 100);
        assert_eq!(config.delay_secs, 0);
        assert!(config.one_pass && config.fast_insert && config.keep_json && config.debug);
        assert_eq!(config.glob_pattern, "t__*.json");
        assert!(config.create_tables);
        assert_eq!(config.metrics_port, Some(9000));
    }

    #[test]
    fn missing_input_is_rejected() {
        assert!(Args::try_parse_from(["prorep-replicator", "--jsondir", "/q"]).is_err());
    }
}
