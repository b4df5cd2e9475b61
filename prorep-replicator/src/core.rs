use std::path::Path;
use std::sync::Arc;

use prorep::concurrency::shutdown::{ShutdownTx, create_shutdown_channel};
use prorep::destination::Destination;
use prorep::destination::postgres::PgDestination;
use prorep::metrics::register_metrics;
use prorep::pipeline::PollLoop;
use prorep::queue::FsQueue;
use prorep::schema::SchemaMap;
use prorep_config::load_target_config;
use prorep_config::shared::{APPLY_SESSION_OPTIONS, EngineConfig, ValidationError};
use prorep_telemetry::metrics::init_metrics;
use tokio::signal::unix::{SignalKind, signal};
use tracing::{info, warn};

use crate::error::{ReplicatorError, ReplicatorResult};

/// Starts the replicator with the DDL artifact at `artifact` and runs the poll loop.
///
/// Loads the schema map and target connection settings from the artifact, optionally bootstraps
/// the target tables and then drains the queue until single-pass completion, a shutdown signal
/// or the first error.
pub async fn start_replicator(config: EngineConfig, artifact: &Path) -> ReplicatorResult<()> {
    info!("starting replicator service");

    if !config.queue_dir.is_dir() {
        return Err(ReplicatorError::config(ValidationError::InvalidFieldValue {
            field: "jsondir".to_string(),
            constraint: format!("`{}` is not a directory", config.queue_dir.display()),
        }));
    }

    let schema = SchemaMap::load(artifact)?;
    let target = load_target_config(artifact).map_err(ReplicatorError::config)?;
    info!(
        artifact = %artifact.display(),
        dbname = %target.dbname,
        backend = target.backend(),
        host = %target.dbhost,
        port = target.dbport,
        tables = schema.len(),
        indexes = schema.indexes().len(),
        "loaded ddl artifact"
    );

    register_metrics();
    if let Some(port) = config.metrics_port {
        init_metrics(port).map_err(ReplicatorError::config)?;
        info!(port, "metrics exporter listening");
    }

    let destination = PgDestination::new(target.connect_options(&APPLY_SESSION_OPTIONS));
    if config.create_tables {
        destination.ensure_tables(&schema).await?;
    }

    let queue = FsQueue::new(&config.queue_dir, &config.glob_pattern)?;
    let mut poll_loop = PollLoop::new(queue, destination, Arc::new(schema), Arc::new(config));

    let (shutdown_tx, shutdown_rx) = create_shutdown_channel();
    let shutdown_handle = tokio::spawn(listen_for_shutdown(shutdown_tx));

    let result = poll_loop.run(shutdown_rx).await;

    // The loop may have ended on its own; the listener is not needed anymore.
    shutdown_handle.abort();
    result?;

    info!(cycles = poll_loop.cycles(), "replicator service completed");

    Ok(())
}

/// Waits for SIGINT or SIGTERM and requests a shutdown of the poll loop.
async fn listen_for_shutdown(shutdown_tx: ShutdownTx) {
    let sigterm = async {
        match signal(SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(err) => {
                warn!(error = %err, "failed to register SIGTERM handler, only ctrl+c stops the replicator");
                std::future::pending::<()>().await;
            }
        }
    };

    tokio::select! {
        _ = tokio::signal::ctrl_c() => {
            info!("sigint (ctrl+c) received, stopping after the current cycle");
        }
        _ = sigterm => {
            info!("sigterm received, stopping after the current cycle");
        }
    }

    if let Err(err) = shutdown_tx.shutdown() {
        warn!(error = ?err, "failed to send shutdown signal");
    }
}
