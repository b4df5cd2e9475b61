//! The poll loop driving the engine.
//!
//! Each cycle sleeps for the configured delay, lists the queue and drains every listed entry
//! through the [`Scheduler`]. The loop ends after one cycle in single-pass mode, when shutdown
//! is requested between cycles, or with the first error escaping a cycle.

use std::sync::Arc;

use metrics::gauge;
use prorep_config::shared::EngineConfig;
use tracing::{debug, error, info, warn};

use crate::concurrency::shutdown::ShutdownRx;
use crate::destination::Destination;
use crate::error::ProrepResult;
use crate::failpoints::{POLL_CYCLE__AFTER_LIST, prorep_fail_point};
use crate::metrics::PROREP_QUEUE_ENTRIES;
use crate::queue::ChangeQueue;
use crate::replication::apply::ApplyEngine;
use crate::schema::SchemaMap;
use crate::types::{CycleSummary, Disposition, EntrySummary};
use crate::workers::entry::{EntryWorker, record_entry_metrics};
use crate::workers::scheduler::Scheduler;

/// State of a [`PollLoop`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoopState {
    /// Waiting for the next cycle.
    Polling,
    /// Processing the entries listed by the current cycle.
    Draining,
    /// The loop has returned and will not run again.
    Terminated,
}

/// Repeatedly drains a [`ChangeQueue`] into a [`Destination`].
#[derive(Debug)]
pub struct PollLoop<Q, D> {
    scheduler: Scheduler<Q, D>,
    config: Arc<EngineConfig>,
    state: LoopState,
    cycles: u64,
}

impl<Q, D> PollLoop<Q, D>
where
    Q: ChangeQueue,
    D: Destination,
{
    pub fn new(queue: Q, destination: D, schema: Arc<SchemaMap>, config: Arc<EngineConfig>) -> Self {
        let engine = ApplyEngine::new(destination, schema, config.clone());
        let scheduler = Scheduler::new(EntryWorker::new(queue, engine));

        Self {
            scheduler,
            config,
            state: LoopState::Polling,
            cycles: 0,
        }
    }

    pub fn state(&self) -> LoopState {
        self.state
    }

    /// Number of cycles completed so far.
    pub fn cycles(&self) -> u64 {
        self.cycles
    }

    /// Runs cycles until single-pass completion, shutdown or the first error.
    pub async fn run(&mut self, mut shutdown_rx: ShutdownRx) -> ProrepResult<()> {
        info!(
            queue_dir = %self.config.queue_dir.display(),
            glob_pattern = %self.config.glob_pattern,
            strategy = %self.config.strategy,
            mode = ?self.scheduler.mode(),
            processes = self.config.processes,
            process_rows = self.config.process_rows,
            delay_secs = self.config.delay_secs,
            one_pass = self.config.one_pass,
            fast_insert = self.config.fast_insert,
            keep_json = self.config.keep_json,
            "starting poll loop"
        );

        loop {
            self.state = LoopState::Polling;
            if *shutdown_rx.borrow() {
                info!("shutdown requested, stopping poll loop");
                self.state = LoopState::Terminated;

                return Ok(());
            }

            tokio::select! {
                biased;

                _ = shutdown_rx.changed() => {
                    info!("shutdown requested, stopping poll loop");
                    self.state = LoopState::Terminated;

                    return Ok(());
                }

                _ = tokio::time::sleep(self.config.delay()) => {}
            }

            self.state = LoopState::Draining;
            if let Err(err) = self.run_cycle().await {
                error!(error = %err, "poll cycle failed, stopping poll loop");
                self.state = LoopState::Terminated;

                return Err(err);
            }

            if self.config.one_pass {
                info!(cycles = self.cycles, "single pass completed");
                self.state = LoopState::Terminated;

                return Ok(());
            }
        }
    }

    /// Lists the queue once and drains every listed entry.
    pub async fn run_cycle(&mut self) -> ProrepResult<CycleSummary> {
        let entries = self.scheduler.queue().list().await?;
        gauge!(PROREP_QUEUE_ENTRIES).set(entries.len() as f64);
        prorep_fail_point(POLL_CYCLE__AFTER_LIST)?;

        let mut cycle = CycleSummary::new(entries.len());
        self.cycles += 1;

        if entries.is_empty() {
            debug!(cycle = self.cycles, "no entries found");
            return Ok(cycle);
        }

        debug!(cycle = self.cycles, entries = entries.len(), "found entries");
        let summaries = self.scheduler.run(entries).await?;
        for summary in &summaries {
            log_entry_summary(summary);
            record_entry_metrics(summary);
            cycle.record(summary);
        }

        info!(
            cycle = self.cycles,
            listed = cycle.listed,
            applied = cycle.applied,
            locked = cycle.locked,
            malformed = cycle.malformed,
            unreadable = cycle.unreadable,
            counts = %cycle.counts,
            "poll cycle completed"
        );

        Ok(cycle)
    }
}

fn log_entry_summary(summary: &EntrySummary) {
    let table = summary.table.as_deref().unwrap_or("-");
    let operation = summary.operation.map_or("-", |operation| operation.as_str());

    match summary.disposition {
        Disposition::Applied => info!(
            seq = summary.seq,
            entry = %summary.file_name,
            table,
            operation,
            units = summary.units.len(),
            counts = %summary.counts,
            "entry processed"
        ),
        disposition => warn!(
            seq = summary.seq,
            entry = %summary.file_name,
            %disposition,
            "entry skipped"
        ),
    }
}

#[cfg(test)]
mod tests {
    use std::path::Path;

    use serde_json::json;

    use super::*;
    use crate::concurrency::shutdown::create_shutdown_channel;
    use crate::destination::memory::MemoryDestination;
    use crate::queue::FsQueue;
    use crate::test_utils::entries::write_entry;
    use crate::test_utils::schema::customer_schema;

    fn poll_loop(
        dir: &Path,
        destination: MemoryDestination,
        one_pass: bool,
    ) -> PollLoop<FsQueue, MemoryDestination> {
        let mut config = EngineConfig::new(dir);
        config.delay_secs = 0;
        config.one_pass = one_pass;

        PollLoop::new(
            FsQueue::new(dir, "*.json").unwrap(),
            destination,
            Arc::new(customer_schema()),
            Arc::new(config),
        )
    }

    #[tokio::test]
    async fn empty_queue_completes_a_cycle() {
        let dir = tempfile::tempdir().unwrap();
        let mut poll_loop = poll_loop(dir.path(), MemoryDestination::new(), true);

        let cycle = poll_loop.run_cycle().await.unwrap();

        assert_eq!(cycle, CycleSummary::new(0));
        assert_eq!(poll_loop.cycles(), 1);
    }

    #[tokio::test]
    async fn single_pass_terminates_after_one_cycle() {
        let dir = tempfile::tempdir().unwrap();
        write_entry(
            dir.path(),
            "t__customer__e__1__insert.json",
            &[json!({"rec_id": 1, "epoch_time": 1})],
        );
        let destination = MemoryDestination::new();
        let mut poll_loop = poll_loop(dir.path(), destination.clone(), true);
        let (_shutdown_tx, shutdown_rx) = create_shutdown_channel();

        poll_loop.run(shutdown_rx).await.unwrap();

        assert_eq!(poll_loop.state(), LoopState::Terminated);
        assert_eq!(poll_loop.cycles(), 1);
        assert_eq!(destination.rows("customer").await.len(), 1);
    }

    #[tokio::test]
    async fn shutdown_stops_the_daemon_between_cycles() {
        let dir = tempfile::tempdir().unwrap();
        let mut poll_loop = poll_loop(dir.path(), MemoryDestination::new(), false);
        let (shutdown_tx, shutdown_rx) = create_shutdown_channel();
        shutdown_tx.shutdown().unwrap();

        poll_loop.run(shutdown_rx).await.unwrap();

        assert_eq!(poll_loop.state(), LoopState::Terminated);
        assert_eq!(poll_loop.cycles(), 0);
    }

    #[tokio::test]
    async fn cycle_errors_terminate_the_loop() {
        let dir = tempfile::tempdir().unwrap();
        write_entry(
            dir.path(),
            "t__invoice__e__1__insert.json",
            &[json!({"rec_id": 1, "epoch_time": 1})],
        );
        let mut poll_loop = poll_loop(dir.path(), MemoryDestination::new(), false);
        let (_shutdown_tx, shutdown_rx) = create_shutdown_channel();

        let err = poll_loop.run(shutdown_rx).await.unwrap_err();

        assert_eq!(err.kind(), crate::error::ErrorKind::MissingTableMapping);
        assert_eq!(poll_loop.state(), LoopState::Terminated);
    }
}
