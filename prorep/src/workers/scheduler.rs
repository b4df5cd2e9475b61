//! Dispatch of listed entries to workers according to the configured concurrency strategy.

use prorep_config::shared::ConcurrencyStrategy;
use tracing::{debug, info, warn};

use crate::destination::Destination;
use crate::error::{ProrepError, ProrepResult};
use crate::queue::ChangeQueue;
use crate::replication::apply::ApplyUnit;
use crate::types::{ApplyOutcome, Disposition, EntrySummary, QueueEntry};
use crate::workers::entry::{Claim, ClaimedEntry, EntryWorker, entry_error};
use crate::workers::pool::WorkerPool;

/// How a cycle's entries are spread over workers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DispatchMode {
    /// One entry at a time on the calling task.
    Inline,
    /// One worker per entry, up to the configured number at once.
    Files,
    /// Entries one at a time, each split into row batches applied concurrently.
    Rows,
}

/// Runs the entries of one poll cycle through [`EntryWorker`]s.
#[derive(Debug, Clone)]
pub struct Scheduler<Q, D> {
    worker: EntryWorker<Q, D>,
    mode: DispatchMode,
    processes: usize,
    process_rows: usize,
}

impl<Q, D> Scheduler<Q, D>
where
    Q: ChangeQueue,
    D: Destination,
{
    pub fn new(worker: EntryWorker<Q, D>) -> Self {
        let config = worker.engine().config();
        let mode = if config.debug {
            DispatchMode::Inline
        } else {
            match config.strategy {
                ConcurrencyStrategy::Files => DispatchMode::Files,
                ConcurrencyStrategy::Rows => DispatchMode::Rows,
            }
        };
        let processes = usize::from(config.processes).max(1);
        let process_rows = config.process_rows.max(1);

        Self {
            worker,
            mode,
            processes,
            process_rows,
        }
    }

    pub fn mode(&self) -> DispatchMode {
        self.mode
    }

    pub fn queue(&self) -> &Q {
        self.worker.queue()
    }

    /// Processes `entries` and returns one summary per handled entry, ordered by sequence.
    ///
    /// The first failure aborts the cycle. Entries not yet dispatched at that point stay in the
    /// queue for the next cycle.
    pub async fn run(&self, entries: Vec<QueueEntry>) -> ProrepResult<Vec<EntrySummary>> {
        debug!(mode = ?self.mode, entries = entries.len(), "scheduling entries");

        let mut summaries = match self.mode {
            DispatchMode::Inline => self.run_inline(entries).await?,
            DispatchMode::Files => self.run_files(entries).await?,
            DispatchMode::Rows => self.run_rows(entries).await?,
        };
        summaries.sort_by_key(|summary| summary.seq);

        Ok(summaries)
    }

    async fn run_inline(&self, entries: Vec<QueueEntry>) -> ProrepResult<Vec<EntrySummary>> {
        let mut summaries = Vec::with_capacity(entries.len());
        for entry in entries {
            summaries.push(self.worker.process(entry).await?);
        }

        Ok(summaries)
    }

    async fn run_files(&self, entries: Vec<QueueEntry>) -> ProrepResult<Vec<EntrySummary>> {
        let mut pool = WorkerPool::new(self.processes);
        let mut summaries = Vec::new();
        let mut dispatch_error = None;

        for entry in entries {
            if pool.has_failed() {
                warn!(entry = %entry, "a worker failed, not dispatching remaining entries");
                break;
            }

            match self.worker.queue().is_claimed(&entry).await {
                Ok(false) => {}
                Ok(true) => {
                    warn!(entry = %entry, "entry is already claimed, skipping");
                    summaries.push(EntrySummary::from_units(
                        entry.seq,
                        entry.file_name.clone(),
                        vec![ApplyOutcome::new(entry.seq, Disposition::Locked)],
                    ));
                    continue;
                }
                Err(err) => {
                    dispatch_error = Some(entry_error(err, &entry));
                    break;
                }
            }

            let worker = self.worker.clone();
            if let Err(err) = pool.dispatch(async move { worker.process(entry).await }).await {
                dispatch_error = Some(err);
                break;
            }
        }

        summaries.extend(join_workers(pool, dispatch_error).await?);

        Ok(summaries)
    }

    async fn run_rows(&self, entries: Vec<QueueEntry>) -> ProrepResult<Vec<EntrySummary>> {
        let mut summaries = Vec::with_capacity(entries.len());

        for entry in entries {
            let summary = match self.worker.claim(entry).await? {
                Claim::Settled(summary) => summary,
                Claim::Ready(claimed) if claimed.rows.is_empty() => {
                    self.worker.settle_empty(claimed).await?
                }
                Claim::Ready(claimed) => self.apply_batches(claimed).await?,
            };
            summaries.push(summary);
        }

        Ok(summaries)
    }

    /// Splits a claimed entry into row batches and applies them on concurrent sessions.
    async fn apply_batches(&self, claimed: ClaimedEntry) -> ProrepResult<EntrySummary> {
        let ClaimedEntry {
            entry,
            metadata,
            rows,
            worker_id,
        } = claimed;

        let units: Vec<ApplyUnit> = rows
            .chunks(self.process_rows)
            .enumerate()
            .map(|(index, chunk)| ApplyUnit {
                seq: entry.seq,
                metadata: metadata.clone(),
                rows: chunk.to_vec(),
                batch: Some(index + 1),
            })
            .collect();

        let pool_size = self.processes.min(units.len());
        info!(
            entry = %entry,
            %worker_id,
            table = %metadata.table,
            rows = rows.len(),
            batches = units.len(),
            workers = pool_size,
            "persisting rows in batches"
        );

        let mut pool = WorkerPool::new(pool_size);
        let mut dispatch_error = None;
        for unit in units {
            if pool.has_failed() {
                warn!(entry = %entry, "a batch failed, not dispatching remaining batches");
                break;
            }

            let engine = self.worker.engine().clone();
            if let Err(err) = pool.dispatch(async move { engine.apply(unit).await }).await {
                dispatch_error = Some(err);
                break;
            }
        }
        let result = join_workers(pool, dispatch_error).await;

        let mut outcomes = self
            .worker
            .settle(&entry, result)
            .await
            .map_err(|err| entry_error(err, &entry))?;
        outcomes.sort_by_key(|outcome| outcome.batch);

        Ok(EntrySummary::from_units(
            entry.seq,
            entry.file_name.clone(),
            outcomes,
        ))
    }
}

/// Waits for every in-flight unit of `pool`, then fails with `dispatch_error` and any unit
/// errors combined.
///
/// In-flight units always run to completion, so each one settles its own entry.
async fn join_workers<T: Send + 'static>(
    pool: WorkerPool<T>,
    dispatch_error: Option<ProrepError>,
) -> ProrepResult<Vec<T>> {
    let finished = pool.wait_all().await;

    match (dispatch_error, finished) {
        (None, finished) => finished,
        (Some(err), Ok(_)) => Err(err),
        (Some(err), Err(worker_err)) => Err(vec![err, worker_err].into()),
    }
}
