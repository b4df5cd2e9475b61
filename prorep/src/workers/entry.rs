//! Processing of a single queue entry: claim, decode, apply and settle.
//!
//! Whatever happens after a successful claim, the claim is released before the worker returns.
//! Entries are only deleted after their rows were applied.

use metrics::counter;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::destination::Destination;
use crate::error::{ErrorKind, ProrepError, ProrepResult};
use crate::failpoints::{APPLY_ENTRY__AFTER_CLAIM, prorep_fail_point};
use crate::metrics::{DISPOSITION_LABEL, PROREP_ENTRIES_PROCESSED_TOTAL};
use crate::queue::decode::decode_entry_name;
use crate::queue::{ChangeQueue, ClaimInfo};
use crate::replication::apply::{ApplyEngine, ApplyUnit};
use crate::types::{
    ApplyOutcome, ChangeRow, Disposition, EntryMetadata, EntrySummary, QueueEntry,
};

/// An entry claimed by this process whose name and payload decoded successfully.
#[derive(Debug)]
pub struct ClaimedEntry {
    pub entry: QueueEntry,
    pub metadata: EntryMetadata,
    pub rows: Vec<ChangeRow>,
    pub worker_id: Uuid,
}

/// Result of trying to claim and decode an entry.
#[derive(Debug)]
pub enum Claim {
    /// The entry is claimed and ready to be applied.
    Ready(ClaimedEntry),
    /// The entry was not applied and needs nothing further.
    Settled(EntrySummary),
}

/// Drives queue entries through claim, decode, apply and cleanup.
#[derive(Debug, Clone)]
pub struct EntryWorker<Q, D> {
    queue: Q,
    engine: ApplyEngine<D>,
}

impl<Q, D> EntryWorker<Q, D>
where
    Q: ChangeQueue,
    D: Destination,
{
    pub fn new(queue: Q, engine: ApplyEngine<D>) -> Self {
        Self { queue, engine }
    }

    pub fn queue(&self) -> &Q {
        &self.queue
    }

    pub fn engine(&self) -> &ApplyEngine<D> {
        &self.engine
    }

    /// Processes a whole entry end to end on one session.
    pub async fn process(&self, entry: QueueEntry) -> ProrepResult<EntrySummary> {
        let claimed = match self.claim(entry).await? {
            Claim::Ready(claimed) => claimed,
            Claim::Settled(summary) => return Ok(summary),
        };

        if claimed.rows.is_empty() {
            return self.settle_empty(claimed).await;
        }

        let ClaimedEntry {
            entry,
            metadata,
            rows,
            worker_id,
        } = claimed;

        info!(
            entry = %entry,
            %worker_id,
            table = %metadata.table,
            rows = rows.len(),
            "persisting rows"
        );

        let result = self
            .engine
            .apply(ApplyUnit {
                seq: entry.seq,
                metadata,
                rows,
                batch: None,
            })
            .await;

        let outcome = self
            .settle(&entry, result)
            .await
            .map_err(|err| entry_error(err, &entry))?;
        Ok(EntrySummary::from_units(
            entry.seq,
            entry.file_name.clone(),
            vec![outcome],
        ))
    }

    /// Claims `entry` and decodes its name and payload.
    ///
    /// Entries claimed elsewhere, malformed names and unreadable payloads settle immediately
    /// with the matching disposition. The two decode failures release the claim and leave the
    /// file in place.
    pub async fn claim(&self, entry: QueueEntry) -> ProrepResult<Claim> {
        let worker_id = Uuid::new_v4();
        let claim = ClaimInfo::new(worker_id);

        if !self.queue.try_claim(&entry, &claim).await? {
            warn!(entry = %entry, "entry is already claimed, skipping");
            return Ok(Claim::Settled(settled(&entry, Disposition::Locked)));
        }
        debug!(entry = %entry, %worker_id, host = %claim.host, "claimed entry");

        match self.decode(&entry).await {
            Ok((metadata, rows)) => Ok(Claim::Ready(ClaimedEntry {
                entry,
                metadata,
                rows,
                worker_id,
            })),
            Err(err) => {
                self.queue.release(&entry).await?;

                let disposition = match err.kind() {
                    ErrorKind::MalformedEntry => Disposition::MalformedEntry,
                    ErrorKind::UnreadablePayload => Disposition::UnreadablePayload,
                    _ => return Err(err),
                };
                warn!(
                    entry = %entry,
                    error = %err,
                    "could not decode entry, removed lock and left file in place"
                );

                Ok(Claim::Settled(settled(&entry, disposition)))
            }
        }
    }

    async fn decode(&self, entry: &QueueEntry) -> ProrepResult<(EntryMetadata, Vec<ChangeRow>)> {
        prorep_fail_point(APPLY_ENTRY__AFTER_CLAIM)?;

        let metadata = decode_entry_name(&entry.file_name)?;
        let payload = self.queue.read_payload(entry).await?;
        debug!(entry = %entry, rows = payload.tt.len(), "read rows from entry");

        Ok((metadata, payload.tt))
    }

    /// Releases an entry without rows and removes it unless entries are kept.
    pub async fn settle_empty(&self, claimed: ClaimedEntry) -> ProrepResult<EntrySummary> {
        let outcome = ApplyOutcome::new(claimed.entry.seq, Disposition::Applied)
            .with_target(claimed.metadata.table.clone(), claimed.metadata.operation);
        let outcome = self.settle(&claimed.entry, Ok(outcome)).await?;

        Ok(EntrySummary::from_units(
            claimed.entry.seq,
            claimed.entry.file_name.clone(),
            vec![outcome],
        ))
    }

    /// Releases the claim on `entry` and, if `result` succeeded, removes the entry unless
    /// entries are kept.
    ///
    /// The claim is released even when `result` is an error; the entry is then preserved.
    pub async fn settle<T>(&self, entry: &QueueEntry, result: ProrepResult<T>) -> ProrepResult<T> {
        let released = self.queue.release(entry).await;

        let output = match result {
            Ok(output) => output,
            Err(err) => {
                if let Err(release_err) = released {
                    warn!(entry = %entry, error = %release_err, "could not remove lock");
                }
                warn!(entry = %entry, "apply failed, removed lock and left file in place");
                return Err(err);
            }
        };
        released?;

        if self.engine.config().keep_json {
            info!(entry = %entry, "removed lock, keeping entry");
        } else {
            self.queue.delete(entry).await?;
            info!(entry = %entry, "removed entry and lock");
        }

        Ok(output)
    }
}

fn settled(entry: &QueueEntry, disposition: Disposition) -> EntrySummary {
    EntrySummary::from_units(
        entry.seq,
        entry.file_name.clone(),
        vec![ApplyOutcome::new(entry.seq, disposition)],
    )
}

/// Records the entry-level metric for a summary.
pub fn record_entry_metrics(summary: &EntrySummary) {
    counter!(
        PROREP_ENTRIES_PROCESSED_TOTAL,
        DISPOSITION_LABEL => summary.disposition.as_str(),
    )
    .increment(1);
}

/// Wraps an error with the entry it happened on.
pub(crate) fn entry_error(err: ProrepError, entry: &QueueEntry) -> ProrepError {
    err.with_context(format!("entry: {}", entry.path.display()))
}
