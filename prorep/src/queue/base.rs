use std::future::Future;

use crate::error::ProrepResult;
use crate::queue::ClaimInfo;
use crate::types::{Payload, QueueEntry};

/// A durable queue of change entries that workers claim one at a time.
///
/// Claims are advisory and exclusive: for any entry, at most one concurrent
/// [`ChangeQueue::try_claim`] succeeds, across tasks and processes sharing the queue. A claim is
/// held until [`ChangeQueue::release`] is called, which every worker must do on every exit path.
pub trait ChangeQueue: Clone + Send + Sync + 'static {
    /// Lists candidate entries in processing order, numbering them from 1.
    ///
    /// Entries that are still being published are never returned.
    fn list(&self) -> impl Future<Output = ProrepResult<Vec<QueueEntry>>> + Send;

    /// Returns whether `entry` is currently claimed by anyone.
    fn is_claimed(&self, entry: &QueueEntry) -> impl Future<Output = ProrepResult<bool>> + Send;

    /// Attempts to claim `entry`. Returns `false`, not an error, when it is already claimed.
    fn try_claim(
        &self,
        entry: &QueueEntry,
        claim: &ClaimInfo,
    ) -> impl Future<Output = ProrepResult<bool>> + Send;

    /// Releases the claim on `entry`. Releasing an unclaimed entry is a no-op.
    fn release(&self, entry: &QueueEntry) -> impl Future<Output = ProrepResult<()>> + Send;

    /// Reads and parses the payload of `entry`.
    ///
    /// Unreadable or unparseable payloads fail with
    /// [`crate::error::ErrorKind::UnreadablePayload`].
    fn read_payload(&self, entry: &QueueEntry) -> impl Future<Output = ProrepResult<Payload>> + Send;

    /// Removes a processed entry from the queue.
    fn delete(&self, entry: &QueueEntry) -> impl Future<Output = ProrepResult<()>> + Send;
}
