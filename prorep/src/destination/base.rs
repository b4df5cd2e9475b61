use std::future::Future;

use crate::error::ProrepResult;
use crate::schema::SchemaMap;
use crate::types::{Epoch, RecId, TargetRow};

/// How an insert treats an existing row with the same identity.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InsertMode {
    /// A duplicate identity fails with a constraint violation.
    Strict,
    /// A duplicate identity is silently ignored.
    IgnoreConflicts,
}

/// A target store that replicated rows are written to.
///
/// A [`Destination`] is a cheap, cloneable handle. Each unit of work opens its own
/// [`DestinationSession`] through [`Destination::connect`]; sessions are never shared between
/// workers.
pub trait Destination: Clone + Send + Sync + 'static {
    type Session: DestinationSession;

    /// Returns the name of the destination.
    fn name() -> &'static str;

    /// Opens a new session against the store.
    fn connect(&self) -> impl Future<Output = ProrepResult<Self::Session>> + Send;

    /// Creates every mapped table and index that does not exist yet.
    fn ensure_tables(&self, schema: &SchemaMap) -> impl Future<Output = ProrepResult<()>> + Send;
}

/// A single connection to a target store.
///
/// Tables are addressed by their target names. Outside of an explicit transaction every
/// statement commits on its own.
pub trait DestinationSession: Send {
    /// Returns the stored epoch of the row with `rec_id`, if the row exists.
    fn find_row(
        &mut self,
        table: &str,
        rec_id: RecId,
    ) -> impl Future<Output = ProrepResult<Option<Epoch>>> + Send;

    /// Deletes the row with `rec_id`, returning the number of removed rows.
    fn delete_row(
        &mut self,
        table: &str,
        rec_id: RecId,
    ) -> impl Future<Output = ProrepResult<u64>> + Send;

    /// Inserts `row`, returning the number of written rows.
    fn insert_row(
        &mut self,
        table: &str,
        row: &TargetRow,
        mode: InsertMode,
    ) -> impl Future<Output = ProrepResult<u64>> + Send;

    /// Opens a transaction that batches every following statement until
    /// [`DestinationSession::commit`].
    fn begin(&mut self) -> impl Future<Output = ProrepResult<()>> + Send;

    /// Commits the open transaction.
    fn commit(&mut self) -> impl Future<Output = ProrepResult<()>> + Send;

    /// Closes the session.
    fn close(self) -> impl Future<Output = ProrepResult<()>> + Send;
}
