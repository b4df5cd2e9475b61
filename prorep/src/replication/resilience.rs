//! Single-retry-after-reconnect handling for target store statements.
//!
//! Every statement issued through a [`ResilientSession`] that fails with a transient disconnect
//! is retried exactly once on a fresh session. Any other failure, or a second failure after the
//! retry, is returned to the caller.

use std::fmt;

use metrics::counter;
use tracing::{debug, warn};

use crate::destination::{Destination, DestinationSession, InsertMode};
use crate::error::ProrepResult;
use crate::failpoints::{APPLY_ROW__BEFORE_WRITE, prorep_fail_point};
use crate::metrics::PROREP_RECONNECTS_TOTAL;
use crate::types::{Epoch, RecId, TargetRow};

/// A statement issued against the target store.
#[derive(Debug, Clone, Copy)]
pub enum Statement<'a> {
    Find {
        table: &'a str,
        rec_id: RecId,
    },
    Delete {
        table: &'a str,
        rec_id: RecId,
    },
    Insert {
        table: &'a str,
        row: &'a TargetRow,
        mode: InsertMode,
    },
}

impl Statement<'_> {
    fn is_write(&self) -> bool {
        !matches!(self, Statement::Find { .. })
    }
}

impl fmt::Display for Statement<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Statement::Find { table, rec_id } => write!(f, "find {table} repl_recid={rec_id}"),
            Statement::Delete { table, rec_id } => {
                write!(f, "delete {table} repl_recid={rec_id}")
            }
            Statement::Insert { table, row, mode } => write!(f, "insert {table} {row} ({mode:?})"),
        }
    }
}

/// Result of a [`Statement`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatementOutput {
    Found(Option<Epoch>),
    Affected(u64),
}

/// A destination session that survives one transient disconnect per statement.
///
/// In batched mode every statement runs inside one transaction that is committed by
/// [`ResilientSession::finish`]. A reconnect would silently drop the statements already sent in
/// that transaction, so once anything is pending a transient failure is returned instead of
/// retried.
pub struct ResilientSession<D: Destination> {
    destination: D,
    session: D::Session,
    batched: bool,
    pending: usize,
    reconnects: u32,
}

impl<D: Destination> ResilientSession<D> {
    /// Opens a session, starting a transaction when `batched` is set.
    pub async fn open(destination: D, batched: bool) -> ProrepResult<Self> {
        let mut session = destination.connect().await?;
        if batched {
            session.begin().await?;
        }

        Ok(Self {
            destination,
            session,
            batched,
            pending: 0,
            reconnects: 0,
        })
    }

    /// Number of reconnects performed by this session.
    pub fn reconnects(&self) -> u32 {
        self.reconnects
    }

    /// Number of writes sent in the open transaction and not yet committed.
    pub fn pending(&self) -> usize {
        self.pending
    }

    pub async fn find_row(&mut self, table: &str, rec_id: RecId) -> ProrepResult<Option<Epoch>> {
        match self.run(Statement::Find { table, rec_id }).await? {
            StatementOutput::Found(epoch) => Ok(epoch),
            StatementOutput::Affected(_) => Ok(None),
        }
    }

    pub async fn delete_row(&mut self, table: &str, rec_id: RecId) -> ProrepResult<u64> {
        match self.run(Statement::Delete { table, rec_id }).await? {
            StatementOutput::Affected(count) => Ok(count),
            StatementOutput::Found(_) => Ok(0),
        }
    }

    pub async fn insert_row(
        &mut self,
        table: &str,
        row: &TargetRow,
        mode: InsertMode,
    ) -> ProrepResult<u64> {
        match self.run(Statement::Insert { table, row, mode }).await? {
            StatementOutput::Affected(count) => Ok(count),
            StatementOutput::Found(_) => Ok(0),
        }
    }

    /// Commits the batched transaction, if any, and closes the session.
    pub async fn finish(mut self) -> ProrepResult<()> {
        if self.batched {
            self.session.commit().await?;
            debug!(statements = self.pending, "committed batched statements");
            self.pending = 0;
        }

        self.session.close().await
    }

    async fn run(&mut self, statement: Statement<'_>) -> ProrepResult<StatementOutput> {
        let err = match execute(&mut self.session, statement).await {
            Ok(output) => return Ok(self.record(statement, output)),
            Err(err) => err,
        };

        if !err.kind().is_transient() {
            return Err(err);
        }

        if self.batched && self.pending > 0 {
            warn!(
                pending = self.pending,
                %statement,
                "target connection lost with uncommitted statements, not retrying"
            );
            return Err(err.with_context(format!(
                "{} uncommitted statement(s) would be lost by reconnecting",
                self.pending
            )));
        }

        warn!(%statement, error = %err, "target connection lost, reconnecting and retrying once");
        self.reconnect().await?;

        let output = execute(&mut self.session, statement).await?;
        Ok(self.record(statement, output))
    }

    fn record(&mut self, statement: Statement<'_>, output: StatementOutput) -> StatementOutput {
        if self.batched && statement.is_write() {
            self.pending += 1;
        }

        output
    }

    async fn reconnect(&mut self) -> ProrepResult<()> {
        let mut session = self.destination.connect().await?;
        if self.batched {
            session.begin().await?;
        }

        // The previous session is broken; dropping it releases whatever is left of it.
        self.session = session;
        self.reconnects += 1;
        counter!(PROREP_RECONNECTS_TOTAL).increment(1);

        Ok(())
    }
}

async fn execute<S: DestinationSession>(
    session: &mut S,
    statement: Statement<'_>,
) -> ProrepResult<StatementOutput> {
    match statement {
        Statement::Find { table, rec_id } => Ok(StatementOutput::Found(
            session.find_row(table, rec_id).await?,
        )),
        Statement::Delete { table, rec_id } => Ok(StatementOutput::Affected(
            session.delete_row(table, rec_id).await?,
        )),
        Statement::Insert { table, row, mode } => {
            prorep_fail_point(APPLY_ROW__BEFORE_WRITE)?;
            Ok(StatementOutput::Affected(
                session.insert_row(table, row, mode).await?,
            ))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::destination::memory::MemoryDestination;
    use crate::error::ErrorKind;
    use crate::test_utils::faulty::{Fault, FaultyDestination, StatementKind};
    use crate::types::Cell;

    fn row(rec_id: i64) -> TargetRow {
        TargetRow::new(
            RecId(rec_id),
            Epoch(1),
            vec![("name".to_string(), Cell::String("Acme".to_string()))],
        )
    }

    #[tokio::test]
    async fn transient_failure_is_retried_once_after_reconnect() {
        let memory = MemoryDestination::new();
        let destination = FaultyDestination::wrap(memory.clone());
        destination
            .inject(StatementKind::Insert, Fault::Transient, 1)
            .await;

        let mut session = ResilientSession::open(destination.clone(), false)
            .await
            .unwrap();
        let written = session
            .insert_row("customer", &row(1), InsertMode::Strict)
            .await
            .unwrap();

        assert_eq!(written, 1);
        assert_eq!(session.reconnects(), 1);
        assert_eq!(memory.connections().await, 2);
        session.finish().await.unwrap();
    }

    #[tokio::test]
    async fn second_transient_failure_escalates() {
        let destination = FaultyDestination::wrap(MemoryDestination::new());
        destination
            .inject(StatementKind::Find, Fault::Transient, 2)
            .await;

        let mut session = ResilientSession::open(destination, false).await.unwrap();
        let err = session.find_row("customer", RecId(1)).await.unwrap_err();

        assert_eq!(err.kind(), ErrorKind::DestinationConnectionFailed);
        assert_eq!(session.reconnects(), 1);
    }

    #[tokio::test]
    async fn fatal_failures_are_not_retried() {
        let destination = FaultyDestination::wrap(MemoryDestination::new());
        destination
            .inject(StatementKind::Delete, Fault::Fatal, 1)
            .await;

        let mut session = ResilientSession::open(destination, false).await.unwrap();
        let err = session.delete_row("customer", RecId(1)).await.unwrap_err();

        assert_eq!(err.kind(), ErrorKind::DestinationQueryFailed);
        assert_eq!(session.reconnects(), 0);
    }

    #[tokio::test]
    async fn batched_mode_does_not_retry_with_pending_writes() {
        let memory = MemoryDestination::new();
        let destination = FaultyDestination::wrap(memory.clone());

        let mut session = ResilientSession::open(destination.clone(), true)
            .await
            .unwrap();
        session
            .insert_row("customer", &row(1), InsertMode::IgnoreConflicts)
            .await
            .unwrap();
        assert_eq!(session.pending(), 1);

        destination
            .inject(StatementKind::Insert, Fault::Transient, 1)
            .await;
        let err = session
            .insert_row("customer", &row(2), InsertMode::IgnoreConflicts)
            .await
            .unwrap_err();

        assert!(err.kind().is_transient());
        assert_eq!(session.reconnects(), 0);
        assert_eq!(memory.commits().await, 0);
    }

    #[tokio::test]
    async fn batched_mode_retries_before_any_write() {
        let memory = MemoryDestination::new();
        let destination = FaultyDestination::wrap(memory.clone());
        destination
            .inject(StatementKind::Insert, Fault::Transient, 1)
            .await;

        let mut session = ResilientSession::open(destination, true).await.unwrap();
        session
            .insert_row("customer", &row(1), InsertMode::IgnoreConflicts)
            .await
            .unwrap();
        session.finish().await.unwrap();

        assert_eq!(memory.commits().await, 1);
        assert!(memory.row("customer", RecId(1)).await.is_some());
    }
}
