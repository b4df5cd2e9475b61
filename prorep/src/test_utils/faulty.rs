use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::Mutex;

use crate::destination::{Destination, DestinationSession, InsertMode};
use crate::error::{ErrorKind, ProrepError, ProrepResult};
use crate::prorep_error;
use crate::schema::SchemaMap;
use crate::types::{Epoch, RecId, TargetRow};

/// Statement classes that faults can be injected into.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StatementKind {
    Connect,
    Find,
    Delete,
    Insert,
    Begin,
    Commit,
}

/// Kind of failure to inject.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Fault {
    /// A dropped connection, retried by the resilience layer.
    Transient,
    /// A failure that is never retried.
    Fatal,
}

impl Fault {
    fn into_error(self, kind: StatementKind) -> ProrepError {
        match self {
            Fault::Transient => prorep_error!(
                ErrorKind::DestinationConnectionFailed,
                "Injected connection failure",
                format!("statement: {kind:?}")
            ),
            Fault::Fatal => prorep_error!(
                ErrorKind::DestinationQueryFailed,
                "Injected query failure",
                format!("statement: {kind:?}")
            ),
        }
    }
}

type Faults = Arc<Mutex<HashMap<StatementKind, Vec<Fault>>>>;

async fn take_fault(faults: &Faults, kind: StatementKind) -> ProrepResult<()> {
    let mut faults = faults.lock().await;
    match faults.get_mut(&kind).and_then(|pending| pending.pop()) {
        Some(fault) => Err(fault.into_error(kind)),
        None => Ok(()),
    }
}

/// Destination wrapper that fails chosen statements before they reach the wrapped destination.
///
/// Faults are shared by every session opened through the wrapper and are consumed in the order
/// they fire, so a statement that failed has not been applied.
#[derive(Debug, Clone)]
pub struct FaultyDestination<D> {
    inner: D,
    faults: Faults,
}

impl<D> FaultyDestination<D> {
    pub fn wrap(destination: D) -> Self {
        Self {
            inner: destination,
            faults: Arc::default(),
        }
    }

    /// Makes the next `times` statements of `kind` fail with `fault`.
    pub async fn inject(&self, kind: StatementKind, fault: Fault, times: usize) {
        let mut faults = self.faults.lock().await;
        faults
            .entry(kind)
            .or_default()
            .extend(std::iter::repeat_n(fault, times));
    }

    /// Returns how many injected faults of `kind` have not fired yet.
    pub async fn pending(&self, kind: StatementKind) -> usize {
        let faults = self.faults.lock().await;
        faults.get(&kind).map_or(0, Vec::len)
    }
}

impl<D: Destination> Destination for FaultyDestination<D> {
    type Session = FaultySession<D::Session>;

    fn name() -> &'static str {
        "faulty"
    }

    async fn connect(&self) -> ProrepResult<Self::Session> {
        take_fault(&self.faults, StatementKind::Connect).await?;
        let inner = self.inner.connect().await?;

        Ok(FaultySession {
            inner,
            faults: self.faults.clone(),
        })
    }

    async fn ensure_tables(&self, schema: &SchemaMap) -> ProrepResult<()> {
        self.inner.ensure_tables(schema).await
    }
}

/// Session opened through a [`FaultyDestination`].
#[derive(Debug)]
pub struct FaultySession<S> {
    inner: S,
    faults: Faults,
}

impl<S: DestinationSession> DestinationSession for FaultySession<S> {
    async fn find_row(&mut self, table: &str, rec_id: RecId) -> ProrepResult<Option<Epoch>> {
        take_fault(&self.faults, StatementKind::Find).await?;
        self.inner.find_row(table, rec_id).await
    }

    async fn delete_row(&mut self, table: &str, rec_id: RecId) -> ProrepResult<u64> {
        take_fault(&self.faults, StatementKind::Delete).await?;
        self.inner.delete_row(table, rec_id).await
    }

    async fn insert_row(
        &mut self,
        table: &str,
        row: &TargetRow,
        mode: InsertMode,
    ) -> ProrepResult<u64> {
        take_fault(&self.faults, StatementKind::Insert).await?;
        self.inner.insert_row(table, row, mode).await
    }

    async fn begin(&mut self) -> ProrepResult<()> {
        take_fault(&self.faults, StatementKind::Begin).await?;
        self.inner.begin().await
    }

    async fn commit(&mut self) -> ProrepResult<()> {
        take_fault(&self.faults, StatementKind::Commit).await?;
        self.inner.commit().await
    }

    async fn close(self) -> ProrepResult<()> {
        self.inner.close().await
    }
}
