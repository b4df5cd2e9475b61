use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use tokio::sync::Mutex;
use tracing::{debug, info};

use crate::bail;
use crate::destination::{Destination, DestinationSession, InsertMode};
use crate::error::{ErrorKind, ProrepResult};
use crate::schema::SchemaMap;
use crate::types::{Cell, Epoch, RecId, TargetRow};

/// A row held by the [`MemoryDestination`].
#[derive(Debug, Clone, PartialEq)]
pub struct StoredRow {
    pub epoch: Epoch,
    pub columns: BTreeMap<String, Cell>,
}

impl StoredRow {
    pub fn value(&self, column: &str) -> Option<&Cell> {
        self.columns.get(column)
    }
}

#[derive(Debug, Default)]
struct Inner {
    tables: HashMap<String, BTreeMap<RecId, StoredRow>>,
    connections: usize,
    commits: usize,
}

/// In-memory destination for tests and dry runs.
///
/// Tables are created on first write. Writes are visible immediately, so a transaction only
/// affects the commit counter.
#[derive(Debug, Clone, Default)]
pub struct MemoryDestination {
    inner: Arc<Mutex<Inner>>,
}

impl MemoryDestination {
    pub fn new() -> Self {
        Self::default()
    }

    /// Stores a row directly, bypassing conflict resolution.
    pub async fn seed_row(&self, table: &str, rec_id: RecId, epoch: Epoch) {
        let mut inner = self.inner.lock().await;
        inner.tables.entry(table.to_string()).or_default().insert(
            rec_id,
            StoredRow {
                epoch,
                columns: BTreeMap::new(),
            },
        );
    }

    pub async fn row(&self, table: &str, rec_id: RecId) -> Option<StoredRow> {
        let inner = self.inner.lock().await;
        inner
            .tables
            .get(table)
            .and_then(|rows| rows.get(&rec_id))
            .cloned()
    }

    /// Returns every row of `table` ordered by identity.
    pub async fn rows(&self, table: &str) -> Vec<(RecId, StoredRow)> {
        let inner = self.inner.lock().await;
        inner
            .tables
            .get(table)
            .map(|rows| {
                rows.iter()
                    .map(|(rec_id, row)| (*rec_id, row.clone()))
                    .collect()
            })
            .unwrap_or_default()
    }

    pub async fn table_names(&self) -> Vec<String> {
        let inner = self.inner.lock().await;
        let mut names: Vec<_> = inner.tables.keys().cloned().collect();
        names.sort();
        names
    }

    /// Number of sessions opened so far.
    pub async fn connections(&self) -> usize {
        self.inner.lock().await.connections
    }

    /// Number of transactions committed so far.
    pub async fn commits(&self) -> usize {
        self.inner.lock().await.commits
    }
}

impl Destination for MemoryDestination {
    type Session = MemorySession;

    fn name() -> &'static str {
        "memory"
    }

    async fn connect(&self) -> ProrepResult<MemorySession> {
        let mut inner = self.inner.lock().await;
        inner.connections += 1;
        debug!(connections = inner.connections, "opened memory session");

        Ok(MemorySession {
            inner: self.inner.clone(),
            in_transaction: false,
        })
    }

    async fn ensure_tables(&self, schema: &SchemaMap) -> ProrepResult<()> {
        let mut inner = self.inner.lock().await;
        for table in schema.tables() {
            inner.tables.entry(table.target_name.clone()).or_default();
        }
        info!(tables = schema.len(), "ensured memory tables");

        Ok(())
    }
}

/// Session over a [`MemoryDestination`].
#[derive(Debug)]
pub struct MemorySession {
    inner: Arc<Mutex<Inner>>,
    in_transaction: bool,
}

impl DestinationSession for MemorySession {
    async fn find_row(&mut self, table: &str, rec_id: RecId) -> ProrepResult<Option<Epoch>> {
        let inner = self.inner.lock().await;
        Ok(inner
            .tables
            .get(table)
            .and_then(|rows| rows.get(&rec_id))
            .map(|row| row.epoch))
    }

    async fn delete_row(&mut self, table: &str, rec_id: RecId) -> ProrepResult<u64> {
        let mut inner = self.inner.lock().await;
        let removed = inner
            .tables
            .get_mut(table)
            .and_then(|rows| rows.remove(&rec_id));

        Ok(u64::from(removed.is_some()))
    }

    async fn insert_row(
        &mut self,
        table: &str,
        row: &TargetRow,
        mode: InsertMode,
    ) -> ProrepResult<u64> {
        let mut inner = self.inner.lock().await;
        let rows = inner.tables.entry(table.to_string()).or_default();

        if rows.contains_key(&row.rec_id) {
            match mode {
                InsertMode::IgnoreConflicts => return Ok(0),
                InsertMode::Strict => bail!(
                    ErrorKind::DestinationConstraintViolation,
                    "Duplicate row identity",
                    format!("table '{table}', repl_recid {}", row.rec_id)
                ),
            }
        }

        rows.insert(
            row.rec_id,
            StoredRow {
                epoch: row.epoch,
                columns: row.columns().iter().cloned().collect(),
            },
        );

        Ok(1)
    }

    async fn begin(&mut self) -> ProrepResult<()> {
        if self.in_transaction {
            bail!(ErrorKind::InvalidState, "A transaction is already open");
        }
        self.in_transaction = true;

        Ok(())
    }

    async fn commit(&mut self) -> ProrepResult<()> {
        if !self.in_transaction {
            bail!(ErrorKind::InvalidState, "No transaction is open");
        }
        self.in_transaction = false;
        self.inner.lock().await.commits += 1;

        Ok(())
    }

    async fn close(self) -> ProrepResult<()> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn row(rec_id: i64, epoch: i64) -> TargetRow {
        TargetRow::new(
            RecId(rec_id),
            Epoch(epoch),
            vec![("name".to_string(), Cell::String("Acme".to_string()))],
        )
    }

    #[tokio::test]
    async fn insert_find_delete() {
        let destination = MemoryDestination::new();
        let mut session = destination.connect().await.unwrap();

        assert_eq!(session.find_row("customer", RecId(1)).await.unwrap(), None);
        assert_eq!(
            session
                .insert_row("customer", &row(1, 10), InsertMode::Strict)
                .await
                .unwrap(),
            1
        );
        assert_eq!(
            session.find_row("customer", RecId(1)).await.unwrap(),
            Some(Epoch(10))
        );
        assert_eq!(session.delete_row("customer", RecId(1)).await.unwrap(), 1);
        assert_eq!(session.delete_row("customer", RecId(1)).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn duplicate_inserts_follow_the_mode() {
        let destination = MemoryDestination::new();
        let mut session = destination.connect().await.unwrap();
        session
            .insert_row("customer", &row(1, 10), InsertMode::Strict)
            .await
            .unwrap();

        let ignored = session
            .insert_row("customer", &row(1, 20), InsertMode::IgnoreConflicts)
            .await
            .unwrap();
        assert_eq!(ignored, 0);
        assert_eq!(
            destination.row("customer", RecId(1)).await.unwrap().epoch,
            Epoch(10)
        );

        let err = session
            .insert_row("customer", &row(1, 20), InsertMode::Strict)
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::DestinationConstraintViolation);
    }

    #[tokio::test]
    async fn transactions_are_counted() {
        let destination = MemoryDestination::new();
        let mut session = destination.connect().await.unwrap();

        session.begin().await.unwrap();
        assert!(session.begin().await.is_err());
        session.commit().await.unwrap();
        assert!(session.commit().await.is_err());

        assert_eq!(destination.commits().await, 1);
        assert_eq!(destination.connections().await, 1);
    }
}
