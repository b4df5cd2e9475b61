//! Conflict resolution and row application.
//!
//! Rows carry a producer-assigned epoch that acts as a logical clock per row identity. A change
//! is applied only when it is strictly newer than what the target already holds; everything else
//! is counted as a skip. Upserts are realized as delete-then-insert.

use std::sync::Arc;

use metrics::counter;
use prorep_config::shared::EngineConfig;
use tracing::{debug, info};

use crate::conversions::json_to_cell;
use crate::destination::{Destination, InsertMode};
use crate::error::ProrepResult;
use crate::metrics::{OUTCOME_LABEL, PROREP_ROWS_APPLIED_TOTAL, TABLE_LABEL};
use crate::replication::resilience::ResilientSession;
use crate::schema::{SchemaMap, TableMapping};
use crate::types::{
    ApplyOutcome, ChangeRow, Disposition, EntryMetadata, Operation, RowOutcome, TargetRow,
};

/// A slice of an entry's rows applied on one target session.
#[derive(Debug, Clone)]
pub struct ApplyUnit {
    pub seq: usize,
    pub metadata: EntryMetadata,
    pub rows: Vec<ChangeRow>,
    /// 1-based batch number when the entry's rows were split.
    pub batch: Option<usize>,
}

/// Applies change rows to a [`Destination`] according to the engine configuration.
#[derive(Debug, Clone)]
pub struct ApplyEngine<D> {
    destination: D,
    schema: Arc<SchemaMap>,
    config: Arc<EngineConfig>,
}

impl<D: Destination> ApplyEngine<D> {
    pub fn new(destination: D, schema: Arc<SchemaMap>, config: Arc<EngineConfig>) -> Self {
        Self {
            destination,
            schema,
            config,
        }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    fn insert_mode(&self) -> InsertMode {
        if self.config.ignore_insert_conflicts() {
            InsertMode::IgnoreConflicts
        } else {
            InsertMode::Strict
        }
    }

    /// Applies every row of `unit` in order on a dedicated session.
    ///
    /// Returns the per-row outcome counts. Any error aborts the unit; in fast-insert mode
    /// nothing of the unit is committed then.
    pub async fn apply(&self, unit: ApplyUnit) -> ProrepResult<ApplyOutcome> {
        let table = self.schema.table(&unit.metadata.table)?;
        let operation = unit.metadata.operation;

        let mut outcome = ApplyOutcome::new(unit.seq, Disposition::Applied)
            .with_target(table.source_name.clone(), operation);
        if let Some(batch) = unit.batch {
            outcome = outcome.with_batch(batch);
        }

        debug!(
            worker_id = %outcome.worker_id,
            table = %table.target_name,
            %operation,
            rows = unit.rows.len(),
            batch = ?unit.batch,
            "applying rows"
        );

        let mut session =
            ResilientSession::open(self.destination.clone(), self.config.fast_insert).await?;

        for row in &unit.rows {
            let row_outcome = self
                .apply_row(&mut session, table, operation, row)
                .await
                .map_err(|err| {
                    err.with_context(format!(
                        "table: {}, operation: {operation}, rec_id: {}, epoch_time: {}",
                        table.source_name, row.rec_id, row.epoch_time
                    ))
                })?;

            outcome.record(row_outcome);
            counter!(
                PROREP_ROWS_APPLIED_TOTAL,
                TABLE_LABEL => table.target_name.clone(),
                OUTCOME_LABEL => row_outcome.as_str(),
            )
            .increment(1);
        }

        session.finish().await?;

        info!(
            worker_id = %outcome.worker_id,
            seq = outcome.seq,
            table = %table.source_name,
            %operation,
            batch = ?outcome.batch,
            counts = %outcome.counts,
            "unit applied"
        );

        Ok(outcome)
    }

    async fn apply_row(
        &self,
        session: &mut ResilientSession<D>,
        table: &TableMapping,
        operation: Operation,
        row: &ChangeRow,
    ) -> ProrepResult<RowOutcome> {
        let target = table.target_name.as_str();

        if operation.is_delete() {
            return match session.find_row(target, row.rec_id).await? {
                None => Ok(RowOutcome::Skip),
                Some(stored) if stored >= row.epoch_time => Ok(RowOutcome::Skip),
                Some(_) => {
                    session.delete_row(target, row.rec_id).await?;
                    Ok(RowOutcome::Delete)
                }
            };
        }

        if self.config.fast_insert {
            let target_row = to_target_row(table, row)?;
            session
                .insert_row(target, &target_row, self.insert_mode())
                .await?;
            return Ok(RowOutcome::Insert);
        }

        let stored = session.find_row(target, row.rec_id).await?;
        if let Some(stored) = stored
            && stored >= row.epoch_time
        {
            return Ok(RowOutcome::Skip);
        }

        let target_row = to_target_row(table, row)?;
        let outcome = match stored {
            Some(_) => {
                session.delete_row(target, row.rec_id).await?;
                RowOutcome::Update
            }
            None => RowOutcome::Insert,
        };
        session
            .insert_row(target, &target_row, self.insert_mode())
            .await?;

        Ok(outcome)
    }
}

/// Maps a change row onto the target table: renames columns, flattens extents and converts
/// values to their declared types.
pub fn to_target_row(table: &TableMapping, row: &ChangeRow) -> ProrepResult<TargetRow> {
    let columns = row
        .columns
        .iter()
        .map(|(name, value)| {
            let column = table.column(name)?;
            Ok((column.target_name.clone(), json_to_cell(column, value)?))
        })
        .collect::<ProrepResult<Vec<_>>>()?;

    Ok(TargetRow::new(row.rec_id, row.epoch_time, columns))
}
