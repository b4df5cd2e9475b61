use std::sync::Arc;

use bigdecimal::BigDecimal;
use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use sqlx::postgres::{PgArguments, PgConnectOptions};
use sqlx::query::Query;
use sqlx::{Connection, PgConnection, Postgres};
use tracing::{debug, info};

use crate::destination::{Destination, DestinationSession, InsertMode};
use crate::error::{ProrepError, ProrepResult};
use crate::schema::{
    ColumnType, REPL_EPOCH_COLUMN, REPL_RECID_COLUMN, SchemaMap, create_index_sql,
    create_table_sql, quote_identifier,
};
use crate::types::{Cell, Epoch, RecId, TargetRow};

/// Postgres target store.
///
/// Every session is a dedicated [`PgConnection`] so that a lost connection only affects the
/// worker that owned it.
#[derive(Debug, Clone)]
pub struct PgDestination {
    options: Arc<PgConnectOptions>,
}

impl PgDestination {
    pub fn new(options: PgConnectOptions) -> Self {
        Self {
            options: Arc::new(options),
        }
    }
}

impl Destination for PgDestination {
    type Session = PgSession;

    fn name() -> &'static str {
        "postgres"
    }

    async fn connect(&self) -> ProrepResult<PgSession> {
        let connection = PgConnection::connect_with(&self.options).await?;
        debug!(
            host = self.options.get_host(),
            database = self.options.get_database(),
            "opened target session"
        );

        Ok(PgSession { connection })
    }

    async fn ensure_tables(&self, schema: &SchemaMap) -> ProrepResult<()> {
        let mut session = self.connect().await?;

        for table in schema.tables() {
            let sql = create_table_sql(table);
            session.execute(&sql).await?;
            debug!(table = %table.target_name, "ensured target table");
        }

        for index in schema.indexes() {
            let sql = create_index_sql(index);
            session.execute(&sql).await?;
            debug!(index = %index.name, table = %index.table, "ensured target index");
        }

        info!(
            tables = schema.len(),
            indexes = schema.indexes().len(),
            "target tables ensured"
        );

        session.close().await
    }
}

/// Session over a single Postgres connection.
#[derive(Debug)]
pub struct PgSession {
    connection: PgConnection,
}

impl PgSession {
    async fn execute(&mut self, sql: &str) -> ProrepResult<u64> {
        let result = sqlx::query(sql)
            .execute(&mut self.connection)
            .await
            .map_err(|err| statement_error(err, sql))?;

        Ok(result.rows_affected())
    }
}

impl DestinationSession for PgSession {
    async fn find_row(&mut self, table: &str, rec_id: RecId) -> ProrepResult<Option<Epoch>> {
        let sql = format!(
            "SELECT {} FROM {} WHERE {} = $1 LIMIT 1",
            quote_identifier(REPL_EPOCH_COLUMN),
            quote_identifier(table),
            quote_identifier(REPL_RECID_COLUMN)
        );

        let epoch: Option<i64> = sqlx::query_scalar(&sql)
            .bind(rec_id.into_inner())
            .fetch_optional(&mut self.connection)
            .await
            .map_err(|err| statement_error(err, &sql))?;

        Ok(epoch.map(Epoch))
    }

    async fn delete_row(&mut self, table: &str, rec_id: RecId) -> ProrepResult<u64> {
        let sql = format!(
            "DELETE FROM {} WHERE {} = $1",
            quote_identifier(table),
            quote_identifier(REPL_RECID_COLUMN)
        );

        let result = sqlx::query(&sql)
            .bind(rec_id.into_inner())
            .execute(&mut self.connection)
            .await
            .map_err(|err| statement_error(err, &sql))?;

        Ok(result.rows_affected())
    }

    async fn insert_row(
        &mut self,
        table: &str,
        row: &TargetRow,
        mode: InsertMode,
    ) -> ProrepResult<u64> {
        let sql = insert_sql(table, row, mode);

        let mut query = sqlx::query(&sql)
            .bind(row.rec_id.into_inner())
            .bind(row.epoch.into_inner());
        for (_, cell) in row.columns() {
            query = bind_cell(query, cell);
        }

        let result = query
            .execute(&mut self.connection)
            .await
            .map_err(|err| statement_error(err, &sql).with_context(format!("row: {row}")))?;

        Ok(result.rows_affected())
    }

    async fn begin(&mut self) -> ProrepResult<()> {
        self.execute("BEGIN").await.map(|_| ())
    }

    async fn commit(&mut self) -> ProrepResult<()> {
        self.execute("COMMIT").await.map(|_| ())
    }

    async fn close(self) -> ProrepResult<()> {
        Ok(self.connection.close().await?)
    }
}

/// Builds the insert statement for `row`, with placeholders in column order.
fn insert_sql(table: &str, row: &TargetRow, mode: InsertMode) -> String {
    let mut columns = vec![
        quote_identifier(REPL_RECID_COLUMN),
        quote_identifier(REPL_EPOCH_COLUMN),
    ];
    columns.extend(row.columns().iter().map(|(name, _)| quote_identifier(name)));

    let placeholders = (1..=columns.len())
        .map(|index| format!("${index}"))
        .collect::<Vec<_>>()
        .join(", ");

    let mut sql = format!(
        "INSERT INTO {} ({}) VALUES ({placeholders})",
        quote_identifier(table),
        columns.join(", ")
    );
    if mode == InsertMode::IgnoreConflicts {
        sql.push_str(&format!(
            " ON CONFLICT ({}) DO NOTHING",
            quote_identifier(REPL_RECID_COLUMN)
        ));
    }

    sql
}

/// Binds a cell, using the declared column type for NULLs.
fn bind_cell<'q>(
    query: Query<'q, Postgres, PgArguments>,
    cell: &Cell,
) -> Query<'q, Postgres, PgArguments> {
    match cell {
        Cell::Null(column_type) => match column_type {
            ColumnType::Logical => query.bind(None::<bool>),
            ColumnType::Decimal { .. } => query.bind(None::<BigDecimal>),
            ColumnType::Float => query.bind(None::<f64>),
            ColumnType::Int64 | ColumnType::Recid => query.bind(None::<i64>),
            ColumnType::Integer => query.bind(None::<i32>),
            ColumnType::Datetime => query.bind(None::<NaiveDateTime>),
            ColumnType::DatetimeTz => query.bind(None::<DateTime<Utc>>),
            ColumnType::Date => query.bind(None::<NaiveDate>),
            ColumnType::Blob => query.bind(None::<Vec<u8>>),
            ColumnType::Character { .. }
            | ColumnType::Raw
            | ColumnType::Clob
            | ColumnType::Other => query.bind(None::<String>),
        },
        Cell::Bool(value) => query.bind(*value),
        Cell::I32(value) => query.bind(*value),
        Cell::I64(value) => query.bind(*value),
        Cell::F64(value) => query.bind(*value),
        Cell::Numeric(value) => query.bind(value.clone()),
        Cell::String(value) => query.bind(value.clone()),
        Cell::Date(value) => query.bind(*value),
        Cell::Timestamp(value) => query.bind(*value),
        Cell::TimestampTz(value) => query.bind(*value),
        Cell::Bytes(value) => query.bind(value.clone()),
    }
}

/// Converts a statement failure, recording the statement text in the error detail.
fn statement_error(err: sqlx::Error, sql: &str) -> ProrepError {
    ProrepError::from(err).with_context(format!("statement: {sql}"))
}
