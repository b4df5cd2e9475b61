use crate::schema::{IndexMapping, TableMapping};

/// Target primary-key column holding the source row identity.
pub const REPL_RECID_COLUMN: &str = "repl_recid";

/// Target column holding the epoch of the last applied mutation.
pub const REPL_EPOCH_COLUMN: &str = "repl_epoch";

/// Quotes a Postgres identifier, doubling embedded quotes.
pub fn quote_identifier(identifier: &str) -> String {
    format!("\"{}\"", identifier.replace('"', "\"\""))
}

/// Builds the `CREATE TABLE IF NOT EXISTS` statement for a mapped table.
pub fn create_table_sql(table: &TableMapping) -> String {
    let mut columns = vec![
        format!("{} BIGINT PRIMARY KEY NOT NULL", quote_identifier(REPL_RECID_COLUMN)),
        format!("{} BIGINT NOT NULL", quote_identifier(REPL_EPOCH_COLUMN)),
    ];
    columns.extend(table.columns().iter().map(|column| {
        format!(
            "{} {}",
            quote_identifier(&column.target_name),
            column.target_type()
        )
    }));

    format!(
        "CREATE TABLE IF NOT EXISTS {} ({})",
        quote_identifier(&table.target_name),
        columns.join(", ")
    )
}

/// Builds the `CREATE INDEX IF NOT EXISTS` statement for a mapped index.
pub fn create_index_sql(index: &IndexMapping) -> String {
    let columns = index
        .columns
        .iter()
        .map(|column| quote_identifier(column))
        .collect::<Vec<_>>()
        .join(", ");

    format!(
        "CREATE INDEX IF NOT EXISTS {} ON {} ({columns})",
        quote_identifier(&index.name),
        quote_identifier(&index.table)
    )
}
