/// Width used for character columns that declare no maximum width.
pub const DEFAULT_CHARACTER_WIDTH: u32 = 255;

/// Safety margin added to a declared character width.
pub const CHARACTER_WIDTH_MARGIN: u32 = 2;

/// Precision of every decimal column.
pub const DECIMAL_PRECISION: u32 = 20;

/// Scale used for decimal columns that declare no decimals.
pub const DEFAULT_DECIMAL_SCALE: u32 = 4;

/// Source column type as declared in the DDL artifact.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ColumnType {
    Character { max_width: Option<u32> },
    Logical,
    Decimal { scale: Option<u32> },
    Float,
    Raw,
    Int64,
    Integer,
    Recid,
    Datetime,
    DatetimeTz,
    Date,
    Clob,
    Blob,
    /// A type tag outside the fixed table. Values are written as text.
    Other,
}

impl ColumnType {
    /// Resolves a source type tag plus its width/scale attributes.
    pub fn from_tag(tag: &str, max_width: Option<u32>, decimals: Option<u32>) -> ColumnType {
        match tag.trim().to_ascii_lowercase().as_str() {
            "character" => ColumnType::Character { max_width },
            "logical" => ColumnType::Logical,
            "decimal" => ColumnType::Decimal { scale: decimals },
            "float" => ColumnType::Float,
            "raw" => ColumnType::Raw,
            "int64" => ColumnType::Int64,
            "integer" => ColumnType::Integer,
            "recid" => ColumnType::Recid,
            "datetime" => ColumnType::Datetime,
            "datetime-tz" => ColumnType::DatetimeTz,
            "date" => ColumnType::Date,
            "clob" => ColumnType::Clob,
            "blob" => ColumnType::Blob,
            _ => ColumnType::Other,
        }
    }

    /// Renders the Postgres column type for this source type.
    pub fn target_type(&self) -> String {
        match self {
            ColumnType::Character { max_width } => {
                let width = max_width
                    .map(|width| width.saturating_add(CHARACTER_WIDTH_MARGIN))
                    .unwrap_or(DEFAULT_CHARACTER_WIDTH);
                format!("VARCHAR({width})")
            }
            ColumnType::Logical => "BOOLEAN".to_owned(),
            ColumnType::Decimal { scale } => format!(
                "NUMERIC({DECIMAL_PRECISION}, {})",
                scale.unwrap_or(DEFAULT_DECIMAL_SCALE)
            ),
            ColumnType::Float => "DOUBLE PRECISION".to_owned(),
            ColumnType::Raw | ColumnType::Clob | ColumnType::Other => "TEXT".to_owned(),
            ColumnType::Int64 | ColumnType::Recid => "BIGINT".to_owned(),
            ColumnType::Integer => "INTEGER".to_owned(),
            ColumnType::Datetime => "TIMESTAMP".to_owned(),
            ColumnType::DatetimeTz => "TIMESTAMPTZ".to_owned(),
            ColumnType::Date => "DATE".to_owned(),
            ColumnType::Blob => "BYTEA".to_owned(),
        }
    }
}
