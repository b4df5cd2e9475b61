use std::collections::HashMap;
use std::path::Path;

use prorep_config::decode_artifact;
use serde::{Deserialize, Deserializer};
use tracing::{debug, warn};

use crate::error::{ErrorKind, ProrepResult};
use crate::prorep_error;
use crate::schema::ColumnType;

/// An `[original, target]` name pair as written by the schema-conversion tools.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct NamePair(pub String, pub String);

impl NamePair {
    pub fn source(&self) -> &str {
        &self.0
    }

    pub fn target(&self) -> &str {
        &self.1
    }
}

/// Column definition inside the DDL artifact.
#[derive(Debug, Clone, Deserialize)]
pub struct DdlColumn {
    pub name: NamePair,
    #[serde(rename = "type")]
    pub type_tag: String,
    #[serde(default, deserialize_with = "lenient_u32")]
    pub extent: Option<u32>,
    #[serde(default, rename = "max-width", deserialize_with = "lenient_u32")]
    pub max_width: Option<u32>,
    #[serde(default, deserialize_with = "lenient_u32")]
    pub decimals: Option<u32>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DdlTable {
    pub name: NamePair,
    pub columns: Vec<DdlColumn>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DdlIndexDetails {
    pub columns: Vec<NamePair>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DdlIndex {
    pub index_name: NamePair,
    pub table_name: NamePair,
    pub index_details: DdlIndexDetails,
}

/// The parts of the DDL artifact consumed by the engine.
///
/// The `config` block is read separately by `prorep_config::load_target_config`.
#[derive(Debug, Clone, Deserialize)]
pub struct DdlArtifact {
    pub tables: Vec<DdlTable>,
    #[serde(default)]
    pub indexes: Vec<DdlIndex>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColumnMapping {
    pub source_name: String,
    pub target_name: String,
    pub column_type: ColumnType,
    /// Declared array size of an extent column.
    pub extent: Option<u32>,
}

impl ColumnMapping {
    pub fn is_extent(&self) -> bool {
        self.extent.is_some()
    }

    /// Postgres type of the target column. Extent columns are stored as delimited text.
    pub fn target_type(&self) -> String {
        if self.is_extent() {
            ColumnType::Raw.target_type()
        } else {
            self.column_type.target_type()
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableMapping {
    pub source_name: String,
    pub target_name: String,
    columns: Vec<ColumnMapping>,
    by_source: HashMap<String, usize>,
}

impl TableMapping {
    pub fn new(
        source_name: impl Into<String>,
        target_name: impl Into<String>,
        columns: Vec<ColumnMapping>,
    ) -> Self {
        let by_source = columns
            .iter()
            .enumerate()
            .map(|(index, column)| (column.source_name.clone(), index))
            .collect();

        Self {
            source_name: source_name.into(),
            target_name: target_name.into(),
            columns,
            by_source,
        }
    }

    /// Returns the columns in artifact order.
    pub fn columns(&self) -> &[ColumnMapping] {
        &self.columns
    }

    /// Looks up a column by its source name.
    pub fn column(&self, source_name: &str) -> ProrepResult<&ColumnMapping> {
        self.by_source
            .get(source_name)
            .and_then(|index| self.columns.get(*index))
            .ok_or_else(|| {
                prorep_error!(
                    ErrorKind::MissingColumnMapping,
                    "Column is not in the schema map",
                    format!("table '{}', column '{source_name}'", self.source_name)
                )
            })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndexMapping {
    pub name: String,
    pub table: String,
    pub columns: Vec<String>,
}

/// Immutable lookup from source table names to target tables, columns and types.
#[derive(Debug, Clone, Default)]
pub struct SchemaMap {
    tables: HashMap<String, TableMapping>,
    indexes: Vec<IndexMapping>,
}

impl SchemaMap {
    /// Reads and parses the DDL artifact at `path`.
    ///
    /// Artifacts are produced from legacy dumps and may be Latin-1 encoded. Bytes that are not
    /// valid UTF-8 are decoded as Latin-1.
    pub fn load(path: &Path) -> ProrepResult<SchemaMap> {
        let bytes = std::fs::read(path).map_err(|err| {
            prorep_error!(
                ErrorKind::ConfigError,
                "Could not read the DDL artifact",
                path.display(),
                source: err
            )
        })?;
        if std::str::from_utf8(&bytes).is_err() {
            warn!(path = %path.display(), "DDL artifact is not UTF-8, decoding as Latin-1");
        }

        Self::parse(&decode_artifact(bytes))
    }

    /// Parses a DDL artifact document.
    pub fn parse(text: &str) -> ProrepResult<SchemaMap> {
        let artifact: DdlArtifact = serde_json::from_str(text).map_err(|err| {
            prorep_error!(
                ErrorKind::ConfigError,
                "The DDL artifact is not valid",
                err.to_string(),
                source: err
            )
        })?;

        Ok(Self::from_artifact(artifact))
    }

    pub fn from_artifact(artifact: DdlArtifact) -> SchemaMap {
        let mut tables = HashMap::with_capacity(artifact.tables.len());
        for table in artifact.tables {
            let columns = table
                .columns
                .into_iter()
                .map(|column| {
                    let column_type =
                        ColumnType::from_tag(&column.type_tag, column.max_width, column.decimals);
                    if column_type == ColumnType::Other {
                        debug!(
                            table = table.name.source(),
                            column = column.name.source(),
                            type_tag = %column.type_tag,
                            "unknown column type, values will be written as text"
                        );
                    }

                    ColumnMapping {
                        source_name: column.name.0,
                        target_name: column.name.1,
                        column_type,
                        extent: column.extent,
                    }
                })
                .collect();

            let NamePair(source_name, target_name) = table.name;
            tables.insert(
                source_name.clone(),
                TableMapping::new(source_name, target_name, columns),
            );
        }

        let indexes = artifact
            .indexes
            .into_iter()
            .map(|index| IndexMapping {
                name: index.index_name.1,
                table: index.table_name.1,
                columns: index
                    .index_details
                    .columns
                    .into_iter()
                    .map(|column| column.1)
                    .collect(),
            })
            .collect();

        SchemaMap { tables, indexes }
    }

    /// Looks up a table by its source name.
    pub fn table(&self, source_name: &str) -> ProrepResult<&TableMapping> {
        self.tables.get(source_name).ok_or_else(|| {
            prorep_error!(
                ErrorKind::MissingTableMapping,
                "Table is not in the schema map",
                source_name
            )
        })
    }

    /// Returns every mapped table, ordered by source name.
    pub fn tables(&self) -> Vec<&TableMapping> {
        let mut tables: Vec<_> = self.tables.values().collect();
        tables.sort_by(|a, b| a.source_name.cmp(&b.source_name));
        tables
    }

    pub fn indexes(&self) -> &[IndexMapping] {
        &self.indexes
    }

    pub fn len(&self) -> usize {
        self.tables.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tables.is_empty()
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum NumberOrString {
    Number(u32),
    String(String),
}

/// Accepts numeric attributes written either as JSON numbers or as strings.
fn lenient_u32<'de, D>(deserializer: D) -> Result<Option<u32>, D::Error>
where
    D: Deserializer<'de>,
{
    match Option::<NumberOrString>::deserialize(deserializer)? {
        None => Ok(None),
        Some(NumberOrString::Number(value)) => Ok(Some(value)),
        Some(NumberOrString::String(value)) => value
            .trim()
            .parse()
            .map(Some)
            .map_err(serde::de::Error::custom),
    }
}
