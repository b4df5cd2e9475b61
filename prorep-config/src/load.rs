use serde::Deserialize;
use std::path::{Path, PathBuf};
use thiserror::Error;

use crate::shared::{TargetConnectionConfig, ValidationError};

/// Prefix for environment variable configuration overrides.
const ENV_PREFIX: &str = "APP";

/// Separator between environment variable prefix and key segments.
const ENV_PREFIX_SEPARATOR: &str = "_";

/// Separator for nested configuration keys in environment variables.
const ENV_SEPARATOR: &str = "__";

/// Errors that can occur while loading the target connection configuration.
#[derive(Debug, Error)]
pub enum LoadConfigError {
    /// The DDL artifact does not exist.
    #[error("DDL artifact `{0}` does not exist")]
    MissingArtifact(PathBuf),

    /// The DDL artifact could not be read.
    #[error("failed to read DDL artifact `{path}`: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },

    /// Failed to build the layered configuration.
    #[error("failed to load configuration from `{path}`: {source}")]
    Builder {
        path: PathBuf,
        source: config::ConfigError,
    },

    /// The configuration was parsed but deserialization failed.
    #[error("failed to deserialize the `config` block: {0}")]
    Deserialization(#[source] config::ConfigError),

    /// The resulting configuration is invalid.
    #[error("invalid target configuration: {0}")]
    Validation(#[from] ValidationError),
}

/// Subset of the artifact that carries connection settings.
#[derive(Debug, Deserialize)]
struct ArtifactSettings {
    config: TargetConnectionConfig,
}

/// Decodes DDL artifact bytes as UTF-8, falling back to Latin-1.
///
/// Artifacts are produced from legacy dumps, so any byte sequence is accepted.
pub fn decode_artifact(bytes: Vec<u8>) -> String {
    match String::from_utf8(bytes) {
        Ok(text) => text,
        Err(err) => err.into_bytes().into_iter().map(char::from).collect(),
    }
}

/// Loads the target connection settings from the DDL artifact at `artifact`.
///
/// The artifact's `config` block is the base layer; `APP_`-prefixed environment variables are
/// applied on top, with nested keys separated by double underscores (`APP_CONFIG__DBPASS`).
/// The rest of the artifact (tables, indexes) is ignored here.
pub fn load_target_config(artifact: &Path) -> Result<TargetConnectionConfig, LoadConfigError> {
    if !artifact.is_file() {
        return Err(LoadConfigError::MissingArtifact(artifact.to_path_buf()));
    }

    let bytes = std::fs::read(artifact).map_err(|source| LoadConfigError::Read {
        path: artifact.to_path_buf(),
        source,
    })?;
    let text = decode_artifact(bytes);

    let environment_source = config::Environment::with_prefix(ENV_PREFIX)
        .prefix_separator(ENV_PREFIX_SEPARATOR)
        .separator(ENV_SEPARATOR)
        .try_parsing(true);

    let settings = config::Config::builder()
        .add_source(config::File::from_str(
            &text,
            config::FileFormat::Json,
        ))
        .add_source(environment_source)
        .build()
        .map_err(|source| LoadConfigError::Builder {
            path: artifact.to_path_buf(),
            source,
        })?;

    let settings = settings
        .try_deserialize::<ArtifactSettings>()
        .map_err(LoadConfigError::Deserialization)?;
    settings.config.validate()?;

    Ok(settings.config)
}

#[cfg(test)]
mod tests {
    use super::*;
    use secrecy::ExposeSecret;
    use std::io::Write;

    fn write_artifact(config: serde_json::Value) -> tempfile::NamedTempFile {
        let mut file = tempfile::Builder::new()
            .suffix(".json")
            .tempfile()
            .unwrap();
        let artifact = serde_json::json!({
            "tables": [],
            "indexes": [],
            "config": config,
        });
        write!(file, "{artifact}").unwrap();
        file
    }

    #[test]
    fn loads_config_block_with_environment_override() {
        let artifact = write_artifact(serde_json::json!({
            "rdbms": "postgres",
            "dbhost": "10.0.0.5",
            "dbport": 5433,
            "dbuser": "replicator",
            "dbpass": "from-file",
            "dbname": "progress",
        }));

        let config = load_target_config(artifact.path()).unwrap();
        assert_eq!(config.dbhost, "10.0.0.5");
        assert_eq!(config.dbport, 5433);
        assert_eq!(config.dbpass.as_ref().unwrap().expose_secret(), "from-file");

        // SAFETY: this is the only test in the crate that touches the environment.
        unsafe {
            std::env::set_var("APP_CONFIG__DBPASS", "from-env");
        }
        let config = load_target_config(artifact.path()).unwrap();
        unsafe {
            std::env::remove_var("APP_CONFIG__DBPASS");
        }
        assert_eq!(config.dbpass.as_ref().unwrap().expose_secret(), "from-env");
    }

    #[test]
    fn loads_latin1_artifact() {
        let mut file = tempfile::Builder::new()
            .suffix(".json")
            .tempfile()
            .unwrap();
        let mut bytes = br#"{"tables": [{"name": ["caf"#.to_vec();
        bytes.push(0xE9);
        bytes.extend_from_slice(
            br#"", "cafe"], "columns": []}], "config": {"dbhost": "db", "dbport": 5432, "dbuser": "u", "dbname": "progress"}}"#,
        );
        file.write_all(&bytes).unwrap();

        let config = load_target_config(file.path()).unwrap();

        assert_eq!(config.dbhost, "db");
        assert_eq!(config.dbname, "progress");
    }

    #[test]
    fn decodes_invalid_utf8_as_latin1() {
        assert_eq!(decode_artifact(b"caf\xE9".to_vec()), "café");
        assert_eq!(decode_artifact("café".as_bytes().to_vec()), "café");
    }

    #[test]
    fn rejects_missing_artifact() {
        let err = load_target_config(Path::new("/nonexistent/ddl.json")).unwrap_err();

        assert!(matches!(err, LoadConfigError::MissingArtifact(_)));
    }
}
