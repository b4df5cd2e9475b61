use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use sqlx::postgres::{PgConnectOptions, PgSslMode};
use std::sync::LazyLock;

use crate::shared::ValidationError;

/// Backend names accepted in the artifact's `rdbms` field.
const SUPPORTED_BACKENDS: &[&str] = &["postgres", "postgresql"];

const APP_NAME_APPLY: &str = "prorep_replicator";

/// Session options for connections opened by apply workers.
///
/// Timestamps are always written in UTC so that values converted from the source keep their
/// meaning regardless of the server's default timezone.
pub static APPLY_SESSION_OPTIONS: LazyLock<SessionOptions> = LazyLock::new(|| SessionOptions {
    datestyle: "ISO".to_string(),
    client_encoding: "UTF8".to_string(),
    timezone: "UTC".to_string(),
    statement_timeout: 0,
    lock_timeout: 30_000,
    application_name: APP_NAME_APPLY.to_string(),
});

/// Postgres session parameters applied on connect.
#[derive(Debug, Clone)]
pub struct SessionOptions {
    pub datestyle: String,
    pub client_encoding: String,
    pub timezone: String,
    pub statement_timeout: u32,
    pub lock_timeout: u32,
    pub application_name: String,
}

impl SessionOptions {
    /// Returns the options as key-value pairs suitable for sqlx.
    pub fn to_key_value_pairs(&self) -> Vec<(String, String)> {
        vec![
            ("datestyle".to_string(), self.datestyle.clone()),
            ("client_encoding".to_string(), self.client_encoding.clone()),
            ("timezone".to_string(), self.timezone.clone()),
            (
                "statement_timeout".to_string(),
                self.statement_timeout.to_string(),
            ),
            ("lock_timeout".to_string(), self.lock_timeout.to_string()),
        ]
    }
}

/// Connection settings for the replication target.
///
/// Deserialized from the `config` block of the DDL artifact, which uses the short `db*` key
/// names written by the schema-conversion tooling. The password is redacted in debug output and
/// is never serialized back out.
#[derive(Debug, Clone, Deserialize)]
pub struct TargetConnectionConfig {
    /// Backend the artifact was customized for. Absent in artifacts produced before the field
    /// was introduced.
    #[serde(default)]
    pub rdbms: Option<String>,
    /// Hostname or IP address of the target server.
    pub dbhost: String,
    /// Port on which the target server is listening.
    pub dbport: u16,
    /// User name used to authenticate.
    pub dbuser: String,
    /// Password for [`TargetConnectionConfig::dbuser`].
    #[serde(default)]
    pub dbpass: Option<SecretString>,
    /// Name of the database holding the replicated tables.
    pub dbname: String,
}

impl TargetConnectionConfig {
    /// Validates the connection settings.
    pub fn validate(&self) -> Result<(), ValidationError> {
        if let Some(rdbms) = &self.rdbms
            && !SUPPORTED_BACKENDS.contains(&rdbms.to_lowercase().as_str())
        {
            return Err(ValidationError::UnsupportedBackend(rdbms.clone()));
        }

        if self.dbhost.trim().is_empty() {
            return Err(ValidationError::InvalidFieldValue {
                field: "config.dbhost".to_string(),
                constraint: "must not be empty".to_string(),
            });
        }

        if self.dbport == 0 {
            return Err(ValidationError::InvalidFieldValue {
                field: "config.dbport".to_string(),
                constraint: "must be greater than 0".to_string(),
            });
        }

        Ok(())
    }

    /// Returns the backend name for reporting, defaulting to `postgres`.
    pub fn backend(&self) -> &str {
        self.rdbms.as_deref().unwrap_or("postgres")
    }

    /// Builds sqlx connect options for the target database.
    ///
    /// An empty password is treated the same as no password, matching how the artifact tooling
    /// writes a missing credential.
    pub fn connect_options(&self, options: &SessionOptions) -> PgConnectOptions {
        let mut connect_options = PgConnectOptions::new_without_pgpass()
            .host(&self.dbhost)
            .port(self.dbport)
            .username(&self.dbuser)
            .database(&self.dbname)
            .ssl_mode(PgSslMode::Prefer)
            .application_name(&options.application_name)
            .options(options.to_key_value_pairs());

        if let Some(password) = &self.dbpass
            && !password.expose_secret().is_empty()
        {
            connect_options = connect_options.password(password.expose_secret());
        }

        connect_options
    }
}
