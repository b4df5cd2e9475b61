use thiserror::Error;

/// Configuration validation errors.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ValidationError {
    /// The worker pool must have at least one worker.
    #[error("`processes` cannot be zero")]
    ProcessesZero,
    /// Row batches must contain at least one row.
    #[error("`processrows` cannot be zero")]
    ProcessRowsZero,
    /// The glob pattern used to list the queue directory is empty or invalid.
    #[error("Invalid glob pattern `{0}`")]
    InvalidGlobPattern(String),
    /// The artifact targets a backend this engine cannot write to.
    #[error("Unsupported target backend `{0}`, only `postgres` is supported")]
    UnsupportedBackend(String),
    /// A field holds a value outside of its accepted range.
    #[error("Invalid value for `{field}`: {constraint}")]
    InvalidFieldValue { field: String, constraint: String },
}
