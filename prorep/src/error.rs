//! Error types and result definitions for change-apply operations.
//!
//! [`ProrepError`] carries a classification ([`ErrorKind`]), a static description, optional
//! dynamic detail, an optional source error and the call site where it was created. Errors from
//! several workers can be aggregated into a single value so that a poll cycle reports every
//! failure it observed.

use std::backtrace::Backtrace;
use std::borrow::Cow;
use std::error;
use std::fmt;
use std::panic::Location;
use std::sync::Arc;

/// Convenient result type for prorep operations.
pub type ProrepResult<T> = Result<T, ProrepError>;

/// Detailed payload stored for single [`ProrepError`] instances.
#[derive(Debug, Clone)]
struct ErrorPayload {
    kind: ErrorKind,
    description: Cow<'static, str>,
    detail: Option<Cow<'static, str>>,
    source: Option<Arc<dyn error::Error + Send + Sync>>,
    location: &'static Location<'static>,
    backtrace: Arc<Backtrace>,
}

/// Main error type for prorep operations.
#[derive(Debug, Clone)]
pub struct ProrepError {
    repr: ErrorRepr,
}

/// Internal representation of error data.
#[derive(Debug, Clone)]
enum ErrorRepr {
    /// Single error payload holding rich metadata.
    Single(ErrorPayload),
    /// Multiple aggregated errors, typically one per failed worker.
    Many {
        errors: Vec<ProrepError>,
        location: &'static Location<'static>,
    },
}

/// Categories of errors that can occur while applying queue entries.
#[derive(PartialEq, Eq, Copy, Clone, Debug, Hash)]
#[non_exhaustive]
pub enum ErrorKind {
    // Queue Errors
    MalformedEntry,
    UnreadablePayload,

    // Destination Errors
    DestinationConnectionFailed,
    DestinationQueryFailed,
    DestinationSchemaError,
    DestinationConstraintViolation,
    AuthenticationError,

    // Schema & Mapping Errors
    MissingTableMapping,
    MissingColumnMapping,

    // Data & Transformation Errors
    ConversionError,
    InvalidData,

    // Configuration Errors
    ConfigError,

    // IO & Serialization Errors
    IoError,
    SerializationError,
    DeserializationError,

    // State & Workflow Errors
    InvalidState,
    WorkerPanic,

    // Unknown / Uncategorized
    Unknown,
}

impl ErrorKind {
    /// Returns whether the failure is a recognized transient disconnect.
    ///
    /// Only transient failures are retried, once, after reconnecting.
    pub fn is_transient(&self) -> bool {
        matches!(self, ErrorKind::DestinationConnectionFailed)
    }
}

impl ProrepError {
    /// Returns the [`ErrorKind`] of this error.
    ///
    /// For multiple errors, returns the kind of the first error or [`ErrorKind::Unknown`]
    /// if the error list is empty.
    pub fn kind(&self) -> ErrorKind {
        match self.repr {
            ErrorRepr::Single(ref payload) => payload.kind,
            ErrorRepr::Many { ref errors, .. } => errors
                .first()
                .map(|err| err.kind())
                .unwrap_or(ErrorKind::Unknown),
        }
    }

    /// Returns all [`ErrorKind`]s present in this error.
    pub fn kinds(&self) -> Vec<ErrorKind> {
        match self.repr {
            ErrorRepr::Single(ref payload) => vec![payload.kind],
            ErrorRepr::Many { ref errors, .. } => {
                errors.iter().flat_map(|err| err.kinds()).collect()
            }
        }
    }

    /// Returns the static description of this error.
    pub fn description(&self) -> &str {
        match self.repr {
            ErrorRepr::Single(ref payload) => payload.description.as_ref(),
            ErrorRepr::Many { .. } => "Multiple errors occurred",
        }
    }

    /// Returns the detailed error information if available.
    ///
    /// For multiple errors, returns the detail of the first error that has one.
    pub fn detail(&self) -> Option<&str> {
        match self.repr {
            ErrorRepr::Single(ref payload) => payload.detail.as_deref(),
            ErrorRepr::Many { ref errors, .. } => errors.iter().find_map(|e| e.detail()),
        }
    }

    /// Returns the aggregated errors, if this error aggregates several.
    pub fn errors(&self) -> Option<&[ProrepError]> {
        match self.repr {
            ErrorRepr::Single(_) => None,
            ErrorRepr::Many { ref errors, .. } => Some(errors),
        }
    }

    /// Returns the captured backtrace for this error.
    pub fn backtrace(&self) -> Option<&Backtrace> {
        match self.repr {
            ErrorRepr::Single(ref payload) => Some(payload.backtrace.as_ref()),
            ErrorRepr::Many { .. } => None,
        }
    }

    /// Returns the captured callsite location for this error.
    pub fn location(&self) -> &'static Location<'static> {
        match self.repr {
            ErrorRepr::Single(ref payload) => payload.location,
            ErrorRepr::Many { location, .. } => location,
        }
    }

    /// Attaches an originating error to this error and returns the modified instance.
    ///
    /// Has no effect on aggregated errors, which forward their first error as the source.
    pub fn with_source<E>(mut self, source: E) -> Self
    where
        E: error::Error + Send + Sync + 'static,
    {
        if let ErrorRepr::Single(ref mut payload) = self.repr {
            payload.source = Some(Arc::new(source));
        }

        self
    }

    /// Appends a line of context to the detail of this error.
    ///
    /// Used to record the failing statement or row once the error bubbles out of the store.
    pub fn with_context(mut self, context: impl fmt::Display) -> Self {
        if let ErrorRepr::Single(ref mut payload) = self.repr {
            let detail = match payload.detail.take() {
                Some(detail) => format!("{detail}\n{context}"),
                None => context.to_string(),
            };
            payload.detail = Some(Cow::Owned(detail));
        }

        self
    }

    /// Creates a [`ProrepError`] from its components.
    #[track_caller]
    fn from_components(
        kind: ErrorKind,
        description: Cow<'static, str>,
        detail: Option<Cow<'static, str>>,
        source: Option<Arc<dyn error::Error + Send + Sync>>,
    ) -> Self {
        let location = Location::caller();
        let backtrace = Arc::new(Backtrace::capture());

        ProrepError {
            repr: ErrorRepr::Single(ErrorPayload {
                kind,
                description,
                detail,
                source,
                location,
                backtrace,
            }),
        }
    }
}

impl PartialEq for ProrepError {
    fn eq(&self, other: &ProrepError) -> bool {
        match (&self.repr, &other.repr) {
            (ErrorRepr::Single(a), ErrorRepr::Single(b)) => a.kind == b.kind,
            (ErrorRepr::Many { errors: a, .. }, ErrorRepr::Many { errors: b, .. }) => {
                a.len() == b.len() && a.iter().zip(b.iter()).all(|(a, b)| a == b)
            }
            _ => false,
        }
    }
}

impl fmt::Display for ProrepError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> Result<(), fmt::Error> {
        match &self.repr {
            ErrorRepr::Single(payload) => {
                let location = payload.location;
                write!(
                    f,
                    "[{:?}] {} @ {}:{}:{}",
                    payload.kind,
                    payload.description,
                    location.file(),
                    location.line(),
                    location.column()
                )?;

                write_detail(payload.detail.as_deref(), f, 1)?;

                Ok(())
            }
            ErrorRepr::Many { errors, location } => {
                let count = errors.len();
                write!(
                    f,
                    "[Many] {} error{} aggregated @ {}:{}:{}",
                    count,
                    if count == 1 { "" } else { "s" },
                    location.file(),
                    location.line(),
                    location.column()
                )?;

                if errors.is_empty() {
                    write!(f, "\n  (no inner errors provided)")?;
                }

                for (index, error) in errors.iter().enumerate() {
                    let rendered = format!("{error}");
                    let mut lines = rendered.lines();
                    match lines.next() {
                        Some(first_line) => write!(f, "\n  {}. {}", index + 1, first_line)?,
                        None => write!(f, "\n  {}.", index + 1)?,
                    }

                    for line in lines {
                        write!(f, "\n     {line}")?;
                    }
                }

                Ok(())
            }
        }
    }
}

impl error::Error for ProrepError {
    fn source(&self) -> Option<&(dyn error::Error + 'static)> {
        match &self.repr {
            ErrorRepr::Single(payload) => payload
                .source
                .as_ref()
                .map(|source| source as &(dyn error::Error + 'static)),
            ErrorRepr::Many { errors, .. } => errors
                .first()
                .map(|error| error as &(dyn error::Error + 'static)),
        }
    }
}

/// Writes the detail block with indentation.
fn write_detail(detail: Option<&str>, f: &mut fmt::Formatter<'_>, indent: usize) -> fmt::Result {
    if let Some(detail) = detail {
        let indent_str = "  ".repeat(indent);
        if detail.trim().is_empty() {
            write!(f, "\n{indent_str}Detail: <empty>")?;
        } else {
            write!(f, "\n{indent_str}Detail:")?;
            for line in detail.lines() {
                write!(f, "\n{indent_str}  {line}")?;
            }
        }
    }

    Ok(())
}

/// Creates a [`ProrepError`] from an error kind and static description.
impl From<(ErrorKind, &'static str)> for ProrepError {
    #[track_caller]
    fn from((kind, desc): (ErrorKind, &'static str)) -> ProrepError {
        ProrepError::from_components(kind, Cow::Borrowed(desc), None, None)
    }
}

/// Creates a [`ProrepError`] from an error kind, static description, and dynamic detail.
impl<D> From<(ErrorKind, &'static str, D)> for ProrepError
where
    D: Into<Cow<'static, str>>,
{
    #[track_caller]
    fn from((kind, desc, detail): (ErrorKind, &'static str, D)) -> ProrepError {
        ProrepError::from_components(kind, Cow::Borrowed(desc), Some(detail.into()), None)
    }
}

/// Creates a [`ProrepError`] from a vector of errors for aggregation.
///
/// A vector holding exactly one error yields that error unchanged.
impl<E> From<Vec<E>> for ProrepError
where
    E: Into<ProrepError>,
{
    #[track_caller]
    fn from(errors: Vec<E>) -> ProrepError {
        let location = Location::caller();
        let mut errors: Vec<ProrepError> = errors.into_iter().map(Into::into).collect();

        if errors.len() == 1
            && let Some(error) = errors.pop()
        {
            return error;
        }

        ProrepError {
            repr: ErrorRepr::Many { errors, location },
        }
    }
}

impl From<std::io::Error> for ProrepError {
    #[track_caller]
    fn from(err: std::io::Error) -> ProrepError {
        let detail = err.to_string();
        ProrepError::from_components(
            ErrorKind::IoError,
            Cow::Borrowed("I/O operation failed"),
            Some(Cow::Owned(detail)),
            Some(Arc::new(err)),
        )
    }
}

/// Maps JSON syntax and data failures to [`ErrorKind::DeserializationError`].
impl From<serde_json::Error> for ProrepError {
    #[track_caller]
    fn from(err: serde_json::Error) -> ProrepError {
        let (kind, description) = match err.classify() {
            serde_json::error::Category::Io => (ErrorKind::IoError, "JSON I/O operation failed"),
            serde_json::error::Category::Syntax
            | serde_json::error::Category::Data
            | serde_json::error::Category::Eof => (
                ErrorKind::DeserializationError,
                "JSON deserialization failed",
            ),
        };

        let detail = err.to_string();
        ProrepError::from_components(
            kind,
            Cow::Borrowed(description),
            Some(Cow::Owned(detail)),
            Some(Arc::new(err)),
        )
    }
}

impl From<std::num::ParseIntError> for ProrepError {
    #[track_caller]
    fn from(err: std::num::ParseIntError) -> ProrepError {
        let detail = err.to_string();
        ProrepError::from_components(
            ErrorKind::ConversionError,
            Cow::Borrowed("Integer parsing failed"),
            Some(Cow::Owned(detail)),
            Some(Arc::new(err)),
        )
    }
}

impl From<bigdecimal::ParseBigDecimalError> for ProrepError {
    #[track_caller]
    fn from(err: bigdecimal::ParseBigDecimalError) -> ProrepError {
        let detail = err.to_string();
        ProrepError::from_components(
            ErrorKind::ConversionError,
            Cow::Borrowed("Decimal parsing failed"),
            Some(Cow::Owned(detail)),
            Some(Arc::new(err)),
        )
    }
}

impl From<chrono::ParseError> for ProrepError {
    #[track_caller]
    fn from(err: chrono::ParseError) -> ProrepError {
        let detail = err.to_string();
        ProrepError::from_components(
            ErrorKind::ConversionError,
            Cow::Borrowed("Date/time parsing failed"),
            Some(Cow::Owned(detail)),
            Some(Arc::new(err)),
        )
    }
}

impl From<base64::DecodeError> for ProrepError {
    #[track_caller]
    fn from(err: base64::DecodeError) -> ProrepError {
        let detail = err.to_string();
        ProrepError::from_components(
            ErrorKind::ConversionError,
            Cow::Borrowed("Base64 decoding failed"),
            Some(Cow::Owned(detail)),
            Some(Arc::new(err)),
        )
    }
}

/// SQLSTATE classes that indicate the session is gone or unusable.
///
/// `08` covers connection exceptions, `57P01`..`57P03` administrator and crash shutdowns as well
/// as servers that cannot accept connections right now.
fn is_disconnect_sqlstate(code: &str) -> bool {
    code.starts_with("08") || matches!(code, "57P01" | "57P02" | "57P03")
}

/// Converts [`sqlx::Error`] to [`ProrepError`], separating transient disconnects from other
/// failures.
///
/// I/O failures, closed or exhausted pools, and disconnect SQLSTATEs all map to
/// [`ErrorKind::DestinationConnectionFailed`], the only kind that is retried.
impl From<sqlx::Error> for ProrepError {
    #[track_caller]
    fn from(err: sqlx::Error) -> ProrepError {
        let (kind, description) = match &err {
            sqlx::Error::Io(_)
            | sqlx::Error::PoolClosed
            | sqlx::Error::PoolTimedOut
            | sqlx::Error::WorkerCrashed => (
                ErrorKind::DestinationConnectionFailed,
                "Target database connection lost",
            ),
            sqlx::Error::Tls(_) => (
                ErrorKind::DestinationConnectionFailed,
                "Target database TLS negotiation failed",
            ),
            sqlx::Error::Database(db_err) => match db_err.code().as_deref() {
                Some(code) if is_disconnect_sqlstate(code) => (
                    ErrorKind::DestinationConnectionFailed,
                    "Target database connection lost",
                ),
                Some(code) if code.starts_with("28") => (
                    ErrorKind::AuthenticationError,
                    "Target database authentication failed",
                ),
                Some(code) if code.starts_with("23") => (
                    ErrorKind::DestinationConstraintViolation,
                    "Target database constraint violation",
                ),
                Some(code) if code.starts_with("22") => (
                    ErrorKind::ConversionError,
                    "Target database rejected a value",
                ),
                Some("42P01" | "42703" | "3D000" | "3F000") => (
                    ErrorKind::DestinationSchemaError,
                    "Target database schema object not found",
                ),
                _ => (
                    ErrorKind::DestinationQueryFailed,
                    "Target database query failed",
                ),
            },
            sqlx::Error::Configuration(_) => {
                (ErrorKind::ConfigError, "Target database misconfigured")
            }
            _ => (
                ErrorKind::DestinationQueryFailed,
                "Target database operation failed",
            ),
        };

        let detail = err.to_string();
        ProrepError::from_components(
            kind,
            Cow::Borrowed(description),
            Some(Cow::Owned(detail)),
            Some(Arc::new(err)),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::prorep_error;

    #[test]
    fn single_error_reports_kind_and_detail() {
        let err = prorep_error!(
            ErrorKind::MissingTableMapping,
            "Table is not in the schema map",
            "customer"
        );

        assert_eq!(err.kind(), ErrorKind::MissingTableMapping);
        assert_eq!(err.detail(), Some("customer"));
        assert!(err.errors().is_none());
        assert!(err.to_string().contains("Table is not in the schema map"));
    }

    #[test]
    fn aggregating_one_error_returns_it_unchanged() {
        let err = ProrepError::from(vec![prorep_error!(
            ErrorKind::WorkerPanic,
            "Worker panicked"
        )]);

        assert!(err.errors().is_none());
        assert_eq!(err.kind(), ErrorKind::WorkerPanic);
    }

    #[test]
    fn aggregating_many_errors_keeps_all_kinds() {
        let err = ProrepError::from(vec![
            prorep_error!(ErrorKind::DestinationQueryFailed, "Query failed"),
            prorep_error!(ErrorKind::ConversionError, "Bad value"),
        ]);

        assert_eq!(err.errors().map(<[_]>::len), Some(2));
        assert_eq!(
            err.kinds(),
            vec![ErrorKind::DestinationQueryFailed, ErrorKind::ConversionError]
        );
        assert!(err.to_string().starts_with("[Many] 2 errors aggregated"));
    }

    #[test]
    fn context_is_appended_to_detail() {
        let err = prorep_error!(ErrorKind::DestinationQueryFailed, "Query failed", "boom")
            .with_context("statement: DELETE FROM customer");

        assert_eq!(
            err.detail(),
            Some("boom\nstatement: DELETE FROM customer")
        );
    }

    #[test]
    fn only_connection_failures_are_transient() {
        assert!(ErrorKind::DestinationConnectionFailed.is_transient());
        assert!(!ErrorKind::DestinationQueryFailed.is_transient());
        assert!(!ErrorKind::AuthenticationError.is_transient());
    }

    #[test]
    fn sqlx_io_errors_are_transient() {
        let io = std::io::Error::new(std::io::ErrorKind::ConnectionReset, "reset by peer");
        let err = ProrepError::from(sqlx::Error::Io(io));

        assert!(err.kind().is_transient());
    }

    #[test]
    fn disconnect_sqlstates() {
        assert!(is_disconnect_sqlstate("08006"));
        assert!(is_disconnect_sqlstate("57P01"));
        assert!(!is_disconnect_sqlstate("23505"));
    }
}
