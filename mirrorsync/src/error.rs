//! Error types and result definitions for mirrorsync operations.
//!
//! [`SyncError`] carries an [`ErrorKind`] used to decide how a failure propagates (retried,
//! logged and counted, or returned to the caller), together with a static description, optional
//! dynamic detail, an optional source error and the callsite where it was raised. Several errors
//! can be aggregated into one, for operations that collect failures instead of stopping at the
//! first.

use std::backtrace::Backtrace;
use std::borrow::Cow;
use std::error;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::panic::Location;
use std::sync::Arc;

/// Result type used throughout the crate.
pub type SyncResult<T> = Result<T, SyncError>;

#[derive(Debug, Clone)]
struct ErrorPayload {
    kind: ErrorKind,
    description: Cow<'static, str>,
    detail: Option<Cow<'static, str>>,
    source: Option<Arc<dyn error::Error + Send + Sync>>,
    location: &'static Location<'static>,
    backtrace: Arc<Backtrace>,
}

/// Main error type of the crate.
///
/// Holds either a single failure or an aggregation of failures raised by sibling tasks.
#[derive(Debug, Clone)]
pub struct SyncError {
    repr: ErrorRepr,
}

#[derive(Debug, Clone)]
enum ErrorRepr {
    Single(ErrorPayload),
    Many {
        errors: Vec<SyncError>,
        location: &'static Location<'static>,
    },
}

/// Categories of failures, grouped by the stage that raises them.
#[derive(PartialEq, Eq, Copy, Clone, Debug, Hash)]
#[non_exhaustive]
pub enum ErrorKind {
    // Connection Errors
    ConnectionUnavailable,

    // Query & Execution Errors
    QueryFailed,
    QueryTimeout,
    NoData,
    WriteFailure,

    // Catalog Errors
    UnknownDataset,
    CatalogLookupFailed,
    InvalidTemplate,

    // Validation Errors
    ValidationAbort,
    ValidationRowSkip,
    InvalidExpression,
    ExpressionEvaluationFailed,

    // Data & Transformation Errors
    ConversionError,
    InvalidData,

    // Configuration Errors
    ConfigError,
    InvalidSchedule,

    // IO & Security Errors
    IoError,
    EncryptionError,

    // State & Workflow Errors
    InvalidState,
    TaskPanicked,

    // General Errors
    SourceError,
    DestinationError,

    // Unknown / Uncategorized
    Unknown,
}

impl SyncError {
    /// Returns the [`ErrorKind`] of this error, or of the first aggregated error.
    pub fn kind(&self) -> ErrorKind {
        match self.repr {
            ErrorRepr::Single(ref payload) => payload.kind,
            ErrorRepr::Many { ref errors, .. } => errors
                .first()
                .map(|err| err.kind())
                .unwrap_or(ErrorKind::Unknown),
        }
    }

    /// Returns every [`ErrorKind`] contained in this error, flattening aggregations.
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
            ErrorRepr::Many { .. } => "multiple errors",
        }
    }

    /// Returns the dynamic detail, if any. For aggregations, the first available detail.
    pub fn detail(&self) -> Option<&str> {
        match self.repr {
            ErrorRepr::Single(ref payload) => payload.detail.as_deref(),
            ErrorRepr::Many { ref errors, .. } => errors.iter().find_map(|e| e.detail()),
        }
    }

    /// Number of failures represented by this error.
    pub fn count(&self) -> usize {
        match self.repr {
            ErrorRepr::Single(_) => 1,
            ErrorRepr::Many { ref errors, .. } => errors.iter().map(|e| e.count()).sum(),
        }
    }

    pub fn backtrace(&self) -> Option<&Backtrace> {
        match self.repr {
            ErrorRepr::Single(ref payload) => Some(payload.backtrace.as_ref()),
            ErrorRepr::Many { .. } => None,
        }
    }

    pub fn location(&self) -> &'static Location<'static> {
        match self.repr {
            ErrorRepr::Single(ref payload) => payload.location,
            ErrorRepr::Many { location, .. } => location,
        }
    }

    /// Attaches the originating error, exposed through [`error::Error::source`].
    ///
    /// Has no effect on aggregations, which forward their first error as source.
    pub fn with_source<E>(mut self, source: E) -> Self
    where
        E: error::Error + Send + Sync + 'static,
    {
        if let ErrorRepr::Single(ref mut payload) = self.repr {
            payload.source = Some(Arc::new(source));
        }
        self
    }

    #[track_caller]
    fn from_components(
        kind: ErrorKind,
        description: Cow<'static, str>,
        detail: Option<Cow<'static, str>>,
        source: Option<Arc<dyn error::Error + Send + Sync>>,
    ) -> Self {
        SyncError {
            repr: ErrorRepr::Single(ErrorPayload {
                kind,
                description,
                detail,
                source,
                location: Location::caller(),
                backtrace: Arc::new(Backtrace::capture()),
            }),
        }
    }

    #[track_caller]
    fn wrap<E>(kind: ErrorKind, description: &'static str, err: E) -> Self
    where
        E: error::Error + Send + Sync + 'static,
    {
        let detail = err.to_string();
        SyncError::from_components(
            kind,
            Cow::Borrowed(description),
            Some(Cow::Owned(detail)),
            Some(Arc::new(err)),
        )
    }
}

impl PartialEq for SyncError {
    fn eq(&self, other: &SyncError) -> bool {
        match (&self.repr, &other.repr) {
            (ErrorRepr::Single(a), ErrorRepr::Single(b)) => a.kind == b.kind,
            (ErrorRepr::Many { errors: a, .. }, ErrorRepr::Many { errors: b, .. }) => {
                a.len() == b.len() && a.iter().zip(b.iter()).all(|(a, b)| a == b)
            }
            _ => false,
        }
    }
}

impl Hash for SyncError {
    /// Hashes only the kind and static description so that occurrences of the same failure
    /// group together regardless of detail or location.
    fn hash<H: Hasher>(&self, state: &mut H) {
        std::mem::discriminant(&self.repr).hash(state);
        match &self.repr {
            ErrorRepr::Single(payload) => {
                payload.kind.hash(state);
                payload.description.hash(state);
            }
            ErrorRepr::Many { errors, .. } => {
                errors.len().hash(state);
                for error in errors {
                    error.hash(state);
                }
            }
        }
    }
}

impl fmt::Display for SyncError {
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

                if let Some(detail) = payload.detail.as_deref() {
                    write_indented(f, "Detail:", detail)?;
                }

                let backtrace = payload.backtrace.to_string();
                if !backtrace.trim().is_empty() {
                    write_indented(f, "Backtrace:", &backtrace)?;
                }

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

                for (index, error) in errors.iter().enumerate() {
                    let rendered = error.to_string();
                    let mut lines = rendered.lines();
                    write!(f, "\n  {}. {}", index + 1, lines.next().unwrap_or_default())?;
                    for line in lines {
                        write!(f, "\n     {line}")?;
                    }
                }

                Ok(())
            }
        }
    }
}

fn write_indented(f: &mut fmt::Formatter<'_>, header: &str, body: &str) -> fmt::Result {
    write!(f, "\n  {header}")?;
    if body.trim().is_empty() {
        return write!(f, " <empty>");
    }
    for line in body.lines() {
        if line.trim().is_empty() {
            write!(f, "\n    ")?;
        } else {
            write!(f, "\n    {line}")?;
        }
    }

    Ok(())
}

impl error::Error for SyncError {
    fn source(&self) -> Option<&(dyn error::Error + 'static)> {
        match &self.repr {
            ErrorRepr::Single(payload) => payload
                .source
                .as_ref()
                .map(|source| source.as_ref() as &(dyn error::Error + 'static)),
            ErrorRepr::Many { errors, .. } => errors
                .first()
                .map(|error| error as &(dyn error::Error + 'static)),
        }
    }
}

impl From<(ErrorKind, &'static str)> for SyncError {
    #[track_caller]
    fn from((kind, desc): (ErrorKind, &'static str)) -> SyncError {
        SyncError::from_components(kind, Cow::Borrowed(desc), None, None)
    }
}

impl<D> From<(ErrorKind, &'static str, D)> for SyncError
where
    D: Into<Cow<'static, str>>,
{
    #[track_caller]
    fn from((kind, desc, detail): (ErrorKind, &'static str, D)) -> SyncError {
        SyncError::from_components(kind, Cow::Borrowed(desc), Some(detail.into()), None)
    }
}

/// Aggregates errors. A single error is returned as is instead of being wrapped.
impl<E> From<Vec<E>> for SyncError
where
    E: Into<SyncError>,
{
    #[track_caller]
    fn from(errors: Vec<E>) -> SyncError {
        let location = Location::caller();
        let mut errors: Vec<SyncError> = errors.into_iter().map(Into::into).collect();

        if errors.len() == 1 {
            if let Some(error) = errors.pop() {
                return error;
            }
        }

        SyncError {
            repr: ErrorRepr::Many { errors, location },
        }
    }
}

impl From<std::io::Error> for SyncError {
    #[track_caller]
    fn from(err: std::io::Error) -> SyncError {
        SyncError::wrap(ErrorKind::IoError, "I/O operation failed", err)
    }
}

impl From<std::num::ParseIntError> for SyncError {
    #[track_caller]
    fn from(err: std::num::ParseIntError) -> SyncError {
        SyncError::wrap(ErrorKind::ConversionError, "Integer parsing failed", err)
    }
}

impl From<std::num::ParseFloatError> for SyncError {
    #[track_caller]
    fn from(err: std::num::ParseFloatError) -> SyncError {
        SyncError::wrap(ErrorKind::ConversionError, "Float parsing failed", err)
    }
}

impl From<chrono::ParseError> for SyncError {
    #[track_caller]
    fn from(err: chrono::ParseError) -> SyncError {
        SyncError::wrap(ErrorKind::ConversionError, "Datetime parsing failed", err)
    }
}

impl From<cron::error::Error> for SyncError {
    #[track_caller]
    fn from(err: cron::error::Error) -> SyncError {
        SyncError::wrap(ErrorKind::InvalidSchedule, "Schedule expression is invalid", err)
    }
}

impl From<rustls::Error> for SyncError {
    #[track_caller]
    fn from(err: rustls::Error) -> SyncError {
        SyncError::wrap(ErrorKind::EncryptionError, "TLS configuration failed", err)
    }
}

/// Maps Postgres SQLSTATE classes onto the error taxonomy.
///
/// A canceled statement (`57014`) is the statement timeout firing. Errors without a SQLSTATE
/// come from the connection itself.
impl From<tokio_postgres::Error> for SyncError {
    #[track_caller]
    fn from(err: tokio_postgres::Error) -> SyncError {
        use tokio_postgres::error::SqlState;

        let (kind, description) = match err.code() {
            Some(sqlstate) => match *sqlstate {
                SqlState::QUERY_CANCELED => {
                    (ErrorKind::QueryTimeout, "PostgreSQL statement timed out")
                }
                SqlState::CONNECTION_EXCEPTION
                | SqlState::CONNECTION_DOES_NOT_EXIST
                | SqlState::CONNECTION_FAILURE
                | SqlState::SQLCLIENT_UNABLE_TO_ESTABLISH_SQLCONNECTION
                | SqlState::SQLSERVER_REJECTED_ESTABLISHMENT_OF_SQLCONNECTION
                | SqlState::TOO_MANY_CONNECTIONS
                | SqlState::ADMIN_SHUTDOWN
                | SqlState::CRASH_SHUTDOWN
                | SqlState::CANNOT_CONNECT_NOW
                | SqlState::IDLE_SESSION_TIMEOUT => (
                    ErrorKind::ConnectionUnavailable,
                    "PostgreSQL connection unavailable",
                ),
                SqlState::INVALID_AUTHORIZATION_SPECIFICATION | SqlState::INVALID_PASSWORD => (
                    ErrorKind::ConnectionUnavailable,
                    "PostgreSQL authentication failed",
                ),
                SqlState::DATA_EXCEPTION
                | SqlState::INVALID_TEXT_REPRESENTATION
                | SqlState::INVALID_DATETIME_FORMAT
                | SqlState::NUMERIC_VALUE_OUT_OF_RANGE
                | SqlState::DIVISION_BY_ZERO => (
                    ErrorKind::ConversionError,
                    "PostgreSQL data conversion failed",
                ),
                SqlState::INVALID_CURSOR_STATE
                | SqlState::INVALID_CURSOR_NAME
                | SqlState::IN_FAILED_SQL_TRANSACTION
                | SqlState::NO_ACTIVE_SQL_TRANSACTION => {
                    (ErrorKind::InvalidState, "PostgreSQL cursor or transaction error")
                }
                _ => (ErrorKind::QueryFailed, "PostgreSQL query failed"),
            },
            None => (
                ErrorKind::ConnectionUnavailable,
                "PostgreSQL connection failed",
            ),
        };

        SyncError::wrap(kind, description, err)
    }
}

impl From<sqlx::Error> for SyncError {
    #[track_caller]
    fn from(err: sqlx::Error) -> SyncError {
        let (kind, description) = match &err {
            sqlx::Error::Database(_) => (ErrorKind::QueryFailed, "MySQL query failed"),
            sqlx::Error::Io(_)
            | sqlx::Error::Tls(_)
            | sqlx::Error::PoolTimedOut
            | sqlx::Error::PoolClosed
            | sqlx::Error::WorkerCrashed => (
                ErrorKind::ConnectionUnavailable,
                "MySQL connection unavailable",
            ),
            sqlx::Error::ColumnDecode { .. }
            | sqlx::Error::ColumnNotFound(_)
            | sqlx::Error::Decode(_) => (ErrorKind::ConversionError, "MySQL value decoding failed"),
            _ => (ErrorKind::DestinationError, "MySQL operation failed"),
        };

        SyncError::wrap(kind, description, err)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{bail, sync_error};

    fn failing() -> SyncResult<()> {
        bail!(ErrorKind::NoData, "Query returned no rows", "finance.balance");
    }

    #[test]
    fn macros_build_errors_with_detail() {
        let err = failing().unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NoData);
        assert_eq!(err.detail(), Some("finance.balance"));
        assert!(err.to_string().starts_with("[NoData] Query returned no rows @"));
    }

    #[test]
    fn single_error_vector_is_unwrapped() {
        let err: SyncError = vec![sync_error!(ErrorKind::WriteFailure, "Batch write failed")].into();
        assert_eq!(err.kind(), ErrorKind::WriteFailure);
        assert_eq!(err.count(), 1);
    }

    #[test]
    fn aggregated_errors_expose_all_kinds() {
        let err: SyncError = vec![
            sync_error!(ErrorKind::WriteFailure, "Batch write failed"),
            sync_error!(ErrorKind::ConnectionUnavailable, "Destination unreachable"),
        ]
        .into();

        assert_eq!(
            err.kinds(),
            vec![ErrorKind::WriteFailure, ErrorKind::ConnectionUnavailable]
        );
        assert_eq!(err.count(), 2);
        assert!(err.to_string().starts_with("[Many] 2 errors aggregated"));
    }

    #[test]
    fn source_is_preserved() {
        let io = std::io::Error::other("disk gone");
        let err = sync_error!(ErrorKind::IoError, "Write failed", source: io);
        assert!(error::Error::source(&err).is_some());
    }
}
