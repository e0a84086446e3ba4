//! Error types for the bioetl pipeline.
//!
//! Every failure is classified into an [`ErrorKind`] so the retry policy and the
//! orchestrator's error policy can pattern-match on it instead of on messages.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::time::Duration;
use thiserror::Error;

/// Convenience alias used across the crate.
pub type Result<T, E = EtlError> = std::result::Result<T, E>;

/// Classification of an [`EtlError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorKind {
    /// Config document rejected.
    ConfigValidation,
    /// Transport failure.
    ClientNetwork,
    /// Upstream answered 429.
    ClientRateLimited,
    /// Upstream answered with a non-success status.
    ClientResponse,
    /// Circuit breaker refused the call.
    CircuitOpen,
    /// Built URL exceeds the configured limit.
    UrlTooLong,
    /// Payload could not be parsed.
    ParseError,
    /// Schema violation.
    ValidationError,
    /// I/O failure on input or output.
    WriteError,
    /// Stage wrapper.
    PipelineStage,
    /// A deadline elapsed.
    Timeout,
    /// Cooperative cancellation was requested.
    Cancelled,
}

impl ErrorKind {
    /// Returns the canonical upper-case code.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::ConfigValidation => "CONFIG_VALIDATION",
            Self::ClientNetwork => "CLIENT_NETWORK",
            Self::ClientRateLimited => "CLIENT_RATE_LIMITED",
            Self::ClientResponse => "CLIENT_RESPONSE",
            Self::CircuitOpen => "CIRCUIT_OPEN",
            Self::UrlTooLong => "URL_TOO_LONG",
            Self::ParseError => "PARSE_ERROR",
            Self::ValidationError => "VALIDATION_ERROR",
            Self::WriteError => "WRITE_ERROR",
            Self::PipelineStage => "PIPELINE_STAGE",
            Self::Timeout => "TIMEOUT",
            Self::Cancelled => "CANCELLED",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The main error type for bioetl operations.
#[derive(Debug, Error)]
pub enum EtlError {
    /// The pipeline configuration was rejected.
    #[error("Invalid configuration: {0}")]
    Config(String),

    /// A transport-level failure (connection refused, reset, DNS).
    #[error("Network error calling {url}: {message}")]
    Network {
        /// Requested URL.
        url: String,
        /// Underlying message.
        message: String,
    },

    /// The upstream throttled the request.
    #[error("Rate limited by upstream at {url}")]
    RateLimited {
        /// Requested URL.
        url: String,
        /// Value of the `Retry-After` header, if any.
        retry_after: Option<Duration>,
    },

    /// The upstream answered with an error status.
    #[error("HTTP {status} from {url}: {message}")]
    Response {
        /// HTTP status code.
        status: u16,
        /// Requested URL.
        url: String,
        /// Response body excerpt.
        message: String,
    },

    /// The circuit breaker refused the call.
    #[error("Circuit open for {endpoint}")]
    CircuitOpen {
        /// Endpoint the breaker guards.
        endpoint: String,
    },

    /// The built URL exceeds the configured maximum length.
    #[error("URL length {length} exceeds maximum {max}")]
    UrlTooLong {
        /// Actual URL length.
        length: usize,
        /// Configured maximum.
        max: usize,
    },

    /// A response payload or input file could not be parsed.
    #[error("Parse error: {0}")]
    Parse(String),

    /// One or more schema checks failed.
    #[error("{0}")]
    Validation(#[from] ValidationError),

    /// Writing output failed.
    #[error("Write error: {0}")]
    Write(String),

    /// A deadline elapsed before the operation completed.
    #[error("Timed out: {0}")]
    Timeout(String),

    /// The run was cancelled.
    #[error("Pipeline cancelled: {0}")]
    Cancelled(String),

    /// A stage failed; carries run identity and the cause.
    #[error("{0}")]
    Stage(#[from] Box<PipelineStageError>),

    /// The run finished, but stages failed under the skip policy.
    #[error("Run completed with {} skipped stage failure(s): {}", .failures.len(), .failures.join("; "))]
    Incomplete {
        /// Wrapped messages of the skipped failures.
        failures: Vec<String>,
    },

    /// IO error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// CSV read/write error.
    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    /// YAML (de)serialization error.
    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    /// JSON (de)serialization error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl EtlError {
    /// Returns the kind of this error.
    #[must_use]
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Config(_) | Self::Yaml(_) => ErrorKind::ConfigValidation,
            Self::Network { .. } => ErrorKind::ClientNetwork,
            Self::RateLimited { .. } => ErrorKind::ClientRateLimited,
            Self::Response { .. } => ErrorKind::ClientResponse,
            Self::CircuitOpen { .. } => ErrorKind::CircuitOpen,
            Self::UrlTooLong { .. } => ErrorKind::UrlTooLong,
            Self::Parse(_) | Self::Json(_) | Self::Csv(_) => ErrorKind::ParseError,
            Self::Validation(_) => ErrorKind::ValidationError,
            Self::Write(_) | Self::Io(_) => ErrorKind::WriteError,
            Self::Timeout(_) => ErrorKind::Timeout,
            Self::Cancelled(_) => ErrorKind::Cancelled,
            Self::Stage(_) | Self::Incomplete { .. } => ErrorKind::PipelineStage,
        }
    }

    /// Returns the kind of the innermost cause, looking through stage wrappers.
    #[must_use]
    pub fn root_kind(&self) -> ErrorKind {
        match self {
            Self::Stage(inner) => inner.cause.root_kind(),
            other => other.kind(),
        }
    }

    /// Returns true if the error is worth retrying (network, timeout, 429, 5xx).
    #[must_use]
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Network { .. } | Self::RateLimited { .. } | Self::Timeout(_) => true,
            Self::Response { status, .. } => *status >= 500,
            Self::Stage(inner) => inner.cause.is_transient(),
            _ => false,
        }
    }

    /// Returns the upstream `Retry-After` hint, if any.
    #[must_use]
    pub fn retry_after(&self) -> Option<Duration> {
        match self {
            Self::RateLimited { retry_after, .. } => *retry_after,
            _ => None,
        }
    }

    /// Maps the error to the CLI exit code.
    #[must_use]
    pub fn exit_code(&self) -> i32 {
        match self.root_kind() {
            ErrorKind::ConfigValidation => 2,
            ErrorKind::Cancelled => 130,
            _ => 1,
        }
    }

    /// Creates a configuration error.
    #[must_use]
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config(message.into())
    }

    /// Creates a parse error.
    #[must_use]
    pub fn parse(message: impl Into<String>) -> Self {
        Self::Parse(message.into())
    }

    /// Creates a write error.
    #[must_use]
    pub fn write(message: impl Into<String>) -> Self {
        Self::Write(message.into())
    }
}

/// A single failed schema check.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FailureCase {
    /// Column the check ran on.
    pub column: String,
    /// Offending value rendered as text (`null` for missing).
    pub value: String,
    /// Check identifier, e.g. `isin[B,F,A,T,P,U]`.
    pub check: String,
    /// Zero-based row position; `None` for column-level failures.
    pub row_index: Option<usize>,
}

impl FailureCase {
    /// Creates a new failure case.
    #[must_use]
    pub fn new(
        column: impl Into<String>,
        value: impl Into<String>,
        check: impl Into<String>,
        row_index: Option<usize>,
    ) -> Self {
        Self {
            column: column.into(),
            value: value.into(),
            check: check.into(),
            row_index,
        }
    }
}

impl fmt::Display for FailureCase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.row_index {
            Some(row) => write!(f, "{}[{}]={} failed {}", self.column, row, self.value, self.check),
            None => write!(f, "{} failed {}", self.column, self.check),
        }
    }
}

/// Error raised when schema validation fails.
#[derive(Debug, Clone, Error)]
#[error("Schema validation failed for '{entity}': {} failure case(s){}", .failures.len(), preview(.failures))]
pub struct ValidationError {
    /// Entity whose schema was checked.
    pub entity: String,
    /// Every failing check, in row then column order.
    pub failures: Vec<FailureCase>,
}

fn preview(failures: &[FailureCase]) -> String {
    failures
        .first()
        .map(|f| format!(" (first: {f})"))
        .unwrap_or_default()
}

impl ValidationError {
    /// Creates a new validation error.
    #[must_use]
    pub fn new(entity: impl Into<String>, failures: Vec<FailureCase>) -> Self {
        Self {
            entity: entity.into(),
            failures,
        }
    }

    /// Returns failures grouped by column.
    #[must_use]
    pub fn by_column(&self) -> HashMap<&str, Vec<&FailureCase>> {
        let mut map: HashMap<&str, Vec<&FailureCase>> = HashMap::new();
        for failure in &self.failures {
            map.entry(failure.column.as_str()).or_default().push(failure);
        }
        map
    }
}

/// Error raised when a pipeline stage fails.
#[derive(Debug, Error)]
#[error("Stage '{stage}' failed for {entity}/{provider} (attempt {attempt}): {cause}")]
pub struct PipelineStageError {
    /// Run identifier.
    pub run_id: String,
    /// Provider name.
    pub provider: String,
    /// Entity name.
    pub entity: String,
    /// Stage name.
    pub stage: String,
    /// Attempt number (1-based).
    pub attempt: u32,
    /// Underlying error.
    #[source]
    pub cause: EtlError,
}

impl PipelineStageError {
    /// Wraps a cause into a boxed stage error.
    #[must_use]
    pub fn wrap(
        run_id: impl Into<String>,
        provider: impl Into<String>,
        entity: impl Into<String>,
        stage: impl Into<String>,
        attempt: u32,
        cause: EtlError,
    ) -> EtlError {
        EtlError::Stage(Box::new(Self {
            run_id: run_id.into(),
            provider: provider.into(),
            entity: entity.into(),
            stage: stage.into(),
            attempt,
            cause,
        }))
    }
}
