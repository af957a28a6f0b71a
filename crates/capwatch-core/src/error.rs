//! Error types module
//!
//! Remote collaborator failures are normalised into [`RemoteError`] with an
//! [`ErrorKind`] that drives retry decisions and how a failure degrades the
//! monitoring cycle.

use serde::{Deserialize, Serialize};
use std::fmt::{Display, Formatter, Result as FmtResult};
use std::path::PathBuf;

use crate::redact::redact;

/// Classification of a remote-call failure
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// Rate limiting by the remote service - retried with backoff
    Throttling,
    /// Internal error, unavailable service or timeout - retried with backoff
    Transient,
    /// Caller lacks permission - never retried
    Permission,
    /// Bad request parameters - never retried, indicates a configuration bug
    Validation,
    /// The addressed resource does not exist
    NotFound,
    /// The quota references a strategy or collaborator that cannot serve it
    UnknownStrategy,
    /// Anything else - retried with a reduced attempt budget
    Unknown,
}

impl ErrorKind {
    /// Map a provider error code (e.g. `ThrottlingException`) onto the taxonomy.
    pub fn from_code(code: &str) -> Self {
        match code {
            "Throttling"
            | "ThrottlingException"
            | "ThrottledException"
            | "TooManyRequestsException"
            | "RequestLimitExceeded"
            | "RequestThrottled"
            | "RequestThrottledException"
            | "ProvisionedThroughputExceededException"
            | "LimitExceededException"
            | "SlowDown" => ErrorKind::Throttling,
            "InternalServiceException"
            | "InternalServerException"
            | "InternalServerError"
            | "InternalFailure"
            | "InternalError"
            | "ServiceException"
            | "ServiceUnavailable"
            | "ServiceUnavailableException"
            | "RequestTimeout"
            | "RequestTimeoutException" => ErrorKind::Transient,
            "AccessDenied"
            | "AccessDeniedException"
            | "AuthorizationError"
            | "NotAuthorized"
            | "UnauthorizedOperation"
            | "UnrecognizedClientException"
            | "InvalidClientTokenId"
            | "ExpiredToken"
            | "ExpiredTokenException" => ErrorKind::Permission,
            "ValidationException"
            | "ValidationError"
            | "InvalidParameter"
            | "InvalidParameterException"
            | "InvalidParameterValue"
            | "InvalidParameterValueException"
            | "InvalidParameterCombination"
            | "InvalidRequestException"
            | "MissingParameter"
            | "BadRequestException" => ErrorKind::Validation,
            "ResourceNotFoundException"
            | "NoSuchResourceException"
            | "NotFoundException"
            | "NotFound"
            | "NoSuchKey"
            | "NoSuchBucket" => ErrorKind::NotFound,
            _ => ErrorKind::Unknown,
        }
    }

    /// Whether a failure of this kind may succeed on a later attempt.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            ErrorKind::Throttling | ErrorKind::Transient | ErrorKind::Unknown
        )
    }
}

impl Display for ErrorKind {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        match self {
            ErrorKind::Throttling => write!(f, "throttling"),
            ErrorKind::Transient => write!(f, "transient"),
            ErrorKind::Permission => write!(f, "permission"),
            ErrorKind::Validation => write!(f, "validation"),
            ErrorKind::NotFound => write!(f, "not_found"),
            ErrorKind::UnknownStrategy => write!(f, "unknown_strategy"),
            ErrorKind::Unknown => write!(f, "unknown"),
        }
    }
}

/// Failure of a call to a remote collaborator
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
#[error("{service}.{operation} failed ({kind}): {message}")]
pub struct RemoteError {
    pub kind: ErrorKind,
    pub service: String,
    pub operation: String,
    pub message: String,
    /// Number of attempts made before giving up (0 when never attempted).
    pub attempts: u32,
}

impl RemoteError {
    /// Create a new error. The message is redacted before it is stored.
    pub fn new(
        kind: ErrorKind,
        service: impl Into<String>,
        operation: impl Into<String>,
        message: impl AsRef<str>,
    ) -> Self {
        Self {
            kind,
            service: service.into(),
            operation: operation.into(),
            message: redact(message.as_ref()).into_owned(),
            attempts: 0,
        }
    }

    /// Build an error from a provider error code, falling back to `Unknown`.
    pub fn from_code(
        code: Option<&str>,
        service: impl Into<String>,
        operation: impl Into<String>,
        message: impl AsRef<str>,
    ) -> Self {
        let kind = code.map(ErrorKind::from_code).unwrap_or(ErrorKind::Unknown);
        Self::new(kind, service, operation, message)
    }

    pub fn with_attempts(mut self, attempts: u32) -> Self {
        self.attempts = attempts;
        self
    }

    pub fn is_not_found(&self) -> bool {
        self.kind == ErrorKind::NotFound
    }

    /// Short one-line description used for health records.
    pub fn summary(&self) -> String {
        format!("{} ({}): {}", self.operation, self.kind, self.message)
    }
}

/// Quota catalog loading errors
#[derive(Debug, thiserror::Error)]
pub enum CatalogError {
    #[error("Failed to read quota catalog {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Quota catalog is not valid JSON: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("Quota catalog has {} validation error(s): {}", .0.len(), .0.join("; "))]
    Invalid(Vec<String>),
}

impl CatalogError {
    /// All validation messages, or the single underlying error message.
    pub fn messages(&self) -> Vec<String> {
        match self {
            CatalogError::Invalid(errors) => errors.clone(),
            other => vec![other.to_string()],
        }
    }
}
