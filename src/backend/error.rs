//! Error types for the storage backend abstraction
//!
//! Every backend reports failures as a [`BackendError`]: a coarse [`ErrorKind`]
//! that callers can branch on, the backend that produced it, and the underlying
//! cause rendered as text. Vendor errors (AWS SDK, object_store, HTTP) are
//! classified into a kind at the backend boundary and never leak further.

use serde::Serialize;
use std::fmt;
use std::io;

/// Result type alias for backend operations
pub type BackendResult<T> = std::result::Result<T, BackendError>;

/// Classification of a backend failure
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// Object, bucket or path does not exist
    NotFound,
    /// Caller is authenticated but not allowed to perform the operation
    PermissionDenied,
    /// Credentials were rejected or are missing
    Authentication,
    /// Transport level failure (dispatch, connection reset, DNS)
    Network,
    /// The request exceeded its deadline
    Timeout,
    /// The backend throttled the request
    RateLimited,
    /// The connection definition is unusable
    InvalidConfig,
    /// Arguments were rejected before reaching the backend
    InvalidInput,
    /// The backend does not implement the operation
    Unsupported,
    /// The resource already exists
    AlreadyExists,
    /// Local I/O failure
    Io,
    /// Any other error reported by the service
    Service,
}

impl ErrorKind {
    fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::NotFound => "not found",
            ErrorKind::PermissionDenied => "permission denied",
            ErrorKind::Authentication => "authentication failed",
            ErrorKind::Network => "network error",
            ErrorKind::Timeout => "timed out",
            ErrorKind::RateLimited => "rate limited",
            ErrorKind::InvalidConfig => "invalid configuration",
            ErrorKind::InvalidInput => "invalid input",
            ErrorKind::Unsupported => "unsupported operation",
            ErrorKind::AlreadyExists => "already exists",
            ErrorKind::Io => "I/O error",
            ErrorKind::Service => "service error",
        }
    }

    /// Map an HTTP status code returned by a storage service to a kind
    pub fn from_status(status: u16) -> Self {
        match status {
            400 | 411 | 416 => ErrorKind::InvalidInput,
            401 => ErrorKind::Authentication,
            403 => ErrorKind::PermissionDenied,
            404 => ErrorKind::NotFound,
            408 => ErrorKind::Timeout,
            409 | 412 => ErrorKind::AlreadyExists,
            429 => ErrorKind::RateLimited,
            _ => ErrorKind::Service,
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Unified error type for backend operations
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{backend}: {kind}: {cause}")]
pub struct BackendError {
    /// What went wrong, in terms callers can act on
    pub kind: ErrorKind,
    /// Backend that produced the error ("s3", "gcs", "memory", "local")
    pub backend: String,
    /// Underlying cause
    pub cause: String,
}

impl BackendError {
    /// Create an error of the given kind
    pub fn new(kind: ErrorKind, backend: impl Into<String>, cause: impl Into<String>) -> Self {
        Self {
            kind,
            backend: backend.into(),
            cause: cause.into(),
        }
    }

    pub fn not_found(backend: impl Into<String>, what: impl fmt::Display) -> Self {
        Self::new(ErrorKind::NotFound, backend, format!("{} does not exist", what))
    }

    pub fn invalid_config(backend: impl Into<String>, message: impl Into<String>) -> Self {
        Self::new(ErrorKind::InvalidConfig, backend, message)
    }

    pub fn invalid_input(backend: impl Into<String>, message: impl Into<String>) -> Self {
        Self::new(ErrorKind::InvalidInput, backend, message)
    }

    pub fn unsupported(backend: impl Into<String>, operation: &str) -> Self {
        Self::new(
            ErrorKind::Unsupported,
            backend,
            format!("operation '{}' is not supported", operation),
        )
    }

    pub fn service(backend: impl Into<String>, message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Service, backend, message)
    }

    /// Check if this error indicates the resource was not found
    pub fn is_not_found(&self) -> bool {
        self.kind == ErrorKind::NotFound
    }

    /// Check if this error is related to authentication or authorization
    pub fn is_auth_error(&self) -> bool {
        matches!(
            self.kind,
            ErrorKind::Authentication | ErrorKind::PermissionDenied
        )
    }

    /// Check if retrying the same request could succeed
    ///
    /// Nothing in this crate retries automatically; the flag is surfaced for
    /// callers that want to.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self.kind,
            ErrorKind::Network | ErrorKind::Timeout | ErrorKind::RateLimited
        )
    }

    /// Prefix the cause with additional context
    pub fn context(mut self, context: impl fmt::Display) -> Self {
        self.cause = format!("{}: {}", context, self.cause);
        self
    }
}

impl From<io::Error> for BackendError {
    fn from(err: io::Error) -> Self {
        let kind = match err.kind() {
            io::ErrorKind::NotFound => ErrorKind::NotFound,
            io::ErrorKind::PermissionDenied => ErrorKind::PermissionDenied,
            io::ErrorKind::AlreadyExists => ErrorKind::AlreadyExists,
            io::ErrorKind::TimedOut => ErrorKind::Timeout,
            io::ErrorKind::ConnectionReset
            | io::ErrorKind::ConnectionAborted
            | io::ErrorKind::ConnectionRefused => ErrorKind::Network,
            _ => ErrorKind::Io,
        };
        BackendError::new(kind, "local", err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = BackendError::not_found("s3", "photos/cat.png");
        assert_eq!(err.to_string(), "s3: not found: photos/cat.png does not exist");
    }

    #[test]
    fn test_retryable_kinds() {
        assert!(BackendError::new(ErrorKind::Network, "gcs", "reset").is_retryable());
        assert!(BackendError::new(ErrorKind::RateLimited, "s3", "SlowDown").is_retryable());
        assert!(!BackendError::not_found("s3", "x").is_retryable());
        assert!(!BackendError::invalid_config("s3", "no region").is_retryable());
    }

    #[test]
    fn test_io_error_conversion() {
        let io_err = io::Error::new(io::ErrorKind::NotFound, "file not found");
        let backend_err: BackendError = io_err.into();
        assert!(backend_err.is_not_found());
        assert_eq!(backend_err.backend, "local");
    }

    #[test]
    fn test_status_mapping() {
        assert_eq!(ErrorKind::from_status(404), ErrorKind::NotFound);
        assert_eq!(ErrorKind::from_status(401), ErrorKind::Authentication);
        assert_eq!(ErrorKind::from_status(403), ErrorKind::PermissionDenied);
        assert_eq!(ErrorKind::from_status(429), ErrorKind::RateLimited);
        assert_eq!(ErrorKind::from_status(503), ErrorKind::Service);
    }

    #[test]
    fn test_context_prefixes_cause() {
        let err = BackendError::service("gcs", "boom").context("copy a -> b");
        assert_eq!(err.cause, "copy a -> b: boom");
        assert!(err.is_auth_error() == false);
    }
}
