//! Error types for S3 operations

use aws_sdk_s3::config::http::HttpResponse;
use aws_sdk_s3::error::{DisplayErrorContext, ProvideErrorMetadata, SdkError};
use std::io;
use thiserror::Error;

use crate::backend::{BackendError, ErrorKind};

/// Result type alias for S3 operations
pub type S3Result<T> = Result<T, S3Error>;

/// Errors that can occur during S3 operations
#[derive(Error, Debug, Clone)]
pub enum S3Error {
    /// AWS SDK error that fits no other variant
    #[error("AWS SDK error: {0}")]
    Sdk(String),

    /// S3 service error with specific error code
    #[error("S3 service error ({code}, HTTP {status}): {message}")]
    Service {
        code: String,
        status: u16,
        message: String,
    },

    /// Object or bucket does not exist
    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Access denied: {0}")]
    AccessDenied(String),

    #[error("Authentication error: {0}")]
    Authentication(String),

    #[error("Already exists: {0}")]
    AlreadyExists(String),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// Range not satisfiable
    #[error("Invalid range: {0}")]
    InvalidRange(String),

    #[error("Multipart upload error: {0}")]
    MultipartUpload(String),

    #[error("I/O error: {0}")]
    Io(String),

    #[error("Network error: {0}")]
    Network(String),

    #[error("Operation timed out: {0}")]
    Timeout(String),

    #[error("Rate limit exceeded: {0}")]
    RateLimitExceeded(String),

    /// Generic error with context
    #[error("{context}: {source}")]
    WithContext {
        context: String,
        source: Box<S3Error>,
    },
}

impl S3Error {
    /// Add context to an error
    pub fn context<S: Into<String>>(self, context: S) -> Self {
        S3Error::WithContext {
            context: context.into(),
            source: Box::new(self),
        }
    }

    /// Classify a service error response by code, then by HTTP status
    pub fn from_service(status: u16, code: &str, message: &str) -> Self {
        let detail = if message.is_empty() {
            code.to_string()
        } else {
            format!("{}: {}", code, message)
        };
        match code {
            "NoSuchKey" | "NoSuchBucket" | "NotFound" | "NoSuchUpload" => S3Error::NotFound(detail),
            "AccessDenied" | "AllAccessDisabled" => S3Error::AccessDenied(detail),
            "InvalidAccessKeyId" | "SignatureDoesNotMatch" | "ExpiredToken" | "InvalidToken" => {
                S3Error::Authentication(detail)
            }
            "BucketAlreadyExists" | "BucketAlreadyOwnedByYou" | "BucketNotEmpty" => {
                S3Error::AlreadyExists(detail)
            }
            "InvalidRange" => S3Error::InvalidRange(detail),
            "SlowDown" | "Throttling" | "TooManyRequests" => S3Error::RateLimitExceeded(detail),
            "RequestTimeout" => S3Error::Timeout(detail),
            _ => match status {
                404 => S3Error::NotFound(detail),
                403 => S3Error::AccessDenied(detail),
                401 => S3Error::Authentication(detail),
                416 => S3Error::InvalidRange(detail),
                429 => S3Error::RateLimitExceeded(detail),
                _ => S3Error::Service {
                    code: code.to_string(),
                    status,
                    message: message.to_string(),
                },
            },
        }
    }

    /// Check if error is retryable
    pub fn is_retryable(&self) -> bool {
        match self {
            S3Error::Network(_) | S3Error::Timeout(_) | S3Error::RateLimitExceeded(_) => true,
            S3Error::Service { code, status, .. } => is_retryable_code(code) || *status >= 500,
            S3Error::WithContext { source, .. } => source.is_retryable(),
            _ => false,
        }
    }

    pub fn is_not_found(&self) -> bool {
        match self {
            S3Error::NotFound(_) => true,
            S3Error::WithContext { source, .. } => source.is_not_found(),
            _ => false,
        }
    }

    fn kind(&self) -> ErrorKind {
        match self {
            S3Error::Sdk(_) => ErrorKind::Service,
            S3Error::Service { status, .. } => ErrorKind::from_status(*status),
            S3Error::NotFound(_) => ErrorKind::NotFound,
            S3Error::AccessDenied(_) => ErrorKind::PermissionDenied,
            S3Error::Authentication(_) => ErrorKind::Authentication,
            S3Error::AlreadyExists(_) => ErrorKind::AlreadyExists,
            S3Error::InvalidConfig(_) => ErrorKind::InvalidConfig,
            S3Error::InvalidRange(_) => ErrorKind::InvalidInput,
            S3Error::MultipartUpload(_) => ErrorKind::Service,
            S3Error::Io(_) => ErrorKind::Io,
            S3Error::Network(_) => ErrorKind::Network,
            S3Error::Timeout(_) => ErrorKind::Timeout,
            S3Error::RateLimitExceeded(_) => ErrorKind::RateLimited,
            S3Error::WithContext { source, .. } => source.kind(),
        }
    }
}

// Convert io::Error to S3Error
impl From<io::Error> for S3Error {
    fn from(err: io::Error) -> Self {
        S3Error::Io(err.to_string())
    }
}

impl From<S3Error> for BackendError {
    fn from(err: S3Error) -> Self {
        BackendError::new(err.kind(), "s3", err.to_string())
    }
}

/// Check if an AWS error code is retryable
pub(crate) fn is_retryable_code(code: &str) -> bool {
    matches!(
        code,
        "RequestTimeout" | "ServiceUnavailable" | "InternalError" | "SlowDown" | "RequestTimeTooSkewed"
    )
}

/// Convert AWS SDK errors to S3Error
impl<E> From<SdkError<E, HttpResponse>> for S3Error
where
    E: ProvideErrorMetadata + std::error::Error + 'static,
{
    fn from(error: SdkError<E, HttpResponse>) -> Self {
        match &error {
            SdkError::TimeoutError(_) => S3Error::Timeout(DisplayErrorContext(&error).to_string()),
            SdkError::DispatchFailure(failure) if failure.is_timeout() => {
                S3Error::Timeout(DisplayErrorContext(&error).to_string())
            }
            SdkError::DispatchFailure(_) | SdkError::ResponseError(_) => {
                S3Error::Network(DisplayErrorContext(&error).to_string())
            }
            SdkError::ServiceError(service) => {
                let status = service.raw().status().as_u16();
                let code = service.err().code().unwrap_or("Unknown");
                let message = service.err().message().unwrap_or_default();
                S3Error::from_service(status, code, message)
            }
            _ => S3Error::Sdk(DisplayErrorContext(&error).to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_context() {
        let with_context = S3Error::NotFound("k".to_string()).context("Failed to copy");
        assert!(matches!(with_context, S3Error::WithContext { .. }));
        assert!(with_context.is_not_found());
    }

    #[test]
    fn test_service_codes_are_classified() {
        assert!(matches!(S3Error::from_service(404, "NoSuchKey", ""), S3Error::NotFound(_)));
        assert!(matches!(S3Error::from_service(404, "Unknown", ""), S3Error::NotFound(_)));
        assert!(matches!(
            S3Error::from_service(403, "SignatureDoesNotMatch", "bad sig"),
            S3Error::Authentication(_)
        ));
        assert!(matches!(S3Error::from_service(403, "Unknown", ""), S3Error::AccessDenied(_)));
        assert!(matches!(S3Error::from_service(416, "InvalidRange", ""), S3Error::InvalidRange(_)));
        assert!(matches!(
            S3Error::from_service(409, "BucketAlreadyOwnedByYou", ""),
            S3Error::AlreadyExists(_)
        ));
        assert!(matches!(
            S3Error::from_service(500, "InternalError", "oops"),
            S3Error::Service { status: 500, .. }
        ));
    }

    #[test]
    fn test_retryable_errors() {
        assert!(S3Error::Network("connection lost".to_string()).is_retryable());
        assert!(S3Error::Timeout("timed out".to_string()).is_retryable());
        assert!(S3Error::from_service(503, "SlowDown", "").is_retryable());
        assert!(S3Error::from_service(500, "InternalError", "").is_retryable());
        assert!(!S3Error::from_service(404, "NoSuchKey", "").is_retryable());
        assert!(!S3Error::Authentication("bad credentials".to_string()).is_retryable());
    }

    #[test]
    fn test_retryable_codes() {
        assert!(is_retryable_code("RequestTimeout"));
        assert!(is_retryable_code("ServiceUnavailable"));
        assert!(is_retryable_code("SlowDown"));
        assert!(!is_retryable_code("NoSuchKey"));
        assert!(!is_retryable_code("AccessDenied"));
    }

    #[test]
    fn test_backend_error_conversion() {
        let err: BackendError = S3Error::from_service(404, "NoSuchBucket", "gone").into();
        assert!(err.is_not_found());
        assert_eq!(err.backend, "s3");

        let err: BackendError = S3Error::from_service(429, "Unknown", "").into();
        assert_eq!(err.kind, ErrorKind::RateLimited);

        let err: BackendError = S3Error::Io("disk".to_string()).context("download").into();
        assert_eq!(err.kind, ErrorKind::Io);
        assert!(err.cause.starts_with("download: "));
    }

    #[test]
    fn test_error_display_formats() {
        let err = S3Error::Service {
            code: "SlowDown".to_string(),
            status: 503,
            message: "rate limited".to_string(),
        };
        assert_eq!(format!("{}", err), "S3 service error (SlowDown, HTTP 503): rate limited");
        assert_eq!(
            S3Error::NotFound("NoSuchKey".to_string()).to_string(),
            "Not found: NoSuchKey"
        );
    }
}
