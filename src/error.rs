/*!
 * Error types for orbit-cloud configuration and command surfaces
 */

use std::io;
use std::path::PathBuf;
use thiserror::Error;

use crate::backend::{BackendError, ErrorKind};

pub type Result<T> = std::result::Result<T, CloudError>;

/// Exit code constants for structured process exit
pub const EXIT_SUCCESS: i32 = 0;
pub const EXIT_PARTIAL: i32 = 1;
pub const EXIT_FATAL: i32 = 2;

#[derive(Debug, Error)]
pub enum CloudError {
    /// Invalid or inconsistent configuration
    #[error("Configuration error: {0}")]
    Config(String),

    /// Failure reported by a storage backend
    #[error(transparent)]
    Backend(#[from] BackendError),

    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// Configuration file could not be parsed
    #[error("Failed to parse {path}: {source}")]
    Toml {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },

    /// Configuration could not be serialized
    #[error("Failed to serialize configuration: {0}")]
    TomlSerialize(#[from] toml::ser::Error),

    /// No connection with this id in the configuration
    #[error("Unknown connection '{0}'")]
    UnknownConnection(String),

    /// A transfer finished without completing
    #[error("Transfer failed: {0}")]
    Transfer(String),
}

impl CloudError {
    /// Get the process exit code for this error
    pub fn exit_code(&self) -> i32 {
        match self {
            CloudError::Config(_)
            | CloudError::Toml { .. }
            | CloudError::TomlSerialize(_)
            | CloudError::UnknownConnection(_) => EXIT_FATAL,
            CloudError::Backend(e) => match e.kind {
                ErrorKind::InvalidConfig | ErrorKind::Authentication | ErrorKind::PermissionDenied => {
                    EXIT_FATAL
                }
                _ => EXIT_PARTIAL,
            },
            CloudError::Io(_) | CloudError::Transfer(_) => EXIT_PARTIAL,
        }
    }

    /// Check if this error is transient (temporary, worth retrying)
    pub fn is_transient(&self) -> bool {
        match self {
            CloudError::Backend(e) => e.is_retryable(),
            CloudError::Io(e) => matches!(
                e.kind(),
                io::ErrorKind::Interrupted | io::ErrorKind::TimedOut | io::ErrorKind::WouldBlock
            ),
            _ => false,
        }
    }
}
