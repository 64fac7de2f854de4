/*!
 * Orbit Cloud - object storage browsing and transfer
 *
 * A multi-backend storage layer over S3 and Google Cloud Storage with:
 * - Paginated and recursive listing with cancellation
 * - Folder-level delete, copy, move, clone and rename in bounded batches
 * - Chunked downloads and multipart uploads tracked as job trees
 * - A process-wide client cache keyed by connection
 */

pub mod backend;
pub mod cli_progress;
pub mod config;
pub mod core;
pub mod error;
pub mod logging;
pub mod protocol;
pub mod service;
pub mod system;

// Re-export commonly used types
pub use backend::{BackendError, BackendKind, ObjectRef, StorageClient, StorageConnection};
pub use config::CloudConfig;
pub use core::{JobStatus, TransferJob};
pub use error::{CloudError, Result};
pub use service::CloudService;

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
