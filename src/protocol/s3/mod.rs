//! Native S3 backend
//!
//! Implements [`StorageClient`](crate::backend::StorageClient) over the official
//! AWS SDK for Rust. The same client serves AWS S3 and S3-compatible services
//! such as MinIO or Ceph; compatible endpoints always use path-style addressing.
//!
//! - Listing through `ListObjectsV2` with continuation tokens
//! - Ranged reads parsed from `Content-Range`
//! - Multipart upload above a configurable threshold, aborted on failure
//! - Bulk deletion through `DeleteObjects`, 1000 keys per request
//! - ACL and tag lookup for AWS connections
//!
//! # Example
//!
//! ```no_run
//! use orbit_cloud::backend::{BackendKind, ClientOptions, ObjectRef, StorageClient, StorageConnection};
//! use orbit_cloud::protocol::s3::S3Client;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let connection = StorageConnection::new("minio", "MinIO", BackendKind::S3Compatible)
//!         .with_endpoint("http://localhost:9000")
//!         .with_credentials("minioadmin", "minioadmin");
//!     let client = S3Client::new(connection, &ClientOptions::default()).await?;
//!
//!     let page = client.list_page("my-bucket", "reports/", None, None).await?;
//!     for entry in page.entries {
//!         println!("{} {:?}", entry.path, entry.size);
//!     }
//!     Ok(())
//! }
//! ```

pub mod batch;
pub mod client;
pub mod error;
pub mod multipart;

pub use batch::{BatchDeleteResult, BatchError, MAX_DELETE_BATCH};
pub use client::{object_url, S3Client};
pub use error::{S3Error, S3Result};
pub use multipart::parse_content_range;
