//! Uniform interface over object storage services
//!
//! Every supported service implements [`StorageClient`]: the primitive operations
//! (list one page, head, ranged get, put, copy, delete, folder markers) from which
//! the listing, tree and transfer engines in [`crate::core`] are built.
//!
//! # Example
//!
//! ```no_run
//! use orbit_cloud::backend::{create_client, BackendKind, StorageConnection};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let connection = StorageConnection::new("prod", "Production", BackendKind::AwsS3)
//!         .with_region("eu-west-1");
//!     let client = create_client(&connection).await?;
//!     for bucket in client.list_buckets().await? {
//!         println!("{}", bucket.name);
//!     }
//!     Ok(())
//! }
//! ```

pub mod error;
pub mod memory;
pub mod registry;
pub mod types;

pub use error::{BackendError, BackendResult, ErrorKind};
pub use memory::MemoryClient;
pub use registry::{
    create_cached_client, create_client, global_cache, ClientBuilder, ClientCache, ClientFactory,
    ClientOptions,
};
pub use types::{
    AccessControl, BackendKind, Bucket, Grant, ListPage, ObjectDetail, ObjectRef, ObjectTag,
    RangeChunk, StorageConnection, UploadBody, UploadProgress,
};

use async_trait::async_trait;
use bytes::Bytes;

use crate::core::path::DEFAULT_DELIMITER;

/// Primitive operations of one storage account
///
/// Implementors must be `Send + Sync`; one client is shared by every operation
/// on its connection.
///
/// # Listing contract
///
/// `list_page` with `delimiter = None` lists one level below `prefix` using the
/// backend's own delimiter, turning common prefixes into folder entries. With
/// `Some("")` the listing is flat and returns every descendant key. The prefix
/// itself is never part of the returned entries.
#[async_trait]
pub trait StorageClient: Send + Sync {
    /// Short backend name used in logs and errors ("s3", "gcs", "memory")
    fn backend_name(&self) -> &'static str;

    /// Connection this client was built from
    fn connection(&self) -> &StorageConnection;

    /// Path separator used to simulate folders
    fn delimiter(&self) -> &str {
        DEFAULT_DELIMITER
    }

    async fn list_buckets(&self) -> BackendResult<Vec<Bucket>>;

    async fn create_bucket(&self, bucket: &Bucket) -> BackendResult<()>;

    async fn delete_bucket(&self, bucket: &str) -> BackendResult<()>;

    /// List a single page under `prefix`
    async fn list_page(
        &self,
        bucket: &str,
        prefix: &str,
        token: Option<&str>,
        delimiter: Option<&str>,
    ) -> BackendResult<ListPage>;

    /// Object metadata without the body
    ///
    /// # Errors
    ///
    /// Returns an error of kind [`ErrorKind::NotFound`] when the key does not exist.
    async fn head_object(&self, target: &ObjectRef) -> BackendResult<ObjectDetail>;

    /// Metadata enriched with whatever extras the backend offers (ACL, tags)
    async fn object_detail(&self, target: &ObjectRef) -> BackendResult<ObjectDetail> {
        self.head_object(target).await
    }

    /// Whole object body
    async fn get_object(&self, target: &ObjectRef) -> BackendResult<Bytes>;

    /// Inclusive byte range `start..=end`
    ///
    /// The returned chunk carries the range the backend actually served, which
    /// is shorter than requested at the end of the object. A zero-length object
    /// yields [`RangeChunk::empty`].
    async fn get_range(&self, target: &ObjectRef, start: u64, end: u64) -> BackendResult<RangeChunk>;

    /// Store an object, reporting `(loaded, total)` through `progress`
    async fn put_object(
        &self,
        target: &ObjectRef,
        body: UploadBody,
        progress: Option<UploadProgress<'_>>,
    ) -> BackendResult<()>;

    /// Server-side copy of one object
    async fn copy_single(&self, source: &ObjectRef, destination: &ObjectRef) -> BackendResult<()>;

    async fn delete_single(&self, target: &ObjectRef) -> BackendResult<()>;

    /// Write the zero-byte object standing for a folder
    async fn create_folder_marker(&self, target: &ObjectRef) -> BackendResult<()>;

    /// Keys per bulk delete request, `None` when the backend has no bulk delete
    fn bulk_delete_limit(&self) -> Option<usize> {
        None
    }

    /// Delete up to [`bulk_delete_limit`](Self::bulk_delete_limit) keys in one request
    async fn delete_many(&self, bucket: &str, keys: &[String]) -> BackendResult<()> {
        let _ = (bucket, keys);
        Err(BackendError::unsupported(self.backend_name(), "delete_many"))
    }

    /// Whether the exact key exists; a missing key is `false`, not an error
    async fn exists(&self, target: &ObjectRef) -> BackendResult<bool> {
        match self.head_object(target).await {
            Ok(_) => Ok(true),
            Err(e) if e.is_not_found() => Ok(false),
            Err(e) => Err(e),
        }
    }
}
