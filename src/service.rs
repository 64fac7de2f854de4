//! Inbound call surface
//!
//! [`CloudService`] resolves connection ids from the configuration into cached
//! clients and runs the listing, tree and transfer engines on them. Every call
//! takes plain data ([`ObjectRef`], paths, names) and returns plain data or a
//! finished [`TransferJob`]; progress flows out through the [`JobReporter`].
//!
//! # Example
//!
//! ```no_run
//! use orbit_cloud::config::CloudConfig;
//! use orbit_cloud::core::events::JobReporter;
//! use orbit_cloud::service::CloudService;
//! use std::path::Path;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = CloudConfig::from_file(Path::new("orbit-cloud.toml"))?;
//!     let (reporter, mut events) = JobReporter::channel();
//!     let service = CloudService::new(config, reporter);
//!
//!     tokio::spawn(async move {
//!         while let Some(event) = events.recv().await {
//!             println!("{}: {}%", event.job.name, event.job.progress.percentage);
//!         }
//!     });
//!
//!     let files = service.list_files("prod", "reports", "2024/", None).await?;
//!     if let Some(first) = files.first() {
//!         let job = service.download(first, Path::new("./downloads")).await?;
//!         println!("{:?}", job.status);
//!     }
//!     Ok(())
//! }
//! ```

use chrono::Utc;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::backend::{
    BackendError, Bucket, ClientCache, ClientFactory, ErrorKind, ListPage, ObjectDetail, ObjectRef,
    StorageClient,
};
use crate::config::CloudConfig;
use crate::core::events::JobReporter;
use crate::core::listing::{list_all, list_all_recursive, ListProgress};
use crate::core::path::{
    build_cloud_path, clone_file_name, ensure_folder_path, file_name, parent_path, unique_file_name,
};
use crate::core::preview::{inspect, within_limit};
use crate::core::transfer::{TransferJob, TransferManager};
use crate::core::tree::TreeOperations;
use crate::error::{CloudError, Result};
use crate::system::{LocalFileSystem, LocalSystem};

/// Storage operations over the configured connections
pub struct CloudService {
    config: CloudConfig,
    factory: ClientFactory,
    clients: ClientCache,
    local: Arc<dyn LocalFileSystem>,
    reporter: JobReporter,
}

impl CloudService {
    pub fn new(config: CloudConfig, reporter: JobReporter) -> Self {
        let factory = ClientFactory::new(config.engine.client_options());
        Self {
            config,
            factory,
            clients: ClientCache::new(),
            local: Arc::new(LocalSystem),
            reporter,
        }
    }

    /// Replace the local filesystem collaborator
    pub fn with_local_system(mut self, local: Arc<dyn LocalFileSystem>) -> Self {
        self.local = local;
        self
    }

    pub fn config(&self) -> &CloudConfig {
        &self.config
    }

    /// Factory used for connections without a cached client
    pub fn factory(&self) -> &ClientFactory {
        &self.factory
    }

    /// Use `client` for `connection_id` instead of building one
    pub async fn register_client(&self, connection_id: &str, client: Arc<dyn StorageClient>) {
        self.clients.insert(connection_id, client).await;
    }

    /// Client for a configured connection, built on first use
    pub async fn client(&self, connection_id: &str) -> Result<Arc<dyn StorageClient>> {
        if let Some(client) = self.clients.get(connection_id).await {
            return Ok(client);
        }
        let connection = self.config.connection(connection_id)?;
        Ok(self
            .clients
            .get_or_create(connection_id, &connection, &self.factory)
            .await?)
    }

    fn tree(&self, client: Arc<dyn StorageClient>) -> TreeOperations {
        TreeOperations::new(client).with_batch_size(self.config.engine.batch_size)
    }

    fn transfers(&self, client: Arc<dyn StorageClient>) -> TransferManager {
        TransferManager::new(client, self.local.clone(), self.reporter.clone())
            .with_chunk_size(self.config.engine.chunk_size)
            .with_failure_policy(self.config.engine.failure_policy)
    }

    pub async fn list_buckets(&self, connection_id: &str) -> Result<Vec<Bucket>> {
        let client = self.client(connection_id).await?;
        Ok(client.list_buckets().await?)
    }

    pub async fn create_bucket(&self, connection_id: &str, bucket: &Bucket) -> Result<()> {
        let client = self.client(connection_id).await?;
        Ok(client.create_bucket(bucket).await?)
    }

    pub async fn delete_bucket(&self, connection_id: &str, bucket: &str) -> Result<()> {
        let client = self.client(connection_id).await?;
        Ok(client.delete_bucket(bucket).await?)
    }

    /// One page of the level below `prefix`
    pub async fn list_files_page(
        &self,
        connection_id: &str,
        bucket: &str,
        prefix: &str,
        token: Option<&str>,
    ) -> Result<ListPage> {
        let client = self.client(connection_id).await?;
        Ok(client.list_page(bucket, prefix, token, None).await?)
    }

    /// Every entry of the level below `prefix`, across all pages
    pub async fn list_files(
        &self,
        connection_id: &str,
        bucket: &str,
        prefix: &str,
        cancel: Option<&CancellationToken>,
    ) -> Result<Vec<ObjectRef>> {
        let client = self.client(connection_id).await?;
        Ok(list_all(client.as_ref(), bucket, prefix, None, cancel, None).await?)
    }

    /// Every descendant of `prefix`; `on_progress` receives the running count
    pub async fn list_files_recursive(
        &self,
        connection_id: &str,
        bucket: &str,
        prefix: &str,
        cancel: Option<&CancellationToken>,
        on_progress: Option<ListProgress<'_>>,
    ) -> Result<Vec<ObjectRef>> {
        let client = self.client(connection_id).await?;
        Ok(list_all_recursive(client.as_ref(), bucket, prefix, cancel, on_progress).await?)
    }

    /// Object metadata, optionally with an inline preview of the body
    pub async fn get_object_detail(&self, object: &ObjectRef, with_preview: bool) -> Result<ObjectDetail> {
        let client = self.client(&object.connection_id).await?;
        let mut detail = client.object_detail(object).await?;

        if with_preview && !object.is_folder() {
            if within_limit(detail.object.size) {
                let body = client.get_object(object).await?;
                detail.preview = inspect(detail.content_type.as_deref(), &object.path, &body);
            } else {
                debug!(object = %object, size = ?detail.object.size, "Too large to preview");
            }
        }
        Ok(detail)
    }

    /// Write a folder marker and return the folder
    pub async fn create_folder(&self, folder: &ObjectRef) -> Result<ObjectRef> {
        let client = self.client(&folder.connection_id).await?;
        let folder = folder
            .with_path(ensure_folder_path(&folder.path))
            .with_last_modified(Some(Utc::now()));
        client.create_folder_marker(&folder).await?;
        info!(folder = %folder, "Folder created");
        Ok(folder)
    }

    pub async fn delete_tree(&self, object: &ObjectRef) -> Result<()> {
        let client = self.client(&object.connection_id).await?;
        Ok(self.tree(client).delete_tree(object).await?)
    }

    pub async fn copy_tree(&self, source: &ObjectRef, destination: &ObjectRef) -> Result<()> {
        let client = self.client(&source.connection_id).await?;
        Ok(self.tree(client).copy_tree(source, destination).await?)
    }

    pub async fn move_tree(&self, source: &ObjectRef, destination: &ObjectRef) -> Result<()> {
        let client = self.client(&source.connection_id).await?;
        Ok(self.tree(client).move_tree(source, destination).await?)
    }

    /// Clone next to the source under a free `-Copy` name
    pub async fn clone_object(&self, object: &ObjectRef) -> Result<ObjectRef> {
        let client = self.client(&object.connection_id).await?;
        let parent = parent_path(&object.path);
        let siblings = list_all(client.as_ref(), &object.bucket, &parent, None, None, None).await?;
        let name = clone_file_name(siblings.iter().map(|s| s.name.as_str()), &object.name);
        let new_path = build_cloud_path(&parent, &[&name]);
        Ok(self.tree(client).clone_tree(object, &new_path).await?)
    }

    /// Rename in place, refusing names already used in the same folder
    pub async fn rename_object(&self, object: &ObjectRef, new_name: &str) -> Result<ObjectRef> {
        let client = self.client(&object.connection_id).await?;
        let parent = parent_path(&object.path);
        let siblings = list_all(client.as_ref(), &object.bucket, &parent, None, None, None).await?;
        let wanted = new_name.trim().trim_end_matches(client.delimiter());
        if wanted != object.name && siblings.iter().any(|s| s.name == wanted) {
            return Err(CloudError::Backend(BackendError::new(
                ErrorKind::AlreadyExists,
                client.backend_name(),
                "There is already a file/folder with the same name in this location",
            )));
        }
        Ok(self.tree(client).rename_object(object, new_name).await?)
    }

    pub async fn object_exists(&self, object: &ObjectRef) -> Result<bool> {
        let client = self.client(&object.connection_id).await?;
        Ok(client.exists(object).await?)
    }

    /// Download a file or folder into the local directory `target_dir`
    ///
    /// Backend failures are reported in the returned job, not as an error.
    pub async fn download(&self, object: &ObjectRef, target_dir: &Path) -> Result<TransferJob> {
        let client = self.client(&object.connection_id).await?;
        let local_path = target_dir.join(file_name(&object.path));
        Ok(self.transfers(client).download(object, &local_path).await)
    }

    /// Upload a local file or directory into `folder`, renaming on collision
    pub async fn upload(&self, folder: &ObjectRef, local_path: &Path) -> Result<TransferJob> {
        let client = self.client(&folder.connection_id).await?;
        let folder_path = ensure_folder_path(&folder.path);
        let siblings =
            list_all(client.as_ref(), &folder.bucket, &folder_path, None, None, None).await?;
        let name = unique_file_name(
            siblings.iter().map(|s| s.name.as_str()),
            &local_path.to_string_lossy(),
        );

        let key = build_cloud_path(&folder_path, &[&name]);
        let key = if self.local.is_dir(local_path).await? {
            ensure_folder_path(&key)
        } else {
            key
        };
        Ok(self
            .transfers(client)
            .upload(&folder.with_path(key), local_path)
            .await)
    }

    /// Upload several local paths into `folder`, one job each
    pub async fn upload_files(&self, folder: &ObjectRef, paths: &[PathBuf]) -> Result<Vec<TransferJob>> {
        let mut jobs = Vec::with_capacity(paths.len());
        for path in paths {
            jobs.push(self.upload(folder, path).await?);
        }
        Ok(jobs)
    }
}
