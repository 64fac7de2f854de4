//! Client factory and process-wide client cache
//!
//! [`ClientFactory`] maps each [`BackendKind`] to a builder. The built-in
//! builders are registered according to the enabled cargo features; additional
//! builders (test doubles, proxies) can be registered at runtime.
//!
//! Clients are expensive to build (credential resolution, connection pools), so
//! [`create_cached_client`] keeps one per key for the life of the process.

use super::error::{BackendError, BackendResult};
use super::types::{BackendKind, StorageConnection};
use super::StorageClient;
use once_cell::sync::Lazy;
use std::collections::HashMap;
use std::sync::{Arc, RwLock};
use std::time::Duration;
use tokio::sync::Mutex;

/// Box future for async builder functions
pub type BoxFuture<T> = std::pin::Pin<Box<dyn std::future::Future<Output = T> + Send>>;

/// Builder function producing a client for one connection
pub type ClientBuilder = Arc<
    dyn Fn(StorageConnection, ClientOptions) -> BoxFuture<BackendResult<Arc<dyn StorageClient>>>
        + Send
        + Sync,
>;

/// Settings applied to every client a factory builds
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientOptions {
    /// Per-request timeout
    pub request_timeout: Duration,
    /// Uploads above this many bytes use multipart
    pub multipart_threshold: u64,
    /// Bytes per multipart part
    pub part_size: usize,
}

impl Default for ClientOptions {
    fn default() -> Self {
        Self {
            request_timeout: Duration::from_secs(300),
            multipart_threshold: 5 * 1024 * 1024,
            part_size: 5 * 1024 * 1024,
        }
    }
}

/// Creates storage clients from connections
///
/// # Example
///
/// ```no_run
/// use orbit_cloud::backend::{BackendKind, ClientFactory, ClientOptions, StorageConnection};
///
/// #[tokio::main]
/// async fn main() -> Result<(), Box<dyn std::error::Error>> {
///     let factory = ClientFactory::new(ClientOptions::default());
///     let connection = StorageConnection::new("gcs", "Analytics", BackendKind::GoogleCloudStorage)
///         .with_project("analytics-prod");
///     let client = factory.create(&connection).await?;
///     println!("{} buckets", client.list_buckets().await?.len());
///     Ok(())
/// }
/// ```
pub struct ClientFactory {
    options: ClientOptions,
    builders: RwLock<HashMap<BackendKind, ClientBuilder>>,
}

impl ClientFactory {
    /// Factory with the built-in backends enabled at compile time
    pub fn new(options: ClientOptions) -> Self {
        let factory = Self::empty(options);
        factory.register_builtin();
        factory
    }

    /// Factory without any registered builder
    pub fn empty(options: ClientOptions) -> Self {
        Self {
            options,
            builders: RwLock::new(HashMap::new()),
        }
    }

    pub fn options(&self) -> &ClientOptions {
        &self.options
    }

    fn register_builtin(&self) {
        #[cfg(feature = "s3-native")]
        {
            let s3: ClientBuilder = Arc::new(|connection, options| {
                Box::pin(async move {
                    let client =
                        crate::protocol::s3::S3Client::new(connection, &options).await?;
                    Ok(Arc::new(client) as Arc<dyn StorageClient>)
                })
            });
            self.register(BackendKind::AwsS3, s3.clone());
            self.register(BackendKind::S3Compatible, s3);
        }

        #[cfg(feature = "gcs-native")]
        self.register(
            BackendKind::GoogleCloudStorage,
            Arc::new(|connection, options| {
                Box::pin(async move {
                    let client = crate::protocol::gcs::GcsClient::new(connection, &options)?;
                    Ok(Arc::new(client) as Arc<dyn StorageClient>)
                })
            }),
        );
    }

    /// Register or replace the builder for a backend kind
    pub fn register(&self, kind: BackendKind, builder: ClientBuilder) {
        let mut builders = self.builders.write().unwrap_or_else(|p| p.into_inner());
        builders.insert(kind, builder);
    }

    pub fn is_registered(&self, kind: BackendKind) -> bool {
        let builders = self.builders.read().unwrap_or_else(|p| p.into_inner());
        builders.contains_key(&kind)
    }

    /// Validate `connection` and build a client for it
    ///
    /// # Errors
    ///
    /// Returns [`ErrorKind::InvalidConfig`](super::ErrorKind::InvalidConfig) for an
    /// incomplete connection and [`ErrorKind::Unsupported`](super::ErrorKind::Unsupported)
    /// when no builder is registered for its kind.
    pub async fn create(&self, connection: &StorageConnection) -> BackendResult<Arc<dyn StorageClient>> {
        connection.validate()?;
        let builder = {
            let builders = self.builders.read().unwrap_or_else(|p| p.into_inner());
            builders.get(&connection.kind).cloned()
        };
        match builder {
            Some(builder) => {
                tracing::debug!("Creating {} client for connection '{}'", connection.kind, connection.id);
                builder(connection.clone(), self.options.clone()).await
            }
            None => Err(BackendError::unsupported(
                connection.kind.as_str(),
                "client creation (backend not compiled in)",
            )),
        }
    }
}

impl Default for ClientFactory {
    fn default() -> Self {
        Self::new(ClientOptions::default())
    }
}

/// Clients keyed by an arbitrary identifier, usually the connection id
#[derive(Default)]
pub struct ClientCache {
    clients: Mutex<HashMap<String, Arc<dyn StorageClient>>>,
}

impl ClientCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Cached client for `key`, building one with `factory` on a miss
    ///
    /// The lock is held while building, so concurrent callers for the same key
    /// share a single client.
    pub async fn get_or_create(
        &self,
        key: &str,
        connection: &StorageConnection,
        factory: &ClientFactory,
    ) -> BackendResult<Arc<dyn StorageClient>> {
        let mut clients = self.clients.lock().await;
        if let Some(client) = clients.get(key) {
            return Ok(client.clone());
        }
        let client = factory.create(connection).await?;
        clients.insert(key.to_string(), client.clone());
        Ok(client)
    }

    pub async fn insert(&self, key: impl Into<String>, client: Arc<dyn StorageClient>) {
        self.clients.lock().await.insert(key.into(), client);
    }

    pub async fn get(&self, key: &str) -> Option<Arc<dyn StorageClient>> {
        self.clients.lock().await.get(key).cloned()
    }

    /// Drop the client for `key`; the next request builds a fresh one
    pub async fn remove(&self, key: &str) -> bool {
        self.clients.lock().await.remove(key).is_some()
    }

    pub async fn len(&self) -> usize {
        self.clients.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}

static DEFAULT_FACTORY: Lazy<ClientFactory> = Lazy::new(ClientFactory::default);

static CLIENT_CACHE: Lazy<ClientCache> = Lazy::new(ClientCache::new);

/// Build a fresh client with the default factory
pub async fn create_client(connection: &StorageConnection) -> BackendResult<Arc<dyn StorageClient>> {
    DEFAULT_FACTORY.create(connection).await
}

/// Process-wide cached client for `key`
pub async fn create_cached_client(
    key: &str,
    connection: &StorageConnection,
) -> BackendResult<Arc<dyn StorageClient>> {
    CLIENT_CACHE
        .get_or_create(key, connection, &DEFAULT_FACTORY)
        .await
}

/// The cache behind [`create_cached_client`]
pub fn global_cache() -> &'static ClientCache {
    &CLIENT_CACHE
}
