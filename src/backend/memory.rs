//! In-memory storage backend
//!
//! Keeps buckets in ordered maps and follows S3 listing semantics (lexicographic
//! order, common prefixes as folders, start-after continuation tokens). Used by
//! the test suite and for dry runs; it also counts calls, tracks how many
//! mutating requests are in flight at once, and can be told to fail on a key.

use async_trait::async_trait;
use bytes::Bytes;
use chrono::{DateTime, Utc};
use std::collections::{BTreeMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;

use super::error::{BackendError, BackendResult, ErrorKind};
use super::types::{
    BackendKind, Bucket, ListPage, ObjectDetail, ObjectRef, RangeChunk, StorageConnection,
    UploadBody, UploadProgress,
};
use super::StorageClient;

const BACKEND: &str = "memory";

#[derive(Debug, Clone)]
struct StoredObject {
    data: Bytes,
    content_type: Option<String>,
    last_modified: DateTime<Utc>,
}

#[derive(Debug, Default)]
struct State {
    buckets: BTreeMap<String, (Bucket, BTreeMap<String, StoredObject>)>,
    failing_keys: HashSet<String>,
}

/// Call counters exposed for assertions
#[derive(Debug, Default)]
pub struct CallStats {
    pub list_pages: AtomicUsize,
    pub heads: AtomicUsize,
    pub range_gets: AtomicUsize,
    pub puts: AtomicUsize,
    pub copies: AtomicUsize,
    pub deletes: AtomicUsize,
    pub bulk_deletes: AtomicUsize,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
}

impl CallStats {
    /// Highest number of copy/delete requests observed running at once
    pub fn max_in_flight(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }
}

struct InFlight<'a>(&'a CallStats);

impl<'a> InFlight<'a> {
    fn enter(stats: &'a CallStats) -> Self {
        let now = stats.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        stats.max_in_flight.fetch_max(now, Ordering::SeqCst);
        Self(stats)
    }
}

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.0.in_flight.fetch_sub(1, Ordering::SeqCst);
    }
}

/// [`StorageClient`] backed by process memory
pub struct MemoryClient {
    connection: StorageConnection,
    state: Mutex<State>,
    page_size: usize,
    latency: Duration,
    bulk_delete_limit: Option<usize>,
    stats: CallStats,
}

impl Default for MemoryClient {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryClient {
    pub fn new() -> Self {
        let connection = StorageConnection::new("memory", "In-memory", BackendKind::S3Compatible)
            .with_endpoint("memory://local");
        Self::with_connection(connection)
    }

    pub fn with_connection(connection: StorageConnection) -> Self {
        Self {
            connection,
            state: Mutex::new(State::default()),
            page_size: 1000,
            latency: Duration::ZERO,
            bulk_delete_limit: None,
            stats: CallStats::default(),
        }
    }

    /// Maximum entries per listing page
    pub fn with_page_size(mut self, page_size: usize) -> Self {
        self.page_size = page_size.max(1);
        self
    }

    /// Artificial delay inside every copy and delete
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = latency;
        self
    }

    /// Enable `delete_many` with the given per-request key limit
    pub fn with_bulk_delete(mut self, limit: usize) -> Self {
        self.bulk_delete_limit = Some(limit.max(1));
        self
    }

    pub fn stats(&self) -> &CallStats {
        &self.stats
    }

    fn lock(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Create a bucket if it does not exist
    pub fn add_bucket(&self, name: &str) {
        self.lock()
            .buckets
            .entry(name.to_string())
            .or_insert_with(|| (Bucket::new(name), BTreeMap::new()));
    }

    /// Store `data` under `key`, creating the bucket on demand
    pub fn insert(&self, bucket: &str, key: &str, data: impl Into<Bytes>) {
        self.add_bucket(bucket);
        let object = StoredObject {
            data: data.into(),
            content_type: None,
            last_modified: Utc::now(),
        };
        if let Some((_, objects)) = self.lock().buckets.get_mut(bucket) {
            objects.insert(key.to_string(), object);
        }
    }

    /// All keys of a bucket in order
    pub fn keys(&self, bucket: &str) -> Vec<String> {
        self.lock()
            .buckets
            .get(bucket)
            .map(|(_, objects)| objects.keys().cloned().collect())
            .unwrap_or_default()
    }

    pub fn contents(&self, bucket: &str, key: &str) -> Option<Bytes> {
        self.lock()
            .buckets
            .get(bucket)
            .and_then(|(_, objects)| objects.get(key))
            .map(|o| o.data.clone())
    }

    /// Make every request touching `key` fail
    pub fn fail_on(&self, key: &str) {
        self.lock().failing_keys.insert(key.to_string());
    }

    fn check_failure(&self, key: &str) -> BackendResult<()> {
        if self.lock().failing_keys.contains(key) {
            return Err(BackendError::service(BACKEND, format!("injected failure for '{}'", key)));
        }
        Ok(())
    }

    async fn simulate_latency(&self) {
        if self.latency.is_zero() {
            tokio::task::yield_now().await;
        } else {
            tokio::time::sleep(self.latency).await;
        }
    }

    fn object_ref(&self, bucket: &str, key: &str, object: Option<&StoredObject>) -> ObjectRef {
        let entry = ObjectRef::from_key(&self.connection.id, bucket, key);
        match object {
            Some(o) => entry
                .with_size(o.data.len() as u64)
                .with_last_modified(Some(o.last_modified)),
            None => entry,
        }
    }

    fn stored(&self, target: &ObjectRef) -> BackendResult<StoredObject> {
        let state = self.lock();
        let (_, objects) = state
            .buckets
            .get(&target.bucket)
            .ok_or_else(|| BackendError::not_found(BACKEND, format!("bucket '{}'", target.bucket)))?;
        objects
            .get(&target.path)
            .cloned()
            .ok_or_else(|| BackendError::not_found(BACKEND, target))
    }

    fn store(&self, target: &ObjectRef, object: StoredObject) -> BackendResult<()> {
        let mut state = self.lock();
        let (_, objects) = state
            .buckets
            .get_mut(&target.bucket)
            .ok_or_else(|| BackendError::not_found(BACKEND, format!("bucket '{}'", target.bucket)))?;
        objects.insert(target.path.clone(), object);
        Ok(())
    }

    fn remove(&self, bucket: &str, key: &str) -> BackendResult<()> {
        let mut state = self.lock();
        let (_, objects) = state
            .buckets
            .get_mut(bucket)
            .ok_or_else(|| BackendError::not_found(BACKEND, format!("bucket '{}'", bucket)))?;
        objects.remove(key);
        Ok(())
    }
}

#[async_trait]
impl StorageClient for MemoryClient {
    fn backend_name(&self) -> &'static str {
        BACKEND
    }

    fn connection(&self) -> &StorageConnection {
        &self.connection
    }

    async fn list_buckets(&self) -> BackendResult<Vec<Bucket>> {
        Ok(self.lock().buckets.values().map(|(b, _)| b.clone()).collect())
    }

    async fn create_bucket(&self, bucket: &Bucket) -> BackendResult<()> {
        let mut state = self.lock();
        if state.buckets.contains_key(&bucket.name) {
            return Err(BackendError::new(
                ErrorKind::AlreadyExists,
                BACKEND,
                format!("bucket '{}' already exists", bucket.name),
            ));
        }
        state
            .buckets
            .insert(bucket.name.clone(), (bucket.clone(), BTreeMap::new()));
        Ok(())
    }

    async fn delete_bucket(&self, bucket: &str) -> BackendResult<()> {
        let mut state = self.lock();
        match state.buckets.get(bucket) {
            None => Err(BackendError::not_found(BACKEND, format!("bucket '{}'", bucket))),
            Some((_, objects)) if !objects.is_empty() => Err(BackendError::new(
                ErrorKind::AlreadyExists,
                BACKEND,
                format!("bucket '{}' is not empty", bucket),
            )),
            Some(_) => {
                state.buckets.remove(bucket);
                Ok(())
            }
        }
    }

    async fn list_page(
        &self,
        bucket: &str,
        prefix: &str,
        token: Option<&str>,
        delimiter: Option<&str>,
    ) -> BackendResult<ListPage> {
        self.stats.list_pages.fetch_add(1, Ordering::SeqCst);
        let delimiter = delimiter.unwrap_or(self.delimiter()).to_string();

        let rows: BTreeMap<String, Option<StoredObject>> = {
            let state = self.lock();
            let (_, objects) = state
                .buckets
                .get(bucket)
                .ok_or_else(|| BackendError::not_found(BACKEND, format!("bucket '{}'", bucket)))?;

            let mut rows = BTreeMap::new();
            for (key, object) in objects.range(prefix.to_string()..) {
                if !key.starts_with(prefix) {
                    break;
                }
                if key == prefix {
                    continue;
                }
                let rest = &key[prefix.len()..];
                match rest.find(delimiter.as_str()).filter(|_| !delimiter.is_empty()) {
                    Some(idx) => {
                        let folder = format!("{}{}", prefix, &rest[..idx + delimiter.len()]);
                        let stored = if folder == *key { Some(object.clone()) } else { None };
                        rows.entry(folder).or_insert(stored);
                    }
                    _ => {
                        rows.insert(key.clone(), Some(object.clone()));
                    }
                }
            }
            rows
        };

        let remaining: Vec<(String, Option<StoredObject>)> = rows
            .into_iter()
            .filter(|(key, _)| token.map_or(true, |t| key.as_str() > t))
            .collect();

        let has_more = remaining.len() > self.page_size;
        let entries: Vec<ObjectRef> = remaining
            .iter()
            .take(self.page_size)
            .map(|(key, object)| self.object_ref(bucket, key, object.as_ref()))
            .collect();
        let next_token = if has_more {
            entries.last().map(|e| e.path.clone())
        } else {
            None
        };

        Ok(ListPage { entries, next_token })
    }

    async fn head_object(&self, target: &ObjectRef) -> BackendResult<ObjectDetail> {
        self.stats.heads.fetch_add(1, Ordering::SeqCst);
        self.check_failure(&target.path)?;
        let object = self.stored(target)?;
        let mut detail = ObjectDetail::new(self.object_ref(&target.bucket, &target.path, Some(&object)));
        detail.content_type = object.content_type.clone();
        detail.accept_ranges = Some("bytes".to_string());
        Ok(detail)
    }

    async fn get_object(&self, target: &ObjectRef) -> BackendResult<Bytes> {
        self.check_failure(&target.path)?;
        Ok(self.stored(target)?.data)
    }

    async fn get_range(&self, target: &ObjectRef, start: u64, end: u64) -> BackendResult<RangeChunk> {
        self.stats.range_gets.fetch_add(1, Ordering::SeqCst);
        self.check_failure(&target.path)?;
        let data = self.stored(target)?.data;
        let total = data.len() as u64;
        if total == 0 {
            return Ok(RangeChunk::empty());
        }
        if start >= total || end < start {
            return Err(BackendError::invalid_input(
                BACKEND,
                format!("range {}-{} not satisfiable for {} bytes", start, end, total),
            ));
        }
        let end = end.min(total - 1);
        self.simulate_latency().await;
        Ok(RangeChunk {
            data: data.slice(start as usize..=end as usize),
            start,
            end,
            total,
        })
    }

    async fn put_object(
        &self,
        target: &ObjectRef,
        body: UploadBody,
        progress: Option<UploadProgress<'_>>,
    ) -> BackendResult<()> {
        self.stats.puts.fetch_add(1, Ordering::SeqCst);
        self.check_failure(&target.path)?;
        let data = match body {
            UploadBody::Bytes(bytes) => bytes,
            UploadBody::File(path) => Bytes::from(tokio::fs::read(&path).await?),
        };
        let len = data.len() as u64;
        self.simulate_latency().await;
        self.store(
            target,
            StoredObject {
                data,
                content_type: Some(
                    mime_guess::from_path(&target.path)
                        .first_or_octet_stream()
                        .essence_str()
                        .to_string(),
                ),
                last_modified: Utc::now(),
            },
        )?;
        if let Some(report) = progress {
            report(len, len);
        }
        Ok(())
    }

    async fn copy_single(&self, source: &ObjectRef, destination: &ObjectRef) -> BackendResult<()> {
        self.stats.copies.fetch_add(1, Ordering::SeqCst);
        let _guard = InFlight::enter(&self.stats);
        self.simulate_latency().await;
        self.check_failure(&source.path)?;
        self.check_failure(&destination.path)?;
        let mut object = self.stored(source)?;
        object.last_modified = Utc::now();
        self.store(destination, object)
    }

    async fn delete_single(&self, target: &ObjectRef) -> BackendResult<()> {
        self.stats.deletes.fetch_add(1, Ordering::SeqCst);
        let _guard = InFlight::enter(&self.stats);
        self.simulate_latency().await;
        self.check_failure(&target.path)?;
        self.remove(&target.bucket, &target.path)
    }

    async fn create_folder_marker(&self, target: &ObjectRef) -> BackendResult<()> {
        self.check_failure(&target.path)?;
        self.store(
            target,
            StoredObject {
                data: Bytes::new(),
                content_type: None,
                last_modified: Utc::now(),
            },
        )
    }

    fn bulk_delete_limit(&self) -> Option<usize> {
        self.bulk_delete_limit
    }

    async fn delete_many(&self, bucket: &str, keys: &[String]) -> BackendResult<()> {
        let limit = self
            .bulk_delete_limit
            .ok_or_else(|| BackendError::unsupported(BACKEND, "delete_many"))?;
        if keys.len() > limit {
            return Err(BackendError::invalid_input(
                BACKEND,
                format!("{} keys exceed the bulk delete limit of {}", keys.len(), limit),
            ));
        }
        self.stats.bulk_deletes.fetch_add(1, Ordering::SeqCst);
        let _guard = InFlight::enter(&self.stats);
        self.simulate_latency().await;
        for key in keys {
            self.check_failure(key)?;
            self.remove(bucket, key)?;
        }
        Ok(())
    }
}
