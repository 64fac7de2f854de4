//! Google Cloud Storage client

use super::json::{
    encode_name, error_message, BucketList, BucketResource, ObjectList, ObjectResource,
    RewriteResponse, API_BASE, UPLOAD_BASE,
};
use async_trait::async_trait;
use bytes::{Bytes, BytesMut};
use object_store::gcp::{GoogleCloudStorage, GoogleCloudStorageBuilder};
use object_store::path::Path as ObjectPath;
use object_store::{
    Attribute, Attributes, CredentialProvider, GetOptions, GetRange, ObjectStore, PutMultipartOpts,
    PutOptions, PutPayload, WriteMultipart,
};
use reqwest::{Method, RequestBuilder, Response};
use secrecy::ExposeSecret;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use tokio::io::AsyncReadExt;

use crate::backend::registry::ClientOptions;
use crate::backend::{
    BackendError, BackendResult, Bucket, ErrorKind, ListPage, ObjectDetail, ObjectRef, RangeChunk,
    StorageClient, StorageConnection, UploadBody, UploadProgress,
};
use crate::core::preview::resolve_mime;

const BACKEND: &str = "gcs";

/// Location used when a bucket is created without one
pub const DEFAULT_LOCATION: &str = "US";

/// Parts uploaded concurrently by a multipart upload
const MULTIPART_CONCURRENCY: usize = 4;

fn store_error(err: object_store::Error, what: impl std::fmt::Display) -> BackendError {
    let kind = match &err {
        object_store::Error::NotFound { .. } => ErrorKind::NotFound,
        object_store::Error::AlreadyExists { .. } => ErrorKind::AlreadyExists,
        object_store::Error::NotImplemented | object_store::Error::NotSupported { .. } => {
            ErrorKind::Unsupported
        }
        object_store::Error::InvalidPath { .. } => ErrorKind::InvalidInput,
        _ => ErrorKind::Service,
    };
    BackendError::new(kind, BACKEND, format!("{}: {}", what, err))
}

fn http_error(err: reqwest::Error, what: impl std::fmt::Display) -> BackendError {
    let kind = if err.is_timeout() {
        ErrorKind::Timeout
    } else if let Some(status) = err.status() {
        ErrorKind::from_status(status.as_u16())
    } else {
        ErrorKind::Network
    };
    BackendError::new(kind, BACKEND, format!("{}: {}", what, err))
}

fn io_error(err: std::io::Error, what: impl std::fmt::Display) -> BackendError {
    BackendError::from(err).context(what)
}

/// Client for one Google Cloud project
///
/// Object data moves through `object_store`; listings, metadata, folder
/// markers, copies and buckets go through the JSON API with the same
/// credentials.
pub struct GcsClient {
    connection: StorageConnection,
    http: reqwest::Client,
    options: ClientOptions,
    stores: Mutex<HashMap<String, Arc<GoogleCloudStorage>>>,
}

impl GcsClient {
    /// Create a client for `connection`
    ///
    /// The service account key may be inline JSON or a path to a key file. Without
    /// one, credentials come from the environment (`GOOGLE_APPLICATION_CREDENTIALS`,
    /// `GOOGLE_SERVICE_ACCOUNT`, or the metadata server).
    pub fn new(connection: StorageConnection, options: &ClientOptions) -> BackendResult<Self> {
        connection.validate()?;
        let http = reqwest::Client::builder()
            .timeout(options.request_timeout)
            .build()
            .map_err(|e| BackendError::invalid_config(BACKEND, format!("Failed to create HTTP client: {}", e)))?;

        let client = Self {
            connection,
            http,
            options: options.clone(),
            stores: Mutex::new(HashMap::new()),
        };
        // Fail early on unusable credentials
        client.store(client.project_id())?;
        Ok(client)
    }

    fn project_id(&self) -> &str {
        self.connection.project_id.as_deref().unwrap_or_default()
    }

    /// Store for `bucket`, built on first use
    fn store(&self, bucket: &str) -> BackendResult<Arc<GoogleCloudStorage>> {
        let mut stores = self.stores.lock().unwrap_or_else(|p| p.into_inner());
        if let Some(store) = stores.get(bucket) {
            return Ok(store.clone());
        }

        let mut builder = GoogleCloudStorageBuilder::from_env().with_bucket_name(bucket);
        if let Some(key) = &self.connection.service_account_key {
            let key = key.expose_secret();
            builder = if key.trim_start().starts_with('{') {
                builder.with_service_account_key(key)
            } else {
                builder.with_service_account_path(key)
            };
        }
        let store = Arc::new(builder.build().map_err(|e| {
            BackendError::invalid_config(BACKEND, format!("Failed to create GCS client: {}", e))
        })?);
        stores.insert(bucket.to_string(), store.clone());
        Ok(store)
    }

    async fn bearer(&self) -> BackendResult<String> {
        let store = self.store(self.project_id())?;
        let credential = store
            .credentials()
            .get_credential()
            .await
            .map_err(|e| {
                BackendError::new(ErrorKind::Authentication, BACKEND, format!("Failed to obtain token: {}", e))
            })?;
        Ok(credential.bearer.clone())
    }

    async fn request(&self, method: Method, url: String) -> BackendResult<RequestBuilder> {
        let token = self.bearer().await?;
        Ok(self.http.request(method, url).bearer_auth(token))
    }

    /// Send a request and turn non-success statuses into errors
    async fn send(&self, request: RequestBuilder, what: impl std::fmt::Display) -> BackendResult<Response> {
        let response = request.send().await.map_err(|e| http_error(e, &what))?;
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        let body = response.text().await.unwrap_or_default();
        Err(BackendError::new(
            ErrorKind::from_status(status.as_u16()),
            BACKEND,
            format!("{}: HTTP {}: {}", what, status.as_u16(), error_message(&body)),
        ))
    }

    fn object_url(bucket: &str, key: &str) -> String {
        format!("{}/b/{}/o/{}", API_BASE, encode_name(bucket), encode_name(key))
    }

    async fn object_resource(&self, target: &ObjectRef) -> BackendResult<ObjectResource> {
        let request = self
            .request(Method::GET, Self::object_url(&target.bucket, &target.path))
            .await?;
        self.send(request, format!("Head {}", target))
            .await?
            .json::<ObjectResource>()
            .await
            .map_err(|e| http_error(e, format!("Decode metadata of {}", target)))
    }

    /// Upload through the JSON media endpoint, keeping the key verbatim
    async fn upload_media(&self, target: &ObjectRef, content_type: &str, body: Bytes) -> BackendResult<()> {
        let url = format!("{}/b/{}/o", UPLOAD_BASE, encode_name(&target.bucket));
        let request = self
            .request(Method::POST, url)
            .await?
            .query(&[("uploadType", "media"), ("name", target.path.as_str())])
            .header(reqwest::header::CONTENT_TYPE, content_type)
            .body(body);
        self.send(request, format!("Upload {}", target)).await?;
        Ok(())
    }

    async fn upload_multipart(
        &self,
        store: &GoogleCloudStorage,
        target: &ObjectRef,
        attributes: Attributes,
        body: UploadBody,
        total: u64,
        mut progress: Option<UploadProgress<'_>>,
    ) -> BackendResult<()> {
        let location = ObjectPath::from(target.path.as_str());
        let upload = store
            .put_multipart_opts(
                &location,
                PutMultipartOpts {
                    attributes,
                    ..Default::default()
                },
            )
            .await
            .map_err(|e| store_error(e, format!("Start upload of {}", target)))?;
        let part_size = self.options.part_size;
        let mut writer = WriteMultipart::new_with_chunk_size(upload, part_size);

        let written: BackendResult<()> = async {
            let mut loaded = 0u64;
            match body {
                UploadBody::Bytes(bytes) => {
                    for part in bytes.chunks(part_size) {
                        writer
                            .wait_for_capacity(MULTIPART_CONCURRENCY)
                            .await
                            .map_err(|e| store_error(e, format!("Upload {}", target)))?;
                        writer.write(part);
                        loaded += part.len() as u64;
                        if let Some(report) = progress.as_mut() {
                            report(loaded, total);
                        }
                    }
                }
                UploadBody::File(path) => {
                    let mut file = tokio::fs::File::open(&path)
                        .await
                        .map_err(|e| io_error(e, path.display()))?;
                    let mut buffer = BytesMut::zeroed(part_size);
                    loop {
                        let read = file
                            .read(&mut buffer)
                            .await
                            .map_err(|e| io_error(e, path.display()))?;
                        if read == 0 {
                            break;
                        }
                        writer
                            .wait_for_capacity(MULTIPART_CONCURRENCY)
                            .await
                            .map_err(|e| store_error(e, format!("Upload {}", target)))?;
                        writer.write(&buffer[..read]);
                        loaded += read as u64;
                        if let Some(report) = progress.as_mut() {
                            report(loaded, total);
                        }
                    }
                }
            }
            Ok(())
        }
        .await;

        match written {
            Ok(()) => {
                writer
                    .finish()
                    .await
                    .map_err(|e| store_error(e, format!("Complete upload of {}", target)))?;
                Ok(())
            }
            Err(e) => {
                if let Err(abort) = writer.abort().await {
                    tracing::warn!("Failed to abort upload of {}: {}", target, abort);
                }
                Err(e)
            }
        }
    }
}

#[async_trait]
impl StorageClient for GcsClient {
    fn backend_name(&self) -> &'static str {
        BACKEND
    }

    fn connection(&self) -> &StorageConnection {
        &self.connection
    }

    async fn list_buckets(&self) -> BackendResult<Vec<Bucket>> {
        let mut buckets = Vec::new();
        let mut token: Option<String> = None;
        loop {
            let mut request = self
                .request(Method::GET, format!("{}/b", API_BASE))
                .await?
                .query(&[("project", self.project_id())]);
            if let Some(token) = &token {
                request = request.query(&[("pageToken", token.as_str())]);
            }
            let page: BucketList = self
                .send(request, "List buckets")
                .await?
                .json()
                .await
                .map_err(|e| http_error(e, "Decode bucket list"))?;
            buckets.extend(page.items.into_iter().map(Bucket::from));
            match page.next_page_token {
                Some(next) if !next.is_empty() => token = Some(next),
                _ => break,
            }
        }
        Ok(buckets)
    }

    async fn create_bucket(&self, bucket: &Bucket) -> BackendResult<()> {
        let resource = BucketResource {
            name: bucket.name.clone(),
            location: Some(
                bucket
                    .region
                    .clone()
                    .unwrap_or_else(|| DEFAULT_LOCATION.to_string()),
            ),
            time_created: None,
            storage_class: bucket.storage_class.clone(),
        };
        let request = self
            .request(Method::POST, format!("{}/b", API_BASE))
            .await?
            .query(&[("project", self.project_id())])
            .json(&resource);
        self.send(request, format!("Create bucket {}", bucket.name)).await?;
        tracing::info!("Created bucket {}", bucket.name);
        Ok(())
    }

    async fn delete_bucket(&self, bucket: &str) -> BackendResult<()> {
        let request = self
            .request(Method::DELETE, format!("{}/b/{}", API_BASE, encode_name(bucket)))
            .await?;
        self.send(request, format!("Delete bucket {}", bucket)).await?;
        self.stores
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .remove(bucket);
        tracing::info!("Deleted bucket {}", bucket);
        Ok(())
    }

    async fn list_page(
        &self,
        bucket: &str,
        prefix: &str,
        token: Option<&str>,
        delimiter: Option<&str>,
    ) -> BackendResult<ListPage> {
        let delimiter = delimiter.unwrap_or(self.delimiter());
        let mut query: Vec<(&str, &str)> = vec![("prefix", prefix)];
        if !delimiter.is_empty() {
            query.push(("delimiter", delimiter));
            query.push(("includeTrailingDelimiter", "true"));
        }
        if let Some(token) = token {
            query.push(("pageToken", token));
        }

        let request = self
            .request(Method::GET, format!("{}/b/{}/o", API_BASE, encode_name(bucket)))
            .await?
            .query(&query);
        let list: ObjectList = self
            .send(request, format!("List {}/{}", bucket, prefix))
            .await?
            .json()
            .await
            .map_err(|e| http_error(e, format!("Decode listing of {}/{}", bucket, prefix)))?;

        let next_token = list.next_page_token.clone().filter(|t| !t.is_empty());
        Ok(ListPage {
            entries: list.into_entries(&self.connection.id, bucket, prefix),
            next_token,
        })
    }

    async fn head_object(&self, target: &ObjectRef) -> BackendResult<ObjectDetail> {
        Ok(self.object_resource(target).await?.into_detail(target))
    }

    async fn get_object(&self, target: &ObjectRef) -> BackendResult<Bytes> {
        let request = self
            .request(Method::GET, Self::object_url(&target.bucket, &target.path))
            .await?
            .query(&[("alt", "media")]);
        self.send(request, format!("Get {}", target))
            .await?
            .bytes()
            .await
            .map_err(|e| http_error(e, format!("Read body of {}", target)))
    }

    async fn get_range(&self, target: &ObjectRef, start: u64, end: u64) -> BackendResult<RangeChunk> {
        let store = self.store(&target.bucket)?;
        let location = ObjectPath::from(target.path.as_str());
        let options = GetOptions {
            range: Some(GetRange::Bounded(start as usize..end as usize + 1)),
            ..Default::default()
        };

        let result = match store.get_opts(&location, options).await {
            Ok(result) => result,
            Err(e) => {
                // Zero-byte objects reject every range
                if start == 0 && !matches!(e, object_store::Error::NotFound { .. }) {
                    let resource = self.object_resource(target).await?;
                    if resource.size() == 0 {
                        return Ok(RangeChunk::empty());
                    }
                }
                return Err(store_error(e, format!("Range {}-{} of {}", start, end, target)));
            }
        };

        let served = result.range.clone();
        let total = result.meta.size as u64;
        let data = result
            .bytes()
            .await
            .map_err(|e| store_error(e, format!("Read range of {}", target)))?;
        if total == 0 || data.is_empty() {
            return Ok(RangeChunk::empty());
        }
        Ok(RangeChunk {
            data,
            start: served.start as u64,
            end: served.end as u64 - 1,
            total,
        })
    }

    async fn put_object(
        &self,
        target: &ObjectRef,
        body: UploadBody,
        mut progress: Option<UploadProgress<'_>>,
    ) -> BackendResult<()> {
        let total = match &body {
            UploadBody::File(path) => tokio::fs::metadata(path)
                .await
                .map_err(|e| io_error(e, path.display()))?
                .len(),
            UploadBody::Bytes(bytes) => bytes.len() as u64,
        };
        let content_type = resolve_mime(None, &target.path);
        let store = self.store(&target.bucket)?;
        let mut attributes = Attributes::new();
        attributes.insert(Attribute::ContentType, content_type.into());

        if total > self.options.multipart_threshold {
            tracing::debug!("Multipart upload of {} ({} bytes)", target, total);
            return self
                .upload_multipart(&store, target, attributes, body, total, progress)
                .await;
        }

        let bytes = match body {
            UploadBody::Bytes(bytes) => bytes,
            UploadBody::File(path) => Bytes::from(
                tokio::fs::read(&path)
                    .await
                    .map_err(|e| io_error(e, path.display()))?,
            ),
        };
        store
            .put_opts(
                &ObjectPath::from(target.path.as_str()),
                PutPayload::from(bytes),
                PutOptions {
                    attributes,
                    ..Default::default()
                },
            )
            .await
            .map_err(|e| store_error(e, format!("Upload {}", target)))?;

        if let Some(report) = progress.as_mut() {
            report(total, total);
        }
        Ok(())
    }

    async fn copy_single(&self, source: &ObjectRef, destination: &ObjectRef) -> BackendResult<()> {
        let url = format!(
            "{}/rewriteTo/b/{}/o/{}",
            Self::object_url(&source.bucket, &source.path),
            encode_name(&destination.bucket),
            encode_name(&destination.path)
        );
        let what = format!("Copy {} to {}", source, destination);

        // Large or cross-location copies take several rewrite calls
        let mut token: Option<String> = None;
        loop {
            let mut request = self.request(Method::POST, url.clone()).await?;
            if let Some(token) = &token {
                request = request.query(&[("rewriteToken", token.as_str())]);
            }
            let response: RewriteResponse = self
                .send(request.header(reqwest::header::CONTENT_LENGTH, 0), &what)
                .await?
                .json()
                .await
                .map_err(|e| http_error(e, &what))?;
            if response.done {
                return Ok(());
            }
            match response.rewrite_token {
                Some(next) => token = Some(next),
                None => {
                    return Err(BackendError::service(
                        BACKEND,
                        format!("{}: rewrite incomplete without a token", what),
                    ))
                }
            }
        }
    }

    async fn delete_single(&self, target: &ObjectRef) -> BackendResult<()> {
        let request = self
            .request(Method::DELETE, Self::object_url(&target.bucket, &target.path))
            .await?;
        self.send(request, format!("Delete {}", target)).await?;
        Ok(())
    }

    async fn create_folder_marker(&self, target: &ObjectRef) -> BackendResult<()> {
        self.upload_media(target, "application/x-directory", Bytes::new())
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_object_url_encodes_key() {
        assert_eq!(
            GcsClient::object_url("my-bucket", "docs/q1 report.pdf"),
            "https://storage.googleapis.com/storage/v1/b/my-bucket/o/docs%2Fq1%20report.pdf"
        );
    }

    #[test]
    fn test_store_errors_map_to_kinds() {
        let err = store_error(
            object_store::Error::NotFound {
                path: "a".to_string(),
                source: "missing".into(),
            },
            "Range 0-9 of b/a",
        );
        assert!(err.is_not_found());
        assert!(err.cause.starts_with("Range 0-9 of b/a"));

        let err = store_error(object_store::Error::NotImplemented, "Copy");
        assert_eq!(err.kind, ErrorKind::Unsupported);
    }

    #[test]
    fn test_missing_project_is_rejected() {
        let conn = StorageConnection::new("g", "GCS", crate::backend::BackendKind::GoogleCloudStorage);
        let err = GcsClient::new(conn, &ClientOptions::default()).err().unwrap();
        assert_eq!(err.kind, ErrorKind::InvalidConfig);
    }
}
