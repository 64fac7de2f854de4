//! S3 client implementation

use super::error::{S3Error, S3Result};
use super::batch::MAX_DELETE_BATCH;
use async_trait::async_trait;
use aws_config::meta::region::RegionProviderChain;
use aws_config::BehaviorVersion;
use aws_sdk_s3::config::{Credentials, Region};
use aws_sdk_s3::primitives::{ByteStream, DateTime as AwsDateTime};
use aws_sdk_s3::types::{BucketLocationConstraint, CreateBucketConfiguration};
use aws_sdk_s3::Client as AwsS3Client;
use bytes::Bytes;
use chrono::{DateTime, Utc};
use percent_encoding::{utf8_percent_encode, AsciiSet, NON_ALPHANUMERIC};
use secrecy::ExposeSecret;
use std::time::Duration;

use crate::backend::registry::ClientOptions;
use crate::backend::{
    AccessControl, BackendKind, BackendResult, Bucket, Grant, ListPage, ObjectDetail, ObjectRef,
    ObjectTag, RangeChunk, StorageClient, StorageConnection, UploadBody, UploadProgress,
};
use crate::core::preview::resolve_mime;

/// Characters escaped in copy sources and object URLs; `/` separates key segments
const KEY_ENCODE_SET: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'/')
    .remove(b'-')
    .remove(b'_')
    .remove(b'.')
    .remove(b'~');

/// Region S3 treats as the default location
const DEFAULT_REGION: &str = "us-east-1";

/// S3 client for AWS S3 and S3-compatible storage
#[derive(Clone)]
pub struct S3Client {
    pub(super) client: AwsS3Client,
    pub(super) connection: StorageConnection,
    /// Uploads larger than this go through multipart
    pub(super) multipart_threshold: u64,
    pub(super) part_size: usize,
}

impl S3Client {
    /// Create a client for `connection`
    ///
    /// # Example
    ///
    /// ```no_run
    /// use orbit_cloud::backend::{BackendKind, ClientOptions, StorageConnection};
    /// use orbit_cloud::protocol::s3::S3Client;
    ///
    /// #[tokio::main]
    /// async fn main() -> Result<(), Box<dyn std::error::Error>> {
    ///     let connection = StorageConnection::new("minio", "Local MinIO", BackendKind::S3Compatible)
    ///         .with_endpoint("http://localhost:9000")
    ///         .with_credentials("minioadmin", "minioadmin");
    ///     let client = S3Client::new(connection, &ClientOptions::default()).await?;
    ///     Ok(())
    /// }
    /// ```
    pub async fn new(connection: StorageConnection, options: &ClientOptions) -> S3Result<Self> {
        connection
            .validate()
            .map_err(|e| S3Error::InvalidConfig(e.cause))?;

        let client = Self::build_aws_client(&connection, options.request_timeout).await?;

        Ok(Self {
            client,
            connection,
            multipart_threshold: options.multipart_threshold,
            part_size: options.part_size,
        })
    }

    /// Build the AWS SDK S3 client from a connection
    async fn build_aws_client(connection: &StorageConnection, timeout: Duration) -> S3Result<AwsS3Client> {
        let mut loader = aws_config::defaults(BehaviorVersion::latest());

        // S3-compatible services ignore the region but the signer needs one
        let region = connection
            .region
            .clone()
            .unwrap_or_else(|| DEFAULT_REGION.to_string());
        loader = loader.region(RegionProviderChain::first_try(Region::new(region)));

        if let (Some(access_key), Some(secret_key)) =
            (&connection.access_key_id, &connection.secret_access_key)
        {
            let token = connection
                .session_token
                .as_ref()
                .map(|t| t.expose_secret().to_string());
            let credentials = Credentials::new(
                access_key,
                secret_key.expose_secret(),
                token,
                None,
                "orbit-cloud",
            );
            loader = loader.credentials_provider(credentials);
        }

        let aws_config = loader.load().await;
        let mut builder = aws_sdk_s3::config::Builder::from(&aws_config);

        if let Some(endpoint) = connection.endpoint.as_deref().filter(|e| !e.is_empty()) {
            builder = builder.endpoint_url(endpoint);
        }

        // Required for MinIO, LocalStack and most self-hosted endpoints
        if connection.force_path_style || connection.kind == BackendKind::S3Compatible {
            builder = builder.force_path_style(true);
        }

        let timeout_config = aws_sdk_s3::config::timeout::TimeoutConfig::builder()
            .operation_timeout(timeout)
            .build();
        builder = builder.timeout_config(timeout_config);

        Ok(AwsS3Client::from_conf(builder.build()))
    }

    /// Get a reference to the underlying AWS S3 client
    pub fn aws_client(&self) -> &AwsS3Client {
        &self.client
    }

    /// Public URL of an object
    pub fn object_url(&self, bucket: &str, key: &str) -> String {
        object_url(&self.connection, bucket, key)
    }

    fn object_ref(&self, bucket: &str, key: &str) -> ObjectRef {
        ObjectRef::from_key(self.connection.id.clone(), bucket, key)
    }

    async fn access_control(&self, target: &ObjectRef) -> S3Result<AccessControl> {
        let acl = self
            .client
            .get_object_acl()
            .bucket(&target.bucket)
            .key(&target.path)
            .send()
            .await?;

        let owner = acl
            .owner()
            .and_then(|o| o.display_name().or(o.id()))
            .map(str::to_string);
        let grants = acl
            .grants()
            .iter()
            .map(|grant| {
                let grantee = grant
                    .grantee()
                    .and_then(|g| {
                        g.display_name()
                            .or(g.email_address())
                            .or(g.uri())
                            .or(g.id())
                    })
                    .unwrap_or("unknown")
                    .to_string();
                Grant {
                    grantee,
                    permission: grant
                        .permission()
                        .map(|p| p.as_str().to_string())
                        .unwrap_or_default(),
                }
            })
            .collect();

        Ok(AccessControl { owner, grants })
    }

    async fn tags(&self, target: &ObjectRef) -> S3Result<Vec<ObjectTag>> {
        let response = self
            .client
            .get_object_tagging()
            .bucket(&target.bucket)
            .key(&target.path)
            .send()
            .await?;

        Ok(response
            .tag_set()
            .iter()
            .map(|tag| ObjectTag {
                key: tag.key().to_string(),
                value: tag.value().to_string(),
            })
            .collect())
    }
}

/// Public URL of `key` in `bucket` for a connection
pub fn object_url(connection: &StorageConnection, bucket: &str, key: &str) -> String {
    let key = utf8_percent_encode(key, KEY_ENCODE_SET);
    if let Some(endpoint) = connection.endpoint.as_deref().filter(|e| !e.is_empty()) {
        let endpoint = endpoint.trim_end_matches('/');
        let path_style = connection.force_path_style || connection.kind == BackendKind::S3Compatible;
        return match url::Url::parse(endpoint) {
            Ok(parsed) if !path_style => match parsed.host_str() {
                Some(host) => {
                    let port = parsed.port().map(|p| format!(":{}", p)).unwrap_or_default();
                    format!("{}://{}.{}{}/{}", parsed.scheme(), bucket, host, port, key)
                }
                None => format!("{}/{}/{}", endpoint, bucket, key),
            },
            _ => format!("{}/{}/{}", endpoint, bucket, key),
        };
    }
    match connection.region.as_deref() {
        Some(region) if region != DEFAULT_REGION && !region.is_empty() => {
            format!("https://{}.s3-{}.amazonaws.com/{}", bucket, region, key)
        }
        _ => format!("https://{}.s3.amazonaws.com/{}", bucket, key),
    }
}

fn to_chrono(value: Option<&AwsDateTime>) -> Option<DateTime<Utc>> {
    value.and_then(|t| DateTime::from_timestamp(t.secs(), t.subsec_nanos()))
}

#[async_trait]
impl StorageClient for S3Client {
    fn backend_name(&self) -> &'static str {
        "s3"
    }

    fn connection(&self) -> &StorageConnection {
        &self.connection
    }

    async fn list_buckets(&self) -> BackendResult<Vec<Bucket>> {
        let response = self.client.list_buckets().send().await.map_err(S3Error::from)?;

        Ok(response
            .buckets()
            .iter()
            .filter_map(|b| {
                let name = b.name()?;
                Some(Bucket {
                    name: name.to_string(),
                    region: b.bucket_region().map(str::to_string),
                    created: to_chrono(b.creation_date()),
                    storage_class: None,
                })
            })
            .collect())
    }

    async fn create_bucket(&self, bucket: &Bucket) -> BackendResult<()> {
        let region = bucket.region.as_deref().or(self.connection.region.as_deref());
        let mut request = self.client.create_bucket().bucket(&bucket.name);
        if self.connection.kind == BackendKind::AwsS3 {
            if let Some(region) = region.filter(|r| *r != DEFAULT_REGION) {
                request = request.create_bucket_configuration(
                    CreateBucketConfiguration::builder()
                        .location_constraint(BucketLocationConstraint::from(region))
                        .build(),
                );
            }
        }
        request
            .send()
            .await
            .map_err(|e| S3Error::from(e).context(format!("Create bucket {}", bucket.name)))?;
        tracing::info!("Created bucket {}", bucket.name);
        Ok(())
    }

    async fn delete_bucket(&self, bucket: &str) -> BackendResult<()> {
        self.client
            .delete_bucket()
            .bucket(bucket)
            .send()
            .await
            .map_err(|e| S3Error::from(e).context(format!("Delete bucket {}", bucket)))?;
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
        let mut request = self.client.list_objects_v2().bucket(bucket);
        if !prefix.is_empty() {
            request = request.prefix(prefix);
        }
        if !delimiter.is_empty() {
            request = request.delimiter(delimiter);
        }
        if let Some(token) = token {
            request = request.continuation_token(token);
        }

        let response = request
            .send()
            .await
            .map_err(|e| S3Error::from(e).context(format!("List {}/{}", bucket, prefix)))?;

        let mut entries: Vec<ObjectRef> = response
            .contents()
            .iter()
            .filter_map(|object| {
                let key = object.key()?;
                if key == prefix {
                    return None;
                }
                Some(
                    self.object_ref(bucket, key)
                        .with_size(object.size().unwrap_or(0).max(0) as u64)
                        .with_last_modified(to_chrono(object.last_modified())),
                )
            })
            .collect();

        for common in response.common_prefixes() {
            if let Some(folder) = common.prefix().filter(|p| *p != prefix) {
                if !entries.iter().any(|e| e.path == folder) {
                    entries.push(ObjectRef::folder(self.connection.id.clone(), bucket, folder));
                }
            }
        }

        Ok(ListPage {
            entries,
            next_token: response
                .next_continuation_token()
                .filter(|t| !t.is_empty())
                .map(str::to_string),
        })
    }

    async fn head_object(&self, target: &ObjectRef) -> BackendResult<ObjectDetail> {
        let response = self
            .client
            .head_object()
            .bucket(&target.bucket)
            .key(&target.path)
            .send()
            .await
            .map_err(|e| S3Error::from(e).context(format!("Head {}", target)))?;

        let object = target
            .with_path(target.path.clone())
            .with_size(response.content_length().unwrap_or(0).max(0) as u64)
            .with_last_modified(to_chrono(response.last_modified()));

        let mut detail = ObjectDetail::new(object);
        detail.content_type = response.content_type().map(str::to_string);
        detail.e_tag = response.e_tag().map(str::to_string);
        detail.version_id = response.version_id().map(str::to_string);
        detail.server_side_encryption = response
            .server_side_encryption()
            .map(|s| s.as_str().to_string());
        detail.accept_ranges = response.accept_ranges().map(str::to_string);
        if let Some(metadata) = response.metadata() {
            detail.metadata = metadata.iter().map(|(k, v)| (k.clone(), v.clone())).collect();
        }
        detail.url = Some(self.object_url(&target.bucket, &target.path));
        Ok(detail)
    }

    async fn object_detail(&self, target: &ObjectRef) -> BackendResult<ObjectDetail> {
        let mut detail = self.head_object(target).await?;

        // ACL and tagging are AWS features; compatible services often reject them
        if self.connection.kind == BackendKind::AwsS3 {
            match self.access_control(target).await {
                Ok(acl) => detail.permissions = Some(acl),
                Err(e) => tracing::debug!("No ACL for {}: {}", target, e),
            }
            match self.tags(target).await {
                Ok(tags) => detail.tags = tags,
                Err(e) => tracing::debug!("No tags for {}: {}", target, e),
            }
        }
        Ok(detail)
    }

    async fn get_object(&self, target: &ObjectRef) -> BackendResult<Bytes> {
        let response = self
            .client
            .get_object()
            .bucket(&target.bucket)
            .key(&target.path)
            .send()
            .await
            .map_err(|e| S3Error::from(e).context(format!("Get {}", target)))?;

        let body = response
            .body
            .collect()
            .await
            .map_err(|e| S3Error::Network(format!("Failed to read body of {}: {}", target, e)))?;
        Ok(body.into_bytes())
    }

    async fn get_range(&self, target: &ObjectRef, start: u64, end: u64) -> BackendResult<RangeChunk> {
        Ok(self
            .download_range(&target.bucket, &target.path, start, end)
            .await
            .map_err(|e| e.context(format!("Range {}-{} of {}", start, end, target)))?)
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
                .map_err(|e| S3Error::from(e).context(format!("Stat {}", path.display())))?
                .len(),
            UploadBody::Bytes(bytes) => bytes.len() as u64,
        };
        let content_type = resolve_mime(None, &target.path);

        if total > self.multipart_threshold {
            tracing::debug!("Multipart upload of {} ({} bytes)", target, total);
            self.upload_multipart(
                &target.bucket,
                &target.path,
                Some(content_type),
                body,
                total,
                progress,
            )
            .await
            .map_err(|e| e.context(format!("Upload {}", target)))?;
            return Ok(());
        }

        let stream = match body {
            UploadBody::File(path) => ByteStream::from_path(&path)
                .await
                .map_err(|e| S3Error::Io(format!("Failed to read {}: {}", path.display(), e)))?,
            UploadBody::Bytes(bytes) => ByteStream::from(bytes),
        };

        self.client
            .put_object()
            .bucket(&target.bucket)
            .key(&target.path)
            .content_type(content_type)
            .body(stream)
            .send()
            .await
            .map_err(|e| S3Error::from(e).context(format!("Upload {}", target)))?;

        if let Some(report) = progress.as_mut() {
            report(total, total);
        }
        Ok(())
    }

    async fn copy_single(&self, source: &ObjectRef, destination: &ObjectRef) -> BackendResult<()> {
        let copy_source = format!(
            "{}/{}",
            source.bucket,
            utf8_percent_encode(&source.path, KEY_ENCODE_SET)
        );
        self.client
            .copy_object()
            .copy_source(copy_source)
            .bucket(&destination.bucket)
            .key(&destination.path)
            .send()
            .await
            .map_err(|e| S3Error::from(e).context(format!("Copy {} to {}", source, destination)))?;
        Ok(())
    }

    async fn delete_single(&self, target: &ObjectRef) -> BackendResult<()> {
        self.client
            .delete_object()
            .bucket(&target.bucket)
            .key(&target.path)
            .send()
            .await
            .map_err(|e| S3Error::from(e).context(format!("Delete {}", target)))?;
        Ok(())
    }

    async fn create_folder_marker(&self, target: &ObjectRef) -> BackendResult<()> {
        self.client
            .put_object()
            .bucket(&target.bucket)
            .key(&target.path)
            .body(ByteStream::from_static(b""))
            .send()
            .await
            .map_err(|e| S3Error::from(e).context(format!("Create folder {}", target)))?;
        Ok(())
    }

    fn bulk_delete_limit(&self) -> Option<usize> {
        Some(MAX_DELETE_BATCH)
    }

    async fn delete_many(&self, bucket: &str, keys: &[String]) -> BackendResult<()> {
        self.batch_delete(bucket, keys).await?.into_result()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_aws_url_uses_regional_host() {
        let conn = StorageConnection::new("c", "C", BackendKind::AwsS3).with_region("eu-west-1");
        assert_eq!(
            object_url(&conn, "photos", "2024/beach day.jpg"),
            "https://photos.s3-eu-west-1.amazonaws.com/2024/beach%20day.jpg"
        );
    }

    #[test]
    fn test_aws_url_in_default_region() {
        let conn = StorageConnection::new("c", "C", BackendKind::AwsS3).with_region("us-east-1");
        assert_eq!(object_url(&conn, "b", "k.txt"), "https://b.s3.amazonaws.com/k.txt");
    }

    #[test]
    fn test_compatible_url_is_path_style() {
        let conn = StorageConnection::new("c", "C", BackendKind::S3Compatible)
            .with_endpoint("http://localhost:9000/");
        assert_eq!(object_url(&conn, "b", "a/b.txt"), "http://localhost:9000/b/a/b.txt");
    }

    #[test]
    fn test_custom_aws_endpoint_is_virtual_hosted() {
        let conn = StorageConnection::new("c", "C", BackendKind::AwsS3)
            .with_region("us-west-2")
            .with_endpoint("https://s3.example.com");
        assert_eq!(object_url(&conn, "b", "k"), "https://b.s3.example.com/k");
    }

    #[test]
    fn test_timestamp_conversion() {
        let t = AwsDateTime::from_secs(1_700_000_000);
        assert_eq!(to_chrono(Some(&t)).unwrap().timestamp(), 1_700_000_000);
        assert!(to_chrono(None).is_none());
    }

    #[tokio::test]
    async fn test_client_rejects_invalid_connection() {
        let conn = StorageConnection::new("c", "C", BackendKind::S3Compatible);
        let err = S3Client::new(conn, &ClientOptions::default()).await.err().unwrap();
        assert!(matches!(err, S3Error::InvalidConfig(_)));
    }
}
