//! Data model shared by every storage backend

use bytes::Bytes;
use chrono::{DateTime, Utc};
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::path::PathBuf;

use super::error::{BackendError, BackendResult};
use crate::core::file_type::FileCategory;
use crate::core::path::{file_name, DEFAULT_DELIMITER};
use crate::core::preview::PreviewContent;

/// Storage service flavour of a connection
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum BackendKind {
    /// Amazon S3
    AwsS3,
    /// Any service speaking the S3 API at a custom endpoint (MinIO, R2, Wasabi)
    S3Compatible,
    /// Google Cloud Storage
    GoogleCloudStorage,
}

impl BackendKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            BackendKind::AwsS3 => "aws-s3",
            BackendKind::S3Compatible => "s3-compatible",
            BackendKind::GoogleCloudStorage => "google-cloud-storage",
        }
    }
}

impl fmt::Display for BackendKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Identity and credentials of one storage account
///
/// Secrets are wrapped in [`SecretString`] and never appear in `Debug` output.
#[derive(Debug)]
pub struct StorageConnection {
    pub id: String,
    pub name: String,
    pub kind: BackendKind,
    pub region: Option<String>,
    /// Custom endpoint URL (required for S3-compatible services)
    pub endpoint: Option<String>,
    pub access_key_id: Option<String>,
    pub secret_access_key: Option<SecretString>,
    pub session_token: Option<SecretString>,
    /// Path-style addressing (`endpoint/bucket/key`)
    pub force_path_style: bool,
    /// GCP project that owns the buckets
    pub project_id: Option<String>,
    /// Service account key, either a path to the JSON file or the JSON itself
    pub service_account_key: Option<SecretString>,
}

fn clone_secret(secret: &Option<SecretString>) -> Option<SecretString> {
    secret
        .as_ref()
        .map(|s| SecretString::new(s.expose_secret().to_owned().into_boxed_str()))
}

impl Clone for StorageConnection {
    fn clone(&self) -> Self {
        Self {
            id: self.id.clone(),
            name: self.name.clone(),
            kind: self.kind,
            region: self.region.clone(),
            endpoint: self.endpoint.clone(),
            access_key_id: self.access_key_id.clone(),
            secret_access_key: clone_secret(&self.secret_access_key),
            session_token: clone_secret(&self.session_token),
            force_path_style: self.force_path_style,
            project_id: self.project_id.clone(),
            service_account_key: clone_secret(&self.service_account_key),
        }
    }
}

impl StorageConnection {
    /// Connection with only identity fields set
    pub fn new(id: impl Into<String>, name: impl Into<String>, kind: BackendKind) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            kind,
            region: None,
            endpoint: None,
            access_key_id: None,
            secret_access_key: None,
            session_token: None,
            force_path_style: false,
            project_id: None,
            service_account_key: None,
        }
    }

    pub fn with_region(mut self, region: impl Into<String>) -> Self {
        self.region = Some(region.into());
        self
    }

    pub fn with_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint = Some(endpoint.into());
        self
    }

    pub fn with_credentials(mut self, access_key_id: impl Into<String>, secret: impl Into<String>) -> Self {
        self.access_key_id = Some(access_key_id.into());
        self.secret_access_key = Some(SecretString::new(secret.into().into_boxed_str()));
        self
    }

    pub fn with_project(mut self, project_id: impl Into<String>) -> Self {
        self.project_id = Some(project_id.into());
        self
    }

    /// Check that the fields required by `kind` are present
    pub fn validate(&self) -> BackendResult<()> {
        let backend = self.kind.as_str();
        if self.id.trim().is_empty() {
            return Err(BackendError::invalid_config(backend, "connection id must not be empty"));
        }
        match self.kind {
            BackendKind::AwsS3 if self.region.as_deref().map_or(true, str::is_empty) => Err(
                BackendError::invalid_config(backend, format!("connection '{}' requires a region", self.id)),
            ),
            BackendKind::S3Compatible if self.endpoint.as_deref().map_or(true, str::is_empty) => Err(
                BackendError::invalid_config(backend, format!("connection '{}' requires an endpoint", self.id)),
            ),
            BackendKind::GoogleCloudStorage
                if self.project_id.as_deref().map_or(true, str::is_empty) =>
            {
                Err(BackendError::invalid_config(
                    backend,
                    format!("connection '{}' requires a project id", self.id),
                ))
            }
            _ => {
                if self.access_key_id.is_some() != self.secret_access_key.is_some() {
                    return Err(BackendError::invalid_config(
                        backend,
                        "access key id and secret access key must be set together",
                    ));
                }
                Ok(())
            }
        }
    }
}

/// Top-level namespace within a connection
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Bucket {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub region: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created: Option<DateTime<Utc>>,
    /// Storage class requested at creation (GCS only)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub storage_class: Option<String>,
}

impl Bucket {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Default::default()
        }
    }

    pub fn with_region(mut self, region: impl Into<String>) -> Self {
        self.region = Some(region.into());
        self
    }
}

/// A listed object or folder
///
/// `path` is the full key and the only identity. Folder paths end with the
/// delimiter, file paths never do.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ObjectRef {
    /// 1-based row number within one listing call, 0 when not listed
    #[serde(default)]
    pub seq: usize,
    pub name: String,
    pub connection_id: String,
    pub bucket: String,
    pub path: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub size: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_modified: Option<DateTime<Utc>>,
    pub type_category: FileCategory,
}

impl ObjectRef {
    /// Build a ref from a raw key; the category follows the key's shape
    pub fn from_key(connection_id: impl Into<String>, bucket: impl Into<String>, key: impl Into<String>) -> Self {
        let path = key.into();
        Self {
            seq: 0,
            name: file_name(&path).to_string(),
            connection_id: connection_id.into(),
            bucket: bucket.into(),
            type_category: FileCategory::classify(&path),
            path,
            size: None,
            last_modified: None,
        }
    }

    /// Folder ref; appends the delimiter when missing
    pub fn folder(connection_id: impl Into<String>, bucket: impl Into<String>, path: &str) -> Self {
        let key = if path.ends_with(DEFAULT_DELIMITER) {
            path.to_string()
        } else {
            format!("{}{}", path, DEFAULT_DELIMITER)
        };
        Self::from_key(connection_id, bucket, key)
    }

    pub fn with_size(mut self, size: u64) -> Self {
        self.size = Some(size);
        self
    }

    pub fn with_last_modified(mut self, last_modified: Option<DateTime<Utc>>) -> Self {
        self.last_modified = last_modified;
        self
    }

    pub fn is_folder(&self) -> bool {
        self.type_category.is_folder()
    }

    /// Same connection and bucket, different key
    pub fn with_path(&self, key: impl Into<String>) -> Self {
        let mut moved = Self::from_key(self.connection_id.clone(), self.bucket.clone(), key);
        moved.size = self.size;
        moved.last_modified = self.last_modified;
        moved
    }
}

impl fmt::Display for ObjectRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.bucket, self.path)
    }
}

/// Key/value tag attached to an object
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ObjectTag {
    pub key: String,
    pub value: String,
}

/// One ACL grant
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Grant {
    pub grantee: String,
    pub permission: String,
}

/// Object ACL as reported by the backend
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct AccessControl {
    pub owner: Option<String>,
    pub grants: Vec<Grant>,
}

/// Full metadata of one object, fetched on demand
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ObjectDetail {
    #[serde(flatten)]
    pub object: ObjectRef,
    pub content_type: Option<String>,
    pub e_tag: Option<String>,
    pub version_id: Option<String>,
    pub server_side_encryption: Option<String>,
    pub accept_ranges: Option<String>,
    #[serde(default)]
    pub metadata: BTreeMap<String, String>,
    #[serde(default)]
    pub tags: Vec<ObjectTag>,
    pub permissions: Option<AccessControl>,
    pub url: Option<String>,
    pub preview: Option<PreviewContent>,
}

impl ObjectDetail {
    pub fn new(object: ObjectRef) -> Self {
        Self {
            object,
            content_type: None,
            e_tag: None,
            version_id: None,
            server_side_encryption: None,
            accept_ranges: None,
            metadata: BTreeMap::new(),
            tags: Vec::new(),
            permissions: None,
            url: None,
            preview: None,
        }
    }
}

/// One page of a listing
#[derive(Debug, Clone, Default)]
pub struct ListPage {
    pub entries: Vec<ObjectRef>,
    pub next_token: Option<String>,
}

/// Bytes returned for a range request, with the range the backend actually served
#[derive(Debug, Clone)]
pub struct RangeChunk {
    pub data: Bytes,
    /// First byte index served
    pub start: u64,
    /// Last byte index served (inclusive)
    pub end: u64,
    /// Total object length
    pub total: u64,
}

impl RangeChunk {
    /// Chunk for a zero-length object
    pub fn empty() -> Self {
        Self {
            data: Bytes::new(),
            start: 0,
            end: 0,
            total: 0,
        }
    }
}

/// Content handed to `put_object`
#[derive(Debug, Clone)]
pub enum UploadBody {
    /// Read from a local file
    File(PathBuf),
    /// In-memory bytes
    Bytes(Bytes),
}

/// Progress callback for uploads: `(loaded, total)`
pub type UploadProgress<'a> = &'a mut (dyn FnMut(u64, u64) + Send);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_object_ref_from_key() {
        let file = ObjectRef::from_key("c1", "bucket", "docs/readme.md").with_size(12);
        assert_eq!(file.name, "readme.md");
        assert!(!file.is_folder());
        assert_eq!(file.size, Some(12));

        let folder = ObjectRef::folder("c1", "bucket", "docs");
        assert_eq!(folder.path, "docs/");
        assert_eq!(folder.name, "docs");
        assert!(folder.is_folder());
    }

    #[test]
    fn test_with_path_reclassifies() {
        let file = ObjectRef::from_key("c1", "b", "a/x.png");
        let moved = file.with_path("b/y/");
        assert!(moved.is_folder());
        assert_eq!(moved.bucket, "b");
    }

    #[test]
    fn test_connection_validation() {
        let aws = StorageConnection::new("c1", "prod", BackendKind::AwsS3);
        assert!(aws.validate().is_err());
        assert!(aws.clone().with_region("eu-west-1").validate().is_ok());

        let minio = StorageConnection::new("c2", "minio", BackendKind::S3Compatible);
        assert!(minio.validate().is_err());
        assert!(minio.with_endpoint("http://localhost:9000").validate().is_ok());

        let gcs = StorageConnection::new("c3", "gcs", BackendKind::GoogleCloudStorage);
        let err = gcs.validate().unwrap_err();
        assert_eq!(err.kind, crate::backend::ErrorKind::InvalidConfig);
        assert!(gcs.with_project("my-project").validate().is_ok());
    }

    #[test]
    fn test_secret_not_in_debug_output() {
        let conn = StorageConnection::new("c1", "prod", BackendKind::AwsS3)
            .with_region("us-east-1")
            .with_credentials("AKIA", "super-secret");
        let debug = format!("{:?}", conn.clone());
        assert!(!debug.contains("super-secret"));
        assert_eq!(
            conn.secret_access_key.as_ref().map(|s| s.expose_secret().to_string()),
            Some("super-secret".to_string())
        );
    }
}
