//! Resources of the Cloud Storage JSON API

use chrono::{DateTime, Utc};
use percent_encoding::{utf8_percent_encode, AsciiSet, NON_ALPHANUMERIC};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::backend::{Bucket, ObjectDetail, ObjectRef};

pub const API_BASE: &str = "https://storage.googleapis.com/storage/v1";
pub const UPLOAD_BASE: &str = "https://storage.googleapis.com/upload/storage/v1";

/// Everything but unreserved characters is escaped in path segments
const NAME_ENCODE_SET: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'-')
    .remove(b'_')
    .remove(b'.')
    .remove(b'~');

/// Encode an object or bucket name as a single URL path segment
pub fn encode_name(name: &str) -> String {
    utf8_percent_encode(name, NAME_ENCODE_SET).to_string()
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CustomerEncryption {
    pub encryption_algorithm: Option<String>,
}

/// Object resource
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ObjectResource {
    pub name: String,
    /// Decimal string
    pub size: Option<String>,
    pub updated: Option<DateTime<Utc>>,
    pub content_type: Option<String>,
    pub etag: Option<String>,
    pub generation: Option<String>,
    #[serde(default)]
    pub metadata: BTreeMap<String, String>,
    pub media_link: Option<String>,
    pub customer_encryption: Option<CustomerEncryption>,
    pub kms_key_name: Option<String>,
}

impl ObjectResource {
    pub fn size(&self) -> u64 {
        self.size
            .as_deref()
            .and_then(|s| s.parse().ok())
            .unwrap_or(0)
    }

    pub fn to_object_ref(&self, connection_id: &str, bucket: &str) -> ObjectRef {
        ObjectRef::from_key(connection_id, bucket, self.name.clone())
            .with_size(self.size())
            .with_last_modified(self.updated)
    }

    pub fn into_detail(self, target: &ObjectRef) -> ObjectDetail {
        let object = target
            .with_path(self.name.clone())
            .with_size(self.size())
            .with_last_modified(self.updated);
        let mut detail = ObjectDetail::new(object);
        detail.server_side_encryption = match (&self.customer_encryption, &self.kms_key_name) {
            (Some(enc), _) => enc.encryption_algorithm.clone(),
            (None, Some(_)) => Some("cloud-kms".to_string()),
            (None, None) => None,
        };
        detail.content_type = self.content_type;
        detail.e_tag = self.etag;
        detail.version_id = self.generation;
        detail.accept_ranges = Some("bytes".to_string());
        detail.metadata = self.metadata;
        detail.url = self.media_link;
        detail
    }
}

/// Page of `objects.list`
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ObjectList {
    #[serde(default)]
    pub items: Vec<ObjectResource>,
    #[serde(default)]
    pub prefixes: Vec<String>,
    pub next_page_token: Option<String>,
}

impl ObjectList {
    /// Listing entries under `prefix`: objects first, then folders that have no marker object
    pub fn into_entries(self, connection_id: &str, bucket: &str, prefix: &str) -> Vec<ObjectRef> {
        let mut entries: Vec<ObjectRef> = self
            .items
            .iter()
            .filter(|item| item.name != prefix)
            .map(|item| item.to_object_ref(connection_id, bucket))
            .collect();
        for folder in self.prefixes {
            if folder != prefix && !entries.iter().any(|e| e.path == folder) {
                entries.push(ObjectRef::folder(connection_id, bucket, &folder));
            }
        }
        entries
    }
}

/// Response of `objects.rewrite`
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RewriteResponse {
    #[serde(default)]
    pub done: bool,
    pub rewrite_token: Option<String>,
}

/// Bucket resource
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BucketResource {
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub location: Option<String>,
    #[serde(skip_serializing)]
    pub time_created: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub storage_class: Option<String>,
}

impl From<BucketResource> for Bucket {
    fn from(resource: BucketResource) -> Self {
        Bucket {
            name: resource.name,
            region: resource.location,
            created: resource.time_created,
            storage_class: resource.storage_class,
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BucketList {
    #[serde(default)]
    pub items: Vec<BucketResource>,
    pub next_page_token: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ErrorBody {
    error: ErrorDetail,
}

#[derive(Debug, Deserialize)]
struct ErrorDetail {
    message: String,
}

/// Message of a JSON API error body, or the body itself
pub fn error_message(body: &str) -> String {
    serde_json::from_str::<ErrorBody>(body)
        .map(|b| b.error.message)
        .unwrap_or_else(|_| body.trim().to_string())
}
