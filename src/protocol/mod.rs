//! Service-specific implementations of [`StorageClient`](crate::backend::StorageClient)
//!
//! Each backend is behind a cargo feature: `s3-native` for AWS S3 and
//! S3-compatible services, `gcs-native` for Google Cloud Storage.

#[cfg(feature = "gcs-native")]
pub mod gcs;
#[cfg(feature = "s3-native")]
pub mod s3;
