//! Google Cloud Storage backend
//!
//! Object bodies are read and written through `object_store`, which handles
//! authentication, ranged reads and multipart uploads. Operations the store
//! abstraction cannot express go through the Cloud Storage JSON API using the
//! same credentials:
//!
//! - delimited listings that keep folder marker objects (`includeTrailingDelimiter`)
//! - full object metadata (generation, custom metadata, encryption)
//! - folder markers, whose trailing `/` an object path would strip
//! - copies across buckets (`rewriteTo`)
//! - bucket management
//!
//! Bulk delete is not offered; tree deletes fall back to one request per object.

pub mod client;
pub mod json;

pub use client::{GcsClient, DEFAULT_LOCATION};
