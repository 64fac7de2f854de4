//! Bulk deletion through `DeleteObjects`
//!
//! S3 accepts up to 1000 keys per request. Keys the service refuses are
//! reported per key in the response rather than failing the whole call.

use super::client::S3Client;
use super::error::{S3Error, S3Result};
use aws_sdk_s3::types::{Delete, ObjectIdentifier};

/// Keys per `DeleteObjects` request
pub const MAX_DELETE_BATCH: usize = 1000;

/// Key the service refused to delete
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BatchError {
    pub key: String,
    pub message: String,
}

/// Outcome of a bulk delete
#[derive(Debug, Clone, Default)]
pub struct BatchDeleteResult {
    pub deleted: u64,
    pub errors: Vec<BatchError>,
}

impl BatchDeleteResult {
    pub fn is_success(&self) -> bool {
        self.errors.is_empty()
    }

    /// Collapse per-key failures into a single error
    pub fn into_result(self) -> S3Result<u64> {
        match self.errors.first() {
            None => Ok(self.deleted),
            Some(first) => Err(S3Error::Service {
                code: "DeleteObjects".to_string(),
                status: 200,
                message: format!(
                    "{} of {} keys failed, first '{}': {}",
                    self.errors.len(),
                    self.deleted as usize + self.errors.len(),
                    first.key,
                    first.message
                ),
            }),
        }
    }
}

impl S3Client {
    /// Delete `keys` from `bucket`, [`MAX_DELETE_BATCH`] keys per request
    pub async fn batch_delete(&self, bucket: &str, keys: &[String]) -> S3Result<BatchDeleteResult> {
        let mut result = BatchDeleteResult::default();

        for chunk in keys.chunks(MAX_DELETE_BATCH) {
            let objects = chunk
                .iter()
                .map(|key| {
                    ObjectIdentifier::builder()
                        .key(key)
                        .build()
                        .map_err(|e| S3Error::Sdk(format!("Failed to build object identifier: {}", e)))
                })
                .collect::<S3Result<Vec<_>>>()?;

            let delete = Delete::builder()
                .set_objects(Some(objects))
                .quiet(false)
                .build()
                .map_err(|e| S3Error::Sdk(format!("Failed to build delete request: {}", e)))?;

            let output = self
                .client
                .delete_objects()
                .bucket(bucket)
                .delete(delete)
                .send()
                .await
                .map_err(|e| S3Error::from(e).context(format!("Batch delete in {}", bucket)))?;

            result.deleted += output.deleted().len() as u64;
            for error in output.errors() {
                result.errors.push(BatchError {
                    key: error.key().unwrap_or_default().to_string(),
                    message: error.message().unwrap_or("Unknown error").to_string(),
                });
            }
            tracing::debug!(
                "Deleted {} keys from {} ({} failed so far)",
                output.deleted().len(),
                bucket,
                result.errors.len()
            );
        }

        Ok(result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_clean_result_passes_through() {
        let result = BatchDeleteResult {
            deleted: 3,
            errors: Vec::new(),
        };
        assert!(result.is_success());
        assert_eq!(result.into_result().unwrap(), 3);
    }

    #[test]
    fn test_partial_failure_names_first_key() {
        let result = BatchDeleteResult {
            deleted: 1,
            errors: vec![
                BatchError {
                    key: "a/locked.txt".to_string(),
                    message: "Access Denied".to_string(),
                },
                BatchError {
                    key: "a/other.txt".to_string(),
                    message: "Access Denied".to_string(),
                },
            ],
        };
        let err = result.into_result().unwrap_err().to_string();
        assert!(err.contains("2 of 3 keys failed"));
        assert!(err.contains("a/locked.txt"));
    }
}
