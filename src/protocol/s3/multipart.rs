//! Multipart upload and ranged download

use super::client::S3Client;
use super::error::{S3Error, S3Result};
use aws_sdk_s3::primitives::ByteStream;
use aws_sdk_s3::types::{CompletedMultipartUpload, CompletedPart};
use bytes::{Bytes, BytesMut};
use tokio::fs::File;
use tokio::io::AsyncReadExt;

use crate::backend::{RangeChunk, UploadBody, UploadProgress};

/// Minimum part size accepted by S3 for every part but the last
pub const MIN_PART_SIZE: usize = 5 * 1024 * 1024;

/// Sequential reader handing out upload parts
enum PartSource {
    File(File),
    Bytes(Bytes),
}

impl PartSource {
    async fn open(body: UploadBody) -> S3Result<Self> {
        match body {
            UploadBody::File(path) => Ok(PartSource::File(File::open(&path).await?)),
            UploadBody::Bytes(bytes) => Ok(PartSource::Bytes(bytes)),
        }
    }

    /// Next part of at most `size` bytes, `None` at end of input
    async fn next_part(&mut self, size: usize) -> S3Result<Option<Bytes>> {
        match self {
            PartSource::Bytes(bytes) => {
                if bytes.is_empty() {
                    return Ok(None);
                }
                let take = size.min(bytes.len());
                Ok(Some(bytes.split_to(take)))
            }
            PartSource::File(file) => {
                let mut buffer = BytesMut::zeroed(size);
                let mut filled = 0;
                while filled < size {
                    let read = file.read(&mut buffer[filled..]).await?;
                    if read == 0 {
                        break;
                    }
                    filled += read;
                }
                if filled == 0 {
                    return Ok(None);
                }
                buffer.truncate(filled);
                Ok(Some(buffer.freeze()))
            }
        }
    }
}

impl S3Client {
    /// Upload `body` in parts of `part_size` bytes
    ///
    /// The upload is aborted if any part fails, so no orphaned parts are left
    /// behind in the bucket.
    pub(super) async fn upload_multipart(
        &self,
        bucket: &str,
        key: &str,
        content_type: Option<String>,
        body: UploadBody,
        total: u64,
        mut progress: Option<UploadProgress<'_>>,
    ) -> S3Result<()> {
        let mut source = PartSource::open(body).await?;
        let upload_id = self.initiate_multipart_upload(bucket, key, content_type).await?;

        let mut completed = Vec::new();
        let mut loaded = 0u64;
        let mut part_number = 1i32;
        let result: S3Result<()> = async {
            while let Some(part) = source.next_part(self.part_size.max(MIN_PART_SIZE)).await? {
                let len = part.len() as u64;
                let e_tag = self.upload_part(bucket, key, &upload_id, part_number, part).await?;
                completed.push(
                    CompletedPart::builder()
                        .part_number(part_number)
                        .e_tag(e_tag)
                        .build(),
                );
                loaded += len;
                if let Some(report) = progress.as_mut() {
                    report(loaded, total);
                }
                part_number += 1;
            }
            Ok(())
        }
        .await;

        match result {
            Ok(()) => {
                self.complete_multipart_upload(bucket, key, &upload_id, completed)
                    .await
            }
            Err(e) => {
                if let Err(abort) = self.abort_multipart_upload(bucket, key, &upload_id).await {
                    tracing::warn!("Failed to abort multipart upload {}: {}", upload_id, abort);
                }
                Err(e)
            }
        }
    }

    async fn initiate_multipart_upload(
        &self,
        bucket: &str,
        key: &str,
        content_type: Option<String>,
    ) -> S3Result<String> {
        let response = self
            .client
            .create_multipart_upload()
            .bucket(bucket)
            .key(key)
            .set_content_type(content_type)
            .send()
            .await?;

        response
            .upload_id()
            .map(str::to_string)
            .ok_or_else(|| S3Error::MultipartUpload("No upload ID returned".to_string()))
    }

    async fn upload_part(
        &self,
        bucket: &str,
        key: &str,
        upload_id: &str,
        part_number: i32,
        data: Bytes,
    ) -> S3Result<String> {
        let response = self
            .client
            .upload_part()
            .bucket(bucket)
            .key(key)
            .upload_id(upload_id)
            .part_number(part_number)
            .body(ByteStream::from(data))
            .send()
            .await?;

        response
            .e_tag()
            .map(str::to_string)
            .ok_or_else(|| S3Error::MultipartUpload(format!("No ETag for part {}", part_number)))
    }

    async fn complete_multipart_upload(
        &self,
        bucket: &str,
        key: &str,
        upload_id: &str,
        parts: Vec<CompletedPart>,
    ) -> S3Result<()> {
        let upload = CompletedMultipartUpload::builder()
            .set_parts(Some(parts))
            .build();

        self.client
            .complete_multipart_upload()
            .bucket(bucket)
            .key(key)
            .upload_id(upload_id)
            .multipart_upload(upload)
            .send()
            .await?;

        Ok(())
    }

    async fn abort_multipart_upload(&self, bucket: &str, key: &str, upload_id: &str) -> S3Result<()> {
        self.client
            .abort_multipart_upload()
            .bucket(bucket)
            .key(key)
            .upload_id(upload_id)
            .send()
            .await?;
        Ok(())
    }

    /// Download the inclusive byte range `start..=end`
    pub(super) async fn download_range(
        &self,
        bucket: &str,
        key: &str,
        start: u64,
        end: u64,
    ) -> S3Result<RangeChunk> {
        let response = self
            .client
            .get_object()
            .bucket(bucket)
            .key(key)
            .range(format!("bytes={}-{}", start, end))
            .send()
            .await;

        let response = match response {
            Ok(response) => response,
            Err(e) => {
                let err = S3Error::from(e);
                // 416 on a zero-byte object: there is nothing to serve
                if matches!(err, S3Error::InvalidRange(_)) && start == 0 {
                    let head = self.client.head_object().bucket(bucket).key(key).send().await?;
                    if head.content_length().unwrap_or(0) == 0 {
                        return Ok(RangeChunk::empty());
                    }
                }
                return Err(err);
            }
        };

        let content_range = response.content_range().map(str::to_string);
        let content_length = response.content_length();
        let data = response
            .body
            .collect()
            .await
            .map_err(|e| S3Error::Network(format!("Failed to read body: {}", e)))?
            .into_bytes();

        let (start, end, total) = match content_range.as_deref().and_then(parse_content_range) {
            Some(range) => range,
            // Servers that ignore Range send the whole object
            None => {
                let total = content_length.map(|l| l as u64).unwrap_or(data.len() as u64);
                if total == 0 {
                    return Ok(RangeChunk::empty());
                }
                (0, total - 1, total)
            }
        };

        Ok(RangeChunk {
            data,
            start,
            end,
            total,
        })
    }
}

/// Parse a `Content-Range` header of the form `bytes start-end/total`
pub fn parse_content_range(header: &str) -> Option<(u64, u64, u64)> {
    let value = header.trim().strip_prefix("bytes")?.trim_start();
    let (range, total) = value.split_once('/')?;
    let (start, end) = range.split_once('-')?;
    let start = start.trim().parse().ok()?;
    let end = end.trim().parse().ok()?;
    let total = total.trim().parse().ok()?;
    if end < start || end >= total {
        return None;
    }
    Some((start, end, total))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_content_range() {
        assert_eq!(parse_content_range("bytes 0-1048575/3000000"), Some((0, 1048575, 3000000)));
        assert_eq!(parse_content_range("bytes 10-10/11"), Some((10, 10, 11)));
        assert_eq!(parse_content_range("bytes 5-9/*"), None);
        assert_eq!(parse_content_range("bytes */100"), None);
        assert_eq!(parse_content_range("items 0-1/2"), None);
        assert_eq!(parse_content_range("bytes 9-5/10"), None);
    }

    #[tokio::test]
    async fn test_part_source_splits_bytes() {
        let mut source = PartSource::Bytes(Bytes::from_static(b"abcdefghij"));
        assert_eq!(source.next_part(4).await.unwrap().unwrap(), Bytes::from_static(b"abcd"));
        assert_eq!(source.next_part(4).await.unwrap().unwrap(), Bytes::from_static(b"efgh"));
        assert_eq!(source.next_part(4).await.unwrap().unwrap(), Bytes::from_static(b"ij"));
        assert!(source.next_part(4).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_part_source_reads_file_in_full_parts() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("data.bin");
        std::fs::write(&path, vec![7u8; 10]).unwrap();

        let mut source = PartSource::open(UploadBody::File(path)).await.unwrap();
        assert_eq!(source.next_part(6).await.unwrap().unwrap().len(), 6);
        assert_eq!(source.next_part(6).await.unwrap().unwrap().len(), 4);
        assert!(source.next_part(6).await.unwrap().is_none());
    }
}
