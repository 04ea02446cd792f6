//! Object storage for uploaded documents.

use std::ops::Range;

use async_trait::async_trait;
use aws_sdk_s3::primitives::ByteStream;
use aws_sdk_s3::types::{CompletedMultipartUpload, CompletedPart};
use aws_sdk_s3::Client as S3Client;
use bytes::Bytes;
use thiserror::Error;
use tracing::{info, warn};

/// S3 rejects multipart parts smaller than 5 MiB (except the last one).
pub const PART_SIZE: usize = 5 * 1024 * 1024;

/// Called with `(bytes_sent, total_bytes)` as a transfer advances.
pub type TransferProgress<'a> = &'a (dyn Fn(u64, u64) + Send + Sync);

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("Upload of {key} failed: {message}")]
    Upload { key: String, message: String },

    #[error("Download of {key} failed: {message}")]
    Download { key: String, message: String },
}

#[async_trait]
pub trait ObjectStorage: Send + Sync {
    async fn put(
        &self,
        key: &str,
        body: Bytes,
        content_type: &str,
        progress: TransferProgress<'_>,
    ) -> Result<(), StorageError>;

    async fn get(&self, key: &str) -> Result<Bytes, StorageError>;
}

/// Byte ranges of the parts a body of `len` bytes is split into.
pub fn part_ranges(len: usize, part_size: usize) -> Vec<Range<usize>> {
    (0..len)
        .step_by(part_size.max(1))
        .map(|start| start..(start + part_size).min(len))
        .collect()
}

// ── S3 / MinIO ───────────────────────────────────────────────────────────────

pub struct S3Storage {
    client: S3Client,
    bucket: String,
}

impl S3Storage {
    pub fn new(client: S3Client, bucket: String) -> Self {
        Self { client, bucket }
    }

    async fn put_multipart(
        &self,
        key: &str,
        body: &Bytes,
        content_type: &str,
        progress: TransferProgress<'_>,
    ) -> Result<(), StorageError> {
        let upload_err = |message: String| StorageError::Upload {
            key: key.to_string(),
            message,
        };

        let created = self
            .client
            .create_multipart_upload()
            .bucket(&self.bucket)
            .key(key)
            .content_type(content_type)
            .send()
            .await
            .map_err(|e| upload_err(e.to_string()))?;
        let upload_id = created
            .upload_id()
            .ok_or_else(|| upload_err("no upload id returned".to_string()))?
            .to_string();

        let total = body.len() as u64;
        let mut parts = Vec::new();
        for (index, range) in part_ranges(body.len(), PART_SIZE).into_iter().enumerate() {
            let part_number = index as i32 + 1;
            let sent = range.end as u64;
            let uploaded = self
                .client
                .upload_part()
                .bucket(&self.bucket)
                .key(key)
                .upload_id(&upload_id)
                .part_number(part_number)
                .body(ByteStream::from(body.slice(range)))
                .send()
                .await;

            match uploaded {
                Ok(part) => {
                    parts.push(
                        CompletedPart::builder()
                            .set_e_tag(part.e_tag().map(String::from))
                            .part_number(part_number)
                            .build(),
                    );
                    progress(sent, total);
                }
                Err(e) => {
                    self.abort(key, &upload_id).await;
                    return Err(upload_err(e.to_string()));
                }
            }
        }

        let completed = CompletedMultipartUpload::builder()
            .set_parts(Some(parts))
            .build();
        if let Err(e) = self
            .client
            .complete_multipart_upload()
            .bucket(&self.bucket)
            .key(key)
            .upload_id(&upload_id)
            .multipart_upload(completed)
            .send()
            .await
        {
            self.abort(key, &upload_id).await;
            return Err(upload_err(e.to_string()));
        }
        Ok(())
    }

    async fn abort(&self, key: &str, upload_id: &str) {
        if let Err(e) = self
            .client
            .abort_multipart_upload()
            .bucket(&self.bucket)
            .key(key)
            .upload_id(upload_id)
            .send()
            .await
        {
            warn!("Could not abort multipart upload of {key}: {e}");
        }
    }
}

#[async_trait]
impl ObjectStorage for S3Storage {
    async fn put(
        &self,
        key: &str,
        body: Bytes,
        content_type: &str,
        progress: TransferProgress<'_>,
    ) -> Result<(), StorageError> {
        let total = body.len() as u64;
        progress(0, total);

        if body.len() > PART_SIZE {
            self.put_multipart(key, &body, content_type, progress).await?;
        } else {
            self.client
                .put_object()
                .bucket(&self.bucket)
                .key(key)
                .body(ByteStream::from(body))
                .content_type(content_type)
                .send()
                .await
                .map_err(|e| StorageError::Upload {
                    key: key.to_string(),
                    message: e.to_string(),
                })?;
            progress(total, total);
        }

        info!("Uploaded {total} bytes to s3://{}/{key}", self.bucket);
        Ok(())
    }

    async fn get(&self, key: &str) -> Result<Bytes, StorageError> {
        let download_err = |message: String| StorageError::Download {
            key: key.to_string(),
            message,
        };
        let object = self
            .client
            .get_object()
            .bucket(&self.bucket)
            .key(key)
            .send()
            .await
            .map_err(|e| download_err(e.to_string()))?;
        let body = object
            .body
            .collect()
            .await
            .map_err(|e| download_err(e.to_string()))?;
        Ok(body.into_bytes())
    }
}

// ── Test double ──────────────────────────────────────────────────────────────

#[cfg(test)]
#[derive(Default)]
pub struct MemoryStorage {
    objects: std::sync::Mutex<std::collections::HashMap<String, Bytes>>,
    fail_puts: std::sync::atomic::AtomicBool,
}

#[cfg(test)]
impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn object(&self, key: &str) -> Option<Bytes> {
        self.objects.lock().unwrap().get(key).cloned()
    }

    pub fn len(&self) -> usize {
        self.objects.lock().unwrap().len()
    }

    pub fn insert(&self, key: &str, body: &[u8]) {
        self.objects
            .lock()
            .unwrap()
            .insert(key.to_string(), Bytes::copy_from_slice(body));
    }

    pub fn fail_puts(&self, fail: bool) {
        self.fail_puts
            .store(fail, std::sync::atomic::Ordering::SeqCst);
    }
}

#[cfg(test)]
#[async_trait]
impl ObjectStorage for MemoryStorage {
    async fn put(
        &self,
        key: &str,
        body: Bytes,
        _content_type: &str,
        progress: TransferProgress<'_>,
    ) -> Result<(), StorageError> {
        if self.fail_puts.load(std::sync::atomic::Ordering::SeqCst) {
            return Err(StorageError::Upload {
                key: key.to_string(),
                message: "connection reset".to_string(),
            });
        }
        let total = body.len() as u64;
        progress(0, total);
        self.objects.lock().unwrap().insert(key.to_string(), body);
        progress(total, total);
        Ok(())
    }

    async fn get(&self, key: &str) -> Result<Bytes, StorageError> {
        self.object(key).ok_or_else(|| StorageError::Download {
            key: key.to_string(),
            message: "no such key".to_string(),
        })
    }
}
