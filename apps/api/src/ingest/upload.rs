//! Ingestion Pipeline Client: validates an uploaded CV, stores it and hands
//! it to the ingestion worker.
//!
//! A finished upload only means the document is stored and the record is
//! pending on the new `storage_path`. Parsing completes later and is observed
//! through the record subscription, never through this call.

use std::sync::Arc;

use bytes::Bytes;
use chrono::Utc;
use thiserror::Error;
use tracing::{info, warn};
use uuid::Uuid;

use crate::errors::AppError;
use crate::ingest::queue::{IngestJob, JobQueue};
use crate::ingest::storage::{ObjectStorage, TransferProgress};
use crate::store::{ResumeStore, StoreError};

pub const PDF_CONTENT_TYPE: &str = "application/pdf";
const PDF_MAGIC: &[u8] = b"%PDF-";

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum UploadRejection {
    #[error("Only PDF documents are accepted (got {content_type})")]
    WrongType { content_type: String },

    #[error("File is {size} bytes; the limit is {limit} bytes")]
    TooLarge { size: u64, limit: u64 },

    #[error("The uploaded file is empty")]
    Empty,
}

impl UploadRejection {
    pub fn code(&self) -> &'static str {
        match self {
            UploadRejection::WrongType { .. } => "WRONG_TYPE",
            UploadRejection::TooLarge { .. } => "TOO_LARGE",
            UploadRejection::Empty => "EMPTY_FILE",
        }
    }
}

#[derive(Debug, Clone)]
pub struct UploadedFile {
    pub file_name: Option<String>,
    pub content_type: Option<String>,
    pub bytes: Bytes,
}

/// Checks type and size without touching the network.
///
/// The declared content type must be PDF, or absent/generic with a `.pdf`
/// file name; either way the bytes must start with the PDF signature.
pub fn validate_upload(file: &UploadedFile, max_bytes: u64) -> Result<(), UploadRejection> {
    if file.bytes.is_empty() {
        return Err(UploadRejection::Empty);
    }

    let declared = file.content_type.as_deref().map(str::trim).unwrap_or("");
    let named_pdf = file
        .file_name
        .as_deref()
        .is_some_and(|name| name.to_ascii_lowercase().ends_with(".pdf"));
    let declared_ok = declared.eq_ignore_ascii_case(PDF_CONTENT_TYPE)
        || ((declared.is_empty() || declared == "application/octet-stream") && named_pdf);
    if !declared_ok || !file.bytes.starts_with(PDF_MAGIC) {
        let content_type = if declared.is_empty() { "unknown" } else { declared };
        return Err(UploadRejection::WrongType {
            content_type: content_type.to_string(),
        });
    }

    let size = file.bytes.len() as u64;
    if size > max_bytes {
        return Err(UploadRejection::TooLarge {
            size,
            limit: max_bytes,
        });
    }
    Ok(())
}

/// Object key for one upload. Every upload gets a fresh key, so the key also
/// identifies the ingestion attempt.
pub fn storage_path(user_id: Uuid, upload_id: Uuid) -> String {
    format!("resumes/{user_id}/{upload_id}.pdf")
}

#[derive(Clone)]
pub struct IngestionClient {
    store: Arc<dyn ResumeStore>,
    storage: Arc<dyn ObjectStorage>,
    queue: Arc<dyn JobQueue>,
    max_bytes: u64,
}

impl IngestionClient {
    pub fn new(
        store: Arc<dyn ResumeStore>,
        storage: Arc<dyn ObjectStorage>,
        queue: Arc<dyn JobQueue>,
        max_bytes: u64,
    ) -> Self {
        Self {
            store,
            storage,
            queue,
            max_bytes,
        }
    }

    /// Uploads `file` for `resume_id` and schedules its ingestion. Returns the
    /// storage path of the new attempt.
    pub async fn upload(
        &self,
        user_id: Uuid,
        resume_id: Uuid,
        file: UploadedFile,
        progress: TransferProgress<'_>,
    ) -> Result<String, AppError> {
        validate_upload(&file, self.max_bytes)?;

        if self.store.get_resume(user_id, resume_id).await?.is_none() {
            return Err(StoreError::ResumeNotFound(resume_id).into());
        }

        let path = storage_path(user_id, Uuid::new_v4());
        self.storage
            .put(&path, file.bytes, PDF_CONTENT_TYPE, progress)
            .await
            .map_err(|e| AppError::S3(e.to_string()))?;

        let now = Utc::now();
        self.store
            .attach_document(user_id, resume_id, &path, now)
            .await?;

        let job = IngestJob {
            resume_id,
            user_id,
            storage_path: path.clone(),
            enqueued_at: now,
        };
        if let Err(e) = self.queue.push(&job).await {
            // The record is already pending; the worker's sweep fails it.
            warn!("Could not enqueue ingestion of {path}: {e}");
            return Err(AppError::Queue(e.to_string()));
        }

        info!("Queued ingestion of {path} for résumé {resume_id}");
        Ok(path)
    }
}
