//! The ingestion worker: turns an uploaded document into résumé fields.
//!
//! download → text (text layer, OCR fallback) → generative field extraction
//! → normalization → one conditional terminal write. The write only lands
//! while the record is still pending on the job's storage path, so a newer
//! upload or an expired attempt always wins over a late result.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use chrono::Utc;
use serde_json::Value;
use thiserror::Error;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{error, info, warn};

use crate::ingest::prompts::{EXTRACT_PROMPT, EXTRACT_SYSTEM};
use crate::ingest::queue::{IngestJob, JobQueue};
use crate::ingest::storage::{ObjectStorage, StorageError};
use crate::llm_client::prompts::{JSON_ONLY_SYSTEM, NO_INVENTION};
use crate::llm_client::{complete_json, LanguageModel, LlmError};
use crate::models::resume::IngestionResult;
use crate::resume::normalize::migrate_document;
use crate::session::events::messages;
use crate::store::{ResumeStore, StoreError};

const POP_WAIT: Duration = Duration::from_secs(5);
const SWEEP_INTERVAL: Duration = Duration::from_secs(30);
const QUEUE_BACKOFF: Duration = Duration::from_secs(2);
/// Longest CV text sent to the model, in characters.
const MAX_PROMPT_CHARS: usize = 30_000;

/// Stored as `parsing_error` when the document has no usable text.
pub const NO_TEXT_MESSAGE: &str = "لم نتمكن من قراءة أي نص من الملف.";
/// Stored as `parsing_error` when the model found nothing to fill the form with.
pub const NO_FIELDS_MESSAGE: &str = "لم نجد بيانات سيرة ذاتية في الملف، يرجى تعبئة النموذج يدوياً.";
/// Stored as `parsing_error` for every other extraction failure.
pub const EXTRACTION_FAILED_MESSAGE: &str = "تعذّر استخراج البيانات من الملف.";

#[derive(Debug, Error)]
pub enum ExtractError {
    #[error("document has no readable text")]
    NoText,

    #[error("no résumé fields found in the document")]
    NoFields,

    #[error("text extraction failed: {0}")]
    Text(String),

    #[error("field extraction failed: {0}")]
    Model(#[from] LlmError),

    #[error("could not fetch document: {0}")]
    Storage(#[from] StorageError),

    #[error("could not encode extracted fields: {0}")]
    Encoding(#[from] serde_json::Error),
}

impl ExtractError {
    pub fn user_message(&self) -> &'static str {
        match self {
            ExtractError::NoText => NO_TEXT_MESSAGE,
            ExtractError::NoFields => NO_FIELDS_MESSAGE,
            _ => EXTRACTION_FAILED_MESSAGE,
        }
    }
}

#[async_trait]
pub trait DocumentReader: Send + Sync {
    async fn read_text(&self, pdf: Bytes) -> Result<String, ExtractError>;
}

/// Turns CV text into a raw document (any historical shape is fine; it is
/// normalized afterwards).
#[async_trait]
pub trait FieldExtractor: Send + Sync {
    async fn extract(&self, text: &str) -> Result<Value, ExtractError>;
}

pub struct LlmFieldExtractor {
    model: Arc<dyn LanguageModel>,
}

impl LlmFieldExtractor {
    pub fn new(model: Arc<dyn LanguageModel>) -> Self {
        Self { model }
    }
}

#[async_trait]
impl FieldExtractor for LlmFieldExtractor {
    async fn extract(&self, text: &str) -> Result<Value, ExtractError> {
        let text: String = text.chars().take(MAX_PROMPT_CHARS).collect();
        let prompt = EXTRACT_PROMPT.replace("{cv_text}", &text);
        Ok(complete_json(self.model.as_ref(), &prompt, &extract_system()).await?)
    }
}

fn extract_system() -> String {
    format!("{EXTRACT_SYSTEM} {JSON_ONLY_SYSTEM} {NO_INVENTION}")
}

pub struct IngestWorker {
    store: Arc<dyn ResumeStore>,
    storage: Arc<dyn ObjectStorage>,
    queue: Arc<dyn JobQueue>,
    reader: Arc<dyn DocumentReader>,
    extractor: Arc<dyn FieldExtractor>,
    timeout: Duration,
}

impl IngestWorker {
    pub fn new(
        store: Arc<dyn ResumeStore>,
        storage: Arc<dyn ObjectStorage>,
        queue: Arc<dyn JobQueue>,
        reader: Arc<dyn DocumentReader>,
        extractor: Arc<dyn FieldExtractor>,
        timeout: Duration,
    ) -> Self {
        Self {
            store,
            storage,
            queue,
            reader,
            extractor,
            timeout,
        }
    }

    pub fn spawn(self) -> JoinHandle<()> {
        tokio::spawn(self.run())
    }

    /// Jobs are processed one at a time. The sweep runs between jobs rather
    /// than racing a blocking pop, so a popped job is never dropped.
    async fn run(self) {
        info!("Ingestion worker started (timeout {:?})", self.timeout);
        let mut last_sweep: Option<Instant> = None;

        loop {
            if last_sweep.map_or(true, |at| at.elapsed() >= SWEEP_INTERVAL) {
                if let Err(e) = self.sweep().await {
                    error!("Pending-attempt sweep failed: {e}");
                }
                last_sweep = Some(Instant::now());
            }

            match self.queue.pop(POP_WAIT).await {
                Ok(Some(job)) => {
                    if let Err(e) = self.process(&job).await {
                        error!("Could not record outcome for {}: {e}", job.storage_path);
                    }
                }
                Ok(None) => {}
                Err(e) => {
                    warn!("Ingestion queue unavailable: {e}");
                    tokio::time::sleep(QUEUE_BACKOFF).await;
                }
            }
        }
    }

    /// Runs one job to its terminal write. Returns whether the write landed.
    pub async fn process(&self, job: &IngestJob) -> Result<bool, StoreError> {
        let started = Instant::now();
        let result = match self.extract(job).await {
            Ok(fields) => IngestionResult::Parsed(fields),
            Err(e) => {
                warn!("Ingestion of {} failed: {e}", job.storage_path);
                IngestionResult::Failed(e.user_message().to_string())
            }
        };

        let applied = self
            .store
            .complete_ingestion(job.resume_id, &job.storage_path, &result, Utc::now())
            .await?;
        if applied {
            info!(
                "Ingested {} into résumé {} in {:?}",
                job.storage_path,
                job.resume_id,
                started.elapsed()
            );
        } else {
            info!(
                "Result for {} discarded: attempt superseded or expired",
                job.storage_path
            );
        }
        Ok(applied)
    }

    async fn extract(&self, job: &IngestJob) -> Result<Value, ExtractError> {
        let pdf = self.storage.get(&job.storage_path).await?;
        let text = self.reader.read_text(pdf).await?;
        if text.trim().is_empty() {
            return Err(ExtractError::NoText);
        }
        let raw = self.extractor.extract(&text).await?;
        let document = migrate_document(&raw);
        if document.is_blank() {
            return Err(ExtractError::NoFields);
        }
        Ok(serde_json::to_value(document)?)
    }

    /// Fails every attempt pending for longer than the pipeline timeout.
    pub async fn sweep(&self) -> Result<u64, StoreError> {
        let now = Utc::now();
        let timeout = chrono::Duration::from_std(self.timeout)
            .unwrap_or_else(|_| chrono::Duration::days(1));
        let expired = self
            .store
            .expire_pending(now - timeout, messages::PIPELINE_TIMED_OUT, now)
            .await?;
        if expired > 0 {
            warn!("Marked {expired} stalled ingestion attempt(s) as failed");
        }
        Ok(expired)
    }
}
