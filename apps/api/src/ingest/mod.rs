//! Document ingestion: upload validation and storage, the job queue, and the
//! worker that extracts résumé fields from stored documents.

pub mod ocr;
pub mod pipeline;
pub mod prompts;
pub mod queue;
pub mod storage;
pub mod upload;

pub use pipeline::{IngestWorker, LlmFieldExtractor};
pub use queue::RedisJobQueue;
pub use storage::S3Storage;
pub use upload::IngestionClient;
