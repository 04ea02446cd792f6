use std::sync::Arc;

use crate::config::Config;
use crate::ingest::IngestionClient;
use crate::llm_client::LanguageModel;
use crate::session::SessionRegistry;
use crate::store::ResumeStore;

/// Shared application state injected into all route handlers via Axum extractors.
#[derive(Clone)]
pub struct AppState {
    pub store: Arc<dyn ResumeStore>,
    /// Upload path: validation, object storage, job queue.
    pub ingestion: IngestionClient,
    /// Used by the enhancement endpoints.
    pub llm: Arc<dyn LanguageModel>,
    pub sessions: SessionRegistry,
    pub config: Config,
}
