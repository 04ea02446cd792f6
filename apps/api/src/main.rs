mod config;
mod db;
mod enhance;
mod errors;
mod ingest;
mod llm_client;
mod models;
mod resume;
mod routes;
mod session;
mod state;
mod store;

use anyhow::Result;
use aws_config::Region;
use aws_sdk_s3::config::Credentials;
use std::net::SocketAddr;
use tower_http::trace::TraceLayer;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use std::sync::Arc;

use crate::config::Config;
use crate::db::create_pool;
use crate::ingest::ocr::{PdfTextReader, TesseractOcr};
use crate::ingest::{IngestWorker, IngestionClient, LlmFieldExtractor, RedisJobQueue, S3Storage};
use crate::llm_client::{LanguageModel, LlmClient};
use crate::routes::{build_router, cors_layer};
use crate::session::SessionRegistry;
use crate::state::AppState;
use crate::store::{PgResumeStore, ResumeStore};

#[tokio::main]
async fn main() -> Result<()> {
    // Load configuration first (fails on missing required env vars)
    let config = Config::from_env()?;

    // Initialize structured logging
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| {
            EnvFilter::new(format!(
                "{}={}",
                env!("CARGO_PKG_NAME").replace('-', "_"),
                &config.rust_log
            ))
        }))
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("Starting Sira API v{}", env!("CARGO_PKG_VERSION"));

    // Initialize PostgreSQL
    let db = create_pool(&config.database_url).await?;
    let store: Arc<dyn ResumeStore> = Arc::new(PgResumeStore::new(db));

    // Initialize Redis job queue
    let redis = redis::Client::open(config.redis_url.clone())?;
    let queue = Arc::new(RedisJobQueue::new(redis, config.ingest_queue.clone()));
    info!("Redis job queue initialized ({})", config.ingest_queue);

    // Initialize S3 / MinIO
    let s3 = build_s3_client(&config).await;
    let storage = Arc::new(S3Storage::new(s3, config.s3_bucket.clone()));
    info!("S3 client initialized");

    // Initialize LLM client
    let llm: Arc<dyn LanguageModel> = Arc::new(LlmClient::new(config.anthropic_api_key.clone())?);
    info!("LLM client initialized (model: {})", llm_client::MODEL);

    if config.enable_ingest_worker {
        let ocr = config
            .tesseract_path
            .clone()
            .map(|tesseract| TesseractOcr::new(tesseract, config.pdftoppm_path.clone()));
        if ocr.is_none() {
            info!("TESSERACT_PATH not set; scanned documents will fail extraction");
        }
        IngestWorker::new(
            store.clone(),
            storage.clone(),
            queue.clone(),
            Arc::new(PdfTextReader::new(ocr)),
            Arc::new(LlmFieldExtractor::new(llm.clone())),
            config.pipeline_timeout,
        )
        .spawn();
    } else {
        info!("Ingestion worker disabled (ENABLE_INGEST_WORKER=false)");
    }

    let ingestion = IngestionClient::new(
        store.clone(),
        storage,
        queue,
        config.max_upload_bytes as u64,
    );

    let sessions = SessionRegistry::new();
    sessions.spawn_reaper(config.session_idle_timeout);

    // Build app state
    let state = AppState {
        store,
        ingestion,
        llm,
        sessions,
        config: config.clone(),
    };

    // Build router
    let app = build_router(state)
        .layer(TraceLayer::new_for_http())
        .layer(cors_layer(&config.cors_origins)?);

    let addr: SocketAddr = format!("0.0.0.0:{}", config.port).parse()?;
    info!("Listening on {addr}");

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

/// Constructs an S3 client configured for MinIO (local) or AWS (production).
async fn build_s3_client(config: &Config) -> aws_sdk_s3::Client {
    let credentials = Credentials::new(
        &config.aws_access_key_id,
        &config.aws_secret_access_key,
        None,
        None,
        "sira-static",
    );

    let s3_config = aws_config::defaults(aws_config::BehaviorVersion::latest())
        .region(Region::new("us-east-1"))
        .credentials_provider(credentials)
        .endpoint_url(&config.s3_endpoint)
        .load()
        .await;

    aws_sdk_s3::Client::new(&s3_config)
}
