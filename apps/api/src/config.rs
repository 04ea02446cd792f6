use std::time::Duration;

use anyhow::{Context, Result};

const DEFAULT_MAX_UPLOAD_BYTES: usize = 10 * 1024 * 1024;
const DEFAULT_PIPELINE_TIMEOUT_SECS: u64 = 300;
const DEFAULT_SESSION_IDLE_SECS: u64 = 30 * 60;

/// Application configuration loaded from environment variables.
/// Startup fails if required variables are missing.
#[derive(Debug, Clone)]
pub struct Config {
    pub database_url: String,
    pub redis_url: String,
    pub s3_bucket: String,
    pub s3_endpoint: String,
    pub aws_access_key_id: String,
    pub aws_secret_access_key: String,
    pub anthropic_api_key: String,
    pub port: u16,
    pub rust_log: String,
    /// Upper bound on an uploaded résumé document, in bytes.
    pub max_upload_bytes: usize,
    /// Redis list the upload path pushes ingestion jobs onto.
    pub ingest_queue: String,
    /// How long a record may stay pending before the worker marks it failed.
    pub pipeline_timeout: Duration,
    pub enable_ingest_worker: bool,
    /// Path to the `tesseract` binary. `None` disables the OCR fallback.
    pub tesseract_path: Option<String>,
    /// Rasterizer used to turn scanned pages into images for OCR.
    pub pdftoppm_path: String,
    /// Sessions with no activity and no event stream for this long are closed.
    pub session_idle_timeout: Duration,
    /// Allowed browser origins. Empty allows any origin.
    pub cors_origins: Vec<String>,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        dotenvy::dotenv().ok(); // load .env if present; ignore if missing

        Ok(Config {
            database_url: require_env("DATABASE_URL")?,
            redis_url: require_env("REDIS_URL")?,
            s3_bucket: require_env("S3_BUCKET")?,
            s3_endpoint: require_env("S3_ENDPOINT")?,
            aws_access_key_id: require_env("AWS_ACCESS_KEY_ID")?,
            aws_secret_access_key: require_env("AWS_SECRET_ACCESS_KEY")?,
            anthropic_api_key: require_env("ANTHROPIC_API_KEY")?,
            port: optional_env("PORT")
                .unwrap_or_else(|| "8080".to_string())
                .parse::<u16>()
                .context("PORT must be a valid port number")?,
            rust_log: optional_env("RUST_LOG").unwrap_or_else(|| "info".to_string()),
            max_upload_bytes: match optional_env("MAX_UPLOAD_BYTES") {
                Some(v) => v
                    .parse::<usize>()
                    .context("MAX_UPLOAD_BYTES must be a byte count")?,
                None => DEFAULT_MAX_UPLOAD_BYTES,
            },
            ingest_queue: optional_env("INGEST_QUEUE").unwrap_or_else(|| "ingest:jobs".to_string()),
            pipeline_timeout: Duration::from_secs(match optional_env("PIPELINE_TIMEOUT_SECS") {
                Some(v) => v
                    .parse::<u64>()
                    .context("PIPELINE_TIMEOUT_SECS must be a number of seconds")?,
                None => DEFAULT_PIPELINE_TIMEOUT_SECS,
            }),
            enable_ingest_worker: match optional_env("ENABLE_INGEST_WORKER") {
                Some(v) => parse_flag(&v)
                    .with_context(|| format!("ENABLE_INGEST_WORKER has invalid value '{v}'"))?,
                None => true,
            },
            tesseract_path: optional_env("TESSERACT_PATH"),
            pdftoppm_path: optional_env("PDFTOPPM_PATH").unwrap_or_else(|| "pdftoppm".to_string()),
            session_idle_timeout: Duration::from_secs(match optional_env("SESSION_IDLE_SECS") {
                Some(v) => v
                    .parse::<u64>()
                    .context("SESSION_IDLE_SECS must be a number of seconds")?,
                None => DEFAULT_SESSION_IDLE_SECS,
            }),
            cors_origins: optional_env("CORS_ORIGINS")
                .map(|v| parse_list(&v))
                .unwrap_or_default(),
        })
    }
}

fn require_env(key: &str) -> Result<String> {
    std::env::var(key).with_context(|| format!("Required environment variable '{key}' is not set"))
}

fn optional_env(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|v| !v.trim().is_empty())
}

fn parse_flag(value: &str) -> Option<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}

/// Comma-separated values, trimmed, blanks dropped.
fn parse_list(value: &str) -> Vec<String> {
    value
        .split(',')
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(String::from)
        .collect()
}

#[cfg(test)]
impl Config {
    /// Configuration for unit tests. Nothing here points at a live service.
    pub fn for_tests() -> Self {
        Config {
            database_url: "postgres://localhost/sira_test".to_string(),
            redis_url: "redis://localhost".to_string(),
            s3_bucket: "resumes".to_string(),
            s3_endpoint: "http://localhost:9000".to_string(),
            aws_access_key_id: "test".to_string(),
            aws_secret_access_key: "test".to_string(),
            anthropic_api_key: "test".to_string(),
            port: 8080,
            rust_log: "debug".to_string(),
            max_upload_bytes: 1024,
            ingest_queue: "ingest:jobs".to_string(),
            pipeline_timeout: Duration::from_secs(DEFAULT_PIPELINE_TIMEOUT_SECS),
            enable_ingest_worker: false,
            tesseract_path: None,
            pdftoppm_path: "pdftoppm".to_string(),
            session_idle_timeout: Duration::from_secs(DEFAULT_SESSION_IDLE_SECS),
            cors_origins: Vec::new(),
        }
    }
}
