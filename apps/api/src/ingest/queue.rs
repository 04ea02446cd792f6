//! Redis-backed job queue between the upload path and the ingestion worker.
//!
//! Producers `LPUSH`, the worker `BRPOP`s, so jobs run in upload order.

use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use redis::AsyncCommands;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IngestJob {
    pub resume_id: Uuid,
    pub user_id: Uuid,
    /// Identifies the ingestion attempt; the terminal write is conditional on it.
    pub storage_path: String,
    pub enqueued_at: DateTime<Utc>,
}

#[derive(Debug, Error)]
pub enum QueueError {
    #[error("Redis error: {0}")]
    Redis(#[from] redis::RedisError),

    #[error("Malformed job payload: {0}")]
    Payload(#[from] serde_json::Error),
}

#[async_trait]
pub trait JobQueue: Send + Sync {
    async fn push(&self, job: &IngestJob) -> Result<(), QueueError>;

    /// Waits up to `wait` for the next job.
    async fn pop(&self, wait: Duration) -> Result<Option<IngestJob>, QueueError>;
}

pub struct RedisJobQueue {
    client: redis::Client,
    key: String,
}

impl RedisJobQueue {
    pub fn new(client: redis::Client, key: String) -> Self {
        Self { client, key }
    }
}

#[async_trait]
impl JobQueue for RedisJobQueue {
    async fn push(&self, job: &IngestJob) -> Result<(), QueueError> {
        let payload = serde_json::to_string(job)?;
        let mut conn = self.client.get_multiplexed_async_connection().await?;
        let _: () = conn.lpush(&self.key, payload).await?;
        Ok(())
    }

    async fn pop(&self, wait: Duration) -> Result<Option<IngestJob>, QueueError> {
        let mut conn = self.client.get_multiplexed_async_connection().await?;
        let popped: Option<(String, String)> = redis::cmd("BRPOP")
            .arg(&self.key)
            .arg(wait.as_secs().max(1))
            .query_async(&mut conn)
            .await?;
        match popped {
            Some((_, payload)) => Ok(Some(serde_json::from_str(&payload)?)),
            None => Ok(None),
        }
    }
}

#[cfg(test)]
#[derive(Default)]
pub struct MemoryJobQueue {
    jobs: std::sync::Mutex<std::collections::VecDeque<IngestJob>>,
    fail_pushes: std::sync::atomic::AtomicBool,
}

#[cfg(test)]
impl MemoryJobQueue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn jobs(&self) -> Vec<IngestJob> {
        self.jobs.lock().unwrap().iter().cloned().collect()
    }

    pub fn fail_pushes(&self, fail: bool) {
        self.fail_pushes
            .store(fail, std::sync::atomic::Ordering::SeqCst);
    }
}

#[cfg(test)]
#[async_trait]
impl JobQueue for MemoryJobQueue {
    async fn push(&self, job: &IngestJob) -> Result<(), QueueError> {
        if self.fail_pushes.load(std::sync::atomic::Ordering::SeqCst) {
            return Err(QueueError::Redis(redis::RedisError::from((
                redis::ErrorKind::IoError,
                "connection refused",
            ))));
        }
        self.jobs.lock().unwrap().push_front(job.clone());
        Ok(())
    }

    async fn pop(&self, _wait: Duration) -> Result<Option<IngestJob>, QueueError> {
        Ok(self.jobs.lock().unwrap().pop_back())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_job_payload_shape() {
        let job = IngestJob {
            resume_id: Uuid::nil(),
            user_id: Uuid::nil(),
            storage_path: "resumes/u/a.pdf".to_string(),
            enqueued_at: DateTime::parse_from_rfc3339("2026-01-05T10:00:00Z")
                .unwrap()
                .with_timezone(&Utc),
        };
        let payload = serde_json::to_value(&job).unwrap();
        assert_eq!(payload["storage_path"], "resumes/u/a.pdf");
        assert_eq!(payload["resume_id"], Uuid::nil().to_string());
    }

    #[tokio::test]
    async fn test_memory_queue_is_fifo() {
        let queue = MemoryJobQueue::new();
        for path in ["a.pdf", "b.pdf"] {
            queue
                .push(&IngestJob {
                    resume_id: Uuid::new_v4(),
                    user_id: Uuid::new_v4(),
                    storage_path: path.to_string(),
                    enqueued_at: Utc::now(),
                })
                .await
                .unwrap();
        }
        let first = queue.pop(Duration::from_secs(1)).await.unwrap().unwrap();
        assert_eq!(first.storage_path, "a.pdf");
    }
}
