//! Record read/write boundary.
//!
//! `ResumeStore` is the only way the rest of the service touches persisted
//! résumés and user pointers. `AppState` carries it as `Arc<dyn ResumeStore>`
//! so sessions, the upload path, and the ingestion worker share one backend.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use thiserror::Error;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use uuid::Uuid;

use crate::models::resume::{IngestionResult, ResumePatch, ResumeRecord};
use crate::models::user::{Identity, User};

#[cfg(test)]
pub mod memory;
pub mod postgres;

pub use postgres::PgResumeStore;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Résumé {0} not found")]
    ResumeNotFound(Uuid),

    #[error("User {0} not found")]
    UserNotFound(Uuid),

    #[error("Subscription closed: {0}")]
    Subscription(String),

    #[error("Could not encode document: {0}")]
    Serialization(String),
}

/// One event on a live record subscription.
#[derive(Debug, Clone, PartialEq)]
pub enum SnapshotEvent {
    /// The record as of its latest write.
    Updated(ResumeRecord),
    /// The record no longer exists.
    Missing,
}

/// A live subscription to one record. Snapshots arrive in write order; the
/// first one is the record's state at subscription time.
///
/// Dropping the subscription unsubscribes.
pub struct Subscription {
    rx: mpsc::Receiver<Result<SnapshotEvent, StoreError>>,
    feeder: Option<JoinHandle<()>>,
}

impl Subscription {
    pub fn new(
        rx: mpsc::Receiver<Result<SnapshotEvent, StoreError>>,
        feeder: Option<JoinHandle<()>>,
    ) -> Self {
        Self { rx, feeder }
    }

    /// Next event, or `None` once the feed has ended.
    pub async fn next(&mut self) -> Option<Result<SnapshotEvent, StoreError>> {
        self.rx.recv().await
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        if let Some(feeder) = self.feeder.take() {
            feeder.abort();
        }
    }
}

#[async_trait]
pub trait ResumeStore: Send + Sync {
    /// Creates the user on first sign-in; refreshes name and email otherwise.
    async fn upsert_user(&self, identity: &Identity) -> Result<User, StoreError>;

    async fn get_user(&self, user_id: Uuid) -> Result<Option<User>, StoreError>;

    async fn set_latest_resume(&self, user_id: Uuid, resume_id: Uuid) -> Result<(), StoreError>;

    async fn get_resume(
        &self,
        user_id: Uuid,
        resume_id: Uuid,
    ) -> Result<Option<ResumeRecord>, StoreError>;

    /// The user's record with the most recent `updated_at`, if any.
    async fn latest_resume(&self, user_id: Uuid) -> Result<Option<ResumeRecord>, StoreError>;

    async fn insert_resume(&self, record: &ResumeRecord) -> Result<(), StoreError>;

    /// Drops `patch.removed`, overwrites the patched top-level document keys
    /// and refreshes `updated_at`. Never touches ingestion state or `created_at`.
    async fn update_resume(
        &self,
        user_id: Uuid,
        resume_id: Uuid,
        patch: &ResumePatch,
        at: DateTime<Utc>,
    ) -> Result<(), StoreError>;

    /// Starts a new ingestion attempt for `storage_path`: the record goes back
    /// to pending (`parsing_done = false`, no error).
    async fn attach_document(
        &self,
        user_id: Uuid,
        resume_id: Uuid,
        storage_path: &str,
        at: DateTime<Utc>,
    ) -> Result<(), StoreError>;

    /// The single terminal write of an ingestion attempt. Applies only while
    /// the record is still pending on the same `storage_path`; returns whether
    /// it did.
    async fn complete_ingestion(
        &self,
        resume_id: Uuid,
        storage_path: &str,
        result: &IngestionResult,
        at: DateTime<Utc>,
    ) -> Result<bool, StoreError>;

    /// Fails every attempt that has been pending since before `older_than`.
    /// Returns how many records were marked.
    async fn expire_pending(
        &self,
        older_than: DateTime<Utc>,
        message: &str,
        at: DateTime<Utc>,
    ) -> Result<u64, StoreError>;

    async fn subscribe(&self, user_id: Uuid, resume_id: Uuid) -> Result<Subscription, StoreError>;
}
