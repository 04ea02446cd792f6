//! In-memory `ResumeStore` for tests. Mirrors the PostgreSQL semantics,
//! including the conditional terminal write and write-ordered snapshots.

use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::Value;
use tokio::sync::mpsc;
use uuid::Uuid;

use crate::models::resume::{IngestionResult, ResumePatch, ResumeRecord};
use crate::models::user::{Identity, User};
use crate::store::{ResumeStore, SnapshotEvent, StoreError, Subscription};

type Watcher = (Uuid, mpsc::Sender<Result<SnapshotEvent, StoreError>>);

#[derive(Default)]
struct Inner {
    users: HashMap<Uuid, User>,
    resumes: HashMap<Uuid, ResumeRecord>,
    started: HashMap<Uuid, DateTime<Utc>>,
    watchers: Vec<Watcher>,
    fail_reads: bool,
    writes: usize,
}

#[derive(Default)]
pub struct MemoryResumeStore {
    inner: Mutex<Inner>,
}

impl MemoryResumeStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn resume(&self, id: Uuid) -> Option<ResumeRecord> {
        self.inner.lock().unwrap().resumes.get(&id).cloned()
    }

    pub fn resumes_for(&self, user_id: Uuid) -> Vec<ResumeRecord> {
        self.inner
            .lock()
            .unwrap()
            .resumes
            .values()
            .filter(|r| r.user_id == user_id)
            .cloned()
            .collect()
    }

    pub fn user(&self, id: Uuid) -> Option<User> {
        self.inner.lock().unwrap().users.get(&id).cloned()
    }

    /// Number of successful writes so far.
    pub fn writes(&self) -> usize {
        self.inner.lock().unwrap().writes
    }

    /// Makes every subsequent read fail with a database error.
    pub fn fail_reads(&self, fail: bool) {
        self.inner.lock().unwrap().fail_reads = fail;
    }

    /// Removes a record and tells its subscribers.
    pub fn delete(&self, id: Uuid) {
        let mut inner = self.inner.lock().unwrap();
        inner.resumes.remove(&id);
        broadcast(&mut inner, id, Ok(SnapshotEvent::Missing));
    }

    /// Pushes a transport failure to every subscriber of `id`.
    pub fn break_subscriptions(&self, id: Uuid) {
        let mut inner = self.inner.lock().unwrap();
        broadcast(
            &mut inner,
            id,
            Err(StoreError::Subscription("connection reset".to_string())),
        );
    }

    /// Inserts a record as-is, bypassing the trait (no pointer updates).
    pub fn seed(&self, record: ResumeRecord) {
        let mut inner = self.inner.lock().unwrap();
        let id = record.id;
        inner.resumes.insert(id, record.clone());
        broadcast(&mut inner, id, Ok(SnapshotEvent::Updated(record)));
    }

    /// Backdates when the current ingestion attempt of `id` started.
    pub fn backdate_attempt(&self, id: Uuid, started: DateTime<Utc>) {
        self.inner.lock().unwrap().started.insert(id, started);
    }
}

fn broadcast(inner: &mut Inner, id: Uuid, event: Result<SnapshotEvent, StoreError>) {
    inner.watchers.retain(|(watched, tx)| {
        if *watched != id {
            return !tx.is_closed();
        }
        let event = match &event {
            Ok(e) => Ok(e.clone()),
            Err(e) => Err(StoreError::Subscription(e.to_string())),
        };
        tx.try_send(event).is_ok()
    });
}

fn changed(inner: &mut Inner, id: Uuid) {
    inner.writes += 1;
    if let Some(record) = inner.resumes.get(&id).cloned() {
        broadcast(inner, id, Ok(SnapshotEvent::Updated(record)));
    }
}

fn read_guard(inner: &Inner) -> Result<(), StoreError> {
    if inner.fail_reads {
        return Err(StoreError::Database(sqlx::Error::PoolTimedOut));
    }
    Ok(())
}

fn merge(data: &mut Value, fields: &Value) {
    if !data.is_object() {
        *data = Value::Object(Default::default());
    }
    if let (Some(target), Some(source)) = (data.as_object_mut(), fields.as_object()) {
        for (k, v) in source {
            target.insert(k.clone(), v.clone());
        }
    }
}

#[async_trait]
impl ResumeStore for MemoryResumeStore {
    async fn upsert_user(&self, identity: &Identity) -> Result<User, StoreError> {
        let mut inner = self.inner.lock().unwrap();
        read_guard(&inner)?;
        let user = inner.users.entry(identity.user_id).or_insert_with(|| User {
            id: identity.user_id,
            display_name: None,
            email: None,
            latest_resume_id: None,
            created_at: Utc::now(),
        });
        if identity.display_name.is_some() {
            user.display_name = identity.display_name.clone();
        }
        if identity.email.is_some() {
            user.email = identity.email.clone();
        }
        Ok(user.clone())
    }

    async fn get_user(&self, user_id: Uuid) -> Result<Option<User>, StoreError> {
        let inner = self.inner.lock().unwrap();
        read_guard(&inner)?;
        Ok(inner.users.get(&user_id).cloned())
    }

    async fn set_latest_resume(&self, user_id: Uuid, resume_id: Uuid) -> Result<(), StoreError> {
        let mut inner = self.inner.lock().unwrap();
        let user = inner
            .users
            .get_mut(&user_id)
            .ok_or(StoreError::UserNotFound(user_id))?;
        user.latest_resume_id = Some(resume_id);
        inner.writes += 1;
        Ok(())
    }

    async fn get_resume(
        &self,
        user_id: Uuid,
        resume_id: Uuid,
    ) -> Result<Option<ResumeRecord>, StoreError> {
        let inner = self.inner.lock().unwrap();
        read_guard(&inner)?;
        Ok(inner
            .resumes
            .get(&resume_id)
            .filter(|r| r.user_id == user_id)
            .cloned())
    }

    async fn latest_resume(&self, user_id: Uuid) -> Result<Option<ResumeRecord>, StoreError> {
        let inner = self.inner.lock().unwrap();
        read_guard(&inner)?;
        Ok(inner
            .resumes
            .values()
            .filter(|r| r.user_id == user_id)
            .max_by_key(|r| r.updated_at)
            .cloned())
    }

    async fn insert_resume(&self, record: &ResumeRecord) -> Result<(), StoreError> {
        let mut inner = self.inner.lock().unwrap();
        if record.storage_path.is_some() {
            inner.started.insert(record.id, record.updated_at);
        }
        inner.resumes.insert(record.id, record.clone());
        changed(&mut inner, record.id);
        Ok(())
    }

    async fn update_resume(
        &self,
        user_id: Uuid,
        resume_id: Uuid,
        patch: &ResumePatch,
        at: DateTime<Utc>,
    ) -> Result<(), StoreError> {
        let mut inner = self.inner.lock().unwrap();
        let record = inner
            .resumes
            .get_mut(&resume_id)
            .filter(|r| r.user_id == user_id)
            .ok_or(StoreError::ResumeNotFound(resume_id))?;
        if let Some(data) = record.data.as_object_mut() {
            for key in &patch.removed {
                data.remove(key);
            }
        }
        merge(&mut record.data, &patch.clone().into_value());
        record.updated_at = record.updated_at.max(at);
        changed(&mut inner, resume_id);
        Ok(())
    }

    async fn attach_document(
        &self,
        user_id: Uuid,
        resume_id: Uuid,
        storage_path: &str,
        at: DateTime<Utc>,
    ) -> Result<(), StoreError> {
        let mut inner = self.inner.lock().unwrap();
        let record = inner
            .resumes
            .get_mut(&resume_id)
            .filter(|r| r.user_id == user_id)
            .ok_or(StoreError::ResumeNotFound(resume_id))?;
        record.storage_path = Some(storage_path.to_string());
        record.parsing_done = false;
        record.parsing_error = None;
        record.updated_at = record.updated_at.max(at);
        inner.started.insert(resume_id, at);
        changed(&mut inner, resume_id);
        Ok(())
    }

    async fn complete_ingestion(
        &self,
        resume_id: Uuid,
        storage_path: &str,
        result: &IngestionResult,
        at: DateTime<Utc>,
    ) -> Result<bool, StoreError> {
        let mut inner = self.inner.lock().unwrap();
        let Some(record) = inner.resumes.get_mut(&resume_id) else {
            return Ok(false);
        };
        let pending = record.storage_path.as_deref() == Some(storage_path)
            && !record.parsing_done
            && record.parsing_error.is_none();
        if !pending {
            return Ok(false);
        }
        match result {
            IngestionResult::Parsed(fields) => {
                record.data = fields.clone();
                record.parsing_done = true;
            }
            IngestionResult::Failed(message) => record.parsing_error = Some(message.clone()),
        }
        record.updated_at = record.updated_at.max(at);
        changed(&mut inner, resume_id);
        Ok(true)
    }

    async fn expire_pending(
        &self,
        older_than: DateTime<Utc>,
        message: &str,
        at: DateTime<Utc>,
    ) -> Result<u64, StoreError> {
        let mut inner = self.inner.lock().unwrap();
        let stale: Vec<Uuid> = inner
            .resumes
            .values()
            .filter(|r| r.storage_path.is_some() && !r.parsing_done && r.parsing_error.is_none())
            .filter(|r| inner.started.get(&r.id).is_some_and(|s| *s < older_than))
            .map(|r| r.id)
            .collect();
        for id in &stale {
            if let Some(record) = inner.resumes.get_mut(id) {
                record.parsing_error = Some(message.to_string());
                record.updated_at = record.updated_at.max(at);
            }
            changed(&mut inner, *id);
        }
        Ok(stale.len() as u64)
    }

    async fn subscribe(&self, user_id: Uuid, resume_id: Uuid) -> Result<Subscription, StoreError> {
        let mut inner = self.inner.lock().unwrap();
        read_guard(&inner)?;
        let (tx, rx) = mpsc::channel(64);
        let first = match inner.resumes.get(&resume_id).filter(|r| r.user_id == user_id) {
            Some(record) => SnapshotEvent::Updated(record.clone()),
            None => SnapshotEvent::Missing,
        };
        // Capacity is fresh, so this cannot fail.
        let _ = tx.try_send(Ok(first));
        inner.watchers.push((resume_id, tx));
        Ok(Subscription::new(rx, None))
    }
}
