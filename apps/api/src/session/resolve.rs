//! Record Resolution Strategy: picks the one record a new session edits.
//!
//! First success wins:
//! 1. the user's stored pointer, if that record still exists;
//! 2. the user's most recently updated record;
//! 3. a fresh empty record, which also becomes the user's pointer.

use chrono::Utc;
use tracing::{info, warn};
use uuid::Uuid;

use crate::models::resume::ResumeRecord;
use crate::models::user::Identity;
use crate::resume::{normalize, to_document_value};
use crate::store::{ResumeStore, StoreError};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Resolution {
    Pointer(Uuid),
    MostRecent(Uuid),
    Created(Uuid),
}

impl Resolution {
    pub fn id(&self) -> Uuid {
        match self {
            Resolution::Pointer(id) | Resolution::MostRecent(id) | Resolution::Created(id) => *id,
        }
    }
}

pub async fn resolve_active_record(
    store: &dyn ResumeStore,
    identity: &Identity,
) -> Result<Resolution, StoreError> {
    let user_id = identity.user_id;

    let pointer = store
        .get_user(user_id)
        .await?
        .and_then(|user| user.latest_resume_id);
    if let Some(pointer) = pointer {
        if store.get_resume(user_id, pointer).await?.is_some() {
            return Ok(Resolution::Pointer(pointer));
        }
        warn!("User {user_id} points at missing résumé {pointer}; falling back");
    }

    if let Some(latest) = store.latest_resume(user_id).await? {
        return Ok(Resolution::MostRecent(latest.id));
    }

    let record = empty_record(identity)?;
    store.insert_resume(&record).await?;
    store.set_latest_resume(user_id, record.id).await?;
    info!("Created empty résumé {} for user {user_id}", record.id);
    Ok(Resolution::Created(record.id))
}

/// A blank draft seeded from the identity. It counts as already parsed:
/// there is nothing to ingest.
fn empty_record(identity: &Identity) -> Result<ResumeRecord, StoreError> {
    let now = Utc::now();
    let data = to_document_value(&normalize(None, identity))
        .map_err(|e| StoreError::Serialization(e.to_string()))?;
    Ok(ResumeRecord {
        id: Uuid::new_v4(),
        user_id: identity.user_id,
        data,
        parsing_done: true,
        parsing_error: None,
        storage_path: None,
        created_at: now,
        updated_at: now,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::memory::MemoryResumeStore;
    use chrono::Duration;
    use serde_json::json;

    fn identity() -> Identity {
        Identity {
            user_id: Uuid::new_v4(),
            display_name: Some("منى الأحمد".to_string()),
            email: Some("mona@example.com".to_string()),
        }
    }

    fn stored(user_id: Uuid, minutes_ago: i64) -> ResumeRecord {
        let at = Utc::now() - Duration::minutes(minutes_ago);
        ResumeRecord {
            id: Uuid::new_v4(),
            user_id,
            data: json!({}),
            parsing_done: true,
            parsing_error: None,
            storage_path: None,
            created_at: at,
            updated_at: at,
        }
    }

    #[tokio::test]
    async fn test_existing_pointer_wins() {
        let store = MemoryResumeStore::new();
        let who = identity();
        store.upsert_user(&who).await.unwrap();
        let older = stored(who.user_id, 60);
        let newer = stored(who.user_id, 1);
        store.seed(older.clone());
        store.seed(newer);
        store.set_latest_resume(who.user_id, older.id).await.unwrap();

        let resolution = resolve_active_record(&store, &who).await.unwrap();
        assert_eq!(resolution, Resolution::Pointer(older.id));
    }

    #[tokio::test]
    async fn test_dangling_pointer_falls_through_to_most_recent() {
        let store = MemoryResumeStore::new();
        let who = identity();
        store.upsert_user(&who).await.unwrap();
        store.set_latest_resume(who.user_id, Uuid::new_v4()).await.unwrap();
        let older = stored(who.user_id, 60);
        let newer = stored(who.user_id, 1);
        store.seed(older);
        store.seed(newer.clone());

        let resolution = resolve_active_record(&store, &who).await.unwrap();
        assert_eq!(resolution, Resolution::MostRecent(newer.id));
        assert_eq!(store.resumes_for(who.user_id).len(), 2);
    }

    #[tokio::test]
    async fn test_other_users_records_are_not_picked() {
        let store = MemoryResumeStore::new();
        let who = identity();
        store.upsert_user(&who).await.unwrap();
        store.seed(stored(Uuid::new_v4(), 1));

        let resolution = resolve_active_record(&store, &who).await.unwrap();
        assert!(matches!(resolution, Resolution::Created(_)));
    }

    #[tokio::test]
    async fn test_no_records_creates_seeded_draft_and_pointer() {
        let store = MemoryResumeStore::new();
        let who = identity();
        store.upsert_user(&who).await.unwrap();

        let resolution = resolve_active_record(&store, &who).await.unwrap();
        let Resolution::Created(id) = resolution else {
            panic!("expected a new record, got {resolution:?}");
        };

        let record = store.resume(id).unwrap();
        assert!(record.parsing_done);
        assert!(record.storage_path.is_none());
        assert_eq!(record.data["personalInfo"]["fullName"], json!("منى الأحمد"));
        assert_eq!(store.user(who.user_id).unwrap().latest_resume_id, Some(id));
    }

    #[tokio::test]
    async fn test_read_failure_is_reported() {
        let store = MemoryResumeStore::new();
        store.fail_reads(true);
        let result = resolve_active_record(&store, &identity()).await;
        assert!(matches!(result, Err(StoreError::Database(_))));
        assert_eq!(store.writes(), 0);
    }
}
