use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::postgres::PgListener;
use sqlx::PgPool;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::models::resume::{IngestionResult, ResumePatch, ResumeRecord};
use crate::models::user::{Identity, User};
use crate::store::{ResumeStore, SnapshotEvent, StoreError, Subscription};

/// Channel the `resumes` row trigger notifies on. Payload is the record id.
pub const CHANGE_CHANNEL: &str = "resume_changes";

const RESUME_COLUMNS: &str = "id, user_id, data, parsing_done, parsing_error, storage_path, \
                              created_at, updated_at";

/// PostgreSQL-backed store. Live subscriptions ride on LISTEN/NOTIFY.
#[derive(Clone)]
pub struct PgResumeStore {
    pool: PgPool,
}

impl PgResumeStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

async fn fetch_resume(
    pool: &PgPool,
    user_id: Uuid,
    resume_id: Uuid,
) -> Result<Option<ResumeRecord>, StoreError> {
    Ok(sqlx::query_as::<_, ResumeRecord>(&format!(
        "SELECT {RESUME_COLUMNS} FROM resumes WHERE id = $1 AND user_id = $2"
    ))
    .bind(resume_id)
    .bind(user_id)
    .fetch_optional(pool)
    .await?)
}

#[async_trait]
impl ResumeStore for PgResumeStore {
    async fn upsert_user(&self, identity: &Identity) -> Result<User, StoreError> {
        Ok(sqlx::query_as::<_, User>(
            r#"
            INSERT INTO users (id, display_name, email)
            VALUES ($1, $2, $3)
            ON CONFLICT (id) DO UPDATE
                SET display_name = COALESCE(EXCLUDED.display_name, users.display_name),
                    email = COALESCE(EXCLUDED.email, users.email)
            RETURNING id, display_name, email, latest_resume_id, created_at
            "#,
        )
        .bind(identity.user_id)
        .bind(&identity.display_name)
        .bind(&identity.email)
        .fetch_one(&self.pool)
        .await?)
    }

    async fn get_user(&self, user_id: Uuid) -> Result<Option<User>, StoreError> {
        Ok(sqlx::query_as::<_, User>(
            "SELECT id, display_name, email, latest_resume_id, created_at FROM users WHERE id = $1",
        )
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await?)
    }

    async fn set_latest_resume(&self, user_id: Uuid, resume_id: Uuid) -> Result<(), StoreError> {
        let result = sqlx::query("UPDATE users SET latest_resume_id = $1 WHERE id = $2")
            .bind(resume_id)
            .bind(user_id)
            .execute(&self.pool)
            .await?;
        if result.rows_affected() == 0 {
            return Err(StoreError::UserNotFound(user_id));
        }
        Ok(())
    }

    async fn get_resume(
        &self,
        user_id: Uuid,
        resume_id: Uuid,
    ) -> Result<Option<ResumeRecord>, StoreError> {
        fetch_resume(&self.pool, user_id, resume_id).await
    }

    async fn latest_resume(&self, user_id: Uuid) -> Result<Option<ResumeRecord>, StoreError> {
        Ok(sqlx::query_as::<_, ResumeRecord>(&format!(
            "SELECT {RESUME_COLUMNS} FROM resumes WHERE user_id = $1 \
             ORDER BY updated_at DESC LIMIT 1"
        ))
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await?)
    }

    async fn insert_resume(&self, record: &ResumeRecord) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            INSERT INTO resumes
                (id, user_id, data, parsing_done, parsing_error, storage_path,
                 ingestion_started_at, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
            "#,
        )
        .bind(record.id)
        .bind(record.user_id)
        .bind(&record.data)
        .bind(record.parsing_done)
        .bind(&record.parsing_error)
        .bind(&record.storage_path)
        .bind(record.storage_path.as_ref().map(|_| record.updated_at))
        .bind(record.created_at)
        .bind(record.updated_at)
        .execute(&self.pool)
        .await?;

        info!("Inserted résumé {} for user {}", record.id, record.user_id);
        Ok(())
    }

    async fn update_resume(
        &self,
        user_id: Uuid,
        resume_id: Uuid,
        patch: &ResumePatch,
        at: DateTime<Utc>,
    ) -> Result<(), StoreError> {
        let result = sqlx::query(
            r#"
            UPDATE resumes
            SET data = (data - $5::text[]) || $3,
                updated_at = GREATEST(updated_at, $4)
            WHERE id = $1 AND user_id = $2
            "#,
        )
        .bind(resume_id)
        .bind(user_id)
        .bind(patch.clone().into_value())
        .bind(at)
        .bind(&patch.removed)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(StoreError::ResumeNotFound(resume_id));
        }
        debug!(
            "Updated résumé {resume_id}: {} field(s) changed",
            patch.fields.len()
        );
        Ok(())
    }

    async fn attach_document(
        &self,
        user_id: Uuid,
        resume_id: Uuid,
        storage_path: &str,
        at: DateTime<Utc>,
    ) -> Result<(), StoreError> {
        let result = sqlx::query(
            r#"
            UPDATE resumes
            SET storage_path = $3,
                parsing_done = FALSE,
                parsing_error = NULL,
                ingestion_started_at = $4,
                updated_at = GREATEST(updated_at, $4)
            WHERE id = $1 AND user_id = $2
            "#,
        )
        .bind(resume_id)
        .bind(user_id)
        .bind(storage_path)
        .bind(at)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(StoreError::ResumeNotFound(resume_id));
        }
        info!("Résumé {resume_id} is now pending ingestion of {storage_path}");
        Ok(())
    }

    async fn complete_ingestion(
        &self,
        resume_id: Uuid,
        storage_path: &str,
        result: &IngestionResult,
        at: DateTime<Utc>,
    ) -> Result<bool, StoreError> {
        // Only the first terminal write of an attempt lands.
        let query = match result {
            IngestionResult::Parsed(fields) => sqlx::query(
                r#"
                UPDATE resumes
                SET data = $3,
                    parsing_done = TRUE,
                    parsing_error = NULL,
                    updated_at = GREATEST(updated_at, $4)
                WHERE id = $1 AND storage_path = $2
                  AND parsing_done = FALSE AND parsing_error IS NULL
                "#,
            )
            .bind(resume_id)
            .bind(storage_path)
            .bind(fields.clone())
            .bind(at),
            IngestionResult::Failed(message) => sqlx::query(
                r#"
                UPDATE resumes
                SET parsing_error = $3,
                    updated_at = GREATEST(updated_at, $4)
                WHERE id = $1 AND storage_path = $2
                  AND parsing_done = FALSE AND parsing_error IS NULL
                "#,
            )
            .bind(resume_id)
            .bind(storage_path)
            .bind(message.clone())
            .bind(at),
        };

        let applied = query.execute(&self.pool).await?.rows_affected() > 0;
        if !applied {
            warn!("Terminal write for résumé {resume_id} ({storage_path}) was superseded");
        }
        Ok(applied)
    }

    async fn expire_pending(
        &self,
        older_than: DateTime<Utc>,
        message: &str,
        at: DateTime<Utc>,
    ) -> Result<u64, StoreError> {
        let result = sqlx::query(
            r#"
            UPDATE resumes
            SET parsing_error = $1,
                updated_at = GREATEST(updated_at, $3)
            WHERE storage_path IS NOT NULL
              AND parsing_done = FALSE AND parsing_error IS NULL
              AND ingestion_started_at < $2
            "#,
        )
        .bind(message)
        .bind(older_than)
        .bind(at)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected())
    }

    async fn subscribe(&self, user_id: Uuid, resume_id: Uuid) -> Result<Subscription, StoreError> {
        // LISTEN before the initial read so no write can fall between the two.
        let mut listener = PgListener::connect_with(&self.pool).await?;
        listener.listen(CHANGE_CHANNEL).await?;
        let initial = fetch_resume(&self.pool, user_id, resume_id).await?;

        let (tx, rx) = mpsc::channel(16);
        let pool = self.pool.clone();
        let wanted = resume_id.to_string();

        let feeder = tokio::spawn(async move {
            let first = match initial {
                Some(record) => SnapshotEvent::Updated(record),
                None => SnapshotEvent::Missing,
            };
            if tx.send(Ok(first)).await.is_err() {
                return;
            }

            loop {
                let notification = match listener.recv().await {
                    Ok(n) => n,
                    Err(e) => {
                        let _ = tx.send(Err(StoreError::Subscription(e.to_string()))).await;
                        return;
                    }
                };
                if notification.payload() != wanted {
                    continue;
                }

                let event = match fetch_resume(&pool, user_id, resume_id).await {
                    Ok(Some(record)) => Ok(SnapshotEvent::Updated(record)),
                    Ok(None) => Ok(SnapshotEvent::Missing),
                    Err(e) => Err(e),
                };
                let failed = event.is_err();
                if tx.send(event).await.is_err() || failed {
                    return;
                }
            }
        });

        debug!("Subscribed to résumé {resume_id} for user {user_id}");
        Ok(Subscription::new(rx, Some(feeder)))
    }
}
