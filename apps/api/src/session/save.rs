//! Edit/Save Controller: pushes the local form back into the store.
//!
//! No record id on the form means creation: a new record with full metadata,
//! marked parsed (a manual entry has nothing to ingest), and the user's
//! pointer moves to it. Otherwise it is an update of the logical fields that
//! differ from `baseline` plus a refreshed `updated_at`; ingestion state and
//! `created_at` are never written here. A record still stored in an older
//! schema is rewritten whole in the current one, legacy keys removed, so a
//! field cleared in the form cannot resurface from an old spelling.
//!
//! Concurrent saves of one record are not de-duplicated; the session actor
//! runs them one at a time.

use chrono::Utc;
use serde::Serialize;
use serde_json::Value;
use tracing::{debug, info};
use uuid::Uuid;

use crate::errors::AppError;
use crate::models::resume::{ResumePatch, ResumeRecord};
use crate::models::user::Identity;
use crate::resume::form::validate_form;
use crate::resume::normalize::is_current_schema;
use crate::resume::{to_document_value, FormState};
use crate::store::{ResumeStore, StoreError};

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SaveReceipt {
    pub record_id: Uuid,
    pub created: bool,
    /// Top-level document keys that were written.
    pub changed_fields: Vec<String>,
}

pub async fn save_form(
    store: &dyn ResumeStore,
    identity: &Identity,
    form: &FormState,
    baseline: Option<&FormState>,
) -> Result<SaveReceipt, AppError> {
    validate_form(form).map_err(|problems| AppError::Validation(problems.join("; ")))?;

    let document = encode(form)?;
    let now = Utc::now();

    let Some(record_id) = form.record_id else {
        let record = ResumeRecord {
            id: Uuid::new_v4(),
            user_id: identity.user_id,
            data: document,
            parsing_done: true,
            parsing_error: None,
            storage_path: None,
            created_at: now,
            updated_at: now,
        };
        store.insert_resume(&record).await?;
        store.set_latest_resume(identity.user_id, record.id).await?;
        info!("Created résumé {} for user {}", record.id, identity.user_id);

        return Ok(SaveReceipt {
            record_id: record.id,
            created: true,
            changed_fields: keys_of(&record.data),
        });
    };

    let stored = store
        .get_resume(identity.user_id, record_id)
        .await?
        .ok_or(StoreError::ResumeNotFound(record_id))?;
    let patch = if is_current_schema(&stored.data) {
        let baseline = baseline.map(encode).transpose()?;
        diff(&document, baseline.as_ref())
    } else {
        info!("Rewriting résumé {record_id} in the current schema");
        rewrite(&document, &stored.data)
    };
    if patch.is_empty() {
        debug!("Save of résumé {record_id} changes no fields");
    }
    let changed_fields = patch.fields.keys().cloned().collect();
    store
        .update_resume(identity.user_id, record_id, &patch, now)
        .await?;

    Ok(SaveReceipt {
        record_id,
        created: false,
        changed_fields,
    })
}

fn encode(form: &FormState) -> Result<Value, AppError> {
    to_document_value(form).map_err(|e| AppError::Internal(e.into()))
}

/// Top-level keys of `current` whose value differs from `baseline`. Without
/// a baseline every key counts as changed.
fn diff(current: &Value, baseline: Option<&Value>) -> ResumePatch {
    let mut patch = ResumePatch::default();
    let Some(current) = current.as_object() else {
        return patch;
    };
    for (key, value) in current {
        let unchanged = baseline.and_then(|b| b.get(key)) == Some(value);
        if !unchanged {
            patch.fields.insert(key.clone(), value.clone());
        }
    }
    patch
}

/// The whole of `current`, dropping every stored key it does not carry.
fn rewrite(current: &Value, stored: &Value) -> ResumePatch {
    let fields = current.as_object().cloned().unwrap_or_default();
    let removed = stored
        .as_object()
        .map(|obj| {
            obj.keys()
                .filter(|key| !fields.contains_key(*key))
                .cloned()
                .collect()
        })
        .unwrap_or_default();
    ResumePatch { fields, removed }
}

fn keys_of(value: &Value) -> Vec<String> {
    value
        .as_object()
        .map(|obj| obj.keys().cloned().collect())
        .unwrap_or_default()
}
