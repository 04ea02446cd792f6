use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use sqlx::FromRow;
use uuid::Uuid;

/// One persisted résumé document.
///
/// `data` is kept loosely typed: rows written by older pipeline revisions use
/// different key spellings, and only the normalizer decides what they mean.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, FromRow)]
pub struct ResumeRecord {
    pub id: Uuid,
    pub user_id: Uuid,
    pub data: Value,
    pub parsing_done: bool,
    pub parsing_error: Option<String>,
    pub storage_path: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Top-level document keys to overwrite on an update. Keys absent from the
/// patch keep their stored value.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ResumePatch {
    pub fields: Map<String, Value>,
    /// Top-level keys dropped before `fields` are merged in. Used to retire
    /// legacy spellings when a record is rewritten in the current schema.
    pub removed: Vec<String>,
}

impl ResumePatch {
    pub fn is_empty(&self) -> bool {
        self.fields.is_empty() && self.removed.is_empty()
    }

    pub fn into_value(self) -> Value {
        Value::Object(self.fields)
    }
}

/// The pipeline's terminal result for one ingestion attempt.
#[derive(Debug, Clone, PartialEq)]
pub enum IngestionResult {
    /// The extracted document in the current schema. Replaces the stored
    /// document wholesale.
    Parsed(Value),
    /// User-facing failure message.
    Failed(String),
}
