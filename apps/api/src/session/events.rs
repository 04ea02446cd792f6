use serde::Serialize;
use uuid::Uuid;

use crate::resume::FormState;

/// User-facing notification texts. The editor is Arabic-only.
pub mod messages {
    pub const PARSE_SUCCEEDED: &str =
        "تم تحليل السيرة الذاتية بنجاح. راجع الحقول وعدّلها عند الحاجة.";
    pub const PARSE_FAILED: &str = "تعذّر تحليل الملف. يمكنك تعبئة النموذج يدوياً.";
    pub const CONNECTION_LOST: &str = "انقطع الاتصال بالخادم. بياناتك الحالية محفوظة في النموذج.";
    pub const LOAD_FAILED: &str = "تعذّر تحميل سيرتك الذاتية. حاول مرة أخرى.";
    pub const RECORD_VANISHED: &str = "لم تعد هذه السيرة الذاتية موجودة، جارٍ تحميل أحدث نسخة.";
    pub const SAVED: &str = "تم حفظ السيرة الذاتية.";
    pub const SAVE_FAILED: &str = "تعذّر حفظ التغييرات.";
    pub const UPLOAD_FAILED: &str = "تعذّر رفع الملف.";
    pub const PIPELINE_TIMED_OUT: &str = "استغرق تحليل الملف وقتاً أطول من المسموح.";
}

/// Ingestion status of the subscribed record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncStatus {
    Idle,
    Pending,
    Done,
    Errored,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum SessionPhase {
    ResolvingRecord,
    /// Resolution failed; nothing is loaded but the user can still edit.
    Unresolved,
    Subscribed {
        record_id: Uuid,
        status: SyncStatus,
    },
    /// The live feed broke. The last good form stays in place.
    Detached {
        record_id: Uuid,
    },
    Closed,
}

impl SessionPhase {
    pub fn record_id(&self) -> Option<Uuid> {
        match self {
            SessionPhase::Subscribed { record_id, .. } | SessionPhase::Detached { record_id } => {
                Some(*record_id)
            }
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum NotificationLevel {
    Success,
    Info,
    Error,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Notification {
    pub level: NotificationLevel,
    pub message: String,
}

impl Notification {
    pub fn success(message: impl Into<String>) -> Self {
        Self {
            level: NotificationLevel::Success,
            message: message.into(),
        }
    }

    pub fn info(message: impl Into<String>) -> Self {
        Self {
            level: NotificationLevel::Info,
            message: message.into(),
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self {
            level: NotificationLevel::Error,
            message: message.into(),
        }
    }
}

/// Everything a session tells its client, in order.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum SessionEvent {
    Phase { phase: SessionPhase },
    FormReplaced { form: FormState },
    /// A snapshot arrived while the form had unsaved edits.
    ConflictDetected { incoming: FormState },
    /// Estimated backend processing progress, 0–100.
    Progress { percent: u8 },
    /// Bytes transferred to object storage for the current upload.
    UploadProgress { bytes_sent: u64, total_bytes: u64 },
    Notification { notification: Notification },
}

impl SessionEvent {
    /// SSE event name.
    pub fn name(&self) -> &'static str {
        match self {
            SessionEvent::Phase { .. } => "phase",
            SessionEvent::FormReplaced { .. } => "form",
            SessionEvent::ConflictDetected { .. } => "conflict",
            SessionEvent::Progress { .. } => "progress",
            SessionEvent::UploadProgress { .. } => "upload",
            SessionEvent::Notification { .. } => "notification",
        }
    }
}
