use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct User {
    pub id: Uuid,
    pub display_name: Option<String>,
    pub email: Option<String>,
    /// The résumé the user should resume editing on next sign-in.
    pub latest_resume_id: Option<Uuid>,
    pub created_at: DateTime<Utc>,
}

/// What the auth layer tells us about the signed-in user.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Identity {
    pub user_id: Uuid,
    pub display_name: Option<String>,
    pub email: Option<String>,
}
