use axum::{extract::State, Json};
use serde::{Deserialize, Serialize};

use crate::enhance;
use crate::errors::AppError;
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct EnhanceTextRequest {
    pub text: String,
    pub job_description: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct EnhanceTextResponse {
    pub text: String,
}

#[derive(Debug, Deserialize)]
pub struct JobTitleRequest {
    pub job_title: String,
}

#[derive(Debug, Serialize)]
pub struct SkillsResponse {
    pub skills: Vec<String>,
}

#[derive(Debug, Serialize)]
pub struct SummaryResponse {
    pub summary: String,
}

/// POST /api/v1/enhance/text
pub async fn handle_enhance_text(
    State(state): State<AppState>,
    Json(req): Json<EnhanceTextRequest>,
) -> Result<Json<EnhanceTextResponse>, AppError> {
    let text =
        enhance::enhance_text(state.llm.as_ref(), &req.text, req.job_description.as_deref())
            .await?;
    Ok(Json(EnhanceTextResponse { text }))
}

/// POST /api/v1/enhance/skills
pub async fn handle_suggest_skills(
    State(state): State<AppState>,
    Json(req): Json<JobTitleRequest>,
) -> Result<Json<SkillsResponse>, AppError> {
    let skills = enhance::suggest_skills(state.llm.as_ref(), &req.job_title).await?;
    Ok(Json(SkillsResponse { skills }))
}

/// POST /api/v1/enhance/summary
pub async fn handle_suggest_summary(
    State(state): State<AppState>,
    Json(req): Json<JobTitleRequest>,
) -> Result<Json<SummaryResponse>, AppError> {
    let summary = enhance::suggest_summary(state.llm.as_ref(), &req.job_title).await?;
    Ok(Json(SummaryResponse { summary }))
}
