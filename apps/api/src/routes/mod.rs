pub mod enhance;
pub mod health;
pub mod sessions;

use anyhow::{Context, Result};
use axum::{
    extract::DefaultBodyLimit,
    http::HeaderValue,
    routing::{get, post, put},
    Router,
};
use tower_http::cors::{AllowOrigin, Any, CorsLayer};

use crate::state::AppState;

/// Room for multipart framing around the file itself.
const MULTIPART_OVERHEAD: usize = 64 * 1024;

pub fn build_router(state: AppState) -> Router {
    let upload_limit = state.config.max_upload_bytes + MULTIPART_OVERHEAD;

    Router::new()
        .route("/health", get(health::health_handler))
        // Editing sessions
        .route("/api/v1/sessions", post(sessions::handle_create_session))
        .route(
            "/api/v1/sessions/:id",
            get(sessions::handle_get_session).delete(sessions::handle_close_session),
        )
        .route(
            "/api/v1/sessions/:id/events",
            get(sessions::handle_session_events),
        )
        .route("/api/v1/sessions/:id/form", put(sessions::handle_edit_form))
        .route(
            "/api/v1/sessions/:id/conflict",
            post(sessions::handle_resolve_conflict),
        )
        .route("/api/v1/sessions/:id/save", post(sessions::handle_save))
        .route(
            "/api/v1/sessions/:id/upload",
            post(sessions::handle_upload).layer(DefaultBodyLimit::max(upload_limit)),
        )
        .route("/api/v1/sessions/:id/switch", post(sessions::handle_switch))
        .route(
            "/api/v1/sessions/:id/resubscribe",
            post(sessions::handle_resubscribe),
        )
        // Generative enhancement
        .route("/api/v1/enhance/text", post(enhance::handle_enhance_text))
        .route("/api/v1/enhance/skills", post(enhance::handle_suggest_skills))
        .route(
            "/api/v1/enhance/summary",
            post(enhance::handle_suggest_summary),
        )
        .with_state(state)
}

/// CORS for the editor. No configured origins means any origin is allowed.
pub fn cors_layer(origins: &[String]) -> Result<CorsLayer> {
    if origins.is_empty() {
        return Ok(CorsLayer::permissive());
    }
    let origins = origins
        .iter()
        .map(|origin| {
            origin
                .parse::<HeaderValue>()
                .with_context(|| format!("CORS_ORIGINS has invalid origin '{origin}'"))
        })
        .collect::<Result<Vec<_>>>()?;
    Ok(CorsLayer::new()
        .allow_origin(AllowOrigin::list(origins))
        .allow_methods(Any)
        .allow_headers(Any))
}
