use std::convert::Infallible;

use axum::{
    extract::{Multipart, Path, State},
    http::StatusCode,
    response::sse::{Event, KeepAlive, Sse},
    Json,
};
use futures::stream::{self, Stream, StreamExt};
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast::error::RecvError;
use tracing::warn;
use uuid::Uuid;

use crate::errors::AppError;
use crate::ingest::upload::UploadedFile;
use crate::models::user::Identity;
use crate::resume::FormState;
use crate::session::events::{messages, Notification, SessionEvent};
use crate::session::save::SaveReceipt;
use crate::session::sync::ConflictPolicy;
use crate::session::SessionView;
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct CreateSessionRequest {
    #[serde(flatten)]
    pub identity: Identity,
    #[serde(default)]
    pub policy: ConflictPolicy,
}

#[derive(Debug, Deserialize)]
pub struct ConflictDecision {
    pub accept: bool,
}

#[derive(Debug, Deserialize)]
pub struct SwitchRequest {
    pub resume_id: Uuid,
}

#[derive(Debug, Serialize)]
pub struct UploadAccepted {
    pub resume_id: Uuid,
    pub storage_path: String,
}

/// POST /api/v1/sessions
pub async fn handle_create_session(
    State(state): State<AppState>,
    Json(req): Json<CreateSessionRequest>,
) -> Result<(StatusCode, Json<SessionView>), AppError> {
    let handle = state
        .sessions
        .open(state.store.clone(), req.identity, req.policy)
        .await?;
    let view = handle.view().await?;
    Ok((StatusCode::CREATED, Json(view)))
}

/// GET /api/v1/sessions/:id
pub async fn handle_get_session(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<SessionView>, AppError> {
    let handle = state.sessions.get(id).await?;
    Ok(Json(handle.view().await?))
}

/// DELETE /api/v1/sessions/:id
pub async fn handle_close_session(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<StatusCode, AppError> {
    state.sessions.close(id).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// GET /api/v1/sessions/:id/events
///
/// Starts with the current phase and form, then streams live events.
pub async fn handle_session_events(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Sse<impl Stream<Item = Result<Event, Infallible>>>, AppError> {
    let handle = state.sessions.get(id).await?;
    // Subscribe before taking the view so nothing falls between the two.
    let rx = handle.subscribe_events();
    let view = handle.view().await?;

    let mut initial = vec![
        SessionEvent::Phase { phase: view.phase },
        SessionEvent::FormReplaced { form: view.form },
    ];
    if let Some(incoming) = view.conflict {
        initial.push(SessionEvent::ConflictDetected { incoming });
    }

    let live = stream::unfold(rx, move |mut rx| async move {
        loop {
            match rx.recv().await {
                Ok(event) => return Some((event, rx)),
                Err(RecvError::Lagged(skipped)) => {
                    warn!("Event stream for session {id} skipped {skipped} events");
                }
                Err(RecvError::Closed) => return None,
            }
        }
    });

    let events = stream::iter(initial)
        .chain(live)
        .map(|event| Ok(to_sse(&event)));
    Ok(Sse::new(events).keep_alive(KeepAlive::default()))
}

fn to_sse(event: &SessionEvent) -> Event {
    let sse = Event::default().event(event.name());
    match serde_json::to_string(event) {
        Ok(json) => sse.data(json),
        Err(e) => {
            warn!("Could not encode {} event: {e}", event.name());
            sse.comment("encoding error")
        }
    }
}

/// PUT /api/v1/sessions/:id/form
pub async fn handle_edit_form(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(form): Json<FormState>,
) -> Result<StatusCode, AppError> {
    state.sessions.get(id).await?.edit(form).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// POST /api/v1/sessions/:id/conflict
pub async fn handle_resolve_conflict(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(req): Json<ConflictDecision>,
) -> Result<StatusCode, AppError> {
    state
        .sessions
        .get(id)
        .await?
        .resolve_conflict(req.accept)
        .await?;
    Ok(StatusCode::NO_CONTENT)
}

/// POST /api/v1/sessions/:id/save
pub async fn handle_save(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<SaveReceipt>, AppError> {
    let receipt = state.sessions.get(id).await?.save().await?;
    Ok(Json(receipt))
}

/// POST /api/v1/sessions/:id/switch
pub async fn handle_switch(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(req): Json<SwitchRequest>,
) -> Result<Json<SessionView>, AppError> {
    let handle = state.sessions.get(id).await?;
    handle.switch(req.resume_id).await?;
    Ok(Json(handle.view().await?))
}

/// POST /api/v1/sessions/:id/resubscribe
pub async fn handle_resubscribe(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<SessionView>, AppError> {
    let handle = state.sessions.get(id).await?;
    handle.resubscribe().await?;
    Ok(Json(handle.view().await?))
}

/// POST /api/v1/sessions/:id/upload
///
/// Multipart body with a single `file` field. Byte progress is streamed on
/// the session's event stream.
pub async fn handle_upload(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    mut multipart: Multipart,
) -> Result<Json<UploadAccepted>, AppError> {
    let handle = state.sessions.get(id).await?;
    let view = handle.view().await?;
    let resume_id = view
        .phase
        .record_id()
        .ok_or_else(|| AppError::Validation("Session has no active résumé".to_string()))?;

    let result = async {
        let file = read_file_field(&mut multipart).await?;
        let reporter = handle.clone();
        let progress = move |bytes_sent: u64, total_bytes: u64| {
            reporter.publish(SessionEvent::UploadProgress {
                bytes_sent,
                total_bytes,
            })
        };
        state
            .ingestion
            .upload(view.user_id, resume_id, file, &progress)
            .await
    }
    .await;

    match result {
        Ok(storage_path) => Ok(Json(UploadAccepted {
            resume_id,
            storage_path,
        })),
        Err(e) => {
            handle.publish(SessionEvent::Notification {
                notification: Notification::error(messages::UPLOAD_FAILED),
            });
            Err(e)
        }
    }
}

async fn read_file_field(multipart: &mut Multipart) -> Result<UploadedFile, AppError> {
    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| AppError::Validation(format!("Malformed upload: {e}")))?
    {
        if field.name() != Some("file") {
            continue;
        }
        let file_name = field.file_name().map(String::from);
        let content_type = field.content_type().map(String::from);
        let bytes = field
            .bytes()
            .await
            .map_err(|e| AppError::Validation(format!("Malformed upload: {e}")))?;
        return Ok(UploadedFile {
            file_name,
            content_type,
            bytes,
        });
    }
    Err(AppError::Validation(
        "Missing multipart field 'file'".to_string(),
    ))
}
