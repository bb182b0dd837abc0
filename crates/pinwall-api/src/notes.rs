use axum::{
    Extension, Json,
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
};
use uuid::Uuid;

use pinwall_core::error::PanelError;
use pinwall_core::ratelimit::Category;
use pinwall_types::api::{Claims, CreateNoteRequest, MoveNoteRequest};
use pinwall_types::events::PanelEvent;

use crate::auth::AppState;
use crate::error::ApiError;
use crate::panels::normalize_code;

/// Longest note content accepted, in characters.
const MAX_CONTENT_CHARS: usize = 500;

fn validate_color(color: &str) -> Result<(), ApiError> {
    let ok = color.len() == 7
        && color.starts_with('#')
        && color[1..].bytes().all(|b| b.is_ascii_hexdigit());
    if !ok {
        return Err(PanelError::Validation("color must be a #rrggbb value".into()).into());
    }
    Ok(())
}

pub async fn list_notes(
    State(state): State<AppState>,
    Path(code): Path<String>,
    Extension(claims): Extension<Claims>,
) -> Result<impl IntoResponse, ApiError> {
    let code = normalize_code(&code)?;

    let store = state.store.clone();
    let user_id = claims.sub;

    let notes = crate::run_blocking(move || store.list_notes(&code, user_id)).await?;
    Ok(Json(notes))
}

pub async fn create_note(
    State(state): State<AppState>,
    Path(code): Path<String>,
    Extension(claims): Extension<Claims>,
    Json(req): Json<CreateNoteRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let code = normalize_code(&code)?;
    state
        .limiter
        .try_acquire(Category::NoteCreate, &claims.sub.to_string())?;

    let content = req.content.trim().to_string();
    if content.is_empty() || content.chars().count() > MAX_CONTENT_CHARS {
        return Err(
            PanelError::Validation(format!("note content must be 1-{MAX_CONTENT_CHARS} characters"))
                .into(),
        );
    }
    if let Some(color) = req.color.as_deref() {
        validate_color(color)?;
    }

    let store = state.store.clone();
    let note_code = code.clone();
    let author_id = claims.sub;
    let color = req.color.clone();

    let note = crate::run_blocking(move || {
        store.create_note(&note_code, author_id, &content, req.x, req.y, color.as_deref())
    })
    .await?;

    state
        .hub
        .publish(&PanelEvent::NoteCreated {
            code,
            note: note.clone(),
        })
        .await;

    Ok((StatusCode::CREATED, Json(note)))
}

pub async fn move_note(
    State(state): State<AppState>,
    Path((code, note_id)): Path<(String, Uuid)>,
    Extension(claims): Extension<Claims>,
    Json(req): Json<MoveNoteRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let code = normalize_code(&code)?;

    let store = state.store.clone();
    let move_code = code.clone();
    let user_id = claims.sub;

    let note =
        crate::run_blocking(move || store.move_note(&move_code, note_id, user_id, req.x, req.y))
            .await?;

    state
        .hub
        .publish(&PanelEvent::NoteMoved {
            code,
            note_id: note.id,
            x: note.x,
            y: note.y,
            moved_by: claims.sub,
        })
        .await;

    Ok(Json(note))
}

pub async fn delete_note(
    State(state): State<AppState>,
    Path((code, note_id)): Path<(String, Uuid)>,
    Extension(claims): Extension<Claims>,
) -> Result<impl IntoResponse, ApiError> {
    let code = normalize_code(&code)?;

    let store = state.store.clone();
    let delete_code = code.clone();
    let user_id = claims.sub;

    let note =
        crate::run_blocking(move || store.delete_note(&delete_code, note_id, user_id)).await?;

    state
        .hub
        .publish(&PanelEvent::NoteDeleted {
            code,
            note_id: note.id,
            deleted_by: claims.sub,
        })
        .await;

    Ok(StatusCode::NO_CONTENT)
}
