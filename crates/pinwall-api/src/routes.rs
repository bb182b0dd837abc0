use axum::{
    Router, middleware,
    routing::{delete, get, patch, post},
};

use crate::auth::{self, AppState};
use crate::middleware::require_auth;
use crate::{notes, panels};

/// Assemble the REST router. The WebSocket route is attached by the server
/// binary, which owns the upgrade handshake.
pub fn router(state: AppState) -> Router {
    let public_routes = Router::new()
        .route("/auth/register", post(auth::register))
        .route("/auth/login", post(auth::login))
        .route("/health", get(health))
        .with_state(state.clone());

    let protected_routes = Router::new()
        .route("/panels", post(panels::create_panel))
        .route("/panels", get(panels::list_panels))
        .route("/panels/{code}", get(panels::check_panel))
        .route("/panels/{code}/join", post(panels::join_panel))
        .route("/panels/{code}/leave", post(panels::leave_panel))
        .route("/panels/{code}/heartbeat", post(panels::heartbeat))
        .route("/panels/{code}/notes", get(notes::list_notes))
        .route("/panels/{code}/notes", post(notes::create_note))
        .route("/panels/{code}/notes/{note_id}/position", patch(notes::move_note))
        .route("/panels/{code}/notes/{note_id}", delete(notes::delete_note))
        .layer(middleware::from_fn_with_state(state.clone(), require_auth))
        .with_state(state);

    Router::new().merge(public_routes).merge(protected_routes)
}

async fn health() -> &'static str {
    "ok"
}
