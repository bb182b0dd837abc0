use axum::{
    Extension, Json,
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
};

use pinwall_core::codes::{CODE_ALPHABET, CODE_LENGTH};
use pinwall_core::error::PanelError;
use pinwall_core::ratelimit::Category;
use pinwall_types::api::{
    CheckPanelResponse, Claims, CreatePanelRequest, JoinPanelRequest, PanelView,
};
use pinwall_types::events::PanelEvent;

use crate::auth::AppState;
use crate::error::ApiError;

/// Panel codes arrive from share links and hand-typed forms; uppercase them
/// and reject anything that cannot be a code before touching the store.
pub(crate) fn normalize_code(raw: &str) -> Result<String, ApiError> {
    let code = raw.trim().to_ascii_uppercase();
    if code.len() != CODE_LENGTH || !code.bytes().all(|b| CODE_ALPHABET.contains(&b)) {
        return Err(PanelError::Validation("malformed panel code".into()).into());
    }
    Ok(code)
}

pub async fn create_panel(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Json(req): Json<CreatePanelRequest>,
) -> Result<impl IntoResponse, ApiError> {
    state
        .limiter
        .try_acquire(Category::PanelCreate, &claims.sub.to_string())?;

    let name = req.name.trim().to_string();
    if name.is_empty() || name.len() > 60 {
        return Err(PanelError::Validation("panel name must be 1-60 characters".into()).into());
    }
    if let Some(pw) = req.password.as_deref() {
        if pw.len() < 4 {
            return Err(
                PanelError::Validation("panel password must be at least 4 characters".into())
                    .into(),
            );
        }
    }

    let access = state.access.clone();
    let variant = req.variant;
    let password = req.password.clone();
    let owner_id = claims.sub;
    let owner_name = claims.username.clone();

    let record = crate::run_blocking(move || {
        access.create_panel(&name, variant, password.as_deref(), owner_id, &owner_name)
    })
    .await?;

    Ok((StatusCode::CREATED, Json(PanelView::from(record))))
}

pub async fn list_panels(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
) -> Result<impl IntoResponse, ApiError> {
    let membership = state.membership.clone();
    let user_id = claims.sub;

    let summaries = crate::run_blocking(move || membership.list_panels(user_id)).await?;
    Ok(Json(summaries))
}

/// Share-link resolution: does the panel exist, and does it want a password?
pub async fn check_panel(
    State(state): State<AppState>,
    Path(code): Path<String>,
    Extension(claims): Extension<Claims>,
) -> Result<impl IntoResponse, ApiError> {
    let code = normalize_code(&code)?;
    // The tight per-code window fires first so a scripted scan of one link
    // burns out before it dents the join budget.
    state
        .limiter
        .try_acquire(Category::LinkAccess, &format!("{}:{}", claims.sub, code))?;
    state
        .limiter
        .try_acquire(Category::PanelJoin, &claims.sub.to_string())?;

    let store = state.store.clone();
    let lookup_code = code.clone();
    let record = crate::run_blocking(move || store.get(&lookup_code))
        .await?
        .ok_or(PanelError::NotFound)?;

    Ok(Json(CheckPanelResponse::from(record)))
}

pub async fn join_panel(
    State(state): State<AppState>,
    Path(code): Path<String>,
    Extension(claims): Extension<Claims>,
    Json(req): Json<JoinPanelRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let code = normalize_code(&code)?;
    state
        .limiter
        .try_acquire(Category::PanelJoin, &claims.sub.to_string())?;

    let access = state.access.clone();
    let join_code = code.clone();
    let password = req.password.clone();
    let user_id = claims.sub;
    let username = claims.username.clone();

    let admission = crate::run_blocking(move || {
        access.join(&join_code, password.as_deref(), user_id, &username)
    })
    .await?;

    if admission.newly_joined {
        state
            .hub
            .publish(&PanelEvent::UserJoined {
                code,
                user_id: claims.sub,
                username: claims.username.clone(),
            })
            .await;
    }

    Ok(Json(PanelView::from(admission.panel)))
}

pub async fn leave_panel(
    State(state): State<AppState>,
    Path(code): Path<String>,
    Extension(claims): Extension<Claims>,
) -> Result<impl IntoResponse, ApiError> {
    let code = normalize_code(&code)?;

    let membership = state.membership.clone();
    let leave_code = code.clone();
    let user_id = claims.sub;

    let report = crate::run_blocking(move || membership.leave(&leave_code, user_id)).await?;

    state
        .hub
        .publish(&PanelEvent::UserLeft {
            code: code.clone(),
            user_id: claims.sub,
            username: claims.username.clone(),
        })
        .await;
    if report.panel_deleted {
        state.hub.publish(&PanelEvent::PanelDeleted { code }).await;
    }

    Ok(StatusCode::NO_CONTENT)
}

pub async fn heartbeat(
    State(state): State<AppState>,
    Path(code): Path<String>,
    Extension(claims): Extension<Claims>,
) -> Result<impl IntoResponse, ApiError> {
    let code = normalize_code(&code)?;

    let membership = state.membership.clone();
    let user_id = claims.sub;
    let username = claims.username.clone();

    crate::run_blocking(move || membership.heartbeat(&code, user_id, &username)).await?;
    Ok(StatusCode::NO_CONTENT)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_code_uppercases_and_trims() {
        assert_eq!(normalize_code(" abc234 ").unwrap(), "ABC234");
        assert_eq!(normalize_code("QRSTUV").unwrap(), "QRSTUV");
    }

    #[test]
    fn test_normalize_code_rejects_bad_shapes() {
        // Wrong length, ambiguous glyphs, non-alphabet characters.
        assert!(normalize_code("ABC23").is_err());
        assert!(normalize_code("ABC2345").is_err());
        assert!(normalize_code("ABC230").is_err());
        assert!(normalize_code("ABC23O").is_err());
        assert!(normalize_code("ABC-34").is_err());
        assert!(normalize_code("").is_err());
    }
}
