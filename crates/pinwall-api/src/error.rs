use axum::{
    Json,
    http::{StatusCode, header},
    response::{IntoResponse, Response},
};
use serde::Serialize;
use tracing::error;

use pinwall_core::error::PanelError;

/// HTTP-facing wrapper around the core error taxonomy. Handlers return this
/// so `?` on any core operation produces the right status and JSON body.
#[derive(Debug)]
pub enum ApiError {
    Panel(PanelError),
    /// Login failed. Deliberately silent about whether the username exists.
    InvalidCredentials,
}

impl From<PanelError> for ApiError {
    fn from(err: PanelError) -> Self {
        ApiError::Panel(err)
    }
}

#[derive(Serialize)]
struct ErrorResponse {
    error: ErrorDetail,
}

#[derive(Serialize)]
struct ErrorDetail {
    code: String,
    message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    retry_after_seconds: Option<u64>,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, code, message, retry_after) = match &self {
            ApiError::InvalidCredentials => (
                StatusCode::UNAUTHORIZED,
                "INVALID_CREDENTIALS",
                "Invalid username or password".to_string(),
                None,
            ),
            // NotMember answers exactly like NotFound: a panel you are not
            // in does not exist as far as you can tell.
            ApiError::Panel(PanelError::NotFound) | ApiError::Panel(PanelError::NotMember) => (
                StatusCode::NOT_FOUND,
                "PANEL_NOT_FOUND",
                "Panel not found".to_string(),
                None,
            ),
            ApiError::Panel(PanelError::PasswordRequired) => (
                StatusCode::UNAUTHORIZED,
                "PASSWORD_REQUIRED",
                "This panel requires a password".to_string(),
                None,
            ),
            ApiError::Panel(PanelError::WrongPassword) => (
                StatusCode::FORBIDDEN,
                "WRONG_PASSWORD",
                "Invalid panel password".to_string(),
                None,
            ),
            ApiError::Panel(PanelError::PanelFull) => (
                StatusCode::FORBIDDEN,
                "PANEL_FULL",
                "This panel is full".to_string(),
                None,
            ),
            ApiError::Panel(PanelError::CodeSpaceExhausted { attempts }) => {
                error!("Panel code allocation exhausted after {} attempts", attempts);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "INTERNAL_ERROR",
                    "An internal error occurred".to_string(),
                    None,
                )
            }
            ApiError::Panel(PanelError::RateLimited {
                retry_after_seconds,
            }) => (
                StatusCode::TOO_MANY_REQUESTS,
                "RATE_LIMITED",
                "Too many requests. Please try again later.".to_string(),
                Some(*retry_after_seconds),
            ),
            ApiError::Panel(PanelError::Validation(msg)) => (
                StatusCode::BAD_REQUEST,
                "VALIDATION",
                msg.clone(),
                None,
            ),
            ApiError::Panel(PanelError::Internal(e)) => {
                error!("Internal error: {:#}", e);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "INTERNAL_ERROR",
                    "An internal error occurred".to_string(),
                    None,
                )
            }
        };

        let body = Json(ErrorResponse {
            error: ErrorDetail {
                code: code.to_string(),
                message,
                retry_after_seconds: retry_after,
            },
        });

        match retry_after {
            Some(secs) => {
                (status, [(header::RETRY_AFTER, secs.to_string())], body).into_response()
            }
            None => (status, body).into_response(),
        }
    }
}
