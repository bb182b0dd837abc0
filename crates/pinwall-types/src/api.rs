use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::models::{PanelRecord, PanelVariant};

// -- JWT Claims --

/// JWT claims, shared by the REST auth middleware and the WebSocket
/// upgrade handler.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    pub sub: Uuid,
    pub username: String,
    pub exp: usize,
}

// -- Auth --

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RegisterRequest {
    pub username: String,
    pub password: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct RegisterResponse {
    pub user_id: Uuid,
    pub token: String,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct LoginRequest {
    pub username: String,
    pub password: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct LoginResponse {
    pub user_id: Uuid,
    pub username: String,
    pub token: String,
}

// -- Panels --

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CreatePanelRequest {
    pub name: String,
    pub variant: PanelVariant,
    pub password: Option<String>,
}

/// Panel state as exposed to clients. Same shape as `PanelRecord` minus the
/// password hash.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PanelView {
    pub code: String,
    pub name: String,
    pub variant: PanelVariant,
    pub requires_password: bool,
    pub owner_id: Uuid,
    pub max_users: u32,
    pub post_count: u32,
    pub active_users: u32,
    pub created_at: DateTime<Utc>,
    pub last_activity: DateTime<Utc>,
}

impl From<PanelRecord> for PanelView {
    fn from(record: PanelRecord) -> Self {
        let requires_password = record.requires_password();
        PanelView {
            code: record.code,
            name: record.name,
            variant: record.variant,
            requires_password,
            owner_id: record.owner_id,
            max_users: record.max_users,
            post_count: record.post_count,
            active_users: record.active_users,
            created_at: record.created_at,
            last_activity: record.last_activity,
        }
    }
}

/// What a share link resolves to before the viewer has joined. Deliberately
/// thin: no member list, no note count, just enough to render the join form.
#[derive(Debug, Serialize, Deserialize)]
pub struct CheckPanelResponse {
    pub code: String,
    pub name: String,
    pub variant: PanelVariant,
    pub requires_password: bool,
}

impl From<PanelRecord> for CheckPanelResponse {
    fn from(record: PanelRecord) -> Self {
        let requires_password = record.requires_password();
        CheckPanelResponse {
            code: record.code,
            name: record.name,
            variant: record.variant,
            requires_password,
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct JoinPanelRequest {
    pub password: Option<String>,
}

/// One row of the "my panels" listing, ordered by recent activity.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PanelSummary {
    pub code: String,
    pub name: String,
    pub variant: PanelVariant,
    pub active_users: u32,
    pub unread_count: u32,
    pub last_activity: DateTime<Utc>,
}

// -- Notes --

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CreateNoteRequest {
    pub content: String,
    pub x: f64,
    pub y: f64,
    /// Defaults to the first color of the panel variant's palette.
    pub color: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct MoveNoteRequest {
    pub x: f64,
    pub y: f64,
}
