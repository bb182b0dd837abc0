use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::models::NoteRecord;

/// Events sent over the WebSocket gateway.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", content = "data")]
pub enum PanelEvent {
    /// Server confirms successful authentication
    Ready { user_id: Uuid, username: String },

    /// A note was pinned to the panel
    NoteCreated { code: String, note: NoteRecord },

    /// A note was dragged to a new position
    NoteMoved {
        code: String,
        note_id: Uuid,
        x: f64,
        y: f64,
        moved_by: Uuid,
    },

    /// A note was removed from the panel
    NoteDeleted {
        code: String,
        note_id: Uuid,
        deleted_by: Uuid,
    },

    /// A user joined the panel for the first time
    UserJoined {
        code: String,
        user_id: Uuid,
        username: String,
    },

    /// A user left the panel for good
    UserLeft {
        code: String,
        user_id: Uuid,
        username: String,
    },

    /// The panel's last participant left and the panel was deleted.
    /// Subscribers should drop their local state; no further events follow.
    PanelDeleted { code: String },
}

impl PanelEvent {
    /// Returns the panel code if this event is scoped to a specific panel.
    /// `Ready` is connection-local and never fanned out.
    pub fn code(&self) -> Option<&str> {
        match self {
            Self::NoteCreated { code, .. } => Some(code),
            Self::NoteMoved { code, .. } => Some(code),
            Self::NoteDeleted { code, .. } => Some(code),
            Self::UserJoined { code, .. } => Some(code),
            Self::UserLeft { code, .. } => Some(code),
            Self::PanelDeleted { code } => Some(code),
            Self::Ready { .. } => None,
        }
    }
}

/// Commands sent FROM client TO server over WebSocket.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", content = "data")]
pub enum PanelCommand {
    /// Start receiving events for a panel. A connection watches at most one
    /// panel; watching a new one implicitly unwatches the previous.
    WatchPanel { code: String },

    /// Stop receiving panel events on this connection
    UnwatchPanel,
}
