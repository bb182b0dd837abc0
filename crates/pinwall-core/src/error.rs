use thiserror::Error;

/// Everything that can go wrong while coordinating panels. The API layer
/// owns the mapping to HTTP statuses; nothing here knows about transport.
#[derive(Debug, Error)]
pub enum PanelError {
    /// No panel with that code. Also covers codes that never existed.
    #[error("panel not found")]
    NotFound,

    /// The panel is password-protected and no password was supplied.
    #[error("panel requires a password")]
    PasswordRequired,

    /// A password was supplied and it does not match.
    #[error("invalid panel password")]
    WrongPassword,

    /// The panel's active-user ceiling is reached.
    #[error("panel is full")]
    PanelFull,

    /// The caller is not a participant of this panel.
    #[error("not a member of this panel")]
    NotMember,

    /// Code allocation gave up after exhausting its attempt budget.
    #[error("no unused panel code after {attempts} attempts")]
    CodeSpaceExhausted { attempts: u32 },

    /// Too many requests in this category; retry after the given delay.
    #[error("rate limited, retry in {retry_after_seconds}s")]
    RateLimited { retry_after_seconds: u64 },

    /// Request payload failed validation. The message is safe to surface.
    #[error("{0}")]
    Validation(String),

    /// Anything unexpected: storage failures, poisoned locks, corrupt rows.
    #[error("internal error")]
    Internal(#[from] anyhow::Error),
}

impl PanelError {
    /// Recover a typed error that crossed an `anyhow` boundary, e.g. out of
    /// a `with_conn_mut` closure.
    pub fn from_anyhow(err: anyhow::Error) -> PanelError {
        match err.downcast::<PanelError>() {
            Ok(typed) => typed,
            Err(other) => PanelError::Internal(other),
        }
    }
}
