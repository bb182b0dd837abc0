pub mod auth;
pub mod error;
pub mod middleware;
pub mod notes;
pub mod panels;
pub mod routes;

use tracing::error;

use crate::error::ApiError;
use pinwall_core::error::PanelError;

/// Run blocking DB/argon2 work off the async runtime. Used by every handler
/// that touches the store.
pub(crate) async fn run_blocking<T, F>(f: F) -> Result<T, ApiError>
where
    F: FnOnce() -> Result<T, PanelError> + Send + 'static,
    T: Send + 'static,
{
    match tokio::task::spawn_blocking(f).await {
        Ok(result) => result.map_err(ApiError::from),
        Err(e) => {
            error!("spawn_blocking join error: {}", e);
            Err(PanelError::Internal(anyhow::Error::new(e)).into())
        }
    }
}
