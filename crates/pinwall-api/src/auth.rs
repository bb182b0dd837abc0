use std::net::SocketAddr;
use std::sync::Arc;

use argon2::{
    Argon2, PasswordHash, PasswordHasher, PasswordVerifier,
    password_hash::{SaltString, rand_core::OsRng},
};
use axum::{
    Json,
    extract::{ConnectInfo, State},
    http::StatusCode,
    response::IntoResponse,
};
use jsonwebtoken::{EncodingKey, Header, encode};
use tracing::warn;
use uuid::Uuid;

use pinwall_core::access::AccessController;
use pinwall_core::error::PanelError;
use pinwall_core::membership::MembershipTracker;
use pinwall_core::ratelimit::{Category, RateLimiter};
use pinwall_core::store::PanelStore;
use pinwall_db::Database;
use pinwall_gateway::hub::PanelHub;
use pinwall_types::api::{
    Claims, LoginRequest, LoginResponse, RegisterRequest, RegisterResponse,
};

use crate::error::ApiError;

pub type AppState = Arc<AppStateInner>;

pub struct AppStateInner {
    pub db: Arc<Database>,
    pub store: PanelStore,
    pub access: AccessController,
    pub membership: MembershipTracker,
    pub limiter: RateLimiter,
    pub hub: PanelHub,
    pub jwt_secret: String,
}

pub async fn register(
    State(state): State<AppState>,
    Json(req): Json<RegisterRequest>,
) -> Result<impl IntoResponse, ApiError> {
    // Validate input
    if req.username.len() < 3 || req.username.len() > 32 {
        return Err(PanelError::Validation("username must be 3-32 characters".into()).into());
    }
    if req.password.len() < 8 {
        return Err(PanelError::Validation("password must be at least 8 characters".into()).into());
    }

    let db = state.db.clone();
    let username = req.username.clone();
    let password = req.password.clone();
    let user_id = Uuid::new_v4();

    crate::run_blocking(move || {
        // Hash password with Argon2id
        let salt = SaltString::generate(&mut OsRng);
        let password_hash = Argon2::default()
            .hash_password(password.as_bytes(), &salt)
            .map_err(|e| PanelError::Internal(anyhow::anyhow!("password hash: {}", e)))?
            .to_string();

        // The insert itself reports a taken name, so two racing registers
        // cannot both pass a lookahead check.
        if !db.create_user(&user_id.to_string(), &username, &password_hash)? {
            return Err(PanelError::Validation("username is taken".into()));
        }
        Ok(())
    })
    .await?;

    let token = create_token(&state.jwt_secret, user_id, &req.username)
        .map_err(PanelError::Internal)?;

    Ok((
        StatusCode::CREATED,
        Json(RegisterResponse { user_id, token }),
    ))
}

pub async fn login(
    State(state): State<AppState>,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
    Json(req): Json<LoginRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let ip = addr.ip().to_string();
    state.limiter.check(Category::Auth, &ip)?;

    let db = state.db.clone();
    let username = req.username.clone();
    let password = req.password.clone();

    let verified = crate::run_blocking(move || {
        let Some(user) = db.get_user_by_username(&username)? else {
            return Ok(None);
        };

        let parsed_hash = PasswordHash::new(&user.password)
            .map_err(|e| PanelError::Internal(anyhow::anyhow!("stored hash unreadable: {}", e)))?;

        match Argon2::default().verify_password(password.as_bytes(), &parsed_hash) {
            Ok(()) => Ok(Some(user)),
            Err(argon2::password_hash::Error::Password) => Ok(None),
            Err(e) => Err(PanelError::Internal(anyhow::anyhow!("password verify: {}", e))),
        }
    })
    .await?;

    let Some(user) = verified else {
        // Only failed attempts count against the budget
        state.limiter.record(Category::Auth, &ip);
        warn!("Failed login for '{}' from {}", req.username, ip);
        return Err(ApiError::InvalidCredentials);
    };

    let user_id: Uuid = user
        .id
        .parse()
        .map_err(|e| PanelError::Internal(anyhow::anyhow!("corrupt user id '{}': {}", user.id, e)))?;

    let token =
        create_token(&state.jwt_secret, user_id, &user.username).map_err(PanelError::Internal)?;

    Ok(Json(LoginResponse {
        user_id,
        username: user.username,
        token,
    }))
}

fn create_token(secret: &str, user_id: Uuid, username: &str) -> anyhow::Result<String> {
    let claims = Claims {
        sub: user_id,
        username: username.to_string(),
        exp: (chrono::Utc::now() + chrono::Duration::days(30)).timestamp() as usize,
    };

    let token = encode(
        &Header::default(),
        &claims,
        &EncodingKey::from_secret(secret.as_bytes()),
    )?;

    Ok(token)
}
