mod sweeps;

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use axum::{
    Router,
    extract::{Query, State, WebSocketUpgrade},
    http::StatusCode,
    response::IntoResponse,
    routing::get,
};
use jsonwebtoken::{DecodingKey, Validation, decode};
use serde::Deserialize;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::info;

use pinwall_api::auth::{AppState, AppStateInner};
use pinwall_api::routes;
use pinwall_core::access::AccessController;
use pinwall_core::cache::MemoryCache;
use pinwall_core::membership::MembershipTracker;
use pinwall_core::ratelimit::RateLimiter;
use pinwall_core::store::PanelStore;
use pinwall_db::Database;
use pinwall_gateway::connection;
use pinwall_gateway::hub::PanelHub;
use pinwall_types::api::Claims;

#[derive(Clone)]
struct ServerState {
    db: Arc<Database>,
    hub: PanelHub,
    jwt_secret: String,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env if present
    let _ = dotenvy::dotenv();

    // Init logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "pinwall=debug,tower_http=debug".into()),
        )
        .init();

    // Config
    let jwt_secret =
        std::env::var("PINWALL_JWT_SECRET").unwrap_or_else(|_| "dev-secret-change-me".into());
    let db_path = std::env::var("PINWALL_DB_PATH").unwrap_or_else(|_| "pinwall.db".into());
    let host = std::env::var("PINWALL_HOST").unwrap_or_else(|_| "0.0.0.0".into());
    let port: u16 = std::env::var("PINWALL_PORT")
        .unwrap_or_else(|_| "3000".into())
        .parse()?;

    // Init database
    let db = Arc::new(Database::open(&PathBuf::from(&db_path))?);

    // Shared state
    let cache = Arc::new(MemoryCache::new());
    let store = PanelStore::new(db.clone(), cache.clone());
    let hub = PanelHub::new();
    let app_state: AppState = Arc::new(AppStateInner {
        db: db.clone(),
        store: store.clone(),
        access: AccessController::new(db.clone(), store.clone()),
        membership: MembershipTracker::new(db.clone(), store),
        limiter: RateLimiter::new(),
        hub: hub.clone(),
        jwt_secret: jwt_secret.clone(),
    });

    // Background sweep task (runs every minute)
    tokio::spawn(sweeps::run_sweep_loop(app_state.clone(), cache, 60));

    let ws_state = ServerState {
        db,
        hub,
        jwt_secret,
    };

    // Routes
    let ws_route = Router::new()
        .route("/gateway", get(ws_upgrade))
        .with_state(ws_state);

    let app = routes::router(app_state)
        .merge(ws_route)
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http());

    let addr: SocketAddr = format!("{}:{}", host, port).parse()?;
    info!("Pinwall server listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal())
    .await?;

    Ok(())
}

#[derive(Deserialize)]
struct GatewayQuery {
    token: String,
}

/// Browser WebSocket clients cannot set headers, so the JWT arrives as a
/// query parameter and is checked before the upgrade completes.
async fn ws_upgrade(
    State(state): State<ServerState>,
    Query(query): Query<GatewayQuery>,
    ws: WebSocketUpgrade,
) -> Result<impl IntoResponse, StatusCode> {
    let token_data = decode::<Claims>(
        &query.token,
        &DecodingKey::from_secret(state.jwt_secret.as_bytes()),
        &Validation::default(),
    )
    .map_err(|_| StatusCode::UNAUTHORIZED)?;
    let claims = token_data.claims;

    Ok(ws.on_upgrade(move |socket| {
        connection::handle_connection(socket, state.hub, state.db, claims.sub, claims.username)
    }))
}

async fn shutdown_signal() {
    let ctrl_c = tokio::signal::ctrl_c();
    #[cfg(unix)]
    {
        let mut sigterm =
            tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
                .expect("failed to install SIGTERM handler");
        tokio::select! {
            _ = ctrl_c => info!("Received Ctrl+C, shutting down..."),
            _ = sigterm.recv() => info!("Received SIGTERM, shutting down..."),
        }
    }
    #[cfg(not(unix))]
    {
        ctrl_c.await.ok();
        info!("Received Ctrl+C, shutting down...");
    }
}
