//! HTTP and WebSocket handlers for the Parlor server.
//!
//! Routes:
//! - `GET {websocket_path}?username=<name>`: WebSocket upgrade into a chat session
//! - `GET /health`: liveness plus connection and user counts
//! - `GET /api/users`: online and typing users
//! - `GET /api/messages`: full message history

use crate::config::Config;
use crate::metrics;
use crate::session::run_session;
use anyhow::{Context, Result};
use axum::{
    extract::{ws::WebSocketUpgrade, Query, State},
    response::IntoResponse,
    routing::get,
    Json, Router,
};
use parlor_core::{ConnectionId, Publisher, SessionHub};
use parlor_protocol::PROTOCOL_VERSION;
use parlor_transport::{ConnectionTable, WebSocketConnection};
use serde::Deserialize;
use std::sync::Arc;
use tokio::net::TcpListener;
use tracing::{debug, error, info};

/// Shared server state.
pub struct AppState {
    /// The session hub.
    pub hub: SessionHub,
    /// Outbound queues of open connections.
    pub table: Arc<ConnectionTable>,
    /// Server configuration.
    pub config: Config,
}

impl AppState {
    /// Create new app state.
    #[must_use]
    pub fn new(config: Config) -> Self {
        let table = Arc::new(ConnectionTable::with_capacity(config.limits.max_connections));
        let publisher: Arc<dyn Publisher> = table.clone();
        let hub = SessionHub::new(publisher);

        Self { hub, table, config }
    }
}

/// Query parameters of the WebSocket endpoint.
#[derive(Debug, Default, Deserialize)]
pub struct ConnectQuery {
    /// Join immediately under this username.
    pub username: Option<String>,
}

/// Build the HTTP router.
pub fn build_app(state: Arc<AppState>) -> Router {
    Router::new()
        .route(&state.config.transport.websocket_path, get(ws_handler))
        .route("/health", get(health_handler))
        .route("/api/users", get(users_handler))
        .route("/api/messages", get(messages_handler))
        .with_state(state)
}

/// Run the HTTP/WebSocket server until interrupted.
///
/// # Errors
///
/// Returns an error if the server fails to start.
pub async fn run_server(config: Config) -> Result<()> {
    // Start metrics server if enabled
    if config.metrics.enabled {
        if let Err(e) = metrics::start_metrics_server(config.metrics.port) {
            error!("Failed to start metrics server: {}", e);
        }
    }

    let addr = config.bind_addr()?;
    let listener = TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind {addr}"))?;

    info!("Parlor server listening on {}", addr);
    info!(
        "WebSocket endpoint: ws://{}{}",
        addr, config.transport.websocket_path
    );

    let state = Arc::new(AppState::new(config));
    axum::serve(listener, build_app(state))
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("Parlor server stopped");
    Ok(())
}

/// Serve on an already bound listener.
///
/// # Errors
///
/// Returns an error if serving fails.
pub async fn serve(listener: TcpListener, state: Arc<AppState>) -> Result<()> {
    axum::serve(listener, build_app(state)).await?;
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        error!("Failed to listen for shutdown signal: {}", e);
        std::future::pending::<()>().await;
    }
    info!("Shutdown signal received");
}

/// Health check handler.
async fn health_handler(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let stats = state.hub.stats().await;
    Json(serde_json::json!({
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION"),
        "protocol": PROTOCOL_VERSION,
        "connections": state.table.len(),
        "users": stats.users,
        "messages": stats.messages,
    }))
}

/// Online and typing users.
async fn users_handler(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    Json(serde_json::json!({
        "online": state.hub.online_users().await,
        "typing": state.hub.typing_users().await,
    }))
}

/// Message history, oldest first.
async fn messages_handler(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    Json(state.hub.history().await)
}

/// WebSocket upgrade handler.
async fn ws_handler(
    ws: WebSocketUpgrade,
    Query(query): Query<ConnectQuery>,
    State(state): State<Arc<AppState>>,
) -> impl IntoResponse {
    let max_message_size = state.config.limits.max_message_size;

    ws.on_upgrade(move |socket| async move {
        let connection_id = ConnectionId::generate();
        debug!(connection = %connection_id, username = ?query.username, "WebSocket connected");

        let conn = WebSocketConnection::new(connection_id, socket, max_message_size);
        run_session(conn, query.username, state).await;
    })
}
