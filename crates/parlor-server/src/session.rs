//! Per-connection session loop.
//!
//! A session owns one [`Connection`] and its outbox. It forwards queued hub
//! events to the client and feeds client frames into the hub until either
//! side goes away, then releases the connection from the hub and the table.
//!
//! Any inbound traffic keeps a session alive: valid frames, frames that fail
//! to decode, and WebSocket pings alike.

use crate::handlers::AppState;
use crate::metrics::{self, ConnectionMetricsGuard};
use parlor_core::{Audience, Broadcast, ConnectionId, Publisher};
use parlor_protocol::{codes, ClientFrame, ProtocolError, ServerFrame};
use parlor_transport::{Connection, TransportError};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, info, warn};

/// Drive a connection until it closes.
///
/// `query_username` is the username supplied when the connection was
/// opened, if any.
pub async fn run_session<C: Connection>(
    mut conn: C,
    query_username: Option<String>,
    state: Arc<AppState>,
) {
    let _metrics_guard = ConnectionMetricsGuard::new();
    let connection_id = conn.id().clone();

    let mut outbox = match state.table.open(connection_id.clone()) {
        Ok(outbox) => outbox,
        Err(e) => {
            warn!(connection = %connection_id, error = %e, "Refusing connection");
            metrics::record_error("capacity");
            let _ = conn.send(&ServerFrame::error(codes::SERVER_FULL, e.to_string())).await;
            let _ = conn.close().await;
            return;
        }
    };

    let heartbeat = u32::try_from(state.config.heartbeat.interval_ms).unwrap_or(u32::MAX);
    if let Err(e) = conn
        .send(&ServerFrame::connected(connection_id.as_str(), heartbeat))
        .await
    {
        warn!(connection = %connection_id, error = %e, "Failed to send Connected frame");
        state.table.close(&connection_id);
        return;
    }

    if let Err(e) = state
        .hub
        .connect(&connection_id, query_username.as_deref())
        .await
    {
        debug!(connection = %connection_id, error = %e, "Query join rejected");
        metrics::record_rejection("Join");
    }
    refresh_gauges(&state).await;

    debug!(connection = %connection_id, "Session started");

    let idle_timeout = Duration::from_millis(state.config.heartbeat.timeout_ms);
    let idle = tokio::time::sleep(idle_timeout);
    tokio::pin!(idle);

    loop {
        tokio::select! {
            biased;

            queued = outbox.recv() => {
                let Some(frame) = queued else { break };
                if let Err(e) = conn.send(&frame).await {
                    debug!(connection = %connection_id, error = %e, "Send failed");
                    break;
                }
                metrics::record_frame("outbound");
            }

            inbound = conn.recv() => {
                match inbound {
                    Ok(Some(frame)) => {
                        metrics::record_frame("inbound");
                        handle_frame(&state, &connection_id, frame).await;
                    }
                    Ok(None) => break,
                    Err(e) if e.is_recoverable() => {
                        warn!(connection = %connection_id, error = %e, "Invalid frame");
                        metrics::record_error("protocol");
                        state.table.publish(Broadcast::new(
                            Audience::Only(connection_id.clone()),
                            ServerFrame::error(error_code(&e), e.to_string()),
                        ));
                    }
                    Err(e) => {
                        warn!(connection = %connection_id, error = %e, "Connection error");
                        metrics::record_error("transport");
                        break;
                    }
                }
            }

            () = &mut idle, if !idle_timeout.is_zero() => {
                let deadline = conn.last_activity() + idle_timeout;
                if deadline > Instant::now() {
                    idle.as_mut().reset(deadline);
                    continue;
                }
                info!(connection = %connection_id, timeout_ms = state.config.heartbeat.timeout_ms, "Idle timeout");
                break;
            }
        }
    }

    if let Some(username) = state.hub.disconnect(&connection_id).await {
        debug!(connection = %connection_id, username = %username, "Released username");
    }
    state.table.close(&connection_id);
    let _ = conn.close().await;
    refresh_gauges(&state).await;

    debug!(connection = %connection_id, "Session ended");
}

async fn handle_frame(state: &AppState, connection_id: &ConnectionId, frame: ClientFrame) {
    let action = frame.action_name();
    let is_membership = matches!(frame, ClientFrame::Join { .. });
    let is_message = matches!(frame, ClientFrame::SendMessage { .. });

    match state.hub.handle(connection_id, frame).await {
        Ok(()) => {
            if is_message {
                metrics::record_chat_message();
            }
            if is_membership {
                refresh_gauges(state).await;
            }
        }
        Err(e) => {
            debug!(connection = %connection_id, action, error = %e, "Action rejected");
            metrics::record_rejection(action);
        }
    }
}

fn error_code(error: &TransportError) -> u16 {
    match error {
        TransportError::Protocol(ProtocolError::FrameTooLarge(_)) => codes::FRAME_TOO_LARGE,
        _ => codes::INVALID_FRAME,
    }
}

async fn refresh_gauges(state: &AppState) {
    metrics::set_users_online(state.hub.stats().await.users);
    metrics::set_delivery_failures(state.table.stats().failed);
}
