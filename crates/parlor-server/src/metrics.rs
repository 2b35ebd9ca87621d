//! Metrics collection and export for Parlor.
//!
//! Uses the `metrics` crate for instrumentation and exports
//! to Prometheus format.

use metrics::{counter, gauge};
use metrics_exporter_prometheus::PrometheusBuilder;
use std::net::SocketAddr;
use tracing::info;

/// Metric names.
pub mod names {
    pub const CONNECTIONS_TOTAL: &str = "parlor_connections_total";
    pub const CONNECTIONS_ACTIVE: &str = "parlor_connections_active";
    pub const USERS_ONLINE: &str = "parlor_users_online";
    pub const CHAT_MESSAGES_TOTAL: &str = "parlor_chat_messages_total";
    pub const FRAMES_TOTAL: &str = "parlor_frames_total";
    pub const REJECTIONS_TOTAL: &str = "parlor_rejections_total";
    pub const DELIVERY_FAILURES: &str = "parlor_delivery_failures";
    pub const ERRORS_TOTAL: &str = "parlor_errors_total";
}

/// Initialize the metrics system.
pub fn init_metrics() {
    metrics::describe_counter!(
        names::CONNECTIONS_TOTAL,
        "Total number of connections since server start"
    );
    metrics::describe_gauge!(
        names::CONNECTIONS_ACTIVE,
        "Current number of active connections"
    );
    metrics::describe_gauge!(names::USERS_ONLINE, "Distinct users with a live connection");
    metrics::describe_counter!(names::CHAT_MESSAGES_TOTAL, "Chat messages appended to the history");
    metrics::describe_counter!(names::FRAMES_TOTAL, "Protocol frames by direction");
    metrics::describe_counter!(
        names::REJECTIONS_TOTAL,
        "Client actions rejected by the hub"
    );
    metrics::describe_gauge!(
        names::DELIVERY_FAILURES,
        "Frames that could not be enqueued for a recipient"
    );
    metrics::describe_counter!(names::ERRORS_TOTAL, "Total number of errors");

    info!("Metrics initialized");
}

/// Start the Prometheus metrics server.
///
/// # Errors
///
/// Returns an error if the server cannot be started.
pub fn start_metrics_server(port: u16) -> Result<(), Box<dyn std::error::Error>> {
    let addr: SocketAddr = format!("0.0.0.0:{}", port).parse()?;

    PrometheusBuilder::new()
        .with_http_listener(addr)
        .install()?;

    info!("Metrics server listening on {}", addr);
    Ok(())
}

/// Record a frame.
pub fn record_frame(direction: &'static str) {
    counter!(names::FRAMES_TOTAL, "direction" => direction).increment(1);
}

/// Record a chat message.
pub fn record_chat_message() {
    counter!(names::CHAT_MESSAGES_TOTAL).increment(1);
}

/// Record a rejected client action.
pub fn record_rejection(action: &'static str) {
    counter!(names::REJECTIONS_TOTAL, "action" => action).increment(1);
}

/// Update the online user count.
pub fn set_users_online(count: usize) {
    gauge!(names::USERS_ONLINE).set(count as f64);
}

/// Update the failed delivery count.
pub fn set_delivery_failures(count: u64) {
    gauge!(names::DELIVERY_FAILURES).set(count as f64);
}

/// Record an error.
pub fn record_error(error_type: &'static str) {
    counter!(names::ERRORS_TOTAL, "type" => error_type).increment(1);
}

/// Metrics guard that records disconnection on drop.
pub struct ConnectionMetricsGuard;

impl ConnectionMetricsGuard {
    /// Create a new metrics guard, recording a connection.
    #[must_use]
    pub fn new() -> Self {
        counter!(names::CONNECTIONS_TOTAL).increment(1);
        gauge!(names::CONNECTIONS_ACTIVE).increment(1.0);
        Self
    }
}

impl Default for ConnectionMetricsGuard {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for ConnectionMetricsGuard {
    fn drop(&mut self) {
        gauge!(names::CONNECTIONS_ACTIVE).decrement(1.0);
    }
}
