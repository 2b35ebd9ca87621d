//! # Parlor Server
//!
//! Realtime chat server: a single shared room with presence, typing
//! indicators and an append-only message history, served over WebSocket.
//!
//! The binary (`parlor`) wires these modules together; they are exposed as a
//! library so integration tests can run the server on an ephemeral port.

pub mod config;
pub mod handlers;
pub mod metrics;
pub mod session;

pub use config::Config;
pub use handlers::{build_app, run_server, serve, AppState};
