//! # parlor-transport
//!
//! Transport layer for the Parlor chat hub.
//!
//! - **ConnectionTable** - Per-connection outbound queues; the hub's `Publisher`
//! - **Connection** - Uniform interface over a single client session
//! - **WebSocketConnection** - `Connection` over an axum WebSocket
//! - **MemoryConnection** - `Connection` over in-process channels
//!
//! ```rust,ignore
//! use parlor_transport::Connection;
//!
//! async fn handle_connection(mut conn: impl Connection) {
//!     while let Ok(Some(frame)) = conn.recv().await {
//!         // Dispatch frame to the hub
//!     }
//! }
//! ```

pub mod memory;
pub mod table;
pub mod traits;
pub mod websocket;

pub use memory::{MemoryClient, MemoryConnection};
pub use table::{ConnectionTable, FanoutReport, Outbox, TableStats};
pub use traits::{Connection, TransportError};
pub use websocket::WebSocketConnection;
