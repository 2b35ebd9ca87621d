//! Transport abstraction traits for Parlor.
//!
//! The server drives every connection through [`Connection`], so the session
//! loop does not care whether frames arrive over a WebSocket or an in-memory
//! channel.

use async_trait::async_trait;
use parlor_core::ConnectionId;
use parlor_protocol::{ClientFrame, ProtocolError, ServerFrame};
use thiserror::Error;
use tokio::time::Instant;

/// Transport errors.
#[derive(Debug, Error)]
pub enum TransportError {
    /// Connection was closed.
    #[error("Connection closed")]
    ConnectionClosed,

    /// The connection table is full.
    #[error("Connection limit of {0} reached")]
    CapacityReached(usize),

    /// A connection with this ID is already open.
    #[error("Duplicate connection: {0}")]
    DuplicateConnection(ConnectionId),

    /// Failed to send data.
    #[error("Send failed: {0}")]
    SendFailed(String),

    /// Failed to receive data.
    #[error("Receive failed: {0}")]
    ReceiveFailed(String),

    /// The peer sent something that is not a valid frame.
    #[error("Protocol error: {0}")]
    Protocol(#[from] ProtocolError),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl TransportError {
    /// Whether the connection can keep going after this error.
    ///
    /// Malformed or oversized frames are the client's problem; the socket
    /// itself is still usable.
    #[must_use]
    pub fn is_recoverable(&self) -> bool {
        matches!(self, TransportError::Protocol(_))
    }
}

/// An active connection over a transport.
///
/// Connections handle the bidirectional flow of frames between the server and
/// a single client. `recv` must be cancel-safe: the session loop races it
/// against outbound delivery.
#[async_trait]
pub trait Connection: Send {
    /// Get the connection's unique identifier.
    fn id(&self) -> &ConnectionId;

    /// Receive the next frame from the connection.
    ///
    /// Returns `None` if the connection is closed cleanly.
    async fn recv(&mut self) -> Result<Option<ClientFrame>, TransportError>;

    /// Send a frame to the connection.
    async fn send(&mut self, frame: &ServerFrame) -> Result<(), TransportError>;

    /// Close the connection gracefully.
    async fn close(&mut self) -> Result<(), TransportError>;

    /// Check if the connection is still open.
    fn is_open(&self) -> bool;

    /// When the peer last sent anything, including control messages and
    /// frames that failed to decode.
    fn last_activity(&self) -> Instant;
}

#[cfg(test)]
mod tests {
    use super::*;
    use parlor_protocol::codec;

    #[test]
    fn test_protocol_errors_are_recoverable() {
        let err: TransportError = codec::decode_text::<ClientFrame>("{").unwrap_err().into();
        assert!(err.is_recoverable());
        assert!(!TransportError::ConnectionClosed.is_recoverable());
        assert!(!TransportError::CapacityReached(1).is_recoverable());
    }
}
