//! In-memory connections.
//!
//! A [`MemoryConnection`] is the server side of a channel pair; the matching
//! [`MemoryClient`] plays the remote peer. Used to drive sessions in tests and
//! benchmarks without sockets.

use async_trait::async_trait;
use parlor_core::ConnectionId;
use parlor_protocol::{ClientFrame, ServerFrame};
use tokio::sync::mpsc;
use tokio::time::Instant;

use crate::traits::{Connection, TransportError};

/// Server side of an in-memory connection.
pub struct MemoryConnection {
    id: ConnectionId,
    inbound: mpsc::UnboundedReceiver<ClientFrame>,
    outbound: mpsc::UnboundedSender<ServerFrame>,
    is_open: bool,
    last_activity: Instant,
}

/// Client side of an in-memory connection.
pub struct MemoryClient {
    outbound: Option<mpsc::UnboundedSender<ClientFrame>>,
    inbound: mpsc::UnboundedReceiver<ServerFrame>,
}

impl MemoryConnection {
    /// Create a connected pair.
    #[must_use]
    pub fn pair(id: ConnectionId) -> (MemoryConnection, MemoryClient) {
        let (client_tx, server_rx) = mpsc::unbounded_channel();
        let (server_tx, client_rx) = mpsc::unbounded_channel();

        let connection = MemoryConnection {
            id,
            inbound: server_rx,
            outbound: server_tx,
            is_open: true,
            last_activity: Instant::now(),
        };
        let client = MemoryClient {
            outbound: Some(client_tx),
            inbound: client_rx,
        };
        (connection, client)
    }
}

#[async_trait]
impl Connection for MemoryConnection {
    fn id(&self) -> &ConnectionId {
        &self.id
    }

    async fn recv(&mut self) -> Result<Option<ClientFrame>, TransportError> {
        let frame = self.inbound.recv().await;
        match frame {
            Some(_) => self.last_activity = Instant::now(),
            None => self.is_open = false,
        }
        Ok(frame)
    }

    async fn send(&mut self, frame: &ServerFrame) -> Result<(), TransportError> {
        if !self.is_open {
            return Err(TransportError::ConnectionClosed);
        }
        self.outbound.send(frame.clone()).map_err(|_| {
            self.is_open = false;
            TransportError::SendFailed("client dropped".into())
        })
    }

    async fn close(&mut self) -> Result<(), TransportError> {
        self.is_open = false;
        self.inbound.close();
        Ok(())
    }

    fn is_open(&self) -> bool {
        self.is_open
    }

    fn last_activity(&self) -> Instant {
        self.last_activity
    }
}

impl MemoryClient {
    /// Send a frame to the server.
    ///
    /// # Errors
    ///
    /// Returns an error if the client hung up or the server side is gone.
    pub fn send(&self, frame: ClientFrame) -> Result<(), TransportError> {
        self.outbound
            .as_ref()
            .ok_or(TransportError::ConnectionClosed)?
            .send(frame)
            .map_err(|_| TransportError::ConnectionClosed)
    }

    /// Wait for the next frame from the server.
    pub async fn recv(&mut self) -> Option<ServerFrame> {
        self.inbound.recv().await
    }

    /// Take a frame if one is already queued.
    pub fn try_recv(&mut self) -> Option<ServerFrame> {
        self.inbound.try_recv().ok()
    }

    /// Hang up. The server side sees a clean close.
    pub fn hang_up(&mut self) {
        self.outbound = None;
    }
}
