//! WebSocket connection over axum.
//!
//! Text messages carry one JSON frame each. Binary messages carry
//! length-prefixed MessagePack frames and may split or batch frames, so they
//! go through a read buffer. The size limit applies to each message and to
//! the declared length of each buffered frame. Replies use whichever encoding
//! the client used last.

use async_trait::async_trait;
use axum::extract::ws::{Message, WebSocket};
use bytes::BytesMut;
use parlor_core::ConnectionId;
use parlor_protocol::codec::{self, LENGTH_PREFIX_SIZE};
use parlor_protocol::{ClientFrame, Encoding, ProtocolError, ServerFrame};
use tokio::time::Instant;
use tracing::{debug, trace, warn};

use crate::traits::{Connection, TransportError};

/// Default maximum inbound message size (64 KiB).
pub const DEFAULT_MAX_MESSAGE_SIZE: usize = 64 * 1024;

/// A WebSocket connection.
pub struct WebSocketConnection {
    id: ConnectionId,
    socket: WebSocket,
    encoding: Encoding,
    read_buffer: BytesMut,
    max_message_size: usize,
    is_open: bool,
    last_activity: Instant,
}

impl WebSocketConnection {
    /// Wrap an upgraded socket.
    #[must_use]
    pub fn new(id: ConnectionId, socket: WebSocket, max_message_size: usize) -> Self {
        Self {
            id,
            socket,
            encoding: Encoding::Text,
            read_buffer: BytesMut::with_capacity(4096),
            max_message_size,
            is_open: true,
            last_activity: Instant::now(),
        }
    }

    /// Encoding used for outbound frames.
    #[must_use]
    pub fn encoding(&self) -> Encoding {
        self.encoding
    }

    fn check_size(&self, len: usize) -> Result<(), TransportError> {
        if len > self.max_message_size {
            warn!(
                connection = %self.id,
                size = len,
                max = self.max_message_size,
                "Message too large"
            );
            return Err(ProtocolError::FrameTooLarge(len).into());
        }
        Ok(())
    }

    fn decode_buffered(&mut self) -> Result<Option<ClientFrame>, TransportError> {
        if let Some(prefix) = self.read_buffer.get(..LENGTH_PREFIX_SIZE) {
            let declared = u32::from_be_bytes([prefix[0], prefix[1], prefix[2], prefix[3]]) as usize;
            if let Err(e) = self.check_size(declared) {
                self.read_buffer.clear();
                return Err(e);
            }
        }

        match codec::decode_from(&mut self.read_buffer) {
            Ok(frame) => Ok(frame),
            Err(e) => {
                // A bad length prefix would poison everything after it
                self.read_buffer.clear();
                Err(e.into())
            }
        }
    }
}

#[async_trait]
impl Connection for WebSocketConnection {
    fn id(&self) -> &ConnectionId {
        &self.id
    }

    async fn recv(&mut self) -> Result<Option<ClientFrame>, TransportError> {
        if let Some(frame) = self.decode_buffered()? {
            return Ok(Some(frame));
        }

        loop {
            let message = self.socket.recv().await;
            if let Some(Ok(_)) = message {
                self.last_activity = Instant::now();
            }

            match message {
                Some(Ok(Message::Text(text))) => {
                    self.check_size(text.len())?;
                    self.encoding = Encoding::Text;
                    trace!(connection = %self.id, size = text.len(), "Text frame");
                    return Ok(Some(codec::decode_text(&text)?));
                }
                Some(Ok(Message::Binary(data))) => {
                    self.check_size(data.len())?;
                    self.encoding = Encoding::Binary;
                    self.read_buffer.extend_from_slice(&data);

                    if let Some(frame) = self.decode_buffered()? {
                        return Ok(Some(frame));
                    }
                    // Need more data, continue reading
                }
                // tungstenite queues the pong itself
                Some(Ok(Message::Ping(_) | Message::Pong(_))) => {
                    trace!(connection = %self.id, "Control frame");
                }
                Some(Ok(Message::Close(_))) => {
                    debug!(connection = %self.id, "Received close frame");
                    self.is_open = false;
                    return Ok(None);
                }
                Some(Err(e)) => {
                    self.is_open = false;
                    return Err(TransportError::ReceiveFailed(e.to_string()));
                }
                None => {
                    debug!(connection = %self.id, "WebSocket stream ended");
                    self.is_open = false;
                    return Ok(None);
                }
            }
        }
    }

    async fn send(&mut self, frame: &ServerFrame) -> Result<(), TransportError> {
        if !self.is_open {
            return Err(TransportError::ConnectionClosed);
        }

        let message = match self.encoding {
            Encoding::Text => Message::Text(codec::encode_text(frame)?),
            Encoding::Binary => Message::Binary(codec::encode(frame)?.to_vec()),
        };

        self.socket.send(message).await.map_err(|e| {
            self.is_open = false;
            TransportError::SendFailed(e.to_string())
        })
    }

    async fn close(&mut self) -> Result<(), TransportError> {
        if !self.is_open {
            return Ok(());
        }
        self.is_open = false;

        self.socket
            .send(Message::Close(None))
            .await
            .map_err(|e| TransportError::SendFailed(e.to_string()))
    }

    fn is_open(&self) -> bool {
        self.is_open
    }

    fn last_activity(&self) -> Instant {
        self.last_activity
    }
}
