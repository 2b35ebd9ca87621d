//! Frame types for the Parlor protocol.
//!
//! Clients send [`ClientFrame`]s to invoke hub actions; the hub answers with
//! [`ServerFrame`]s naming the event a client should react to. Both are tagged
//! on a `"type"` field so the same definitions serialize to JSON and to
//! MessagePack.

use serde::{Deserialize, Serialize};

/// Current protocol version, advertised in [`ServerFrame::Connected`].
pub const PROTOCOL_VERSION: u8 = 1;

/// Error codes carried by [`ServerFrame::Error`].
pub mod codes {
    /// The frame could not be decoded.
    pub const INVALID_FRAME: u16 = 4000;
    /// The frame exceeded the configured size limit.
    pub const FRAME_TOO_LARGE: u16 = 4001;
    /// The server is not accepting more connections.
    pub const SERVER_FULL: u16 = 4002;
}

/// A chat message as stored in the history and sent to clients.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    /// Author username.
    pub username: String,
    /// Message text.
    pub body: String,
    /// Server-assigned wall-clock time, milliseconds since the Unix epoch.
    pub timestamp: u64,
}

impl ChatMessage {
    /// Create a new chat message.
    #[must_use]
    pub fn new(username: impl Into<String>, body: impl Into<String>, timestamp: u64) -> Self {
        Self {
            username: username.into(),
            body: body.into(),
            timestamp,
        }
    }
}

/// A frame sent by a client.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum ClientFrame {
    /// Bind a username to this connection.
    Join {
        /// Username to join as.
        username: String,
    },

    /// Post a chat message.
    SendMessage {
        /// Username claimed by the client. The hub uses the bound username.
        #[serde(default)]
        username: String,
        /// Message text.
        body: String,
    },

    /// The user started typing.
    Typing {
        /// Username claimed by the client.
        #[serde(default)]
        username: String,
    },

    /// The user stopped typing.
    StopTyping {
        /// Username claimed by the client.
        #[serde(default)]
        username: String,
    },

    /// Keepalive ping.
    Ping {
        /// Optional timestamp echoed back in the pong.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        timestamp: Option<u64>,
    },
}

impl ClientFrame {
    /// Name of the action this frame invokes.
    #[must_use]
    pub fn action_name(&self) -> &'static str {
        match self {
            ClientFrame::Join { .. } => "Join",
            ClientFrame::SendMessage { .. } => "SendMessage",
            ClientFrame::Typing { .. } => "Typing",
            ClientFrame::StopTyping { .. } => "StopTyping",
            ClientFrame::Ping { .. } => "Ping",
        }
    }

    /// Create a Join frame.
    #[must_use]
    pub fn join(username: impl Into<String>) -> Self {
        ClientFrame::Join {
            username: username.into(),
        }
    }

    /// Create a SendMessage frame.
    #[must_use]
    pub fn send_message(username: impl Into<String>, body: impl Into<String>) -> Self {
        ClientFrame::SendMessage {
            username: username.into(),
            body: body.into(),
        }
    }

    /// Create a Typing frame.
    #[must_use]
    pub fn typing(username: impl Into<String>) -> Self {
        ClientFrame::Typing {
            username: username.into(),
        }
    }

    /// Create a StopTyping frame.
    #[must_use]
    pub fn stop_typing(username: impl Into<String>) -> Self {
        ClientFrame::StopTyping {
            username: username.into(),
        }
    }
}

/// A frame sent by the server.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum ServerFrame {
    /// Connection established.
    Connected {
        /// Identifier the server assigned to this connection.
        connection_id: String,
        /// Protocol version.
        version: u8,
        /// Recommended heartbeat interval in milliseconds.
        heartbeat: u32,
    },

    /// A user came online.
    UserJoined { username: String },

    /// A user went offline.
    UserLeft { username: String },

    /// Full message history, oldest first.
    LoadMessages { messages: Vec<ChatMessage> },

    /// Distinct online usernames, sorted ascending.
    UserListUpdated { users: Vec<String> },

    /// A new chat message.
    ReceiveMessage {
        username: String,
        body: String,
        timestamp: u64,
    },

    /// A user started typing.
    UserTyping { username: String },

    /// A user stopped typing.
    UserStoppedTyping { username: String },

    /// Keepalive pong.
    Pong {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        timestamp: Option<u64>,
    },

    /// The previous client frame was rejected.
    Error {
        /// Error code, see [`codes`].
        code: u16,
        /// Human-readable reason.
        message: String,
    },
}

impl ServerFrame {
    /// Event name clients dispatch on.
    #[must_use]
    pub fn event_name(&self) -> &'static str {
        match self {
            ServerFrame::Connected { .. } => "Connected",
            ServerFrame::UserJoined { .. } => "UserJoined",
            ServerFrame::UserLeft { .. } => "UserLeft",
            ServerFrame::LoadMessages { .. } => "LoadMessages",
            ServerFrame::UserListUpdated { .. } => "UserListUpdated",
            ServerFrame::ReceiveMessage { .. } => "ReceiveMessage",
            ServerFrame::UserTyping { .. } => "UserTyping",
            ServerFrame::UserStoppedTyping { .. } => "UserStoppedTyping",
            ServerFrame::Pong { .. } => "Pong",
            ServerFrame::Error { .. } => "Error",
        }
    }

    /// Create a Connected frame.
    #[must_use]
    pub fn connected(connection_id: impl Into<String>, heartbeat: u32) -> Self {
        ServerFrame::Connected {
            connection_id: connection_id.into(),
            version: PROTOCOL_VERSION,
            heartbeat,
        }
    }

    /// Create a UserJoined frame.
    #[must_use]
    pub fn user_joined(username: impl Into<String>) -> Self {
        ServerFrame::UserJoined {
            username: username.into(),
        }
    }

    /// Create a UserLeft frame.
    #[must_use]
    pub fn user_left(username: impl Into<String>) -> Self {
        ServerFrame::UserLeft {
            username: username.into(),
        }
    }

    /// Create a UserTyping frame.
    #[must_use]
    pub fn user_typing(username: impl Into<String>) -> Self {
        ServerFrame::UserTyping {
            username: username.into(),
        }
    }

    /// Create a UserStoppedTyping frame.
    #[must_use]
    pub fn user_stopped_typing(username: impl Into<String>) -> Self {
        ServerFrame::UserStoppedTyping {
            username: username.into(),
        }
    }

    /// Create a ReceiveMessage frame from a stored message.
    #[must_use]
    pub fn receive_message(message: &ChatMessage) -> Self {
        ServerFrame::ReceiveMessage {
            username: message.username.clone(),
            body: message.body.clone(),
            timestamp: message.timestamp,
        }
    }

    /// Create an Error frame.
    #[must_use]
    pub fn error(code: u16, message: impl Into<String>) -> Self {
        ServerFrame::Error {
            code,
            message: message.into(),
        }
    }
}
