//! # parlor-protocol
//!
//! Wire protocol definitions for the Parlor chat hub.
//!
//! This crate defines the frames exchanged between chat clients and the hub,
//! and the codecs used to put them on the wire.
//!
//! ## Frame Types
//!
//! - `ClientFrame` - Actions a client invokes (`Join`, `SendMessage`, `Typing`, ...)
//! - `ServerFrame` - Events the hub pushes (`UserJoined`, `ReceiveMessage`, ...)
//! - `ChatMessage` - A history entry
//!
//! ## Example
//!
//! ```rust
//! use parlor_protocol::{codec, ClientFrame};
//!
//! let frame = ClientFrame::send_message("alice", "Hello, world!");
//!
//! // JSON text frame
//! let text = codec::encode_text(&frame).unwrap();
//! let decoded: ClientFrame = codec::decode_text(&text).unwrap();
//! assert_eq!(frame, decoded);
//!
//! // Length-prefixed MessagePack frame
//! let bytes = codec::encode(&frame).unwrap();
//! let decoded: ClientFrame = codec::decode(&bytes).unwrap();
//! assert_eq!(frame, decoded);
//! ```

pub mod codec;
pub mod frames;

pub use codec::{decode, encode, Encoding, ProtocolError};
pub use frames::{codes, ChatMessage, ClientFrame, ServerFrame, PROTOCOL_VERSION};
