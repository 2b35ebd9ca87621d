//! # parlor-core
//!
//! Session and presence state for the Parlor chat hub.
//!
//! This crate holds everything that has to stay consistent while many
//! connections act at once:
//!
//! - **PresenceRegistry** - Maps connections to usernames, one join/leave per user
//! - **TypingTracker** - Who is typing right now
//! - **MessageLog** - Append-only history replayed to new connections
//! - **SessionHub** - Applies transport events and decides what to broadcast
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────┐ events ┌─────────────┐ broadcasts ┌─────────────┐
//! │  Transport  │───────▶│ SessionHub  │───────────▶│  Publisher  │
//! └─────────────┘        └─────────────┘            └─────────────┘
//!                          │    │    │
//!               ┌──────────┘    │    └─────────┐
//!               ▼               ▼              ▼
//!        ┌────────────┐  ┌────────────┐  ┌────────────┐
//!        │  Presence  │  │   Typing   │  │ MessageLog │
//!        └────────────┘  └────────────┘  └────────────┘
//! ```

pub mod connection;
pub mod history;
pub mod hub;
pub mod presence;
pub mod publisher;
pub mod typing;

pub use connection::ConnectionId;
pub use history::MessageLog;
pub use hub::{ConnectionState, HubError, HubStats, SessionHub};
pub use presence::{PresenceRegistry, Unregistered};
pub use publisher::{Audience, Broadcast, Publisher};
pub use typing::TypingTracker;
