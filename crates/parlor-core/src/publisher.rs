//! Outbound boundary between the hub and the transport.
//!
//! The hub decides *what* to send and *to whom*; a [`Publisher`] owns the
//! physical connections and does the delivery.

use parlor_protocol::ServerFrame;
use std::sync::Arc;

use crate::connection::ConnectionId;

/// Recipients of a broadcast.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Audience {
    /// Every live connection.
    All,
    /// Every live connection except one (usually the sender).
    AllExcept(ConnectionId),
    /// A single connection.
    Only(ConnectionId),
}

impl Audience {
    /// Check if a connection is part of this audience.
    #[must_use]
    pub fn includes(&self, connection_id: &ConnectionId) -> bool {
        match self {
            Audience::All => true,
            Audience::AllExcept(excluded) => excluded != connection_id,
            Audience::Only(target) => target == connection_id,
        }
    }
}

/// A frame addressed to an audience.
#[derive(Debug, Clone)]
pub struct Broadcast {
    /// Who receives the frame.
    pub audience: Audience,
    /// The frame, shared between recipients.
    pub frame: Arc<ServerFrame>,
}

impl Broadcast {
    /// Create a new broadcast.
    #[must_use]
    pub fn new(audience: Audience, frame: ServerFrame) -> Self {
        Self {
            audience,
            frame: Arc::new(frame),
        }
    }
}

/// Delivers broadcasts to connections.
///
/// `publish` is called while the hub holds its state lock, so it must not
/// block: implementations enqueue and return. Frames enqueued for one
/// connection must be delivered in the order they were published. Delivery
/// failures stay inside the publisher.
pub trait Publisher: Send + Sync {
    /// Enqueue a broadcast for delivery.
    fn publish(&self, broadcast: Broadcast);
}


#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_audience_includes() {
        let a = ConnectionId::new("a");
        let b = ConnectionId::new("b");

        assert!(Audience::All.includes(&a));
        assert!(!Audience::AllExcept(a.clone()).includes(&a));
        assert!(Audience::AllExcept(a.clone()).includes(&b));
        assert!(Audience::Only(a.clone()).includes(&a));
        assert!(!Audience::Only(a).includes(&b));
    }
}
