//! Shared fixtures for Parlor benchmarks.

use parlor_core::{ConnectionId, Publisher, SessionHub};
use parlor_transport::{ConnectionTable, Outbox};
use std::sync::Arc;

/// A hub wired to a connection table, with a set of joined users.
pub struct Room {
    /// The hub under test.
    pub hub: SessionHub,
    /// Outbound queues.
    pub table: Arc<ConnectionTable>,
    /// Connection IDs and outboxes, one per user.
    pub members: Vec<(ConnectionId, Outbox)>,
}

impl Room {
    /// Create an empty room.
    #[must_use]
    pub fn new() -> Self {
        let table = Arc::new(ConnectionTable::with_capacity(usize::MAX));
        let publisher: Arc<dyn Publisher> = table.clone();
        Self {
            hub: SessionHub::new(publisher),
            table,
            members: Vec::new(),
        }
    }

    /// Create a room with `users` distinct users, one connection each.
    ///
    /// Join traffic is drained before returning.
    pub async fn with_users(users: usize) -> Self {
        let mut room = Self::new();
        for i in 0..users {
            room.add(&format!("user-{i}")).await;
        }
        room.drain();
        room
    }

    /// Open a connection and join it as `username`.
    pub async fn add(&mut self, username: &str) -> ConnectionId {
        let id = ConnectionId::generate();
        let outbox = self
            .table
            .open(id.clone())
            .unwrap_or_else(|e| panic!("failed to open {id}: {e}"));
        if let Err(e) = self.hub.connect(&id, Some(username)).await {
            panic!("failed to join {username}: {e}");
        }
        self.members.push((id.clone(), outbox));
        id
    }

    /// Discard every queued frame. Returns how many there were.
    pub fn drain(&mut self) -> usize {
        let mut drained = 0;
        for (_, outbox) in &mut self.members {
            while outbox.try_recv().is_ok() {
                drained += 1;
            }
        }
        drained
    }
}

impl Default for Room {
    fn default() -> Self {
        Self::new()
    }
}
