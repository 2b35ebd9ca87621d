//! Append-only chat history.

use parlor_protocol::ChatMessage;
use std::time::{SystemTime, UNIX_EPOCH};

/// Current wall-clock time in milliseconds since the Unix epoch.
///
/// Not monotonic: a clock adjustment can make a later message carry an
/// earlier timestamp. Ordering comes from the log position, not the time.
#[must_use]
pub fn now_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or_default()
}

/// Ordered, append-only message history.
///
/// Entries are never mutated or removed and the log is not bounded.
#[derive(Debug, Default)]
pub struct MessageLog {
    entries: Vec<ChatMessage>,
}

impl MessageLog {
    /// Create an empty log.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a message stamped with the current time.
    ///
    /// Returns the stored entry.
    pub fn append(&mut self, username: impl Into<String>, body: impl Into<String>) -> ChatMessage {
        self.append_at(username, body, now_millis())
    }

    /// Append a message with an explicit timestamp.
    pub fn append_at(
        &mut self,
        username: impl Into<String>,
        body: impl Into<String>,
        timestamp: u64,
    ) -> ChatMessage {
        let message = ChatMessage::new(username, body, timestamp);
        self.entries.push(message.clone());
        message
    }

    /// Full history in append order.
    #[must_use]
    pub fn history(&self) -> Vec<ChatMessage> {
        self.entries.clone()
    }

    /// Borrow the stored entries.
    #[must_use]
    pub fn entries(&self) -> &[ChatMessage] {
        &self.entries
    }

    /// Number of stored messages.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Check if the log is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_history_preserves_append_order() {
        let mut log = MessageLog::new();
        log.append_at("alice", "one", 30);
        log.append_at("bob", "two", 10);
        log.append_at("alice", "three", 20);

        let bodies: Vec<_> = log.history().into_iter().map(|m| m.body).collect();
        assert_eq!(bodies, vec!["one", "two", "three"]);
    }

    #[test]
    fn test_append_returns_stored_entry() {
        let mut log = MessageLog::new();
        let before = now_millis();
        let message = log.append("alice", "hi");

        assert_eq!(message.username, "alice");
        assert_eq!(message.body, "hi");
        assert!(message.timestamp >= before);
        assert_eq!(log.entries(), &[message]);
    }

    #[test]
    fn test_duplicate_bodies_are_kept() {
        let mut log = MessageLog::new();
        log.append("alice", "hi");
        log.append("alice", "hi");

        assert_eq!(log.len(), 2);
    }
}
