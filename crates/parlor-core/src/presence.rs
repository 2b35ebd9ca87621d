//! Presence tracking for Parlor.
//!
//! The registry maps physical connections to logical usernames. A user is
//! online while at least one connection is bound to their username, so a user
//! with several tabs open joins once and leaves once.

use std::collections::{BTreeMap, HashMap};
use tracing::{debug, warn};

use crate::connection::ConnectionId;

/// Result of removing a connection from the registry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Unregistered {
    /// Username that was bound to the connection.
    pub username: String,
    /// Whether no other live connection maps to that username.
    pub was_last: bool,
}

/// Connection to username registry.
#[derive(Debug, Default)]
pub struct PresenceRegistry {
    /// Connection ID to bound username.
    connections: HashMap<ConnectionId, String>,
    /// Username to number of live connections. Ordered so the online list
    /// comes out sorted without a separate pass.
    users: BTreeMap<String, usize>,
}

impl PresenceRegistry {
    /// Create an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Bind a connection to a username.
    ///
    /// Returns `true` if, after binding, exactly one live connection maps to
    /// `username`, i.e. this is the user's first active session.
    ///
    /// Registering a connection that is already bound rebinds it and releases
    /// the old username first.
    pub fn register(&mut self, connection_id: ConnectionId, username: impl Into<String>) -> bool {
        let username = username.into();

        if let Some(previous) = self.connections.insert(connection_id.clone(), username.clone()) {
            warn!(connection = %connection_id, from = %previous, to = %username, "Presence: connection rebound");
            self.release(&previous);
        }

        let count = self.users.entry(username.clone()).or_insert(0);
        *count += 1;

        debug!(connection = %connection_id, username = %username, sessions = *count, "Presence: registered");

        *count == 1
    }

    /// Remove a connection's binding.
    ///
    /// Returns `None` if the connection was never registered.
    pub fn unregister(&mut self, connection_id: &ConnectionId) -> Option<Unregistered> {
        let username = self.connections.remove(connection_id)?;
        let was_last = self.release(&username);

        debug!(connection = %connection_id, username = %username, was_last, "Presence: unregistered");

        Some(Unregistered { username, was_last })
    }

    /// Distinct online usernames, sorted ascending.
    #[must_use]
    pub fn online_users(&self) -> Vec<String> {
        self.users.keys().cloned().collect()
    }

    /// Username bound to a connection.
    #[must_use]
    pub fn username_of(&self, connection_id: &ConnectionId) -> Option<&str> {
        self.connections.get(connection_id).map(String::as_str)
    }

    /// Number of live connections bound to a username.
    #[must_use]
    pub fn session_count(&self, username: &str) -> usize {
        self.users.get(username).copied().unwrap_or(0)
    }

    /// Check if a user has at least one live connection.
    #[must_use]
    pub fn is_online(&self, username: &str) -> bool {
        self.users.contains_key(username)
    }

    /// Number of bound connections.
    #[must_use]
    pub fn connection_count(&self) -> usize {
        self.connections.len()
    }

    /// Number of distinct online users.
    #[must_use]
    pub fn user_count(&self) -> usize {
        self.users.len()
    }

    /// Drop one session for `username`. Returns `true` if it was the last one.
    fn release(&mut self, username: &str) -> bool {
        match self.users.get_mut(username) {
            Some(count) if *count > 1 => {
                *count -= 1;
                false
            }
            Some(_) => {
                self.users.remove(username);
                true
            }
            None => true,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn id(s: &str) -> ConnectionId {
        ConnectionId::new(s)
    }

    #[test]
    fn test_first_and_last_connection() {
        let mut registry = PresenceRegistry::new();

        assert!(registry.register(id("c1"), "alice"));
        assert!(!registry.register(id("c2"), "alice"));
        assert_eq!(registry.session_count("alice"), 2);
        assert_eq!(registry.online_users(), vec!["alice"]);

        let first = registry.unregister(&id("c1")).unwrap();
        assert_eq!(first.username, "alice");
        assert!(!first.was_last);
        assert!(registry.is_online("alice"));

        let second = registry.unregister(&id("c2")).unwrap();
        assert!(second.was_last);
        assert!(!registry.is_online("alice"));
        assert!(registry.online_users().is_empty());
    }

    #[test]
    fn test_unknown_connection_is_noop() {
        let mut registry = PresenceRegistry::new();
        registry.register(id("c1"), "alice");

        assert!(registry.unregister(&id("missing")).is_none());
        assert_eq!(registry.connection_count(), 1);

        // Unregistering twice is harmless
        assert!(registry.unregister(&id("c1")).is_some());
        assert!(registry.unregister(&id("c1")).is_none());
    }

    #[test]
    fn test_online_users_sorted_and_distinct() {
        let mut registry = PresenceRegistry::new();
        registry.register(id("c1"), "carol");
        registry.register(id("c2"), "alice");
        registry.register(id("c3"), "bob");
        registry.register(id("c4"), "alice");

        assert_eq!(registry.online_users(), vec!["alice", "bob", "carol"]);
        assert_eq!(registry.user_count(), 3);
        assert_eq!(registry.connection_count(), 4);
    }

    #[test]
    fn test_rebind_releases_previous_username() {
        let mut registry = PresenceRegistry::new();
        registry.register(id("c1"), "alice");

        assert!(registry.register(id("c1"), "bob"));
        assert!(!registry.is_online("alice"));
        assert_eq!(registry.username_of(&id("c1")), Some("bob"));
        assert_eq!(registry.online_users(), vec!["bob"]);
    }

    #[test]
    fn test_usernames_are_bare_keys() {
        let mut registry = PresenceRegistry::new();
        registry.register(id("c1"), "Alice");
        registry.register(id("c2"), "alice");

        assert_eq!(registry.online_users(), vec!["Alice", "alice"]);
    }
}
