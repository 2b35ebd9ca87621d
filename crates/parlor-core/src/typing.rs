//! Typing indicator state.
//!
//! Membership is a plain flag per username: a user typing in two tabs is
//! still one entry. Expiry is driven by clients sending `StopTyping`; the
//! only server-side clear happens when the user's last connection closes.

use std::collections::BTreeSet;
use tracing::trace;

/// Set of usernames currently flagged as typing.
#[derive(Debug, Default)]
pub struct TypingTracker {
    typing: BTreeSet<String>,
}

impl TypingTracker {
    /// Create an empty tracker.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Mark a user as typing.
    ///
    /// Returns `true` if the user was not already marked.
    pub fn set_typing(&mut self, username: &str) -> bool {
        let inserted = self.typing.insert(username.to_string());
        trace!(username = %username, inserted, "Typing: set");
        inserted
    }

    /// Unmark a user. Unknown usernames are ignored.
    ///
    /// Returns `true` if the user was marked.
    pub fn clear_typing(&mut self, username: &str) -> bool {
        let removed = self.typing.remove(username);
        trace!(username = %username, removed, "Typing: cleared");
        removed
    }

    /// Check if a user is marked as typing.
    #[must_use]
    pub fn is_typing(&self, username: &str) -> bool {
        self.typing.contains(username)
    }

    /// Users currently typing, sorted ascending.
    #[must_use]
    pub fn snapshot(&self) -> Vec<String> {
        self.typing.iter().cloned().collect()
    }

    /// Number of users typing.
    #[must_use]
    pub fn len(&self) -> usize {
        self.typing.len()
    }

    /// Check if nobody is typing.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.typing.is_empty()
    }
}
