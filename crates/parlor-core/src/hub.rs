//! The session hub.
//!
//! The hub is the single owner of presence, typing and history state. Every
//! transport event goes through one lock, and broadcasts are published while
//! that lock is held, so each connection sees events in the order the hub
//! applied them.
//!
//! Connection lifecycle:
//!
//! ```text
//!  connect ──▶ Anonymous ──join──▶ Joined ──disconnect──▶ Closed
//!                 │                  │ ▲
//!                 └──disconnect──▶ Closed  message / typing
//! ```

use parlor_protocol::{ChatMessage, ClientFrame, ServerFrame};
use std::collections::HashSet;
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::Mutex;
use tracing::{debug, info};

use crate::connection::ConnectionId;
use crate::history::MessageLog;
use crate::presence::{PresenceRegistry, Unregistered};
use crate::publisher::{Audience, Broadcast, Publisher};
use crate::typing::TypingTracker;

/// Rejected hub operations.
///
/// A rejection leaves the state untouched and broadcasts nothing. None of
/// them is fatal to the connection.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum HubError {
    /// The connection was never opened or is already closed.
    #[error("Unknown connection: {0}")]
    UnknownConnection(ConnectionId),

    /// Join with an empty or whitespace-only username.
    #[error("Username cannot be blank")]
    BlankUsername,

    /// The connection is already bound to a username.
    #[error("Connection {connection} already joined as '{username}'")]
    AlreadyJoined {
        connection: ConnectionId,
        username: String,
    },

    /// A chat action on a connection that has not joined.
    #[error("Connection has not joined: {0}")]
    NotJoined(ConnectionId),
}

/// Lifecycle state of a connection as seen by the hub.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConnectionState {
    /// Connected, no username bound.
    Anonymous,
    /// Bound to a username.
    Joined(String),
    /// Not connected (closed, or never seen).
    Closed,
}

/// Hub statistics.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct HubStats {
    /// Live connections, joined or not.
    pub connections: usize,
    /// Distinct online users.
    pub users: usize,
    /// Messages in the history.
    pub messages: usize,
    /// Users flagged as typing.
    pub typing: usize,
}

#[derive(Debug, Default)]
struct HubState {
    connections: HashSet<ConnectionId>,
    presence: PresenceRegistry,
    typing: TypingTracker,
    log: MessageLog,
}

/// Orchestrates presence, typing and history for all connections.
///
/// Construct one per process and share it (behind an `Arc`) with the
/// transport layer.
pub struct SessionHub {
    state: Mutex<HubState>,
    publisher: Arc<dyn Publisher>,
}

impl SessionHub {
    /// Create a hub that delivers through `publisher`.
    #[must_use]
    pub fn new(publisher: Arc<dyn Publisher>) -> Self {
        Self {
            state: Mutex::new(HubState::default()),
            publisher,
        }
    }

    /// Register a new physical connection.
    ///
    /// If the transport supplied a non-blank username (e.g. a query
    /// parameter), the connection joins immediately.
    ///
    /// # Errors
    ///
    /// Returns the join rejection, if any. The connection stays open as
    /// `Anonymous` in that case.
    pub async fn connect(
        &self,
        connection_id: &ConnectionId,
        query_username: Option<&str>,
    ) -> Result<(), HubError> {
        let mut state = self.state.lock().await;
        state.connections.insert(connection_id.clone());
        debug!(connection = %connection_id, "Hub: connection opened");

        match query_username {
            Some(username) if !username.trim().is_empty() => {
                self.join_locked(&mut state, connection_id, username)?;
                Ok(())
            }
            _ => Ok(()),
        }
    }

    /// Bind a username to an anonymous connection.
    ///
    /// Returns `true` if this was the user's first live connection.
    ///
    /// # Errors
    ///
    /// Rejects blank usernames, unknown connections, and connections that
    /// have already joined.
    pub async fn join(&self, connection_id: &ConnectionId, username: &str) -> Result<bool, HubError> {
        let mut state = self.state.lock().await;
        self.join_locked(&mut state, connection_id, username)
    }

    /// Close a connection.
    ///
    /// Returns the username that was bound to it. Unknown connections are a
    /// no-op.
    pub async fn disconnect(&self, connection_id: &ConnectionId) -> Option<String> {
        let mut state = self.state.lock().await;
        let was_open = state.connections.remove(connection_id);

        let Some(Unregistered { username, was_last }) = state.presence.unregister(connection_id)
        else {
            if was_open {
                debug!(connection = %connection_id, "Hub: anonymous connection closed");
            }
            return None;
        };

        if was_last {
            state.typing.clear_typing(&username);
            info!(connection = %connection_id, username = %username, "Hub: user left");
            self.publish(
                Audience::AllExcept(connection_id.clone()),
                ServerFrame::user_left(username.clone()),
            );
            self.publish_user_list(&state);
        } else {
            debug!(
                connection = %connection_id,
                username = %username,
                remaining = state.presence.session_count(&username),
                "Hub: session closed"
            );
        }

        Some(username)
    }

    /// Append a message to the history and send it to everyone, sender
    /// included.
    ///
    /// # Errors
    ///
    /// Returns [`HubError::NotJoined`] if the connection has not joined.
    pub async fn send_message(
        &self,
        connection_id: &ConnectionId,
        body: &str,
    ) -> Result<ChatMessage, HubError> {
        let mut state = self.state.lock().await;
        let username = Self::bound_username(&state, connection_id)?;

        let message = state.log.append(username, body);
        debug!(
            connection = %connection_id,
            username = %message.username,
            position = state.log.len(),
            "Hub: message appended"
        );
        self.publish(Audience::All, ServerFrame::receive_message(&message));

        Ok(message)
    }

    /// Flag the connection's user as typing and tell everyone else.
    ///
    /// Returns the username the indicator was raised for.
    ///
    /// # Errors
    ///
    /// Returns [`HubError::NotJoined`] if the connection has not joined.
    pub async fn typing(&self, connection_id: &ConnectionId) -> Result<String, HubError> {
        let mut state = self.state.lock().await;
        let username = Self::bound_username(&state, connection_id)?;

        state.typing.set_typing(&username);
        self.publish(
            Audience::AllExcept(connection_id.clone()),
            ServerFrame::user_typing(username.clone()),
        );

        Ok(username)
    }

    /// Clear the connection's user typing flag and tell everyone else.
    ///
    /// # Errors
    ///
    /// Returns [`HubError::NotJoined`] if the connection has not joined.
    pub async fn stop_typing(&self, connection_id: &ConnectionId) -> Result<String, HubError> {
        let mut state = self.state.lock().await;
        let username = Self::bound_username(&state, connection_id)?;

        state.typing.clear_typing(&username);
        self.publish(
            Audience::AllExcept(connection_id.clone()),
            ServerFrame::user_stopped_typing(username.clone()),
        );

        Ok(username)
    }

    /// Dispatch an inbound client frame.
    ///
    /// # Errors
    ///
    /// Returns the rejection of the underlying operation.
    pub async fn handle(&self, connection_id: &ConnectionId, frame: ClientFrame) -> Result<(), HubError> {
        match frame {
            ClientFrame::Join { username } => {
                self.join(connection_id, &username).await?;
            }
            ClientFrame::SendMessage { username, body } => {
                let message = self.send_message(connection_id, &body).await?;
                note_claim_mismatch(connection_id, &username, &message.username);
            }
            ClientFrame::Typing { username } => {
                let bound = self.typing(connection_id).await?;
                note_claim_mismatch(connection_id, &username, &bound);
            }
            ClientFrame::StopTyping { username } => {
                let bound = self.stop_typing(connection_id).await?;
                note_claim_mismatch(connection_id, &username, &bound);
            }
            ClientFrame::Ping { timestamp } => {
                self.publish(
                    Audience::Only(connection_id.clone()),
                    ServerFrame::Pong { timestamp },
                );
            }
        }
        Ok(())
    }

    /// Distinct online usernames, sorted ascending.
    pub async fn online_users(&self) -> Vec<String> {
        self.state.lock().await.presence.online_users()
    }

    /// Users currently typing, sorted ascending.
    pub async fn typing_users(&self) -> Vec<String> {
        self.state.lock().await.typing.snapshot()
    }

    /// Full message history in append order.
    pub async fn history(&self) -> Vec<ChatMessage> {
        self.state.lock().await.log.history()
    }

    /// Lifecycle state of a connection.
    pub async fn connection_state(&self, connection_id: &ConnectionId) -> ConnectionState {
        let state = self.state.lock().await;
        match state.presence.username_of(connection_id) {
            Some(username) => ConnectionState::Joined(username.to_string()),
            None if state.connections.contains(connection_id) => ConnectionState::Anonymous,
            None => ConnectionState::Closed,
        }
    }

    /// Current hub statistics.
    pub async fn stats(&self) -> HubStats {
        let state = self.state.lock().await;
        HubStats {
            connections: state.connections.len(),
            users: state.presence.user_count(),
            messages: state.log.len(),
            typing: state.typing.len(),
        }
    }

    fn join_locked(
        &self,
        state: &mut HubState,
        connection_id: &ConnectionId,
        username: &str,
    ) -> Result<bool, HubError> {
        if !state.connections.contains(connection_id) {
            return Err(HubError::UnknownConnection(connection_id.clone()));
        }
        if username.trim().is_empty() {
            return Err(HubError::BlankUsername);
        }
        if let Some(bound) = state.presence.username_of(connection_id) {
            return Err(HubError::AlreadyJoined {
                connection: connection_id.clone(),
                username: bound.to_string(),
            });
        }

        let first = state.presence.register(connection_id.clone(), username);

        if first {
            info!(connection = %connection_id, username = %username, "Hub: user joined");
            self.publish(
                Audience::AllExcept(connection_id.clone()),
                ServerFrame::user_joined(username),
            );
        } else {
            debug!(
                connection = %connection_id,
                username = %username,
                sessions = state.presence.session_count(username),
                "Hub: additional session joined"
            );
        }

        self.publish(
            Audience::Only(connection_id.clone()),
            ServerFrame::LoadMessages {
                messages: state.log.history(),
            },
        );
        self.publish_user_list(state);

        Ok(first)
    }

    fn bound_username(state: &HubState, connection_id: &ConnectionId) -> Result<String, HubError> {
        state
            .presence
            .username_of(connection_id)
            .map(str::to_string)
            .ok_or_else(|| HubError::NotJoined(connection_id.clone()))
    }

    fn publish_user_list(&self, state: &HubState) {
        self.publish(
            Audience::All,
            ServerFrame::UserListUpdated {
                users: state.presence.online_users(),
            },
        );
    }

    fn publish(&self, audience: Audience, frame: ServerFrame) {
        self.publisher.publish(Broadcast::new(audience, frame));
    }
}

/// Clients repeat their username on every action; the bound one wins.
fn note_claim_mismatch(connection_id: &ConnectionId, claimed: &str, bound: &str) {
    if !claimed.is_empty() && claimed != bound {
        debug!(
            connection = %connection_id,
            claimed = %claimed,
            bound = %bound,
            "Hub: ignoring claimed username"
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::publisher::testing::RecordingPublisher;

    fn id(s: &str) -> ConnectionId {
        ConnectionId::new(s)
    }

    fn hub() -> (SessionHub, Arc<RecordingPublisher>) {
        let publisher = RecordingPublisher::new();
        (SessionHub::new(publisher.clone()), publisher)
    }

    async fn joined(hub: &SessionHub, conn: &str, username: &str) -> ConnectionId {
        let conn = id(conn);
        hub.connect(&conn, Some(username)).await.unwrap();
        conn
    }

    #[tokio::test]
    async fn test_multiple_sessions_join_and_leave_once() {
        let (hub, publisher) = hub();

        let a1 = joined(&hub, "a1", "alice").await;
        let a2 = joined(&hub, "a2", "alice").await;
        assert_eq!(publisher.count("UserJoined"), 1);
        assert_eq!(hub.online_users().await, vec!["alice"]);

        assert_eq!(hub.disconnect(&a1).await.as_deref(), Some("alice"));
        assert_eq!(publisher.count("UserLeft"), 0);
        assert_eq!(hub.online_users().await, vec!["alice"]);

        hub.disconnect(&a2).await;
        assert_eq!(publisher.count("UserLeft"), 1);
        assert!(hub.online_users().await.is_empty());
    }

    #[tokio::test]
    async fn test_join_broadcast_audiences() {
        let (hub, publisher) = hub();
        let bob = joined(&hub, "b1", "bob").await;
        publisher.clear();

        let alice = joined(&hub, "a1", "alice").await;

        // Joiner gets history then the user list, never its own UserJoined
        let alice_frames = publisher.frames_for(&alice);
        assert_eq!(
            alice_frames,
            vec![
                ServerFrame::LoadMessages { messages: vec![] },
                ServerFrame::UserListUpdated {
                    users: vec!["alice".into(), "bob".into()]
                },
            ]
        );

        // Others get the join notice and the user list, not the history
        let bob_frames = publisher.frames_for(&bob);
        assert_eq!(
            bob_frames,
            vec![
                ServerFrame::user_joined("alice"),
                ServerFrame::UserListUpdated {
                    users: vec!["alice".into(), "bob".into()]
                },
            ]
        );
    }

    #[tokio::test]
    async fn test_message_reaches_everyone_with_same_timestamp() {
        let (hub, publisher) = hub();
        let a1 = joined(&hub, "a1", "alice").await;
        let a2 = joined(&hub, "a2", "alice").await;
        let b1 = joined(&hub, "b1", "bob").await;
        publisher.clear();

        let message = hub.send_message(&a1, "hi").await.unwrap();
        let expected = ServerFrame::receive_message(&message);

        for conn in [&a1, &a2, &b1] {
            assert_eq!(publisher.frames_for(conn), vec![expected.clone()]);
        }
        assert_eq!(hub.history().await, vec![message]);
    }

    #[tokio::test]
    async fn test_history_replayed_to_new_connection() {
        let (hub, publisher) = hub();
        let alice = joined(&hub, "a1", "alice").await;
        let first = hub.send_message(&alice, "one").await.unwrap();
        let second = hub.send_message(&alice, "two").await.unwrap();
        let third = hub.send_message(&alice, "one").await.unwrap();

        let bob = joined(&hub, "b1", "bob").await;
        let replay = publisher
            .frames_for(&bob)
            .into_iter()
            .find_map(|frame| match frame {
                ServerFrame::LoadMessages { messages } => Some(messages),
                _ => None,
            })
            .unwrap();

        assert_eq!(replay, vec![first, second, third]);
    }

    #[tokio::test]
    async fn test_typing_cleared_on_last_disconnect() {
        let (hub, publisher) = hub();
        let alice = joined(&hub, "a1", "alice").await;
        let bob = joined(&hub, "b1", "bob").await;

        hub.typing(&bob).await.unwrap();
        assert_eq!(hub.typing_users().await, vec!["bob"]);
        assert_eq!(publisher.frames_for(&alice).last(), Some(&ServerFrame::user_typing("bob")));
        assert!(!publisher.frames_for(&bob).contains(&ServerFrame::user_typing("bob")));

        hub.disconnect(&bob).await;
        assert!(hub.typing_users().await.is_empty());
    }

    #[tokio::test]
    async fn test_typing_survives_non_last_disconnect() {
        let (hub, _) = hub();
        let b1 = joined(&hub, "b1", "bob").await;
        let b2 = joined(&hub, "b2", "bob").await;

        hub.typing(&b1).await.unwrap();
        hub.disconnect(&b1).await;
        assert_eq!(hub.typing_users().await, vec!["bob"]);

        hub.disconnect(&b2).await;
        assert!(hub.typing_users().await.is_empty());
    }

    #[tokio::test]
    async fn test_typing_notifies_even_when_already_typing() {
        let (hub, publisher) = hub();
        let bob = joined(&hub, "b1", "bob").await;

        hub.typing(&bob).await.unwrap();
        hub.typing(&bob).await.unwrap();
        assert_eq!(publisher.count("UserTyping"), 2);

        hub.stop_typing(&bob).await.unwrap();
        hub.stop_typing(&bob).await.unwrap();
        assert_eq!(publisher.count("UserStoppedTyping"), 2);
        assert!(hub.typing_users().await.is_empty());
    }

    #[tokio::test]
    async fn test_anonymous_actions_are_rejected() {
        let (hub, publisher) = hub();
        let anon = id("anon");
        hub.connect(&anon, None).await.unwrap();
        assert_eq!(hub.connection_state(&anon).await, ConnectionState::Anonymous);

        assert_eq!(
            hub.send_message(&anon, "hi").await,
            Err(HubError::NotJoined(anon.clone()))
        );
        assert!(hub.typing(&anon).await.is_err());
        assert!(hub.stop_typing(&anon).await.is_err());

        assert!(publisher.broadcasts().is_empty());
        assert!(hub.history().await.is_empty());
        assert_eq!(hub.connection_state(&anon).await, ConnectionState::Anonymous);
    }

    #[tokio::test]
    async fn test_blank_username_rejected() {
        let (hub, publisher) = hub();
        let conn = id("c1");

        // Blank query parameter leaves the connection anonymous
        hub.connect(&conn, Some("   ")).await.unwrap();
        assert_eq!(hub.connection_state(&conn).await, ConnectionState::Anonymous);

        assert_eq!(hub.join(&conn, "").await, Err(HubError::BlankUsername));
        assert_eq!(hub.join(&conn, " \t").await, Err(HubError::BlankUsername));
        assert!(publisher.broadcasts().is_empty());

        assert!(hub.join(&conn, "alice").await.unwrap());
        assert_eq!(
            hub.connection_state(&conn).await,
            ConnectionState::Joined("alice".into())
        );
    }

    #[tokio::test]
    async fn test_joined_connection_is_never_rebound() {
        let (hub, publisher) = hub();
        let conn = joined(&hub, "c1", "alice").await;
        publisher.clear();

        assert!(matches!(
            hub.join(&conn, "mallory").await,
            Err(HubError::AlreadyJoined { .. })
        ));
        assert_eq!(hub.online_users().await, vec!["alice"]);
        assert!(publisher.broadcasts().is_empty());
    }

    #[tokio::test]
    async fn test_unknown_and_closed_connections() {
        let (hub, publisher) = hub();
        let ghost = id("ghost");

        assert_eq!(hub.disconnect(&ghost).await, None);
        assert_eq!(
            hub.join(&ghost, "alice").await,
            Err(HubError::UnknownConnection(ghost.clone()))
        );

        let conn = joined(&hub, "c1", "alice").await;
        hub.disconnect(&conn).await;
        assert_eq!(hub.connection_state(&conn).await, ConnectionState::Closed);

        // A second disconnect is harmless and emits nothing new
        let before = publisher.broadcasts().len();
        assert_eq!(hub.disconnect(&conn).await, None);
        assert_eq!(publisher.broadcasts().len(), before);
        assert!(hub.send_message(&conn, "late").await.is_err());
    }

    #[tokio::test]
    async fn test_handle_dispatches_frames() {
        let (hub, publisher) = hub();
        let conn = id("c1");
        hub.connect(&conn, None).await.unwrap();

        hub.handle(&conn, ClientFrame::join("alice")).await.unwrap();
        hub.handle(&conn, ClientFrame::typing("alice")).await.unwrap();
        hub.handle(&conn, ClientFrame::send_message("someone-else", "hi"))
            .await
            .unwrap();
        hub.handle(&conn, ClientFrame::Ping { timestamp: Some(7) })
            .await
            .unwrap();

        // Bound username wins over the claimed one
        let history = hub.history().await;
        assert_eq!(history.len(), 1);
        assert_eq!(history[0].username, "alice");

        assert_eq!(
            publisher.frames_for(&conn).last(),
            Some(&ServerFrame::Pong { timestamp: Some(7) })
        );
    }

    #[tokio::test]
    async fn test_user_list_converges_regardless_of_join_order() {
        for order in [["alice", "bob"], ["bob", "alice"]] {
            let (hub, publisher) = hub();
            for (i, name) in order.iter().enumerate() {
                joined(&hub, &format!("c{}", i), name).await;
            }

            let last_list = publisher
                .broadcasts()
                .into_iter()
                .rev()
                .find_map(|b| match &*b.frame {
                    ServerFrame::UserListUpdated { users } => Some(users.clone()),
                    _ => None,
                })
                .unwrap();
            assert_eq!(last_list, vec!["alice", "bob"]);
        }
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_sessions_keep_presence_consistent() {
        let (hub, publisher) = hub();
        let hub = Arc::new(hub);

        let mut handles = Vec::new();
        for user in 0..16 {
            for session in 0..3 {
                let hub = hub.clone();
                handles.push(tokio::spawn(async move {
                    let conn = ConnectionId::new(format!("u{}-s{}", user, session));
                    let username = format!("user-{:02}", user);
                    hub.connect(&conn, Some(username.as_str())).await.unwrap();
                    conn
                }));
            }
        }

        let mut conns = Vec::new();
        for handle in handles {
            conns.push(handle.await.unwrap());
        }

        let expected: Vec<String> = (0..16).map(|u| format!("user-{:02}", u)).collect();
        assert_eq!(hub.online_users().await, expected);
        assert_eq!(publisher.count("UserJoined"), 16);

        let mut handles = Vec::new();
        for conn in conns {
            let hub = hub.clone();
            handles.push(tokio::spawn(async move {
                hub.typing(&conn).await.unwrap();
                hub.disconnect(&conn).await;
            }));
        }
        for handle in handles {
            handle.await.unwrap();
        }

        assert_eq!(publisher.count("UserLeft"), 16);
        assert!(hub.online_users().await.is_empty());
        assert!(hub.typing_users().await.is_empty());
        assert_eq!(hub.stats().await, HubStats::default());
    }
}
