//! Per-connection outbound queues.
//!
//! The [`ConnectionTable`] is the hub's [`Publisher`]: it resolves an
//! [`Audience`] against the live connections and enqueues the shared frame on
//! each recipient's unbounded queue. Enqueueing never blocks, so the hub can
//! publish while holding its lock, and a single queue receives frames in the
//! order they were published.

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use parlor_core::{Audience, Broadcast, ConnectionId, Publisher};
use parlor_protocol::ServerFrame;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{debug, trace, warn};

use crate::traits::TransportError;

/// Default maximum number of open connections.
const DEFAULT_MAX_CONNECTIONS: usize = 10_000;

/// Receiving end of a connection's outbound queue.
pub type Outbox = mpsc::UnboundedReceiver<Arc<ServerFrame>>;

/// Outcome of fanning one broadcast out.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FanoutReport {
    /// Recipients the frame was enqueued for.
    pub delivered: usize,
    /// Recipients whose queue was already gone.
    pub failed: usize,
}

/// Connection table statistics.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TableStats {
    /// Open connections.
    pub connections: usize,
    /// Frames enqueued since start.
    pub delivered: u64,
    /// Failed enqueues since start.
    pub failed: u64,
}

/// Table of open connections and their outbound queues.
pub struct ConnectionTable {
    senders: DashMap<ConnectionId, mpsc::UnboundedSender<Arc<ServerFrame>>>,
    max_connections: usize,
    delivered: AtomicU64,
    failed: AtomicU64,
}

impl ConnectionTable {
    /// Create a table with the default connection limit.
    #[must_use]
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_MAX_CONNECTIONS)
    }

    /// Create a table that accepts at most `max_connections` connections.
    #[must_use]
    pub fn with_capacity(max_connections: usize) -> Self {
        Self {
            senders: DashMap::new(),
            max_connections,
            delivered: AtomicU64::new(0),
            failed: AtomicU64::new(0),
        }
    }

    /// Open an outbound queue for a connection.
    ///
    /// # Errors
    ///
    /// Returns an error if the table is full or the ID is already open.
    pub fn open(&self, connection_id: ConnectionId) -> Result<Outbox, TransportError> {
        if self.senders.len() >= self.max_connections {
            warn!(connection = %connection_id, limit = self.max_connections, "Connection limit reached");
            return Err(TransportError::CapacityReached(self.max_connections));
        }

        match self.senders.entry(connection_id) {
            Entry::Occupied(entry) => Err(TransportError::DuplicateConnection(entry.key().clone())),
            Entry::Vacant(entry) => {
                let (tx, rx) = mpsc::unbounded_channel();
                debug!(connection = %entry.key(), "Outbox opened");
                entry.insert(tx);
                Ok(rx)
            }
        }
    }

    /// Close a connection's outbound queue.
    ///
    /// Returns `true` if the connection was open.
    pub fn close(&self, connection_id: &ConnectionId) -> bool {
        let removed = self.senders.remove(connection_id).is_some();
        if removed {
            debug!(connection = %connection_id, "Outbox closed");
        }
        removed
    }

    /// Check if a connection is open.
    #[must_use]
    pub fn contains(&self, connection_id: &ConnectionId) -> bool {
        self.senders.contains_key(connection_id)
    }

    /// Number of open connections.
    #[must_use]
    pub fn len(&self) -> usize {
        self.senders.len()
    }

    /// Check if no connection is open.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.senders.is_empty()
    }

    /// Get table statistics.
    #[must_use]
    pub fn stats(&self) -> TableStats {
        TableStats {
            connections: self.senders.len(),
            delivered: self.delivered.load(Ordering::Relaxed),
            failed: self.failed.load(Ordering::Relaxed),
        }
    }

    /// Enqueue a broadcast on every matching connection.
    ///
    /// A failed enqueue is logged and skipped; it never stops delivery to
    /// the remaining recipients.
    pub fn fan_out(&self, broadcast: &Broadcast) -> FanoutReport {
        let mut report = FanoutReport::default();

        match &broadcast.audience {
            Audience::Only(target) => {
                if let Some(sender) = self.senders.get(target) {
                    self.deliver(target, &sender, &broadcast.frame, &mut report);
                } else {
                    trace!(connection = %target, "Target not in table, dropping frame");
                }
            }
            audience => {
                for entry in self.senders.iter() {
                    if audience.includes(entry.key()) {
                        self.deliver(entry.key(), entry.value(), &broadcast.frame, &mut report);
                    }
                }
            }
        }

        trace!(
            event = broadcast.frame.event_name(),
            delivered = report.delivered,
            failed = report.failed,
            "Fanned out"
        );
        report
    }

    fn deliver(
        &self,
        connection_id: &ConnectionId,
        sender: &mpsc::UnboundedSender<Arc<ServerFrame>>,
        frame: &Arc<ServerFrame>,
        report: &mut FanoutReport,
    ) {
        if sender.send(Arc::clone(frame)).is_ok() {
            report.delivered += 1;
            self.delivered.fetch_add(1, Ordering::Relaxed);
        } else {
            report.failed += 1;
            self.failed.fetch_add(1, Ordering::Relaxed);
            warn!(
                connection = %connection_id,
                event = frame.event_name(),
                "Delivery failed: outbox dropped"
            );
        }
    }
}

impl Default for ConnectionTable {
    fn default() -> Self {
        Self::new()
    }
}

impl Publisher for ConnectionTable {
    fn publish(&self, broadcast: Broadcast) {
        self.fan_out(&broadcast);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn id(s: &str) -> ConnectionId {
        ConnectionId::new(s)
    }

    #[test]
    fn test_audiences() {
        let table = ConnectionTable::new();
        let mut a = table.open(id("a")).unwrap();
        let mut b = table.open(id("b")).unwrap();

        table.publish(Broadcast::new(Audience::All, ServerFrame::user_joined("x")));
        table.publish(Broadcast::new(
            Audience::AllExcept(id("a")),
            ServerFrame::user_typing("x"),
        ));
        table.publish(Broadcast::new(Audience::Only(id("a")), ServerFrame::user_left("x")));

        assert_eq!(*a.try_recv().unwrap(), ServerFrame::user_joined("x"));
        assert_eq!(*a.try_recv().unwrap(), ServerFrame::user_left("x"));
        assert!(a.try_recv().is_err());

        assert_eq!(*b.try_recv().unwrap(), ServerFrame::user_joined("x"));
        assert_eq!(*b.try_recv().unwrap(), ServerFrame::user_typing("x"));
        assert!(b.try_recv().is_err());
    }

    #[test]
    fn test_failed_recipient_does_not_block_others() {
        let table = ConnectionTable::new();
        let dropped = table.open(id("a")).unwrap();
        let mut b = table.open(id("b")).unwrap();
        let mut c = table.open(id("c")).unwrap();
        drop(dropped);

        let report = table.fan_out(&Broadcast::new(Audience::All, ServerFrame::user_joined("x")));

        assert_eq!(report, FanoutReport { delivered: 2, failed: 1 });
        assert!(b.try_recv().is_ok());
        assert!(c.try_recv().is_ok());
        assert_eq!(table.stats().failed, 1);
        assert_eq!(table.stats().delivered, 2);
    }

    #[test]
    fn test_capacity_and_duplicates() {
        let table = ConnectionTable::with_capacity(1);
        let _a = table.open(id("a")).unwrap();

        assert!(matches!(
            table.open(id("b")),
            Err(TransportError::CapacityReached(1))
        ));

        table.close(&id("a"));
        let _a = table.open(id("a")).unwrap();
        let table = ConnectionTable::new();
        let _x = table.open(id("x")).unwrap();
        assert!(matches!(
            table.open(id("x")),
            Err(TransportError::DuplicateConnection(_))
        ));
    }

    #[test]
    fn test_only_unknown_target_is_dropped() {
        let table = ConnectionTable::new();
        let mut a = table.open(id("a")).unwrap();

        let report = table.fan_out(&Broadcast::new(
            Audience::Only(id("ghost")),
            ServerFrame::user_left("x"),
        ));

        assert_eq!(report, FanoutReport::default());
        assert!(a.try_recv().is_err());
    }

    #[test]
    fn test_close() {
        let table = ConnectionTable::new();
        let _a = table.open(id("a")).unwrap();

        assert!(table.contains(&id("a")));
        assert!(table.close(&id("a")));
        assert!(!table.close(&id("a")));
        assert!(table.is_empty());
    }
}
