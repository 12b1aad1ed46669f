//! Cluster Notifications
//!
//! The engine publishes keyspace events (creations, removals, evictions)
//! to the rest of the cluster through a [`NotificationGateway`]. Delivery
//! is fire-and-forget: no acknowledgment, no ordering across calls, and a
//! missing or failing gateway must never block or fail a command.

use crate::storage::{DataType, KeyWrapper};
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::sync::mpsc;
use tracing::trace;

/// What happened to a key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventKind {
    /// A key was created and bound to a data type.
    Created,
    /// A key was removed by the engine (client DEL or overwrite-to-empty).
    Removed,
    /// A key's TTL elapsed and it was evicted.
    Expired,
    /// The backing store removed the key on its own; nothing was deleted here.
    RemovedDownstream,
    /// Every key was dropped.
    Flushed,
}

/// A single notification sent to cluster members.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyspaceEvent {
    pub kind: EventKind,
    pub key: Option<KeyWrapper>,
    pub data_type: DataType,
}

impl KeyspaceEvent {
    pub fn new(kind: EventKind, key: KeyWrapper, data_type: DataType) -> Self {
        Self {
            kind,
            key: Some(key),
            data_type,
        }
    }

    pub fn flushed() -> Self {
        Self {
            kind: EventKind::Flushed,
            key: None,
            data_type: DataType::None,
        }
    }
}

/// Sends notifications to cluster members without waiting for a response.
pub trait NotificationGateway: Send + Sync {
    /// Publishes `event`. Must not block and must not panic.
    fn notify_members(&self, event: KeyspaceEvent);
}

/// Gateway that discards everything. Used when no cluster is attached.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopGateway;

impl NotificationGateway for NoopGateway {
    fn notify_members(&self, _event: KeyspaceEvent) {}
}

/// Gateway backed by a bounded tokio channel.
///
/// Events are offered with `try_send`; when the channel is full or the
/// receiver is gone the event is dropped and counted.
#[derive(Debug)]
pub struct ChannelGateway {
    tx: mpsc::Sender<KeyspaceEvent>,
    sent: AtomicU64,
    dropped: AtomicU64,
}

impl ChannelGateway {
    /// Creates a gateway and the receiving half of its channel.
    pub fn new(capacity: usize) -> (Self, mpsc::Receiver<KeyspaceEvent>) {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        (
            Self {
                tx,
                sent: AtomicU64::new(0),
                dropped: AtomicU64::new(0),
            },
            rx,
        )
    }

    /// Number of events handed to the channel.
    pub fn sent(&self) -> u64 {
        self.sent.load(Ordering::Relaxed)
    }

    /// Number of events dropped because the channel was full or closed.
    pub fn dropped(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }
}

impl NotificationGateway for ChannelGateway {
    fn notify_members(&self, event: KeyspaceEvent) {
        match self.tx.try_send(event) {
            Ok(()) => {
                self.sent.fetch_add(1, Ordering::Relaxed);
            }
            Err(e) => {
                self.dropped.fetch_add(1, Ordering::Relaxed);
                trace!(error = %e, "Dropped keyspace notification");
            }
        }
    }
}
