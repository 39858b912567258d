//! Registry change notifications.
//!
//! Dashboards showing live status badges hold a [`RegistryWatch`]. Mutations
//! fan out with non-blocking `try_send`: a watcher whose buffer is full loses
//! that notification (counted in `dropped_notifications`), a watcher whose
//! receiver is gone is pruned.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, Weak};
use std::time::Duration;

use chrono::{DateTime, Utc};
use crossbeam_channel::{bounded, Receiver, RecvTimeoutError, Sender, TryRecvError, TrySendError};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::channel::{ChannelConnection, ChannelId, ChannelStatus};
use crate::error::{AajiError, AajiResult, ExecutionError};

/// What happened to a channel.
#[allow(missing_docs)]
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum RegistryChange {
    Registered {
        connection: ChannelConnection,
    },
    StatusChanged {
        connection: ChannelConnection,
        previous: ChannelStatus,
    },
    Deregistered {
        id: ChannelId,
    },
}

impl RegistryChange {
    /// The channel this change concerns.
    #[must_use]
    pub fn channel_id(&self) -> &ChannelId {
        match self {
            Self::Registered { connection } | Self::StatusChanged { connection, .. } => &connection.id,
            Self::Deregistered { id } => id,
        }
    }
}

/// A registry-changed notification.
///
/// `seq` increases by one per mutation across the whole registry, so a watcher
/// can tell from a jump that it lost notifications to backpressure.
#[allow(missing_docs)]
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegistryNotification {
    pub seq: u64,
    pub timestamp: DateTime<Utc>,
    pub change: RegistryChange,
}

#[derive(Debug)]
struct Watcher {
    id: u64,
    tx: Sender<RegistryNotification>,
}

#[derive(Debug, Default)]
pub(crate) struct WatcherSet {
    watchers: Vec<Watcher>,
    next_watch_id: u64,
    next_seq: u64,
}

impl WatcherSet {
    pub(crate) fn add(&mut self, capacity: usize) -> (u64, Receiver<RegistryNotification>) {
        let (tx, rx) = bounded(capacity.max(1));
        self.next_watch_id += 1;
        let id = self.next_watch_id;
        self.watchers.push(Watcher { id, tx });
        (id, rx)
    }

    fn remove(&mut self, id: u64) {
        self.watchers.retain(|w| w.id != id);
    }

    pub(crate) fn len(&self) -> usize {
        self.watchers.len()
    }

    /// Fan a change out to every watcher. Never blocks.
    pub(crate) fn notify(&mut self, change: RegistryChange, dropped: &AtomicU64) {
        self.next_seq += 1;
        let notification = RegistryNotification {
            seq: self.next_seq,
            timestamp: Utc::now(),
            change,
        };

        debug!(
            seq = notification.seq,
            channel = %notification.change.channel_id(),
            watchers = self.watchers.len(),
            "registry change"
        );

        self.watchers.retain(|w| match w.tx.try_send(notification.clone()) {
            Ok(()) => true,
            Err(TrySendError::Full(_)) => {
                dropped.fetch_add(1, Ordering::Relaxed);
                warn!(watch_id = w.id, seq = notification.seq, "registry watcher is slow, notification dropped");
                true
            }
            Err(TrySendError::Disconnected(_)) => false,
        });
    }
}

/// Stream handle for registry-changed notifications.
///
/// Dropping the handle unsubscribes.
#[derive(Debug)]
pub struct RegistryWatch {
    watch_id: u64,
    rx: Receiver<RegistryNotification>,
    set: Weak<Mutex<WatcherSet>>,
    unsubscribed: AtomicBool,
}

impl RegistryWatch {
    pub(crate) fn new(watch_id: u64, rx: Receiver<RegistryNotification>, set: &Arc<Mutex<WatcherSet>>) -> Self {
        Self {
            watch_id,
            rx,
            set: Arc::downgrade(set),
            unsubscribed: AtomicBool::new(false),
        }
    }

    /// Stop receiving notifications. Idempotent.
    pub fn unsubscribe(&self) {
        if self.unsubscribed.swap(true, Ordering::AcqRel) {
            return;
        }
        if let Some(set) = self.set.upgrade() {
            if let Ok(mut guard) = set.lock() {
                guard.remove(self.watch_id);
            }
        }
    }

    /// Receive the next notification (blocking).
    pub fn recv(&self) -> AajiResult<RegistryNotification> {
        self.rx.recv().map_err(|_| disconnected())
    }

    /// Receive the next notification with a timeout.
    pub fn recv_timeout(&self, timeout: Duration) -> AajiResult<RegistryNotification> {
        self.rx.recv_timeout(timeout).map_err(|err| match err {
            RecvTimeoutError::Timeout => AajiError::Execution(ExecutionError::Timeout {
                duration_ms: u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX),
            }),
            RecvTimeoutError::Disconnected => disconnected(),
        })
    }

    /// Take a buffered notification if one is ready.
    pub fn try_recv(&self) -> AajiResult<Option<RegistryNotification>> {
        match self.rx.try_recv() {
            Ok(n) => Ok(Some(n)),
            Err(TryRecvError::Empty) => Ok(None),
            Err(TryRecvError::Disconnected) => Err(disconnected()),
        }
    }
}

impl Drop for RegistryWatch {
    fn drop(&mut self) {
        self.unsubscribe();
    }
}

fn disconnected() -> AajiError {
    AajiError::Execution(ExecutionError::Disconnected {
        path: "registry_watch".to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn deregistered(id: &str) -> RegistryChange {
        RegistryChange::Deregistered {
            id: ChannelId::new_unchecked(id),
        }
    }

    #[test]
    fn full_watcher_drops_and_counts() {
        let set = Arc::new(Mutex::new(WatcherSet::default()));
        let dropped = AtomicU64::new(0);
        let (id, rx) = set.lock().unwrap().add(1);
        let watch = RegistryWatch::new(id, rx, &set);

        {
            let mut guard = set.lock().unwrap();
            guard.notify(deregistered("a"), &dropped);
            guard.notify(deregistered("b"), &dropped);
        }

        assert_eq!(dropped.load(Ordering::Relaxed), 1);
        let first = watch.try_recv().unwrap().unwrap();
        assert_eq!(first.seq, 1);
        assert!(watch.try_recv().unwrap().is_none());
    }

    #[test]
    fn unsubscribe_removes_watcher_and_is_idempotent() {
        let set = Arc::new(Mutex::new(WatcherSet::default()));
        let (id, rx) = set.lock().unwrap().add(4);
        let watch = RegistryWatch::new(id, rx, &set);
        assert_eq!(set.lock().unwrap().len(), 1);

        watch.unsubscribe();
        watch.unsubscribe();
        assert_eq!(set.lock().unwrap().len(), 0);
    }

    #[test]
    fn dropped_receiver_is_pruned_on_notify() {
        let set = Arc::new(Mutex::new(WatcherSet::default()));
        let dropped = AtomicU64::new(0);
        let (_id, rx) = set.lock().unwrap().add(4);
        drop(rx);

        set.lock().unwrap().notify(deregistered("a"), &dropped);
        assert_eq!(set.lock().unwrap().len(), 0);
        assert_eq!(dropped.load(Ordering::Relaxed), 0);
    }
}
