//! The connection registry.
//!
//! Owns every `ChannelConnection`. Mutations are serialized together with their
//! notification fan-out so watchers observe changes in the order they were
//! applied; reads go straight to the store.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use serde::{Deserialize, Serialize};
use tracing::info;

use crate::channel::{ChannelConnection, ChannelId, ChannelStatus};
use crate::error::{AajiError, AajiResult, ValidationError};
use crate::feed::ChannelLookup;

use super::store::{ConnectionStore, InMemoryConnectionStore};
use super::watch::{RegistryChange, RegistryWatch, WatcherSet};

/// Registry configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RegistryConfig {
    /// Per-watcher notification buffer.
    pub watch_buffer: usize,
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self { watch_buffer: 64 }
    }
}

impl RegistryConfig {
    /// Checks the configured bounds.
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.watch_buffer == 0 {
            return Err(ValidationError::InvalidConfig {
                reason: "registry.watch_buffer must be at least 1".to_string(),
            });
        }
        Ok(())
    }
}

/// Tracks configured inbound channels.
pub struct ConnectionRegistry {
    cfg: RegistryConfig,
    store: Arc<dyn ConnectionStore>,
    watchers: Arc<Mutex<WatcherSet>>,
    dropped_notifications: AtomicU64,
}

impl std::fmt::Debug for ConnectionRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConnectionRegistry")
            .field("cfg", &self.cfg)
            .field("dropped_notifications", &self.dropped_notifications())
            .finish_non_exhaustive()
    }
}

impl Default for ConnectionRegistry {
    fn default() -> Self {
        Self::new(RegistryConfig::default())
    }
}

impl ConnectionRegistry {
    /// Create a registry backed by the in-memory store.
    #[must_use]
    pub fn new(cfg: RegistryConfig) -> Self {
        Self::with_store(cfg, Arc::new(InMemoryConnectionStore::new()))
    }

    /// Create a registry over a custom store.
    #[must_use]
    pub fn with_store(cfg: RegistryConfig, store: Arc<dyn ConnectionStore>) -> Self {
        Self {
            cfg,
            store,
            watchers: Arc::new(Mutex::new(WatcherSet::default())),
            dropped_notifications: AtomicU64::new(0),
        }
    }

    fn lock_watchers(&self, context: &'static str) -> AajiResult<MutexGuard<'_, WatcherSet>> {
        self.watchers
            .lock()
            .map_err(|_| AajiError::internal(format!("poisoned lock: {context}")))
    }

    /// Register a fully-formed connection.
    ///
    /// # Errors
    /// - `ValidationError` if any field is malformed
    /// - `DuplicateChannel` if the id or the endpoint path is already registered
    pub fn register(&self, connection: ChannelConnection) -> AajiResult<ChannelConnection> {
        connection.validate()?;

        let mut watchers = self.lock_watchers("registry.register")?;
        let stored = self.store.insert(connection)?;
        info!(
            channel = %stored.id,
            endpoint = %stored.endpoint_path,
            status = %stored.status,
            "channel registered"
        );
        watchers.notify(
            RegistryChange::Registered {
                connection: stored.clone(),
            },
            &self.dropped_notifications,
        );
        Ok(stored)
    }

    /// Set the status of a registered channel and notify watchers.
    ///
    /// # Errors
    /// - `UnknownChannel` if `id` is not registered
    pub fn update_status(&self, id: &str, status: ChannelStatus) -> AajiResult<ChannelConnection> {
        let mut watchers = self.lock_watchers("registry.update_status")?;
        let (previous, updated) = self.store.set_status(id, status)?;
        info!(channel = %updated.id, %previous, current = %status, "channel status updated");
        watchers.notify(
            RegistryChange::StatusChanged {
                connection: updated.clone(),
                previous,
            },
            &self.dropped_notifications,
        );
        Ok(updated)
    }

    /// Remove a channel. Historical feed events referencing it stay valid.
    ///
    /// # Errors
    /// - `UnknownChannel` if `id` is not registered
    pub fn deregister(&self, id: &str) -> AajiResult<ChannelConnection> {
        let mut watchers = self.lock_watchers("registry.deregister")?;
        let removed = self.store.remove(id)?;
        info!(channel = %removed.id, "channel deregistered");
        watchers.notify(
            RegistryChange::Deregistered {
                id: removed.id.clone(),
            },
            &self.dropped_notifications,
        );
        Ok(removed)
    }

    /// Look up a channel.
    pub fn get(&self, id: &str) -> AajiResult<Option<ChannelConnection>> {
        Ok(self.store.get(id)?)
    }

    /// Snapshot of all channels in insertion order.
    pub fn list(&self) -> AajiResult<Vec<ChannelConnection>> {
        Ok(self.store.list()?)
    }

    /// Whether `id` is registered.
    pub fn contains(&self, id: &str) -> AajiResult<bool> {
        Ok(self.store.contains(id)?)
    }

    /// Number of registered channels.
    pub fn len(&self) -> AajiResult<usize> {
        Ok(self.store.len()?)
    }

    /// Whether no channels are registered.
    pub fn is_empty(&self) -> AajiResult<bool> {
        Ok(self.len()? == 0)
    }

    /// Number of channels currently in `status`.
    pub fn count_by_status(&self, status: ChannelStatus) -> AajiResult<usize> {
        Ok(self.list()?.iter().filter(|c| c.status == status).count())
    }

    /// Obtain a stream of registry-changed notifications.
    pub fn watch(&self) -> AajiResult<RegistryWatch> {
        let mut watchers = self.lock_watchers("registry.watch")?;
        let (watch_id, rx) = watchers.add(self.cfg.watch_buffer);
        drop(watchers);
        Ok(RegistryWatch::new(watch_id, rx, &self.watchers))
    }

    /// Number of attached watchers.
    pub fn watcher_count(&self) -> AajiResult<usize> {
        Ok(self.lock_watchers("registry.watcher_count")?.len())
    }

    /// Notifications lost to slow watchers since creation.
    #[must_use]
    pub fn dropped_notifications(&self) -> u64 {
        self.dropped_notifications.load(Ordering::Relaxed)
    }
}

impl ChannelLookup for ConnectionRegistry {
    fn contains_channel(&self, id: &ChannelId) -> AajiResult<bool> {
        self.contains(id.as_str())
    }
}
