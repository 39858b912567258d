//! Connection storage contract and the in-memory backend.
//!
//! The registry keeps its records behind [`ConnectionStore`] so a durable
//! backend can be swapped in without touching notification or validation
//! logic. The in-memory store is the reference implementation.

use std::collections::HashMap;
use std::sync::RwLock;

use indexmap::IndexMap;
use thiserror::Error;

use crate::channel::{ChannelConnection, ChannelId, ChannelStatus};
use crate::error::{AajiError, ExecutionError};

/// Errors that can occur during store operations.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum StoreError {
    /// Channel id already present.
    #[error("Duplicate channel id: {0}")]
    DuplicateId(ChannelId),

    /// Endpoint path already claimed by another channel.
    #[error("Duplicate endpoint path: {0}")]
    DuplicateEndpoint(String),

    /// Channel not found.
    #[error("Channel not found: {0}")]
    NotFound(ChannelId),

    /// Backend error.
    #[error("Store backend error: {0}")]
    Backend(String),
}

impl From<StoreError> for AajiError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::DuplicateId(id) => ExecutionError::DuplicateChannel {
                field: "id".to_string(),
                value: id.to_string(),
            }
            .into(),
            StoreError::DuplicateEndpoint(path) => ExecutionError::DuplicateChannel {
                field: "endpoint_path".to_string(),
                value: path,
            }
            .into(),
            StoreError::NotFound(id) => ExecutionError::UnknownChannel { id }.into(),
            StoreError::Backend(message) => AajiError::internal(message),
        }
    }
}

/// Storage trait for channel connections.
///
/// # Ordering
/// `list` must return records in insertion order. Removing a record must not
/// reorder the remaining ones.
pub trait ConnectionStore: Send + Sync {
    /// Insert a new record. Fails if the id or the endpoint path is taken.
    fn insert(&self, connection: ChannelConnection) -> Result<ChannelConnection, StoreError>;

    /// Get a record by id.
    fn get(&self, id: &str) -> Result<Option<ChannelConnection>, StoreError>;

    /// Set the status of an existing record. Returns `(previous, updated)`.
    fn set_status(
        &self,
        id: &str,
        status: ChannelStatus,
    ) -> Result<(ChannelStatus, ChannelConnection), StoreError>;

    /// Remove a record, returning it.
    fn remove(&self, id: &str) -> Result<ChannelConnection, StoreError>;

    /// Snapshot of every record in insertion order.
    fn list(&self) -> Result<Vec<ChannelConnection>, StoreError>;

    /// Whether a record with this id exists.
    fn contains(&self, id: &str) -> Result<bool, StoreError> {
        Ok(self.get(id)?.is_some())
    }

    /// Number of records.
    fn len(&self) -> Result<usize, StoreError> {
        Ok(self.list()?.len())
    }

    /// Whether the store holds no records.
    fn is_empty(&self) -> Result<bool, StoreError> {
        Ok(self.len()? == 0)
    }
}

fn lock_err(context: &'static str) -> StoreError {
    StoreError::Backend(format!("poisoned lock: {context}"))
}

#[derive(Debug, Default)]
struct ConnectionState {
    by_id: IndexMap<ChannelId, ChannelConnection>,
    by_endpoint: HashMap<String, ChannelId>,
}

/// In-memory connection store.
#[derive(Debug, Default)]
pub struct InMemoryConnectionStore {
    state: RwLock<ConnectionState>,
}

impl InMemoryConnectionStore {
    /// Create a new empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

impl ConnectionStore for InMemoryConnectionStore {
    fn insert(&self, connection: ChannelConnection) -> Result<ChannelConnection, StoreError> {
        let mut state = self.state.write().map_err(|_| lock_err("connection.insert"))?;
        if state.by_id.contains_key(&connection.id) {
            return Err(StoreError::DuplicateId(connection.id));
        }
        if state.by_endpoint.contains_key(&connection.endpoint_path) {
            return Err(StoreError::DuplicateEndpoint(connection.endpoint_path));
        }

        state
            .by_endpoint
            .insert(connection.endpoint_path.clone(), connection.id.clone());
        state.by_id.insert(connection.id.clone(), connection.clone());
        Ok(connection)
    }

    fn get(&self, id: &str) -> Result<Option<ChannelConnection>, StoreError> {
        let state = self.state.read().map_err(|_| lock_err("connection.get"))?;
        Ok(state.by_id.get(id).cloned())
    }

    fn set_status(
        &self,
        id: &str,
        status: ChannelStatus,
    ) -> Result<(ChannelStatus, ChannelConnection), StoreError> {
        let mut state = self.state.write().map_err(|_| lock_err("connection.set_status"))?;
        let record = state
            .by_id
            .get_mut(id)
            .ok_or_else(|| StoreError::NotFound(ChannelId::new_unchecked(id)))?;
        let previous = record.status;
        record.status = status;
        Ok((previous, record.clone()))
    }

    fn remove(&self, id: &str) -> Result<ChannelConnection, StoreError> {
        let mut state = self.state.write().map_err(|_| lock_err("connection.remove"))?;
        let record = state
            .by_id
            .shift_remove(id)
            .ok_or_else(|| StoreError::NotFound(ChannelId::new_unchecked(id)))?;
        state.by_endpoint.remove(&record.endpoint_path);
        Ok(record)
    }

    fn list(&self) -> Result<Vec<ChannelConnection>, StoreError> {
        let state = self.state.read().map_err(|_| lock_err("connection.list"))?;
        Ok(state.by_id.values().cloned().collect())
    }

    fn contains(&self, id: &str) -> Result<bool, StoreError> {
        let state = self.state.read().map_err(|_| lock_err("connection.contains"))?;
        Ok(state.by_id.contains_key(id))
    }

    fn len(&self) -> Result<usize, StoreError> {
        let state = self.state.read().map_err(|_| lock_err("connection.len"))?;
        Ok(state.by_id.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn conn(id: &str, path: &str) -> ChannelConnection {
        ChannelConnection::new(id, id, path, ChannelStatus::Pending).unwrap()
    }

    #[test]
    fn insert_rejects_duplicate_id_and_endpoint() {
        let store = InMemoryConnectionStore::new();
        store.insert(conn("twilio/whatsapp", "/twilio/whatsapp")).unwrap();

        let err = store.insert(conn("twilio/whatsapp", "/other")).unwrap_err();
        assert_eq!(err, StoreError::DuplicateId(ChannelId::new_unchecked("twilio/whatsapp")));

        let err = store.insert(conn("meta/whatsapp", "/twilio/whatsapp")).unwrap_err();
        assert_eq!(err, StoreError::DuplicateEndpoint("/twilio/whatsapp".to_string()));

        assert_eq!(store.len().unwrap(), 1);
    }

    #[test]
    fn remove_keeps_insertion_order_and_frees_endpoint() {
        let store = InMemoryConnectionStore::new();
        store.insert(conn("a", "/a")).unwrap();
        store.insert(conn("b", "/b")).unwrap();
        store.insert(conn("c", "/c")).unwrap();

        let removed = store.remove("b").unwrap();
        assert_eq!(removed.id.as_str(), "b");

        let ids: Vec<_> = store.list().unwrap().into_iter().map(|c| c.id.to_string()).collect();
        assert_eq!(ids, vec!["a", "c"]);

        // Endpoint of a removed channel can be claimed again.
        store.insert(conn("d", "/b")).unwrap();
        assert!(store.contains("d").unwrap());
        assert!(!store.contains("b").unwrap());
    }

    #[test]
    fn set_status_reports_previous() {
        let store = InMemoryConnectionStore::new();
        store.insert(conn("a", "/a")).unwrap();

        let (previous, updated) = store.set_status("a", ChannelStatus::Active).unwrap();
        assert_eq!(previous, ChannelStatus::Pending);
        assert_eq!(updated.status, ChannelStatus::Active);
        assert_eq!(store.get("a").unwrap().unwrap().status, ChannelStatus::Active);

        let err = store.set_status("missing", ChannelStatus::Active).unwrap_err();
        assert!(matches!(err, StoreError::NotFound(_)));
    }

    #[test]
    fn store_errors_map_to_domain_errors() {
        let err: AajiError = StoreError::DuplicateEndpoint("/x".to_string()).into();
        assert!(matches!(
            err,
            AajiError::Execution(ExecutionError::DuplicateChannel { ref field, .. }) if field == "endpoint_path"
        ));

        let err: AajiError = StoreError::NotFound(ChannelId::new_unchecked("x")).into();
        assert!(matches!(err, AajiError::Execution(ExecutionError::UnknownChannel { .. })));
    }
}
