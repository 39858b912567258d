//! Connection registry.
//!
//! Tracks which inbound channels are configured, where their webhooks live and
//! whether they are healthy. Leaf component: depends on nothing else in the
//! crate except the shared channel and error types.

/// Registry front-end and configuration.
#[allow(clippy::module_inception)]
pub mod registry;
/// Storage contract and in-memory backend.
pub mod store;
/// Change notifications.
pub mod watch;

pub use registry::{ConnectionRegistry, RegistryConfig};
pub use store::{ConnectionStore, InMemoryConnectionStore, StoreError};
pub use watch::{RegistryChange, RegistryNotification, RegistryWatch};
