//! # aaji-core - Channel registry and live interception feed
//!
//! The core behind the Aaji scam-interception dashboard: which inbound channels
//! are configured and healthy, and an ordered real-time stream of interception
//! and engagement events for dashboards to observe.
//!
//! ## Core Concepts
//!
//! - **ChannelConnection**: a configured inbound channel (webhook endpoint + status)
//! - **ConnectionRegistry**: owns channel records, emits registry-changed notifications
//! - **FeedEvent**: an immutable, sequence-numbered interception event
//! - **LiveFeed**: append-only event stream with bounded retention, push
//!   subscriptions and catch-up replay
//!
//! ## Usage
//!
//! ```rust
//! use std::sync::Arc;
//! use aaji_core::{ChannelConnection, ChannelStatus, ConnectionRegistry, FeedConfig, LiveFeed, Severity};
//!
//! let registry = Arc::new(ConnectionRegistry::default());
//! registry.register(ChannelConnection::new(
//!     "twilio/whatsapp",
//!     "WhatsApp",
//!     "/twilio/whatsapp",
//!     ChannelStatus::Active,
//! )?)?;
//!
//! let feed = LiveFeed::new(FeedConfig::default(), registry.clone());
//! let sub = feed.subscribe(None)?;
//!
//! let event = feed.publish("twilio/whatsapp", Severity::Danger, "KYC request")?;
//! assert_eq!(event.id.get(), 1);
//! assert_eq!(sub.try_recv()?.map(|e| e.id), Some(event.id));
//! # Ok::<(), aaji_core::AajiError>(())
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

// Shared types
pub mod channel;
pub mod config;
pub mod error;
pub mod event;

// Components
pub mod feed;
pub mod registry;

// Dashboard transport
#[cfg(feature = "transport-grpc")]
#[allow(missing_docs)]
pub mod transport;

// Re-export primary types at crate root for convenience
pub use channel::{default_channels, ChannelConnection, ChannelId, ChannelStatus};
pub use config::AajiConfig;
pub use error::{AajiError, AajiResult, ExecutionError, ValidationError};
pub use event::{EventId, FeedEvent, Severity};
pub use feed::{
    ChannelLookup, FeedConfig, FeedStats, FeedSubscription, LiveFeed, SeverityCounts, SubscriptionId,
    SubscriptionState,
};
pub use registry::{
    ConnectionRegistry, ConnectionStore, InMemoryConnectionStore, RegistryChange, RegistryConfig,
    RegistryNotification, RegistryWatch, StoreError,
};
