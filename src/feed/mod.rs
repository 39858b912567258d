//! Live event feed.
//!
//! An ordered, append-only stream of interception events with bounded
//! retention, push subscriptions and catch-up replay. This implementation is
//! embedded-first (in-process); the optional gRPC transport layers a server
//! stream on top of [`FeedSubscription`].

/// Feed front-end, configuration and stats.
#[allow(clippy::module_inception)]
pub mod feed;
/// Bounded retention window.
mod retention;
/// Subscriber stream handle.
pub mod subscription;

pub use feed::{ChannelLookup, FeedConfig, FeedStats, LiveFeed, SeverityCounts};
pub use subscription::{FeedSubscription, SubscriptionId, SubscriptionState};
