//! The live event feed.
//!
//! A single mutex serializes sequence assignment, append, eviction and
//! subscriber fan-out, so `id` order equals publish completion order. Fan-out
//! uses `try_send` into per-subscription bounded buffers and never blocks the
//! publisher: a subscriber whose buffer is full is disconnected with an
//! overflow signal.

use std::sync::{Arc, Mutex, MutexGuard};

use chrono::{DateTime, Utc};
use crossbeam_channel::{bounded, Sender, TrySendError};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::channel::ChannelId;
use crate::error::{AajiError, AajiResult, ExecutionError, ValidationError};
use crate::event::{EventId, FeedEvent, Severity};

use super::retention::RetentionWindow;
use super::subscription::{FeedSubscription, SubscriberShared, SubscriptionId};

/// Source of truth for which channels exist.
///
/// The feed checks it synchronously on every publish. It is a consistency
/// check against the current snapshot, not a lock held across the publish.
pub trait ChannelLookup: Send + Sync {
    /// Whether `id` is currently registered.
    fn contains_channel(&self, id: &ChannelId) -> AajiResult<bool>;
}

/// Feed configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct FeedConfig {
    /// Retention window size `N`.
    pub capacity: usize,
    /// Per-subscription push buffer. A subscriber this far behind is dropped.
    pub subscriber_buffer: usize,
    /// Maximum message length in bytes.
    pub max_message_len: usize,
}

impl Default for FeedConfig {
    fn default() -> Self {
        Self {
            capacity: 1024,
            subscriber_buffer: 256,
            max_message_len: 4096,
        }
    }
}

impl FeedConfig {
    /// Checks the configured bounds.
    pub fn validate(&self) -> Result<(), ValidationError> {
        let checks = [
            ("feed.capacity", self.capacity),
            ("feed.subscriber_buffer", self.subscriber_buffer),
            ("feed.max_message_len", self.max_message_len),
        ];
        for (name, value) in checks {
            if value == 0 {
                return Err(ValidationError::InvalidConfig {
                    reason: format!("{name} must be at least 1"),
                });
            }
        }
        Ok(())
    }
}

/// Per-severity event counters.
#[allow(missing_docs)]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SeverityCounts {
    pub info: u64,
    pub success: u64,
    pub danger: u64,
}

impl SeverityCounts {
    fn bump(&mut self, severity: Severity) {
        match severity {
            Severity::Info => self.info += 1,
            Severity::Success => self.success += 1,
            Severity::Danger => self.danger += 1,
        }
    }

    /// Count for one severity.
    #[must_use]
    pub const fn get(&self, severity: Severity) -> u64 {
        match severity {
            Severity::Info => self.info,
            Severity::Success => self.success,
            Severity::Danger => self.danger,
        }
    }
}

/// Point-in-time feed counters for dashboard stat cards.
#[allow(missing_docs)]
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeedStats {
    pub total_published: u64,
    pub retained: usize,
    pub capacity: usize,
    pub oldest_retained: Option<EventId>,
    pub newest: Option<EventId>,
    pub by_severity: SeverityCounts,
    pub active_subscribers: usize,
    pub overflowed_subscribers: u64,
}

#[derive(Debug)]
struct Subscriber {
    id: SubscriptionId,
    tx: Sender<FeedEvent>,
    shared: Arc<SubscriberShared>,
}

#[derive(Debug)]
struct FeedState {
    next_id: EventId,
    last_timestamp: Option<DateTime<Utc>>,
    window: RetentionWindow,
    subscribers: Vec<Subscriber>,
    by_severity: SeverityCounts,
    overflowed: u64,
    closed: bool,
}

#[derive(Debug)]
pub(crate) struct FeedShared {
    state: Mutex<FeedState>,
}

impl FeedShared {
    fn lock(&self, context: &'static str) -> AajiResult<MutexGuard<'_, FeedState>> {
        self.state
            .lock()
            .map_err(|_| AajiError::internal(format!("poisoned lock: {context}")))
    }

    pub(crate) fn remove_subscriber(&self, id: SubscriptionId) {
        if let Ok(mut state) = self.state.lock() {
            state.subscribers.retain(|s| s.id != id);
            debug!(subscription = %id, "subscription cancelled");
        }
    }
}

/// Ordered, append-only stream of interception events.
pub struct LiveFeed {
    cfg: FeedConfig,
    channels: Arc<dyn ChannelLookup>,
    shared: Arc<FeedShared>,
}

impl std::fmt::Debug for LiveFeed {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LiveFeed").field("cfg", &self.cfg).finish_non_exhaustive()
    }
}

impl LiveFeed {
    /// Create a feed validating channels against `channels`.
    ///
    /// Zero-valued bounds are clamped to 1; use [`FeedConfig::validate`] to
    /// reject them instead.
    #[must_use]
    pub fn new(cfg: FeedConfig, channels: Arc<dyn ChannelLookup>) -> Self {
        let cfg = FeedConfig {
            capacity: cfg.capacity.max(1),
            subscriber_buffer: cfg.subscriber_buffer.max(1),
            max_message_len: cfg.max_message_len.max(1),
        };
        let state = FeedState {
            next_id: EventId::new(1),
            last_timestamp: None,
            window: RetentionWindow::new(cfg.capacity),
            subscribers: Vec::new(),
            by_severity: SeverityCounts::default(),
            overflowed: 0,
            closed: false,
        };
        Self {
            cfg,
            channels,
            shared: Arc::new(FeedShared {
                state: Mutex::new(state),
            }),
        }
    }

    /// Effective configuration.
    #[must_use]
    pub const fn config(&self) -> &FeedConfig {
        &self.cfg
    }

    fn validate_message(&self, message: &str) -> Result<(), ValidationError> {
        if message.trim().is_empty() {
            return Err(ValidationError::EmptyField {
                field: "message".to_string(),
            });
        }
        if message.len() > self.cfg.max_message_len {
            return Err(ValidationError::FieldTooLong {
                field: "message".to_string(),
                max_length: self.cfg.max_message_len,
            });
        }
        Ok(())
    }

    /// Publish an event.
    ///
    /// Assigns the next sequence id, timestamps the event, appends it (evicting
    /// the oldest retained event when over capacity) and pushes it to every
    /// active subscriber in registration order.
    ///
    /// # Errors
    /// - `ValidationError` if the message is empty or too long
    /// - `UnknownChannel` if `channel_id` is not registered right now
    /// - `FeedClosed` after [`LiveFeed::shutdown`]
    ///
    /// A failed publish never consumes a sequence id.
    pub fn publish(&self, channel_id: &str, severity: Severity, message: impl Into<String>) -> AajiResult<FeedEvent> {
        let message = message.into();
        self.validate_message(&message)?;

        let channel_id = ChannelId::new_unchecked(channel_id);
        if !self.channels.contains_channel(&channel_id)? {
            return Err(ExecutionError::UnknownChannel { id: channel_id }.into());
        }

        let mut state = self.shared.lock("feed.publish")?;
        if state.closed {
            return Err(ExecutionError::FeedClosed.into());
        }

        let id = state.next_id;
        state.next_id = id.next();

        let now = Utc::now();
        let timestamp = match state.last_timestamp {
            Some(last) if last > now => last,
            _ => now,
        };
        state.last_timestamp = Some(timestamp);

        let event = FeedEvent {
            id,
            timestamp,
            channel_id,
            severity,
            message,
        };

        if let Some(evicted) = state.window.push(event.clone()) {
            debug!(evicted = %evicted.id, "retention window full, oldest event evicted");
        }
        state.by_severity.bump(severity);

        let mut overflowed = 0u64;
        state.subscribers.retain(|sub| match sub.tx.try_send(event.clone()) {
            Ok(()) => true,
            Err(TrySendError::Full(_)) => {
                if sub.shared.mark_overflow() {
                    overflowed += 1;
                }
                warn!(
                    subscription = %sub.id,
                    event = %id,
                    buffer = self.cfg.subscriber_buffer,
                    "subscriber fell behind, disconnecting"
                );
                false
            }
            Err(TrySendError::Disconnected(_)) => false,
        });
        state.overflowed += overflowed;

        debug!(
            event = %id,
            channel = %event.channel_id,
            severity = %severity,
            subscribers = state.subscribers.len(),
            "event published"
        );

        Ok(event)
    }

    /// Establish a live subscription.
    ///
    /// With `from = Some(k)`, every retained event with `id > k` is captured
    /// for catch-up replay in the same critical section that registers the
    /// live buffer, so replay and live delivery neither overlap nor leave a
    /// hole. With `from = None`, delivery starts at the next publish.
    ///
    /// # Errors
    /// - `ReplayGap` if events after `k` have already been evicted, or if `k`
    ///   is newer than the last published event
    /// - `FeedClosed` after [`LiveFeed::shutdown`]
    pub fn subscribe(&self, from: Option<EventId>) -> AajiResult<FeedSubscription> {
        let mut state = self.shared.lock("feed.subscribe")?;
        if state.closed {
            return Err(ExecutionError::FeedClosed.into());
        }

        let backlog = match from {
            Some(cursor) => state.window.since(cursor, state.next_id)?,
            None => Vec::new(),
        };

        let id = SubscriptionId::new();
        let (tx, rx) = bounded::<FeedEvent>(self.cfg.subscriber_buffer);
        let shared = Arc::new(SubscriberShared::new(!backlog.is_empty()));
        state.subscribers.push(Subscriber {
            id,
            tx,
            shared: Arc::clone(&shared),
        });

        debug!(
            subscription = %id,
            from = ?from.map(EventId::get),
            backlog = backlog.len(),
            subscribers = state.subscribers.len(),
            "subscription established"
        );
        drop(state);

        Ok(FeedSubscription::new(
            id,
            self.cfg.subscriber_buffer,
            backlog,
            rx,
            shared,
            Arc::downgrade(&self.shared),
        ))
    }

    /// The most recent `limit` retained events, oldest first.
    pub fn history(&self, limit: usize) -> AajiResult<Vec<FeedEvent>> {
        let state = self.shared.lock("feed.history")?;
        Ok(state.window.recent(limit))
    }

    /// Id of the last published event, `None` before the first publish.
    pub fn last_id(&self) -> AajiResult<Option<EventId>> {
        let state = self.shared.lock("feed.last_id")?;
        Ok((state.next_id.get() > 1).then(|| EventId::new(state.next_id.get() - 1)))
    }

    /// Number of retained events.
    pub fn len(&self) -> AajiResult<usize> {
        Ok(self.shared.lock("feed.len")?.window.len())
    }

    /// Whether no events are retained.
    pub fn is_empty(&self) -> AajiResult<bool> {
        Ok(self.len()? == 0)
    }

    /// Retention capacity `N`.
    #[must_use]
    pub const fn capacity(&self) -> usize {
        self.cfg.capacity
    }

    /// Number of subscriptions currently receiving pushes.
    pub fn subscriber_count(&self) -> AajiResult<usize> {
        Ok(self.shared.lock("feed.subscriber_count")?.subscribers.len())
    }

    /// Counters for dashboard stat cards.
    pub fn stats(&self) -> AajiResult<FeedStats> {
        let state = self.shared.lock("feed.stats")?;
        Ok(FeedStats {
            total_published: state.next_id.get() - 1,
            retained: state.window.len(),
            capacity: state.window.capacity(),
            oldest_retained: state.window.oldest_id(),
            newest: state.window.newest_id(),
            by_severity: state.by_severity,
            active_subscribers: state.subscribers.len(),
            overflowed_subscribers: state.overflowed,
        })
    }

    /// Whether [`LiveFeed::shutdown`] has run.
    pub fn is_closed(&self) -> AajiResult<bool> {
        Ok(self.shared.lock("feed.is_closed")?.closed)
    }

    /// Cancel every subscription and reject further publishes and subscribes.
    ///
    /// Idempotent.
    pub fn shutdown(&self) {
        let Ok(mut state) = self.shared.state.lock() else {
            return;
        };
        if state.closed {
            return;
        }
        state.closed = true;
        let subscribers = std::mem::take(&mut state.subscribers);
        drop(state);

        info!(subscribers = subscribers.len(), "feed shut down");
        for sub in subscribers {
            sub.shared.mark_shutdown();
        }
    }
}

impl Drop for LiveFeed {
    fn drop(&mut self) {
        self.shutdown();
    }
}
