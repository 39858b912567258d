//! Subscriber stream handle.
//!
//! A subscription moves through `CatchingUp` (draining the replay backlog
//! captured at subscribe time) to `Live` (reading the bounded push buffer) and
//! ends in `Cancelled`. Dropping the handle cancels it.

use std::collections::VecDeque;
use std::fmt;
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::{Arc, Mutex, Weak};
use std::time::Duration;

use crossbeam_channel::{Receiver, RecvTimeoutError, TryRecvError};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{AajiError, AajiResult, ExecutionError};
use crate::event::FeedEvent;

use super::feed::FeedShared;

/// Unique identifier for a subscription.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SubscriptionId(Uuid);

impl SubscriptionId {
    /// Create a new random subscription id.
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Wrap an existing UUID.
    #[must_use]
    pub const fn from_uuid(uuid: Uuid) -> Self {
        Self(uuid)
    }
}

impl Default for SubscriptionId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for SubscriptionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Delivery state of a subscription.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SubscriptionState {
    /// Replaying retained events captured at subscribe time.
    CatchingUp,
    /// Receiving events as they are published.
    Live,
    /// Terminal. Nothing further is delivered.
    Cancelled,
}

const STATE_CATCHING_UP: u8 = 0;
const STATE_LIVE: u8 = 1;
const STATE_CANCELLED: u8 = 2;

/// Why the feed side stopped delivering.
const CLOSE_NONE: u8 = 0;
const CLOSE_CANCELLED: u8 = 1;
const CLOSE_SHUTDOWN: u8 = 2;
const CLOSE_OVERFLOW: u8 = 3;

/// State shared between the feed's subscriber entry and the handle.
#[derive(Debug)]
pub(crate) struct SubscriberShared {
    state: AtomicU8,
    close_reason: AtomicU8,
}

impl SubscriberShared {
    pub(crate) fn new(catching_up: bool) -> Self {
        Self {
            state: AtomicU8::new(if catching_up { STATE_CATCHING_UP } else { STATE_LIVE }),
            close_reason: AtomicU8::new(CLOSE_NONE),
        }
    }

    /// Record a close reason. Only the first reason sticks.
    fn close(&self, reason: u8) -> bool {
        self.close_reason
            .compare_exchange(CLOSE_NONE, reason, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }

    pub(crate) fn mark_overflow(&self) -> bool {
        self.close(CLOSE_OVERFLOW)
    }

    pub(crate) fn mark_shutdown(&self) {
        if self.close(CLOSE_SHUTDOWN) {
            self.state.store(STATE_CANCELLED, Ordering::Release);
        }
    }

    fn detached(&self) -> bool {
        self.close_reason.load(Ordering::Acquire) != CLOSE_NONE
    }

    fn state(&self) -> SubscriptionState {
        match self.state.load(Ordering::Acquire) {
            STATE_CATCHING_UP => SubscriptionState::CatchingUp,
            STATE_LIVE => SubscriptionState::Live,
            _ => SubscriptionState::Cancelled,
        }
    }

    fn go_live(&self) {
        let _ = self
            .state
            .compare_exchange(STATE_CATCHING_UP, STATE_LIVE, Ordering::AcqRel, Ordering::Acquire);
    }

    fn cancel_state(&self) {
        self.state.store(STATE_CANCELLED, Ordering::Release);
    }
}

/// A live feed subscription.
#[derive(Debug)]
pub struct FeedSubscription {
    id: SubscriptionId,
    capacity: usize,
    backlog: Mutex<VecDeque<FeedEvent>>,
    rx: Receiver<FeedEvent>,
    shared: Arc<SubscriberShared>,
    feed: Weak<FeedShared>,
}

impl FeedSubscription {
    pub(crate) fn new(
        id: SubscriptionId,
        capacity: usize,
        backlog: Vec<FeedEvent>,
        rx: Receiver<FeedEvent>,
        shared: Arc<SubscriberShared>,
        feed: Weak<FeedShared>,
    ) -> Self {
        Self {
            id,
            capacity,
            backlog: Mutex::new(backlog.into()),
            rx,
            shared,
            feed,
        }
    }

    /// The subscription id.
    #[must_use]
    pub const fn id(&self) -> SubscriptionId {
        self.id
    }

    /// Current delivery state.
    ///
    /// After an overflow detach this stays `Live` until the buffered events
    /// are drained; see [`FeedSubscription::is_detached`].
    #[must_use]
    pub fn state(&self) -> SubscriptionState {
        self.shared.state()
    }

    /// Whether the feed has stopped pushing to this subscription (overflow,
    /// shutdown or cancel). Buffered events may still be readable.
    #[must_use]
    pub fn is_detached(&self) -> bool {
        self.shared.detached()
    }

    /// Replay events not yet delivered.
    #[must_use]
    pub fn backlog_len(&self) -> usize {
        self.backlog.lock().map(|b| b.len()).unwrap_or(0)
    }

    /// Stop delivery immediately and release the feed-side buffer.
    ///
    /// Idempotent: cancelling an already cancelled subscription is a no-op.
    pub fn cancel(&self) {
        let first = self.shared.close(CLOSE_CANCELLED);
        self.shared.cancel_state();
        if let Ok(mut backlog) = self.backlog.lock() {
            backlog.clear();
        }
        if first {
            if let Some(feed) = self.feed.upgrade() {
                feed.remove_subscriber(self.id);
            }
        }
    }

    /// Pop the next replay event, switching to `Live` once the backlog drains.
    fn next_from_backlog(&self) -> AajiResult<Option<FeedEvent>> {
        let mut backlog = self
            .backlog
            .lock()
            .map_err(|_| AajiError::internal("poisoned lock: subscription.backlog"))?;
        let event = backlog.pop_front();
        if backlog.is_empty() {
            self.shared.go_live();
        }
        Ok(event)
    }

    fn ensure_open(&self) -> AajiResult<()> {
        if self.shared.state() == SubscriptionState::Cancelled {
            return Err(self.closed_error());
        }
        Ok(())
    }

    /// Map the feed-side close reason to the error surfaced to the caller and
    /// move to `Cancelled`.
    fn closed_error(&self) -> AajiError {
        self.shared.cancel_state();
        match self.shared.close_reason.load(Ordering::Acquire) {
            CLOSE_OVERFLOW => AajiError::Execution(ExecutionError::SubscriberOverflow {
                subscription_id: self.id,
                capacity: self.capacity,
            }),
            CLOSE_SHUTDOWN => AajiError::Execution(ExecutionError::FeedClosed),
            _ => AajiError::Execution(ExecutionError::Disconnected {
                path: "feed_subscription".to_string(),
            }),
        }
    }

    /// Receive the next event (blocking).
    ///
    /// # Errors
    /// - `SubscriberOverflow` once the buffered events are drained after the
    ///   feed disconnected this subscriber for falling behind
    /// - `FeedClosed` after feed shutdown
    /// - `Disconnected` after `cancel`
    pub fn recv(&self) -> AajiResult<FeedEvent> {
        self.ensure_open()?;
        if let Some(event) = self.next_from_backlog()? {
            return Ok(event);
        }
        self.rx.recv().map_err(|_| self.closed_error())
    }

    /// Receive the next event with a timeout.
    pub fn recv_timeout(&self, timeout: Duration) -> AajiResult<FeedEvent> {
        self.ensure_open()?;
        if let Some(event) = self.next_from_backlog()? {
            return Ok(event);
        }
        self.rx.recv_timeout(timeout).map_err(|err| match err {
            RecvTimeoutError::Timeout => AajiError::Execution(ExecutionError::Timeout {
                duration_ms: u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX),
            }),
            RecvTimeoutError::Disconnected => self.closed_error(),
        })
    }

    /// Take the next event if one is ready.
    pub fn try_recv(&self) -> AajiResult<Option<FeedEvent>> {
        self.ensure_open()?;
        if let Some(event) = self.next_from_backlog()? {
            return Ok(Some(event));
        }
        match self.rx.try_recv() {
            Ok(event) => Ok(Some(event)),
            Err(TryRecvError::Empty) => Ok(None),
            Err(TryRecvError::Disconnected) => Err(self.closed_error()),
        }
    }

    /// Drain every event that is ready right now.
    ///
    /// A close that happens mid-drain is reported on the next call so the
    /// events already drained are not lost.
    pub fn drain_ready(&self) -> AajiResult<Vec<FeedEvent>> {
        let mut out = Vec::new();
        loop {
            match self.try_recv() {
                Ok(Some(event)) => out.push(event),
                Ok(None) => return Ok(out),
                Err(err) if out.is_empty() => return Err(err),
                Err(_) => return Ok(out),
            }
        }
    }
}

impl Drop for FeedSubscription {
    fn drop(&mut self) {
        self.cancel();
    }
}
