//! Bounded retention window.
//!
//! Holds the most recent `capacity` events in id order. Because ids are
//! gap-free, the window is always a contiguous id range.

use std::collections::VecDeque;

use crate::error::{AajiError, ExecutionError};
use crate::event::{EventId, FeedEvent};

#[derive(Debug)]
pub(crate) struct RetentionWindow {
    events: VecDeque<FeedEvent>,
    capacity: usize,
}

impl RetentionWindow {
    pub(crate) fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            events: VecDeque::with_capacity(capacity.min(4096)),
            capacity,
        }
    }

    pub(crate) fn len(&self) -> usize {
        self.events.len()
    }

    pub(crate) fn capacity(&self) -> usize {
        self.capacity
    }

    pub(crate) fn oldest_id(&self) -> Option<EventId> {
        self.events.front().map(|e| e.id)
    }

    pub(crate) fn newest_id(&self) -> Option<EventId> {
        self.events.back().map(|e| e.id)
    }

    /// Append an event, evicting the oldest one when over capacity.
    pub(crate) fn push(&mut self, event: FeedEvent) -> Option<FeedEvent> {
        self.events.push_back(event);
        if self.events.len() > self.capacity {
            self.events.pop_front()
        } else {
            None
        }
    }

    /// The most recent `limit` events, oldest first.
    pub(crate) fn recent(&self, limit: usize) -> Vec<FeedEvent> {
        let skip = self.events.len().saturating_sub(limit);
        self.events.iter().skip(skip).cloned().collect()
    }

    /// Every retained event with `id > after`.
    ///
    /// `next_id` is the id the feed will assign next. Fails with `ReplayGap`
    /// when `after` lies outside the window: events in `(after, oldest)` have
    /// already been evicted, or `after` names an event this feed never
    /// published (a cursor carried over from a restarted feed).
    pub(crate) fn since(&self, after: EventId, next_id: EventId) -> Result<Vec<FeedEvent>, AajiError> {
        let first_available = self.oldest_id().unwrap_or(next_id);
        if after >= next_id || after.next() < first_available {
            return Err(ExecutionError::ReplayGap {
                requested: after,
                oldest_retained: first_available,
            }
            .into());
        }

        // Contiguous ids: the first wanted event sits at a fixed offset.
        let offset = usize::try_from(after.next().get() - first_available.get()).unwrap_or(usize::MAX);
        Ok(self.events.iter().skip(offset).cloned().collect())
    }
}

#[cfg(test)]
mod tests {
    use chrono::Utc;

    use super::*;
    use crate::channel::ChannelId;
    use crate::event::Severity;

    fn ev(id: u64) -> FeedEvent {
        FeedEvent {
            id: EventId::new(id),
            timestamp: Utc::now(),
            channel_id: ChannelId::new_unchecked("twilio/whatsapp"),
            severity: Severity::Info,
            message: format!("event {id}"),
        }
    }

    fn filled(capacity: usize, count: u64) -> RetentionWindow {
        let mut w = RetentionWindow::new(capacity);
        for id in 1..=count {
            w.push(ev(id));
        }
        w
    }

    fn ids(events: &[FeedEvent]) -> Vec<u64> {
        events.iter().map(|e| e.id.get()).collect()
    }

    #[test]
    fn push_evicts_oldest() {
        let mut w = RetentionWindow::new(3);
        assert!(w.push(ev(1)).is_none());
        w.push(ev(2));
        w.push(ev(3));
        let evicted = w.push(ev(4)).unwrap();
        assert_eq!(evicted.id, EventId::new(1));
        assert_eq!(w.oldest_id(), Some(EventId::new(2)));
        assert_eq!(w.newest_id(), Some(EventId::new(4)));
        assert_eq!(w.len(), 3);
    }

    #[test]
    fn recent_is_oldest_first_and_bounded() {
        let w = filled(5, 8);
        assert_eq!(ids(&w.recent(2)), vec![7, 8]);
        assert_eq!(ids(&w.recent(100)), vec![4, 5, 6, 7, 8]);
        assert!(w.recent(0).is_empty());
    }

    #[test]
    fn since_within_window() {
        let w = filled(5, 8);
        let next = EventId::new(9);
        assert_eq!(ids(&w.since(EventId::new(3), next).unwrap()), vec![4, 5, 6, 7, 8]);
        assert_eq!(ids(&w.since(EventId::new(6), next).unwrap()), vec![7, 8]);
        assert!(w.since(EventId::new(8), next).unwrap().is_empty());
    }

    #[test]
    fn since_before_window_is_gap() {
        let w = filled(5, 8);
        let err = w.since(EventId::new(2), EventId::new(9)).unwrap_err();
        let AajiError::Execution(ExecutionError::ReplayGap { requested, oldest_retained }) = err else {
            panic!("expected ReplayGap, got {err:?}");
        };
        assert_eq!(requested, EventId::new(2));
        assert_eq!(oldest_retained, EventId::new(4));
    }

    #[test]
    fn since_ahead_of_head_is_gap() {
        let w = filled(5, 3);
        let err = w.since(EventId::new(4), EventId::new(4)).unwrap_err();
        assert!(err.requires_resync());
        let AajiError::Execution(ExecutionError::ReplayGap { requested, oldest_retained }) = err else {
            panic!("expected ReplayGap, got {err:?}");
        };
        assert_eq!(requested, EventId::new(4));
        assert_eq!(oldest_retained, EventId::new(1));

        // Same for a cursor carried into an empty feed.
        let empty = RetentionWindow::new(4);
        let err = empty.since(EventId::new(500), EventId::new(1)).unwrap_err();
        assert!(matches!(err, AajiError::Execution(ExecutionError::ReplayGap { .. })));
    }

    #[test]
    fn since_on_empty_window() {
        let w = RetentionWindow::new(4);
        assert!(w.since(EventId::ZERO, EventId::new(1)).unwrap().is_empty());
    }
}
