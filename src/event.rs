//! Feed event types.
//!
//! These types are serializable so they can be streamed to dashboards as-is.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::channel::ChannelId;

/// Feed sequence number.
///
/// Assigned by the feed on publish. The first event of a feed is `1`; `0` is
/// the "nothing seen yet" cursor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EventId(u64);

impl EventId {
    /// Cursor that precedes every event.
    pub const ZERO: Self = Self(0);

    /// Wraps a raw sequence number.
    #[must_use]
    pub const fn new(seq: u64) -> Self {
        Self(seq)
    }

    /// Returns the raw sequence number.
    #[must_use]
    pub const fn get(self) -> u64 {
        self.0
    }

    /// Returns the following sequence number.
    #[must_use]
    pub const fn next(self) -> Self {
        Self(self.0.saturating_add(1))
    }
}

impl fmt::Display for EventId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<u64> for EventId {
    fn from(seq: u64) -> Self {
        Self(seq)
    }
}

/// Severity tag, drives the badge color on the dashboard.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    /// System notices (extraction results, status changes).
    Info,
    /// Engagement progressing (persona replies).
    Success,
    /// Scammer traffic.
    Danger,
}

impl Severity {
    /// All severities, in display order.
    pub const ALL: [Self; 3] = [Self::Info, Self::Success, Self::Danger];

    /// Lowercase wire name.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Info => "info",
            Self::Success => "success",
            Self::Danger => "danger",
        }
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A published interception/engagement event. Immutable once published.
#[allow(missing_docs)]
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeedEvent {
    pub id: EventId,
    pub timestamp: DateTime<Utc>,
    pub channel_id: ChannelId,
    pub severity: Severity,
    pub message: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn event_id_orders_and_advances() {
        assert!(EventId::ZERO < EventId::new(1));
        assert_eq!(EventId::ZERO.next(), EventId::new(1));
        assert_eq!(EventId::new(u64::MAX).next(), EventId::new(u64::MAX));
    }

    #[test]
    fn feed_event_wire_shape() {
        let event = FeedEvent {
            id: EventId::new(1),
            timestamp: Utc::now(),
            channel_id: ChannelId::new_unchecked("twilio/whatsapp"),
            severity: Severity::Danger,
            message: "KYC request".to_string(),
        };

        let v = serde_json::to_value(&event).unwrap();
        assert_eq!(v["id"], 1);
        assert_eq!(v["channel_id"], "twilio/whatsapp");
        assert_eq!(v["severity"], "danger");
        assert_eq!(v["message"], "KYC request");
        assert!(v["timestamp"].is_string());
    }
}
