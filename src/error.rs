//! Error types for aaji-core.
//!
//! All errors are strongly typed using thiserror so callers can match on the
//! specific condition. Every error is scoped to a single operation or a single
//! subscription; nothing here is fatal to the registry or the feed.

use thiserror::Error;

use crate::channel::ChannelId;
use crate::event::EventId;
use crate::feed::SubscriptionId;

/// Validation errors that occur during input validation.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ValidationError {
    #[error("Field '{field}' cannot be empty")]
    EmptyField {
        field: String,
    },

    #[error("Field '{field}' exceeds maximum length of {max_length}")]
    FieldTooLong {
        field: String,
        max_length: usize,
    },

    #[error("Invalid channel id '{value}': {reason}")]
    InvalidChannelId {
        value: String,
        reason: String,
    },

    #[error("Invalid endpoint path '{value}': {reason}")]
    InvalidEndpointPath {
        value: String,
        reason: String,
    },

    #[error("Invalid configuration: {reason}")]
    InvalidConfig {
        reason: String,
    },
}

/// Execution errors that occur while operating on the registry or the feed.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ExecutionError {
    #[error("Duplicate channel: {field} '{value}' is already registered")]
    DuplicateChannel {
        field: String,
        value: String,
    },

    #[error("Unknown channel: {id}")]
    UnknownChannel {
        id: ChannelId,
    },

    #[error("Replay gap: requested events after {requested}, oldest retained is {oldest_retained}")]
    ReplayGap {
        requested: EventId,
        oldest_retained: EventId,
    },

    #[error("Subscriber {subscription_id} overflowed its buffer of {capacity} events")]
    SubscriberOverflow {
        subscription_id: SubscriptionId,
        capacity: usize,
    },

    #[error("Feed is closed")]
    FeedClosed,

    #[error("Operation timed out after {duration_ms}ms")]
    Timeout {
        duration_ms: u64,
    },

    #[error("Disconnected: {path}")]
    Disconnected {
        path: String,
    },
}

/// Top-level error type for aaji-core.
#[derive(Debug, Error)]
pub enum AajiError {
    #[error("Validation error: {0}")]
    Validation(#[from] ValidationError),

    #[error("Execution error: {0}")]
    Execution(#[from] ExecutionError),

    #[error("Config error: {message}")]
    Config {
        message: String,
    },

    #[error("Internal error: {message}")]
    Internal {
        message: String,
    },
}

impl AajiError {
    /// Creates an internal error.
    #[must_use]
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal {
            message: message.into(),
        }
    }

    /// Creates a config loading error.
    #[must_use]
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config {
            message: message.into(),
        }
    }

    /// Returns true if this is a validation error.
    #[must_use]
    pub const fn is_validation(&self) -> bool {
        matches!(self, Self::Validation(_))
    }

    /// Returns true if this is an execution error.
    #[must_use]
    pub const fn is_execution(&self) -> bool {
        matches!(self, Self::Execution(_))
    }

    /// Returns true if this is an internal error.
    #[must_use]
    pub const fn is_internal(&self) -> bool {
        matches!(self, Self::Internal { .. })
    }

    /// Returns true if the subscriber must re-fetch `history()` and resubscribe.
    #[must_use]
    pub const fn requires_resync(&self) -> bool {
        matches!(
            self,
            Self::Execution(ExecutionError::ReplayGap { .. } | ExecutionError::SubscriberOverflow { .. })
        )
    }

    /// Returns true if this error is retryable as-is.
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        match self {
            Self::Validation(_) | Self::Config { .. } | Self::Internal { .. } => false,
            Self::Execution(e) => matches!(e, ExecutionError::Timeout { .. }),
        }
    }
}

/// Result type alias for aaji-core operations.
pub type AajiResult<T> = Result<T, AajiError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validation_error_empty_field() {
        let err = ValidationError::EmptyField {
            field: "display_name".to_string(),
        };
        let msg = format!("{err}");
        assert!(msg.contains("display_name"));
        assert!(msg.contains("cannot be empty"));
    }

    #[test]
    fn test_execution_error_duplicate_channel() {
        let err = ExecutionError::DuplicateChannel {
            field: "endpoint_path".to_string(),
            value: "/twilio/whatsapp".to_string(),
        };
        let msg = format!("{err}");
        assert!(msg.contains("endpoint_path"));
        assert!(msg.contains("/twilio/whatsapp"));
    }

    #[test]
    fn test_execution_error_replay_gap() {
        let err = ExecutionError::ReplayGap {
            requested: EventId::new(3),
            oldest_retained: EventId::new(10),
        };
        let msg = format!("{err}");
        assert!(msg.contains("after 3"));
        assert!(msg.contains("oldest retained is 10"));
    }

    #[test]
    fn test_execution_error_timeout() {
        let err = ExecutionError::Timeout { duration_ms: 5000 };
        assert!(format!("{err}").contains("5000ms"));
    }

    #[test]
    fn test_aaji_error_from_validation() {
        let err: AajiError = ValidationError::EmptyField {
            field: "id".to_string(),
        }
        .into();
        assert!(err.is_validation());
        assert!(!err.is_retryable());
        assert!(!err.requires_resync());
    }

    #[test]
    fn test_aaji_error_resync_classification() {
        let gap: AajiError = ExecutionError::ReplayGap {
            requested: EventId::new(1),
            oldest_retained: EventId::new(5),
        }
        .into();
        assert!(gap.is_execution());
        assert!(gap.requires_resync());

        let overflow: AajiError = ExecutionError::SubscriberOverflow {
            subscription_id: SubscriptionId::new(),
            capacity: 8,
        }
        .into();
        assert!(overflow.requires_resync());

        let unknown: AajiError = ExecutionError::UnknownChannel {
            id: ChannelId::new_unchecked("unknown/channel"),
        }
        .into();
        assert!(!unknown.requires_resync());
    }

    #[test]
    fn test_aaji_error_retryable() {
        let timeout: AajiError = ExecutionError::Timeout { duration_ms: 10 }.into();
        assert!(timeout.is_retryable());

        let closed: AajiError = ExecutionError::FeedClosed.into();
        assert!(!closed.is_retryable());

        let internal = AajiError::internal("poisoned lock");
        assert!(internal.is_internal());
        assert!(!internal.is_retryable());
        assert!(format!("{internal}").contains("poisoned lock"));
    }
}
