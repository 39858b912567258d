//! Channel connection types.
//!
//! A channel is an external messaging provider integration point (a WhatsApp
//! webhook, an Instagram Graph API subscription, ...). The registry owns these
//! records; the feed only ever holds a [`ChannelId`] back-reference.

use std::borrow::Borrow;
use std::fmt;
use std::sync::OnceLock;

use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::error::{AajiError, AajiResult, ValidationError};

/// Maximum length of a channel id.
pub const MAX_CHANNEL_ID_LEN: usize = 128;
/// Maximum length of a display name.
pub const MAX_DISPLAY_NAME_LEN: usize = 128;
/// Maximum length of an endpoint path.
pub const MAX_ENDPOINT_PATH_LEN: usize = 256;
/// Maximum length of a channel description.
pub const MAX_DESCRIPTION_LEN: usize = 512;

const CHANNEL_ID_PATTERN: &str = r"^[A-Za-z0-9][A-Za-z0-9._-]*(/[A-Za-z0-9._-]+)*$";
const ENDPOINT_PATH_PATTERN: &str = r"^(/[A-Za-z0-9._~-]+)+$";

static CHANNEL_ID_RE: OnceLock<Result<Regex, regex::Error>> = OnceLock::new();
static ENDPOINT_PATH_RE: OnceLock<Result<Regex, regex::Error>> = OnceLock::new();

fn compiled(
    cell: &'static OnceLock<Result<Regex, regex::Error>>,
    pattern: &'static str,
) -> AajiResult<&'static Regex> {
    cell.get_or_init(|| Regex::new(pattern))
        .as_ref()
        .map_err(|e| AajiError::internal(format!("invalid built-in pattern {pattern}: {e}")))
}

fn require_text(field: &str, value: &str, max_length: usize) -> Result<(), ValidationError> {
    if value.trim().is_empty() {
        return Err(ValidationError::EmptyField {
            field: field.to_string(),
        });
    }
    if value.len() > max_length {
        return Err(ValidationError::FieldTooLong {
            field: field.to_string(),
            max_length,
        });
    }
    Ok(())
}

/// Stable channel identifier, e.g. `twilio/whatsapp`.
///
/// Ids are provider-scoped slash-separated segments. They are compared
/// byte-for-byte; no case folding is applied.
///
/// # Examples
///
/// ```
/// use aaji_core::ChannelId;
///
/// let id = ChannelId::parse("twilio/whatsapp").unwrap();
/// assert_eq!(id.as_str(), "twilio/whatsapp");
/// assert!(ChannelId::parse("/leading-slash").is_err());
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct ChannelId(String);

impl ChannelId {
    /// Parses and validates a channel id.
    pub fn parse(value: impl Into<String>) -> AajiResult<Self> {
        let value = value.into();
        require_text("id", &value, MAX_CHANNEL_ID_LEN)?;
        if !compiled(&CHANNEL_ID_RE, CHANNEL_ID_PATTERN)?.is_match(&value) {
            return Err(ValidationError::InvalidChannelId {
                value,
                reason: "expected slash-separated segments of [A-Za-z0-9._-]".to_string(),
            }
            .into());
        }
        Ok(Self(value))
    }

    /// Wraps a string without validation.
    ///
    /// Lookups against the registry with an unchecked id simply miss; use this
    /// for ids that came from a trusted snapshot or for tests.
    #[must_use]
    pub fn new_unchecked(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    /// Returns the id as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ChannelId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl TryFrom<String> for ChannelId {
    type Error = AajiError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(value)
    }
}

impl From<ChannelId> for String {
    fn from(id: ChannelId) -> Self {
        id.0
    }
}

impl AsRef<str> for ChannelId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl Borrow<str> for ChannelId {
    fn borrow(&self) -> &str {
        &self.0
    }
}

/// Health/status of a channel connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChannelStatus {
    /// Receiving traffic.
    Active,
    /// Configured but not yet confirmed live.
    Pending,
    /// Switched off; webhooks are not expected.
    Disabled,
}

impl ChannelStatus {
    /// All statuses, in display order.
    pub const ALL: [Self; 3] = [Self::Active, Self::Pending, Self::Disabled];

    /// Lowercase wire name.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Active => "active",
            Self::Pending => "pending",
            Self::Disabled => "disabled",
        }
    }
}

impl fmt::Display for ChannelStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A configured inbound channel.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChannelConnection {
    /// Stable identifier, unique across the registry.
    pub id: ChannelId,
    /// Human label, e.g. "WhatsApp".
    pub display_name: String,
    /// Webhook path external providers call. Unique across the registry.
    pub endpoint_path: String,
    /// Current health/status.
    pub status: ChannelStatus,
    /// Optional longer description shown on the dashboard card.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

impl ChannelConnection {
    /// Creates and validates a connection record.
    pub fn new(
        id: impl Into<String>,
        display_name: impl Into<String>,
        endpoint_path: impl Into<String>,
        status: ChannelStatus,
    ) -> AajiResult<Self> {
        let connection = Self {
            id: ChannelId::parse(id)?,
            display_name: display_name.into(),
            endpoint_path: endpoint_path.into(),
            status,
            description: None,
        };
        connection.validate()?;
        Ok(connection)
    }

    /// Attaches a description.
    #[must_use]
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    /// Validates every field of the record.
    ///
    /// Fields are public and ids may come from [`ChannelId::new_unchecked`],
    /// so the registry re-validates on insert.
    pub fn validate(&self) -> AajiResult<()> {
        ChannelId::parse(self.id.as_str())?;
        require_text("display_name", &self.display_name, MAX_DISPLAY_NAME_LEN)?;
        require_text("endpoint_path", &self.endpoint_path, MAX_ENDPOINT_PATH_LEN)?;

        if !compiled(&ENDPOINT_PATH_RE, ENDPOINT_PATH_PATTERN)?.is_match(&self.endpoint_path) {
            return Err(ValidationError::InvalidEndpointPath {
                value: self.endpoint_path.clone(),
                reason: "must start with '/', contain only URL path characters and have no trailing '/'".to_string(),
            }
            .into());
        }

        if let Some(description) = &self.description {
            if description.len() > MAX_DESCRIPTION_LEN {
                return Err(ValidationError::FieldTooLong {
                    field: "description".to_string(),
                    max_length: MAX_DESCRIPTION_LEN,
                }
                .into());
            }
        }

        Ok(())
    }
}

/// The four channels the product ships with.
///
/// WhatsApp and Instagram are live; Telegram and Email are configured but
/// pending.
#[must_use]
pub fn default_channels() -> Vec<ChannelConnection> {
    let seeds = [
        ("twilio/whatsapp", "WhatsApp", "/twilio/whatsapp", ChannelStatus::Active, "Twilio Sandbox / Business API"),
        ("meta/instagram", "Instagram", "/meta/instagram", ChannelStatus::Active, "Meta Graph API Webhooks"),
        ("telegram/bot", "Telegram", "/telegram/webhook", ChannelStatus::Pending, "Telegram Bot API"),
        ("email/imap", "Email", "/email/webhook", ChannelStatus::Pending, "SMTP / IMAP Integration"),
    ];

    seeds
        .into_iter()
        .map(|(id, name, path, status, description)| ChannelConnection {
            id: ChannelId::new_unchecked(id),
            display_name: name.to_string(),
            endpoint_path: path.to_string(),
            status,
            description: Some(description.to_string()),
        })
        .collect()
}
