//! Core types used throughout parley

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::{DOMAIN_SEPARATOR, GROUP_DOMAIN};

/// A destination address, normalized against a network domain.
///
/// Addresses come in two forms. The bare form is the phone-number-like
/// account string (`79123456789`) and is what the deliverability lookup
/// expects. The qualified form carries the domain suffix
/// (`79123456789@s.whatsapp.net`) and is what sends are addressed to.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct Address {
    raw: String,
    bare: String,
    qualified: String,
}

impl Address {
    /// Parse a raw destination, appending `user_domain` when no domain is present
    pub fn parse(raw: &str, user_domain: &str) -> Self {
        let raw = raw.trim();

        match raw.split_once(DOMAIN_SEPARATOR) {
            Some((user, _domain)) => {
                // Multi-device addresses carry a `:device` suffix on the user part
                let bare = user.split(':').next().unwrap_or(user);
                Self {
                    raw: raw.to_string(),
                    bare: bare.to_string(),
                    qualified: raw.to_string(),
                }
            }
            None => Self {
                raw: raw.to_string(),
                bare: raw.to_string(),
                qualified: format!("{}{}{}", raw, DOMAIN_SEPARATOR, user_domain),
            },
        }
    }

    /// The address exactly as supplied (trimmed)
    pub fn raw(&self) -> &str {
        &self.raw
    }

    /// Bare form, used for deliverability lookups
    pub fn bare(&self) -> &str {
        &self.bare
    }

    /// Fully-qualified form, used for sends
    pub fn qualified(&self) -> &str {
        &self.qualified
    }

    /// Whether the raw input already carried a domain
    pub fn was_qualified(&self) -> bool {
        self.raw.contains(DOMAIN_SEPARATOR)
    }

    /// Whether this address names a group conversation
    pub fn is_group(&self) -> bool {
        self.qualified
            .rsplit_once(DOMAIN_SEPARATOR)
            .map(|(_, domain)| domain == GROUP_DOMAIN)
            .unwrap_or(false)
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.qualified)
    }
}

/// Identity of the authenticated account, as resolved by the transport
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct AccountId(String);

impl AccountId {
    /// Create from string
    pub fn from_string(s: impl Into<String>) -> Self {
        Self(s.into())
    }

    /// Get as string slice
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for AccountId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for AccountId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

/// Provider-assigned message identifier
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MessageId(String);

impl MessageId {
    /// Create from string
    pub fn from_string(s: impl Into<String>) -> Self {
        Self(s.into())
    }

    /// Get as string slice
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for MessageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for MessageId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

/// Timestamp in seconds since Unix epoch.
///
/// Provider timestamps are second-resolution, so this type is too.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Timestamp(i64);

impl Timestamp {
    /// Create timestamp for current time
    pub fn now() -> Self {
        Self(chrono::Utc::now().timestamp())
    }

    /// Create from seconds
    pub fn from_secs(secs: i64) -> Self {
        Self(secs)
    }

    /// Get as seconds
    pub fn as_secs(&self) -> i64 {
        self.0
    }

    /// Get as chrono DateTime
    pub fn as_datetime(&self) -> Option<chrono::DateTime<chrono::Utc>> {
        chrono::DateTime::from_timestamp(self.0, 0)
    }
}

impl fmt::Display for Timestamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}
