//! Connection state for a single logical session
//!
//! A session is one authenticated connection to the messaging network. Its
//! status is owned by the session manager and only changes on transport
//! events.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::types::{AccountId, Timestamp};

/// Connection state
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConnectionState {
    /// Socket exists, not yet authenticated
    Connecting,
    /// Authenticated and usable
    Open,
    /// Socket closed
    Closed,
}

impl Default for ConnectionState {
    fn default() -> Self {
        Self::Connecting
    }
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Connecting => "connecting",
            Self::Open => "open",
            Self::Closed => "closed",
        };
        f.write_str(s)
    }
}

/// Why the transport closed
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DisconnectReason {
    /// Credentials revoked; must re-pair
    LoggedOut,
    /// Server closed the connection
    ConnectionClosed,
    /// Connection lost or timed out
    ConnectionLost,
    /// Another client took over this session
    ConnectionReplaced,
    /// Session state is corrupt
    BadSession,
    /// Server asked for a restart (normal after pairing)
    RestartRequired,
    /// Multi-device protocol mismatch
    MultideviceMismatch,
    /// Access forbidden
    Forbidden,
    /// Service unavailable
    Unavailable,
    /// Any other status code
    Other(u16),
}

impl DisconnectReason {
    /// Classify a provider status code
    pub fn from_status_code(code: u16) -> Self {
        match code {
            401 => Self::LoggedOut,
            403 => Self::Forbidden,
            408 => Self::ConnectionLost,
            411 => Self::MultideviceMismatch,
            428 => Self::ConnectionClosed,
            440 => Self::ConnectionReplaced,
            500 => Self::BadSession,
            503 => Self::Unavailable,
            515 => Self::RestartRequired,
            other => Self::Other(other),
        }
    }

    /// Provider status code
    pub fn status_code(&self) -> u16 {
        match self {
            Self::LoggedOut => 401,
            Self::Forbidden => 403,
            Self::ConnectionLost => 408,
            Self::MultideviceMismatch => 411,
            Self::ConnectionClosed => 428,
            Self::ConnectionReplaced => 440,
            Self::BadSession => 500,
            Self::Unavailable => 503,
            Self::RestartRequired => 515,
            Self::Other(code) => *code,
        }
    }

    /// Explicit, non-recoverable deauthorization
    pub fn is_logged_out(&self) -> bool {
        matches!(self, Self::LoggedOut)
    }
}

impl fmt::Display for DisconnectReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Other(code) => write!(f, "status {}", code),
            other => write!(f, "{:?} ({})", other, other.status_code()),
        }
    }
}

/// Details of the last disconnect
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct DisconnectInfo {
    /// Classified reason
    pub reason: DisconnectReason,
    /// Provider error text, if any
    pub message: Option<String>,
    /// When the disconnect was observed
    pub at: Timestamp,
}

impl DisconnectInfo {
    /// Create with the current time
    pub fn new(reason: DisconnectReason, message: Option<String>) -> Self {
        Self {
            reason,
            message,
            at: Timestamp::now(),
        }
    }
}

/// Observable status of the session.
///
/// `identity` is present exactly when `state` is [`ConnectionState::Open`];
/// the mutators below are the only way to change state, and they keep
/// that invariant.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct SessionStatus {
    state: ConnectionState,
    identity: Option<AccountId>,
    last_disconnect: Option<DisconnectInfo>,
    connected_at: Option<Timestamp>,
}

impl SessionStatus {
    /// Fresh status in the connecting state
    pub fn new() -> Self {
        Self::default()
    }

    /// Current connection state
    pub fn state(&self) -> ConnectionState {
        self.state
    }

    /// Authenticated account, present iff open
    pub fn identity(&self) -> Option<&AccountId> {
        self.identity.as_ref()
    }

    /// Last disconnect, cleared on open
    pub fn last_disconnect(&self) -> Option<&DisconnectInfo> {
        self.last_disconnect.as_ref()
    }

    /// When the session last opened
    pub fn connected_at(&self) -> Option<Timestamp> {
        self.connected_at
    }

    /// Whether the session is open
    pub fn is_open(&self) -> bool {
        self.state == ConnectionState::Open
    }

    /// A new socket is being established
    pub fn mark_connecting(&mut self) {
        self.state = ConnectionState::Connecting;
        self.identity = None;
    }

    /// The transport authenticated as `identity`
    pub fn mark_open(&mut self, identity: AccountId) {
        self.state = ConnectionState::Open;
        self.identity = Some(identity);
        self.last_disconnect = None;
        self.connected_at = Some(Timestamp::now());
    }

    /// The transport closed
    pub fn mark_closed(&mut self, info: DisconnectInfo) {
        self.state = ConnectionState::Closed;
        self.identity = None;
        self.last_disconnect = Some(info);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn identity_invariant(status: &SessionStatus) -> bool {
        status.identity().is_some() == status.is_open()
    }

    #[test]
    fn test_status_transitions() {
        let mut status = SessionStatus::new();
        assert_eq!(status.state(), ConnectionState::Connecting);
        assert!(identity_invariant(&status));

        status.mark_open(AccountId::from("79000000000@s.whatsapp.net"));
        assert!(status.is_open());
        assert!(status.last_disconnect().is_none());
        assert!(identity_invariant(&status));

        status.mark_closed(DisconnectInfo::new(DisconnectReason::ConnectionLost, None));
        assert_eq!(status.state(), ConnectionState::Closed);
        assert_eq!(
            status.last_disconnect().map(|d| d.reason),
            Some(DisconnectReason::ConnectionLost)
        );
        assert!(identity_invariant(&status));

        status.mark_connecting();
        assert!(identity_invariant(&status));
        // Last disconnect survives until the next open
        assert!(status.last_disconnect().is_some());
    }

    #[test]
    fn test_open_clears_last_disconnect() {
        let mut status = SessionStatus::new();
        status.mark_closed(DisconnectInfo::new(DisconnectReason::RestartRequired, None));
        status.mark_open(AccountId::from("me"));
        assert!(status.last_disconnect().is_none());
    }

    #[test]
    fn test_disconnect_reason_codes() {
        for code in [401u16, 403, 408, 411, 428, 440, 500, 503, 515, 499] {
            assert_eq!(DisconnectReason::from_status_code(code).status_code(), code);
        }
        assert!(DisconnectReason::from_status_code(401).is_logged_out());
        assert!(!DisconnectReason::from_status_code(428).is_logged_out());
        assert_eq!(DisconnectReason::from_status_code(499), DisconnectReason::Other(499));
    }
}
