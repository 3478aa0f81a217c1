//! # Parley Core
//!
//! Core types, traits, and utilities for the parley session facade.
//!
//! This crate provides:
//! - Destination addresses and provider identifiers
//! - Inbound and outbound message records
//! - Connection-state records for a single logical session
//! - Credential storage traits and backends
//! - Common error types

#![forbid(unsafe_code)]
#![warn(missing_docs, rust_2018_idioms)]

pub mod error;
pub mod message;
pub mod session;
pub mod storage;
pub mod types;

pub use error::{Error, Result};
pub use message::{
    InboundBatch, InboundMessage, MessagePayload, NotificationKind, OutboundRequest, SendOutcome,
    SendOutcomeRecord,
};
pub use session::{ConnectionState, DisconnectInfo, DisconnectReason, SessionStatus};
pub use storage::{CredentialStore, Credentials, FileCredentialStore};
pub use types::{AccountId, Address, MessageId, Timestamp};

/// Canonical domain suffix for individual accounts
pub const DEFAULT_USER_DOMAIN: &str = "s.whatsapp.net";

/// Domain suffix used by group conversations
pub const GROUP_DOMAIN: &str = "g.us";

/// Separator between the bare address and its domain
pub const DOMAIN_SEPARATOR: char = '@';

/// Prelude for convenient imports
pub mod prelude {
    pub use crate::error::{Error, Result};
    pub use crate::message::{InboundBatch, InboundMessage, NotificationKind, SendOutcome};
    pub use crate::session::{ConnectionState, DisconnectReason, SessionStatus};
    pub use crate::storage::{CredentialStore, Credentials};
    pub use crate::types::{AccountId, Address, MessageId, Timestamp};
}
