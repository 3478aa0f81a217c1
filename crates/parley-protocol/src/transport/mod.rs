//! Transport collaborator interface
//!
//! The wire protocol and its session crypto live in an external client
//! library. parley only talks to it through the traits below: a factory that
//! opens a socket and hands back an event stream, and a handle for the two
//! queries the dispatcher needs.

use async_trait::async_trait;
use std::sync::Arc;
use tokio::sync::{mpsc, oneshot};

use parley_core::{
    AccountId, ConnectionState, Credentials, DisconnectInfo, InboundBatch, MessageId, Timestamp,
};

use crate::config::TransportOptions;
use crate::error::TransportError;

pub mod memory;

/// Result of a deliverability lookup
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Registration {
    /// Whether the address is a registered account
    pub exists: bool,
    /// Qualified address reported by the network
    pub address: Option<String>,
}

/// Provider acknowledgement of a sent message
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SentMessage {
    /// Provider-assigned message ID
    pub id: MessageId,
    /// Provider send timestamp
    pub timestamp: Timestamp,
}

/// Connection-state change reported by the transport
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ConnectionUpdate {
    /// New state, if it changed
    pub state: Option<ConnectionState>,
    /// Pairing challenge to render, if any
    pub qr: Option<String>,
    /// Resolved account, present on open
    pub account: Option<AccountId>,
    /// Disconnect details, present on close
    pub disconnect: Option<DisconnectInfo>,
}

impl ConnectionUpdate {
    /// Pairing challenge only
    pub fn qr(payload: impl Into<String>) -> Self {
        Self {
            qr: Some(payload.into()),
            ..Default::default()
        }
    }

    /// Transition to open
    pub fn open(account: AccountId) -> Self {
        Self {
            state: Some(ConnectionState::Open),
            account: Some(account),
            ..Default::default()
        }
    }

    /// Transition to closed
    pub fn closed(disconnect: DisconnectInfo) -> Self {
        Self {
            state: Some(ConnectionState::Closed),
            disconnect: Some(disconnect),
            ..Default::default()
        }
    }
}

/// Event emitted by the transport, in emission order
#[derive(Debug)]
pub enum TransportEvent {
    /// Connection-state change
    Connection(ConnectionUpdate),
    /// New credential material to persist.
    ///
    /// `ack` fires once the material is durably stored. If storing fails the
    /// sender is dropped, so the transport must assume it was not saved.
    Credentials {
        /// Material to persist
        credentials: Credentials,
        /// Completion signal
        ack: Option<oneshot::Sender<()>>,
    },
    /// Inbound notification batch
    Messages(InboundBatch),
}

/// Handle to an open transport
#[async_trait]
pub trait Transport: Send + Sync {
    /// Look up whether a bare address is a registered account.
    ///
    /// Returns `None` when the network gave no answer for the address.
    async fn lookup(&self, bare: &str) -> Result<Option<Registration>, TransportError>;

    /// Send a text message to a qualified address
    async fn send_text(&self, qualified: &str, body: &str) -> Result<SentMessage, TransportError>;

    /// Close the socket; further events stop
    async fn close(&self);
}

/// A connected transport and its event stream
pub struct Connection {
    /// Transport handle
    pub transport: Arc<dyn Transport>,
    /// Events, in emission order
    pub events: mpsc::Receiver<TransportEvent>,
}

/// Constructs transports
#[async_trait]
pub trait TransportFactory: Send + Sync {
    /// Open a socket with `options` and `credentials`.
    ///
    /// Returns once the socket object exists, not once it is open.
    async fn connect(
        &self,
        options: &TransportOptions,
        credentials: Credentials,
    ) -> Result<Connection, TransportError>;
}
