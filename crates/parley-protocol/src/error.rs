//! Protocol error types

use thiserror::Error;

/// Result type alias
pub type Result<T> = std::result::Result<T, ProtocolError>;

/// Errors raised by the transport collaborator.
///
/// The display text of a transport error is what ends up in a failed
/// send outcome, so variants print their message without a prefix.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum TransportError {
    /// Could not construct or connect the transport
    #[error("{0}")]
    Connect(String),

    /// A query or send timed out
    #[error("Timed Out")]
    Timeout,

    /// The connection is closed
    #[error("Connection Closed")]
    ConnectionClosed,

    /// The network rejected the request
    #[error("{0}")]
    Rejected(String),
}

/// Protocol errors
#[derive(Debug, Error)]
pub enum ProtocolError {
    /// Core error
    #[error("Core error: {0}")]
    Core(#[from] parley_core::Error),

    /// Transport error
    #[error("Transport error: {0}")]
    Transport(#[from] TransportError),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// Session already started
    #[error("Session already started")]
    AlreadyStarted,

    /// Session not started
    #[error("Session not started")]
    NotStarted,
}
