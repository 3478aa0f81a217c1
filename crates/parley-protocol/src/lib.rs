//! # Parley Protocol
//!
//! A session facade over a pluggable messaging transport: pair once, keep
//! one session alive across disconnects, send text messages with a
//! deliverability check, and route live inbound messages to handlers.
//!
//! ## Overview
//!
//! - **Session Management**: Open, observe and reconnect the session
//! - **Credential Persistence**: Save every credential update the transport emits
//! - **Outbound Dispatch**: Lookup-then-send with all errors folded into an outcome
//! - **Inbound Routing**: Ordered, sequential handler dispatch for live batches
//!
//! ## Usage
//!
//! ```ignore
//! use parley_protocol::{Client, Matcher, StaticReply};
//!
//! let client = Client::builder(factory).config(config).build()?;
//! client.router().register("ping", Matcher::exact("/ping"), StaticReply::new("pong"));
//! client.start_session().await?;
//!
//! let outcome = client.send_message("79123456789", "hello").await;
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs, rust_2018_idioms)]

pub mod client;
pub mod clock;
pub mod config;
pub mod dispatcher;
pub mod error;
pub mod handlers;
pub mod pairing;
pub mod router;
pub mod session_manager;
pub mod transport;

pub use client::{Client, ClientBuilder, NOT_STARTED_ERROR};
pub use clock::{RecordingSleeper, Sleeper, TokioSleeper};
pub use config::{
    ClientConfig, CredentialsConfig, DispatchConfig, DispatchPolicy, ReconnectPolicy,
    RoutingConfig, TransportOptions, NOT_REGISTERED_ERROR,
};
pub use dispatcher::MessageDispatcher;
pub use error::{ProtocolError, Result, TransportError};
pub use handlers::{ReplyWith, StaticReply};
pub use pairing::{LogPairingRenderer, PairingRenderer, TerminalQrRenderer};
pub use router::{HandlerContext, InboundRouter, Matcher, MessageHandler, RouteReport};
pub use session_manager::{
    ReconnectDecision, ReconnectTracker, SessionEnd, SessionHandle, SessionManager,
};
pub use transport::{
    Connection, ConnectionUpdate, Registration, SentMessage, Transport, TransportEvent,
    TransportFactory,
};

/// Prelude for convenient imports
pub mod prelude {
    pub use crate::client::Client;
    pub use crate::config::{ClientConfig, DispatchPolicy};
    pub use crate::error::{ProtocolError, Result};
    pub use crate::router::{HandlerContext, Matcher, MessageHandler};
    pub use crate::session_manager::{SessionEnd, SessionHandle};
    pub use crate::transport::{Transport, TransportFactory};
}
