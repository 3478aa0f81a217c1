//! Outbound message dispatch
//!
//! Turns a destination and a text body into one delivery attempt and folds
//! every way that attempt can go wrong into a [`SendOutcome`].

use tracing::{debug, instrument, warn};

use parley_core::{Address, OutboundRequest, SendOutcome};

use crate::config::DispatchConfig;
use crate::session_manager::SessionHandle;

/// Stateless facade over an open session
#[derive(Clone, Debug, Default)]
pub struct MessageDispatcher {
    config: DispatchConfig,
}

impl MessageDispatcher {
    /// Create a dispatcher
    pub fn new(config: DispatchConfig) -> Self {
        Self { config }
    }

    /// Normalize a raw destination against the configured domain
    pub fn address(&self, destination: &str) -> Address {
        Address::parse(destination, &self.config.user_domain)
    }

    /// Send a text message.
    ///
    /// Issues exactly one deliverability lookup, against the bare address,
    /// and at most one send, against the qualified address. Never fails;
    /// every error is reported through the returned outcome.
    #[instrument(skip(self, session, body), fields(generation = session.generation()))]
    pub async fn send(
        &self,
        session: &SessionHandle,
        destination: &str,
        body: &str,
    ) -> SendOutcome {
        let address = self.address(destination);
        let transport = session.transport();

        // The lookup API expects the bare form; the qualified one yields false negatives
        let registration = match transport.lookup(address.bare()).await {
            Ok(registration) => registration,
            Err(e) => {
                warn!("Lookup for {} failed: {}", address.bare(), e);
                return SendOutcome::failed(e.to_string());
            }
        };

        if !registration.map_or(false, |r| r.exists) {
            debug!("Destination {} is not registered", address.bare());
            return SendOutcome::failed(self.config.not_registered_error.clone());
        }

        match transport.send_text(address.qualified(), body).await {
            Ok(sent) => {
                debug!("Sent message {} to {}", sent.id, address);
                SendOutcome::sent(sent.id, sent.timestamp)
            }
            Err(e) => {
                warn!("Send to {} failed: {}", address, e);
                SendOutcome::failed(e.to_string())
            }
        }
    }

    /// Send an [`OutboundRequest`]
    pub async fn send_request(
        &self,
        session: &SessionHandle,
        request: &OutboundRequest,
    ) -> SendOutcome {
        self.send(session, &request.destination, &request.body).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::TransportError;
    use crate::transport::memory::{MemoryNetwork, MemoryTransportFactory};
    use crate::transport::{SentMessage, TransportFactory};
    use crate::config::TransportOptions;
    use parley_core::{Credentials, MessageId, Timestamp};
    use std::sync::Arc;

    async fn session(network: &Arc<MemoryNetwork>) -> SessionHandle {
        let options = TransportOptions {
            emit_own_events: false,
            ..Default::default()
        };
        let conn = MemoryTransportFactory::new(network.clone())
            .connect(&options, Credentials::empty())
            .await
            .unwrap();
        SessionHandle::new(conn.transport)
    }

    #[tokio::test]
    async fn test_send_to_registered() {
        let network = MemoryNetwork::new("me@s.whatsapp.net");
        network.register("79123456789");
        network.script_send(Ok(SentMessage {
            id: MessageId::from("ABC123"),
            timestamp: Timestamp::from_secs(1_700_000_000),
        }));
        let session = session(&network).await;

        let outcome = MessageDispatcher::default()
            .send(&session, "79123456789", "hello")
            .await;

        assert_eq!(
            outcome,
            SendOutcome::sent(MessageId::from("ABC123"), Timestamp::from_secs(1_700_000_000))
        );
        assert_eq!(network.sent()[0].to, "79123456789@s.whatsapp.net");
    }

    #[tokio::test]
    async fn test_send_to_unregistered() {
        let network = MemoryNetwork::new("me@s.whatsapp.net");
        let session = session(&network).await;

        let outcome = MessageDispatcher::default()
            .send(&session, "71111111111", "hello")
            .await;

        assert_eq!(outcome, SendOutcome::failed("destination not registered"));
        assert!(network.sent().is_empty());
        assert_eq!(network.lookups(), vec!["71111111111"]);
    }

    #[tokio::test]
    async fn test_unanswered_lookup_is_not_registered() {
        let network = MemoryNetwork::new("me@s.whatsapp.net");
        network.register("79123456789");
        network.leave_unanswered("79123456789");
        let session = session(&network).await;

        let outcome = MessageDispatcher::default()
            .send(&session, "79123456789", "hello")
            .await;

        assert_eq!(outcome.error(), Some("destination not registered"));
        assert!(network.sent().is_empty());
    }

    #[tokio::test]
    async fn test_send_error_message_verbatim() {
        let network = MemoryNetwork::new("me@s.whatsapp.net");
        network.register("79123456789");
        network.script_send(Err(TransportError::Rejected("rate-overlimit".to_string())));
        let session = session(&network).await;

        let outcome = MessageDispatcher::default()
            .send(&session, "79123456789", "hello")
            .await;

        assert_eq!(outcome, SendOutcome::failed("rate-overlimit"));
    }

    #[tokio::test]
    async fn test_lookup_error_becomes_outcome() {
        let network = MemoryNetwork::new("me@s.whatsapp.net");
        network.fail_lookups(TransportError::Timeout);
        let session = session(&network).await;

        let outcome = MessageDispatcher::default()
            .send(&session, "79123456789", "hello")
            .await;

        assert_eq!(outcome, SendOutcome::failed("Timed Out"));
        assert!(network.sent().is_empty());
    }

    #[tokio::test]
    async fn test_custom_domain() {
        let network = MemoryNetwork::new("me@c.us");
        network.register("4915550");
        let session = session(&network).await;

        let dispatcher = MessageDispatcher::new(DispatchConfig {
            user_domain: "c.us".to_string(),
            ..Default::default()
        });
        let outcome = dispatcher.send(&session, "4915550", "hi").await;

        assert!(outcome.is_success());
        assert_eq!(network.sent()[0].to, "4915550@c.us");
    }
}
