//! In-memory transport for testing and simulation
//!
//! A [`MemoryNetwork`] stands in for the messaging network: it knows which
//! accounts are registered, records every lookup and send, and lets the
//! caller push events into whichever transport is currently connected.

use async_trait::async_trait;
use parking_lot::{Mutex, RwLock};
use std::collections::{HashSet, VecDeque};
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::debug;

use parley_core::{
    AccountId, Credentials, DisconnectInfo, DisconnectReason, InboundBatch, InboundMessage,
    MessageId, Timestamp, DEFAULT_USER_DOMAIN,
};

use super::{
    Connection, ConnectionUpdate, Registration, SentMessage, Transport, TransportEvent,
    TransportFactory,
};
use crate::config::TransportOptions;
use crate::error::TransportError;

const EVENT_BUFFER: usize = 64;

/// A message accepted by the network
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SentRecord {
    /// Qualified destination
    pub to: String,
    /// Message body
    pub body: String,
    /// Assigned message ID
    pub id: MessageId,
    /// Assigned timestamp
    pub timestamp: Timestamp,
}

/// Simulated messaging network
pub struct MemoryNetwork {
    account: AccountId,
    auto_open: AtomicBool,
    registered: RwLock<HashSet<String>>,
    unanswered: RwLock<HashSet<String>>,
    lookups: RwLock<Vec<String>>,
    sent: RwLock<Vec<SentRecord>>,
    scripted_sends: Mutex<VecDeque<Result<SentMessage, TransportError>>>,
    lookup_failure: RwLock<Option<TransportError>>,
    connect_failures: AtomicU32,
    connects: AtomicUsize,
    generation: AtomicU64,
    current: RwLock<Option<(u64, mpsc::Sender<TransportEvent>)>>,
}

impl MemoryNetwork {
    /// Create a network where our account is `account`
    pub fn new(account: impl Into<String>) -> Arc<Self> {
        Arc::new(Self {
            account: AccountId::from_string(account),
            auto_open: AtomicBool::new(true),
            registered: RwLock::new(HashSet::new()),
            unanswered: RwLock::new(HashSet::new()),
            lookups: RwLock::new(Vec::new()),
            sent: RwLock::new(Vec::new()),
            scripted_sends: Mutex::new(VecDeque::new()),
            lookup_failure: RwLock::new(None),
            connect_failures: AtomicU32::new(0),
            connects: AtomicUsize::new(0),
            generation: AtomicU64::new(0),
            current: RwLock::new(None),
        })
    }

    /// Our account
    pub fn account(&self) -> &AccountId {
        &self.account
    }

    /// Whether new connections open on their own
    pub fn set_auto_open(&self, auto_open: bool) {
        self.auto_open.store(auto_open, Ordering::SeqCst);
    }

    /// Register a bare address as an existing account
    pub fn register(&self, bare: impl Into<String>) {
        self.registered.write().insert(bare.into());
    }

    /// Make lookups for `bare` return no result at all
    pub fn leave_unanswered(&self, bare: impl Into<String>) {
        self.unanswered.write().insert(bare.into());
    }

    /// Fail every lookup with `error`
    pub fn fail_lookups(&self, error: TransportError) {
        *self.lookup_failure.write() = Some(error);
    }

    /// Queue the result of the next send
    pub fn script_send(&self, result: Result<SentMessage, TransportError>) {
        self.scripted_sends.lock().push_back(result);
    }

    /// Fail the next `count` connection attempts
    pub fn fail_next_connects(&self, count: u32) {
        self.connect_failures.store(count, Ordering::SeqCst);
    }

    /// Addresses passed to lookup, in order
    pub fn lookups(&self) -> Vec<String> {
        self.lookups.read().clone()
    }

    /// Messages accepted, in order
    pub fn sent(&self) -> Vec<SentRecord> {
        self.sent.read().clone()
    }

    /// Number of connection attempts, failed ones included
    pub fn connect_count(&self) -> usize {
        self.connects.load(Ordering::SeqCst)
    }

    /// Whether a transport is currently connected
    pub fn is_connected(&self) -> bool {
        self.current.read().is_some()
    }

    /// Push an event into the connected transport.
    ///
    /// Returns false when nothing is connected.
    pub async fn emit(&self, event: TransportEvent) -> bool {
        let sender = self.current.read().as_ref().map(|(_, tx)| tx.clone());
        match sender {
            Some(tx) => tx.send(event).await.is_ok(),
            None => false,
        }
    }

    /// Deliver a live batch
    pub async fn deliver(&self, messages: Vec<InboundMessage>) -> bool {
        self.emit(TransportEvent::Messages(InboundBatch::notify(messages))).await
    }

    /// Deliver a backlog batch
    pub async fn replay(&self, messages: Vec<InboundMessage>) -> bool {
        self.emit(TransportEvent::Messages(InboundBatch::append(messages))).await
    }

    /// Close the connected transport with `reason`
    pub async fn disconnect(&self, reason: DisconnectReason) -> bool {
        let generation = self.current.read().as_ref().map(|(g, _)| *g);
        let info = DisconnectInfo::new(reason, Some(format!("simulated {}", reason)));
        let delivered = self
            .emit(TransportEvent::Connection(ConnectionUpdate::closed(info)))
            .await;
        // The session may already have reconnected; leave that one alone
        if let Some(generation) = generation {
            self.detach(generation);
        }
        delivered
    }

    /// Drop the connected transport's event stream without a close event
    pub fn sever(&self) -> bool {
        self.current.write().take().is_some()
    }

    fn detach(&self, generation: u64) {
        let mut current = self.current.write();
        if matches!(current.as_ref(), Some((g, _)) if *g == generation) {
            *current = None;
        }
    }

    fn echo(&self, generation: u64, message: InboundMessage) {
        let current = self.current.read();
        if let Some((g, tx)) = current.as_ref() {
            if *g == generation {
                // Best effort; a full buffer drops the echo
                let _ = tx.try_send(TransportEvent::Messages(InboundBatch::notify(vec![message])));
            }
        }
    }

    fn pairing_credentials(&self) -> Credentials {
        Credentials::from_bytes(format!("{{\"me\":{{\"id\":\"{}\"}}}}", self.account).into_bytes())
    }
}

/// Factory that connects to a [`MemoryNetwork`]
#[derive(Clone)]
pub struct MemoryTransportFactory {
    network: Arc<MemoryNetwork>,
}

impl MemoryTransportFactory {
    /// Create a factory for `network`
    pub fn new(network: Arc<MemoryNetwork>) -> Self {
        Self { network }
    }
}

#[async_trait]
impl TransportFactory for MemoryTransportFactory {
    async fn connect(
        &self,
        options: &TransportOptions,
        credentials: Credentials,
    ) -> Result<Connection, TransportError> {
        let network = &self.network;
        network.connects.fetch_add(1, Ordering::SeqCst);

        let failing = network
            .connect_failures
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if failing {
            return Err(TransportError::Connect("simulated connect failure".to_string()));
        }

        let generation = network.generation.fetch_add(1, Ordering::SeqCst) + 1;
        let (tx, rx) = mpsc::channel(EVENT_BUFFER);

        if network.auto_open.load(Ordering::SeqCst) {
            if credentials.is_empty() {
                // Unpaired: challenge, then fresh credentials
                let _ = tx.try_send(TransportEvent::Connection(ConnectionUpdate::qr(format!(
                    "2@{},{}",
                    uuid::Uuid::new_v4().simple(),
                    network.account
                ))));
                let _ = tx.try_send(TransportEvent::Credentials {
                    credentials: network.pairing_credentials(),
                    ack: None,
                });
            }
            let _ = tx.try_send(TransportEvent::Connection(ConnectionUpdate::open(
                network.account.clone(),
            )));
        }

        *network.current.write() = Some((generation, tx));
        debug!("Memory transport {} connected", generation);

        Ok(Connection {
            transport: Arc::new(MemoryTransport {
                network: network.clone(),
                generation,
                emit_own_events: options.emit_own_events,
                closed: AtomicBool::new(false),
            }),
            events: rx,
        })
    }
}

/// Transport handle onto a [`MemoryNetwork`]
pub struct MemoryTransport {
    network: Arc<MemoryNetwork>,
    generation: u64,
    emit_own_events: bool,
    closed: AtomicBool,
}

#[async_trait]
impl Transport for MemoryTransport {
    async fn lookup(&self, bare: &str) -> Result<Option<Registration>, TransportError> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(TransportError::ConnectionClosed);
        }

        self.network.lookups.write().push(bare.to_string());

        if let Some(error) = self.network.lookup_failure.read().clone() {
            return Err(error);
        }
        if self.network.unanswered.read().contains(bare) {
            return Ok(None);
        }

        let exists = self.network.registered.read().contains(bare);
        Ok(Some(Registration {
            exists,
            address: exists.then(|| format!("{}@{}", bare, DEFAULT_USER_DOMAIN)),
        }))
    }

    async fn send_text(&self, qualified: &str, body: &str) -> Result<SentMessage, TransportError> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(TransportError::ConnectionClosed);
        }

        let scripted = self.network.scripted_sends.lock().pop_front();
        let sent = match scripted {
            Some(result) => result?,
            None => SentMessage {
                id: MessageId::from_string(format!(
                    "3EB0{}",
                    &uuid::Uuid::new_v4().simple().to_string()[..16].to_uppercase()
                )),
                timestamp: Timestamp::now(),
            },
        };

        self.network.sent.write().push(SentRecord {
            to: qualified.to_string(),
            body: body.to_string(),
            id: sent.id.clone(),
            timestamp: sent.timestamp,
        });

        if self.emit_own_events {
            let mut echo = InboundMessage::text(qualified, body).from_self();
            echo.id = Some(sent.id.clone());
            echo.timestamp = sent.timestamp;
            self.network.echo(self.generation, echo);
        }

        Ok(sent)
    }

    async fn close(&self) {
        self.closed.store(true, Ordering::SeqCst);
        self.network.detach(self.generation);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_lookup_and_send() {
        let network = MemoryNetwork::new("79000000000@s.whatsapp.net");
        network.register("79123456789");
        let factory = MemoryTransportFactory::new(network.clone());

        let options = TransportOptions {
            emit_own_events: false,
            ..Default::default()
        };
        let conn = factory.connect(&options, Credentials::empty()).await.unwrap();

        let found = conn.transport.lookup("79123456789").await.unwrap().unwrap();
        assert!(found.exists);
        let missing = conn.transport.lookup("71111111111").await.unwrap().unwrap();
        assert!(!missing.exists);

        conn.transport
            .send_text("79123456789@s.whatsapp.net", "hi")
            .await
            .unwrap();
        assert_eq!(network.sent().len(), 1);
        assert_eq!(network.lookups(), vec!["79123456789", "71111111111"]);
    }

    #[tokio::test]
    async fn test_unpaired_connect_emits_pairing() {
        let network = MemoryNetwork::new("me@s.whatsapp.net");
        let factory = MemoryTransportFactory::new(network);

        let mut conn = factory
            .connect(&TransportOptions::default(), Credentials::empty())
            .await
            .unwrap();

        assert!(matches!(
            conn.events.recv().await,
            Some(TransportEvent::Connection(ConnectionUpdate { qr: Some(_), .. }))
        ));
        assert!(matches!(conn.events.recv().await, Some(TransportEvent::Credentials { .. })));
        assert!(matches!(
            conn.events.recv().await,
            Some(TransportEvent::Connection(ConnectionUpdate { account: Some(_), .. }))
        ));
    }

    #[tokio::test]
    async fn test_connect_failures() {
        let network = MemoryNetwork::new("me");
        network.fail_next_connects(1);
        let factory = MemoryTransportFactory::new(network.clone());

        assert!(factory
            .connect(&TransportOptions::default(), Credentials::empty())
            .await
            .is_err());
        assert!(factory
            .connect(&TransportOptions::default(), Credentials::empty())
            .await
            .is_ok());
        assert_eq!(network.connect_count(), 2);
    }

    #[tokio::test]
    async fn test_closed_transport_rejects() {
        let network = MemoryNetwork::new("me");
        let factory = MemoryTransportFactory::new(network.clone());
        let conn = factory
            .connect(&TransportOptions::default(), Credentials::empty())
            .await
            .unwrap();

        conn.transport.close().await;
        assert!(!network.is_connected());
        assert_eq!(
            conn.transport.send_text("x@s.whatsapp.net", "hi").await,
            Err(TransportError::ConnectionClosed)
        );
    }
}
