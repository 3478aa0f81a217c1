//! Session lifecycle
//!
//! The [`SessionManager`] owns the single logical session. It opens a
//! transport with stored credentials and drives one event loop that sees
//! every transport event in emission order: connection updates, credential
//! updates and message batches are handled one at a time.
//!
//! A close that is not an explicit logout tears the transport down and
//! starts a fresh one after the reconnect delay. A logout ends the loop.

use parking_lot::{Mutex, RwLock};
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, oneshot, watch};
use tracing::{debug, error, info, instrument, warn};

use parley_core::{
    AccountId, ConnectionState, CredentialStore, Credentials, DisconnectInfo, DisconnectReason,
    SessionStatus,
};

use crate::clock::Sleeper;
use crate::config::{ClientConfig, ReconnectPolicy};
use crate::error::{ProtocolError, Result, TransportError};
use crate::pairing::PairingRenderer;
use crate::router::InboundRouter;
use crate::transport::{ConnectionUpdate, Transport, TransportEvent, TransportFactory};

/// Handle to one transport generation.
///
/// Cheap to clone. A handle keeps pointing at the transport it was created
/// for; after a reconnect, fetch the new one with [`SessionManager::current`].
#[derive(Clone)]
pub struct SessionHandle {
    transport: Arc<dyn Transport>,
    status: Arc<RwLock<SessionStatus>>,
    generation: u64,
}

impl SessionHandle {
    /// Wrap a transport that no manager supervises
    pub fn new(transport: Arc<dyn Transport>) -> Self {
        Self::with_generation(transport, 0, SessionStatus::new())
    }

    fn with_generation(
        transport: Arc<dyn Transport>,
        generation: u64,
        status: SessionStatus,
    ) -> Self {
        Self {
            transport,
            status: Arc::new(RwLock::new(status)),
            generation,
        }
    }

    /// Underlying transport
    pub fn transport(&self) -> &Arc<dyn Transport> {
        &self.transport
    }

    /// Reconnect generation, starting at 1 for managed sessions
    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// Snapshot of this generation's status
    pub fn status(&self) -> SessionStatus {
        self.status.read().clone()
    }

    /// Current connection state
    pub fn state(&self) -> ConnectionState {
        self.status.read().state()
    }

    /// Authenticated account, if open
    pub fn identity(&self) -> Option<AccountId> {
        self.status.read().identity().cloned()
    }

    /// Whether this generation is open
    pub fn is_open(&self) -> bool {
        self.status.read().is_open()
    }

    fn update(&self, f: impl FnOnce(&mut SessionStatus)) -> SessionStatus {
        let mut status = self.status.write();
        f(&mut status);
        status.clone()
    }
}

impl fmt::Debug for SessionHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SessionHandle")
            .field("generation", &self.generation)
            .field("status", &*self.status.read())
            .finish()
    }
}

/// Why the event loop stopped
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum SessionEnd {
    /// The account was deauthorized; re-pairing is required
    LoggedOut,
    /// Reconnect gave up after this many consecutive attempts
    RetriesExhausted {
        /// Attempts made
        attempts: u32,
    },
    /// Local shutdown
    Shutdown,
    /// The event loop panicked
    Aborted,
}

impl fmt::Display for SessionEnd {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::LoggedOut => write!(f, "logged out"),
            Self::RetriesExhausted { attempts } => {
                write!(f, "gave up after {} reconnect attempts", attempts)
            }
            Self::Shutdown => write!(f, "shut down"),
            Self::Aborted => write!(f, "aborted"),
        }
    }
}

/// Decision for the next reconnect
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ReconnectDecision {
    /// Wait `delay`, then make attempt number `attempt` (1-based)
    Retry {
        /// Attempt number
        attempt: u32,
        /// Delay before connecting
        delay: Duration,
    },
    /// Stop reconnecting
    GiveUp {
        /// Attempts made
        attempts: u32,
    },
}

/// Counts consecutive reconnect attempts against a [`ReconnectPolicy`]
#[derive(Clone, Debug)]
pub struct ReconnectTracker {
    policy: ReconnectPolicy,
    attempts: u32,
}

impl ReconnectTracker {
    /// Create a tracker
    pub fn new(policy: ReconnectPolicy) -> Self {
        Self { policy, attempts: 0 }
    }

    /// Attempts since the last successful open
    pub fn attempts(&self) -> u32 {
        self.attempts
    }

    /// Decide the next step and count it
    pub fn next_attempt(&mut self) -> ReconnectDecision {
        if !self.policy.allows(self.attempts) {
            return ReconnectDecision::GiveUp { attempts: self.attempts };
        }
        let delay = self.policy.delay_for_attempt(self.attempts);
        self.attempts += 1;
        ReconnectDecision::Retry {
            attempt: self.attempts,
            delay,
        }
    }

    /// The session opened
    pub fn reset(&mut self) {
        self.attempts = 0;
    }
}

/// Owns and supervises the session
pub struct SessionManager {
    inner: Arc<Inner>,
}

struct Inner {
    config: ClientConfig,
    factory: Arc<dyn TransportFactory>,
    store: Arc<dyn CredentialStore>,
    renderer: Arc<dyn PairingRenderer>,
    sleeper: Arc<dyn Sleeper>,
    router: Arc<InboundRouter>,
    current: RwLock<Option<SessionHandle>>,
    generation: AtomicU64,
    started: Mutex<bool>,
    status_tx: watch::Sender<SessionStatus>,
    shutdown_tx: watch::Sender<bool>,
    end_tx: watch::Sender<Option<SessionEnd>>,
    // Held across every credential write and clear
    persist_lock: tokio::sync::Mutex<()>,
}

impl SessionManager {
    /// Create a manager; nothing connects until [`start`](Self::start)
    pub fn new(
        config: ClientConfig,
        factory: Arc<dyn TransportFactory>,
        store: Arc<dyn CredentialStore>,
        renderer: Arc<dyn PairingRenderer>,
        sleeper: Arc<dyn Sleeper>,
        router: Arc<InboundRouter>,
    ) -> Self {
        let (status_tx, _) = watch::channel(SessionStatus::new());
        let (shutdown_tx, _) = watch::channel(false);
        let (end_tx, _) = watch::channel(None);

        Self {
            inner: Arc::new(Inner {
                config,
                factory,
                store,
                renderer,
                sleeper,
                router,
                current: RwLock::new(None),
                generation: AtomicU64::new(0),
                started: Mutex::new(false),
                status_tx,
                shutdown_tx,
                end_tx,
                persist_lock: tokio::sync::Mutex::new(()),
            }),
        }
    }

    /// Open the transport and start the event loop.
    ///
    /// Returns as soon as the transport exists; the session opens
    /// asynchronously. Fails if credentials cannot be loaded or the first
    /// transport cannot be constructed; later construction failures count
    /// as reconnect attempts instead.
    #[instrument(skip(self))]
    pub async fn start(&self) -> Result<SessionHandle> {
        {
            let mut started = self.inner.started.lock();
            if *started {
                return Err(ProtocolError::AlreadyStarted);
            }
            *started = true;
        }

        let (handle, events) = match self.inner.connect().await {
            Ok(pair) => pair,
            Err(e) => {
                *self.inner.started.lock() = false;
                return Err(e);
            }
        };

        let inner = self.inner.clone();
        let first = handle.clone();
        tokio::spawn(async move {
            let run = tokio::spawn(inner.clone().run(first, events));
            let end = match run.await {
                Ok(end) => end,
                Err(e) => {
                    error!("Session event loop failed: {}", e);
                    SessionEnd::Aborted
                }
            };
            info!("Session ended: {}", end);
            inner.end_tx.send_replace(Some(end));
        });

        Ok(handle)
    }

    /// Handle for the current transport generation
    pub fn current(&self) -> Option<SessionHandle> {
        self.inner.current.read().clone()
    }

    /// Latest status
    pub fn status(&self) -> SessionStatus {
        self.inner.status_tx.borrow().clone()
    }

    /// Watch status changes
    pub fn subscribe(&self) -> watch::Receiver<SessionStatus> {
        self.inner.status_tx.subscribe()
    }

    /// Why the loop stopped, if it has
    pub fn end(&self) -> Option<SessionEnd> {
        self.inner.end_tx.borrow().clone()
    }

    /// Wait for the event loop to stop.
    ///
    /// Returns `None` if the session was never started.
    pub async fn wait(&self) -> Option<SessionEnd> {
        if !*self.inner.started.lock() {
            return None;
        }
        let mut rx = self.inner.end_tx.subscribe();
        let end = match rx.wait_for(Option::is_some).await {
            Ok(end) => end.clone(),
            Err(_) => None,
        };
        end
    }

    /// Stop the event loop and close the transport.
    ///
    /// An in-flight credential write completes first.
    #[instrument(skip(self))]
    pub async fn shutdown(&self) -> Option<SessionEnd> {
        info!("Shutting down session");
        self.inner.shutdown_tx.send_replace(true);
        let end = self.wait().await;
        // Nothing may be writing once we return
        let _guard = self.inner.persist_lock.lock().await;
        end
    }
}

impl Inner {
    /// Load credentials and construct a new transport generation
    async fn connect(&self) -> Result<(SessionHandle, mpsc::Receiver<TransportEvent>)> {
        let credentials = match self.store.load().await? {
            Some(credentials) => credentials,
            None => {
                info!("No stored credentials; pairing required");
                Credentials::empty()
            }
        };

        let timeout = self.config.transport.connect_timeout();
        let connection = tokio::time::timeout(
            timeout,
            self.factory.connect(&self.config.transport, credentials),
        )
        .await
        .map_err(|_| {
            warn!("Transport not constructed within {:?}", timeout);
            TransportError::Timeout
        })??;

        let generation = self.generation.fetch_add(1, Ordering::SeqCst) + 1;
        let mut status = self.status_tx.borrow().clone();
        status.mark_connecting();

        let handle =
            SessionHandle::with_generation(connection.transport, generation, status.clone());
        *self.current.write() = Some(handle.clone());
        self.status_tx.send_replace(status);

        debug!("Transport generation {} constructed", generation);
        Ok((handle, connection.events))
    }

    async fn run(
        self: Arc<Self>,
        mut handle: SessionHandle,
        mut events: mpsc::Receiver<TransportEvent>,
    ) -> SessionEnd {
        let mut shutdown = self.shutdown_tx.subscribe();
        let mut tracker = ReconnectTracker::new(self.config.reconnect.clone());

        loop {
            let event = tokio::select! {
                biased;
                _ = stopped(&mut shutdown) => {
                    self.close(&handle, DisconnectInfo::new(
                        DisconnectReason::ConnectionClosed,
                        Some("shutdown".to_string()),
                    )).await;
                    return SessionEnd::Shutdown;
                }
                event = events.recv() => event,
            };

            let closed = match event {
                Some(TransportEvent::Connection(update)) => {
                    self.on_connection_update(&handle, update, &mut tracker)
                }
                Some(TransportEvent::Credentials { credentials, ack }) => {
                    self.on_credentials(credentials, ack).await;
                    None
                }
                Some(TransportEvent::Messages(batch)) => {
                    let report = self.router.route(&handle, &batch).await;
                    debug!(?report, "Batch routed");
                    None
                }
                None => {
                    warn!("Event stream ended without a close event");
                    let info = DisconnectInfo::new(
                        DisconnectReason::ConnectionLost,
                        Some("event stream ended".to_string()),
                    );
                    self.publish(handle.update(|s| s.mark_closed(info.clone())));
                    Some(info)
                }
            };

            let Some(info) = closed else { continue };

            handle.transport().close().await;

            if info.reason.is_logged_out() {
                self.on_logged_out().await;
                return SessionEnd::LoggedOut;
            }

            match self.reconnect(&mut tracker, &mut shutdown).await {
                Ok((next, next_events)) => {
                    handle = next;
                    events = next_events;
                }
                Err(end) => return end,
            }
        }
    }

    /// Apply a connection update; returns the disconnect on close
    fn on_connection_update(
        &self,
        handle: &SessionHandle,
        update: ConnectionUpdate,
        tracker: &mut ReconnectTracker,
    ) -> Option<DisconnectInfo> {
        if let Some(qr) = update.qr.as_deref() {
            self.renderer.render(qr);
        }

        match update.state? {
            ConnectionState::Connecting => {
                self.publish(handle.update(|s| s.mark_connecting()));
                None
            }
            ConnectionState::Open => {
                let Some(identity) = update.account else {
                    warn!("Open update without an account; ignoring");
                    return None;
                };
                info!("Session open as {}", identity);
                tracker.reset();
                self.publish(handle.update(|s| s.mark_open(identity)));
                None
            }
            ConnectionState::Closed => {
                // No reason reported: treat as recoverable
                let info = update.disconnect.unwrap_or_else(|| {
                    DisconnectInfo::new(DisconnectReason::ConnectionClosed, None)
                });
                warn!(
                    "Connection closed: {}{}",
                    info.reason,
                    info.message.as_deref().map(|m| format!(" ({})", m)).unwrap_or_default()
                );
                self.publish(handle.update(|s| s.mark_closed(info.clone())));
                Some(info)
            }
        }
    }

    async fn on_credentials(&self, credentials: Credentials, ack: Option<oneshot::Sender<()>>) {
        let _guard = self.persist_lock.lock().await;
        match self.store.save(&credentials).await {
            Ok(()) => {
                debug!("Persisted {:?}", credentials);
                if let Some(ack) = ack {
                    let _ = ack.send(());
                }
            }
            Err(e) => error!("Failed to persist credentials: {}", e),
        }
    }

    async fn on_logged_out(&self) {
        warn!("Logged out; not reconnecting");
        if !self.config.credentials.clear_on_logout {
            return;
        }
        let _guard = self.persist_lock.lock().await;
        if let Err(e) = self.store.clear().await {
            error!("Failed to clear credentials: {}", e);
        }
    }

    async fn reconnect(
        &self,
        tracker: &mut ReconnectTracker,
        shutdown: &mut watch::Receiver<bool>,
    ) -> std::result::Result<(SessionHandle, mpsc::Receiver<TransportEvent>), SessionEnd> {
        loop {
            let (attempt, delay) = match tracker.next_attempt() {
                ReconnectDecision::Retry { attempt, delay } => (attempt, delay),
                ReconnectDecision::GiveUp { attempts } => {
                    error!("Giving up after {} reconnect attempts", attempts);
                    return Err(SessionEnd::RetriesExhausted { attempts });
                }
            };

            info!("Reconnecting in {:?} (attempt {})", delay, attempt);
            tokio::select! {
                biased;
                _ = stopped(shutdown) => return Err(SessionEnd::Shutdown),
                _ = self.sleeper.sleep(delay) => {}
            }

            match self.connect().await {
                Ok(pair) => return Ok(pair),
                Err(e) => warn!("Reconnect attempt {} failed: {}", attempt, e),
            }
        }
    }

    async fn close(&self, handle: &SessionHandle, info: DisconnectInfo) {
        handle.transport().close().await;
        self.publish(handle.update(|s| s.mark_closed(info)));
    }

    fn publish(&self, status: SessionStatus) {
        self.status_tx.send_replace(status);
    }
}

/// Resolves once shutdown is requested
async fn stopped(rx: &mut watch::Receiver<bool>) {
    let _ = rx.wait_for(|stop| *stop).await;
}
