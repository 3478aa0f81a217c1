//! Client facade - main entry point
//!
//! [`Client`] wires a transport factory, a credential store and a handler
//! router into one [`SessionManager`], and exposes the outbound send
//! operation against whichever transport generation is current.

use std::sync::Arc;
use tokio::sync::watch;
use tracing::{info, instrument};

use parley_core::{CredentialStore, FileCredentialStore, SendOutcome, SessionStatus};

use crate::clock::{Sleeper, TokioSleeper};
use crate::config::ClientConfig;
use crate::dispatcher::MessageDispatcher;
use crate::error::{ProtocolError, Result};
use crate::pairing::{PairingRenderer, TerminalQrRenderer};
use crate::router::InboundRouter;
use crate::session_manager::{SessionEnd, SessionHandle, SessionManager};
use crate::transport::TransportFactory;

/// Error text reported when sending before [`Client::start_session`]
pub const NOT_STARTED_ERROR: &str = "session not started";

/// Builder for [`Client`]
pub struct ClientBuilder {
    config: ClientConfig,
    factory: Arc<dyn TransportFactory>,
    store: Option<Arc<dyn CredentialStore>>,
    renderer: Arc<dyn PairingRenderer>,
    sleeper: Arc<dyn Sleeper>,
}

impl ClientBuilder {
    /// Start building a client over `factory`
    pub fn new(factory: Arc<dyn TransportFactory>) -> Self {
        Self {
            config: ClientConfig::default(),
            factory,
            store: None,
            renderer: Arc::new(TerminalQrRenderer),
            sleeper: Arc::new(TokioSleeper),
        }
    }

    /// Use `config`
    pub fn config(mut self, config: ClientConfig) -> Self {
        self.config = config;
        self
    }

    /// Persist credentials in `store` instead of the configured directory
    pub fn credential_store(mut self, store: Arc<dyn CredentialStore>) -> Self {
        self.store = Some(store);
        self
    }

    /// Render pairing challenges with `renderer`
    pub fn pairing_renderer(mut self, renderer: Arc<dyn PairingRenderer>) -> Self {
        self.renderer = renderer;
        self
    }

    /// Wait out reconnect delays with `sleeper`
    pub fn sleeper(mut self, sleeper: Arc<dyn Sleeper>) -> Self {
        self.sleeper = sleeper;
        self
    }

    /// Validate the configuration and build
    pub fn build(self) -> Result<Client> {
        self.config.validate().map_err(ProtocolError::Configuration)?;

        let store: Arc<dyn CredentialStore> = match self.store {
            Some(store) => store,
            None => Arc::new(FileCredentialStore::new(&self.config.credentials.dir)),
        };
        let dispatcher = Arc::new(MessageDispatcher::new(self.config.dispatch.clone()));
        let router = Arc::new(InboundRouter::new(dispatcher.clone(), self.config.routing.policy));
        let sessions = SessionManager::new(
            self.config.clone(),
            self.factory,
            store,
            self.renderer,
            self.sleeper,
            router.clone(),
        );

        Ok(Client {
            config: self.config,
            dispatcher,
            router,
            sessions,
        })
    }
}

/// Session facade
pub struct Client {
    config: ClientConfig,
    dispatcher: Arc<MessageDispatcher>,
    router: Arc<InboundRouter>,
    sessions: SessionManager,
}

impl Client {
    /// Start building a client
    pub fn builder(factory: Arc<dyn TransportFactory>) -> ClientBuilder {
        ClientBuilder::new(factory)
    }

    /// Configuration in use
    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    /// Handler registry; register before [`start_session`](Self::start_session) so the
    /// first live batch sees every handler
    pub fn router(&self) -> &InboundRouter {
        &self.router
    }

    /// Outbound dispatcher
    pub fn dispatcher(&self) -> &MessageDispatcher {
        &self.dispatcher
    }

    /// Session manager
    pub fn sessions(&self) -> &SessionManager {
        &self.sessions
    }

    /// Start the session
    #[instrument(skip(self))]
    pub async fn start_session(&self) -> Result<SessionHandle> {
        info!("Starting session");
        self.sessions.start().await
    }

    /// Latest session status
    pub fn status(&self) -> SessionStatus {
        self.sessions.status()
    }

    /// Watch session status
    pub fn subscribe(&self) -> watch::Receiver<SessionStatus> {
        self.sessions.subscribe()
    }

    /// Send `body` to `destination` over the current session.
    ///
    /// Never fails; sending before [`start_session`](Self::start_session) yields a failed
    /// outcome.
    pub async fn send_message(&self, destination: &str, body: &str) -> SendOutcome {
        match self.sessions.current() {
            Some(session) => self.dispatcher.send(&session, destination, body).await,
            None => SendOutcome::failed(NOT_STARTED_ERROR),
        }
    }

    /// Wait for the session to end
    pub async fn wait(&self) -> Option<SessionEnd> {
        self.sessions.wait().await
    }

    /// Stop the session
    pub async fn shutdown(&self) -> Option<SessionEnd> {
        self.sessions.shutdown().await
    }
}
