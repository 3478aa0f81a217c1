//! Shared fixtures for integration tests

#![allow(dead_code)]

use std::sync::Arc;
use std::time::Duration;

use parley_core::storage::memory::MemoryCredentialStore;
use parley_protocol::transport::memory::{MemoryNetwork, MemoryTransportFactory};
use parley_protocol::{Client, ClientConfig, LogPairingRenderer, RecordingSleeper, Sleeper};

pub const ME: &str = "79000000000@s.whatsapp.net";
pub const PEER: &str = "79123456789";

/// A client over a fresh in-memory network
pub struct Harness {
    pub network: Arc<MemoryNetwork>,
    pub store: Arc<MemoryCredentialStore>,
    pub sleeper: Arc<RecordingSleeper>,
    pub client: Client,
}

impl Harness {
    pub fn new(config: ClientConfig) -> Self {
        let network = MemoryNetwork::new(ME);
        network.register(PEER);
        let store = MemoryCredentialStore::new();
        let sleeper = Arc::new(RecordingSleeper::new());
        let client = build(&network, store.clone(), sleeper.clone(), config);
        Self {
            network,
            store,
            sleeper,
            client,
        }
    }

    /// Start and wait for the first open
    pub async fn start(&self) {
        self.client.start_session().await.unwrap();
        eventually(|| self.client.status().is_open()).await;
    }

    /// Wait until generation `generation` is open
    pub async fn wait_generation_open(&self, generation: u64) {
        eventually(|| {
            self.client
                .sessions()
                .current()
                .map_or(false, |s| s.generation() == generation && s.is_open())
        })
        .await;
    }
}

pub fn build(
    network: &Arc<MemoryNetwork>,
    store: Arc<MemoryCredentialStore>,
    sleeper: Arc<dyn Sleeper>,
    config: ClientConfig,
) -> Client {
    Client::builder(Arc::new(MemoryTransportFactory::new(network.clone())))
        .config(config)
        .credential_store(store)
        .pairing_renderer(Arc::new(LogPairingRenderer))
        .sleeper(sleeper)
        .build()
        .unwrap()
}

/// Poll `check` until it holds, failing after five seconds
pub async fn eventually(mut check: impl FnMut() -> bool) {
    tokio::time::timeout(Duration::from_secs(5), async {
        while !check() {
            tokio::time::sleep(Duration::from_millis(2)).await;
        }
    })
    .await
    .expect("condition not reached in time");
}

/// Let spawned tasks drain their queues
pub async fn settle() {
    for _ in 0..50 {
        tokio::task::yield_now().await;
    }
}
