//! Credential storage
//!
//! The transport owns the format of its authentication material; parley only
//! persists it as an opaque blob and hands it back on the next start.

use async_trait::async_trait;
use std::fmt;
use std::path::{Path, PathBuf};
use tokio::io::AsyncWriteExt;
use tracing::debug;

use crate::error::Result;

/// File name of the credential blob inside the credential directory
pub const CREDENTIALS_FILE: &str = "creds.json";

/// Persisted authentication material for one account
#[derive(Clone, Default, PartialEq, Eq)]
pub struct Credentials(Vec<u8>);

impl Credentials {
    /// Empty credentials, used before first pairing
    pub fn empty() -> Self {
        Self(Vec::new())
    }

    /// Wrap an opaque blob
    pub fn from_bytes(bytes: impl Into<Vec<u8>>) -> Self {
        Self(bytes.into())
    }

    /// Raw blob
    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    /// Whether no material has been stored yet
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Credentials({} bytes)", self.0.len())
    }
}

/// Storage for credentials
#[async_trait]
pub trait CredentialStore: Send + Sync {
    /// Load stored credentials
    async fn load(&self) -> Result<Option<Credentials>>;

    /// Overwrite stored credentials
    async fn save(&self, credentials: &Credentials) -> Result<()>;

    /// Discard stored credentials
    async fn clear(&self) -> Result<()>;
}

/// Credential store backed by a single file in a private directory
#[derive(Clone, Debug)]
pub struct FileCredentialStore {
    dir: PathBuf,
}

impl FileCredentialStore {
    /// Create a store rooted at `dir`
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    /// Credential directory
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Path of the credential blob
    pub fn path(&self) -> PathBuf {
        self.dir.join(CREDENTIALS_FILE)
    }

    async fn ensure_dir(&self) -> Result<()> {
        tokio::fs::create_dir_all(&self.dir).await?;

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            let perms = std::fs::Permissions::from_mode(0o700);
            tokio::fs::set_permissions(&self.dir, perms).await?;
        }

        Ok(())
    }

    /// Flush directory entries so a rename or removal survives power loss
    async fn sync_dir(&self) -> Result<()> {
        #[cfg(unix)]
        tokio::fs::File::open(&self.dir).await?.sync_all().await?;
        Ok(())
    }
}

#[async_trait]
impl CredentialStore for FileCredentialStore {
    async fn load(&self) -> Result<Option<Credentials>> {
        match tokio::fs::read(self.path()).await {
            Ok(bytes) => Ok(Some(Credentials::from_bytes(bytes))),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    async fn save(&self, credentials: &Credentials) -> Result<()> {
        self.ensure_dir().await?;

        // Synced before the rename so a crash never leaves a torn blob
        let path = self.path();
        let tmp = path.with_extension("json.tmp");
        let mut file = tokio::fs::File::create(&tmp).await?;
        file.write_all(credentials.as_bytes()).await?;
        file.sync_all().await?;
        drop(file);

        tokio::fs::rename(&tmp, &path).await?;
        self.sync_dir().await?;

        debug!("Saved credentials to {}", path.display());
        Ok(())
    }

    async fn clear(&self) -> Result<()> {
        match tokio::fs::remove_file(self.path()).await {
            Ok(()) => self.sync_dir().await,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}

/// In-memory storage for testing
pub mod memory {
    use super::*;
    use parking_lot::RwLock;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    /// In-memory credential store
    #[derive(Default)]
    pub struct MemoryCredentialStore {
        credentials: RwLock<Option<Credentials>>,
        saves: AtomicUsize,
    }

    impl MemoryCredentialStore {
        /// Create an empty store
        pub fn new() -> Arc<Self> {
            Arc::new(Self::default())
        }

        /// Create a store holding `credentials`
        pub fn with_credentials(credentials: Credentials) -> Arc<Self> {
            Arc::new(Self {
                credentials: RwLock::new(Some(credentials)),
                saves: AtomicUsize::new(0),
            })
        }

        /// Currently stored credentials
        pub fn current(&self) -> Option<Credentials> {
            self.credentials.read().clone()
        }

        /// Number of completed saves
        pub fn save_count(&self) -> usize {
            self.saves.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl CredentialStore for MemoryCredentialStore {
        async fn load(&self) -> Result<Option<Credentials>> {
            Ok(self.credentials.read().clone())
        }

        async fn save(&self, credentials: &Credentials) -> Result<()> {
            *self.credentials.write() = Some(credentials.clone());
            self.saves.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }

        async fn clear(&self) -> Result<()> {
            *self.credentials.write() = None;
            Ok(())
        }
    }
}
