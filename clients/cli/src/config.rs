//! CLI configuration

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use parley_protocol::ClientConfig;

/// CLI configuration
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct CliConfig {
    /// Draw pairing challenges as QR codes instead of logging them
    pub render_qr: bool,
    /// Emit logs as JSON lines
    pub json_logs: bool,
    /// Session client settings
    pub client: ClientConfig,
}

impl Default for CliConfig {
    fn default() -> Self {
        let mut client = ClientConfig::default();
        client.credentials.dir = dirs::data_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("parley")
            .join("auth_info");

        Self {
            render_qr: true,
            json_logs: false,
            client,
        }
    }
}

impl CliConfig {
    /// Default config file location
    pub fn default_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("parley")
            .join("parley.toml")
    }

    /// Load config from file, or the defaults if it does not exist
    pub fn load_or_default(path: &Path) -> anyhow::Result<Self> {
        let config = if path.exists() {
            let content = std::fs::read_to_string(path)?;
            toml::from_str(&content)?
        } else {
            Self::default()
        };

        config.validate()?;
        Ok(config)
    }

    /// Check the embedded client settings
    pub fn validate(&self) -> anyhow::Result<()> {
        self.client
            .validate()
            .map_err(|e| anyhow::anyhow!("invalid configuration: {}", e))
    }

    /// Save config to file
    pub fn save(&self, path: &Path) -> anyhow::Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content = toml::to_string_pretty(self)?;
        std::fs::write(path, content)?;
        Ok(())
    }
}
