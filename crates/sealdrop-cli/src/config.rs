//! CLI configuration file.

use anyhow::{Context, Result};
use sealdrop_files::{DEFAULT_CHUNK_SIZE, MAX_CHUNK_SIZE};
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Configuration loaded from `config.toml`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Addresses
    pub network: NetworkConfig,
    /// Transfer parameters
    pub transfer: TransferConfig,
    /// Key file locations
    pub keys: KeysConfig,
}

/// `[network]` section.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct NetworkConfig {
    /// Address `serve` listens on
    pub listen_addr: String,
    /// Address `send` connects to
    pub connect_addr: String,
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            listen_addr: "0.0.0.0:7878".to_string(),
            connect_addr: "127.0.0.1:7878".to_string(),
        }
    }
}

/// `[transfer]` section.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TransferConfig {
    /// Plaintext bytes per chunk
    pub chunk_size: u32,
    /// Directory received files are written to
    pub output_dir: PathBuf,
    /// Seconds to wait for an acknowledgment; 0 waits forever
    pub ack_timeout_secs: u64,
}

impl Default for TransferConfig {
    fn default() -> Self {
        Self {
            chunk_size: DEFAULT_CHUNK_SIZE,
            output_dir: PathBuf::from("."),
            ack_timeout_secs: 0,
        }
    }
}

impl TransferConfig {
    /// Acknowledgment timeout, `None` when disabled.
    pub fn ack_timeout(&self) -> Option<Duration> {
        (self.ack_timeout_secs > 0).then(|| Duration::from_secs(self.ack_timeout_secs))
    }
}

/// `[keys]` section.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct KeysConfig {
    /// Recipient public key file used by `send`
    pub public_key: PathBuf,
    /// Private key file used by `serve`
    pub private_key: PathBuf,
}

impl Default for KeysConfig {
    fn default() -> Self {
        Self {
            public_key: PathBuf::from("public.key"),
            private_key: PathBuf::from("private.key"),
        }
    }
}

impl Config {
    /// `~/.config/sealdrop/config.toml`
    pub fn default_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("sealdrop")
            .join("config.toml")
    }

    /// Load and parse a configuration file.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {}", path.display()))?;
        let config = toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file {}", path.display()))?;
        Ok(config)
    }

    /// Load from the default path, or fall back to defaults if it does not exist.
    pub fn load_or_default() -> Result<Self> {
        let path = Self::default_path();
        if path.exists() {
            Self::load(&path)
        } else {
            tracing::debug!("No config at {}, using defaults", path.display());
            Ok(Self::default())
        }
    }

    /// Write the configuration, creating parent directories as needed.
    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create {}", parent.display()))?;
        }
        let content = toml::to_string_pretty(self).context("Failed to serialize config")?;
        std::fs::write(path, content)
            .with_context(|| format!("Failed to write config file {}", path.display()))?;
        Ok(())
    }

    /// Check values that would otherwise fail at transfer time.
    pub fn validate(&self) -> Result<()> {
        if self.transfer.chunk_size == 0 || self.transfer.chunk_size > MAX_CHUNK_SIZE {
            anyhow::bail!(
                "transfer.chunk_size must be between 1 and {} (got {})",
                MAX_CHUNK_SIZE,
                self.transfer.chunk_size
            );
        }
        self.network
            .listen_addr
            .parse::<SocketAddr>()
            .with_context(|| format!("Invalid network.listen_addr: {}", self.network.listen_addr))?;
        if self.network.connect_addr.is_empty() {
            anyhow::bail!("network.connect_addr must not be empty");
        }
        Ok(())
    }

    /// Value of a dotted key such as `transfer.chunk_size`.
    ///
    /// The section prefix is optional.
    pub fn get(&self, key: &str) -> Result<String> {
        let value = match key.to_lowercase().as_str() {
            "network.listen_addr" | "listen_addr" => self.network.listen_addr.clone(),
            "network.connect_addr" | "connect_addr" => self.network.connect_addr.clone(),
            "transfer.chunk_size" | "chunk_size" => self.transfer.chunk_size.to_string(),
            "transfer.output_dir" | "output_dir" => self.transfer.output_dir.display().to_string(),
            "transfer.ack_timeout_secs" | "ack_timeout_secs" => {
                self.transfer.ack_timeout_secs.to_string()
            }
            "keys.public_key" | "public_key" => self.keys.public_key.display().to_string(),
            "keys.private_key" | "private_key" => self.keys.private_key.display().to_string(),
            _ => anyhow::bail!("Unknown configuration key: {}", key),
        };
        Ok(value)
    }

    /// Set a dotted key from its string form.
    pub fn set(&mut self, key: &str, value: &str) -> Result<()> {
        match key.to_lowercase().as_str() {
            "network.listen_addr" | "listen_addr" => self.network.listen_addr = value.to_string(),
            "network.connect_addr" | "connect_addr" => {
                self.network.connect_addr = value.to_string();
            }
            "transfer.chunk_size" | "chunk_size" => {
                self.transfer.chunk_size = value
                    .parse()
                    .map_err(|_| anyhow::anyhow!("Invalid number for chunk_size: {}", value))?;
            }
            "transfer.output_dir" | "output_dir" => self.transfer.output_dir = PathBuf::from(value),
            "transfer.ack_timeout_secs" | "ack_timeout_secs" => {
                self.transfer.ack_timeout_secs = value.parse().map_err(|_| {
                    anyhow::anyhow!("Invalid number for ack_timeout_secs: {}", value)
                })?;
            }
            "keys.public_key" | "public_key" => self.keys.public_key = PathBuf::from(value),
            "keys.private_key" | "private_key" => self.keys.private_key = PathBuf::from(value),
            _ => anyhow::bail!("Unknown configuration key: {}", key),
        }
        Ok(())
    }
}
