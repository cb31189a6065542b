//! Configuration for the rendezvous daemon.
//!
//! Resolution order: environment variables → config file → defaults.
//!
//! Config file location:
//!   1. $RENDEZVOUS_CONFIG (explicit override)
//!   2. $XDG_CONFIG_HOME/rendezvous/config.toml
//!   3. ~/.config/rendezvous/config.toml
//!
//! Only the listening address is configurable. Heartbeat timing is fixed.

use serde::{Deserialize, Serialize};
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::path::PathBuf;

use crate::protocol::DEFAULT_PORT;

/// Top-level configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RendezvousConfig {
    pub network: NetworkConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct NetworkConfig {
    /// Address to bind the WebSocket and status listener on.
    pub bind_addr: IpAddr,
    /// Listening port for both peer sessions and the status surface.
    pub port: u16,
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            bind_addr: IpAddr::V4(Ipv4Addr::UNSPECIFIED),
            port: DEFAULT_PORT,
        }
    }
}

// ── Path helpers ──────────────────────────────────────────────────────────────

fn config_dir() -> PathBuf {
    std::env::var("XDG_CONFIG_HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|_| dirs_or_home().join(".config"))
        .join("rendezvous")
}

fn dirs_or_home() -> PathBuf {
    std::env::var("HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from("/tmp"))
}

// ── Errors ────────────────────────────────────────────────────────────────────

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read {0}: {1}")]
    ReadFailed(PathBuf, std::io::Error),
    #[error("failed to parse {0}: {1}")]
    ParseFailed(PathBuf, toml::de::Error),
    #[error("invalid value {value:?} for {var}")]
    InvalidEnv { var: &'static str, value: String },
}

// ── Loading ───────────────────────────────────────────────────────────────────

impl RendezvousConfig {
    /// Load config: env vars → file → defaults.
    pub fn load() -> Result<Self, ConfigError> {
        let path = Self::file_path();
        let mut config = if path.exists() {
            Self::from_file(&path)?
        } else {
            RendezvousConfig::default()
        };
        config.apply_env_overrides(|var| std::env::var(var).ok())?;
        Ok(config)
    }

    pub fn from_file(path: &std::path::Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path)
            .map_err(|e| ConfigError::ReadFailed(path.to_path_buf(), e))?;
        toml::from_str(&text).map_err(|e| ConfigError::ParseFailed(path.to_path_buf(), e))
    }

    /// Config file path.
    pub fn file_path() -> PathBuf {
        std::env::var("RENDEZVOUS_CONFIG")
            .map(PathBuf::from)
            .unwrap_or_else(|_| config_dir().join("config.toml"))
    }

    /// Socket address the daemon listens on.
    pub fn listen_addr(&self) -> SocketAddr {
        SocketAddr::new(self.network.bind_addr, self.network.port)
    }

    /// Apply RENDEZVOUS_* overrides, then the conventional `PORT`.
    fn apply_env_overrides<F>(&mut self, lookup: F) -> Result<(), ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(v) = lookup("RENDEZVOUS_NETWORK__BIND_ADDR") {
            self.network.bind_addr = v.parse().map_err(|_| ConfigError::InvalidEnv {
                var: "RENDEZVOUS_NETWORK__BIND_ADDR",
                value: v,
            })?;
        }
        for var in ["RENDEZVOUS_NETWORK__PORT", "PORT"] {
            if let Some(v) = lookup(var) {
                self.network.port = v
                    .parse()
                    .map_err(|_| ConfigError::InvalidEnv { var, value: v })?;
            }
        }
        Ok(())
    }
}
