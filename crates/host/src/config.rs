//! Host configuration: `kb-host.toml`, then `KB_*` environment variables,
//! then command-line flags.

use std::path::{Path, PathBuf};

use mcp::{DEFAULT_HOST, DEFAULT_PORT, TransportKind};
use serde::Deserialize;

/// Config file looked up in the working directory when none is given.
pub const CONFIG_FILE: &str = "kb-host.toml";

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct HostConfig {
    /// Name reported in the handshake.
    #[serde(default = "default_name")]
    pub name: String,

    /// `stdio` (spawned by the orchestrator) or `tcp` (listen for it).
    #[serde(default)]
    pub transport: TransportKind,

    /// Listen address for the TCP binding.
    #[serde(default = "default_host")]
    pub host: String,

    #[serde(default = "default_port")]
    pub port: u16,

    /// JSON array of `{question, answer}` records.
    #[serde(default = "default_knowledge_base")]
    pub knowledge_base: PathBuf,
}

fn default_name() -> String {
    "knowledge-base-server".to_string()
}

fn default_host() -> String {
    DEFAULT_HOST.to_string()
}

fn default_port() -> u16 {
    DEFAULT_PORT
}

fn default_knowledge_base() -> PathBuf {
    PathBuf::from("data/kb.json")
}

impl Default for HostConfig {
    fn default() -> Self {
        Self {
            name: default_name(),
            transport: TransportKind::default(),
            host: default_host(),
            port: default_port(),
            knowledge_base: default_knowledge_base(),
        }
    }
}

impl HostConfig {
    /// Load configuration from a TOML file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path.as_ref())?;
        Self::parse(&content)
    }

    /// Parse configuration from TOML string.
    pub fn parse(toml: &str) -> Result<Self, ConfigError> {
        toml::from_str(toml).map_err(|e| ConfigError::Parse(e.to_string()))
    }

    /// Overlay `KB_TRANSPORT`, `KB_HOST`, `KB_PORT` and `KB_PATH`.
    pub fn apply_env(self) -> Result<Self, ConfigError> {
        self.apply_vars(|key| std::env::var(key).ok())
    }

    fn apply_vars(mut self, var: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        if let Some(transport) = var("KB_TRANSPORT") {
            self.transport = transport.parse().map_err(|reason| ConfigError::Env {
                var: "KB_TRANSPORT",
                reason,
            })?;
        }
        if let Some(host) = var("KB_HOST") {
            self.host = host;
        }
        if let Some(port) = var("KB_PORT") {
            self.port = port.parse().map_err(|e| ConfigError::Env {
                var: "KB_PORT",
                reason: format!("{e}"),
            })?;
        }
        if let Some(path) = var("KB_PATH") {
            self.knowledge_base = PathBuf::from(path);
        }
        Ok(self)
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read config: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to parse config: {0}")]
    Parse(String),

    #[error("invalid {var}: {reason}")]
    Env { var: &'static str, reason: String },
}
