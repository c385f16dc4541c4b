//! Configuration loading from kb-client.toml.

use std::path::{Path, PathBuf};

use runtime::{DEFAULT_MAX_TOOL_ROUNDS, DEFAULT_TOOL_TIMEOUT};
use serde::Deserialize;

/// Config file looked up in the working directory when none is given.
pub const CONFIG_FILE: &str = "kb-client.toml";

const SYSTEM_PROMPT: &str = "You are a helpful assistant with access to specialized knowledge base tools.

IMPORTANT: When answering questions, you should ALWAYS first check if there's relevant information in the available knowledge base using the get_knowledge_base tool, especially for questions about:
- MCP (Model Context Protocol)
- Transport protocols
- Technical specifications
- System capabilities

Only provide your own knowledge if the knowledge base doesn't contain relevant information.";

/// Top-level configuration.
#[derive(Debug, Default, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub backend: BackendConfig,

    #[serde(default)]
    pub server: ServerSettings,

    #[serde(default)]
    pub session: SessionSettings,
}

/// Completion API provider.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum Provider {
    /// GitHub Models inference endpoint (OpenAI wire format).
    #[default]
    Github,
    Openai,
    Anthropic,
}

impl Provider {
    /// Environment variable holding the credential.
    pub fn key_var(self) -> &'static str {
        match self {
            Self::Github => "GITHUB_TOKEN",
            Self::Openai => "OPENAI_API_KEY",
            Self::Anthropic => "ANTHROPIC_API_KEY",
        }
    }

    pub fn default_model(self) -> &'static str {
        match self {
            Self::Github => "openai/gpt-4o",
            Self::Openai => "gpt-4o",
            Self::Anthropic => "claude-sonnet-4-20250514",
        }
    }
}

/// Backend provider configuration.
#[derive(Debug, Default, Deserialize)]
pub struct BackendConfig {
    #[serde(default)]
    pub provider: Provider,

    /// Model to use; the provider's default when unset.
    pub model: Option<String>,

    /// Credential; read from the provider's environment variable when unset.
    pub api_key: Option<String>,

    /// Override the provider's endpoint.
    pub base_url: Option<String>,
}

/// How to reach the tool host.
#[derive(Debug, Default, Deserialize)]
pub struct ServerSettings {
    /// Executable to spawn over stdio, or `host:port` to connect over TCP.
    /// Defaults to the `kb-host` binary next to this one.
    pub target: Option<String>,

    /// Extra arguments for a spawned host.
    #[serde(default)]
    pub args: Vec<String>,
}

/// Query loop settings.
#[derive(Debug, Deserialize)]
pub struct SessionSettings {
    #[serde(default = "default_system_prompt")]
    pub system_prompt: String,

    #[serde(default = "default_max_tool_rounds")]
    pub max_tool_rounds: usize,

    /// Per tool call, in seconds.
    #[serde(default = "default_tool_timeout")]
    pub tool_timeout: u64,
}

fn default_system_prompt() -> String {
    SYSTEM_PROMPT.to_string()
}

fn default_max_tool_rounds() -> usize {
    DEFAULT_MAX_TOOL_ROUNDS
}

fn default_tool_timeout() -> u64 {
    DEFAULT_TOOL_TIMEOUT.as_secs()
}

impl Default for SessionSettings {
    fn default() -> Self {
        Self {
            system_prompt: default_system_prompt(),
            max_tool_rounds: default_max_tool_rounds(),
            tool_timeout: default_tool_timeout(),
        }
    }
}

/// Where the tool host lives.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ServerTarget {
    /// Spawn this executable and speak over its stdio.
    Command(PathBuf),
    /// Connect to a listening host.
    Tcp(String),
}

impl ServerTarget {
    /// An existing path is always a command; otherwise `host:port` means TCP.
    pub fn parse(target: &str) -> Self {
        if Path::new(target).exists() {
            return Self::Command(PathBuf::from(target));
        }
        match target.rsplit_once(':') {
            Some((host, port)) if !host.is_empty() && port.parse::<u16>().is_ok() => {
                Self::Tcp(target.to_string())
            }
            _ => Self::Command(PathBuf::from(target)),
        }
    }

    /// The `kb-host` executable installed next to the running binary, or
    /// `kb-host` on `PATH`.
    pub fn sibling_host() -> Self {
        let name = format!("kb-host{}", std::env::consts::EXE_SUFFIX);
        let sibling = std::env::current_exe()
            .ok()
            .map(|exe| exe.with_file_name(&name))
            .filter(|path| path.exists());
        Self::Command(sibling.unwrap_or_else(|| PathBuf::from(name)))
    }
}

impl Config {
    /// Load configuration from a TOML file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path.as_ref())?;
        Self::parse(&content)
    }

    /// Parse configuration from TOML string.
    pub fn parse(toml: &str) -> Result<Self, ConfigError> {
        toml::from_str(toml).map_err(|e| ConfigError::Parse(e.to_string()))
    }

    /// Overlay `USE_GITHUB_AI` and `KB_MODEL`.
    pub fn apply_env(self) -> Result<Self, ConfigError> {
        self.apply_vars(|key| std::env::var(key).ok())
    }

    fn apply_vars(mut self, var: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        if let Some(flag) = var("USE_GITHUB_AI") {
            self.backend.provider = match flag.to_ascii_lowercase().as_str() {
                "true" | "1" => Provider::Github,
                "false" | "0" => Provider::Openai,
                _ => {
                    return Err(ConfigError::Env {
                        var: "USE_GITHUB_AI",
                        reason: format!("expected true or false, got {flag:?}"),
                    });
                }
            };
        }
        if let Some(model) = var("KB_MODEL") {
            self.backend.model = Some(model);
        }
        Ok(self)
    }

    pub fn model(&self) -> &str {
        self.backend
            .model
            .as_deref()
            .unwrap_or_else(|| self.backend.provider.default_model())
    }

    /// The configured key, else the provider's environment variable.
    pub fn api_key(&self) -> Result<String, ConfigError> {
        self.resolve_api_key(|key| std::env::var(key).ok())
    }

    fn resolve_api_key(&self, var: impl Fn(&str) -> Option<String>) -> Result<String, ConfigError> {
        let provider = self.backend.provider;
        self.backend
            .api_key
            .clone()
            .or_else(|| var(provider.key_var()))
            .filter(|key| !key.is_empty())
            .ok_or(ConfigError::MissingApiKey {
                var: provider.key_var(),
            })
    }

    pub fn server_target(&self) -> ServerTarget {
        match &self.server.target {
            Some(target) => ServerTarget::parse(target),
            None => ServerTarget::sibling_host(),
        }
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

    #[error("no API key: set {var} or backend.api_key")]
    MissingApiKey { var: &'static str },
}
