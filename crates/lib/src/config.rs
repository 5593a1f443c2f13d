//! Configuration types and loading.
//!
//! Config is loaded from a YAML profile (e.g. `config/profiles.yaml` or
//! `~/.courier/profiles.yaml`) and environment. Every section is defaulted so
//! an empty or missing profile is valid.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Top-level profile.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Config {
    /// Tool server bind settings.
    #[serde(default)]
    pub server: ServerConfig,

    #[serde(default)]
    pub telegram: TelegramConfig,

    /// Google Workspace credentials.
    #[serde(default)]
    pub google: GoogleConfig,

    /// Chat model used by the agent loop.
    #[serde(default)]
    pub agent: AgentConfig,

    /// Relay timing and chunk size.
    #[serde(default)]
    pub relay: RelayConfig,

    /// External tool servers attached to the dispatcher at startup.
    #[serde(default, alias = "mcp_servers")]
    pub tool_servers: Vec<ToolServerConfig>,
}

/// Tool server bind address and port.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServerConfig {
    /// Port for the HTTP tool server (default 8765).
    #[serde(default = "default_server_port")]
    pub port: u16,

    /// Bind address (default "127.0.0.1").
    #[serde(default = "default_server_bind")]
    pub bind: String,
}

fn default_server_port() -> u16 {
    8765
}

fn default_server_bind() -> String {
    "127.0.0.1".to_string()
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            port: default_server_port(),
            bind: default_server_bind(),
        }
    }
}

impl ServerConfig {
    /// `bind:port`, with IPv6 addresses bracketed.
    pub fn addr(&self) -> String {
        let bind = self.bind.trim();
        if bind.contains(':') && !bind.starts_with('[') {
            format!("[{}]:{}", bind, self.port)
        } else {
            format!("{}:{}", bind, self.port)
        }
    }
}

/// Telegram bot settings.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TelegramConfig {
    /// Bot token from BotFather. Overridden by TELEGRAM_BOT_TOKEN env when set.
    pub bot_token: Option<String>,
    /// Chat used by `courier send`. Overridden by CHAT_ID env when set.
    pub default_chat_id: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GoogleConfig {
    /// Service-account key file. Overridden by GOOGLE_SERVICE_ACCOUNT_KEY env when set.
    #[serde(default = "default_credentials_file")]
    pub credentials_file: PathBuf,
    /// User to impersonate with domain-wide delegation; without it mail is sent as the service account.
    #[serde(default)]
    pub impersonate: Option<String>,
}

fn default_credentials_file() -> PathBuf {
    PathBuf::from("gworkspace_service_account.json")
}

impl Default for GoogleConfig {
    fn default() -> Self {
        Self {
            credentials_file: default_credentials_file(),
            impersonate: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AgentConfig {
    /// Ollama model: use the exact name from `ollama list` (e.g. "llama3.2:latest").
    #[serde(default = "default_model")]
    pub model: String,
    /// Ollama base URL (default http://127.0.0.1:11434).
    #[serde(default)]
    pub base_url: Option<String>,
}

fn default_model() -> String {
    "llama3.2:latest".to_string()
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            model: default_model(),
            base_url: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RelayConfig {
    /// How long an in-flight message may keep running after shutdown is requested.
    #[serde(default = "default_five")]
    pub grace_period_secs: u64,
    /// How long to wait for each background task to exit before aborting it.
    #[serde(default = "default_five")]
    pub join_timeout_secs: u64,
    /// Outbound chunk limit in characters (Telegram's limit is 4096).
    #[serde(default = "default_max_message_chars")]
    pub max_message_chars: usize,
}

fn default_five() -> u64 {
    5
}

fn default_max_message_chars() -> usize {
    4096
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            grace_period_secs: default_five(),
            join_timeout_secs: default_five(),
            max_message_chars: default_max_message_chars(),
        }
    }
}

/// One external tool server: a child process speaking line-delimited JSON on stdio.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ToolServerConfig {
    pub id: String,
    pub command: String,
    #[serde(default)]
    pub args: Vec<String>,
    #[serde(default)]
    pub description: Option<String>,
    /// Working directory for the child process.
    #[serde(default)]
    pub cwd: Option<PathBuf>,
}

/// Trimmed, non-empty env var.
pub fn env_nonempty(name: &str) -> Option<String> {
    std::env::var(name)
        .ok()
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
}

fn nonempty(value: Option<&String>) -> Option<String> {
    value.map(|s| s.trim().to_string()).filter(|s| !s.is_empty())
}

/// Resolve the Telegram bot token: env TELEGRAM_BOT_TOKEN overrides config.
pub fn resolve_telegram_token(config: &Config) -> Option<String> {
    env_nonempty("TELEGRAM_BOT_TOKEN").or_else(|| nonempty(config.telegram.bot_token.as_ref()))
}

/// Resolve the default chat: env CHAT_ID overrides config.
pub fn resolve_default_chat(config: &Config) -> Option<String> {
    env_nonempty("CHAT_ID").or_else(|| nonempty(config.telegram.default_chat_id.as_ref()))
}

/// Resolve the service-account key path: env GOOGLE_SERVICE_ACCOUNT_KEY overrides config.
/// A relative config path is resolved against the profile's directory.
pub fn resolve_credentials_file(config: &Config, config_path: &Path) -> PathBuf {
    if let Some(p) = env_nonempty("GOOGLE_SERVICE_ACCOUNT_KEY") {
        return PathBuf::from(p);
    }
    let file = &config.google.credentials_file;
    if file.is_absolute() || file.exists() {
        return file.clone();
    }
    match config_path.parent().filter(|p| !p.as_os_str().is_empty()) {
        Some(dir) => dir.join(file),
        None => file.clone(),
    }
}

/// Profile path: COURIER_CONFIG_PATH, then `config/profiles.yaml` when present, then `~/.courier/profiles.yaml`.
pub fn default_config_path() -> PathBuf {
    if let Some(p) = env_nonempty("COURIER_CONFIG_PATH") {
        return PathBuf::from(p);
    }
    let local = PathBuf::from("config").join("profiles.yaml");
    if local.exists() {
        return local;
    }
    dirs::home_dir()
        .map(|h| h.join(".courier").join("profiles.yaml"))
        .unwrap_or_else(|| PathBuf::from("profiles.yaml"))
}

/// Load config from `path` or the default path. Missing file => default config.
/// Returns the config and the path that was used.
pub fn load_config(path: Option<PathBuf>) -> Result<(Config, PathBuf)> {
    let path = path.unwrap_or_else(default_config_path);
    let config = if !path.exists() {
        log::debug!("config file not found, using defaults: {}", path.display());
        Config::default()
    } else {
        let s = std::fs::read_to_string(&path)
            .with_context(|| format!("reading config from {}", path.display()))?;
        parse_config(&s).with_context(|| format!("parsing config from {}", path.display()))?
    };
    Ok((config, path))
}

/// Parse a YAML profile. An empty document is the default config.
pub fn parse_config(s: &str) -> Result<Config> {
    if s.trim().is_empty() {
        return Ok(Config::default());
    }
    Ok(serde_yaml::from_str(s)?)
}
