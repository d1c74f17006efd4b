//! Configuration management
//!
//! Loads, validates and (on first run) creates the relay configuration.
//! Configuration is stored in TOML format at ~/.relay/config.toml.
//!
//! # Configuration Sections
//!
//! - **core**: fallback workspace path, log level
//! - **server**: bind address and static asset directory
//! - **tool**: external CLI command, timeout, credential variable
//! - **conversation**: history and context-window bounds
//!
//! Paths support ~ expansion; the workspace is canonicalized and created
//! if missing. Conversation bounds are configurable defaults — the shipped
//! values match the observed behavior of the tool (20 stored messages, 10
//! context messages, 200-character excerpts, 120-second timeout).

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Errors produced while loading or validating configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    Read(std::io::Error),

    #[error("Failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Failed to write config file: {0}")]
    Write(std::io::Error),

    #[error("Invalid configuration: {0}")]
    Invalid(String),

    #[error("Could not determine home directory")]
    NoHome,
}

/// Main configuration structure
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    /// Core engine settings
    #[serde(default)]
    pub core: CoreConfig,

    /// HTTP/WebSocket server settings
    #[serde(default)]
    pub server: ServerConfig,

    /// External CLI tool settings
    #[serde(default)]
    pub tool: ToolConfig,

    /// Conversation history bounds
    #[serde(default)]
    pub conversation: ConversationConfig,
}

/// Core engine configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CoreConfig {
    /// Fallback working directory for requests that carry no workspace
    /// (supports ~ expansion)
    #[serde(default = "default_workspace")]
    pub workspace: PathBuf,

    /// Log level (error, warn, info, debug, trace)
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

/// Server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Bind host
    #[serde(default = "default_host")]
    pub host: String,

    /// Bind port
    #[serde(default = "default_port")]
    pub port: u16,

    /// Directory served under /static; its index.html is the homepage
    #[serde(default = "default_static_dir")]
    pub static_dir: PathBuf,
}

/// External CLI tool configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolConfig {
    /// Command invoked for chat requests
    #[serde(default = "default_tool_command")]
    pub command: String,

    /// Per-invocation timeout in seconds
    #[serde(default = "default_tool_timeout")]
    pub timeout_secs: u64,

    /// Environment variable injected into the tool's environment
    #[serde(default = "default_api_key_env")]
    pub api_key_env: String,
}

/// Conversation history bounds
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConversationConfig {
    /// Stored messages kept per session (oldest evicted first)
    #[serde(default = "default_max_history")]
    pub max_history: usize,

    /// History messages rendered into the context sent to the tool
    #[serde(default = "default_context_messages")]
    pub context_messages: usize,

    /// Character budget per rendered history message
    #[serde(default = "default_context_content_chars")]
    pub context_content_chars: usize,

    /// Evict sessions idle for this many seconds (0 disables the sweep)
    #[serde(default)]
    pub idle_eviction_secs: u64,
}

// Default value functions

fn default_workspace() -> PathBuf {
    PathBuf::from(".")
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_host() -> String {
    "127.0.0.1".to_string()
}

fn default_port() -> u16 {
    8000
}

fn default_static_dir() -> PathBuf {
    PathBuf::from("static")
}

fn default_tool_command() -> String {
    "codex".to_string()
}

fn default_tool_timeout() -> u64 {
    120
}

fn default_api_key_env() -> String {
    "OPENAI_API_KEY".to_string()
}

fn default_max_history() -> usize {
    20
}

fn default_context_messages() -> usize {
    10
}

fn default_context_content_chars() -> usize {
    200
}

impl Default for CoreConfig {
    fn default() -> Self {
        Self {
            workspace: default_workspace(),
            log_level: default_log_level(),
        }
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            static_dir: default_static_dir(),
        }
    }
}

impl Default for ToolConfig {
    fn default() -> Self {
        Self {
            command: default_tool_command(),
            timeout_secs: default_tool_timeout(),
            api_key_env: default_api_key_env(),
        }
    }
}

impl Default for ConversationConfig {
    fn default() -> Self {
        Self {
            max_history: default_max_history(),
            context_messages: default_context_messages(),
            context_content_chars: default_context_content_chars(),
            idle_eviction_secs: 0,
        }
    }
}

impl Config {
    /// Load configuration from the default location (~/.relay/config.toml),
    /// creating a default file on first run.
    pub fn load_or_create() -> Result<Self, ConfigError> {
        let config_path = Self::default_config_path()?;

        if config_path.exists() {
            Self::load_from_path(&config_path)
        } else {
            Self::create_default(&config_path)
        }
    }

    /// Load configuration from a specific path.
    pub fn load_from_path(path: &Path) -> Result<Self, ConfigError> {
        let contents = fs::read_to_string(path).map_err(ConfigError::Read)?;
        let mut config: Config = toml::from_str(&contents)?;
        config.validate_and_process()?;
        Ok(config)
    }

    /// Create default configuration and save it to `path`.
    fn create_default(path: &Path) -> Result<Self, ConfigError> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(ConfigError::Write)?;
        }

        let mut config = Self::default();
        config.validate_and_process()?;

        let toml_string = toml::to_string_pretty(&config)
            .map_err(|e| ConfigError::Invalid(format!("Failed to serialize config: {}", e)))?;
        fs::write(path, toml_string).map_err(ConfigError::Write)?;

        Ok(config)
    }

    /// Default configuration file path (~/.relay/config.toml)
    pub fn default_config_path() -> Result<PathBuf, ConfigError> {
        let home = dirs::home_dir().ok_or(ConfigError::NoHome)?;
        Ok(home.join(".relay").join("config.toml"))
    }

    /// Validate fields and expand/canonicalize paths.
    fn validate_and_process(&mut self) -> Result<(), ConfigError> {
        let valid_log_levels = ["error", "warn", "info", "debug", "trace"];
        if !valid_log_levels.contains(&self.core.log_level.as_str()) {
            return Err(ConfigError::Invalid(format!(
                "Invalid log level '{}'. Must be one of: {}",
                self.core.log_level,
                valid_log_levels.join(", ")
            )));
        }

        if self.tool.command.trim().is_empty() {
            return Err(ConfigError::Invalid(
                "tool.command must not be empty".to_string(),
            ));
        }
        if self.tool.timeout_secs == 0 {
            return Err(ConfigError::Invalid(
                "tool.timeout_secs must be at least 1".to_string(),
            ));
        }

        if self.conversation.max_history == 0 {
            return Err(ConfigError::Invalid(
                "conversation.max_history must be at least 1".to_string(),
            ));
        }
        if self.conversation.context_messages == 0 {
            return Err(ConfigError::Invalid(
                "conversation.context_messages must be at least 1".to_string(),
            ));
        }
        if self.conversation.context_content_chars == 0 {
            return Err(ConfigError::Invalid(
                "conversation.context_content_chars must be at least 1".to_string(),
            ));
        }

        self.core.workspace = expand_path(&self.core.workspace)?;
        self.core.workspace = canonicalize_or_create(&self.core.workspace)?;
        if !self.core.workspace.is_dir() {
            return Err(ConfigError::Invalid(format!(
                "Workspace path is not a directory: {:?}",
                self.core.workspace
            )));
        }

        Ok(())
    }
}

/// Expand ~ in path to the user's home directory.
fn expand_path(path: &Path) -> Result<PathBuf, ConfigError> {
    let path_str = path
        .to_str()
        .ok_or_else(|| ConfigError::Invalid("Invalid UTF-8 in path".to_string()))?;

    if let Some(rest) = path_str.strip_prefix("~/") {
        let home = dirs::home_dir().ok_or(ConfigError::NoHome)?;
        Ok(home.join(rest))
    } else if path_str == "~" {
        dirs::home_dir().ok_or(ConfigError::NoHome)
    } else {
        Ok(path.to_path_buf())
    }
}

/// Canonicalize the path, creating the directory first if it is missing.
fn canonicalize_or_create(path: &Path) -> Result<PathBuf, ConfigError> {
    if !path.exists() {
        fs::create_dir_all(path).map_err(ConfigError::Write)?;
    }
    path.canonicalize()
        .map_err(|e| ConfigError::Invalid(format!("Failed to canonicalize {:?}: {}", path, e)))
}
