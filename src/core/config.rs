//! Configuration management for Wingman
//!
//! Supports environment variables, config files, and runtime overrides.
//!
//! Config file location: ~/.config/wingman/config.toml

use serde::{Deserialize, Serialize};
use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use crate::core::error::{Result, WingmanError};

/// Main configuration for Wingman
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// Model backend configuration
    #[serde(default)]
    pub model: ModelConfig,
    /// Conversation memory configuration
    #[serde(default)]
    pub conversation: ConversationConfig,
    /// Tool dispatch and approval configuration
    #[serde(default)]
    pub tools: ToolsConfig,
    /// MCP server configuration
    #[serde(default)]
    pub mcp: McpConfig,
    /// Streaming configuration
    #[serde(default)]
    pub streaming: StreamingConfig,
    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Model backend configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ModelConfig {
    /// Host address (default: localhost)
    pub host: String,
    /// Port number (default: 11434)
    pub port: u16,
    /// Request timeout in seconds
    pub timeout_secs: u64,
    /// Model used for the conversation
    pub name: String,
    /// Sampling temperature
    pub temperature: Option<f32>,
}

/// Conversation memory configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ConversationConfig {
    /// Maximum number of (user, assistant) pairs kept in history
    /// Default: 100
    pub max_history_pairs: usize,
    /// System prompt sent ahead of every request
    pub system_prompt: Option<String>,
}

/// Tool dispatch configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ToolsConfig {
    /// Skip the approval gate for every tool
    pub trust_all: bool,
    /// Tools that never ask for approval
    pub trusted: Vec<String>,
    /// Maximum tool rounds within one user turn
    /// Default: 25
    pub max_tool_rounds: usize,
    /// Maximum bytes of stdout/stderr kept from a shell command
    pub max_output_bytes: usize,
}

/// MCP server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct McpConfig {
    /// Whether to start MCP servers at all
    pub enabled: bool,
    /// Global server list (default: ~/.wingman/mcp.json)
    pub global_config: Option<PathBuf>,
    /// Workspace server list (default: ./.wingman/mcp.json)
    pub workspace_config: Option<PathBuf>,
    /// How many servers are initialized concurrently
    pub init_concurrency: usize,
    /// Per-request timeout in seconds
    pub request_timeout_secs: u64,
}

/// Streaming configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StreamingConfig {
    /// Print response fragments as they arrive
    pub enabled: bool,
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Default level filter (overridden by WINGMAN_LOG)
    pub level: String,
}

fn env_flag(name: &str) -> Option<bool> {
    env::var(name).ok().map(|v| v == "true" || v == "1")
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            host: "localhost".to_string(),
            port: 11434,
            timeout_secs: 120,
            name: "qwen3:8b".to_string(),
            temperature: None,
        }
    }
}

impl Default for ConversationConfig {
    fn default() -> Self {
        Self {
            max_history_pairs: 100,
            system_prompt: None,
        }
    }
}

impl Default for ToolsConfig {
    fn default() -> Self {
        Self {
            trust_all: false,
            trusted: Vec::new(),
            max_tool_rounds: 25,
            max_output_bytes: 100 * 1024,
        }
    }
}

impl Default for McpConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            global_config: None,
            workspace_config: None,
            init_concurrency: 10,
            request_timeout_secs: 120,
        }
    }
}

impl Default for StreamingConfig {
    fn default() -> Self {
        Self { enabled: true }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "warn".to_string(),
        }
    }
}

impl Config {
    /// Get the config directory path
    pub fn config_dir() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("wingman")
    }

    /// Get the config file path
    pub fn config_file() -> PathBuf {
        Self::config_dir().join("config.toml")
    }

    /// Load configuration from file, environment, and defaults
    /// Priority: env vars > config file > defaults
    pub fn load() -> Self {
        let _ = dotenvy::dotenv();

        let mut config = match Self::load_from_file() {
            Ok(config) => config,
            Err(e) => {
                tracing::debug!("using default configuration: {}", e);
                Self::default()
            }
        };
        config.apply_env_overrides();
        config
    }

    /// Load configuration from the default config file only
    pub fn load_from_file() -> Result<Self> {
        Self::load_from_path(&Self::config_file())
    }

    /// Load configuration from a specific file
    pub fn load_from_path(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Err(WingmanError::config(format!(
                "Config file not found: {}",
                path.display()
            )));
        }

        let content = fs::read_to_string(path)
            .map_err(|e| WingmanError::config(format!("Failed to read config: {}", e)))?;

        toml::from_str(&content)
            .map_err(|e| WingmanError::config(format!("Failed to parse config: {}", e)))
    }

    /// Apply WINGMAN_* environment variables on top of the current values
    pub fn apply_env_overrides(&mut self) {
        if let Ok(host) = env::var("WINGMAN_HOST") {
            self.model.host = host;
        }
        if let Some(port) = env::var("WINGMAN_PORT").ok().and_then(|p| p.parse().ok()) {
            self.model.port = port;
        }
        if let Ok(model) = env::var("WINGMAN_MODEL") {
            self.model.name = model;
        }
        if let Some(streaming) = env_flag("WINGMAN_STREAMING") {
            self.streaming.enabled = streaming;
        }
        if let Some(trust_all) = env_flag("WINGMAN_TRUST_ALL_TOOLS") {
            self.tools.trust_all = trust_all;
        }
    }

    /// Save configuration to the default file
    pub fn save(&self) -> Result<PathBuf> {
        let config_path = Self::config_file();
        self.save_to(&config_path)?;
        Ok(config_path)
    }

    /// Save configuration to a specific file
    pub fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(dir) = path.parent() {
            fs::create_dir_all(dir)
                .map_err(|e| WingmanError::config(format!("Failed to create config dir: {}", e)))?;
        }

        let content = toml::to_string_pretty(self)
            .map_err(|e| WingmanError::config(format!("Failed to serialize config: {}", e)))?;

        fs::write(path, content)
            .map_err(|e| WingmanError::config(format!("Failed to write config: {}", e)))?;

        Ok(())
    }

    /// Get the full model backend URL
    pub fn model_url(&self) -> String {
        format!("http://{}:{}", self.model.host, self.model.port)
    }

    /// Global MCP server list, `~/.wingman/mcp.json` unless configured
    pub fn global_mcp_config(&self) -> PathBuf {
        self.mcp.global_config.clone().unwrap_or_else(|| {
            dirs::home_dir()
                .unwrap_or_else(|| PathBuf::from("."))
                .join(".wingman")
                .join("mcp.json")
        })
    }

    /// Workspace MCP server list, `./.wingman/mcp.json` unless configured
    pub fn workspace_mcp_config(&self) -> PathBuf {
        self.mcp
            .workspace_config
            .clone()
            .unwrap_or_else(|| PathBuf::from(".wingman").join("mcp.json"))
    }

    /// Generate a default config file content for display
    pub fn default_config_toml() -> String {
        toml::to_string_pretty(&Config::default())
            .unwrap_or_else(|_| String::from("# Error generating config"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.model.port, 11434);
        assert_eq!(config.conversation.max_history_pairs, 100);
        assert_eq!(config.tools.max_tool_rounds, 25);
        assert_eq!(config.mcp.init_concurrency, 10);
        assert!(config.streaming.enabled);
        assert!(!config.tools.trust_all);
    }

    #[test]
    fn test_model_url() {
        let config = Config::default();
        assert_eq!(config.model_url(), "http://localhost:11434");
    }

    #[test]
    fn test_save_and_load_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("config.toml");

        let mut config = Config::default();
        config.model.name = "llama3:8b".to_string();
        config.tools.trusted = vec!["fs_write".to_string()];
        config.save_to(&path).unwrap();

        let loaded = Config::load_from_path(&path).unwrap();
        assert_eq!(loaded.model.name, "llama3:8b");
        assert_eq!(loaded.tools.trusted, vec!["fs_write".to_string()]);
    }

    #[test]
    fn test_partial_file_uses_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        fs::write(&path, "[streaming]\nenabled = false\n").unwrap();

        let loaded = Config::load_from_path(&path).unwrap();
        assert!(!loaded.streaming.enabled);
        assert_eq!(loaded.tools.max_tool_rounds, 25);
    }

    #[test]
    fn test_missing_file_is_config_error() {
        let err = Config::load_from_path(Path::new("/nonexistent/wingman.toml")).unwrap_err();
        assert!(matches!(err, WingmanError::Config(_)));
    }

    #[test]
    fn test_config_dir() {
        let dir = Config::config_dir();
        assert!(dir.to_string_lossy().contains("wingman"));
    }
}
