//! Custom error types for Wingman
//!
//! Provides a unified error handling system across all modules.

use thiserror::Error;

/// Main error type for Wingman operations
#[derive(Error, Debug)]
pub enum WingmanError {
    /// Model backend connection or streaming errors
    #[error("Transport error: {0}")]
    Transport(String),

    /// Model not available on the backend
    #[error("Model '{0}' is not available on the model backend")]
    ModelNotFound(String),

    /// Tool validation or execution errors
    #[error("Tool error: {0}")]
    Tool(String),

    /// MCP server errors
    #[error("MCP error: {0}")]
    Mcp(String),

    /// Configuration errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// Conversation state was used out of order
    #[error("Conversation error: {0}")]
    Conversation(String),

    /// JSON parsing errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// HTTP request errors
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// IO errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// The user interrupted the current operation
    #[error("Interrupted")]
    Interrupted,

    /// Generic error with context
    #[error("{context}: {source}")]
    WithContext {
        context: String,
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    /// Generic error for other cases
    #[error("{0}")]
    Other(String),
}

/// Convenience Result type for Wingman operations
pub type Result<T> = std::result::Result<T, WingmanError>;

impl WingmanError {
    /// Create a transport error
    pub fn transport(msg: impl Into<String>) -> Self {
        Self::Transport(msg.into())
    }

    /// Create a tool error
    pub fn tool(msg: impl Into<String>) -> Self {
        Self::Tool(msg.into())
    }

    /// Create an MCP error
    pub fn mcp(msg: impl Into<String>) -> Self {
        Self::Mcp(msg.into())
    }

    /// Create a config error
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// Create a conversation error
    pub fn conversation(msg: impl Into<String>) -> Self {
        Self::Conversation(msg.into())
    }

    /// Wrap an error with additional context
    pub fn with_context<E>(context: impl Into<String>, error: E) -> Self
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        Self::WithContext {
            context: context.into(),
            source: Box::new(error),
        }
    }
}
