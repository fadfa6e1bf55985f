//! Model client trait for abstracting different backends
//!
//! A backend turns a conversation request into a stream of incremental
//! response fragments.

use async_trait::async_trait;
use futures::Stream;
use std::pin::Pin;

use crate::core::{Message, Result, TokenUsage, ToolSpec, ToolUse};

/// One incremental fragment of a model response
#[derive(Debug, Clone, PartialEq)]
pub enum ResponseEvent {
    /// A piece of assistant text
    AssistantText(String),
    /// A complete tool invocation request
    ToolUse(ToolUse),
    /// The backend finished the response
    EndStream { usage: Option<TokenUsage> },
}

/// Type alias for a boxed stream of response fragments
pub type ResponseStream = Pin<Box<dyn Stream<Item = Result<ResponseEvent>> + Send>>;

/// Everything the backend needs to produce the next assistant message
#[derive(Debug, Clone)]
pub struct ConversationRequest {
    /// Model to use
    pub model: String,
    /// Ordered messages, oldest first
    pub messages: Vec<Message>,
    /// Tools the model may call
    pub tools: Vec<ToolSpec>,
    /// Sampling temperature
    pub temperature: Option<f32>,
}

impl ConversationRequest {
    pub fn new(model: impl Into<String>, messages: Vec<Message>) -> Self {
        Self {
            model: model.into(),
            messages,
            tools: Vec::new(),
            temperature: None,
        }
    }

    pub fn with_tools(mut self, tools: Vec<ToolSpec>) -> Self {
        self.tools = tools;
        self
    }

    pub fn with_temperature(mut self, temperature: Option<f32>) -> Self {
        self.temperature = temperature;
        self
    }
}

/// Trait for model backends
#[async_trait]
pub trait ModelClient: Send + Sync {
    /// Send the conversation and stream the response back
    async fn send_messages(&self, request: &ConversationRequest) -> Result<ResponseStream>;

    /// List available models
    async fn list_models(&self) -> Result<Vec<String>>;

    /// Get the backend name
    fn name(&self) -> &str;
}
