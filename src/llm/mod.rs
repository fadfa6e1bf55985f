//! LLM module - streaming transport to the model backend
//!
//! Provides the backend abstraction, the Ollama implementation, and a
//! scripted client for tests.

pub mod mock;
pub mod ollama;
pub mod response;
pub mod traits;

pub use mock::MockClient;
pub use ollama::OllamaClient;
pub use response::{collect_response, AssistantResponse};
pub use traits::{ConversationRequest, ModelClient, ResponseEvent, ResponseStream};
