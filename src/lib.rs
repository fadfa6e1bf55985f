//! Wingman - terminal AI assistant with tools
//!
//! Streams answers from a local model and lets it read files, edit files and
//! run commands, asking the user before anything that changes state.
//!
//! # Architecture
//!
//! - **Core**: Shared types, configuration, logging and error handling
//! - **LLM**: Streaming model transport with Ollama and scripted implementations
//! - **Tools**: Built-in tools, MCP-backed custom tools and the approval gate
//! - **Agent**: Session orchestration and bounded conversation memory
//! - **CLI**: Interactive REPL
//!
//! # Usage
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use wingman::{AutoApprover, Config, OllamaClient, Session, ToolManager};
//!
//! #[tokio::main]
//! async fn main() -> wingman::Result<()> {
//!     let config = Config::load();
//!     let client = OllamaClient::from_config(&config)?;
//!     let mut session = Session::new(
//!         config,
//!         Arc::new(client),
//!         ToolManager::default(),
//!         Box::new(AutoApprover),
//!     )
//!     .await?;
//!
//!     let outcome = session.process("List the files here", |t| print!("{}", t)).await?;
//!     println!("\n({} tool rounds)", outcome.tool_rounds);
//!     Ok(())
//! }
//! ```

pub mod agent;
pub mod cli;
pub mod core;
pub mod llm;
pub mod tools;

// Re-export commonly used items
pub use agent::{Approval, Approver, AutoApprover, DenyApprover, Session, TurnOutcome};
pub use cli::{Repl, StdinApprover};
pub use core::{Config, Result, WingmanError};
pub use llm::{MockClient, ModelClient, OllamaClient};
pub use tools::ToolManager;
