//! Agent module - session orchestration and conversation memory
//!
//! Contains the loop that drives model calls and tool execution for a session.

pub mod conversation;
pub mod loop_state;
pub mod session;

pub use conversation::{AssistantMessage, ConversationState, UserMessage, UserMessageContent};
pub use loop_state::{ToolExecution, TurnOutcome, TurnState};
pub use session::{Approval, Approver, AutoApprover, DenyApprover, Session};
