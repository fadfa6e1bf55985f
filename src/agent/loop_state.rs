//! Per-turn loop state
//!
//! Tracks tool rounds, executed tools and token usage while a single user
//! turn bounces between the model and the tools.

use serde::{Deserialize, Serialize};

use crate::core::{TokenUsage, ToolResult};

/// State of one user turn
#[derive(Debug, Clone)]
pub struct TurnState {
    /// Tool rounds completed so far
    pub round: usize,
    /// Maximum tool rounds before the turn is cut off
    pub max_rounds: usize,
    /// Every tool that ran, in order
    pub executions: Vec<ToolExecution>,
    /// Assistant text produced during the turn
    pub text: String,
    /// Usage summed over every model response
    pub usage: TokenUsage,
    usage_reported: bool,
}

impl TurnState {
    pub fn new(max_rounds: usize) -> Self {
        Self {
            round: 0,
            max_rounds,
            executions: Vec::new(),
            text: String::new(),
            usage: TokenUsage::default(),
            usage_reported: false,
        }
    }

    /// Whether another tool round is allowed
    pub fn can_run_tools(&self) -> bool {
        self.round < self.max_rounds
    }

    pub fn next_round(&mut self) {
        self.round += 1;
    }

    pub fn push_text(&mut self, text: &str) {
        if text.is_empty() {
            return;
        }
        if !self.text.is_empty() {
            self.text.push('\n');
        }
        self.text.push_str(text);
    }

    pub fn record_usage(&mut self, usage: Option<TokenUsage>) {
        if let Some(usage) = usage {
            self.usage.accumulate(&usage);
            self.usage_reported = true;
        }
    }

    pub fn record_execution(&mut self, execution: ToolExecution) {
        self.executions.push(execution);
    }

    /// Finish the turn
    pub fn into_outcome(self, stopped_early: bool) -> TurnOutcome {
        TurnOutcome {
            response: self.text,
            tool_rounds: self.round,
            tools_executed: self.executions,
            stopped_early,
            usage: self.usage_reported.then_some(self.usage),
        }
    }
}

/// Record of one tool that ran
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolExecution {
    /// Name the model used
    pub tool_name: String,
    pub tool_use_id: String,
    pub success: bool,
}

impl ToolExecution {
    pub fn from_result(tool_name: impl Into<String>, result: &ToolResult) -> Self {
        Self {
            tool_name: tool_name.into(),
            tool_use_id: result.tool_use_id.clone(),
            success: !result.is_error(),
        }
    }
}

/// What a user turn produced
#[derive(Debug, Clone)]
pub struct TurnOutcome {
    /// Assistant text from every response in the turn
    pub response: String,
    /// Tool rounds that ran
    pub tool_rounds: usize,
    pub tools_executed: Vec<ToolExecution>,
    /// The turn hit the tool round limit
    pub stopped_early: bool,
    /// Summed usage, when the backend reported any
    pub usage: Option<TokenUsage>,
}
