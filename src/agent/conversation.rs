//! Conversation history management
//!
//! History is kept as complete (user, assistant) exchanges. The next user
//! message is staged separately until the assistant answers it.

use std::collections::VecDeque;

use crate::core::{Message, Result, ToolResult, ToolSpec, ToolUse, WingmanError};

/// Placeholder sent when the user submits an empty prompt
const EMPTY_PROMPT: &str = "Empty prompt";

/// Result text recorded for every tool use the user declined
pub const CANCELLED_TOOL_USE: &str = "Tool use was cancelled by the user";

/// What a user message carries
#[derive(Debug, Clone, PartialEq)]
pub enum UserMessageContent {
    /// A typed prompt
    Prompt { prompt: String },
    /// Results for the tool uses of the previous assistant message
    ToolUseResults { tool_use_results: Vec<ToolResult> },
    /// The user declined the tool uses and typed something instead
    CancelledToolUses {
        prompt: String,
        tool_use_results: Vec<ToolResult>,
    },
}

/// A user turn plus optional auxiliary context
#[derive(Debug, Clone, PartialEq)]
pub struct UserMessage {
    pub content: UserMessageContent,
    /// Context files rendered ahead of the prompt
    pub context: Option<String>,
}

impl UserMessage {
    pub fn new_prompt(prompt: impl Into<String>) -> Self {
        let prompt = prompt.into();
        let prompt = if prompt.trim().is_empty() {
            EMPTY_PROMPT.to_string()
        } else {
            prompt
        };
        Self {
            content: UserMessageContent::Prompt { prompt },
            context: None,
        }
    }

    pub fn new_tool_use_results(results: Vec<ToolResult>) -> Self {
        Self {
            content: UserMessageContent::ToolUseResults {
                tool_use_results: results,
            },
            context: None,
        }
    }

    pub fn new_cancelled_tool_uses<'a>(
        prompt: Option<String>,
        tool_use_ids: impl Iterator<Item = &'a str>,
    ) -> Self {
        Self {
            content: UserMessageContent::CancelledToolUses {
                prompt: prompt.unwrap_or_else(|| CANCELLED_TOOL_USE.to_string()),
                tool_use_results: tool_use_ids
                    .map(|id| ToolResult::error_text(id, CANCELLED_TOOL_USE))
                    .collect(),
            },
            context: None,
        }
    }

    /// Text typed by the user, if any
    pub fn prompt(&self) -> Option<&str> {
        match &self.content {
            UserMessageContent::Prompt { prompt } => Some(prompt),
            UserMessageContent::CancelledToolUses { prompt, .. } => Some(prompt),
            UserMessageContent::ToolUseResults { .. } => None,
        }
    }

    /// Tool results carried by this message
    pub fn tool_use_results(&self) -> &[ToolResult] {
        match &self.content {
            UserMessageContent::Prompt { .. } => &[],
            UserMessageContent::ToolUseResults { tool_use_results }
            | UserMessageContent::CancelledToolUses {
                tool_use_results, ..
            } => tool_use_results,
        }
    }

    pub fn has_tool_use_results(&self) -> bool {
        !self.tool_use_results().is_empty()
    }

    fn to_message(&self) -> Message {
        let mut content = String::new();
        if let Some(ref context) = self.context {
            content.push_str(context);
            content.push_str("\n\n");
        }
        if let Some(prompt) = self.prompt() {
            content.push_str(prompt);
        }
        Message::user(content).with_tool_results(self.tool_use_results().to_vec())
    }
}

/// An assistant turn
#[derive(Debug, Clone, PartialEq)]
pub enum AssistantMessage {
    /// Plain answer
    Response { message_id: String, content: String },
    /// Answer that asks for tools to be run
    ToolUse {
        message_id: String,
        content: String,
        tool_uses: Vec<ToolUse>,
    },
}

impl AssistantMessage {
    pub fn message_id(&self) -> &str {
        match self {
            AssistantMessage::Response { message_id, .. }
            | AssistantMessage::ToolUse { message_id, .. } => message_id,
        }
    }

    pub fn content(&self) -> &str {
        match self {
            AssistantMessage::Response { content, .. }
            | AssistantMessage::ToolUse { content, .. } => content,
        }
    }

    pub fn tool_uses(&self) -> &[ToolUse] {
        match self {
            AssistantMessage::Response { .. } => &[],
            AssistantMessage::ToolUse { tool_uses, .. } => tool_uses,
        }
    }

    fn to_message(&self) -> Message {
        Message::assistant(self.content()).with_tool_uses(self.tool_uses().to_vec())
    }
}

/// Bounded conversation memory
#[derive(Debug, Clone)]
pub struct ConversationState {
    /// Random id for this conversation
    conversation_id: String,
    /// Completed exchanges, oldest first
    history: VecDeque<(UserMessage, AssistantMessage)>,
    /// User message awaiting an assistant response
    next_message: Option<UserMessage>,
    /// Maximum completed exchanges kept
    max_history_pairs: usize,
    /// Running summary standing in for pruned or compacted history
    summary: Option<String>,
    /// Auxiliary context as (name, content)
    context_files: Vec<(String, String)>,
    /// System prompt (always first)
    system_prompt: Option<String>,
    /// Tools offered to the model
    tools: Vec<ToolSpec>,
}

impl ConversationState {
    /// Create a new conversation
    pub fn new(max_history_pairs: usize, tools: Vec<ToolSpec>) -> Self {
        Self {
            conversation_id: uuid::Uuid::new_v4().to_string(),
            history: VecDeque::new(),
            next_message: None,
            max_history_pairs: max_history_pairs.max(1),
            summary: None,
            context_files: Vec::new(),
            system_prompt: None,
            tools,
        }
    }

    pub fn conversation_id(&self) -> &str {
        &self.conversation_id
    }

    /// Set the system prompt
    pub fn set_system_prompt(&mut self, prompt: impl Into<String>) {
        self.system_prompt = Some(prompt.into());
    }

    pub fn tools(&self) -> &[ToolSpec] {
        &self.tools
    }

    pub fn set_tools(&mut self, tools: Vec<ToolSpec>) {
        self.tools = tools;
    }

    /// Stage a new user prompt
    ///
    /// An unanswered pending prompt is replaced. If the last assistant message
    /// is still waiting on tool results, its tool uses are cancelled first.
    pub fn append_new_user_message(&mut self, prompt: impl Into<String>) {
        if let Some(pending) = self.next_message.as_ref() {
            tracing::warn!(
                "replacing unanswered user message in conversation {}: {:?}",
                self.conversation_id,
                pending.prompt()
            );
        }
        let dangling = self.last_assistant_tool_uses();
        self.next_message = Some(if dangling.is_empty() {
            UserMessage::new_prompt(prompt)
        } else {
            UserMessage::new_cancelled_tool_uses(
                Some(prompt.into()),
                dangling.iter().map(|t| t.id.as_str()),
            )
        });
    }

    /// Stage the results of the last assistant message's tool uses
    pub fn add_tool_results(&mut self, results: Vec<ToolResult>) {
        debug_assert!(self.next_message.is_none());
        self.next_message = Some(UserMessage::new_tool_use_results(results));
    }

    /// Answer every pending tool use with a cancellation result
    pub fn abandon_tool_use(&mut self, tool_uses: &[ToolUse], denied_prompt: Option<String>) {
        self.next_message = Some(UserMessage::new_cancelled_tool_uses(
            denied_prompt,
            tool_uses.iter().map(|t| t.id.as_str()),
        ));
    }

    /// The staged user message, if any
    pub fn next_message(&self) -> Option<&UserMessage> {
        self.next_message.as_ref()
    }

    /// Complete the current exchange with the assistant's answer
    pub fn push_assistant_message(&mut self, message: AssistantMessage) -> Result<()> {
        let user = self.next_message.take().ok_or_else(|| {
            WingmanError::conversation("assistant message pushed without a pending user message")
        })?;
        self.history.push_back((user, message));
        self.enforce_bound();
        Ok(())
    }

    /// Drop the oldest exchanges until the history fits
    ///
    /// Exchanges go in blocks: a prompt-led pair plus the tool result pairs
    /// that follow it. Dropping part of a block would leave results whose
    /// tool call is gone, so the newest block is kept whole even when it
    /// alone exceeds the bound.
    fn enforce_bound(&mut self) {
        let mut dropped = 0;
        while self.history.len() > self.max_history_pairs {
            let next_block = self
                .history
                .iter()
                .skip(1)
                .position(|(user, _)| !user.has_tool_use_results());
            let Some(offset) = next_block else {
                break;
            };
            self.history.drain(..offset + 1);
            dropped += offset + 1;
        }
        if dropped > 0 {
            tracing::debug!("pruned {} exchanges from conversation history", dropped);
        }
    }

    /// Tool uses requested by the most recent assistant message
    pub fn last_assistant_tool_uses(&self) -> &[ToolUse] {
        self.history
            .back()
            .map(|(_, assistant)| assistant.tool_uses())
            .unwrap_or(&[])
    }

    pub fn set_summary(&mut self, summary: impl Into<String>) {
        self.summary = Some(summary.into());
    }

    pub fn summary(&self) -> Option<&str> {
        self.summary.as_deref()
    }

    /// Replace the detailed history with a summary of it
    pub fn compact(&mut self, summary: impl Into<String>) {
        self.set_summary(summary);
        self.history.clear();
    }

    /// Clear all history
    pub fn clear(&mut self, preserve_summary: bool) {
        self.history.clear();
        self.next_message = None;
        if !preserve_summary {
            self.summary = None;
        }
    }

    /// Attach a piece of auxiliary context, replacing one with the same name
    pub fn add_context_file(&mut self, name: impl Into<String>, content: impl Into<String>) {
        let name = name.into();
        let content = content.into();
        match self.context_files.iter_mut().find(|(n, _)| *n == name) {
            Some(entry) => entry.1 = content,
            None => self.context_files.push((name, content)),
        }
    }

    pub fn clear_context_files(&mut self) {
        self.context_files.clear();
    }

    pub fn context_files(&self) -> &[(String, String)] {
        &self.context_files
    }

    fn render_context(&self) -> Option<String> {
        if self.context_files.is_empty() {
            return None;
        }
        let mut out = String::from("--- CONTEXT FILES BEGIN ---\n");
        for (name, content) in &self.context_files {
            out.push_str(&format!("[{}]\n{}\n", name, content));
        }
        out.push_str("--- CONTEXT FILES END ---");
        Some(out)
    }

    /// Messages to send for the staged user message, oldest first
    pub fn as_sendable_messages(&self) -> Result<Vec<Message>> {
        let next = self.next_message.as_ref().ok_or_else(|| {
            WingmanError::conversation("no pending user message to send")
        })?;

        let mut messages = Vec::with_capacity(self.history.len() * 2 + 4);

        if let Some(ref prompt) = self.system_prompt {
            messages.push(Message::system(prompt.clone()));
        }

        if let Some(ref summary) = self.summary {
            messages.push(Message::user(format!(
                "Here is a summary of our earlier conversation. Use it as context for the rest of this session:\n\n{}",
                summary
            )));
            messages.push(Message::assistant(
                "Understood. I'll use that summary as context.",
            ));
        }

        for (user, assistant) in &self.history {
            messages.push(user.to_message());
            messages.push(assistant.to_message());
        }

        let mut next = next.clone();
        if next.prompt().is_some() {
            next.context = self.render_context();
        }
        messages.push(next.to_message());

        Ok(messages)
    }

    /// Messages asking the model to summarize the history so far
    ///
    /// Carries any earlier summary so it is folded into the new one.
    pub fn as_compaction_messages(&self, instruction: &str) -> Vec<Message> {
        let mut messages = Vec::with_capacity(self.history.len() * 2 + 3);

        if let Some(ref summary) = self.summary {
            messages.push(Message::user(format!(
                "Summary of the conversation before this point:\n\n{}",
                summary
            )));
            messages.push(Message::assistant("Noted."));
        }

        for (user, assistant) in &self.history {
            messages.push(user.to_message());
            messages.push(assistant.to_message());
        }

        messages.push(Message::user(instruction));
        messages
    }

    /// Completed exchanges, oldest first
    pub fn history(&self) -> &VecDeque<(UserMessage, AssistantMessage)> {
        &self.history
    }

    /// Get exchange count
    pub fn history_len(&self) -> usize {
        self.history.len()
    }

    /// Check if empty
    pub fn is_empty(&self) -> bool {
        self.history.is_empty() && self.next_message.is_none()
    }
}
