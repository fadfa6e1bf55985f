//! Session orchestrator
//!
//! Runs one user turn at a time: send the conversation to the model, stream
//! the answer, run the tools it asks for behind the approval gate, and loop
//! until the model answers without tools.

use std::sync::Arc;

use async_trait::async_trait;

use crate::agent::conversation::{AssistantMessage, ConversationState};
use crate::agent::loop_state::{ToolExecution, TurnOutcome, TurnState};
use crate::core::{Config, Result, ToolResult, ToolSpec, ToolUse, WingmanError};
use crate::llm::{collect_response, AssistantResponse, ConversationRequest, ModelClient};
use crate::tools::{InvokeContext, Tool, ToolManager, ToolPermissions};

const COMPACTION_PROMPT: &str = "Summarize the conversation so far. Keep the user's goals, \
decisions that were made, file paths, commands and their results, and any open tasks. \
Write it so the conversation can continue from the summary alone.";

const COMPACTION_SYSTEM_PROMPT: &str =
    "You write concise, factual summaries of conversations between a user and an assistant.";

/// The user's answer to a tool approval prompt
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Approval {
    Yes,
    No,
    /// Approve and stop asking for this tool
    Trust,
}

/// Decides whether a tool that needs approval may run
#[async_trait]
pub trait Approver: Send + Sync {
    async fn approve(&self, tool_use: &ToolUse, description: &str) -> Approval;
}

/// Approves everything
#[derive(Debug, Clone, Copy, Default)]
pub struct AutoApprover;

#[async_trait]
impl Approver for AutoApprover {
    async fn approve(&self, _tool_use: &ToolUse, _description: &str) -> Approval {
        Approval::Yes
    }
}

/// Denies everything
#[derive(Debug, Clone, Copy, Default)]
pub struct DenyApprover;

#[async_trait]
impl Approver for DenyApprover {
    async fn approve(&self, _tool_use: &ToolUse, _description: &str) -> Approval {
        Approval::No
    }
}

enum PendingTool {
    Ready(ToolUse, Tool),
    Failed(ToolResult),
}

enum RoundResult {
    Completed(Vec<ToolResult>),
    /// The user declined; cancellation results are already staged
    Cancelled,
}

/// An interactive chat session with tools
pub struct Session {
    config: Config,
    client: Arc<dyn ModelClient>,
    tool_manager: ToolManager,
    approver: Box<dyn Approver>,
    conversation: ConversationState,
    permissions: ToolPermissions,
    invoke_ctx: InvokeContext,
}

impl Session {
    /// Create a session, loading every tool the manager knows about
    pub async fn new(
        config: Config,
        client: Arc<dyn ModelClient>,
        mut tool_manager: ToolManager,
        approver: Box<dyn Approver>,
    ) -> Result<Self> {
        let specs = tool_manager.load_tools().await?;
        tracing::info!(tools = specs.len(), model = %config.model.name, "session ready");

        let mut conversation = ConversationState::new(config.conversation.max_history_pairs, specs);
        if let Some(ref prompt) = config.conversation.system_prompt {
            conversation.set_system_prompt(prompt.clone());
        }

        let permissions =
            ToolPermissions::new(config.tools.trust_all, config.tools.trusted.iter().cloned());

        let invoke_ctx = InvokeContext {
            max_output_bytes: config.tools.max_output_bytes,
            ..Default::default()
        };

        Ok(Self {
            config,
            client,
            tool_manager,
            approver,
            conversation,
            permissions,
            invoke_ctx,
        })
    }

    /// Override where tools resolve paths and run commands
    pub fn with_working_dir(mut self, cwd: impl Into<std::path::PathBuf>) -> Self {
        self.invoke_ctx.cwd = cwd.into();
        self
    }

    /// Run one user turn
    ///
    /// `on_text` receives assistant text as it arrives.
    pub async fn process(
        &mut self,
        input: &str,
        mut on_text: impl FnMut(&str),
    ) -> Result<TurnOutcome> {
        self.conversation.append_new_user_message(input);
        let mut state = TurnState::new(self.config.tools.max_tool_rounds);

        loop {
            let response = self.send_and_collect(&mut on_text).await?;
            state.record_usage(response.usage);
            state.push_text(&response.text);

            if !response.has_tool_uses() {
                self.conversation.push_assistant_message(AssistantMessage::Response {
                    message_id: response.message_id,
                    content: response.text,
                })?;
                return Ok(state.into_outcome(false));
            }

            let tool_uses = response.tool_uses;
            self.conversation.push_assistant_message(AssistantMessage::ToolUse {
                message_id: response.message_id,
                content: response.text,
                tool_uses: tool_uses.clone(),
            })?;

            if !state.can_run_tools() {
                tracing::warn!(rounds = state.round, "tool round limit reached, stopping turn");
                self.close_turn_at_limit(&tool_uses, state.round)?;
                return Ok(state.into_outcome(true));
            }

            let round = self.run_tool_round(tool_uses, &mut state).await;
            if let RoundResult::Completed(results) = round {
                self.conversation.add_tool_results(results);
            }
            state.next_round();
        }
    }

    /// Resolve, approve and execute one batch of tool uses
    ///
    /// A denial cancels the whole batch and the model is told.
    async fn run_tool_round(&mut self, tool_uses: Vec<ToolUse>, state: &mut TurnState) -> RoundResult {
        let mut pending = Vec::with_capacity(tool_uses.len());
        for tool_use in tool_uses.iter().cloned() {
            match self.tool_manager.get_tool_from_tool_use(tool_use.clone()) {
                Ok(mut tool) => match tool.validate(&self.invoke_ctx).await {
                    Ok(()) => pending.push(PendingTool::Ready(tool_use, tool)),
                    Err(e) => {
                        tracing::debug!(tool = %tool_use.name, "validation failed: {}", e);
                        pending.push(PendingTool::Failed(ToolResult::error_text(
                            &tool_use.id,
                            e.to_string(),
                        )));
                    }
                },
                Err(result) => {
                    tracing::debug!(tool = %tool_use.name, "could not resolve tool use");
                    pending.push(PendingTool::Failed(result));
                }
            }
        }

        // Trust only sticks once the whole batch is approved
        let mut granted: Vec<String> = Vec::new();
        for item in &pending {
            let PendingTool::Ready(tool_use, tool) = item else {
                continue;
            };
            if !self.permissions.needs_approval(tool) || granted.iter().any(|g| g == tool.name()) {
                continue;
            }
            let description = tool.describe(&self.invoke_ctx);
            match self.approver.approve(tool_use, &description).await {
                Approval::Yes => {}
                Approval::Trust => granted.push(tool.name().to_string()),
                Approval::No => {
                    tracing::info!(tool = %tool.name(), "tool use denied, cancelling batch");
                    self.conversation.abandon_tool_use(&tool_uses, None);
                    return RoundResult::Cancelled;
                }
            }
        }
        for name in granted {
            tracing::info!(tool = %name, "tool trusted for this session");
            self.permissions.trust(&name);
        }

        let mut results = Vec::with_capacity(pending.len());
        for item in pending {
            let result = match item {
                PendingTool::Ready(tool_use, tool) => {
                    tracing::info!(tool = %tool.name(), id = %tool_use.id, "invoking tool");
                    let result = match tool.invoke(&self.invoke_ctx).await {
                        Ok(output) => output.into_tool_result(&tool_use.id),
                        Err(e) => {
                            tracing::warn!(tool = %tool.name(), "tool failed: {}", e);
                            ToolResult::error_text(&tool_use.id, e.to_string())
                        }
                    };
                    state.record_execution(ToolExecution::from_result(tool.name(), &result));
                    result
                }
                PendingTool::Failed(result) => result,
            };
            results.push(result);
        }

        RoundResult::Completed(results)
    }

    /// Answer outstanding tool uses so the history stays well formed
    fn close_turn_at_limit(&mut self, tool_uses: &[ToolUse], rounds: usize) -> Result<()> {
        let results = tool_uses
            .iter()
            .map(|t| {
                ToolResult::error_text(
                    &t.id,
                    format!("Tool use skipped: limit of {} tool rounds reached", rounds),
                )
            })
            .collect();
        self.conversation.add_tool_results(results);
        self.conversation.push_assistant_message(AssistantMessage::Response {
            message_id: uuid::Uuid::new_v4().to_string(),
            content: format!("Stopped after {} tool rounds.", rounds),
        })
    }

    async fn send_and_collect(&self, on_text: &mut impl FnMut(&str)) -> Result<AssistantResponse> {
        let messages = self.conversation.as_sendable_messages()?;
        let request = ConversationRequest::new(&self.config.model.name, messages)
            .with_tools(self.conversation.tools().to_vec())
            .with_temperature(self.config.model.temperature);

        tracing::debug!(
            messages = request.messages.len(),
            tools = request.tools.len(),
            "sending request"
        );

        let stream = self.client.send_messages(&request).await?;
        if self.config.streaming.enabled {
            collect_response(stream, on_text).await
        } else {
            let response = collect_response(stream, |_| {}).await?;
            on_text(&response.text);
            Ok(response)
        }
    }

    /// Replace the history with a model-written summary
    ///
    /// Returns `None` when there is nothing to compact.
    pub async fn compact(&mut self) -> Result<Option<String>> {
        if self.conversation.history_len() == 0 {
            return Ok(None);
        }

        let mut messages = vec![crate::core::Message::system(COMPACTION_SYSTEM_PROMPT)];
        messages.extend(self.conversation.as_compaction_messages(COMPACTION_PROMPT));
        let request = ConversationRequest::new(&self.config.model.name, messages)
            .with_temperature(self.config.model.temperature);

        let stream = self.client.send_messages(&request).await?;
        let response = collect_response(stream, |_| {}).await?;
        let summary = response.text.trim().to_string();
        if summary.is_empty() {
            return Err(WingmanError::conversation("model returned an empty summary"));
        }

        let compacted = self.conversation.history_len();
        self.conversation.compact(summary.clone());
        tracing::info!(exchanges = compacted, "compacted conversation history");
        Ok(Some(summary))
    }

    pub fn conversation(&self) -> &ConversationState {
        &self.conversation
    }

    pub fn conversation_mut(&mut self) -> &mut ConversationState {
        &mut self.conversation
    }

    pub fn tool_permissions(&self) -> &ToolPermissions {
        &self.permissions
    }

    pub fn tool_permissions_mut(&mut self) -> &mut ToolPermissions {
        &mut self.permissions
    }

    pub fn tool_specs(&self) -> &[ToolSpec] {
        self.conversation.tools()
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn model_name(&self) -> &str {
        &self.config.model.name
    }

    pub fn client(&self) -> &Arc<dyn ModelClient> {
        &self.client
    }

    /// Clear the conversation, keeping the summary
    pub fn clear(&mut self) {
        self.conversation.clear(true);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::MockClient;
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};

    async fn session_with(client: MockClient, approver: Box<dyn Approver>) -> Session {
        Session::new(Config::default(), Arc::new(client), ToolManager::default(), approver)
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn test_plain_answer_finishes_turn() {
        let client = MockClient::default();
        client.push_text("Hello!");
        let mut session = session_with(client.clone(), Box::new(DenyApprover)).await;

        let mut streamed = String::new();
        let outcome = session.process("hi", |t| streamed.push_str(t)).await.unwrap();

        assert_eq!(outcome.response, "Hello!");
        assert_eq!(streamed, "Hello!");
        assert_eq!(outcome.tool_rounds, 0);
        assert!(!outcome.stopped_early);
        assert_eq!(session.conversation().history_len(), 1);

        let requests = client.requests();
        let request = &requests[0];
        assert_eq!(request.tools.len(), 3);
    }

    #[tokio::test]
    async fn test_readonly_tool_runs_without_approval() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("notes.txt"), "remember the milk\n").unwrap();

        let client = MockClient::default();
        client.push_tool_uses(
            "Reading.",
            vec![ToolUse::new("t1", "fs_read", json!({"mode": "Line", "path": "notes.txt"}))],
        );
        client.push_text("You need milk.");

        let mut session = session_with(client.clone(), Box::new(DenyApprover))
            .await
            .with_working_dir(dir.path());
        let outcome = session.process("what do I need?", |_| {}).await.unwrap();

        assert_eq!(outcome.tool_rounds, 1);
        assert_eq!(outcome.tools_executed.len(), 1);
        assert!(outcome.tools_executed[0].success);

        let requests = client.requests();
        let second = &requests[1];
        let results = &second.messages.last().unwrap().tool_results;
        assert_eq!(results[0].tool_use_id, "t1");
        assert!(results[0].text().contains("remember the milk"));
    }

    #[tokio::test]
    async fn test_denied_tool_cancels_batch() {
        let dir = tempfile::tempdir().unwrap();
        let client = MockClient::default();
        client.push_tool_uses(
            "",
            vec![
                ToolUse::new("t1", "execute_bash", json!({"command": "ls"})),
                ToolUse::new(
                    "t2",
                    "fs_write",
                    json!({"command": "create", "path": "out.txt", "file_text": "x"}),
                ),
            ],
        );
        client.push_text("Okay, I won't.");

        let mut session = session_with(client.clone(), Box::new(DenyApprover))
            .await
            .with_working_dir(dir.path());
        let outcome = session.process("write a file", |_| {}).await.unwrap();

        assert!(outcome.tools_executed.is_empty());
        assert!(!dir.path().join("out.txt").exists());

        let requests = client.requests();
        let second = &requests[1];
        let results = &second.messages.last().unwrap().tool_results;
        assert_eq!(results.len(), 2);
        assert!(results.iter().all(|r| r.is_error()));
    }

    #[tokio::test]
    async fn test_invalid_tool_args_report_error_to_model() {
        let client = MockClient::default();
        client.push_tool_uses("", vec![ToolUse::new("t1", "fs_read", json!({"path": 7}))]);
        client.push_text("Sorry.");

        let mut session = session_with(client.clone(), Box::new(AutoApprover)).await;
        let outcome = session.process("read", |_| {}).await.unwrap();

        assert!(outcome.tools_executed.is_empty());
        let requests = client.requests();
        let results = &requests[1].messages.last().unwrap().tool_results;
        assert!(results[0].text().starts_with("Failed to validate tool parameters"));
    }

    struct CountingTrust(Arc<AtomicUsize>);

    #[async_trait]
    impl Approver for CountingTrust {
        async fn approve(&self, _tool_use: &ToolUse, _description: &str) -> Approval {
            self.0.fetch_add(1, Ordering::SeqCst);
            Approval::Trust
        }
    }

    #[tokio::test]
    async fn test_trust_stops_asking() {
        let dir = tempfile::tempdir().unwrap();
        let client = MockClient::default();
        for i in 0..2 {
            client.push_tool_uses(
                "",
                vec![ToolUse::new(
                    format!("t{}", i),
                    "fs_write",
                    json!({"command": "create", "path": format!("f{}.txt", i), "file_text": "x"}),
                )],
            );
        }
        client.push_text("done");

        let prompts = Arc::new(AtomicUsize::new(0));
        let mut session = session_with(client, Box::new(CountingTrust(prompts.clone())))
            .await
            .with_working_dir(dir.path());
        let outcome = session.process("make files", |_| {}).await.unwrap();

        assert_eq!(outcome.tools_executed.len(), 2);
        assert_eq!(prompts.load(Ordering::SeqCst), 1);
        assert!(session.tool_permissions().is_trusted("fs_write"));
        assert!(dir.path().join("f1.txt").exists());
    }

    /// Trusts the first prompt, denies every later one
    struct TrustThenDeny(AtomicUsize);

    #[async_trait]
    impl Approver for TrustThenDeny {
        async fn approve(&self, _tool_use: &ToolUse, _description: &str) -> Approval {
            if self.0.fetch_add(1, Ordering::SeqCst) == 0 {
                Approval::Trust
            } else {
                Approval::No
            }
        }
    }

    #[tokio::test]
    async fn test_trust_discarded_when_batch_denied() {
        let dir = tempfile::tempdir().unwrap();
        let client = MockClient::default();
        client.push_tool_uses(
            "",
            vec![
                ToolUse::new(
                    "t1",
                    "fs_write",
                    json!({"command": "create", "path": "a.txt", "file_text": "x"}),
                ),
                ToolUse::new("t2", "execute_bash", json!({"command": "touch b.txt"})),
            ],
        );
        client.push_text("Stopped.");

        let mut session = session_with(client, Box::new(TrustThenDeny(AtomicUsize::new(0))))
            .await
            .with_working_dir(dir.path());
        let outcome = session.process("make files", |_| {}).await.unwrap();

        assert!(outcome.tools_executed.is_empty());
        assert!(!session.tool_permissions().is_trusted("fs_write"));
        assert!(!dir.path().join("a.txt").exists());
    }

    #[tokio::test]
    async fn test_tool_rounds_outlive_small_history_bound() {
        let client = MockClient::default();
        for i in 0..3 {
            client.push_tool_uses(
                "",
                vec![ToolUse::new(format!("t{}", i), "execute_bash", json!({"command": "pwd"}))],
            );
        }
        client.push_text("all done");

        let mut config = Config::default();
        config.conversation.max_history_pairs = 1;
        let mut session = Session::new(
            config,
            Arc::new(client.clone()),
            ToolManager::default(),
            Box::new(AutoApprover),
        )
        .await
        .unwrap();
        let outcome = session.process("where am I?", |_| {}).await.unwrap();
        assert_eq!(outcome.tool_rounds, 3);

        // every result the model sees answers a tool call sent before it
        for request in client.requests() {
            assert_eq!(request.messages[0].content, "where am I?");
            let mut called = Vec::new();
            for message in &request.messages {
                for result in &message.tool_results {
                    assert!(
                        called.contains(&result.tool_use_id),
                        "result {} has no matching call",
                        result.tool_use_id
                    );
                }
                called.extend(message.tool_uses.iter().map(|t| t.id.clone()));
            }
        }
    }

    #[tokio::test]
    async fn test_tool_round_limit() {
        let client = MockClient::default();
        for i in 0..3 {
            client.push_tool_uses(
                "",
                vec![ToolUse::new(format!("t{}", i), "execute_bash", json!({"command": "pwd"}))],
            );
        }

        let mut config = Config::default();
        config.tools.max_tool_rounds = 2;
        let mut session = Session::new(
            config,
            Arc::new(client.clone()),
            ToolManager::default(),
            Box::new(AutoApprover),
        )
        .await
        .unwrap();
        let outcome = session.process("loop forever", |_| {}).await.unwrap();

        assert!(outcome.stopped_early);
        assert_eq!(outcome.tool_rounds, 2);
        assert_eq!(client.requests().len(), 3);

        // the history stays usable for the next turn
        client.push_text("fine");
        let next = session.process("stop", |_| {}).await.unwrap();
        assert_eq!(next.response, "fine");
    }

    #[tokio::test]
    async fn test_transport_error_propagates() {
        let client = MockClient::default();
        client.push_stream_error("partial", "connection reset");
        let mut session = session_with(client, Box::new(AutoApprover)).await;

        let err = session.process("hi", |_| {}).await.unwrap_err();
        assert!(matches!(err, WingmanError::Transport(_)));
    }

    #[tokio::test]
    async fn test_compact_replaces_history() {
        let client = MockClient::default();
        client.push_text("answer");
        client.push_text("We discussed greetings.");
        let mut session = session_with(client.clone(), Box::new(AutoApprover)).await;

        assert!(session.compact().await.unwrap().is_none());
        session.process("hello", |_| {}).await.unwrap();

        let summary = session.compact().await.unwrap().unwrap();
        assert_eq!(summary, "We discussed greetings.");
        assert_eq!(session.conversation().history_len(), 0);
        assert_eq!(session.conversation().summary(), Some("We discussed greetings."));

        let requests = client.requests();
        let compaction_request = &requests[1];
        assert!(compaction_request.tools.is_empty());
    }
}
