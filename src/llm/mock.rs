//! Scripted model client for tests and offline runs

use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

use crate::core::{Result, ToolUse, WingmanError};
use crate::llm::traits::{ConversationRequest, ModelClient, ResponseEvent, ResponseStream};

/// A client that replays pre-configured responses in order
///
/// Every request is recorded so tests can inspect what was sent.
#[derive(Clone, Default)]
pub struct MockClient {
    responses: Arc<Mutex<VecDeque<Vec<Result<ResponseEvent>>>>>,
    requests: Arc<Mutex<Vec<ConversationRequest>>>,
}

impl MockClient {
    /// Create a mock with a sequence of scripted responses
    pub fn new(responses: Vec<Vec<ResponseEvent>>) -> Self {
        let client = Self::default();
        for events in responses {
            client.push_events(events);
        }
        client
    }

    /// Queue a plain text response
    pub fn push_text(&self, text: impl Into<String>) -> &Self {
        self.push_events(vec![ResponseEvent::AssistantText(text.into())])
    }

    /// Queue a response proposing tool uses, optionally preceded by text
    pub fn push_tool_uses(&self, text: impl Into<String>, tool_uses: Vec<ToolUse>) -> &Self {
        let mut events = vec![ResponseEvent::AssistantText(text.into())];
        events.extend(tool_uses.into_iter().map(ResponseEvent::ToolUse));
        self.push_events(events)
    }

    /// Queue raw events; `EndStream` is appended when missing
    pub fn push_events(&self, mut events: Vec<ResponseEvent>) -> &Self {
        if !matches!(events.last(), Some(ResponseEvent::EndStream { .. })) {
            events.push(ResponseEvent::EndStream { usage: None });
        }
        self.lock_responses()
            .push_back(events.into_iter().map(Ok).collect());
        self
    }

    /// Queue a response that fails mid-stream after some text
    pub fn push_stream_error(&self, partial: impl Into<String>, error: impl Into<String>) -> &Self {
        self.lock_responses().push_back(vec![
            Ok(ResponseEvent::AssistantText(partial.into())),
            Err(WingmanError::transport(error.into())),
        ]);
        self
    }

    /// Requests received so far
    pub fn requests(&self) -> Vec<ConversationRequest> {
        self.requests
            .lock()
            .map(|r| r.clone())
            .unwrap_or_default()
    }

    /// Scripted responses not yet consumed
    pub fn remaining(&self) -> usize {
        self.lock_responses().len()
    }

    fn lock_responses(&self) -> std::sync::MutexGuard<'_, VecDeque<Vec<Result<ResponseEvent>>>> {
        self.responses
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

#[async_trait]
impl ModelClient for MockClient {
    async fn send_messages(&self, request: &ConversationRequest) -> Result<ResponseStream> {
        if let Ok(mut requests) = self.requests.lock() {
            requests.push(request.clone());
        }

        let events = self.lock_responses().pop_front().unwrap_or_else(|| {
            vec![
                Ok(ResponseEvent::AssistantText(String::new())),
                Ok(ResponseEvent::EndStream { usage: None }),
            ]
        });

        Ok(Box::pin(tokio_stream::iter(events)))
    }

    async fn list_models(&self) -> Result<Vec<String>> {
        Ok(vec!["mock".to_string()])
    }

    fn name(&self) -> &str {
        "mock"
    }
}
