//! Ollama client implementation
//!
//! Async HTTP client for the Ollama chat API. Responses are always streamed:
//! the NDJSON body is decoded line by line into [`ResponseEvent`]s and handed
//! to the caller through a channel-backed stream.

use async_trait::async_trait;
use futures::StreamExt;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;

use crate::core::{Config, Message, Result, TokenUsage, ToolSpec, ToolUse, WingmanError};
use crate::llm::traits::{ConversationRequest, ModelClient, ResponseEvent, ResponseStream};

/// Ollama API client
#[derive(Clone)]
pub struct OllamaClient {
    client: Client,
    base_url: String,
}

/// Ollama chat request
#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<OllamaMessage>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    tools: Vec<OllamaTool<'a>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    options: Option<OllamaOptions>,
    stream: bool,
}

/// Ollama message format
#[derive(Debug, Serialize, Deserialize)]
struct OllamaMessage {
    role: String,
    content: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    tool_calls: Option<Vec<OllamaToolCall>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tool_name: Option<String>,
}

/// Ollama tool call format
#[derive(Debug, Clone, Serialize, Deserialize)]
struct OllamaToolCall {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    id: Option<String>,
    function: OllamaFunction,
}

/// Ollama function in tool call
#[derive(Debug, Clone, Serialize, Deserialize)]
struct OllamaFunction {
    name: String,
    #[serde(default)]
    arguments: serde_json::Value,
}

/// Tool definition in request
#[derive(Debug, Serialize)]
struct OllamaTool<'a> {
    #[serde(rename = "type")]
    tool_type: &'static str,
    function: OllamaToolFunction<'a>,
}

#[derive(Debug, Serialize)]
struct OllamaToolFunction<'a> {
    name: &'a str,
    description: &'a str,
    parameters: &'a serde_json::Value,
}

/// Ollama generation options
#[derive(Debug, Serialize)]
struct OllamaOptions {
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
}

/// Ollama streaming chunk response
#[derive(Debug, Deserialize)]
struct StreamChunkResponse {
    #[serde(default)]
    message: Option<StreamMessage>,
    #[serde(default)]
    done: bool,
    #[serde(default)]
    prompt_eval_count: Option<u32>,
    #[serde(default)]
    eval_count: Option<u32>,
    #[serde(default)]
    error: Option<String>,
}

/// Message in streaming response
#[derive(Debug, Deserialize)]
struct StreamMessage {
    #[serde(default)]
    content: String,
    #[serde(default)]
    tool_calls: Option<Vec<OllamaToolCall>>,
}

/// Ollama models list response
#[derive(Debug, Deserialize)]
struct ModelsResponse {
    models: Vec<ModelInfo>,
}

/// Model information
#[derive(Debug, Deserialize)]
struct ModelInfo {
    name: String,
}

/// Incremental decoder for the NDJSON chat stream
#[derive(Debug, Default)]
pub(crate) struct NdjsonDecoder {
    buffer: String,
    finished: bool,
}

impl NdjsonDecoder {
    /// Feed raw bytes, returning the events of every complete line
    pub(crate) fn push(&mut self, bytes: &[u8]) -> Vec<Result<ResponseEvent>> {
        self.buffer.push_str(&String::from_utf8_lossy(bytes));

        let mut events = Vec::new();
        while let Some(newline_pos) = self.buffer.find('\n') {
            let line: String = self.buffer.drain(..=newline_pos).collect();
            self.decode_line(line.trim(), &mut events);
        }
        events
    }

    /// Flush whatever is left in the buffer once the body ends
    ///
    /// A body that ends without a `done` line still yields `EndStream`.
    pub(crate) fn finish(&mut self) -> Vec<Result<ResponseEvent>> {
        let mut events = Vec::new();
        let rest = std::mem::take(&mut self.buffer);
        self.decode_line(rest.trim(), &mut events);
        if !self.finished {
            self.finished = true;
            events.push(Ok(ResponseEvent::EndStream { usage: None }));
        }
        events
    }

    fn decode_line(&mut self, line: &str, events: &mut Vec<Result<ResponseEvent>>) {
        if line.is_empty() || self.finished {
            return;
        }

        let chunk = match serde_json::from_str::<StreamChunkResponse>(line) {
            Ok(chunk) => chunk,
            Err(e) => {
                tracing::debug!("skipping undecodable stream line: {}: {}", e, line);
                return;
            }
        };

        if let Some(error) = chunk.error {
            self.finished = true;
            events.push(Err(WingmanError::transport(error)));
            return;
        }

        if let Some(msg) = chunk.message {
            if !msg.content.is_empty() {
                events.push(Ok(ResponseEvent::AssistantText(msg.content)));
            }
            for call in msg.tool_calls.unwrap_or_default() {
                let id = call
                    .id
                    .unwrap_or_else(|| format!("tooluse_{}", uuid::Uuid::new_v4().simple()));
                events.push(Ok(ResponseEvent::ToolUse(ToolUse::new(
                    id,
                    call.function.name,
                    call.function.arguments,
                ))));
            }
        }

        if chunk.done {
            self.finished = true;
            let usage = match (chunk.prompt_eval_count, chunk.eval_count) {
                (Some(prompt), Some(completion)) => Some(TokenUsage::new(prompt, completion)),
                _ => None,
            };
            events.push(Ok(ResponseEvent::EndStream { usage }));
        }
    }
}

impl OllamaClient {
    /// Create a new Ollama client from configuration
    pub fn from_config(config: &Config) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.model.timeout_secs))
            .build()?;

        Ok(Self {
            client,
            base_url: config.model_url(),
        })
    }

    /// Create a client with custom base URL
    pub fn with_base_url(base_url: impl Into<String>) -> Result<Self> {
        let client = Client::builder().timeout(Duration::from_secs(120)).build()?;

        Ok(Self {
            client,
            base_url: base_url.into(),
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Convert a conversation to Ollama format
    ///
    /// Ollama labels tool results by function name, so each result is matched
    /// to the assistant tool call that carried its id.
    fn to_ollama_messages(messages: &[Message]) -> Vec<OllamaMessage> {
        let mut tool_names: HashMap<&str, &str> = HashMap::new();
        let mut out = Vec::with_capacity(messages.len());
        for msg in messages {
            out.extend(Self::to_ollama_message(msg, &tool_names));
            for tool_use in &msg.tool_uses {
                tool_names.insert(&tool_use.id, &tool_use.name);
            }
        }
        out
    }

    /// Tool results become one `tool` message each, ahead of any user text.
    fn to_ollama_message(msg: &Message, tool_names: &HashMap<&str, &str>) -> Vec<OllamaMessage> {
        let mut out = Vec::new();

        for result in &msg.tool_results {
            let tool_name = tool_names.get(result.tool_use_id.as_str()).map(|n| n.to_string());
            if tool_name.is_none() {
                tracing::debug!(id = %result.tool_use_id, "tool result without a matching tool call");
            }
            out.push(OllamaMessage {
                role: "tool".to_string(),
                content: result.text(),
                tool_calls: None,
                tool_name,
            });
        }

        if msg.tool_results.is_empty() || !msg.content.is_empty() {
            let tool_calls = if msg.tool_uses.is_empty() {
                None
            } else {
                Some(
                    msg.tool_uses
                        .iter()
                        .map(|tu| OllamaToolCall {
                            id: Some(tu.id.clone()),
                            function: OllamaFunction {
                                name: tu.name.clone(),
                                arguments: tu.args.clone(),
                            },
                        })
                        .collect(),
                )
            };

            out.push(OllamaMessage {
                role: msg.role.to_string(),
                content: msg.content.clone(),
                tool_calls,
                tool_name: None,
            });
        }

        out
    }

    fn to_ollama_tool(spec: &ToolSpec) -> OllamaTool<'_> {
        OllamaTool {
            tool_type: "function",
            function: OllamaToolFunction {
                name: &spec.name,
                description: &spec.description,
                parameters: &spec.input_schema,
            },
        }
    }

    fn connect_error(&self, e: reqwest::Error) -> WingmanError {
        if e.is_connect() {
            WingmanError::transport(format!(
                "Cannot connect to Ollama at {}. Is it running?",
                self.base_url
            ))
        } else {
            WingmanError::from(e)
        }
    }
}

#[async_trait]
impl ModelClient for OllamaClient {
    async fn send_messages(&self, request: &ConversationRequest) -> Result<ResponseStream> {
        let body = ChatRequest {
            model: &request.model,
            messages: Self::to_ollama_messages(&request.messages),
            tools: request.tools.iter().map(Self::to_ollama_tool).collect(),
            options: request.temperature.map(|temperature| OllamaOptions {
                temperature: Some(temperature),
            }),
            stream: true,
        };

        tracing::debug!(
            "sending chat request: {}",
            serde_json::to_string(&body).unwrap_or_default()
        );

        let response = self
            .client
            .post(format!("{}/api/chat", self.base_url))
            .json(&body)
            .send()
            .await
            .map_err(|e| self.connect_error(e))?;

        if !response.status().is_success() {
            let status = response.status();
            let error_text = response.text().await.unwrap_or_default();

            if status.as_u16() == 404 && error_text.contains("not found") {
                return Err(WingmanError::ModelNotFound(request.model.clone()));
            }

            return Err(WingmanError::transport(format!(
                "Ollama API error ({}): {}",
                status, error_text
            )));
        }

        let (tx, rx) = mpsc::channel(64);
        tokio::spawn(async move {
            let mut decoder = NdjsonDecoder::default();
            let mut bytes = response.bytes_stream();

            while let Some(chunk) = bytes.next().await {
                let events = match chunk {
                    Ok(chunk) => decoder.push(&chunk),
                    Err(e) => vec![Err(WingmanError::transport(format!("Stream error: {}", e)))],
                };
                for event in events {
                    let is_err = event.is_err();
                    if tx.send(event).await.is_err() || is_err {
                        // receiver dropped or stream failed
                        return;
                    }
                }
            }

            for event in decoder.finish() {
                if tx.send(event).await.is_err() {
                    return;
                }
            }
        });

        Ok(Box::pin(ReceiverStream::new(rx)))
    }

    async fn list_models(&self) -> Result<Vec<String>> {
        let response = self
            .client
            .get(format!("{}/api/tags", self.base_url))
            .send()
            .await
            .map_err(|e| self.connect_error(e))?;

        if !response.status().is_success() {
            return Err(WingmanError::transport("Failed to list models"));
        }

        let models_response: ModelsResponse = response.json().await?;
        Ok(models_response.models.into_iter().map(|m| m.name).collect())
    }

    fn name(&self) -> &str {
        "ollama"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::ToolResult;
    use serde_json::json;

    fn ok_events(events: Vec<Result<ResponseEvent>>) -> Vec<ResponseEvent> {
        events.into_iter().map(|e| e.unwrap()).collect()
    }

    #[test]
    fn test_client_creation() {
        let client = OllamaClient::from_config(&Config::default()).unwrap();
        assert!(client.base_url().starts_with("http://"));
    }

    #[test]
    fn test_decoder_handles_split_lines() {
        let mut decoder = NdjsonDecoder::default();
        let first = decoder.push(br#"{"message":{"content":"Hel"#);
        assert!(first.is_empty());

        let events = ok_events(decoder.push(b"lo\"},\"done\":false}\n"));
        assert_eq!(events, vec![ResponseEvent::AssistantText("Hello".into())]);

        let events = ok_events(decoder.push(
            b"{\"message\":{\"content\":\"\"},\"done\":true,\"prompt_eval_count\":3,\"eval_count\":4}\n",
        ));
        assert_eq!(
            events,
            vec![ResponseEvent::EndStream {
                usage: Some(TokenUsage::new(3, 4))
            }]
        );
        assert!(decoder.finish().is_empty());
    }

    #[test]
    fn test_decoder_assigns_tool_ids() {
        let mut decoder = NdjsonDecoder::default();
        let line = json!({
            "message": {
                "content": "",
                "tool_calls": [{"function": {"name": "fs_read", "arguments": {"path": "/tmp"}}}]
            },
            "done": false
        })
        .to_string()
            + "\n";

        let events = ok_events(decoder.push(line.as_bytes()));
        match &events[0] {
            ResponseEvent::ToolUse(tool_use) => {
                assert_eq!(tool_use.name, "fs_read");
                assert!(tool_use.id.starts_with("tooluse_"));
                assert_eq!(tool_use.args["path"], "/tmp");
            }
            other => panic!("unexpected event: {:?}", other),
        }
    }

    #[test]
    fn test_decoder_finish_without_done() {
        let mut decoder = NdjsonDecoder::default();
        let events = ok_events(decoder.push(b"{\"message\":{\"content\":\"hi\"}}"));
        assert!(events.is_empty());

        let events = ok_events(decoder.finish());
        assert_eq!(
            events,
            vec![
                ResponseEvent::AssistantText("hi".into()),
                ResponseEvent::EndStream { usage: None }
            ]
        );
    }

    #[test]
    fn test_decoder_surfaces_backend_error() {
        let mut decoder = NdjsonDecoder::default();
        let events = decoder.push(b"{\"error\":\"model crashed\"}\n");
        assert!(matches!(events[0], Err(WingmanError::Transport(_))));
    }

    #[test]
    fn test_tool_results_become_tool_messages() {
        let messages = vec![
            Message::assistant("").with_tool_uses(vec![
                ToolUse::new("tooluse_a", "fs_read", json!({"path": "."})),
                ToolUse::new("tooluse_b", "execute_bash", json!({"command": "ls"})),
            ]),
            Message::user("").with_tool_results(vec![
                ToolResult::success_text("tooluse_a", "ok"),
                ToolResult::error_text("tooluse_b", "failed"),
            ]),
        ];
        let converted = OllamaClient::to_ollama_messages(&messages);
        assert_eq!(converted.len(), 3);
        assert!(converted[1..].iter().all(|m| m.role == "tool"));
        assert_eq!(converted[1].tool_name.as_deref(), Some("fs_read"));
        assert_eq!(converted[2].tool_name.as_deref(), Some("execute_bash"));
        assert_eq!(converted[2].content, "failed");
    }

    #[test]
    fn test_unmatched_tool_result_has_no_name() {
        let messages =
            vec![Message::user("").with_tool_results(vec![ToolResult::success_text("tooluse_abc", "ok")])];
        let converted = OllamaClient::to_ollama_messages(&messages);
        assert_eq!(converted[0].tool_name, None);
    }

    #[test]
    fn test_assistant_tool_uses_become_tool_calls() {
        let msg = Message::assistant("checking")
            .with_tool_uses(vec![ToolUse::new("t1", "fs_read", json!({"path": "."}))]);
        let converted = OllamaClient::to_ollama_messages(&[msg]);
        assert_eq!(converted.len(), 1);
        assert_eq!(converted[0].role, "assistant");
        assert_eq!(converted[0].tool_calls.as_ref().unwrap()[0].function.name, "fs_read");
    }
}
