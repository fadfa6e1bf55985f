//! Draining a response stream into a complete assistant response

use futures::StreamExt;

use crate::core::{Result, TokenUsage, ToolUse};
use crate::llm::traits::{ResponseEvent, ResponseStream};

/// A fully received assistant response
#[derive(Debug, Clone, Default)]
pub struct AssistantResponse {
    /// Id assigned to this assistant message
    pub message_id: String,
    /// Concatenated assistant text
    pub text: String,
    /// Tool uses in the order the model proposed them
    pub tool_uses: Vec<ToolUse>,
    /// Token usage, if the backend reported it
    pub usage: Option<TokenUsage>,
}

impl AssistantResponse {
    pub fn has_tool_uses(&self) -> bool {
        !self.tool_uses.is_empty()
    }
}

/// Collect a stream, calling `on_text` for each text fragment as it arrives
///
/// Events after `EndStream` are ignored.
pub async fn collect_response(
    mut stream: ResponseStream,
    mut on_text: impl FnMut(&str),
) -> Result<AssistantResponse> {
    let mut response = AssistantResponse {
        message_id: uuid::Uuid::new_v4().to_string(),
        ..Default::default()
    };

    while let Some(event) = stream.next().await {
        match event? {
            ResponseEvent::AssistantText(text) => {
                if !text.is_empty() {
                    on_text(&text);
                    response.text.push_str(&text);
                }
            }
            ResponseEvent::ToolUse(tool_use) => {
                tracing::debug!(tool = %tool_use.name, id = %tool_use.id, "received tool use");
                response.tool_uses.push(tool_use);
            }
            ResponseEvent::EndStream { usage } => {
                response.usage = usage;
                break;
            }
        }
    }

    Ok(response)
}
