//! Custom tools served by MCP servers over stdio
//!
//! Each server is a child process speaking newline-delimited JSON-RPC 2.0.
//! Responses are matched to requests through a map of pending waiters fed by
//! a background reader task.

use std::collections::HashMap;
use std::process::Stdio;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncWrite, AsyncWriteExt, BufReader};
use tokio::sync::oneshot;
use tokio::task::JoinHandle;

use super::InvokeOutput;
use crate::core::{Result, ToolSpec, WingmanError};

const PROTOCOL_VERSION: &str = "2024-11-05";

/// JSON-RPC method that runs a tool
pub const CALL_TOOL_METHOD: &str = "tools/call";

/// How to launch an MCP server
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CustomToolConfig {
    pub command: String,
    #[serde(default)]
    pub args: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub env: Option<HashMap<String, String>>,
    /// Per-request timeout; falls back to the global MCP setting
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout_secs: Option<u64>,
}

#[derive(Debug, Serialize)]
struct JsonRpcRequest<'a> {
    jsonrpc: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    id: Option<u64>,
    method: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    params: Option<Value>,
}

#[derive(Debug, Deserialize)]
struct JsonRpcResponse {
    #[serde(default)]
    result: Option<Value>,
    #[serde(default)]
    error: Option<JsonRpcError>,
}

#[derive(Debug, Deserialize)]
struct JsonRpcError {
    code: i64,
    message: String,
}

#[derive(Debug, Deserialize)]
struct McpToolDescriptor {
    name: String,
    #[serde(default)]
    description: Option<String>,
    #[serde(rename = "inputSchema", default)]
    input_schema: Option<Value>,
}

type PendingMap = Arc<Mutex<HashMap<u64, oneshot::Sender<JsonRpcResponse>>>>;

/// JSON-RPC client for one MCP server
pub struct CustomToolClient {
    server_name: String,
    writer: tokio::sync::Mutex<Box<dyn AsyncWrite + Unpin + Send>>,
    pending: PendingMap,
    next_id: AtomicU64,
    timeout: Duration,
    reader_task: JoinHandle<()>,
    _child: Option<tokio::process::Child>,
}

impl std::fmt::Debug for CustomToolClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CustomToolClient")
            .field("server_name", &self.server_name)
            .field("timeout", &self.timeout)
            .finish_non_exhaustive()
    }
}

impl Drop for CustomToolClient {
    fn drop(&mut self) {
        self.reader_task.abort();
    }
}

impl CustomToolClient {
    /// Spawn the server process and complete the initialize handshake
    pub async fn connect(
        server_name: impl Into<String>,
        config: &CustomToolConfig,
        default_timeout: Duration,
    ) -> Result<Self> {
        let server_name = server_name.into();
        tracing::info!(server = %server_name, command = %config.command, "starting MCP server");

        let mut command = tokio::process::Command::new(&config.command);
        command
            .args(&config.args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        if let Some(env) = &config.env {
            command.envs(env);
        }

        let mut child = command.spawn().map_err(|e| {
            WingmanError::with_context(format!("failed to spawn MCP server '{}'", server_name), e)
        })?;

        let stdin = child
            .stdin
            .take()
            .ok_or_else(|| WingmanError::mcp(format!("{}: stdin unavailable", server_name)))?;
        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| WingmanError::mcp(format!("{}: stdout unavailable", server_name)))?;

        if let Some(stderr) = child.stderr.take() {
            let name = server_name.clone();
            tokio::spawn(async move {
                let mut lines = BufReader::new(stderr).lines();
                while let Ok(Some(line)) = lines.next_line().await {
                    tracing::debug!(server = %name, "stderr: {}", line);
                }
            });
        }

        let mut client = Self::from_io(
            server_name,
            stdout,
            stdin,
            config
                .timeout_secs
                .map(Duration::from_secs)
                .unwrap_or(default_timeout),
        );
        client._child = Some(child);
        client.initialize().await?;
        Ok(client)
    }

    /// Build a client over an arbitrary byte stream pair
    pub fn from_io<R, W>(server_name: impl Into<String>, reader: R, writer: W, timeout: Duration) -> Self
    where
        R: AsyncRead + Unpin + Send + 'static,
        W: AsyncWrite + Unpin + Send + 'static,
    {
        let server_name = server_name.into();
        let pending: PendingMap = Arc::new(Mutex::new(HashMap::new()));
        let reader_task = tokio::spawn(read_messages(server_name.clone(), reader, pending.clone()));

        Self {
            server_name,
            writer: tokio::sync::Mutex::new(Box::new(writer)),
            pending,
            next_id: AtomicU64::new(0),
            timeout,
            reader_task,
            _child: None,
        }
    }

    pub fn server_name(&self) -> &str {
        &self.server_name
    }

    /// Send `initialize` followed by `notifications/initialized`
    pub async fn initialize(&self) -> Result<Value> {
        let params = serde_json::json!({
            "protocolVersion": PROTOCOL_VERSION,
            "capabilities": {},
            "clientInfo": {
                "name": "wingman",
                "version": env!("CARGO_PKG_VERSION"),
            },
        });
        let result = self.request("initialize", Some(params)).await?;
        self.notify("notifications/initialized", None).await?;
        tracing::debug!(server = %self.server_name, "MCP server initialized");
        Ok(result)
    }

    /// List every tool the server offers, following pagination cursors
    pub async fn list_tools(&self) -> Result<Vec<ToolSpec>> {
        let mut specs = Vec::new();
        let mut cursor: Option<String> = None;

        loop {
            let params = cursor.as_ref().map(|c| serde_json::json!({ "cursor": c }));
            let result = self.request("tools/list", params).await?;

            let tools = result
                .get("tools")
                .cloned()
                .unwrap_or_else(|| Value::Array(Vec::new()));
            let descriptors: Vec<McpToolDescriptor> = serde_json::from_value(tools)?;
            specs.extend(descriptors.into_iter().map(|d| ToolSpec {
                name: d.name,
                description: d.description.unwrap_or_default(),
                input_schema: d
                    .input_schema
                    .unwrap_or_else(|| serde_json::json!({ "type": "object" })),
            }));

            cursor = result
                .get("nextCursor")
                .and_then(|c| c.as_str())
                .map(str::to_string);
            if cursor.is_none() {
                break;
            }
        }

        tracing::debug!(server = %self.server_name, count = specs.len(), "listed MCP tools");
        Ok(specs)
    }

    async fn request(&self, method: &str, params: Option<Value>) -> Result<Value> {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let (tx, rx) = oneshot::channel();
        lock(&self.pending).insert(id, tx);

        let message = JsonRpcRequest {
            jsonrpc: "2.0",
            id: Some(id),
            method,
            params,
        };
        if let Err(e) = self.write_message(&message).await {
            lock(&self.pending).remove(&id);
            return Err(e);
        }

        match tokio::time::timeout(self.timeout, rx).await {
            Ok(Ok(response)) => match response.error {
                Some(error) => Err(WingmanError::mcp(format!(
                    "{}: {} failed ({}): {}",
                    self.server_name, method, error.code, error.message
                ))),
                None => Ok(response.result.unwrap_or(Value::Null)),
            },
            Ok(Err(_)) => Err(WingmanError::mcp(format!(
                "{}: connection closed while waiting for {}",
                self.server_name, method
            ))),
            Err(_) => {
                lock(&self.pending).remove(&id);
                Err(WingmanError::mcp(format!(
                    "{}: {} timed out after {}s",
                    self.server_name,
                    method,
                    self.timeout.as_secs()
                )))
            }
        }
    }

    async fn notify(&self, method: &str, params: Option<Value>) -> Result<()> {
        let message = JsonRpcRequest {
            jsonrpc: "2.0",
            id: None,
            method,
            params,
        };
        self.write_message(&message).await
    }

    async fn write_message(&self, message: &JsonRpcRequest<'_>) -> Result<()> {
        let mut line = serde_json::to_string(message)?;
        line.push('\n');
        let mut writer = self.writer.lock().await;
        writer.write_all(line.as_bytes()).await?;
        writer.flush().await?;
        Ok(())
    }
}

fn lock<T>(mutex: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

async fn read_messages<R>(server_name: String, reader: R, pending: PendingMap)
where
    R: AsyncRead + Unpin + Send + 'static,
{
    let mut lines = BufReader::new(reader).lines();
    loop {
        let line = match lines.next_line().await {
            Ok(Some(line)) => line,
            Ok(None) => break,
            Err(e) => {
                tracing::warn!(server = %server_name, "failed to read from MCP server: {}", e);
                break;
            }
        };
        if line.trim().is_empty() {
            continue;
        }

        let value: Value = match serde_json::from_str(&line) {
            Ok(v) => v,
            Err(e) => {
                tracing::debug!(server = %server_name, "ignoring non-JSON line: {}", e);
                continue;
            }
        };

        let is_response = value.get("result").is_some() || value.get("error").is_some();
        match (value.get("id").and_then(Value::as_u64), is_response) {
            (Some(id), true) => {
                let waiter = lock(&pending).remove(&id);
                match (waiter, serde_json::from_value::<JsonRpcResponse>(value)) {
                    (Some(waiter), Ok(response)) => {
                        let _ = waiter.send(response);
                    }
                    (None, _) => {
                        tracing::warn!(server = %server_name, id, "response for unknown request")
                    }
                    (Some(_), Err(e)) => {
                        tracing::warn!(server = %server_name, id, "malformed response: {}", e)
                    }
                }
            }
            _ => {
                let method = value.get("method").and_then(Value::as_str).unwrap_or("?");
                tracing::debug!(server = %server_name, method, "MCP server message");
            }
        }
    }

    tracing::debug!(server = %server_name, "MCP server stream closed");
    lock(&pending).clear();
}

/// A tool call bound to the MCP server that serves it
#[derive(Debug, Clone)]
pub struct CustomTool {
    /// Name as known to the server
    pub name: String,
    /// Namespaced name the model used
    pub full_name: String,
    pub client: Arc<CustomToolClient>,
    /// JSON-RPC method used to run it
    pub method: String,
    pub params: Option<Value>,
}

impl CustomTool {
    pub fn describe(&self) -> String {
        let args = self
            .params
            .as_ref()
            .map(|p| p.to_string())
            .unwrap_or_else(|| "{}".to_string());
        format!(
            "Running {} from MCP server {} with arguments {}",
            self.name,
            self.client.server_name(),
            args
        )
    }

    pub async fn invoke(&self) -> Result<InvokeOutput> {
        let params = serde_json::json!({
            "name": self.name,
            "arguments": self.params.clone().unwrap_or_else(|| serde_json::json!({})),
        });
        let result = self.client.request(&self.method, Some(params)).await?;

        if result.get("isError").and_then(Value::as_bool).unwrap_or(false) {
            return Err(WingmanError::tool(content_text(&result)));
        }

        Ok(InvokeOutput::json(
            result.get("content").cloned().unwrap_or(result),
        ))
    }
}

/// Join the text blocks of an MCP `content` array
fn content_text(result: &Value) -> String {
    result
        .get("content")
        .and_then(Value::as_array)
        .map(|blocks| {
            blocks
                .iter()
                .filter_map(|b| b.get("text").and_then(Value::as_str))
                .collect::<Vec<_>>()
                .join("\n")
        })
        .filter(|text| !text.is_empty())
        .unwrap_or_else(|| result.to_string())
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::tools::OutputKind;
    use serde_json::json;

    /// Spawn an in-process MCP server answering from a fixed tool list
    pub(crate) fn fake_server(name: &str, tools: Value) -> CustomToolClient {
        let (client_io, server_io) = tokio::io::duplex(64 * 1024);
        let (client_read, client_write) = tokio::io::split(client_io);
        let (server_read, mut server_write) = tokio::io::split(server_io);

        tokio::spawn(async move {
            let mut lines = BufReader::new(server_read).lines();
            while let Ok(Some(line)) = lines.next_line().await {
                let request: Value = serde_json::from_str(&line).unwrap();
                let Some(id) = request.get("id").cloned() else {
                    continue;
                };
                let result = match request["method"].as_str().unwrap() {
                    "initialize" => json!({ "protocolVersion": PROTOCOL_VERSION, "capabilities": {} }),
                    "tools/list" => json!({ "tools": tools.clone() }),
                    "tools/call" => {
                        let tool = request["params"]["name"].as_str().unwrap();
                        if tool == "fail" {
                            json!({ "isError": true, "content": [{ "type": "text", "text": "it broke" }] })
                        } else {
                            let args = request["params"]["arguments"].to_string();
                            json!({ "content": [{ "type": "text", "text": format!("{} {}", tool, args) }] })
                        }
                    }
                    other => {
                        let response = json!({
                            "jsonrpc": "2.0",
                            "id": id,
                            "error": { "code": -32601, "message": format!("unknown method {}", other) }
                        });
                        let mut out = response.to_string();
                        out.push('\n');
                        server_write.write_all(out.as_bytes()).await.unwrap();
                        continue;
                    }
                };
                let mut out = json!({ "jsonrpc": "2.0", "id": id, "result": result }).to_string();
                out.push('\n');
                server_write.write_all(out.as_bytes()).await.unwrap();
            }
        });

        CustomToolClient::from_io(name, client_read, client_write, Duration::from_secs(5))
    }

    #[tokio::test]
    async fn test_initialize_and_list_tools() {
        let client = fake_server(
            "demo",
            json!([
                { "name": "echo", "description": "Echo input", "inputSchema": { "type": "object", "required": ["text"] } },
                { "name": "bare" }
            ]),
        );
        client.initialize().await.unwrap();
        let tools = client.list_tools().await.unwrap();

        assert_eq!(tools.len(), 2);
        assert_eq!(tools[0].name, "echo");
        assert_eq!(tools[0].required_args(), vec!["text"]);
        assert_eq!(tools[1].description, "");
        assert_eq!(tools[1].input_schema["type"], "object");
    }

    #[tokio::test]
    async fn test_custom_tool_invoke() {
        let client = Arc::new(fake_server("demo", json!([])));
        let tool = CustomTool {
            name: "echo".into(),
            full_name: "demo___echo".into(),
            client: client.clone(),
            method: CALL_TOOL_METHOD.into(),
            params: Some(json!({ "text": "hi" })),
        };
        let output = tool.invoke().await.unwrap();
        let OutputKind::Json(content) = output.output else {
            panic!("expected json");
        };
        assert!(content[0]["text"].as_str().unwrap().contains("\"hi\""));

        let failing = CustomTool {
            name: "fail".into(),
            full_name: "demo___fail".into(),
            client,
            method: CALL_TOOL_METHOD.into(),
            params: None,
        };
        let err = failing.invoke().await.unwrap_err();
        assert!(err.to_string().contains("it broke"));
    }

    #[tokio::test]
    async fn test_error_response_is_mcp_error() {
        let client = fake_server("demo", json!([]));
        let err = client.request("resources/list", None).await.unwrap_err();
        assert!(matches!(err, WingmanError::Mcp(_)));
        assert!(err.to_string().contains("-32601"));
    }

    #[tokio::test]
    async fn test_closed_stream_fails_pending_request() {
        let (client_io, server_io) = tokio::io::duplex(1024);
        let (client_read, client_write) = tokio::io::split(client_io);
        drop(server_io);

        let client = CustomToolClient::from_io("gone", client_read, client_write, Duration::from_secs(5));
        assert!(client.list_tools().await.is_err());
    }

    #[test]
    fn test_config_parses_camel_case() {
        let config: CustomToolConfig = serde_json::from_value(json!({
            "command": "node",
            "args": ["server.js"],
            "env": { "TOKEN": "x" },
            "timeoutSecs": 30
        }))
        .unwrap();
        assert_eq!(config.timeout_secs, Some(30));
        assert_eq!(config.env.unwrap()["TOKEN"], "x");

        let minimal: CustomToolConfig = serde_json::from_value(json!({ "command": "srv" })).unwrap();
        assert!(minimal.args.is_empty());
        assert!(minimal.timeout_secs.is_none());
    }
}
