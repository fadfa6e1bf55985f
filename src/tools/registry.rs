//! Tool manager - turns model tool uses into validated tools
//!
//! Owns the built-in tool specs and one client per MCP server. Custom tools
//! are exposed to the model as `{server}___{tool}`.

use std::collections::hash_map::DefaultHasher;
use std::collections::HashMap;
use std::hash::{Hash, Hasher};
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use convert_case::{Case, Casing};
use futures::StreamExt;
use serde::{Deserialize, Serialize};

use super::custom_tool::CALL_TOOL_METHOD;
use super::{CustomTool, CustomToolClient, CustomToolConfig, ExecuteBash, FsRead, FsWrite, Tool};
use crate::core::config::McpConfig;
use crate::core::{Result, ToolResult, ToolSpec, ToolUse, WingmanError};

/// Separates server and tool names in namespaced custom tools
pub const NAMESPACE_DELIMITER: &str = "___";

const VALID_SERVER_NAME: &str = r"^[a-zA-Z][a-zA-Z0-9_]*$";

const BUILTIN_TOOL_INDEX: &str = include_str!("tool_index.json");

/// MCP servers to launch, keyed by server name
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct McpServerConfig {
    #[serde(default)]
    pub mcp_servers: HashMap<String, CustomToolConfig>,
}

impl McpServerConfig {
    /// Merge the global and workspace files; workspace entries win
    ///
    /// Missing files are skipped. Malformed JSON is an error.
    pub fn load_config(global: &Path, workspace: &Path) -> Result<Self> {
        let mut merged = Self::load_from_file(global)?.unwrap_or_default();

        if let Some(workspace_config) = Self::load_from_file(workspace)? {
            for (name, config) in workspace_config.mcp_servers {
                if merged.mcp_servers.contains_key(&name) {
                    tracing::warn!(
                        server = %name,
                        "MCP server defined in both global and workspace config, using workspace"
                    );
                }
                merged.mcp_servers.insert(name, config);
            }
        }

        Ok(merged)
    }

    fn load_from_file(path: &Path) -> Result<Option<Self>> {
        if !path.exists() {
            tracing::debug!(path = %path.display(), "no MCP config");
            return Ok(None);
        }
        let contents = std::fs::read_to_string(path)?;
        let config = serde_json::from_str(&contents).map_err(|e| {
            WingmanError::config(format!("invalid MCP config {}: {}", path.display(), e))
        })?;
        Ok(Some(config))
    }
}

/// Dispatch table for built-in and MCP-backed tools
#[derive(Debug, Default)]
pub struct ToolManager {
    clients: HashMap<String, Arc<CustomToolClient>>,
    /// Every loaded spec, keyed by the name the model uses
    specs: HashMap<String, ToolSpec>,
}

impl ToolManager {
    /// Start every configured MCP server
    ///
    /// Servers that fail to start are logged and skipped.
    pub async fn from_configs(config: McpServerConfig, settings: &McpConfig) -> Result<Self> {
        let default_timeout = Duration::from_secs(settings.request_timeout_secs);
        let regex = regex::Regex::new(VALID_SERVER_NAME)
            .map_err(|e| WingmanError::config(e.to_string()))?;

        let mut servers: Vec<(String, CustomToolConfig)> = config.mcp_servers.into_iter().collect();
        servers.sort_by(|a, b| a.0.cmp(&b.0));

        let mut manager = Self::default();
        let mut named = Vec::with_capacity(servers.len());
        let mut taken: Vec<String> = Vec::new();
        for (orig, server_config) in servers {
            let mut name = sanitize_server_name(&orig, &regex);
            while taken.contains(&name) {
                name.push('1');
            }
            if name != orig {
                tracing::info!(server = %orig, renamed = %name, "renamed MCP server");
            }
            taken.push(name.clone());
            named.push((name, server_config));
        }

        let results: Vec<(String, Result<CustomToolClient>)> = futures::stream::iter(named)
            .map(|(name, server_config)| async move {
                let client =
                    CustomToolClient::connect(name.clone(), &server_config, default_timeout).await;
                (name, client)
            })
            .buffer_unordered(settings.init_concurrency.max(1))
            .collect()
            .await;

        for (name, result) in results {
            match result {
                Ok(client) => {
                    manager.clients.insert(name, Arc::new(client));
                }
                Err(e) => tracing::warn!(server = %name, "failed to start MCP server: {}", e),
            }
        }

        Ok(manager)
    }

    /// Register an already-connected client, returning the name it was stored under
    pub fn add_client(&mut self, name: &str, client: CustomToolClient) -> String {
        let mut name = name.to_string();
        while self.clients.contains_key(&name) {
            name.push('1');
        }
        self.clients.insert(name.clone(), Arc::new(client));
        name
    }

    pub fn server_names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.clients.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }

    /// Load the built-in specs and list every server's tools
    pub async fn load_tools(&mut self) -> Result<Vec<ToolSpec>> {
        let mut specs: HashMap<String, ToolSpec> = serde_json::from_str(BUILTIN_TOOL_INDEX)?;

        let listings = futures::future::join_all(self.clients.iter().map(|(name, client)| {
            let name = name.clone();
            let client = client.clone();
            async move { (name, client.list_tools().await) }
        }))
        .await;

        for (server, listing) in listings {
            match listing {
                Ok(tools) => {
                    for mut spec in tools {
                        spec.name = format!("{}{}{}", server, NAMESPACE_DELIMITER, spec.name);
                        specs.insert(spec.name.clone(), spec);
                    }
                }
                Err(e) => tracing::warn!(server = %server, "failed to list MCP tools: {}", e),
            }
        }

        self.specs = specs;
        Ok(self.tool_specs())
    }

    /// Loaded specs sorted by name
    pub fn tool_specs(&self) -> Vec<ToolSpec> {
        let mut specs: Vec<ToolSpec> = self.specs.values().cloned().collect();
        specs.sort_by(|a, b| a.name.cmp(&b.name));
        specs
    }

    /// Resolve a model tool use into a tool, or an error result to send back
    pub fn get_tool_from_tool_use(&self, tool_use: ToolUse) -> std::result::Result<Tool, ToolResult> {
        let ToolUse { id, name, args } = tool_use;
        let invalid = |e: String| {
            ToolResult::error_text(&id, format!("Failed to validate tool parameters: {}", e))
        };

        match name.as_str() {
            "fs_read" => serde_json::from_value::<FsRead>(args)
                .map(Tool::FsRead)
                .map_err(|e| invalid(e.to_string())),
            "fs_write" => serde_json::from_value::<FsWrite>(args)
                .map(Tool::FsWrite)
                .map_err(|e| invalid(e.to_string())),
            "execute_bash" => serde_json::from_value::<ExecuteBash>(args)
                .map(Tool::ExecuteBash)
                .map_err(|e| invalid(e.to_string())),
            full_name => {
                let (server, tool) = full_name
                    .split_once(NAMESPACE_DELIMITER)
                    .ok_or_else(|| ToolResult::error_text(&id, format!("No tool with name {} found", full_name)))?;
                let client = self.clients.get(server).ok_or_else(|| {
                    ToolResult::error_text(&id, format!("No MCP server named {} found", server))
                })?;

                if let Some(spec) = self.specs.get(full_name) {
                    let missing: Vec<&str> = spec
                        .required_args()
                        .into_iter()
                        .filter(|arg| args.get(arg).is_none())
                        .collect();
                    if !missing.is_empty() {
                        return Err(invalid(format!("missing required arguments: {}", missing.join(", "))));
                    }
                }

                Ok(Tool::Custom(CustomTool {
                    name: tool.to_string(),
                    full_name: full_name.to_string(),
                    client: client.clone(),
                    method: CALL_TOOL_METHOD.to_string(),
                    params: if args.is_null() { None } else { Some(args) },
                }))
            }
        }
    }
}

/// Produce a server name usable as a namespace prefix
///
/// The name is always snake cased first; only what is still invalid after
/// that is filtered.
fn sanitize_server_name(orig: &str, regex: &regex::Regex) -> String {
    let snake = orig.to_case(Case::Snake);
    if regex.is_match(&snake) && !snake.contains(NAMESPACE_DELIMITER) {
        return snake;
    }

    let mut sanitized: String = snake
        .chars()
        .filter(|c| c.is_ascii_alphanumeric() || *c == '_')
        .skip_while(|c| !c.is_ascii_alphabetic())
        .collect();
    while sanitized.contains(NAMESPACE_DELIMITER) {
        sanitized = sanitized.replace(NAMESPACE_DELIMITER, "_");
    }

    if sanitized.is_empty() {
        let mut hasher = DefaultHasher::new();
        orig.hash(&mut hasher);
        format!("server_{:x}", hasher.finish())
    } else {
        sanitized
    }
}
