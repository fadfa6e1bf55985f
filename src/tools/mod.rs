//! Tools module - the tool dispatch table
//!
//! Built-in filesystem and shell tools, MCP-backed custom tools, the approval
//! gate, and the manager that turns model tool uses into validated tools.

pub mod custom_tool;
pub mod execute_bash;
pub mod fs_read;
pub mod fs_write;
pub mod permissions;
pub mod registry;

use std::path::{Path, PathBuf};

use crate::core::{Result, ToolResult};

pub use custom_tool::{CustomTool, CustomToolClient, CustomToolConfig};
pub use execute_bash::ExecuteBash;
pub use fs_read::FsRead;
pub use fs_write::FsWrite;
pub use permissions::ToolPermissions;
pub use registry::{McpServerConfig, ToolManager};

/// Settings shared by every tool invocation
#[derive(Debug, Clone)]
pub struct InvokeContext {
    /// Directory relative paths and commands resolve against
    pub cwd: PathBuf,
    /// Maximum bytes of command output kept per stream
    pub max_output_bytes: usize,
}

impl Default for InvokeContext {
    fn default() -> Self {
        Self {
            cwd: std::env::current_dir().unwrap_or_else(|_| PathBuf::from(".")),
            max_output_bytes: 100 * 1024,
        }
    }
}

impl InvokeContext {
    /// Expand `~` and resolve relative paths against the working directory
    pub fn resolve_path(&self, path: &str) -> PathBuf {
        let expanded = PathBuf::from(shellexpand::tilde(path).as_ref());
        if expanded.is_absolute() {
            expanded
        } else {
            self.cwd.join(expanded)
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum OutputKind {
    Text(String),
    Json(serde_json::Value),
}

/// Output of a successful tool invocation
#[derive(Debug, Clone, PartialEq)]
pub struct InvokeOutput {
    pub output: OutputKind,
}

impl InvokeOutput {
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            output: OutputKind::Text(text.into()),
        }
    }

    pub fn json(value: serde_json::Value) -> Self {
        Self {
            output: OutputKind::Json(value),
        }
    }

    /// Output rendered as a string
    pub fn as_text(&self) -> String {
        match &self.output {
            OutputKind::Text(text) => text.clone(),
            OutputKind::Json(value) => value.to_string(),
        }
    }

    /// Convert into the result fed back to the model
    pub fn into_tool_result(self, tool_use_id: &str) -> ToolResult {
        match self.output {
            OutputKind::Text(text) => ToolResult::success_text(tool_use_id, text),
            OutputKind::Json(value) => ToolResult::json(tool_use_id, value),
        }
    }
}

/// A validated, executable tool
#[derive(Debug, Clone)]
pub enum Tool {
    FsRead(FsRead),
    FsWrite(FsWrite),
    ExecuteBash(ExecuteBash),
    Custom(CustomTool),
}

impl Tool {
    /// Name the model used for this tool, as trusted by the approval gate
    pub fn name(&self) -> &str {
        match self {
            Tool::FsRead(_) => "fs_read",
            Tool::FsWrite(_) => "fs_write",
            Tool::ExecuteBash(_) => "execute_bash",
            Tool::Custom(custom) => &custom.full_name,
        }
    }

    /// Human-readable name
    pub fn display_name(&self) -> String {
        match self {
            Tool::FsRead(_) => "Read from filesystem".to_string(),
            Tool::FsWrite(_) => "Write to filesystem".to_string(),
            Tool::ExecuteBash(_) => "Execute shell command".to_string(),
            Tool::Custom(custom) => custom.name.clone(),
        }
    }

    /// Whether running this tool needs the user's approval
    pub fn requires_acceptance(&self) -> bool {
        match self {
            Tool::FsRead(_) => false,
            Tool::FsWrite(_) => true,
            Tool::ExecuteBash(bash) => bash.requires_acceptance(),
            Tool::Custom(_) => true,
        }
    }

    /// One-line summary shown when asking for approval
    pub fn describe(&self, ctx: &InvokeContext) -> String {
        match self {
            Tool::FsRead(read) => read.describe(ctx),
            Tool::FsWrite(write) => write.describe(ctx),
            Tool::ExecuteBash(bash) => format!("I will run: {}", bash.command),
            Tool::Custom(custom) => custom.describe(),
        }
    }

    /// Check the arguments against the environment before running
    pub async fn validate(&mut self, ctx: &InvokeContext) -> Result<()> {
        match self {
            Tool::FsRead(read) => read.validate(ctx).await,
            Tool::FsWrite(write) => write.validate(ctx).await,
            Tool::ExecuteBash(bash) => bash.validate(),
            Tool::Custom(_) => Ok(()),
        }
    }

    /// Run the tool
    pub async fn invoke(&self, ctx: &InvokeContext) -> Result<InvokeOutput> {
        match self {
            Tool::FsRead(read) => read.invoke(ctx).await,
            Tool::FsWrite(write) => write.invoke(ctx).await,
            Tool::ExecuteBash(bash) => bash.invoke(ctx).await,
            Tool::Custom(custom) => custom.invoke().await,
        }
    }
}

/// Truncate to at most `max_bytes`, cutting on a char boundary
pub(crate) fn truncate_output(text: &str, max_bytes: usize) -> String {
    if text.len() <= max_bytes {
        return text.to_string();
    }
    let mut end = max_bytes;
    while !text.is_char_boundary(end) {
        end -= 1;
    }
    format!("{}\n... (output truncated)", &text[..end])
}

pub(crate) fn display_path(path: &Path, ctx: &InvokeContext) -> String {
    path.strip_prefix(&ctx.cwd)
        .unwrap_or(path)
        .display()
        .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resolve_relative_path() {
        let ctx = InvokeContext {
            cwd: PathBuf::from("/work"),
            ..Default::default()
        };
        assert_eq!(ctx.resolve_path("src/lib.rs"), PathBuf::from("/work/src/lib.rs"));
        assert_eq!(ctx.resolve_path("/etc/hosts"), PathBuf::from("/etc/hosts"));
    }

    #[test]
    fn test_resolve_home_path() {
        let ctx = InvokeContext {
            cwd: PathBuf::from("/work"),
            ..Default::default()
        };
        let home = dirs::home_dir().unwrap();
        assert_eq!(ctx.resolve_path("~/notes.txt"), home.join("notes.txt"));
        assert_eq!(ctx.resolve_path("~"), home);
        // only a leading tilde is expanded
        assert_eq!(ctx.resolve_path("a/~b"), PathBuf::from("/work/a/~b"));
    }

    #[test]
    fn test_truncate_output_respects_char_boundary() {
        let text = "héllo";
        let truncated = truncate_output(text, 2);
        assert!(truncated.starts_with('h'));
        assert!(truncated.contains("truncated"));
        assert_eq!(truncate_output("short", 100), "short");
    }

    #[test]
    fn test_invoke_output_conversion() {
        let result = InvokeOutput::text("ok").into_tool_result("t1");
        assert_eq!(result.tool_use_id, "t1");
        assert!(!result.is_error());
    }
}
