//! execute_bash - run a shell command in the working directory

use std::process::Stdio;

use serde::Deserialize;

use super::{truncate_output, InvokeContext, InvokeOutput};
#[cfg(test)]
use super::OutputKind;
use crate::core::{Result, WingmanError};

/// Commands that only read state and may run without approval
const READONLY_COMMANDS: &[&str] = &["ls", "cat", "echo", "pwd", "which", "head", "tail", "grep", "find"];

/// Characters that pipe, redirect, chain or substitute
const DANGEROUS_PATTERNS: &[&str] = &["|", ">", "<", ";", "&", "`", "$(", "\n"];

/// `find` flags that run, delete or write to a file
const FIND_MUTATING_FLAGS: &[&str] = &[
    "-exec", "-execdir", "-delete", "-ok", "-okdir", "-fprint", "-fprint0", "-fprintf", "-fls",
];

#[derive(Debug, Clone, Deserialize)]
pub struct ExecuteBash {
    pub command: String,
}

impl ExecuteBash {
    pub fn requires_acceptance(&self) -> bool {
        if DANGEROUS_PATTERNS.iter().any(|p| self.command.contains(p)) {
            return true;
        }
        let args: Vec<&str> = self.command.split_whitespace().collect();
        let Some(program) = args.first() else {
            return true;
        };
        if !READONLY_COMMANDS.contains(program) {
            return true;
        }
        if *program == "find" && args.iter().any(|a| FIND_MUTATING_FLAGS.contains(a)) {
            return true;
        }
        false
    }

    pub fn validate(&self) -> Result<()> {
        if self.command.trim().is_empty() {
            return Err(WingmanError::tool("Command must not be empty"));
        }
        Ok(())
    }

    pub async fn invoke(&self, ctx: &InvokeContext) -> Result<InvokeOutput> {
        tracing::info!(command = %self.command, "executing shell command");

        let output = tokio::process::Command::new("bash")
            .arg("-c")
            .arg(&self.command)
            .current_dir(&ctx.cwd)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .output()
            .await
            .map_err(|e| WingmanError::with_context(format!("failed to spawn: {}", self.command), e))?;

        let stdout = String::from_utf8_lossy(&output.stdout);
        let stderr = String::from_utf8_lossy(&output.stderr);
        let exit_status = output
            .status
            .code()
            .map(|c| c.to_string())
            .unwrap_or_else(|| "terminated by signal".to_string());

        tracing::debug!(%exit_status, "shell command finished");

        Ok(InvokeOutput::json(serde_json::json!({
            "exit_status": exit_status,
            "stdout": truncate_output(&stdout, ctx.max_output_bytes),
            "stderr": truncate_output(&stderr, ctx.max_output_bytes),
        })))
    }
}
