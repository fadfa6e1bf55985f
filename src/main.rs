//! Wingman - terminal AI assistant with tools
//!
//! Main entry point for the interactive application.

use std::sync::Arc;

use anyhow::Context;
use wingman::core::logging;
use wingman::llm::{ModelClient, OllamaClient};
use wingman::tools::{McpServerConfig, ToolManager};
use wingman::{Config, Repl, Session, StdinApprover};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = Config::load();
    logging::init(&config.logging);

    let client = OllamaClient::from_config(&config).context("failed to build model client")?;

    match client.list_models().await {
        Ok(models) if !models.iter().any(|m| m == &config.model.name) => {
            tracing::warn!(
                model = %config.model.name,
                "model not found on backend, pull it with `ollama pull {}`",
                config.model.name
            );
        }
        Ok(_) => {}
        Err(e) => {
            eprintln!(
                "Could not reach the model backend at {}: {}\nIs Ollama running?",
                config.model_url(),
                e
            );
            return Ok(());
        }
    }

    let tool_manager = if config.mcp.enabled {
        let servers = McpServerConfig::load_config(
            &config.global_mcp_config(),
            &config.workspace_mcp_config(),
        )?;
        tracing::info!(servers = servers.mcp_servers.len(), "loading MCP servers");
        ToolManager::from_configs(servers, &config.mcp).await?
    } else {
        ToolManager::default()
    };

    let session = Session::new(
        config,
        Arc::new(client),
        tool_manager,
        Box::new(StdinApprover),
    )
    .await?;

    let mut repl = Repl::new(session);
    repl.run().await?;

    Ok(())
}
