//! REPL slash commands

use crate::agent::Session;
use crate::core::Result;

/// Result of parsing a line of input
#[derive(Debug, PartialEq)]
pub enum CommandResult {
    /// Not a command, send it to the model
    Continue(String),
    /// Command was handled, show output
    Handled(String),
    /// Exit the REPL
    Exit,
    /// History was cleared
    Clear,
}

/// Handle a slash command, or pass the input through
pub async fn handle_command(input: &str, session: &mut Session) -> Result<CommandResult> {
    let input = input.trim();
    let Some(command) = input.strip_prefix('/') else {
        return Ok(CommandResult::Continue(input.to_string()));
    };

    let mut parts = command.splitn(2, ' ');
    let cmd = parts.next().unwrap_or("").to_lowercase();
    let args = parts.next().map(str::trim).unwrap_or("");

    match cmd.as_str() {
        "quit" | "exit" | "q" => Ok(CommandResult::Exit),

        "clear" => {
            session.clear();
            Ok(CommandResult::Clear)
        }

        "help" | "?" => Ok(CommandResult::Handled(help_text())),

        "compact" => match session.compact().await? {
            Some(summary) => Ok(CommandResult::Handled(format!(
                "Conversation compacted. Summary:\n{}",
                summary
            ))),
            None => Ok(CommandResult::Handled("Nothing to compact yet.".to_string())),
        },

        "tools" => Ok(CommandResult::Handled(handle_tools_command(args, session))),

        "models" => {
            let models = session.client().list_models().await?;
            Ok(CommandResult::Handled(format!(
                "Available models:\n{}\n\nCurrent: {}",
                models
                    .iter()
                    .map(|m| format!("  - {}", m))
                    .collect::<Vec<_>>()
                    .join("\n"),
                session.model_name()
            )))
        }

        "status" => {
            let config = session.config();
            let conversation = session.conversation();
            Ok(CommandResult::Handled(format!(
                "Wingman Status:\n\
                 ─────────────────────────────\n\
                 Model:        {} ({})\n\
                 Endpoint:     {}\n\
                 Conversation: {}\n\
                 History:      {} / {} exchanges\n\
                 Summary:      {}\n\
                 Tools:        {}\n\
                 Streaming:    {}",
                session.model_name(),
                session.client().name(),
                config.model_url(),
                conversation.conversation_id(),
                conversation.history_len(),
                config.conversation.max_history_pairs,
                if conversation.summary().is_some() { "yes" } else { "no" },
                session.tool_specs().len(),
                if config.streaming.enabled { "on" } else { "off" }
            )))
        }

        _ => Ok(CommandResult::Handled(format!(
            "Unknown command: /{}. Type /help for available commands.",
            cmd
        ))),
    }
}

fn handle_tools_command(args: &str, session: &mut Session) -> String {
    let mut parts = args.splitn(2, ' ');
    let sub = parts.next().unwrap_or("").to_lowercase();
    let name = parts.next().map(str::trim).unwrap_or("");

    match sub.as_str() {
        "" => list_tools(session),
        "trust" | "untrust" if name.is_empty() => format!("Usage: /tools {} <name>", sub),
        "trust" => {
            if !session.tool_specs().iter().any(|s| s.name == name) {
                return format!("No tool named {}", name);
            }
            session.tool_permissions_mut().trust(name);
            format!("{} will run without asking.", name)
        }
        "untrust" => {
            session.tool_permissions_mut().untrust(name);
            format!("{} will ask before running.", name)
        }
        "trustall" => {
            session.tool_permissions_mut().trust_all();
            "All tools will run without asking.".to_string()
        }
        "reset" => {
            session.tool_permissions_mut().reset();
            "Tool permissions reset to defaults.".to_string()
        }
        other => format!(
            "Unknown tools subcommand: {}. Available: trust, untrust, trustall, reset",
            other
        ),
    }
}

fn list_tools(session: &Session) -> String {
    let permissions = session.tool_permissions();
    let mut out = String::from("Tools:\n");
    for spec in session.tool_specs() {
        let status = if permissions.is_trusted(&spec.name) {
            "trusted"
        } else {
            "per-request"
        };
        out.push_str(&format!("  {:<32} {}\n", spec.name, status));
    }
    out.push_str("\nRead-only commands and fs_read never ask.");
    out
}

fn help_text() -> String {
    r#"Wingman Commands:
─────────────────────────────────────────────
  /help                  Show this help message
  /quit                  Exit Wingman
  /clear                 Clear conversation history
  /compact               Summarize history to save context
  /status                Show current configuration
  /models                List models on the backend

  /tools                 List tools and their permissions
  /tools trust <name>    Run a tool without asking
  /tools untrust <name>  Ask before running a tool
  /tools trustall        Run every tool without asking
  /tools reset           Restore default permissions

When a tool needs approval, answer y (yes), n (no) or t (trust).
─────────────────────────────────────────────"#
        .to_string()
}
