//! Interactive REPL for Wingman
//!
//! Provides the main user interaction loop.

use std::io::{self, BufRead, Write};

use async_trait::async_trait;

use crate::agent::{Approval, Approver, Session};
use crate::cli::commands::{handle_command, CommandResult};
use crate::core::{Result, ToolUse};

/// Interactive REPL (Read-Eval-Print Loop)
pub struct Repl {
    session: Session,
}

impl Repl {
    pub fn new(session: Session) -> Self {
        Self { session }
    }

    /// Run the REPL until /quit or end of input
    pub async fn run(&mut self) -> Result<()> {
        self.print_banner();

        let stdin = io::stdin();
        let mut stdout = io::stdout();

        loop {
            print!("You: ");
            stdout.flush()?;

            let mut input = String::new();
            match stdin.lock().read_line(&mut input) {
                Ok(0) => {
                    // EOF (Ctrl+D)
                    println!("\nGoodbye!");
                    break;
                }
                Ok(_) => {}
                Err(e) => {
                    eprintln!("Error reading input: {}", e);
                    continue;
                }
            }

            let input = input.trim();
            if input.is_empty() {
                continue;
            }

            match handle_command(input, &mut self.session).await {
                Ok(CommandResult::Exit) => {
                    println!("\nGoodbye!");
                    break;
                }
                Ok(CommandResult::Clear) => {
                    println!("Conversation cleared.\n");
                }
                Ok(CommandResult::Handled(output)) => {
                    println!("{}\n", output);
                }
                Ok(CommandResult::Continue(input)) => self.run_turn(&input).await,
                Err(e) => {
                    eprintln!("Command error: {}\n", e);
                }
            }
        }

        Ok(())
    }

    async fn run_turn(&mut self, input: &str) {
        println!("\nAssistant:");
        let result = self
            .session
            .process(input, |text| {
                print!("{}", text);
                let _ = io::stdout().flush();
            })
            .await;
        println!();

        match result {
            Ok(outcome) => {
                for execution in &outcome.tools_executed {
                    let status = if execution.success { "✓" } else { "✗" };
                    println!("  {} {}", status, execution.tool_name);
                }
                if outcome.stopped_early {
                    println!(
                        "\n[Stopped after {} tool rounds. Ask me to continue if needed.]",
                        outcome.tool_rounds
                    );
                }
                if let Some(usage) = outcome.usage {
                    tracing::debug!(
                        prompt = usage.prompt_tokens,
                        completion = usage.completion_tokens,
                        "turn token usage"
                    );
                }
                println!();
            }
            Err(e) => eprintln!("\nError: {}\n", e),
        }
    }

    fn print_banner(&self) {
        let config = self.session.config();
        println!("Wingman {}", env!("CARGO_PKG_VERSION"));
        println!("Model:    {} at {}", config.model.name, config.model_url());
        println!("Tools:    {}", self.session.tool_specs().len());
        println!();
        println!("Commands: /help, /tools, /compact, /status, /quit");
        println!("─────────────────────────────────────────────");
    }
}

/// Asks on the terminal before a tool runs
#[derive(Debug, Clone, Copy, Default)]
pub struct StdinApprover;

#[async_trait]
impl Approver for StdinApprover {
    async fn approve(&self, tool_use: &ToolUse, description: &str) -> Approval {
        println!("\n\nTool: {}", tool_use.name);
        println!("{}", description);
        print!("Allow this action? [y/n/t]: ");
        let _ = io::stdout().flush();

        let answer = tokio::task::spawn_blocking(|| {
            let mut line = String::new();
            io::stdin().lock().read_line(&mut line).map(|_| line)
        })
        .await;

        match answer {
            Ok(Ok(line)) => parse_approval(&line),
            Ok(Err(e)) => {
                tracing::warn!("failed to read approval: {}", e);
                Approval::No
            }
            Err(e) => {
                tracing::warn!("approval prompt task failed: {}", e);
                Approval::No
            }
        }
    }
}

/// Anything other than yes or trust is a no
pub fn parse_approval(answer: &str) -> Approval {
    match answer.trim().to_lowercase().as_str() {
        "y" | "yes" => Approval::Yes,
        "t" | "trust" => Approval::Trust,
        _ => Approval::No,
    }
}
