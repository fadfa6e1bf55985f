//! Model benchmark tests
//!
//! Runs identical tasks against several local models. Needs a running Ollama.

use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::time::timeout;
use wingman::llm::ModelClient;
use wingman::tools::ToolManager;
use wingman::{Config, DenyApprover, OllamaClient, Session};

/// Result of a single benchmark run
#[derive(Debug)]
pub struct BenchmarkResult {
    pub model: String,
    pub success: bool,
    pub tool_rounds: usize,
    pub duration: Duration,
    pub tools_called: Vec<String>,
    pub error: Option<String>,
}

/// Benchmark harness for comparing models
pub struct ModelBenchmark {
    pub models: Vec<String>,
    pub timeout_secs: u64,
}

impl Default for ModelBenchmark {
    fn default() -> Self {
        Self::new(vec!["qwen3:8b".to_string(), "llama3.1:8b".to_string()])
    }
}

impl ModelBenchmark {
    pub fn new(models: Vec<String>) -> Self {
        Self {
            models,
            timeout_secs: 120,
        }
    }

    /// Run a task against all models and collect results
    pub async fn run_task(&self, task: &str) -> Vec<BenchmarkResult> {
        let mut results = Vec::new();
        for model in &self.models {
            println!("\n=== Testing model: {} ===", model);
            results.push(self.run_single(model, task).await);
        }
        results
    }

    async fn run_single(&self, model: &str, task: &str) -> BenchmarkResult {
        let failed = |error: String, duration: Duration| BenchmarkResult {
            model: model.to_string(),
            success: false,
            tool_rounds: 0,
            duration,
            tools_called: vec![],
            error: Some(error),
        };

        let mut config = Config::default();
        config.model.name = model.to_string();
        config.tools.max_tool_rounds = 5;

        let client = match OllamaClient::from_config(&config) {
            Ok(c) => c,
            Err(e) => return failed(format!("Client error: {}", e), Duration::ZERO),
        };
        match timeout(Duration::from_secs(30), client.list_models()).await {
            Ok(Ok(models)) if models.iter().any(|m| m == model) => {}
            Ok(Ok(_)) => return failed("Model not pulled".to_string(), Duration::ZERO),
            Ok(Err(e)) => return failed(format!("Init error: {}", e), Duration::ZERO),
            Err(_) => return failed("Initialization timeout".to_string(), Duration::ZERO),
        }

        // Read-only tools still run; anything that writes is refused
        let mut session = match Session::new(
            config,
            Arc::new(client),
            ToolManager::default(),
            Box::new(DenyApprover),
        )
        .await
        {
            Ok(s) => s,
            Err(e) => return failed(format!("Session error: {}", e), Duration::ZERO),
        };

        let start = Instant::now();
        let result = timeout(
            Duration::from_secs(self.timeout_secs),
            session.process(task, |_| {}),
        )
        .await;
        let duration = start.elapsed();

        match result {
            Ok(Ok(outcome)) => BenchmarkResult {
                model: model.to_string(),
                success: !outcome.response.is_empty(),
                tool_rounds: outcome.tool_rounds,
                duration,
                tools_called: outcome
                    .tools_executed
                    .into_iter()
                    .map(|t| t.tool_name)
                    .collect(),
                error: None,
            },
            Ok(Err(e)) => failed(e.to_string(), duration),
            Err(_) => failed("Task timeout".to_string(), duration),
        }
    }

    pub fn print_results(results: &[BenchmarkResult]) {
        println!("\n{:<20} {:>8} {:>7} {:>10}  {}", "Model", "Success", "Rounds", "Duration", "Tools / Error");
        println!("{}", "─".repeat(72));
        for result in results {
            let success = if result.success { "✓" } else { "✗" };
            let detail = match &result.error {
                Some(e) => e.chars().take(30).collect(),
                None => result.tools_called.join(","),
            };
            println!(
                "{:<20} {:>8} {:>7} {:>9.2}s  {}",
                result.model,
                success,
                result.tool_rounds,
                result.duration.as_secs_f64(),
                detail
            );
        }
    }
}

/// Simple arithmetic task (no tools needed)
#[tokio::test]
#[ignore] // Run with: cargo test --test model_benchmark -- --ignored
async fn test_simple_question() {
    let benchmark = ModelBenchmark::default();
    let results = benchmark
        .run_task("What is 2+2? Answer with just the number.")
        .await;
    ModelBenchmark::print_results(&results);

    assert!(results.iter().any(|r| r.success));
}

/// Directory listing task (read-only tool use)
#[tokio::test]
#[ignore]
async fn test_list_directory() {
    let benchmark = ModelBenchmark::default();
    let results = benchmark
        .run_task("Use the fs_read tool in Directory mode to list the current directory, then tell me how many entries it has.")
        .await;
    ModelBenchmark::print_results(&results);

    assert!(results.iter().any(|r| r.tools_called.iter().any(|t| t == "fs_read")));
}
