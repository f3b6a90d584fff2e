use std::path::PathBuf;
use std::sync::Arc;

use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use trellis_core::config::AppConfig;
use trellis_core::import::WorkflowDoc;
use trellis_core::run::LogEntry;
use trellis_core::traits::InferenceClient;
use trellis_engine::{EngineOptions, WorkflowEngine};
use trellis_llm::OllamaClient;

#[derive(Parser)]
#[command(
    name = "trellis",
    version,
    about = "Workflow execution engine for Ollama-backed agent graphs"
)]
struct Cli {
    /// Path to config file
    #[arg(short, long, default_value = "trellis.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Execute a workflow document
    Run {
        /// Path to the workflow JSON file
        workflow: PathBuf,

        /// User input seeded into the start node
        #[arg(short, long)]
        input: Option<String>,

        /// Generation model (overrides the workflow's and the config's default)
        #[arg(long)]
        model: Option<String>,
    },
    /// List models available on the inference service
    Models,
    /// Check connectivity to the inference service
    Check,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("trellis=info,warn")),
        )
        .with_target(false)
        .init();

    let cli = Cli::parse();
    let config = AppConfig::load_or_default(&cli.config);

    match cli.command {
        Commands::Run {
            workflow,
            input,
            model,
        } => run_workflow(config, workflow, input, model).await,
        Commands::Models => list_models(config).await,
        Commands::Check => check_connection(config).await,
    }
}

async fn run_workflow(
    config: AppConfig,
    path: PathBuf,
    input: Option<String>,
    model_override: Option<String>,
) -> anyhow::Result<()> {
    let text = std::fs::read_to_string(&path)?;
    let doc = WorkflowDoc::from_json(&text)?;
    let graph = doc.compile()?;

    let mut ollama = config.ollama.clone();
    if let Some(addr) = doc.config.as_ref().and_then(|c| c.ollama_address.clone()) {
        ollama.base_url = addr;
    }

    // Flag beats the workflow's embedded config, which beats trellis.toml
    let default_model = model_override
        .or_else(|| doc.config.as_ref().map(|c| c.default_model.clone()))
        .or_else(|| config.engine.default_model.clone());
    if default_model.is_none() {
        tracing::warn!("No default model configured; agentic nodes will fail");
    }

    let client = Arc::new(OllamaClient::new(&ollama)?);
    let engine = WorkflowEngine::new(
        client,
        EngineOptions {
            default_model,
            max_steps: config.engine.max_steps,
        },
    );
    engine.set_log_sink(print_entry);

    match engine.start(&graph, input).await {
        Ok(record) => {
            let elapsed = record.elapsed().map(|d| d.num_milliseconds()).unwrap_or(0);
            println!(
                "\nRun {} {} ({} nodes visited, {} log entries, {} ms)",
                record.id,
                record.status,
                engine.node_outputs().len(),
                record.log.len(),
                elapsed
            );
            Ok(())
        }
        Err(e) => anyhow::bail!("execution failed: {}", e),
    }
}

async fn list_models(config: AppConfig) -> anyhow::Result<()> {
    let client = OllamaClient::new(&config.ollama)?;
    let models = client.list_models().await?;
    if models.is_empty() {
        println!("No models installed at {}", client.base_url());
    } else {
        for model in models {
            println!("{}", model);
        }
    }
    Ok(())
}

async fn check_connection(config: AppConfig) -> anyhow::Result<()> {
    let client = OllamaClient::new(&config.ollama)?;
    if client.test_connection().await {
        println!("Ollama is reachable at {}", client.base_url());
        Ok(())
    } else {
        anyhow::bail!("Ollama is not reachable at {}", client.base_url())
    }
}

fn print_entry(entry: &LogEntry) {
    println!(
        "[{:<13}] {} ({}): {}",
        entry.kind.to_string(),
        entry.node_name,
        entry.node_id,
        entry.message
    );
}
