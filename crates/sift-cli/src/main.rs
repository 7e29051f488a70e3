//! Command-line entry point for the Sift chat-stream monitor.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use sift_ai::{LlmClient, OpenAiClient, OpenAiConfig};
use sift_chat::{BotApiClient, BotApiConfig, ChatClient};
use sift_config::{load_config, resolve_config_path, MonitorConfig};
use sift_evals::{generate_datasets, run_accuracy, select_prompt, ACCEPTANCE_ACCURACY};
use sift_runtime::{
    run_monitor, HttpPromptRegistry, JsonlTraceSink, MonitorRuntimeConfig, NoopPromptRegistry,
    NoopTraceSink, PromptEvaluator, PromptRegistry, RegistryConfig, SharedStats, TraceSink,
};
use sift_store::{StatsStore, TraceStore};
use tracing::level_filters::LevelFilter;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "sift", about = "Monitor chat streams and forward matching messages")]
struct Cli {
    /// Path to the YAML config file.
    #[arg(long, global = true)]
    config: Option<PathBuf>,
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run the monitor until interrupted.
    Run,
    /// Generate evaluation datasets from the feedback channels.
    GenerateEvals {
        /// Dataset folder suffix.
        #[arg(long)]
        suffix: String,
    },
    /// Replay a generated dataset and gate on the accuracy bar.
    RunEvals {
        /// Instance name.
        #[arg(long)]
        instance: String,
        /// Prompt name.
        #[arg(long)]
        prompt: String,
        /// Dataset suffix.
        #[arg(long)]
        suffix: String,
    },
}

fn init_tracing(log_level: &str) {
    let default_level = match log_level.to_ascii_lowercase().as_str() {
        "trace" => LevelFilter::TRACE,
        "debug" => LevelFilter::DEBUG,
        "warn" | "warning" => LevelFilter::WARN,
        "error" => LevelFilter::ERROR,
        _ => LevelFilter::INFO,
    };
    let env_filter = EnvFilter::builder()
        .with_default_directive(default_level.into())
        .from_env_lossy();

    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_target(false)
        .compact()
        .init();
}

fn build_chat_client(config: &MonitorConfig) -> Result<Arc<dyn ChatClient>> {
    let (token, api_base) = config.bot_credentials()?;
    let client = BotApiClient::new(BotApiConfig {
        api_base,
        token,
        ..BotApiConfig::default()
    })
    .context("failed to build chat client")?;
    Ok(Arc::new(client))
}

fn build_llm_client(config: &MonitorConfig) -> Result<Option<Arc<dyn LlmClient>>> {
    let Some(api_key) = config
        .openai_api_key
        .as_deref()
        .filter(|key| !key.trim().is_empty())
    else {
        return Ok(None);
    };
    let mut openai_config = OpenAiConfig {
        api_key: api_key.to_string(),
        proxy_url: config.proxy_url.clone(),
        ..OpenAiConfig::default()
    };
    if let Some(api_base) = config.openai_api_base.clone() {
        openai_config.api_base = api_base;
    }
    let client = OpenAiClient::new(openai_config).context("failed to build evaluator client")?;
    Ok(Some(Arc::new(client)))
}

fn build_registry(config: &MonitorConfig) -> Result<Arc<dyn PromptRegistry>> {
    if !config.registry_configured() {
        return Ok(Arc::new(NoopPromptRegistry));
    }
    let registry = HttpPromptRegistry::new(RegistryConfig {
        base_url: config
            .registry_base_url
            .clone()
            .unwrap_or_else(|| "https://cloud.langfuse.com".to_string()),
        public_key: config.registry_public_key.clone().unwrap_or_default(),
        secret_key: config.registry_secret_key.clone().unwrap_or_default(),
        request_timeout_ms: 30_000,
    })
    .context("failed to build prompt registry client")?;
    Ok(Arc::new(registry))
}

fn build_trace_sink(config: &MonitorConfig) -> Result<Arc<dyn TraceSink>> {
    if !config.registry_configured() {
        return Ok(Arc::new(NoopTraceSink));
    }
    let sink = JsonlTraceSink::open(config.data_dir.join("evaluations.jsonl"))
        .context("failed to open evaluation audit log")?;
    Ok(Arc::new(sink))
}

async fn command_run(config: MonitorConfig, config_path: PathBuf) -> Result<()> {
    let chat = build_chat_client(&config)?;
    let llm = build_llm_client(&config)?;
    let registry = build_registry(&config)?;
    let sink = build_trace_sink(&config)?;
    run_monitor(MonitorRuntimeConfig {
        chat,
        llm,
        registry,
        sink,
        config,
        config_path,
    })
    .await
}

async fn command_generate_evals(config: MonitorConfig, suffix: &str) -> Result<()> {
    let chat = build_chat_client(&config)?;
    let traces = TraceStore::load(config.trace_path(), config.flush_interval());
    generate_datasets(chat, &config, &traces, suffix).await
}

async fn command_run_evals(
    config: MonitorConfig,
    instance_name: &str,
    prompt_name: &str,
    suffix: &str,
) -> Result<()> {
    let (instance, prompt) = select_prompt(&config, instance_name, prompt_name)?;
    let dataset = sift_evals::eval_dir(&config.evals_dir(), instance_name, prompt_name, suffix)
        .join("messages.jsonl");

    // Offline runs keep token accounting in memory only; the store is never
    // flushed so production counters stay untouched.
    let llm = build_llm_client(&config)?;
    let stats = SharedStats::new(StatsStore::load(config.stats_path(), Duration::MAX));
    let evaluator = PromptEvaluator::new(
        llm,
        config.openai_model.clone(),
        stats,
        Arc::new(NoopTraceSink),
    );

    let outcome = run_accuracy(&evaluator, &instance, &prompt, &dataset).await?;
    println!(
        "Accuracy: {:.2}% ({}/{})",
        outcome.accuracy() * 100.0,
        outcome.correct,
        outcome.total
    );
    if !outcome.passed() {
        bail!(
            "accuracy {:.2}% is below the acceptance bar {:.0}%",
            outcome.accuracy() * 100.0,
            ACCEPTANCE_ACCURACY * 100.0
        );
    }
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let config_path = resolve_config_path(cli.config.as_deref());
    let config = load_config(&config_path)?;
    init_tracing(&config.log_level);

    match cli.command {
        Command::Run => command_run(config, config_path).await,
        Command::GenerateEvals { suffix } => command_generate_evals(config, &suffix).await,
        Command::RunEvals {
            instance,
            prompt,
            suffix,
        } => command_run_evals(config, &instance, &prompt, &suffix).await,
    }
}
