//! Time-off agent CLI
//!
//! Runs one query (`--prompt`) or the demo conversation against the
//! configured MCP server and prints each response.

// Allow pedantic clippy warnings that don't add value for this codebase
#![allow(clippy::map_err_ignore)]
#![allow(clippy::multiple_crate_versions)]
#![allow(clippy::cargo_common_metadata)]

use clap::Parser;
use dotenvy::dotenv;
use mimalloc::MiMalloc;
use tracing::info;
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

use timeoff_agent::config::{AppConfig, Cli, LogFormat, load_llm_settings};
use timeoff_agent::orchestrator::Orchestrator;

/// Global allocator for improved performance (M-MIMALLOC-APPS).
#[global_allocator]
static GLOBAL: MiMalloc = MiMalloc;

/// Queries run when no `--prompt` is given.
const DEMO_QUERIES: [&str; 3] = [
    "What is my time off balance?",
    "File a time off request for 5 days starting from 2025-05-05",
    "What is my time off balance now?",
];

fn init_tracing(format: LogFormat) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let registry = tracing_subscriber::registry().with(filter);
    match format {
        LogFormat::Json => registry.with(fmt::layer().json().with_target(true)).init(),
        LogFormat::Text => registry.with(fmt::layer().with_target(true)).init(),
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env (if present) before clap reads env-backed flags
    let _ = dotenv();

    let cli = Cli::parse();
    init_tracing(cli.log_format);

    let config = AppConfig::from_cli(&cli)?;
    let settings = load_llm_settings()?;

    info!(
        name: "llm.config.loaded",
        base_url = %settings.base_url,
        model = %settings.model,
        provider = ?settings.provider,
        "LLM configuration loaded"
    );
    info!(
        name: "mcp.config.loaded",
        endpoint = %config.mcp.url,
        prompt = %config.agent.prompt_name,
        max_iterations = config.agent.max_iterations,
        "MCP configuration loaded"
    );

    let orchestrator = Orchestrator::from_settings(config, settings)?;

    let queries: Vec<String> = match cli.prompt {
        Some(prompt) => vec![prompt],
        None => DEMO_QUERIES.iter().map(ToString::to_string).collect(),
    };

    for query in &queries {
        println!("\nQuery: {query}");
        let response = orchestrator.run(&cli.user, query).await;
        println!("Response: {response}");
    }

    Ok(())
}
