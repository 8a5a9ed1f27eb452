use crate::error::{AgentError, Result};
use crate::llm::provider::DEFAULT_AZURE_API_VERSION;
use crate::llm::reasoning::{DEFAULT_MAX_ITERATIONS, DEFAULT_MODEL_TIMEOUT};
use crate::llm::{LlmSettings, Provider};
use crate::mcp::McpEndpointConfig;
use clap::{Parser, ValueEnum};
use config::{Config, Environment, File};
use serde::Deserialize;
use std::path::Path;
use std::time::Duration;

/// Default MCP endpoint (a local streamable HTTP server).
pub const DEFAULT_MCP_URL: &str = "http://localhost:8000/mcp";
/// Default name of the server-side prompt template.
pub const DEFAULT_PROMPT_NAME: &str = "get_llm_prompt";

/// Cohere compatibility API, used when only `CO_API_KEY` is configured.
pub const COHERE_BASE_URL: &str = "https://api.cohere.ai/compatibility";
pub const COHERE_DEFAULT_MODEL: &str = "command-r-plus-08-2024";

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum LogFormat {
    Text,
    Json,
}

#[derive(Parser, Debug)]
#[command(author, version, about = "Time-off assistant backed by an MCP tool server", long_about = None)]
pub struct Cli {
    /// Config file path
    #[arg(short, long, env = "CONFIG_FILE")]
    pub config: Option<String>,

    /// MCP server URL
    #[arg(long, env = "MCP_SERVER_URL")]
    pub mcp_url: Option<String>,

    /// Maximum reasoning rounds per query
    #[arg(long)]
    pub max_iterations: Option<usize>,

    /// User the query is made on behalf of
    #[arg(short, long, default_value = "Alice")]
    pub user: String,

    /// Single query to run (defaults to the demo queries)
    #[arg(short, long)]
    pub prompt: Option<String>,

    /// Log output format
    #[arg(long, env = "LOG_FORMAT", value_enum, default_value_t = LogFormat::Text)]
    pub log_format: LogFormat,
}

#[derive(Debug, Deserialize, Clone)]
pub struct AppConfig {
    pub mcp: McpEndpointConfig,
    #[serde(default)]
    pub agent: AgentConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct AgentConfig {
    #[serde(default = "default_prompt_name")]
    pub prompt_name: String,
    #[serde(default = "default_max_iterations")]
    pub max_iterations: usize,
    #[serde(default = "default_model_timeout_secs")]
    pub model_timeout_secs: u64,
}

fn default_prompt_name() -> String {
    DEFAULT_PROMPT_NAME.to_string()
}

fn default_max_iterations() -> usize {
    DEFAULT_MAX_ITERATIONS
}

fn default_model_timeout_secs() -> u64 {
    DEFAULT_MODEL_TIMEOUT.as_secs()
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            prompt_name: default_prompt_name(),
            max_iterations: default_max_iterations(),
            model_timeout_secs: default_model_timeout_secs(),
        }
    }
}

impl AgentConfig {
    pub fn model_timeout(&self) -> Duration {
        Duration::from_secs(self.model_timeout_secs.max(1))
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            mcp: McpEndpointConfig::new(DEFAULT_MCP_URL),
            agent: AgentConfig::default(),
        }
    }
}

impl AppConfig {
    pub fn load() -> std::result::Result<Self, config::ConfigError> {
        Self::load_from_args(std::env::args())
    }

    pub fn load_from_args<I, T>(args: I) -> std::result::Result<Self, config::ConfigError>
    where
        I: IntoIterator<Item = T>,
        T: Into<std::ffi::OsString> + Clone,
    {
        let cli =
            Cli::try_parse_from(args).map_err(|e| config::ConfigError::Message(e.to_string()))?;
        Self::from_cli(&cli)
    }

    /// Layer defaults, config file, `TIMEOFF_` environment and CLI flags.
    pub fn from_cli(cli: &Cli) -> std::result::Result<Self, config::ConfigError> {
        let mut builder = Config::builder();

        // 1. Defaults
        builder = builder
            .set_default("mcp.url", DEFAULT_MCP_URL)?
            .set_default("mcp.request_timeout_secs", 30)?
            .set_default("agent.prompt_name", DEFAULT_PROMPT_NAME)?
            .set_default("agent.max_iterations", DEFAULT_MAX_ITERATIONS as u64)?
            .set_default("agent.model_timeout_secs", DEFAULT_MODEL_TIMEOUT.as_secs())?;

        // 2. Config file: explicit path, else ./config.{yaml,toml,json} if present
        if let Some(path) = &cli.config {
            builder = builder.add_source(File::with_name(path).required(true));
        } else if let Some(path) = ["config.yaml", "config.toml", "config.json"]
            .into_iter()
            .find(|p| Path::new(p).exists())
        {
            builder = builder.add_source(File::with_name(path).required(false));
        }

        // 3. Environment variables, e.g. TIMEOFF_MCP__URL or TIMEOFF_AGENT__MAX_ITERATIONS
        builder = builder.add_source(
            Environment::with_prefix("TIMEOFF")
                .prefix_separator("_")
                .separator("__")
                .try_parsing(true),
        );

        // 4. CLI overrides (clap already folded in their own env vars)
        if let Some(url) = &cli.mcp_url {
            builder = builder.set_override("mcp.url", url.as_str())?;
        }
        if let Some(max) = cli.max_iterations {
            builder = builder.set_override("agent.max_iterations", max as u64)?;
        }

        let cfg = builder.build()?;
        cfg.try_deserialize()
    }
}

/// Load LLM settings from the process environment.
pub fn load_llm_settings() -> Result<LlmSettings> {
    llm_settings_from(|key| std::env::var(key).ok())
}

/// Build LLM settings from an arbitrary variable lookup.
///
/// `LLM_BASE_URL`/`LLM_MODEL` take precedence; with neither set, a
/// `CO_API_KEY` selects the Cohere compatibility endpoint.
pub fn llm_settings_from<F>(lookup: F) -> Result<LlmSettings>
where
    F: Fn(&str) -> Option<String>,
{
    let var = |key: &str| lookup(key).filter(|s| !s.trim().is_empty());

    let cohere_key = var("CO_API_KEY");
    let (base_url, default_model, api_key) = match (var("LLM_BASE_URL"), cohere_key) {
        (Some(base_url), _) => (base_url, None, var("LLM_API_KEY")),
        (None, Some(co_key)) => (
            COHERE_BASE_URL.to_string(),
            Some(COHERE_DEFAULT_MODEL.to_string()),
            var("LLM_API_KEY").or(Some(co_key)),
        ),
        (None, None) => {
            return Err(AgentError::Config(
                "Missing required env var: LLM_BASE_URL (or CO_API_KEY)".to_string(),
            ));
        }
    };

    let model = var("LLM_MODEL")
        .or(default_model)
        .ok_or_else(|| AgentError::Config("Missing required env var: LLM_MODEL".to_string()))?;

    // Auto-detect provider from base URL
    let mut provider = Provider::detect_from_url(&base_url);

    if let Provider::AzureOpenAI { .. } = &provider {
        let Some(deployment_name) = var("AZURE_DEPLOYMENT_NAME") else {
            return Err(AgentError::Config(
                "AZURE_DEPLOYMENT_NAME is required for Azure OpenAI endpoints".to_string(),
            ));
        };
        provider = Provider::AzureOpenAI {
            deployment_name,
            api_version: var("AZURE_API_VERSION")
                .unwrap_or_else(|| DEFAULT_AZURE_API_VERSION.to_string()),
        };
    }

    let parallel_tool_calls = var("LLM_PARALLEL_TOOLS").and_then(|s| s.parse().ok());

    Ok(LlmSettings {
        base_url,
        api_key,
        model,
        provider,
        parallel_tool_calls,
    })
}
