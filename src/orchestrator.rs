//! Top-level agent orchestration.
//!
//! The orchestrator sequences one complete invocation:
//! 1. Open a transport session to the MCP server
//! 2. Perform the `initialize` handshake
//! 3. Discover the server's tools
//! 4. Resolve the prompt template for the user's request
//! 5. Run the reasoning loop until it produces an answer
//!
//! It is the single recovery point for failures: [`Orchestrator::run`] never
//! returns an error, only the final answer or [`SENTINEL`].
//!
//! # Example
//!
//! ```rust,ignore
//! use timeoff_agent::config::{AppConfig, load_llm_settings};
//! use timeoff_agent::orchestrator::Orchestrator;
//!
//! let orchestrator = Orchestrator::from_settings(AppConfig::default(), load_llm_settings()?)?;
//! let answer = orchestrator.run("Alice", "What is my time off balance?").await;
//! ```

use std::sync::Arc;

use tokio_util::sync::CancellationToken;

use crate::config::AppConfig;
use crate::error::{AgentError, Result};
use crate::llm::{ChatCompletionsDriver, LlmDriver, LlmSettings, LoopOutcome, ReasoningLoop};
use crate::mcp::prompts::{self, PromptRequest};
use crate::mcp::{ProtocolSession, ToolCatalog, TransportSession};

/// Result returned to callers when an invocation fails for any reason.
pub const SENTINEL: &str = "Error";

/// Runs one user request end to end against a fresh MCP session.
#[derive(Clone)]
pub struct Orchestrator {
    config: AppConfig,
    driver: Arc<dyn LlmDriver>,
}

#[allow(clippy::missing_fields_in_debug)]
impl std::fmt::Debug for Orchestrator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Orchestrator")
            .field("config", &self.config)
            .field("driver", &"LlmDriver")
            .finish()
    }
}

impl Orchestrator {
    /// Create an orchestrator around an existing model driver.
    pub fn new(config: AppConfig, driver: Arc<dyn LlmDriver>) -> Self {
        Self { config, driver }
    }

    /// Create an orchestrator that talks to a Chat Completions endpoint.
    pub fn from_settings(config: AppConfig, settings: LlmSettings) -> Result<Self> {
        let driver = ChatCompletionsDriver::new(settings)
            .map_err(|e| AgentError::Config(format!("{e:#}")))?;
        Ok(Self::new(config, Arc::new(driver)))
    }

    #[must_use]
    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    /// MCP endpoint every invocation connects to.
    #[must_use]
    pub fn endpoint(&self) -> &str {
        &self.config.mcp.url
    }

    /// Answer `prompt` on behalf of `user`, or return [`SENTINEL`].
    pub async fn run(&self, user: &str, prompt: &str) -> String {
        self.run_with_cancel(user, prompt, CancellationToken::new())
            .await
    }

    /// Like [`Orchestrator::run`], aborting when `cancel` fires.
    pub async fn run_with_cancel(&self, user: &str, prompt: &str, cancel: CancellationToken) -> String {
        match self.try_run_with_cancel(user, prompt, cancel).await {
            Ok(answer) => answer,
            Err(e) => {
                self.report_failure(&e);
                SENTINEL.to_string()
            }
        }
    }

    /// Fallible variant of [`Orchestrator::run`] for callers that want the error.
    pub async fn try_run(&self, user: &str, prompt: &str) -> Result<String> {
        self.try_run_with_cancel(user, prompt, CancellationToken::new())
            .await
    }

    pub async fn try_run_with_cancel(
        &self,
        user: &str,
        prompt: &str,
        cancel: CancellationToken,
    ) -> Result<String> {
        if cancel.is_cancelled() {
            return Err(AgentError::Cancelled);
        }

        let transport = TransportSession::open(&self.config.mcp)?;
        let session = Arc::new(ProtocolSession::new(
            transport,
            self.config.mcp.request_timeout(),
        ));

        let outcome = tokio::select! {
            biased;
            () = cancel.cancelled() => Err(AgentError::Cancelled),
            r = self.converse(&session, user, prompt) => r,
        };

        session.close().await;
        outcome
    }

    async fn converse(&self, session: &Arc<ProtocolSession>, user: &str, prompt: &str) -> Result<String> {
        let server = session.initialize().await?;
        tracing::debug!(
            endpoint = %session.endpoint(),
            instructions = ?server.instructions,
            capabilities = ?server.capabilities,
            "MCP server capabilities"
        );

        let catalog = ToolCatalog::discover(session).await?;
        for tool in catalog.tools() {
            tracing::info!(
                name: "mcp.tool.discovered",
                tool = %tool.name(),
                description = %tool.description(),
                "MCP tool discovered"
            );
        }

        let request = PromptRequest::new(&self.config.agent.prompt_name)
            .with_argument("user", user)
            .with_argument("prompt", prompt);
        let resolved = prompts::resolve(session, request).await?;
        tracing::info!(
            name: "mcp.prompt.resolved",
            prompt = %resolved.name,
            message_count = resolved.messages.len(),
            "MCP prompt resolved"
        );

        let report = ReasoningLoop::new(Arc::clone(&self.driver))
            .with_max_iterations(self.config.agent.max_iterations)
            .with_model_timeout(self.config.agent.model_timeout())
            .run(&catalog, resolved.messages)
            .await?;

        match report.outcome {
            LoopOutcome::Answered(answer) if !answer.trim().is_empty() => Ok(answer),
            LoopOutcome::Answered(_) => Err(AgentError::Model(
                "model returned an empty answer".to_string(),
            )),
            LoopOutcome::Inconclusive { iterations } => Err(AgentError::Model(format!(
                "no answer after {iterations} reasoning rounds"
            ))),
        }
    }

    fn report_failure(&self, err: &AgentError) {
        tracing::error!(
            error_kind = err.kind(),
            error = %err,
            endpoint = %self.endpoint(),
            "Error in time-off agent"
        );
        if matches!(err, AgentError::Transport { .. } | AgentError::Timeout { .. }) {
            tracing::error!(
                endpoint = %self.endpoint(),
                "Make sure the MCP server is running and accessible"
            );
        }
    }
}
