//! Time-off agent
//!
//! A client-side agent that answers time-off questions by connecting a
//! language-model reasoning loop to a remote Model Context Protocol server.
//! The server supplies both the callable tools (balance lookup, request
//! filing) and the prompt template; the agent discovers them at runtime.
//!
//! # Architecture
//!
//! - **Transport**: streamable HTTP link to the MCP server
//! - **Protocol session**: JSON-RPC handshake and typed MCP operations
//! - **Capability catalog**: discovered tools as invocable handles
//! - **Reasoning loop**: model completions interleaved with tool calls
//! - **Orchestrator**: sequences the above and contains every failure
//!
//! # Modules
//!
//! - [`config`]: Layered configuration and LLM settings
//! - [`error`]: Error taxonomy
//! - [`llm`]: LLM driver traits, Chat Completions driver, reasoning loop
//! - [`mcp`]: MCP client (transport, session, catalog, prompts)
//! - [`normalized`]: Unified streaming event model
//! - [`orchestrator`]: End-to-end invocation with a uniform failure result

// Allow pedantic clippy warnings that don't add value for this codebase
#![allow(clippy::cast_possible_truncation)]
#![allow(clippy::map_err_ignore)]
#![allow(clippy::missing_fields_in_debug)]
#![allow(clippy::implicit_hasher)]
#![allow(clippy::match_same_arms)]
#![allow(clippy::cargo_common_metadata)]
#![allow(clippy::multiple_crate_versions)]
#![allow(clippy::unused_async)]

pub mod config;
pub mod error;
pub mod llm;
pub mod mcp;
pub mod normalized;
pub mod orchestrator;

pub use error::{AgentError, Result};
pub use orchestrator::{Orchestrator, SENTINEL};

use crate::config::{AppConfig, load_llm_settings};

/// Answer `prompt` for `user` using configuration from the environment.
///
/// Returns the model's final answer, or [`SENTINEL`] if anything fails,
/// including missing configuration.
pub async fn run_timeoff_agent(user: &str, prompt: &str) -> String {
    let config = match AppConfig::load_from_args(["timeoff-agent"]) {
        Ok(c) => c,
        Err(e) => {
            tracing::error!(error_kind = "ConfigError", error = %e, "failed to load configuration");
            return SENTINEL.to_string();
        }
    };

    let settings = match load_llm_settings() {
        Ok(s) => s,
        Err(e) => {
            tracing::error!(error_kind = e.kind(), error = %e, "failed to load LLM settings");
            return SENTINEL.to_string();
        }
    };

    match Orchestrator::from_settings(config, settings) {
        Ok(orchestrator) => orchestrator.run(user, prompt).await,
        Err(e) => {
            tracing::error!(error_kind = e.kind(), error = %e, "failed to build the model driver");
            SENTINEL.to_string()
        }
    }
}
