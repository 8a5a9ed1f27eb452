//! Error types for the time-off agent.
//!
//! Every failure of the remote link, the protocol layer, or the model is an
//! [`AgentError`]. Only [`AgentError::ToolInvocation`] is recovered locally
//! (inside the reasoning loop); all other variants bubble up to the
//! [`Orchestrator`](crate::orchestrator::Orchestrator), which converts them
//! into the caller-visible sentinel.

use std::time::Duration;

use thiserror::Error;

/// Result type alias for agent operations.
pub type Result<T> = std::result::Result<T, AgentError>;

/// Agent error type.
#[derive(Error, Debug)]
pub enum AgentError {
    /// Connection or network failure talking to the MCP server.
    #[error("transport error: {message}")]
    Transport {
        /// Human-readable description.
        message: String,
        /// Underlying link error, when there is one.
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// A round trip did not complete within its deadline.
    #[error("{operation} timed out after {}s", .after.as_secs())]
    Timeout {
        /// Operation that timed out (e.g. `tools/list`).
        operation: String,
        /// Configured deadline.
        after: Duration,
    },

    /// Malformed or unexpected protocol message.
    #[error("protocol error: {0}")]
    Protocol(String),

    /// An operation was issued before the initialize handshake completed.
    #[error("session not initialized - call initialize() first")]
    NotInitialized,

    /// The server answered with an explicit JSON-RPC error payload.
    #[error("remote fault {code}: {message}")]
    RemoteFault {
        /// JSON-RPC error code.
        code: i64,
        /// Error message from the server.
        message: String,
    },

    /// The server has no prompt template with this name.
    #[error("prompt not found: {0}")]
    PromptNotFound(String),

    /// A specific tool call failed.
    #[error("tool '{tool}' failed: {message}")]
    ToolInvocation {
        /// Tool name as exposed to the model.
        tool: String,
        /// Failure description.
        message: String,
    },

    /// The language model request failed.
    #[error("model error: {0}")]
    Model(String),

    /// The run was cancelled by its caller.
    #[error("cancelled")]
    Cancelled,

    /// Invalid configuration.
    #[error("configuration error: {0}")]
    Config(String),

    /// JSON serialization/deserialization error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl AgentError {
    /// Create a transport error without an underlying HTTP error.
    pub fn transport(msg: impl Into<String>) -> Self {
        Self::Transport {
            message: msg.into(),
            source: None,
        }
    }

    /// Create a protocol error.
    pub fn protocol(msg: impl Into<String>) -> Self {
        Self::Protocol(msg.into())
    }

    /// Create a tool invocation error.
    pub fn tool(tool: impl Into<String>, msg: impl Into<String>) -> Self {
        Self::ToolInvocation {
            tool: tool.into(),
            message: msg.into(),
        }
    }

    /// Stable error kind used in diagnostics.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Transport { .. } | Self::Timeout { .. } => "TransportError",
            Self::Protocol(_) | Self::NotInitialized | Self::Json(_) => "ProtocolError",
            Self::RemoteFault { .. } => "RemoteFault",
            Self::PromptNotFound(_) => "PromptNotFound",
            Self::ToolInvocation { .. } => "ToolInvocationError",
            Self::Model(_) => "ModelError",
            Self::Cancelled => "Cancelled",
            Self::Config(_) => "ConfigError",
        }
    }
}
