//! Model Context Protocol (MCP) client implementation.
//!
//! This module connects to a remote MCP tool server over streamable HTTP and
//! exposes its tools and prompts to the reasoning loop.
//!
//! # Layers
//!
//! - [`transport`]: one link (streamable HTTP or an in-process pipe)
//! - [`session`]: `rmcp` handshake and typed calls with per-request deadlines
//! - [`types`]: lenient adapters over `rmcp::model` payloads
//! - [`catalog`]: advertised tools → invocable handles
//! - [`prompts`]: named prompt templates → initial conversation
//!
//! # Example
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use timeoff_agent::mcp::{McpEndpointConfig, ProtocolSession, ToolCatalog, TransportSession};
//!
//! let config = McpEndpointConfig::new("http://localhost:8000/mcp");
//! let transport = TransportSession::open(&config)?;
//! let session = Arc::new(ProtocolSession::new(transport, config.request_timeout()));
//! session.initialize().await?;
//! let tools = ToolCatalog::discover(&session).await?;
//! ```

pub mod catalog;
pub mod config;
pub mod prompts;
pub mod session;
pub mod transport;
pub mod types;

pub use catalog::{InvocableTool, RemoteTool, ToolCatalog};
pub use config::McpEndpointConfig;
pub use prompts::{PromptRequest, ResolvedPrompt};
pub use session::ProtocolSession;
pub use transport::TransportSession;
pub use types::{ToolDescriptor, call_result_text};
