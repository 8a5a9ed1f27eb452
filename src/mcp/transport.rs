//! Transport session for MCP communication.
//!
//! A [`TransportSession`] holds everything needed to open one live link to a
//! tool server, either over streamable HTTP or over an in-process duplex pipe.
//! Nothing touches the network until [`TransportSession::connect`] runs the
//! `initialize` handshake through `rmcp`; from then on the link is owned by
//! the returned running service, and cancelling that service tears the
//! server-side session down.

use std::collections::HashMap;

use reqwest::header::{HeaderMap, HeaderName, HeaderValue};
use rmcp::ServiceExt;
use rmcp::model::ClientInfo;
use rmcp::service::{ClientInitializeError, RoleClient, RunningService};
use rmcp::transport::StreamableHttpClientTransport;
use rmcp::transport::streamable_http_client::StreamableHttpClientTransportConfig;
use tokio::io::DuplexStream;

use crate::error::{AgentError, Result};
use crate::mcp::config::McpEndpointConfig;

/// Running `rmcp` client bound to one transport.
pub type ClientService = RunningService<RoleClient, ClientInfo>;

enum Link {
    StreamableHttp {
        client: reqwest::Client,
        config: StreamableHttpClientTransportConfig,
    },
    Loopback(DuplexStream),
}

/// One not-yet-connected link to an MCP server.
pub struct TransportSession {
    endpoint: String,
    link: Link,
}

impl std::fmt::Debug for TransportSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let kind = match self.link {
            Link::StreamableHttp { .. } => "streamable-http",
            Link::Loopback(_) => "loopback",
        };
        f.debug_struct("TransportSession")
            .field("endpoint", &self.endpoint)
            .field("link", &kind)
            .finish()
    }
}

impl TransportSession {
    /// Prepare a streamable HTTP session to `config.url`.
    ///
    /// The URL and headers are validated here. Connection failures surface
    /// from [`TransportSession::connect`] as [`AgentError::Transport`].
    pub fn open(config: &McpEndpointConfig) -> Result<Self> {
        let url = config.parsed_url()?;

        // No overall request timeout: the SSE stream stays open for the
        // session's lifetime. Round trips are bounded by the protocol session.
        let client = reqwest::Client::builder()
            .connect_timeout(config.request_timeout())
            .default_headers(header_map(&config.resolved_headers())?)
            .build()
            .map_err(|e| AgentError::transport(format!("failed to build HTTP client: {e}")))?;

        tracing::info!(
            endpoint = %url,
            timeout_secs = config.request_timeout_secs,
            "prepared streamable HTTP transport"
        );

        Ok(Self {
            endpoint: url.to_string(),
            link: Link::StreamableHttp {
                client,
                config: StreamableHttpClientTransportConfig::with_uri(url.to_string()),
            },
        })
    }

    /// Wrap one end of an in-process pipe speaking newline-delimited JSON-RPC.
    pub fn loopback(endpoint: impl Into<String>, stream: DuplexStream) -> Self {
        Self {
            endpoint: endpoint.into(),
            link: Link::Loopback(stream),
        }
    }

    /// Endpoint this session talks to.
    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    /// Open the link and run the `initialize` handshake as `info`.
    pub(crate) async fn connect(self, info: ClientInfo) -> Result<ClientService> {
        let Self { endpoint, link } = self;
        let served = match link {
            Link::StreamableHttp { client, config } => {
                info.serve(StreamableHttpClientTransport::with_client(client, config))
                    .await
            }
            Link::Loopback(stream) => info.serve(stream).await,
        };
        served.map_err(|e| handshake_error(&endpoint, e))
    }
}

fn handshake_error(endpoint: &str, err: ClientInitializeError) -> AgentError {
    tracing::debug!(endpoint, error = %err, "MCP handshake failed");
    match err {
        ClientInitializeError::TransportError { error, context } => AgentError::Transport {
            message: format!("{endpoint}: failed to {context}: {error}"),
            source: Some(Box::new(error)),
        },
        ClientInitializeError::ConnectionClosed(reason) => {
            AgentError::transport(format!("{endpoint}: connection closed during {reason}"))
        }
        ClientInitializeError::Cancelled => AgentError::Cancelled,
        other => AgentError::protocol(format!("initialize: {other}")),
    }
}

fn header_map(headers: &HashMap<String, String>) -> Result<HeaderMap> {
    let mut map = HeaderMap::new();
    for (name, value) in headers {
        let name = HeaderName::from_bytes(name.as_bytes())
            .map_err(|e| AgentError::Config(format!("invalid header name '{name}': {e}")))?;
        let value = HeaderValue::from_str(value)
            .map_err(|e| AgentError::Config(format!("invalid value for header '{name}': {e}")))?;
        map.insert(name, value);
    }
    Ok(map)
}
