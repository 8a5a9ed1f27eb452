//! Protocol session: the MCP request/response layer atop a transport.
//!
//! [`ProtocolSession`] runs the `initialize` handshake through `rmcp` and
//! exposes the typed operations the agent needs. Every operation other than
//! [`ProtocolSession::initialize`] fails fast with
//! [`AgentError::NotInitialized`] until the handshake has completed, and every
//! round trip is bounded by the session's request timeout.

use std::collections::HashMap;
use std::sync::OnceLock;
use std::time::Duration;

use rmcp::model::{
    CallToolRequestParam, CallToolResult, ClientInfo, ClientRequest, GetPromptRequestParam,
    GetPromptResult, Implementation, JsonObject, ListToolsRequest, PaginatedRequestParam,
    ServerInfo, ServerResult,
};
use rmcp::service::{Peer, RoleClient, ServiceError};
use serde_json::Value;
use tokio::sync::Mutex;

use crate::error::{AgentError, Result};
use crate::mcp::transport::{ClientService, TransportSession};
use crate::mcp::types::{ToolDescriptor, ToolPage};

/// Upper bound on `tools/list` pages, guards against cursor loops.
const MAX_LIST_PAGES: usize = 64;

pub struct ProtocolSession {
    endpoint: String,
    // taken by the one and only initialize()
    transport: Mutex<Option<TransportSession>>,
    service: Mutex<Option<ClientService>>,
    peer: OnceLock<Peer<RoleClient>>,
    server: OnceLock<ServerInfo>,
    request_timeout: Duration,
}

impl std::fmt::Debug for ProtocolSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProtocolSession")
            .field("endpoint", &self.endpoint)
            .field("initialized", &self.is_initialized())
            .field("request_timeout", &self.request_timeout)
            .finish_non_exhaustive()
    }
}

impl ProtocolSession {
    /// Wrap a transport. The session owns the transport from here on.
    pub fn new(transport: TransportSession, request_timeout: Duration) -> Self {
        Self {
            endpoint: transport.endpoint().to_string(),
            transport: Mutex::new(Some(transport)),
            service: Mutex::new(None),
            peer: OnceLock::new(),
            server: OnceLock::new(),
            request_timeout,
        }
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    pub fn is_initialized(&self) -> bool {
        self.server.get().is_some()
    }

    /// Server info and capabilities, once initialized.
    pub fn server_info(&self) -> Option<&ServerInfo> {
        self.server.get()
    }

    /// Perform the lifecycle handshake: `initialize`, then
    /// `notifications/initialized`. Must be called exactly once.
    pub async fn initialize(&self) -> Result<&ServerInfo> {
        let Some(transport) = self.transport.lock().await.take() else {
            return Err(AgentError::protocol("initialize() called more than once"));
        };

        let service = tokio::time::timeout(self.request_timeout, transport.connect(client_info()))
            .await
            .map_err(|_| AgentError::Timeout {
                operation: "initialize".to_string(),
                after: self.request_timeout,
            })??;

        let server = service
            .peer_info()
            .cloned()
            .ok_or_else(|| AgentError::protocol("initialize completed without server info"))?;

        tracing::info!(
            endpoint = %self.endpoint,
            server = %server.server_info.name,
            server_version = %server.server_info.version,
            protocol_version = %server.protocol_version,
            "MCP session initialized"
        );

        let _ = self.peer.set(service.peer().clone());
        *self.service.lock().await = Some(service);
        Ok(self.server.get_or_init(|| server))
    }

    /// List every tool the server advertises, following pagination cursors.
    ///
    /// Pages are decoded leniently so a single malformed descriptor does not
    /// hide the rest of the catalog.
    pub async fn list_tools(&self) -> Result<Vec<ToolDescriptor>> {
        let peer = self.peer()?;

        let mut out = Vec::new();
        let mut cursor: Option<String> = None;

        for _ in 0..MAX_LIST_PAGES {
            let request = ClientRequest::ListToolsRequest(ListToolsRequest {
                method: Default::default(),
                params: cursor.take().map(|c| PaginatedRequestParam { cursor: Some(c) }),
                extensions: Default::default(),
            });

            let page = match self.bounded("tools/list", peer.send_request(request)).await? {
                ServerResult::ListToolsResult(page) => ToolPage::from(page),
                ServerResult::CustomResult(raw) => raw.result_as::<ToolPage>().map_err(|e| {
                    AgentError::protocol(format!("unexpected tools/list result: {e}"))
                })?,
                other => {
                    return Err(AgentError::protocol(format!(
                        "unexpected tools/list result: {other:?}"
                    )));
                }
            };
            out.extend(page.tools);

            match page.next_cursor {
                Some(nc) if !nc.is_empty() => cursor = Some(nc),
                _ => return Ok(out),
            }
        }

        Err(AgentError::protocol(format!(
            "tools/list did not terminate after {MAX_LIST_PAGES} pages"
        )))
    }

    /// Fetch a prompt template rendered with `arguments`.
    pub async fn get_prompt(
        &self,
        name: &str,
        arguments: HashMap<String, String>,
    ) -> Result<GetPromptResult> {
        let peer = self.peer()?;
        let arguments: JsonObject = arguments
            .into_iter()
            .map(|(k, v)| (k, Value::String(v)))
            .collect();
        self.bounded(
            "prompts/get",
            peer.get_prompt(GetPromptRequestParam {
                name: name.to_string(),
                arguments: Some(arguments),
            }),
        )
        .await
    }

    /// Invoke a tool by its server-side name.
    pub async fn call_tool(&self, name: &str, arguments: Value) -> Result<CallToolResult> {
        let peer = self.peer()?;
        let arguments = match arguments {
            Value::Null => JsonObject::new(),
            Value::Object(map) => map,
            other => {
                return Err(AgentError::protocol(format!(
                    "tools/call arguments must be an object, got {other}"
                )));
            }
        };
        self.bounded(
            "tools/call",
            peer.call_tool(CallToolRequestParam {
                name: name.to_string().into(),
                arguments: Some(arguments),
            }),
        )
        .await
    }

    /// Release the link. An initialized session is cancelled, which makes the
    /// transport terminate the server-side session.
    pub async fn close(&self) {
        drop(self.transport.lock().await.take());

        let Some(service) = self.service.lock().await.take() else {
            tracing::debug!(endpoint = %self.endpoint, "transport released before initialize");
            return;
        };
        match service.cancel().await {
            Ok(reason) => tracing::debug!(endpoint = %self.endpoint, ?reason, "MCP session closed"),
            Err(e) => tracing::warn!(endpoint = %self.endpoint, error = %e, "MCP service ended abnormally"),
        }
    }

    fn peer(&self) -> Result<&Peer<RoleClient>> {
        self.peer.get().ok_or(AgentError::NotInitialized)
    }

    async fn bounded<T>(
        &self,
        operation: &str,
        call: impl Future<Output = std::result::Result<T, ServiceError>>,
    ) -> Result<T> {
        tracing::debug!(endpoint = %self.endpoint, operation, "sending MCP request");

        tokio::time::timeout(self.request_timeout, call)
            .await
            .map_err(|_| AgentError::Timeout {
                operation: operation.to_string(),
                after: self.request_timeout,
            })?
            .map_err(|e| service_error(operation, e))
    }
}

fn client_info() -> ClientInfo {
    ClientInfo {
        client_info: Implementation {
            name: env!("CARGO_PKG_NAME").into(),
            version: env!("CARGO_PKG_VERSION").into(),
            ..Implementation::default()
        },
        ..ClientInfo::default()
    }
}

fn service_error(operation: &str, err: ServiceError) -> AgentError {
    match err {
        ServiceError::McpError(e) => AgentError::RemoteFault {
            code: i64::from(e.code.0),
            message: e.message.into_owned(),
        },
        ServiceError::Timeout { timeout } => AgentError::Timeout {
            operation: operation.to_string(),
            after: timeout,
        },
        ServiceError::Cancelled { .. } => AgentError::Cancelled,
        ServiceError::TransportSend(_) | ServiceError::TransportClosed => {
            AgentError::transport(format!("{operation}: {err}"))
        }
        other => AgentError::protocol(format!("{operation}: {other}")),
    }
}
