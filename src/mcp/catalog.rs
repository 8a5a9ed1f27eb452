use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;

use crate::error::{AgentError, Result};
use crate::mcp::session::ProtocolSession;
use crate::mcp::types::{ToolDescriptor, call_result_text};

/// A callable capability exposed to the reasoning loop.
#[async_trait]
pub trait InvocableTool: Send + Sync + std::fmt::Debug {
    /// Name as exposed to the model.
    fn name(&self) -> &str;
    fn description(&self) -> &str;
    fn schema(&self) -> serde_json::Value;
    /// Run the tool, returning the text handed back to the model.
    async fn invoke(&self, args: serde_json::Value) -> Result<String>;
}

/// Handle forwarding invocations to `tools/call` on a live session.
#[derive(Debug)]
pub struct RemoteTool {
    exposed_name: String,
    remote_name: String,
    descriptor: ToolDescriptor,
    session: Arc<ProtocolSession>,
}

impl RemoteTool {
    /// Server-side tool name (may differ from the sanitized exposed name).
    pub fn remote_name(&self) -> &str {
        &self.remote_name
    }

    pub fn descriptor(&self) -> &ToolDescriptor {
        &self.descriptor
    }
}

#[async_trait]
impl InvocableTool for RemoteTool {
    fn name(&self) -> &str {
        &self.exposed_name
    }

    fn description(&self) -> &str {
        self.descriptor.description.as_deref().unwrap_or("")
    }

    fn schema(&self) -> serde_json::Value {
        self.descriptor.schema()
    }

    async fn invoke(&self, args: serde_json::Value) -> Result<String> {
        let result = self
            .session
            .call_tool(&self.remote_name, args)
            .await
            .map_err(|e| AgentError::tool(&self.exposed_name, e.to_string()))?;

        let text = call_result_text(&result);
        if result.is_error.unwrap_or(false) {
            return Err(AgentError::tool(&self.exposed_name, text));
        }
        Ok(text)
    }
}

/// The dynamic set of tools discovered on one session.
///
/// Built fresh for every session; nothing is cached across sessions.
#[derive(Clone, Default)]
pub struct ToolCatalog {
    // exposed_name -> handle
    index: HashMap<String, Arc<dyn InvocableTool>>,
    // discovery order, for stable tool listings
    order: Vec<String>,
}

impl std::fmt::Debug for ToolCatalog {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ToolCatalog")
            .field("tools", &self.order)
            .finish()
    }
}

impl ToolCatalog {
    /// Creates an empty catalog.
    pub fn new_empty() -> Self {
        Self::default()
    }

    /// Pull the server's tool list and wrap each descriptor in a [`RemoteTool`].
    ///
    /// Descriptors with a missing, `null` or blank name are skipped with a
    /// warning.
    pub async fn discover(session: &Arc<ProtocolSession>) -> Result<Self> {
        let descriptors = session.list_tools().await?;
        let advertised = descriptors.len();
        let mut catalog = Self::new_empty();

        for descriptor in descriptors {
            let Some(remote_name) = descriptor.usable_name().map(ToString::to_string) else {
                tracing::warn!(
                    endpoint = %session.endpoint(),
                    description = ?descriptor.description,
                    "skipping tool descriptor without a name"
                );
                continue;
            };

            let tool = RemoteTool {
                exposed_name: Self::sanitize_tool_name(&remote_name),
                remote_name,
                descriptor,
                session: Arc::clone(session),
            };
            catalog = catalog.with_tool(Arc::new(tool));
        }

        tracing::info!(
            endpoint = %session.endpoint(),
            advertised,
            usable = catalog.len(),
            "tool catalog built"
        );

        Ok(catalog)
    }

    /// Sanitize tool names for `OpenAI` function-name compatibility.
    pub fn sanitize_tool_name(name: &str) -> String {
        name.chars()
            .map(|c| {
                if c.is_ascii_alphanumeric() || c == '_' || c == '-' {
                    c
                } else {
                    '_'
                }
            })
            .collect()
    }

    /// Add a tool. A name that is already taken keeps its first handle.
    #[must_use]
    pub fn with_tool(mut self, tool: Arc<dyn InvocableTool>) -> Self {
        let name = tool.name().to_string();
        if self.index.contains_key(&name) {
            tracing::warn!(tool = %name, "duplicate tool name, keeping the first one");
            return self;
        }
        self.order.push(name.clone());
        self.index.insert(name, tool);
        self
    }

    pub fn get(&self, name: &str) -> Option<&Arc<dyn InvocableTool>> {
        self.index.get(name)
    }

    /// Tools in discovery order.
    pub fn tools(&self) -> impl Iterator<Item = &Arc<dyn InvocableTool>> {
        self.order.iter().filter_map(|n| self.index.get(n))
    }

    pub fn names(&self) -> &[String] {
        &self.order
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    /// Invoke a tool by exposed name.
    pub async fn invoke(&self, name: &str, args: serde_json::Value) -> Result<String> {
        let tool = self
            .get(name)
            .ok_or_else(|| AgentError::tool(name, format!("unknown tool: {name}")))?;
        tool.invoke(args).await
    }

    /// Tool definitions in `OpenAI` function schema format.
    pub fn openai_tools_json(&self) -> Vec<serde_json::Value> {
        self.tools()
            .map(|t| {
                serde_json::json!({
                    "type": "function",
                    "function": {
                        "name": t.name(),
                        "description": t.description(),
                        "parameters": t.schema()
                    }
                })
            })
            .collect()
    }
}
