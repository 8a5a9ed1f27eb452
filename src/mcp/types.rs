//! Adapters between `rmcp::model` payloads and the agent's own types.
//!
//! `rmcp::model::Tool` requires a name and an input schema, so one malformed
//! descriptor would sink a whole `tools/list` page. [`ToolPage`] decodes the
//! same page leniently; unusable entries are dropped later by the catalog.

use rmcp::model::{CallToolResult, ListToolsResult, RawContent, Tool};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// A tool as advertised by the server, decoded without rejecting gaps.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ToolDescriptor {
    pub name: Option<String>,
    pub title: Option<String>,
    pub description: Option<String>,
    pub input_schema: Option<Value>,
}

impl ToolDescriptor {
    /// The name, unless it is missing, `null` or blank.
    pub fn usable_name(&self) -> Option<&str> {
        self.name.as_deref().filter(|n| !n.trim().is_empty())
    }

    /// Input schema, defaulting to an object without properties.
    pub fn schema(&self) -> Value {
        match &self.input_schema {
            Some(schema @ Value::Object(_)) => schema.clone(),
            _ => serde_json::json!({ "type": "object", "properties": {} }),
        }
    }
}

impl From<Tool> for ToolDescriptor {
    fn from(tool: Tool) -> Self {
        Self {
            name: Some(tool.name.into_owned()),
            title: tool.title,
            description: tool.description.map(std::borrow::Cow::into_owned),
            input_schema: Some(Value::Object((*tool.input_schema).clone())),
        }
    }
}

/// One `tools/list` page.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ToolPage {
    #[serde(default)]
    pub tools: Vec<ToolDescriptor>,
    #[serde(default)]
    pub next_cursor: Option<String>,
}

impl From<ListToolsResult> for ToolPage {
    fn from(page: ListToolsResult) -> Self {
        Self {
            tools: page.tools.into_iter().map(ToolDescriptor::from).collect(),
            next_cursor: page.next_cursor,
        }
    }
}

/// Flatten a `tools/call` result into the text handed back to the model.
///
/// Text blocks are joined with newlines; other blocks are passed through as
/// JSON. An empty content list falls back to the structured content.
pub fn call_result_text(result: &CallToolResult) -> String {
    if result.content.is_empty() {
        return result
            .structured_content
            .as_ref()
            .map(ToString::to_string)
            .unwrap_or_default();
    }

    result
        .content
        .iter()
        .map(|block| match &block.raw {
            RawContent::Text(t) => t.text.clone(),
            other => serde_json::to_string(other).unwrap_or_default(),
        })
        .collect::<Vec<_>>()
        .join("\n")
}
