//! LLM driver traits and implementations.
//!
//! This module provides the model-facing half of the agent: conversation
//! types, the streaming [`LlmDriver`] trait, the `OpenAI`-compatible
//! [`ChatCompletionsDriver`], and the [`ReasoningLoop`] that alternates
//! between model completions and tool invocations.
//!
//! # Example
//!
//! ```rust,ignore
//! use timeoff_agent::llm::{LlmSettings, Provider};
//!
//! let settings = LlmSettings {
//!     base_url: "https://api.openai.com".to_string(),
//!     api_key: Some("sk-...".to_string()),
//!     model: "gpt-4o-mini".to_string(),
//!     provider: Provider::OpenAI,
//!     parallel_tool_calls: None,
//! };
//! ```

pub mod chat_completions;
pub mod provider;
pub mod reasoning;

pub use chat_completions::ChatCompletionsDriver;
pub use provider::Provider;
pub use reasoning::{Conversation, LoopOutcome, LoopReport, ReasoningLoop};

use std::collections::BTreeMap;

use futures::{Stream, StreamExt};

use crate::error::{AgentError, Result};
use crate::normalized::NormalizedEvent;

/// LLM connection and model settings.
#[derive(Debug, Clone)]
pub struct LlmSettings {
    /// Base URL for the LLM API (e.g., `https://api.openai.com`).
    pub base_url: String,
    /// Optional API key for authentication.
    pub api_key: Option<String>,
    /// Model identifier (e.g., `gpt-4o`, `command-r-plus-08-2024`).
    pub model: String,
    /// Provider type (auto-detected from `base_url` if not specified).
    pub provider: Provider,
    /// Whether to enable parallel tool calls (provider-dependent).
    pub parallel_tool_calls: Option<bool>,
}

/// Role of a message author.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageRole {
    /// System prompt.
    System,
    /// User message.
    User,
    /// Assistant response.
    Assistant,
    /// Tool response.
    Tool,
}

/// A message in a conversation.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct Message {
    /// Role of the message author.
    pub role: MessageRole,
    /// Text content.
    pub content: String,
    /// Tool call this message answers (tool results only).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tool_call_id: Option<String>,
    /// Tool calls requested by the assistant.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tool_calls: Option<Vec<ToolCall>>,
    /// Marks a tool result produced by a failed invocation.
    #[serde(skip)]
    pub is_error: bool,
}

impl Message {
    /// Create a plain text message.
    #[must_use]
    pub fn text(role: MessageRole, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
            tool_call_id: None,
            tool_calls: None,
            is_error: false,
        }
    }

    #[must_use]
    pub fn user(content: impl Into<String>) -> Self {
        Self::text(MessageRole::User, content)
    }

    #[must_use]
    pub fn assistant(content: impl Into<String>) -> Self {
        Self::text(MessageRole::Assistant, content)
    }

    /// Assistant turn that requests tool calls.
    #[must_use]
    pub fn assistant_tool_calls(content: impl Into<String>, calls: Vec<ToolCall>) -> Self {
        Self {
            tool_calls: Some(calls),
            ..Self::assistant(content)
        }
    }

    /// Result of one tool call, fed back to the model.
    #[must_use]
    pub fn tool_result(call_id: impl Into<String>, content: impl Into<String>, is_error: bool) -> Self {
        Self {
            tool_call_id: Some(call_id.into()),
            is_error,
            ..Self::text(MessageRole::Tool, content)
        }
    }

    /// The message text.
    #[must_use]
    pub fn text_content(&self) -> &str {
        &self.content
    }

    /// Whether this is an assistant turn requesting tools.
    #[must_use]
    pub fn has_tool_calls(&self) -> bool {
        self.tool_calls.as_ref().is_some_and(|c| !c.is_empty())
    }

    /// Chat Completions wire form.
    ///
    /// Assistant turns with tool calls and no text send `content: null`.
    #[must_use]
    pub fn to_api_json(&self) -> serde_json::Value {
        let mut v = serde_json::to_value(self).unwrap_or_default();
        if self.has_tool_calls() && self.content.is_empty() {
            v["content"] = serde_json::Value::Null;
        }
        v
    }
}

/// A tool call made by the assistant.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct ToolCall {
    /// Unique identifier for this tool call.
    pub id: String,
    /// Type of tool (always "function" for now).
    #[serde(rename = "type")]
    pub call_type: String,
    /// Function details.
    pub function: ToolCallFunction,
}

impl ToolCall {
    #[must_use]
    pub fn function(id: impl Into<String>, name: impl Into<String>, arguments: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            call_type: "function".to_string(),
            function: ToolCallFunction {
                name: name.into(),
                arguments: arguments.into(),
            },
        }
    }

    /// Parsed arguments. An empty argument string means no arguments.
    ///
    /// Malformed JSON or a non-object value is a [`AgentError::ToolInvocation`]
    /// so the model sees the problem and can retry.
    pub fn parsed_arguments(&self) -> Result<serde_json::Value> {
        let raw = self.function.arguments.trim();
        if raw.is_empty() {
            return Ok(serde_json::Value::Object(serde_json::Map::new()));
        }
        match serde_json::from_str::<serde_json::Value>(raw) {
            Ok(v @ serde_json::Value::Object(_)) => Ok(v),
            Ok(serde_json::Value::Null) => Ok(serde_json::Value::Object(serde_json::Map::new())),
            Ok(other) => Err(AgentError::tool(
                &self.function.name,
                format!("invalid arguments: expected a JSON object, got {other}"),
            )),
            Err(e) => Err(AgentError::tool(
                &self.function.name,
                format!("invalid arguments: {e}"),
            )),
        }
    }
}

/// Function details in a tool call.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct ToolCallFunction {
    /// Function name.
    pub name: String,
    /// Arguments as JSON string.
    pub arguments: String,
}

/// Request to an LLM driver.
#[derive(Debug)]
pub struct LlmRequest {
    /// Conversation messages in wire form.
    pub messages: Vec<serde_json::Value>,
    /// Available tools in `OpenAI` function schema format.
    pub tools: Vec<serde_json::Value>,
}

/// Boxed stream of normalized events.
pub type EventStream = std::pin::Pin<Box<dyn Stream<Item = anyhow::Result<NormalizedEvent>> + Send>>;

/// Trait for LLM streaming drivers.
///
/// Implementations of this trait provide streaming access to LLM responses,
/// emitting [`NormalizedEvent`]s as the model generates output.
#[async_trait::async_trait]
pub trait LlmDriver: Send + Sync {
    /// Stream a response from the LLM.
    ///
    /// # Errors
    ///
    /// Returns an error if the request fails or the connection is interrupted.
    async fn stream(&self, req: LlmRequest) -> anyhow::Result<EventStream>;
}

/// One complete model turn: text plus any requested tool calls.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Completion {
    pub content: String,
    pub tool_calls: Vec<ToolCall>,
}

/// Accumulated state for a streaming tool call.
#[derive(Debug, Default, Clone)]
struct ToolCallAccumulator {
    id: Option<String>,
    name: Option<String>,
    arguments: String,
}

/// Drive `driver` for one turn and fold its event stream into a [`Completion`].
pub async fn complete(driver: &dyn LlmDriver, req: LlmRequest) -> Result<Completion> {
    let stream = driver
        .stream(req)
        .await
        .map_err(|e| AgentError::Model(format!("{e:#}")))?;
    collect_completion(stream).await
}

/// Fold a stream of normalized events into a [`Completion`].
pub async fn collect_completion(mut stream: EventStream) -> Result<Completion> {
    let mut content = String::new();
    let mut accumulators: BTreeMap<usize, ToolCallAccumulator> = BTreeMap::new();

    while let Some(event) = stream.next().await {
        match event.map_err(|e| AgentError::Model(format!("{e:#}")))? {
            NormalizedEvent::MessageDelta { text } => content.push_str(&text),
            NormalizedEvent::ToolCallDelta {
                call_index,
                id,
                name,
                arguments_delta,
            } => {
                let acc = accumulators.entry(call_index).or_default();
                if acc.id.is_none() {
                    acc.id = id;
                }
                if acc.name.is_none() {
                    acc.name = name;
                }
                if let Some(delta) = arguments_delta {
                    acc.arguments.push_str(&delta);
                }
            }
            NormalizedEvent::ToolCallComplete {
                call_index,
                id,
                name,
                arguments_json,
            } => {
                accumulators.insert(
                    call_index,
                    ToolCallAccumulator {
                        id: Some(id),
                        name: Some(name),
                        arguments: arguments_json,
                    },
                );
            }
            NormalizedEvent::Error { message, code } => {
                return Err(AgentError::Model(match code {
                    Some(code) => format!("{message} ({code})"),
                    None => message,
                }));
            }
            NormalizedEvent::Done => break,
        }
    }

    let tool_calls = accumulators
        .into_iter()
        .filter_map(|(idx, acc)| {
            let Some(name) = acc.name.filter(|n| !n.is_empty()) else {
                tracing::warn!(call_index = idx, "dropping tool call without a name");
                return None;
            };
            let id = acc
                .id
                .filter(|i| !i.is_empty())
                .unwrap_or_else(|| format!("call_{}", uuid::Uuid::new_v4().simple()));
            Some(ToolCall::function(id, name, acc.arguments))
        })
        .collect();

    Ok(Completion {
        content,
        tool_calls,
    })
}
