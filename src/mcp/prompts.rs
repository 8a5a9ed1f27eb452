//! Prompt resolution: named server-side templates → initial conversation.

use std::collections::HashMap;

use rmcp::model::{
    ErrorCode, GetPromptResult, PromptMessage, PromptMessageContent, PromptMessageRole,
};

use crate::error::{AgentError, Result};
use crate::llm::{Message, MessageRole};
use crate::mcp::session::ProtocolSession;

/// A named template plus its arguments.
#[derive(Debug, Clone)]
pub struct PromptRequest {
    pub name: String,
    pub arguments: HashMap<String, String>,
}

impl PromptRequest {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            arguments: HashMap::new(),
        }
    }

    #[must_use]
    pub fn with_argument(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.arguments.insert(key.into(), value.into());
        self
    }
}

/// A materialized prompt: the seed of a conversation.
#[derive(Debug, Clone)]
pub struct ResolvedPrompt {
    pub name: String,
    pub description: Option<String>,
    pub messages: Vec<Message>,
}

/// Fetch `request` from the server in a single round trip.
pub async fn resolve(session: &ProtocolSession, request: PromptRequest) -> Result<ResolvedPrompt> {
    let PromptRequest { name, arguments } = request;

    let result = session
        .get_prompt(&name, arguments)
        .await
        .map_err(|e| classify_prompt_error(&name, e))?;

    let resolved = materialize(name, result)?;

    tracing::debug!(
        endpoint = %session.endpoint(),
        prompt = %resolved.name,
        message_count = resolved.messages.len(),
        "prompt resolved"
    );

    Ok(resolved)
}

/// Servers signal a missing template with an invalid-params fault or a
/// message naming the prompt as unknown.
fn classify_prompt_error(name: &str, err: AgentError) -> AgentError {
    match err {
        AgentError::RemoteFault { code, message } => {
            let lower = message.to_lowercase();
            if code == i64::from(ErrorCode::INVALID_PARAMS.0)
                || lower.contains("unknown prompt")
                || lower.contains("not found")
            {
                tracing::warn!(prompt = %name, code, message = %message, "prompt template not found");
                AgentError::PromptNotFound(name.to_string())
            } else {
                AgentError::RemoteFault { code, message }
            }
        }
        other => other,
    }
}

fn materialize(name: String, result: GetPromptResult) -> Result<ResolvedPrompt> {
    if result.messages.is_empty() {
        return Err(AgentError::protocol(format!(
            "prompt '{name}' resolved to no messages"
        )));
    }

    let messages = result.messages.into_iter().map(to_message).collect();

    Ok(ResolvedPrompt {
        name,
        description: result.description,
        messages,
    })
}

fn to_message(pm: PromptMessage) -> Message {
    let role = match pm.role {
        PromptMessageRole::User => MessageRole::User,
        PromptMessageRole::Assistant => MessageRole::Assistant,
    };

    let text = match pm.content {
        PromptMessageContent::Text { text } => text,
        PromptMessageContent::Resource { resource } => resource.get_text(),
        PromptMessageContent::Image { image } => format!("[image: {}]", image.mime_type),
        PromptMessageContent::ResourceLink { link } => link.raw.uri,
    };

    Message::text(role, text)
}
