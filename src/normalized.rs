//! Normalized event types for streaming LLM responses.
//!
//! Drivers translate their provider's wire format into [`NormalizedEvent`]s;
//! the reasoning loop folds them into one model turn without caring which
//! provider produced them.

use serde::{Deserialize, Serialize};

/// Normalized streaming events emitted by LLM drivers.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", content = "data")]
pub enum NormalizedEvent {
    /// Incremental text delta from the assistant's response.
    #[serde(rename = "message.delta")]
    MessageDelta {
        /// The text fragment to append.
        text: String,
    },

    /// Incremental tool call delta (streaming tool call assembly).
    #[serde(rename = "tool_call.delta")]
    ToolCallDelta {
        /// Index of this tool call in the current batch.
        call_index: usize,
        /// Tool call ID (may arrive in first delta or later).
        #[serde(skip_serializing_if = "Option::is_none")]
        id: Option<String>,
        /// Tool/function name (may arrive in first delta or later).
        #[serde(skip_serializing_if = "Option::is_none")]
        name: Option<String>,
        /// Incremental arguments JSON fragment.
        #[serde(skip_serializing_if = "Option::is_none")]
        arguments_delta: Option<String>,
    },

    /// Tool call is fully assembled and ready for execution.
    #[serde(rename = "tool_call.complete")]
    ToolCallComplete {
        /// Index of this tool call in the current batch.
        call_index: usize,
        /// Tool call ID.
        id: String,
        /// Tool/function name.
        name: String,
        /// Complete arguments as JSON string.
        arguments_json: String,
    },

    /// An error occurred during streaming.
    #[serde(rename = "error")]
    Error {
        /// Error message.
        message: String,
        /// Optional error code for programmatic handling.
        #[serde(skip_serializing_if = "Option::is_none")]
        code: Option<String>,
    },

    /// Stream has completed successfully.
    #[serde(rename = "done")]
    Done,
}

impl NormalizedEvent {
    /// Event name used in logs.
    pub fn name(&self) -> &'static str {
        match self {
            Self::MessageDelta { .. } => "message.delta",
            Self::ToolCallDelta { .. } => "tool_call.delta",
            Self::ToolCallComplete { .. } => "tool_call.complete",
            Self::Error { .. } => "error",
            Self::Done => "done",
        }
    }
}
