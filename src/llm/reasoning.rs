//! Reasoning loop: alternate model completions and tool invocations until the
//! model produces an answer.
//!
//! The loop is an explicit state machine:
//!
//! ```text
//! Thinking ──(tool calls)──▶ ToolPending ──(all results appended)──▶ Thinking
//!    │
//!    └──(no tool calls)──▶ Done
//! ```
//!
//! A bounded number of `Thinking` rounds guarantees termination; running out
//! of rounds yields [`LoopOutcome::Inconclusive`].

use std::sync::Arc;
use std::time::Duration;

use uuid::Uuid;

use crate::error::{AgentError, Result};
use crate::mcp::ToolCatalog;

use super::{Completion, LlmDriver, LlmRequest, Message, ToolCall, complete};

/// Default bound on `Thinking` rounds.
pub const DEFAULT_MAX_ITERATIONS: usize = 10;

/// Default deadline for a single model completion.
pub const DEFAULT_MODEL_TIMEOUT: Duration = Duration::from_secs(120);

/// Ordered message history. Grows monotonically; nothing is ever removed.
#[derive(Debug, Clone, Default)]
pub struct Conversation {
    messages: Vec<Message>,
}

impl Conversation {
    #[must_use]
    pub fn new(seed: Vec<Message>) -> Self {
        Self { messages: seed }
    }

    pub fn push(&mut self, message: Message) {
        self.messages.push(message);
    }

    #[must_use]
    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.messages.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    /// Last message, if any.
    #[must_use]
    pub fn last(&self) -> Option<&Message> {
        self.messages.last()
    }

    fn to_api_json(&self) -> Vec<serde_json::Value> {
        self.messages.iter().map(Message::to_api_json).collect()
    }
}

#[derive(Debug)]
enum LoopState {
    Thinking,
    ToolPending(Vec<ToolCall>),
    Done(String),
}

/// How the loop terminated.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LoopOutcome {
    /// The model produced a message without tool calls.
    Answered(String),
    /// The iteration bound was reached while the model still wanted tools.
    Inconclusive { iterations: usize },
}

/// Terminal outcome plus the full conversation that led to it.
#[derive(Debug, Clone)]
pub struct LoopReport {
    pub outcome: LoopOutcome,
    pub conversation: Conversation,
    /// Number of `Thinking` rounds performed.
    pub iterations: usize,
}

/// Drives one conversation against a model and a tool catalog.
#[derive(Clone)]
pub struct ReasoningLoop {
    driver: Arc<dyn LlmDriver>,
    max_iterations: usize,
    model_timeout: Duration,
}

#[allow(clippy::missing_fields_in_debug)]
impl std::fmt::Debug for ReasoningLoop {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ReasoningLoop")
            .field("max_iterations", &self.max_iterations)
            .field("model_timeout", &self.model_timeout)
            .finish()
    }
}

impl ReasoningLoop {
    pub fn new(driver: Arc<dyn LlmDriver>) -> Self {
        Self {
            driver,
            max_iterations: DEFAULT_MAX_ITERATIONS,
            model_timeout: DEFAULT_MODEL_TIMEOUT,
        }
    }

    /// Bound the number of `Thinking` rounds (at least one).
    #[must_use]
    pub fn with_max_iterations(mut self, max_iterations: usize) -> Self {
        self.max_iterations = max_iterations.max(1);
        self
    }

    #[must_use]
    pub fn with_model_timeout(mut self, timeout: Duration) -> Self {
        self.model_timeout = timeout;
        self
    }

    #[must_use]
    pub fn max_iterations(&self) -> usize {
        self.max_iterations
    }

    /// Run the loop from `seed` until it reaches `Done` or the iteration bound.
    ///
    /// Tool failures are folded into the conversation; model failures and
    /// timeouts abort the run.
    pub async fn run(&self, catalog: &ToolCatalog, seed: Vec<Message>) -> Result<LoopReport> {
        let request_id = Uuid::new_v4().to_string();
        let tools = catalog.openai_tools_json();
        let mut conversation = Conversation::new(seed);
        let mut iterations = 0;
        let mut state = LoopState::Thinking;

        tracing::info!(
            request_id = %request_id,
            message_count = conversation.len(),
            tool_count = tools.len(),
            max_iterations = self.max_iterations,
            "Starting reasoning loop"
        );

        loop {
            state = match state {
                LoopState::Thinking => {
                    if iterations >= self.max_iterations {
                        tracing::warn!(
                            request_id = %request_id,
                            iteration = iterations,
                            max_iterations = self.max_iterations,
                            "Maximum tool loop iterations exceeded"
                        );
                        return Ok(LoopReport {
                            outcome: LoopOutcome::Inconclusive { iterations },
                            conversation,
                            iterations,
                        });
                    }
                    iterations += 1;

                    let Completion {
                        content,
                        tool_calls,
                    } = self
                        .think(&conversation, &tools, &request_id, iterations)
                        .await?;

                    if tool_calls.is_empty() {
                        conversation.push(Message::assistant(content.clone()));
                        LoopState::Done(content)
                    } else {
                        conversation.push(Message::assistant_tool_calls(content, tool_calls.clone()));
                        LoopState::ToolPending(tool_calls)
                    }
                }
                LoopState::ToolPending(calls) => {
                    for call in &calls {
                        let result = Self::invoke(catalog, call, &request_id, iterations).await?;
                        conversation.push(result);
                    }
                    LoopState::Thinking
                }
                LoopState::Done(answer) => {
                    tracing::info!(
                        request_id = %request_id,
                        iteration = iterations,
                        answer_length = answer.len(),
                        "Reasoning loop finished"
                    );
                    return Ok(LoopReport {
                        outcome: LoopOutcome::Answered(answer),
                        conversation,
                        iterations,
                    });
                }
            };
        }
    }

    async fn think(
        &self,
        conversation: &Conversation,
        tools: &[serde_json::Value],
        request_id: &str,
        iteration: usize,
    ) -> Result<Completion> {
        let req = LlmRequest {
            messages: conversation.to_api_json(),
            tools: tools.to_vec(),
        };

        tracing::debug!(
            request_id = %request_id,
            iteration,
            message_count = req.messages.len(),
            "Sending request to LLM driver"
        );

        let completion = tokio::time::timeout(self.model_timeout, complete(self.driver.as_ref(), req))
            .await
            .map_err(|_| AgentError::Timeout {
                operation: "model completion".to_string(),
                after: self.model_timeout,
            })??;

        tracing::info!(
            request_id = %request_id,
            iteration,
            content_length = completion.content.len(),
            tool_call_count = completion.tool_calls.len(),
            "Model turn complete"
        );

        Ok(completion)
    }

    async fn invoke(
        catalog: &ToolCatalog,
        call: &ToolCall,
        request_id: &str,
        iteration: usize,
    ) -> Result<Message> {
        let tool_name = call.function.name.as_str();
        tracing::info!(
            request_id = %request_id,
            iteration,
            tool_id = %call.id,
            tool_name = %tool_name,
            "Executing tool"
        );
        tracing::debug!(
            request_id = %request_id,
            tool_id = %call.id,
            arguments = %call.function.arguments,
            "Tool call arguments"
        );

        let outcome = match call.parsed_arguments() {
            Ok(args) => catalog.invoke(tool_name, args).await,
            Err(e) => Err(e),
        };

        match outcome {
            Ok(output) => {
                tracing::debug!(
                    request_id = %request_id,
                    tool_name = %tool_name,
                    result_length = output.len(),
                    "Tool execution succeeded"
                );
                Ok(Message::tool_result(&call.id, output, false))
            }
            Err(e @ AgentError::ToolInvocation { .. }) => {
                tracing::warn!(
                    request_id = %request_id,
                    tool_name = %tool_name,
                    error = %e,
                    "Tool execution failed"
                );
                Ok(Message::tool_result(&call.id, format!("Error: {e}"), true))
            }
            Err(e) => Err(e),
        }
    }
}
