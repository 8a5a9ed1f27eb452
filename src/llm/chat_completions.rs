//! `OpenAI` Chat Completions API driver.
//!
//! This module implements the [`LlmDriver`] trait for `OpenAI`-compatible
//! Chat Completions endpoints (`OpenAI`, Azure, the Cohere compatibility API
//! and generic servers), supporting streaming responses and tool calls.

use std::collections::BTreeMap;
use std::time::Duration;

use anyhow::Context;
use futures::StreamExt;

use crate::normalized::NormalizedEvent;

use super::{EventStream, LlmDriver, LlmRequest, LlmSettings};

/// Accumulated state for a streaming tool call.
#[derive(Debug, Default)]
struct ToolAccum {
    id: Option<String>,
    name: Option<String>,
    args: String,
}

/// Driver for the Chat Completions API.
///
/// Posts to the provider's chat completions URL and streams responses as
/// [`NormalizedEvent`]s.
#[derive(Clone)]
pub struct ChatCompletionsDriver {
    http: reqwest::Client,
    settings: LlmSettings,
}

impl std::fmt::Debug for ChatCompletionsDriver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChatCompletionsDriver")
            .field("base_url", &self.settings.base_url)
            .field("model", &self.settings.model)
            .field("provider", &self.settings.provider)
            .finish_non_exhaustive()
    }
}

impl ChatCompletionsDriver {
    /// Create a new Chat Completions driver with the given settings.
    pub fn new(settings: LlmSettings) -> anyhow::Result<Self> {
        let http = reqwest::Client::builder()
            .connect_timeout(Duration::from_secs(10))
            .build()
            .context("failed to build HTTP client for the model endpoint")?;
        Ok(Self { http, settings })
    }

    /// Settings this driver was built with.
    #[must_use]
    pub fn settings(&self) -> &LlmSettings {
        &self.settings
    }

    fn request_body(&self, req: LlmRequest) -> serde_json::Value {
        let mut body = serde_json::json!({
            "model": self.settings.model,
            "stream": true,
            "messages": req.messages,
        });

        if !req.tools.is_empty() {
            body["tools"] = serde_json::Value::Array(req.tools);
            if let Some(parallel) = self.settings.parallel_tool_calls
                && self.settings.provider.supports_parallel_tools()
            {
                body["parallel_tool_calls"] = serde_json::Value::Bool(parallel);
            }
        }

        body
    }
}

#[async_trait::async_trait]
impl LlmDriver for ChatCompletionsDriver {
    async fn stream(&self, req: LlmRequest) -> anyhow::Result<EventStream> {
        let url = self.settings.provider.build_chat_url(&self.settings.base_url);
        let body = self.request_body(req);

        tracing::debug!(url = %url, model = %self.settings.model, "chat completions request");

        let mut rb = self.http.post(&url).json(&body);
        if let Some(k) = &self.settings.api_key {
            let (header, value) = self.settings.provider.auth_header(k);
            rb = rb.header(header, value);
        }

        let resp = rb
            .send()
            .await
            .with_context(|| format!("chat completions request to {url} failed"))?;

        let status = resp.status();
        if !status.is_success() {
            let detail = resp.text().await.unwrap_or_default();
            anyhow::bail!("chat completions returned HTTP {status}: {}", detail.trim());
        }

        let byte_stream = resp.bytes_stream();

        let out = async_stream::try_stream! {
            let mut buf = Vec::<u8>::new();
            let mut tool_accum: BTreeMap<usize, ToolAccum> = BTreeMap::new();
            let mut finished = false;

            futures::pin_mut!(byte_stream);
            while let Some(chunk) = byte_stream.next().await {
                let chunk = chunk?;
                buf.extend_from_slice(&chunk);

                while let Some((pos, sep)) = find_double_newline(&buf) {
                    let frame = buf.drain(..pos + sep).collect::<Vec<_>>();
                    let text = String::from_utf8_lossy(&frame);

                    for line in text.lines() {
                        let line = line.trim();
                        let Some(data) = line.strip_prefix("data:") else {
                            continue;
                        };
                        for event in parse_data_line(data.trim(), &mut tool_accum)? {
                            finished |= matches!(event, NormalizedEvent::Done);
                            yield event;
                        }
                    }
                }
            }

            if !finished {
                yield NormalizedEvent::Done;
            }
        };

        Ok(Box::pin(out))
    }
}

/// Translate one SSE `data:` payload into normalized events.
fn parse_data_line(
    data: &str,
    tool_accum: &mut BTreeMap<usize, ToolAccum>,
) -> anyhow::Result<Vec<NormalizedEvent>> {
    if data == "[DONE]" {
        return Ok(vec![NormalizedEvent::Done]);
    }

    let v: serde_json::Value =
        serde_json::from_str(data).context("malformed chat completions chunk")?;
    let mut events = Vec::new();

    if let Some(err) = v.get("error") {
        events.push(NormalizedEvent::Error {
            message: err
                .get("message")
                .and_then(|m| m.as_str())
                .map_or_else(|| err.to_string(), ToString::to_string),
            code: err.get("code").map(|c| match c.as_str() {
                Some(s) => s.to_string(),
                None => c.to_string(),
            }),
        });
        return Ok(events);
    }

    let choice = &v["choices"][0];
    let delta = &choice["delta"];

    // Assistant text delta
    if let Some(s) = delta.get("content").and_then(|x| x.as_str())
        && !s.is_empty()
    {
        events.push(NormalizedEvent::MessageDelta {
            text: s.to_string(),
        });
    }

    // Tool calls streaming deltas
    if let Some(arr) = delta.get("tool_calls").and_then(|x| x.as_array()) {
        for tc in arr {
            let idx = usize::try_from(tc.get("index").and_then(serde_json::Value::as_u64).unwrap_or(0))
                .unwrap_or(0);
            let id = tc
                .get("id")
                .and_then(|x| x.as_str())
                .map(ToString::to_string);
            let name = tc
                .get("function")
                .and_then(|f| f.get("name"))
                .and_then(|x| x.as_str())
                .map(ToString::to_string);
            let args_delta = tc
                .get("function")
                .and_then(|f| f.get("arguments"))
                .and_then(|x| x.as_str())
                .map(ToString::to_string);

            let entry = tool_accum.entry(idx).or_default();
            if entry.id.is_none() {
                entry.id.clone_from(&id);
            }
            if entry.name.is_none() {
                entry.name.clone_from(&name);
            }
            if let Some(ad) = &args_delta {
                entry.args.push_str(ad);
            }

            events.push(NormalizedEvent::ToolCallDelta {
                call_index: idx,
                id,
                name,
                arguments_delta: args_delta,
            });
        }
    }

    // Completion boundary: emit assembled tool calls
    if choice.get("finish_reason").and_then(|x| x.as_str()) == Some("tool_calls") {
        for (idx, a) in std::mem::take(tool_accum) {
            if let (Some(id), Some(name)) = (a.id, a.name) {
                events.push(NormalizedEvent::ToolCallComplete {
                    call_index: idx,
                    id,
                    name,
                    arguments_json: a.args,
                });
            }
        }
    }

    Ok(events)
}

/// Find the end of an SSE frame, returning its position and separator length.
fn find_double_newline(buf: &[u8]) -> Option<(usize, usize)> {
    let lf = buf.windows(2).position(|w| w == b"\n\n").map(|p| (p, 2));
    let crlf = buf.windows(4).position(|w| w == b"\r\n\r\n").map(|p| (p, 4));
    match (lf, crlf) {
        (Some(a), Some(b)) => Some(if a.0 <= b.0 { a } else { b }),
        (a, b) => a.or(b),
    }
}
