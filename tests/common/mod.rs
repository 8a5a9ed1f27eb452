//! Shared fixtures: an in-process MCP server and a scripted model driver.

#![allow(dead_code)]

use std::collections::VecDeque;
use std::net::SocketAddr;
use std::sync::Arc;
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use axum::{
    Json, Router,
    extract::State,
    http::{HeaderMap, HeaderValue, StatusCode, header},
    response::{IntoResponse, Response},
    routing::post,
};
use serde_json::{Value, json};

use timeoff_agent::config::{AgentConfig, AppConfig};
use timeoff_agent::llm::{EventStream, LlmDriver, LlmRequest};
use timeoff_agent::mcp::McpEndpointConfig;
use timeoff_agent::normalized::NormalizedEvent;

pub const SESSION_ID: &str = "mock-session-1";

/// Behaviour and recorded traffic of the mock MCP server.
#[derive(Debug, Default)]
pub struct MockState {
    /// Tool descriptors returned from `tools/list`.
    pub tools: Vec<Value>,
    /// Prompt names `prompts/get` knows about.
    pub prompts: Vec<String>,
    /// Answer requests with `text/event-stream` bodies instead of JSON.
    pub sse: bool,
    /// Every JSON-RPC method received, in order.
    pub methods: Mutex<Vec<String>>,
    /// Session header seen on each non-initialize message.
    pub session_headers: Mutex<Vec<Option<String>>>,
    /// `(name, arguments)` of every `tools/call`.
    pub calls: Mutex<Vec<(String, Value)>>,
    /// Arguments of every `prompts/get`.
    pub prompt_args: Mutex<Vec<Value>>,
    /// Number of `DELETE` session terminations.
    pub deleted: AtomicUsize,
}

impl MockState {
    pub fn timeoff() -> Self {
        Self {
            tools: vec![
                json!({
                    "name": "get_balance",
                    "description": "Get the time off balance for a user",
                    "inputSchema": {
                        "type": "object",
                        "properties": { "user": { "type": "string" } },
                        "required": ["user"]
                    }
                }),
                json!({
                    "name": "request_timeoff",
                    "description": "File a time off request",
                    "inputSchema": {
                        "type": "object",
                        "properties": {
                            "user": { "type": "string" },
                            "start_date": { "type": "string" },
                            "days": { "type": "integer" }
                        }
                    }
                }),
            ],
            prompts: vec!["get_llm_prompt".to_string()],
            ..Self::default()
        }
    }

    pub fn methods(&self) -> Vec<String> {
        self.methods.lock().unwrap().clone()
    }

    pub fn calls(&self) -> Vec<(String, Value)> {
        self.calls.lock().unwrap().clone()
    }

    pub fn deleted(&self) -> usize {
        self.deleted.load(Ordering::SeqCst)
    }

    /// Wait for `n` session terminations. The `DELETE` is sent by the
    /// transport after the session is cancelled, so it can trail `close()`.
    pub async fn wait_for_deletes(&self, n: usize) {
        let waited = tokio::time::timeout(Duration::from_secs(2), async {
            while self.deleted() < n {
                tokio::time::sleep(Duration::from_millis(10)).await;
            }
        })
        .await;
        assert!(waited.is_ok(), "expected {n} DELETEs, saw {}", self.deleted());
        assert_eq!(self.deleted(), n);
    }
}

#[derive(Debug, Clone)]
pub struct MockMcpServer {
    pub addr: SocketAddr,
    pub state: Arc<MockState>,
}

impl MockMcpServer {
    pub async fn spawn(state: MockState) -> Self {
        let state = Arc::new(state);
        let app = Router::new()
            .route("/mcp", post(handle_post).delete(handle_delete))
            .with_state(Arc::clone(&state));

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        Self { addr, state }
    }

    pub fn url(&self) -> String {
        format!("http://{}/mcp", self.addr)
    }

    pub fn config(&self) -> AppConfig {
        app_config(&self.url())
    }
}

pub fn app_config(url: &str) -> AppConfig {
    AppConfig {
        mcp: McpEndpointConfig::new(url).with_request_timeout(Duration::from_secs(5)),
        agent: AgentConfig::default(),
    }
}

async fn handle_delete(State(state): State<Arc<MockState>>) -> StatusCode {
    state.deleted.fetch_add(1, Ordering::SeqCst);
    StatusCode::OK
}

async fn handle_post(
    State(state): State<Arc<MockState>>,
    headers: HeaderMap,
    Json(msg): Json<Value>,
) -> Response {
    let method = msg["method"].as_str().unwrap_or_default().to_string();
    state.methods.lock().unwrap().push(method.clone());

    if method != "initialize" {
        let session = headers
            .get("mcp-session-id")
            .and_then(|v| v.to_str().ok())
            .map(ToString::to_string);
        state.session_headers.lock().unwrap().push(session);
    }

    let Some(id) = msg.get("id").cloned() else {
        return StatusCode::ACCEPTED.into_response();
    };
    let params = msg.get("params").cloned().unwrap_or(Value::Null);

    let outcome = match method.as_str() {
        "initialize" => Ok(json!({
            "protocolVersion": "2025-03-26",
            "capabilities": { "tools": {}, "prompts": {} },
            "serverInfo": { "name": "timeoff-mock", "version": "0.1.0" }
        })),
        "tools/list" => Ok(json!({ "tools": state.tools })),
        "prompts/get" => get_prompt(&state, &params),
        "tools/call" => Ok(call_tool(&state, &params)),
        other => Err((-32601, format!("Method not found: {other}"))),
    };

    let payload = match outcome {
        Ok(result) => json!({ "jsonrpc": "2.0", "id": id, "result": result }),
        Err((code, message)) => json!({
            "jsonrpc": "2.0",
            "id": id,
            "error": { "code": code, "message": message }
        }),
    };

    let mut response = if state.sse {
        (
            [(header::CONTENT_TYPE, "text/event-stream")],
            format!("event: message\ndata: {payload}\n\n"),
        )
            .into_response()
    } else {
        Json(payload).into_response()
    };

    if method == "initialize" {
        response
            .headers_mut()
            .insert("mcp-session-id", HeaderValue::from_static(SESSION_ID));
    }
    response
}

fn get_prompt(state: &MockState, params: &Value) -> Result<Value, (i64, String)> {
    let name = params["name"].as_str().unwrap_or_default();
    let args = params.get("arguments").cloned().unwrap_or(Value::Null);
    state.prompt_args.lock().unwrap().push(args.clone());

    if !state.prompts.iter().any(|p| p == name) {
        return Err((-32602, format!("Unknown prompt: {name}")));
    }

    let user = args["user"].as_str().unwrap_or_default();
    let prompt = args["prompt"].as_str().unwrap_or_default();
    Ok(json!({
        "description": "HR assistant prompt",
        "messages": [{
            "role": "user",
            "content": {
                "type": "text",
                "text": format!("You are an HR assistant. The current user is {user}. {prompt}")
            }
        }]
    }))
}

fn call_tool(state: &MockState, params: &Value) -> Value {
    let name = params["name"].as_str().unwrap_or_default().to_string();
    let args = params.get("arguments").cloned().unwrap_or(Value::Null);
    state.calls.lock().unwrap().push((name.clone(), args));

    match name.as_str() {
        "get_balance" => json!({ "content": [{ "type": "text", "text": "10" }] }),
        "request_timeoff" => json!({
            "content": [{ "type": "text", "text": "Time off request filed" }]
        }),
        other => json!({
            "content": [{ "type": "text", "text": format!("tool {other} is unavailable") }],
            "isError": true
        }),
    }
}

/// Replays scripted model turns; the last turn repeats once the script runs out.
#[derive(Debug)]
pub struct ScriptedDriver {
    turns: Mutex<VecDeque<Vec<NormalizedEvent>>>,
    last: Vec<NormalizedEvent>,
    requests: Mutex<Vec<LlmRequest>>,
}

impl ScriptedDriver {
    pub fn new(turns: Vec<Vec<NormalizedEvent>>) -> Arc<Self> {
        let last = turns.last().cloned().unwrap_or_default();
        Arc::new(Self {
            turns: Mutex::new(turns.into()),
            last,
            requests: Mutex::new(Vec::new()),
        })
    }

    /// Message lists of every request seen so far.
    pub fn requests(&self) -> Vec<Vec<Value>> {
        self.requests
            .lock()
            .unwrap()
            .iter()
            .map(|r| r.messages.clone())
            .collect()
    }

    /// Tool names advertised on the first request.
    pub fn advertised_tools(&self) -> Vec<String> {
        self.requests
            .lock()
            .unwrap()
            .first()
            .map(|r| {
                r.tools
                    .iter()
                    .filter_map(|t| t["function"]["name"].as_str().map(ToString::to_string))
                    .collect()
            })
            .unwrap_or_default()
    }
}

#[async_trait::async_trait]
impl LlmDriver for ScriptedDriver {
    async fn stream(&self, req: LlmRequest) -> anyhow::Result<EventStream> {
        self.requests.lock().unwrap().push(req);
        let turn = self
            .turns
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| self.last.clone());
        Ok(Box::pin(futures::stream::iter(turn.into_iter().map(Ok))))
    }
}

/// A model turn requesting one tool call.
pub fn tool_turn(name: &str, args: Value) -> Vec<NormalizedEvent> {
    vec![
        NormalizedEvent::ToolCallDelta {
            call_index: 0,
            id: Some("call_1".to_string()),
            name: Some(name.to_string()),
            arguments_delta: Some(args.to_string()),
        },
        NormalizedEvent::Done,
    ]
}

/// A model turn with a plain text answer.
pub fn text_turn(text: &str) -> Vec<NormalizedEvent> {
    vec![
        NormalizedEvent::MessageDelta {
            text: text.to_string(),
        },
        NormalizedEvent::Done,
    ]
}
