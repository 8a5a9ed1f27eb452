mod common;

use std::sync::Arc;
use std::time::Duration;

use serde_json::json;
use tokio_util::sync::CancellationToken;

use common::{MockMcpServer, MockState, SESSION_ID, ScriptedDriver, app_config, text_turn, tool_turn};
use timeoff_agent::llm::{EventStream, LlmDriver, LlmRequest};
use timeoff_agent::mcp::{ProtocolSession, ToolCatalog, TransportSession};
use timeoff_agent::{AgentError, Orchestrator, SENTINEL};

async fn open_session(server: &MockMcpServer) -> Arc<ProtocolSession> {
    let config = server.config();
    let transport = TransportSession::open(&config.mcp).unwrap();
    Arc::new(ProtocolSession::new(transport, config.mcp.request_timeout()))
}

#[tokio::test]
async fn test_balance_query_end_to_end() {
    let server = MockMcpServer::spawn(MockState::timeoff()).await;
    let driver = ScriptedDriver::new(vec![
        tool_turn("get_balance", json!({ "user": "Alice" })),
        text_turn("You have 10 days"),
    ]);
    let orchestrator = Orchestrator::new(server.config(), driver.clone());

    let answer = orchestrator.run("Alice", "What is my time off balance?").await;
    assert_eq!(answer, "You have 10 days");

    // Handshake, discovery, prompt, one tool call
    assert_eq!(
        server.state.methods(),
        vec![
            "initialize",
            "notifications/initialized",
            "tools/list",
            "prompts/get",
            "tools/call"
        ]
    );
    assert_eq!(
        server.state.calls(),
        vec![("get_balance".to_string(), json!({ "user": "Alice" }))]
    );
    assert_eq!(
        server.state.prompt_args.lock().unwrap()[0],
        json!({ "user": "Alice", "prompt": "What is my time off balance?" })
    );

    // Every message after initialize carries the session id
    let headers = server.state.session_headers.lock().unwrap().clone();
    assert!(headers.iter().all(|h| h.as_deref() == Some(SESSION_ID)));

    // The session is torn down once
    server.state.wait_for_deletes(1).await;

    let requests = driver.requests();
    assert_eq!(requests.len(), 2);
    let seed = requests[0][0]["content"].as_str().unwrap();
    assert!(seed.contains("Alice"));
    assert!(seed.contains("What is my time off balance?"));
    assert_eq!(requests[1][2]["role"], "tool");
    assert_eq!(requests[1][2]["content"], "10");
    assert_eq!(driver.advertised_tools(), vec!["get_balance", "request_timeoff"]);
}

#[tokio::test]
async fn test_sse_responses_end_to_end() {
    let server = MockMcpServer::spawn(MockState {
        sse: true,
        ..MockState::timeoff()
    })
    .await;
    let driver = ScriptedDriver::new(vec![
        tool_turn(
            "request_timeoff",
            json!({ "user": "Alice", "start_date": "2025-05-05", "days": 5 }),
        ),
        text_turn("Your request for 5 days starting 2025-05-05 has been filed."),
    ]);
    let orchestrator = Orchestrator::new(server.config(), driver);

    let answer = orchestrator
        .run("Alice", "File a time off request for 5 days starting from 2025-05-05")
        .await;
    assert_eq!(answer, "Your request for 5 days starting 2025-05-05 has been filed.");
    assert_eq!(server.state.calls()[0].1["days"], 5);
}

#[tokio::test]
async fn test_connection_refused_yields_sentinel() {
    // Reserve a port, then free it so nothing is listening there.
    let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);

    let url = format!("http://{addr}/mcp");
    let driver = ScriptedDriver::new(vec![text_turn("unused")]);
    let orchestrator = Orchestrator::new(app_config(&url), driver.clone());

    let err = orchestrator.try_run("Alice", "balance?").await.unwrap_err();
    assert_eq!(err.kind(), "TransportError");

    assert_eq!(orchestrator.run("Alice", "balance?").await, SENTINEL);
    assert!(driver.requests().is_empty());
}

#[tokio::test]
async fn test_unknown_prompt_yields_sentinel() {
    let server = MockMcpServer::spawn(MockState {
        prompts: Vec::new(),
        ..MockState::timeoff()
    })
    .await;
    let driver = ScriptedDriver::new(vec![text_turn("unused")]);
    let orchestrator = Orchestrator::new(server.config(), driver.clone());

    let err = orchestrator.try_run("Alice", "balance?").await.unwrap_err();
    assert!(matches!(err, AgentError::PromptNotFound(ref name) if name == "get_llm_prompt"));

    assert_eq!(orchestrator.run("Alice", "balance?").await, SENTINEL);
    assert!(driver.requests().is_empty());
    server.state.wait_for_deletes(2).await;
}

#[tokio::test]
async fn test_failing_tool_is_reported_to_model() {
    let mut state = MockState::timeoff();
    state.tools.push(json!({ "name": "approve_request", "description": "broken" }));
    let server = MockMcpServer::spawn(state).await;

    let driver = ScriptedDriver::new(vec![
        tool_turn("approve_request", json!({ "id": 7 })),
        text_turn("I could not approve the request."),
    ]);
    let orchestrator = Orchestrator::new(server.config(), driver.clone());

    let answer = orchestrator.run("Alice", "Approve request 7").await;
    assert_eq!(answer, "I could not approve the request.");

    let second = &driver.requests()[1];
    let tool_result = second[2]["content"].as_str().unwrap();
    assert!(tool_result.starts_with("Error: "));
    assert!(tool_result.contains("unavailable"));
}

#[tokio::test]
async fn test_endless_tool_calls_yield_sentinel() {
    let server = MockMcpServer::spawn(MockState::timeoff()).await;
    let driver = ScriptedDriver::new(vec![tool_turn("get_balance", json!({ "user": "Alice" }))]);

    let mut config = server.config();
    config.agent.max_iterations = 2;
    let orchestrator = Orchestrator::new(config, driver.clone());

    assert_eq!(orchestrator.run("Alice", "balance?").await, SENTINEL);
    assert_eq!(driver.requests().len(), 2);
    assert_eq!(server.state.calls().len(), 2);
}

#[tokio::test]
async fn test_catalog_skips_nameless_and_delegates() {
    let mut state = MockState::timeoff();
    state.tools.push(json!({ "description": "no name here" }));
    state.tools.push(json!({ "name": null, "description": "null name" }));
    let server = MockMcpServer::spawn(state).await;

    let session = open_session(&server).await;
    session.initialize().await.unwrap();
    let catalog = ToolCatalog::discover(&session).await.unwrap();

    assert_eq!(catalog.names(), &["get_balance".to_string(), "request_timeoff".to_string()]);

    let out = catalog
        .invoke("get_balance", json!({ "user": "Bob" }))
        .await
        .unwrap();
    assert_eq!(out, "10");
    assert_eq!(
        server.state.calls(),
        vec![("get_balance".to_string(), json!({ "user": "Bob" }))]
    );

    drop(catalog);
    session.close().await;
    server.state.wait_for_deletes(1).await;
}

#[tokio::test]
async fn test_operations_require_initialize() {
    let server = MockMcpServer::spawn(MockState::timeoff()).await;
    let session = open_session(&server).await;

    assert!(matches!(session.list_tools().await, Err(AgentError::NotInitialized)));
    assert!(matches!(
        session.call_tool("get_balance", json!({})).await,
        Err(AgentError::NotInitialized)
    ));
    assert!(server.state.methods().is_empty());

    session.initialize().await.unwrap();
    assert!(session.initialize().await.is_err());
    assert_eq!(session.list_tools().await.unwrap().len(), 2);
    session.close().await;
}

struct StalledDriver;

#[async_trait::async_trait]
impl LlmDriver for StalledDriver {
    async fn stream(&self, _req: LlmRequest) -> anyhow::Result<EventStream> {
        futures::future::pending::<()>().await;
        anyhow::bail!("unreachable")
    }
}

#[tokio::test]
async fn test_cancellation_tears_down_session() {
    let server = MockMcpServer::spawn(MockState::timeoff()).await;
    let orchestrator = Orchestrator::new(server.config(), Arc::new(StalledDriver));

    let token = CancellationToken::new();
    let canceller = token.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(200)).await;
        canceller.cancel();
    });

    let answer = orchestrator.run_with_cancel("Alice", "balance?", token).await;
    assert_eq!(answer, SENTINEL);
    server.state.wait_for_deletes(1).await;
}

#[tokio::test]
async fn test_concurrent_invocations_use_separate_sessions() {
    let server = MockMcpServer::spawn(MockState::timeoff()).await;
    let driver = ScriptedDriver::new(vec![text_turn("You have 10 days")]);
    let orchestrator = Orchestrator::new(server.config(), driver);

    let (a, b) = tokio::join!(
        orchestrator.run("Alice", "balance?"),
        orchestrator.run("Bob", "balance?")
    );
    assert_eq!(a, "You have 10 days");
    assert_eq!(b, "You have 10 days");

    let initializes = server
        .state
        .methods()
        .iter()
        .filter(|m| *m == "initialize")
        .count();
    assert_eq!(initializes, 2);
    server.state.wait_for_deletes(2).await;
}
