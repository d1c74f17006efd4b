//! End-to-end tests over a live WebSocket connection
//!
//! Each test binds the real server on an ephemeral port, connects with a
//! plain tungstenite client and speaks the wire protocol exactly as the
//! browser frontend does.

use futures::{SinkExt, StreamExt};
use relay_engine::config::Config;
use relay_engine::server::{build_state, router, AppState};
use serde_json::Value;
use std::net::SocketAddr;
use std::time::Duration;
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};

type WsClient = WebSocketStream<MaybeTlsStream<TcpStream>>;

async fn start_server(config: Config) -> (SocketAddr, AppState) {
    let state = build_state(&config);
    let app = router(state.clone());
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
        .await
        .expect("bind ephemeral port");
    let addr = listener.local_addr().expect("local addr");

    tokio::spawn(async move {
        axum::serve(listener, app).await.expect("server runs");
    });

    (addr, state)
}

async fn connect(addr: SocketAddr) -> WsClient {
    let (client, _response) = tokio_tungstenite::connect_async(format!("ws://{}/ws", addr))
        .await
        .expect("websocket connects");
    client
}

async fn receive(client: &mut WsClient) -> Value {
    loop {
        let frame = tokio::time::timeout(Duration::from_secs(10), client.next())
            .await
            .expect("response before deadline")
            .expect("stream still open")
            .expect("frame reads");
        if let Message::Text(text) = frame {
            return serde_json::from_str(&text).expect("response is JSON");
        }
    }
}

async fn request(client: &mut WsClient, payload: &str) -> Value {
    client
        .send(Message::Text(payload.to_string()))
        .await
        .expect("request sends");
    receive(client).await
}

/// Write an executable stub standing in for the external tool.
#[cfg(unix)]
fn stub_tool(dir: &std::path::Path, body: &str) -> String {
    use std::io::Write;
    use std::os::unix::fs::PermissionsExt;

    let path = dir.join("tool.sh");
    let mut file = std::fs::File::create(&path).expect("create stub");
    writeln!(file, "#!/bin/sh").expect("write shebang");
    writeln!(file, "{}", body).expect("write body");
    drop(file);
    std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).expect("chmod stub");
    path.to_string_lossy().into_owned()
}

#[tokio::test]
async fn test_empty_prompt_returns_failure_and_leaves_history_empty() {
    let (addr, _state) = start_server(Config::default()).await;
    let mut client = connect(addr).await;

    let response = request(&mut client, r#"{"type":"ai_chat","prompt":""}"#).await;

    assert_eq!(response["type"], "ai_response");
    assert_eq!(response["result"]["success"], false);
    assert_eq!(response["result"]["error"], "Empty prompt provided");
    assert!(response["session_id"].as_str().is_some());

    let history = request(&mut client, r#"{"type":"get_conversation_history"}"#).await;
    assert_eq!(history["type"], "conversation_history");
    assert_eq!(history["session_id"], response["session_id"]);
    assert_eq!(
        history["history"].as_array().expect("history array").len(),
        0
    );
}

#[tokio::test]
async fn test_invalid_json_keeps_connection_open() {
    let (addr, _state) = start_server(Config::default()).await;
    let mut client = connect(addr).await;

    let error = request(&mut client, "this is not json {").await;
    assert_eq!(error["type"], "error");
    assert_eq!(error["message"], "Invalid JSON format");

    // The connection is still usable afterwards
    let response = request(&mut client, r#"{"type":"get_conversation_history"}"#).await;
    assert_eq!(response["type"], "conversation_history");
}

#[tokio::test]
async fn test_unknown_command_type_reports_protocol_error() {
    let (addr, _state) = start_server(Config::default()).await;
    let mut client = connect(addr).await;

    let error = request(&mut client, r#"{"type":"shell","command":"ls"}"#).await;
    assert_eq!(error["type"], "error");
    let message = error["message"].as_str().expect("message string");
    assert!(message.contains("Unknown command type"));
    assert!(message.contains("shell"));
}

#[tokio::test]
async fn test_clear_conversation_acknowledges() {
    let (addr, _state) = start_server(Config::default()).await;
    let mut client = connect(addr).await;

    let response = request(&mut client, r#"{"type":"clear_conversation"}"#).await;
    assert_eq!(response["type"], "conversation_cleared");
    assert_eq!(response["message"], "Conversation history cleared");
    assert!(response["timestamp"].as_str().is_some());
}

#[cfg(unix)]
#[tokio::test]
async fn test_chat_turn_round_trips_and_fills_history() {
    let dir = tempfile::tempdir().expect("tempdir");
    let mut config = Config::default();
    config.tool.command = stub_tool(
        dir.path(),
        r#"echo '{"type":"message","role":"assistant","content":[{"type":"output_text","text":"42"}]}'"#,
    );
    config.core.workspace = dir.path().to_path_buf();

    let (addr, _state) = start_server(config).await;
    let mut client = connect(addr).await;

    let response = request(
        &mut client,
        r#"{"type":"ai_chat","prompt":"meaning of life","auto_save":false}"#,
    )
    .await;

    assert_eq!(response["type"], "ai_response");
    assert_eq!(response["prompt"], "meaning of life");
    assert_eq!(response["result"]["success"], true);
    assert_eq!(response["result"]["stdout"], "42");
    assert_eq!(response["result"]["exit_code"], 0);

    let history = request(&mut client, r#"{"type":"get_conversation_history"}"#).await;
    let messages = history["history"].as_array().expect("history array");
    assert_eq!(messages.len(), 2);
    assert_eq!(messages[0]["role"], "user");
    assert_eq!(messages[0]["content"], "meaning of life");
    assert_eq!(messages[1]["role"], "assistant");
    assert_eq!(messages[1]["content"], "42");
}

#[cfg(unix)]
#[tokio::test]
async fn test_concurrent_sessions_stay_isolated() {
    let dir = tempfile::tempdir().expect("tempdir");
    let mut config = Config::default();
    config.tool.command = stub_tool(
        dir.path(),
        r#"echo '{"type":"message","role":"assistant","content":"ok"}'"#,
    );
    config.core.workspace = dir.path().to_path_buf();

    let (addr, _state) = start_server(config).await;
    let mut client_a = connect(addr).await;
    let mut client_b = connect(addr).await;

    // Fire both requests before reading either response
    client_a
        .send(Message::Text(
            r#"{"type":"ai_chat","prompt":"prompt from a","auto_save":false}"#.to_string(),
        ))
        .await
        .expect("send a");
    client_b
        .send(Message::Text(
            r#"{"type":"ai_chat","prompt":"prompt from b","auto_save":false}"#.to_string(),
        ))
        .await
        .expect("send b");

    let response_a = receive(&mut client_a).await;
    let response_b = receive(&mut client_b).await;

    assert_eq!(response_a["result"]["success"], true);
    assert_eq!(response_b["result"]["success"], true);
    assert_eq!(response_a["prompt"], "prompt from a");
    assert_eq!(response_b["prompt"], "prompt from b");
    assert_ne!(response_a["session_id"], response_b["session_id"]);

    // Each connection's history holds only its own conversation
    let history_a = request(&mut client_a, r#"{"type":"get_conversation_history"}"#).await;
    let history_b = request(&mut client_b, r#"{"type":"get_conversation_history"}"#).await;

    let messages_a = history_a["history"].as_array().expect("history a");
    let messages_b = history_b["history"].as_array().expect("history b");
    assert_eq!(messages_a.len(), 2);
    assert_eq!(messages_b.len(), 2);
    assert_eq!(messages_a[0]["content"], "prompt from a");
    assert_eq!(messages_b[0]["content"], "prompt from b");
}

#[tokio::test]
async fn test_hub_tracks_connections() {
    let (addr, state) = start_server(Config::default()).await;

    assert_eq!(state.hub.connection_count(), 0);

    let client = connect(addr).await;
    // Give the server a moment to register the connection
    tokio::time::sleep(Duration::from_millis(100)).await;
    assert_eq!(state.hub.connection_count(), 1);

    drop(client);
    tokio::time::sleep(Duration::from_millis(200)).await;
    assert_eq!(state.hub.connection_count(), 0);
}
