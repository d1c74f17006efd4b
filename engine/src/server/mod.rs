//! HTTP/WebSocket server and connection hub
//!
//! Serves the browser frontend (homepage, /static assets, /health) and the
//! /ws endpoint clients drive the engine through. Each accepted WebSocket
//! gets a fresh session id and its own receive loop: inbound messages on a
//! connection are handled strictly one at a time, so a chat turn that sits
//! inside the external tool for two minutes stalls only its own session.
//! Other connections run on independent tasks and make progress freely.
//!
//! The hub tracks live connections for observability; outbound traffic
//! flows through a per-connection channel drained by a writer task, so
//! handlers never touch the socket sink directly.

use axum::{
    extract::{
        ws::{Message as WsMessage, WebSocket},
        State, WebSocketUpgrade,
    },
    response::{Html, IntoResponse, Response},
    routing::get,
    Json, Router,
};
use chrono::Utc;
use futures::{sink::SinkExt, stream::StreamExt};
use serde_json::{json, Value};
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::mpsc;
use tower_http::cors::CorsLayer;
use tower_http::services::ServeDir;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::chat::ChatEngine;
use crate::config::Config;
use crate::conversation::SessionStore;

pub mod protocol;

use protocol::{InboundMessage, OutboundMessage};

/// Outbound channel capacity per connection
const OUTBOUND_BUFFER: usize = 64;

/// How often the idle-eviction sweep runs when enabled
const EVICTION_SWEEP_INTERVAL: Duration = Duration::from_secs(60);

/// Embedded homepage served when the static directory has no index.html.
const FALLBACK_INDEX: &str = r#"<!DOCTYPE html>
<html lang="en">
<head>
    <meta charset="UTF-8">
    <title>Relay</title>
</head>
<body>
    <h1>Relay</h1>
    <p>The server is running, but no frontend was found.</p>
    <p>Place an <code>index.html</code> in the static directory, or connect
    directly to the WebSocket endpoint at <code>/ws</code>.</p>
</body>
</html>"#;

/// Registry of live client connections.
///
/// Holds the outbound sender of every open WebSocket, keyed by connection
/// id. The map is guarded by a mutex that is only held for insertion,
/// removal and counting.
#[derive(Debug, Default)]
pub struct Hub {
    connections: Mutex<HashMap<Uuid, mpsc::Sender<OutboundMessage>>>,
}

impl Hub {
    pub fn new() -> Self {
        Self::default()
    }

    /// Track a new connection; returns its id.
    pub fn register(&self, outbound: mpsc::Sender<OutboundMessage>) -> Uuid {
        let id = Uuid::new_v4();
        let mut connections = self.connections.lock().expect("hub lock poisoned");
        connections.insert(id, outbound);
        id
    }

    /// Forget a connection.
    pub fn unregister(&self, id: &Uuid) {
        let mut connections = self.connections.lock().expect("hub lock poisoned");
        connections.remove(id);
    }

    /// Number of currently open connections.
    pub fn connection_count(&self) -> usize {
        let connections = self.connections.lock().expect("hub lock poisoned");
        connections.len()
    }
}

/// Shared server state injected into every handler.
#[derive(Clone)]
pub struct AppState {
    pub engine: Arc<ChatEngine>,
    pub store: Arc<SessionStore>,
    pub hub: Arc<Hub>,
    pub static_dir: PathBuf,
    pub default_workspace: PathBuf,
}

/// Build the shared state from configuration.
pub fn build_state(config: &Config) -> AppState {
    let store = Arc::new(SessionStore::new(config.conversation.max_history));
    let engine = Arc::new(ChatEngine::new(
        store.clone(),
        &config.conversation,
        &config.tool,
    ));

    AppState {
        engine,
        store,
        hub: Arc::new(Hub::new()),
        static_dir: config.server.static_dir.clone(),
        default_workspace: config.core.workspace.clone(),
    }
}

/// Build the axum router over the given state.
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/", get(index_handler))
        .route("/health", get(health_handler))
        .route("/ws", get(ws_handler))
        .nest_service("/static", ServeDir::new(state.static_dir.clone()))
        .layer(CorsLayer::permissive())
        .with_state(state)
}

/// Bind and run the server until a shutdown signal arrives.
pub async fn serve(config: &Config) -> anyhow::Result<()> {
    let state = build_state(config);

    if config.conversation.idle_eviction_secs > 0 {
        let store = state.store.clone();
        let max_idle = Duration::from_secs(config.conversation.idle_eviction_secs);
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(EVICTION_SWEEP_INTERVAL);
            loop {
                ticker.tick().await;
                let evicted = store.evict_idle(max_idle);
                if evicted > 0 {
                    debug!(evicted, "evicted idle sessions");
                }
            }
        });
    }

    let addr = format!("{}:{}", config.server.host, config.server.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    info!("listening on http://{}", listener.local_addr()?);

    axum::serve(listener, router(state))
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    Ok(())
}

async fn shutdown_signal() {
    tokio::signal::ctrl_c().await.ok();
    info!("shutdown signal received");
}

/// Health check endpoint
async fn health_handler() -> Json<Value> {
    Json(json!({
        "status": "healthy",
        "timestamp": Utc::now(),
    }))
}

/// Homepage: the static index.html, or an embedded fallback page.
async fn index_handler(State(state): State<AppState>) -> Response {
    let index = state.static_dir.join("index.html");
    match tokio::fs::read_to_string(&index).await {
        Ok(contents) => Html(contents).into_response(),
        Err(_) => Html(FALLBACK_INDEX.to_string()).into_response(),
    }
}

/// WebSocket upgrade endpoint
async fn ws_handler(ws: WebSocketUpgrade, State(state): State<AppState>) -> Response {
    ws.on_upgrade(|socket| handle_socket(socket, state))
}

/// Per-connection loop.
///
/// Inbound handling is sequential: the next message is not read until the
/// current one — including a full subprocess run — has been answered.
async fn handle_socket(socket: WebSocket, state: AppState) {
    let session_id = Uuid::new_v4().to_string();
    let (mut ws_tx, mut ws_rx) = socket.split();

    let (out_tx, mut out_rx) = mpsc::channel::<OutboundMessage>(OUTBOUND_BUFFER);
    let connection_id = state.hub.register(out_tx.clone());

    info!(%connection_id, session_id, "WebSocket connection established");

    // Writer task: drains the outbound channel onto the socket
    let writer = tokio::spawn(async move {
        while let Some(outbound) = out_rx.recv().await {
            match serde_json::to_string(&outbound) {
                Ok(text) => {
                    if ws_tx.send(WsMessage::Text(text)).await.is_err() {
                        break;
                    }
                }
                Err(e) => warn!("Failed to serialize outbound message: {}", e),
            }
        }
    });

    while let Some(received) = ws_rx.next().await {
        match received {
            Ok(WsMessage::Text(text)) => {
                debug!(session_id, "received message");
                let response = route_inbound(&text, &session_id, &state).await;
                if out_tx.send(response).await.is_err() {
                    break;
                }
            }
            Ok(WsMessage::Close(_)) => {
                info!(session_id, "connection closed by client");
                break;
            }
            Err(e) => {
                warn!(session_id, "WebSocket error: {}", e);
                break;
            }
            // Ping/Pong/Binary: nothing to do
            _ => {}
        }
    }

    state.hub.unregister(&connection_id);
    drop(out_tx);
    writer.await.ok();
    info!(%connection_id, session_id, "connection closed");
}

/// Decode one inbound payload and dispatch it.
///
/// Malformed JSON and unknown discriminators both come back as structured
/// `error` payloads; neither closes the connection.
async fn route_inbound(text: &str, session_id: &str, state: &AppState) -> OutboundMessage {
    let value: Value = match serde_json::from_str(text) {
        Ok(value) => value,
        Err(_) => {
            return OutboundMessage::Error {
                message: "Invalid JSON format".to_string(),
            }
        }
    };

    match serde_json::from_value::<InboundMessage>(value.clone()) {
        Ok(inbound) => dispatch(inbound, session_id, state).await,
        Err(_) => {
            let kind = value
                .get("type")
                .and_then(Value::as_str)
                .unwrap_or("(missing)");
            OutboundMessage::Error {
                message: format!("Unknown command type: {}", kind),
            }
        }
    }
}

async fn dispatch(inbound: InboundMessage, session_id: &str, state: &AppState) -> OutboundMessage {
    match inbound {
        InboundMessage::AiChat {
            prompt,
            workspace,
            auto_save,
        } => {
            let workspace = workspace.unwrap_or_else(|| state.default_workspace.clone());
            let result = state
                .engine
                .handle_chat(session_id, &prompt, &workspace, auto_save)
                .await;
            OutboundMessage::AiResponse {
                session_id: session_id.to_string(),
                prompt,
                result,
            }
        }

        InboundMessage::ClearConversation => {
            state.store.clear(session_id);
            info!(session_id, "conversation cleared");
            OutboundMessage::ConversationCleared {
                session_id: session_id.to_string(),
                message: "Conversation history cleared".to_string(),
                timestamp: Utc::now(),
            }
        }

        InboundMessage::GetConversationHistory => {
            state.store.get_or_create(session_id);
            OutboundMessage::ConversationHistory {
                session_id: session_id.to_string(),
                history: state.store.history(session_id),
                timestamp: Utc::now(),
            }
        }
    }
}
