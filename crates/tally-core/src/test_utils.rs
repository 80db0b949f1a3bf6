//! Test utilities for tally-core
//!
//! This module provides testing infrastructure including a mock
//! chat-completions server that can be used for integration tests.

use std::net::SocketAddr;
use std::sync::{Arc, Mutex};

use axum::{
    extract::{Json, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Router,
};
use serde_json::{json, Value};
use tokio::sync::oneshot;

/// How the mock server answers `/chat/completions`
#[derive(Debug, Clone)]
enum Reply {
    /// Standard OpenAI body carrying this assistant text
    Content(String),
    /// Arbitrary JSON body with status 200
    Body(Value),
    /// Error status with a text body
    Status(u16, String),
}

#[derive(Clone)]
struct MockState {
    reply: Reply,
    requests: Arc<Mutex<Vec<Value>>>,
}

/// Mock OpenAI-compatible server for testing
pub struct MockChatServer {
    addr: SocketAddr,
    requests: Arc<Mutex<Vec<Value>>>,
    shutdown_tx: Option<oneshot::Sender<()>>,
}

impl MockChatServer {
    /// Start a server whose assistant reply is always `content`
    pub async fn with_content(content: &str) -> Self {
        Self::start(Reply::Content(content.to_string())).await
    }

    /// Start a server that answers with a raw JSON body
    pub async fn with_body(body: Value) -> Self {
        Self::start(Reply::Body(body)).await
    }

    /// Start a server that fails every completion with `status`
    pub async fn with_status(status: u16, body: &str) -> Self {
        Self::start(Reply::Status(status, body.to_string())).await
    }

    async fn start(reply: Reply) -> Self {
        let requests = Arc::new(Mutex::new(Vec::new()));
        let state = MockState {
            reply,
            requests: requests.clone(),
        };

        let app = Router::new()
            .route("/v1/models", get(handle_models))
            .route("/v1/chat/completions", post(handle_chat))
            .with_state(state);

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        let (shutdown_tx, shutdown_rx) = oneshot::channel();

        tokio::spawn(async move {
            axum::serve(listener, app)
                .with_graceful_shutdown(async {
                    shutdown_rx.await.ok();
                })
                .await
                .unwrap();
        });

        Self {
            addr,
            requests,
            shutdown_tx: Some(shutdown_tx),
        }
    }

    /// Base URL including the `/v1` prefix, ready for `AI_API_BASE`
    pub fn url(&self) -> String {
        format!("http://{}/v1", self.addr)
    }

    /// Request bodies received so far
    pub fn requests(&self) -> Vec<Value> {
        self.requests.lock().unwrap().clone()
    }

    /// Stop the mock server
    pub fn stop(&mut self) {
        if let Some(tx) = self.shutdown_tx.take() {
            let _ = tx.send(());
        }
    }
}

impl Drop for MockChatServer {
    fn drop(&mut self) {
        self.stop();
    }
}

async fn handle_models() -> Json<Value> {
    Json(json!({
        "object": "list",
        "data": [{"id": "gpt-4o-mini", "object": "model"}]
    }))
}

async fn handle_chat(State(state): State<MockState>, Json(request): Json<Value>) -> Response {
    let model = request["model"].as_str().unwrap_or("mock").to_string();
    state.requests.lock().unwrap().push(request);

    match state.reply {
        Reply::Content(content) => Json(json!({
            "id": "chatcmpl-mock",
            "object": "chat.completion",
            "model": model,
            "choices": [{
                "index": 0,
                "message": {"role": "assistant", "content": content},
                "finish_reason": "stop"
            }]
        }))
        .into_response(),
        Reply::Body(body) => Json(body).into_response(),
        Reply::Status(status, body) => (
            StatusCode::from_u16(status).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR),
            body,
        )
            .into_response(),
    }
}
