//! In-process mock chain node for adapter tests

use axum::extract::State;
use axum::http::{StatusCode, Uri};
use axum::response::{IntoResponse, Response};
use axum::{Json, Router};
use serde_json::Value;
use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::{Arc, Mutex};
use tokio::task::JoinHandle;

type Handler = dyn Fn(&str, &Value) -> Value + Send + Sync;

struct NodeState {
    handler: Option<Box<Handler>>,
    status: StatusCode,
    hits: Mutex<HashMap<String, usize>>,
}

/// Answers every POST. JSON-RPC requests are keyed by `method`, anything else
/// (the Tron HTTP API) by request path.
pub struct MockNode {
    addr: SocketAddr,
    state: Arc<NodeState>,
    task: JoinHandle<()>,
}

impl MockNode {
    pub async fn start<F>(handler: F) -> Self
    where
        F: Fn(&str, &Value) -> Value + Send + Sync + 'static,
    {
        Self::spawn(Some(Box::new(handler)), StatusCode::OK).await
    }

    /// Node that answers every request with a bare status code
    pub async fn start_with_status(status: u16) -> Self {
        let status = StatusCode::from_u16(status).unwrap();
        Self::spawn(None, status).await
    }

    async fn spawn(handler: Option<Box<Handler>>, status: StatusCode) -> Self {
        let state = Arc::new(NodeState {
            handler,
            status,
            hits: Mutex::new(HashMap::new()),
        });

        let app = Router::new().fallback(respond).with_state(state.clone());
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let task = tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        Self { addr, state, task }
    }

    pub fn url(&self) -> String {
        format!("http://{}", self.addr)
    }

    /// Requests seen for a JSON-RPC method or path
    pub fn hits(&self, key: &str) -> usize {
        self.state
            .hits
            .lock()
            .unwrap()
            .get(key)
            .copied()
            .unwrap_or(0)
    }
}

impl Drop for MockNode {
    fn drop(&mut self) {
        self.task.abort();
    }
}

async fn respond(State(state): State<Arc<NodeState>>, uri: Uri, body: String) -> Response {
    let body: Value = serde_json::from_str(&body).unwrap_or(Value::Null);
    let key = body
        .get("method")
        .and_then(|m| m.as_str())
        .map(str::to_string)
        .unwrap_or_else(|| uri.path().to_string());

    *state.hits.lock().unwrap().entry(key.clone()).or_insert(0) += 1;

    match &state.handler {
        Some(handler) => Json(handler(&key, &body)).into_response(),
        None => state.status.into_response(),
    }
}
