//! Test utilities for tally-core
//!
//! Mock QuickBooks and OpenAI-compatible HTTP servers, so the real
//! `QuickBooksClient` and `OpenAICompatibleBackend` can be exercised end to
//! end without network access.

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::{Arc, Mutex};

use axum::{
    extract::{Form, Path, Query, State},
    http::{HeaderMap, StatusCode},
    routing::{get, post},
    Json, Router,
};
use serde::Deserialize;
use serde_json::{json, Value};
use tokio::sync::oneshot;

use crate::ai::{AIBackend, MockBackend};

async fn spawn_server(app: Router) -> (SocketAddr, oneshot::Sender<()>) {
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

    (addr, shutdown_tx)
}

// =============================================================================
// QuickBooks
// =============================================================================

#[derive(Default)]
struct QboState {
    accounts: Vec<Value>,
    purchases: Vec<Value>,
    access_token: String,
    refresh_token: String,
    refresh_count: usize,
    queries: Vec<String>,
    reject_refresh: bool,
    fail_queries: bool,
}

/// Mock QuickBooks Online server (token endpoint + query endpoint)
pub struct MockQuickBooksServer {
    addr: SocketAddr,
    state: Arc<Mutex<QboState>>,
    shutdown_tx: Option<oneshot::Sender<()>>,
}

impl MockQuickBooksServer {
    /// Start with an accepted access token and refresh token
    pub async fn start(access_token: &str, refresh_token: &str) -> Self {
        let state = Arc::new(Mutex::new(QboState {
            access_token: access_token.to_string(),
            refresh_token: refresh_token.to_string(),
            ..QboState::default()
        }));

        let app = Router::new()
            .route("/oauth2/v1/tokens/bearer", post(handle_token))
            .route("/v3/company/:realm/query", get(handle_query))
            .with_state(state.clone());

        let (addr, shutdown_tx) = spawn_server(app).await;
        Self {
            addr,
            state,
            shutdown_tx: Some(shutdown_tx),
        }
    }

    pub fn url(&self) -> String {
        format!("http://{}", self.addr)
    }

    pub fn token_url(&self) -> String {
        format!("{}/oauth2/v1/tokens/bearer", self.url())
    }

    /// Add a chart-of-accounts entry
    pub fn add_account(&self, id: &str, name: &str, classification: &str) {
        self.state.lock().unwrap().accounts.push(json!({
            "Id": id,
            "Name": name,
            "Classification": classification,
            "AccountType": classification,
            "Active": true
        }));
    }

    /// Add a purchase paid to `payee`
    pub fn add_purchase(&self, id: &str, payee: &str, note: &str, amount: f64, date: &str) {
        self.state.lock().unwrap().purchases.push(json!({
            "Id": id,
            "EntityRef": {"value": "v", "name": payee},
            "AccountRef": {"value": "35", "name": "Checking"},
            "PrivateNote": note,
            "TotalAmt": amount,
            "TxnDate": date
        }));
    }

    /// Replace the stored purchase with this id
    pub fn update_purchase(&self, id: &str, payee: &str, note: &str, amount: f64, date: &str) {
        self.state
            .lock()
            .unwrap()
            .purchases
            .retain(|p| p["Id"] != id);
        self.add_purchase(id, payee, note, amount, date);
    }

    pub fn reject_refresh(&self, reject: bool) {
        self.state.lock().unwrap().reject_refresh = reject;
    }

    pub fn fail_queries(&self, fail: bool) {
        self.state.lock().unwrap().fail_queries = fail;
    }

    pub fn refresh_count(&self) -> usize {
        self.state.lock().unwrap().refresh_count
    }

    /// Query statements received so far
    pub fn queries(&self) -> Vec<String> {
        self.state.lock().unwrap().queries.clone()
    }

    pub fn stop(&mut self) {
        if let Some(tx) = self.shutdown_tx.take() {
            let _ = tx.send(());
        }
    }
}

impl Drop for MockQuickBooksServer {
    fn drop(&mut self) {
        self.stop();
    }
}

async fn handle_token(
    State(state): State<Arc<Mutex<QboState>>>,
    headers: HeaderMap,
    Form(form): Form<HashMap<String, String>>,
) -> (StatusCode, Json<Value>) {
    let mut state = state.lock().unwrap();
    let has_basic = headers
        .get("authorization")
        .and_then(|v| v.to_str().ok())
        .is_some_and(|v| v.starts_with("Basic "));

    let valid = has_basic
        && !state.reject_refresh
        && form.get("grant_type").map(String::as_str) == Some("refresh_token")
        && form.get("refresh_token") == Some(&state.refresh_token);
    if !valid {
        return (
            StatusCode::BAD_REQUEST,
            Json(json!({"error": "invalid_grant"})),
        );
    }

    state.refresh_count += 1;
    state.access_token = format!("access-{}", state.refresh_count);
    state.refresh_token = format!("refresh-{}", state.refresh_count);

    (
        StatusCode::OK,
        Json(json!({
            "token_type": "bearer",
            "access_token": state.access_token,
            "refresh_token": state.refresh_token,
            "expires_in": 3600,
            "x_refresh_token_expires_in": 8_726_400
        })),
    )
}

#[derive(Deserialize)]
struct QueryParams {
    query: String,
}

async fn handle_query(
    State(state): State<Arc<Mutex<QboState>>>,
    Path(_realm): Path<String>,
    Query(params): Query<QueryParams>,
    headers: HeaderMap,
) -> (StatusCode, Json<Value>) {
    let mut state = state.lock().unwrap();
    state.queries.push(params.query.clone());

    let bearer = headers
        .get("authorization")
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default();
    if bearer != format!("Bearer {}", state.access_token) {
        return (
            StatusCode::UNAUTHORIZED,
            Json(json!({"Fault": {"type": "AUTHENTICATION"}})),
        );
    }
    if state.fail_queries {
        return (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(json!({"Fault": {"type": "SystemFault"}})),
        );
    }

    let query = params.query.to_lowercase();
    let (entity, records) = if query.starts_with("select * from account") {
        ("Account", &state.accounts)
    } else {
        ("Purchase", &state.purchases)
    };
    let start = number_after(&query, "startposition").unwrap_or(1).max(1) - 1;
    let max = number_after(&query, "maxresults").unwrap_or(1000);
    let page: Vec<Value> = records.iter().skip(start).take(max).cloned().collect();

    let mut body = json!({
        "QueryResponse": {"startPosition": start + 1, "maxResults": page.len()},
        "time": "2024-03-01T00:00:00.000-08:00"
    });
    if !page.is_empty() {
        body["QueryResponse"][entity] = Value::Array(page);
    }
    (StatusCode::OK, Json(body))
}

fn number_after(query: &str, keyword: &str) -> Option<usize> {
    let rest = &query[query.find(keyword)? + keyword.len()..];
    rest.split_whitespace().next()?.parse().ok()
}

// =============================================================================
// OpenAI-compatible
// =============================================================================

/// Mock OpenAI-compatible server answering with a `MockBackend`'s decisions
pub struct MockOpenAIServer {
    addr: SocketAddr,
    backend: MockBackend,
    shutdown_tx: Option<oneshot::Sender<()>>,
}

impl MockOpenAIServer {
    pub async fn start() -> Self {
        Self::with_backend(MockBackend::new()).await
    }

    /// Serve decisions from a configured mock (hints, failure injection)
    pub async fn with_backend(backend: MockBackend) -> Self {
        let app = Router::new()
            .route("/v1/models", get(handle_models))
            .route("/v1/chat/completions", post(handle_chat))
            .route("/v1/embeddings", post(handle_embeddings))
            .with_state(backend.clone());

        let (addr, shutdown_tx) = spawn_server(app).await;
        Self {
            addr,
            backend,
            shutdown_tx: Some(shutdown_tx),
        }
    }

    pub fn url(&self) -> String {
        format!("http://{}", self.addr)
    }

    /// The mock behind the server, for call inspection
    pub fn backend(&self) -> &MockBackend {
        &self.backend
    }

    pub fn stop(&mut self) {
        if let Some(tx) = self.shutdown_tx.take() {
            let _ = tx.send(());
        }
    }
}

impl Drop for MockOpenAIServer {
    fn drop(&mut self) {
        self.stop();
    }
}

async fn handle_models() -> Json<Value> {
    Json(json!({"object": "list", "data": [{"id": "mock", "object": "model"}]}))
}

#[derive(Deserialize)]
struct ChatRequest {
    model: String,
    messages: Vec<ChatMessage>,
}

#[derive(Deserialize)]
struct ChatMessage {
    role: String,
    content: String,
}

async fn handle_chat(
    State(backend): State<MockBackend>,
    Json(request): Json<ChatRequest>,
) -> (StatusCode, Json<Value>) {
    let system = request
        .messages
        .iter()
        .find(|m| m.role == "system")
        .map(|m| m.content.as_str());
    let Some(user) = request.messages.iter().rev().find(|m| m.role == "user") else {
        return (
            StatusCode::BAD_REQUEST,
            Json(json!({"error": {"message": "no user message"}})),
        );
    };

    match backend.complete_json(system, &user.content).await {
        Ok(content) => (
            StatusCode::OK,
            Json(json!({
                "id": "chatcmpl-mock",
                "object": "chat.completion",
                "model": request.model,
                "choices": [{
                    "index": 0,
                    "message": {"role": "assistant", "content": content},
                    "finish_reason": "stop"
                }]
            })),
        ),
        Err(e) => (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(json!({"error": {"message": e.to_string()}})),
        ),
    }
}

#[derive(Deserialize)]
struct EmbeddingRequest {
    model: String,
    input: String,
}

async fn handle_embeddings(
    State(backend): State<MockBackend>,
    Json(request): Json<EmbeddingRequest>,
) -> (StatusCode, Json<Value>) {
    match backend.embed(&request.input).await {
        Ok(embedding) => (
            StatusCode::OK,
            Json(json!({
                "object": "list",
                "model": request.model,
                "data": [{"object": "embedding", "index": 0, "embedding": embedding}]
            })),
        ),
        Err(e) => (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(json!({"error": {"message": e.to_string()}})),
        ),
    }
}
