//! REST endpoints over the dispatcher.
//!
//! Thin boundary: validation and defaulting happen here, everything else is
//! delegated to the external agent loop behind the [`Dispatcher`] trait.

use std::sync::Arc;

use async_trait::async_trait;
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::{Deserialize, Serialize};

/// External agent loop, abstracted for testability.
#[async_trait]
pub trait Dispatcher: Send + Sync {
    /// Run one turn and return the final response text.
    async fn dispatch(
        &self,
        content: &str,
        session_key: &str,
        channel: &str,
        chat_id: &str,
    ) -> anyhow::Result<String>;

    /// Current tool definitions (name/description records).
    fn tool_definitions(&self) -> Vec<serde_json::Value>;

    /// Startup/status record.
    fn startup_info(&self) -> serde_json::Value;
}

/// Shared state for API routes.
#[derive(Clone)]
pub struct ApiState {
    pub dispatcher: Arc<dyn Dispatcher>,
}

#[derive(Debug, Deserialize, Default)]
struct DispatchRequest {
    #[serde(default)]
    content: String,
    #[serde(default)]
    session_key: String,
    #[serde(default)]
    channel: String,
    #[serde(default)]
    chat_id: String,
}

#[derive(Debug, Serialize)]
struct DispatchResponse {
    #[serde(skip_serializing_if = "String::is_empty")]
    content: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    finish_reason: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    error: String,
}

impl DispatchResponse {
    fn ok(content: String) -> Self {
        Self {
            content,
            finish_reason: "stop".to_string(),
            error: String::new(),
        }
    }

    fn error(reason: impl Into<String>, error: String) -> Self {
        Self {
            content: String::new(),
            finish_reason: reason.into(),
            error,
        }
    }
}

/// POST /dispatch
///
/// Runs one agent turn over the API channel. Missing fields get defaults;
/// empty content is rejected.
async fn handle_dispatch(
    State(state): State<ApiState>,
    Json(mut req): Json<DispatchRequest>,
) -> impl IntoResponse {
    if req.content.is_empty() {
        return (
            StatusCode::BAD_REQUEST,
            Json(DispatchResponse::error("", "content is required".to_string())),
        );
    }

    if req.channel.is_empty() {
        req.channel = "api".to_string();
    }
    if req.chat_id.is_empty() {
        req.chat_id = "dispatch".to_string();
    }
    if req.session_key.is_empty() {
        req.session_key = format!("api:{}", req.chat_id);
    }

    match state
        .dispatcher
        .dispatch(&req.content, &req.session_key, &req.channel, &req.chat_id)
        .await
    {
        Ok(content) => (StatusCode::OK, Json(DispatchResponse::ok(content))),
        Err(e) => (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(DispatchResponse::error("error", e.to_string())),
        ),
    }
}

/// GET /tools
///
/// Returns the dispatcher's tool definitions; an empty list, never null.
async fn handle_tools(State(state): State<ApiState>) -> impl IntoResponse {
    let tools = state.dispatcher.tool_definitions();
    Json(serde_json::json!({
        "count": tools.len(),
        "tools": tools,
    }))
}

/// GET /status
///
/// Returns the dispatcher's startup record verbatim.
async fn handle_status(State(state): State<ApiState>) -> impl IntoResponse {
    let mut info = state.dispatcher.startup_info();
    if info.is_null() {
        info = serde_json::json!({});
    }
    Json(info)
}

/// Build the API routes.
pub fn api_routes(dispatcher: Arc<dyn Dispatcher>) -> Router {
    Router::new()
        .route("/dispatch", post(handle_dispatch))
        .route("/tools", get(handle_tools))
        .route("/status", get(handle_status))
        .with_state(ApiState { dispatcher })
}
