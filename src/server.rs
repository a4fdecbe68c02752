//! HTTP API for the chat frontend.

use std::sync::Arc;

use axum::extract::State;
use axum::http::{HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::{Deserialize, Serialize};
use serde_json::json;
use tower_http::cors::{AllowHeaders, AllowMethods, AllowOrigin, CorsLayer};
use tracing::{debug, error};

use crate::forecast::{ForecastEngine, UsageData};
use crate::session::{SessionStore, DEFAULT_SESSION};
use crate::tools::Credential;
use crate::Agent;

/// Shared application state passed to all handlers via axum's `State` extractor.
#[derive(Clone)]
pub struct AppState {
    pub agent: Arc<Agent>,
    pub sessions: Arc<SessionStore>,
    pub forecaster: Arc<ForecastEngine>,
    pub default_credential: Credential,
}

/// Build the full axum router with CORS for the frontend origin.
pub fn build_router(state: AppState, cors_origin: HeaderValue) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(AllowOrigin::exact(cors_origin))
        .allow_methods(AllowMethods::mirror_request())
        .allow_headers(AllowHeaders::mirror_request())
        .allow_credentials(true);

    Router::new()
        .route("/chat", post(chat))
        .route("/chat/clear", post(clear_chat))
        .route("/health", get(health))
        .route("/forecast", post(forecast))
        .with_state(state)
        .layer(cors)
}

/// Error body `{"detail": ...}` with a status code.
#[derive(Debug)]
pub struct ApiError {
    status: StatusCode,
    detail: String,
}

impl ApiError {
    fn bad_request(detail: impl Into<String>) -> Self {
        Self {
            status: StatusCode::BAD_REQUEST,
            detail: detail.into(),
        }
    }

    fn internal(detail: impl Into<String>) -> Self {
        Self {
            status: StatusCode::INTERNAL_SERVER_ERROR,
            detail: detail.into(),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.status, Json(json!({ "detail": self.detail }))).into_response()
    }
}

#[derive(Debug, Deserialize)]
pub struct ChatRequest {
    pub message: String,
    #[serde(default)]
    pub auth_token: Option<String>,
    #[serde(default)]
    pub session_id: Option<String>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ChatResponse {
    pub response: String,
}

/// POST /chat: one conversational turn.
async fn chat(
    State(app): State<AppState>,
    Json(body): Json<ChatRequest>,
) -> Result<Json<ChatResponse>, ApiError> {
    if body.message.trim().is_empty() {
        return Err(ApiError::bad_request("message must not be empty"));
    }

    let session_id = session_or_default(body.session_id.as_deref());
    let credential = Credential::resolve(body.auth_token.as_deref(), &app.default_credential);
    debug!(session = session_id, "chat request");

    let history = app.sessions.get_or_create(session_id).await;
    let mut history = history.lock().await;
    let outcome = app
        .agent
        .process_query(&mut history, &body.message, &credential)
        .await;

    Ok(Json(ChatResponse {
        response: outcome.into_text(),
    }))
}

#[derive(Debug, Default, Deserialize)]
pub struct ClearRequest {
    #[serde(default)]
    pub session_id: Option<String>,
}

/// POST /chat/clear. The body is optional.
async fn clear_chat(
    State(app): State<AppState>,
    body: Option<Json<ClearRequest>>,
) -> Json<serde_json::Value> {
    let body = body.map(|Json(b)| b).unwrap_or_default();
    app.sessions
        .clear(session_or_default(body.session_id.as_deref()))
        .await;
    Json(json!({ "message": "Chat history cleared" }))
}

async fn health() -> Json<serde_json::Value> {
    Json(json!({ "status": "healthy" }))
}

#[derive(Debug, Deserialize)]
pub struct ForecastRequest {
    pub data: UsageData,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ForecastResponse {
    /// The six weeks, serialized as a JSON string.
    pub forecast: String,
    pub insights: String,
}

/// POST /forecast. Always answers, falling back when the model cannot.
async fn forecast(
    State(app): State<AppState>,
    Json(body): Json<ForecastRequest>,
) -> Result<Json<ForecastResponse>, ApiError> {
    let result = app.forecaster.forecast(&body.data).await;
    debug!(source = ?result.source, "forecast ready");

    let forecast = serde_json::to_string(&result.weeks).map_err(|e| {
        error!(error = %e, "failed to serialize forecast");
        ApiError::internal(e.to_string())
    })?;

    Ok(Json(ForecastResponse {
        forecast,
        insights: result.insights,
    }))
}

fn session_or_default(session_id: Option<&str>) -> &str {
    match session_id.map(str::trim) {
        Some(id) if !id.is_empty() => id,
        _ => DEFAULT_SESSION,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn blank_session_ids_use_the_default() {
        assert_eq!(session_or_default(None), DEFAULT_SESSION);
        assert_eq!(session_or_default(Some("  ")), DEFAULT_SESSION);
        assert_eq!(session_or_default(Some("alice")), "alice");
    }

    #[tokio::test]
    async fn api_error_renders_detail() {
        let response = ApiError::bad_request("nope").into_response();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }
}
