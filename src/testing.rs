//! Shared test doubles: a scripted inference provider and an in-process
//! booking backend.

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;

use async_trait::async_trait;
use axum::extract::{Query, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde_json::{json, Value};
use tokio::sync::Mutex;

use crate::error::InferenceError;
use crate::inference::InferenceProvider;
use crate::types::{InferenceRequest, InferenceResponse, Usage};

// --- Mock Provider ---

/// Pops scripted replies in order and records every request it sees.
pub struct MockProvider {
    responses: Mutex<VecDeque<Result<InferenceResponse, InferenceError>>>,
    pub requests: Arc<Mutex<Vec<InferenceRequest>>>,
}

impl MockProvider {
    pub fn new(replies: Vec<&str>) -> Self {
        Self::scripted(replies.into_iter().map(|r| Ok(reply(r))).collect())
    }

    pub fn scripted(responses: Vec<Result<InferenceResponse, InferenceError>>) -> Self {
        Self {
            responses: Mutex::new(responses.into()),
            requests: Arc::default(),
        }
    }
}

pub fn reply(content: &str) -> InferenceResponse {
    InferenceResponse {
        content: content.to_string(),
        usage: Usage {
            input_tokens: 10,
            output_tokens: 5,
        },
    }
}

#[async_trait]
impl InferenceProvider for MockProvider {
    async fn infer(&self, request: InferenceRequest) -> Result<InferenceResponse, InferenceError> {
        self.requests.lock().await.push(request);
        self.responses
            .lock()
            .await
            .pop_front()
            .unwrap_or(Err(InferenceError::Request("no more mock responses".into())))
    }
}

// --- Mock Backend ---

#[derive(Debug, Clone)]
pub struct SeenRequest {
    pub path: String,
    pub site_name: Option<String>,
    pub authorization: Option<String>,
    pub body: Option<Value>,
}

type Seen = Arc<Mutex<Vec<SeenRequest>>>;

/// Booking backend on an ephemeral port.
///
/// - bearer token `wrong` is rejected with 401
/// - site `Basel pRED` has two items, every other site none
/// - booking id `taken` fails with 409 and a `detail` body
pub struct MockBackend {
    pub base_url: String,
    seen: Seen,
}

impl MockBackend {
    pub async fn spawn() -> Self {
        let seen: Seen = Arc::default();
        let router = Router::new()
            .route("/tools/by-site/bookable", get(bookable))
            .route("/bookings", post(bookings))
            .with_state(seen.clone());

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, router).await.unwrap();
        });

        Self {
            base_url: format!("http://{addr}"),
            seen,
        }
    }

    pub async fn requests(&self) -> Vec<SeenRequest> {
        self.seen.lock().await.clone()
    }
}

fn bearer(headers: &HeaderMap) -> Option<String> {
    headers
        .get("authorization")
        .and_then(|v| v.to_str().ok())
        .map(String::from)
}

async fn bookable(
    State(seen): State<Seen>,
    headers: HeaderMap,
    Query(params): Query<HashMap<String, String>>,
) -> Response {
    let authorization = bearer(&headers);
    let site_name = params.get("site_name").cloned();
    seen.lock().await.push(SeenRequest {
        path: "/tools/by-site/bookable".into(),
        site_name: site_name.clone(),
        authorization: authorization.clone(),
        body: None,
    });

    if authorization.as_deref() == Some("Bearer wrong") {
        return (StatusCode::UNAUTHORIZED, "invalid token").into_response();
    }

    let items = if site_name.as_deref() == Some("Basel pRED") {
        json!([
            {
                "id": "45c5a1ee-2929-4b95-8bc9-d36b2b624a1c",
                "manufacturer": "Eppendorf",
                "equipment_model": "Centrifuge 5425",
                "category": "Centrifuge",
                "material_number": 1234567,
                "location": {"room": "101", "floor": 2, "building": "92"},
                "responsible_person": {
                    "first_name": "Ada",
                    "last_name": "Lovelace",
                    "email": "ada@example.com"
                },
                "requires_check_in": true
            },
            {"id": "b-2"}
        ])
    } else {
        json!([])
    };
    Json(items).into_response()
}

async fn bookings(State(seen): State<Seen>, headers: HeaderMap, Json(body): Json<Value>) -> Response {
    seen.lock().await.push(SeenRequest {
        path: "/bookings".into(),
        site_name: None,
        authorization: bearer(&headers),
        body: Some(body.clone()),
    });

    let taken = body["tool_ids"]
        .as_array()
        .is_some_and(|ids| ids.iter().any(|id| id == "taken"));
    if taken {
        return (
            StatusCode::CONFLICT,
            Json(json!({"detail": "Equipment already booked"})),
        )
            .into_response();
    }

    (StatusCode::CREATED, Json(json!({"id": "bk-42"}))).into_response()
}
