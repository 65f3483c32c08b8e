//! HTTP front end for the pipeline.
//!
//! # Endpoints
//!
//! | Method | Path | Description |
//! |--------|------|-------------|
//! | `POST` | `/chat` | Answer a message: `{"message"}` → `{"response", "sources"}` |
//! | `POST` | `/knowledge` | Ingest `{"text", "source"?}`, or `?text=...&source=...` |
//! | `GET`  | `/health` | Version and component readiness |
//!
//! # Error Contract
//!
//! ```json
//! { "error": { "code": "bad_request", "message": "text must not be empty" } }
//! ```
//!
//! Malformed JSON bodies on `/chat` are rejected by axum's `Json` extractor
//! before the handler runs. `/knowledge` reads its fields from the query
//! string when the request has no body, and answers an unparseable body
//! with `bad_request`.
//!
//! # CORS
//!
//! All origins, methods, and headers are permitted so a browser chat page
//! served from anywhere can call the API.

use axum::{
    body::Bytes,
    extract::{Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::generation::GenerationStatus;
use crate::knowledge::{StoreStatus, UpsertOutcome};
use crate::pipeline::{Answer, EncoderStatus, RagPipeline};

/// Source recorded for `/knowledge` submissions that do not name one.
pub const DEFAULT_KNOWLEDGE_SOURCE: &str = "user_input";

/// Build the router. Exposed separately from [`run_server`] so tests can
/// serve it on an ephemeral port.
pub fn router(pipeline: Arc<RagPipeline>) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/chat", post(handle_chat))
        .route("/knowledge", post(handle_knowledge))
        .route("/health", get(handle_health))
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(pipeline)
}

/// Bind `bind_addr` and serve until the process is terminated.
///
/// # Errors
///
/// Fails if the address cannot be bound.
pub async fn run_server(bind_addr: &str, pipeline: Arc<RagPipeline>) -> anyhow::Result<()> {
    let listener = tokio::net::TcpListener::bind(bind_addr).await?;
    tracing::info!("Jarvis listening on http://{}", listener.local_addr()?);
    axum::serve(listener, router(pipeline)).await?;
    Ok(())
}

// ============ Error response ============

#[derive(Serialize)]
struct ErrorBody {
    error: ErrorDetail,
}

#[derive(Serialize)]
struct ErrorDetail {
    code: String,
    message: String,
}

struct AppError {
    status: StatusCode,
    code: String,
    message: String,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let body = ErrorBody {
            error: ErrorDetail {
                code: self.code,
                message: self.message,
            },
        };
        (self.status, Json(body)).into_response()
    }
}

fn bad_request(message: impl Into<String>) -> AppError {
    AppError {
        status: StatusCode::BAD_REQUEST,
        code: "bad_request".to_string(),
        message: message.into(),
    }
}

// ============ POST /chat ============

#[derive(Deserialize)]
struct ChatRequest {
    message: String,
}

async fn handle_chat(
    State(pipeline): State<Arc<RagPipeline>>,
    Json(req): Json<ChatRequest>,
) -> Json<Answer> {
    Json(pipeline.ask(&req.message).await)
}

// ============ POST /knowledge ============

#[derive(Deserialize)]
struct KnowledgeRequest {
    #[serde(default)]
    text: Option<String>,
    #[serde(default)]
    source: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(tag = "status", rename_all = "lowercase")]
enum KnowledgeResponse {
    Stored { id: String },
    Unavailable,
}

impl From<UpsertOutcome> for KnowledgeResponse {
    fn from(outcome: UpsertOutcome) -> Self {
        match outcome {
            UpsertOutcome::Stored(id) => KnowledgeResponse::Stored { id },
            UpsertOutcome::Unavailable => KnowledgeResponse::Unavailable,
        }
    }
}

async fn handle_knowledge(
    State(pipeline): State<Arc<RagPipeline>>,
    Query(params): Query<KnowledgeRequest>,
    body: Bytes,
) -> Result<Json<KnowledgeResponse>, AppError> {
    let req = if body.is_empty() {
        params
    } else {
        let req: KnowledgeRequest = serde_json::from_slice(&body)
            .map_err(|e| bad_request(format!("invalid JSON body: {}", e)))?;
        KnowledgeRequest {
            text: req.text.or(params.text),
            source: req.source.or(params.source),
        }
    };

    let text = req.text.unwrap_or_default();
    if text.trim().is_empty() {
        return Err(bad_request("text must not be empty"));
    }
    let source = req
        .source
        .filter(|s| !s.trim().is_empty())
        .unwrap_or_else(|| DEFAULT_KNOWLEDGE_SOURCE.to_string());

    let outcome = pipeline.ingest(&text, &source).await;
    Ok(Json(outcome.into()))
}

// ============ GET /health ============

#[derive(Serialize)]
struct HealthResponse {
    status: String,
    version: String,
    store: StoreStatus,
    generation: Option<GenerationStatus>,
    encoder: EncoderStatus,
}

async fn handle_health(State(pipeline): State<Arc<RagPipeline>>) -> Json<HealthResponse> {
    let status = pipeline.status();
    Json(HealthResponse {
        status: "ok".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        store: status.store,
        generation: status.generation,
        encoder: status.encoder,
    })
}
