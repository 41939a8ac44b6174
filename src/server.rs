//! HTTP JSON API.
//!
//! Exposes retrieval to the surrounding application. Authentication is the
//! caller's concern: requests carry the already-authenticated caller id in
//! the body, and this layer enforces nothing beyond the per-collection
//! authorization built into retrieval itself.
//!
//! # Endpoints
//!
//! | Method | Path | Description |
//! |--------|------|-------------|
//! | `GET`  | `/health` | Health check (returns version) |
//! | `POST` | `/search` | Hybrid retrieval, ranked results only |
//! | `POST` | `/retrieve` | Retrieval plus formatted context, prompt, and citation |
//!
//! # Error Contract
//!
//! ```json
//! { "error": { "code": "bad_request", "message": "query must not be empty" } }
//! ```
//!
//! # CORS
//!
//! All origins, methods, and headers are permitted to support browser-based
//! clients.

use axum::{
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use sqlx::SqlitePool;
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};

use crate::config::Config;
use crate::context;
use crate::db;
use crate::models::{Citation, RetrievalResult};
use crate::retrieve;

/// Shared application state passed to route handlers.
#[derive(Clone)]
struct AppState {
    config: Arc<Config>,
    pool: SqlitePool,
}

/// Start the HTTP server on the configured bind address. Runs until the
/// process is terminated.
pub async fn run_server(config: &Config) -> anyhow::Result<()> {
    let bind_addr = config.server.bind.clone();
    let pool = db::connect(config).await?;

    let state = AppState {
        config: Arc::new(config.clone()),
        pool,
    };

    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let app = Router::new()
        .route("/health", get(handle_health))
        .route("/search", post(handle_search))
        .route("/retrieve", post(handle_retrieve))
        .layer(cors)
        .with_state(state);

    println!("ragbase server listening on http://{}", bind_addr);

    let listener = tokio::net::TcpListener::bind(&bind_addr).await?;
    axum::serve(listener, app).await?;

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

fn internal_error(err: anyhow::Error) -> AppError {
    AppError {
        status: StatusCode::INTERNAL_SERVER_ERROR,
        code: "internal".to_string(),
        message: err.to_string(),
    }
}

// ============ GET /health ============

#[derive(Serialize)]
struct HealthResponse {
    status: String,
    version: String,
}

async fn handle_health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}

// ============ POST /search ============

#[derive(Deserialize)]
struct SearchRequest {
    query: String,
    collection_ids: Vec<String>,
    caller_id: String,
    #[serde(default)]
    top_k: Option<usize>,
}

#[derive(Serialize)]
struct SearchResponse {
    results: Vec<RetrievalResult>,
}

async fn handle_search(
    State(state): State<AppState>,
    Json(req): Json<SearchRequest>,
) -> Result<Json<SearchResponse>, AppError> {
    validate(&req)?;

    let results = retrieve::retrieve(
        &state.pool,
        &state.config,
        &req.query,
        &req.collection_ids,
        &req.caller_id,
        req.top_k,
    )
    .await
    .map_err(internal_error)?;

    Ok(Json(SearchResponse { results }))
}

// ============ POST /retrieve ============

#[derive(Deserialize)]
struct RetrieveRequest {
    query: String,
    collection_ids: Vec<String>,
    caller_id: String,
    #[serde(default)]
    top_k: Option<usize>,
    /// When present, the selected citation is persisted against this
    /// answer id after retrieval.
    #[serde(default)]
    answer_id: Option<String>,
}

#[derive(Serialize)]
struct RetrieveResponse {
    /// Empty when there is nothing to augment with.
    context: String,
    /// The full prompt for the chat-completion model.
    prompt: String,
    results: Vec<RetrievalResult>,
    citation: Option<Citation>,
}

async fn handle_retrieve(
    State(state): State<AppState>,
    Json(req): Json<RetrieveRequest>,
) -> Result<Json<RetrieveResponse>, AppError> {
    validate(&SearchRequest {
        query: req.query.clone(),
        collection_ids: req.collection_ids.clone(),
        caller_id: req.caller_id.clone(),
        top_k: req.top_k,
    })?;

    let (context, results) = retrieve::retrieve_and_format(
        &state.pool,
        &state.config,
        &req.query,
        &req.collection_ids,
        &req.caller_id,
        req.top_k,
    )
    .await
    .map_err(internal_error)?;

    let prompt = context::build_prompt(&context, &req.query);
    let citation = context::select_citation(&results);

    if let (Some(answer_id), Some(citation)) = (req.answer_id.as_deref(), citation.as_ref()) {
        context::record_citation(&state.pool, answer_id, citation)
            .await
            .map_err(internal_error)?;
    }

    Ok(Json(RetrieveResponse {
        context,
        prompt,
        results,
        citation,
    }))
}

fn validate(req: &SearchRequest) -> Result<(), AppError> {
    if req.query.trim().is_empty() {
        return Err(bad_request("query must not be empty"));
    }
    if req.caller_id.trim().is_empty() {
        return Err(bad_request("caller_id must not be empty"));
    }
    Ok(())
}
