//! JSON HTTP API over the query engine.
//!
//! # Endpoints
//!
//! | Method | Path | Description |
//! |--------|------|-------------|
//! | `POST` | `/api/query` | Answer a question (`{"query", "connection_string"?, "limit"?, ...}`) |
//! | `GET`  | `/api/query/history` | Recent queries, most recent first (`?limit=20`) |
//! | `GET`  | `/api/metrics` | Counters, latency stats and store sizes |
//! | `POST` | `/api/metrics/reset` | Zero the counters and latency window |
//! | `POST` | `/api/connect-database` | Tables, columns and foreign keys of a database |
//! | `GET`  | `/api/ingestion-status/{job_id}` | Progress of an ingestion job |
//! | `GET`  | `/health` | Health check (returns version) |
//!
//! Successful bodies carry `"ok": true` next to the payload. Errors use
//!
//! ```json
//! { "error": { "code": "bad_request", "message": "query must not be empty" } }
//! ```
//!
//! A query whose branches fail is still a 200: the failure is reported
//! inside the envelope's `error` field.
//!
//! # CORS
//!
//! All origins, methods, and headers are permitted for browser-based clients.

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::net::TcpListener;
use tower_http::cors::{Any, CorsLayer};

use query_harness_core::envelope::QueryResponse;
use query_harness_core::metrics::{HistoryEntry, MetricsSnapshot};

use crate::discovery::{self, DatabaseOverview};
use crate::engine::{Ack, QueryEngine, QueryRequest};
use crate::jobs::{self, JobStatus};

const DEFAULT_HISTORY_LIMIT: usize = 20;

/// Build the router. Exposed separately from [`run_server`] so callers can
/// serve it on a listener of their choosing.
pub fn router(engine: Arc<QueryEngine>) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/api/query", post(handle_query))
        .route("/api/query/history", get(handle_history))
        .route("/api/metrics", get(handle_metrics))
        .route("/api/metrics/reset", post(handle_metrics_reset))
        .route("/api/connect-database", post(handle_connect_database))
        .route("/api/ingestion-status/{job_id}", get(handle_ingestion_status))
        .route("/health", get(handle_health))
        .layer(cors)
        .with_state(engine)
}

/// Serve on an already bound listener until the process is terminated.
pub async fn serve(listener: TcpListener, engine: Arc<QueryEngine>) -> anyhow::Result<()> {
    axum::serve(listener, router(engine)).await?;
    Ok(())
}

/// Bind to `[server].bind` and serve.
pub async fn run_server(engine: Arc<QueryEngine>) -> anyhow::Result<()> {
    let bind_addr = engine.config().server.bind.clone();
    let listener = TcpListener::bind(&bind_addr).await?;
    println!("Query server listening on http://{}", bind_addr);
    serve(listener, engine).await
}

// ============ Response bodies ============

/// `{"ok": true, ...body}`.
#[derive(Serialize)]
struct Success<T> {
    ok: bool,
    #[serde(flatten)]
    body: T,
}

fn success<T: Serialize>(body: T) -> Json<Success<T>> {
    Json(Success { ok: true, body })
}

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
    code: &'static str,
    message: String,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let body = ErrorBody {
            error: ErrorDetail {
                code: self.code.to_string(),
                message: self.message,
            },
        };
        (self.status, Json(body)).into_response()
    }
}

fn bad_request(message: impl Into<String>) -> AppError {
    AppError {
        status: StatusCode::BAD_REQUEST,
        code: "bad_request",
        message: message.into(),
    }
}

fn internal(message: impl Into<String>) -> AppError {
    AppError {
        status: StatusCode::INTERNAL_SERVER_ERROR,
        code: "internal",
        message: message.into(),
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

// ============ POST /api/query ============

async fn handle_query(
    State(engine): State<Arc<QueryEngine>>,
    Json(request): Json<QueryRequest>,
) -> Result<Json<Success<QueryResponse>>, AppError> {
    if request.text.trim().is_empty() {
        return Err(bad_request("query must not be empty"));
    }
    Ok(success(engine.process_query(request).await))
}

// ============ GET /api/query/history ============

#[derive(Deserialize)]
struct HistoryParams {
    limit: Option<usize>,
}

#[derive(Serialize)]
struct HistoryBody {
    history: Vec<HistoryEntry>,
}

async fn handle_history(
    State(engine): State<Arc<QueryEngine>>,
    Query(params): Query<HistoryParams>,
) -> Json<Success<HistoryBody>> {
    let limit = params.limit.unwrap_or(DEFAULT_HISTORY_LIMIT);
    success(HistoryBody {
        history: engine.recent_history(limit),
    })
}

// ============ /api/metrics ============

#[derive(Serialize)]
struct MetricsBody {
    metrics: MetricsSnapshot,
}

async fn handle_metrics(State(engine): State<Arc<QueryEngine>>) -> Json<Success<MetricsBody>> {
    success(MetricsBody {
        metrics: engine.get_metrics().await,
    })
}

async fn handle_metrics_reset(State(engine): State<Arc<QueryEngine>>) -> Json<Ack> {
    Json(engine.reset_metrics())
}

// ============ POST /api/connect-database ============

#[derive(Deserialize)]
struct ConnectRequest {
    #[serde(default)]
    connection_string: String,
}

#[derive(Serialize)]
struct ConnectBody {
    schema: DatabaseOverview,
}

async fn handle_connect_database(
    Json(request): Json<ConnectRequest>,
) -> Result<Json<Success<ConnectBody>>, AppError> {
    let schema = discovery::analyze_database(&request.connection_string)
        .await
        .map_err(|e| bad_request(e.to_string()))?;
    Ok(success(ConnectBody { schema }))
}

// ============ GET /api/ingestion-status/{job_id} ============

async fn handle_ingestion_status(
    State(engine): State<Arc<QueryEngine>>,
    Path(job_id): Path<String>,
) -> Result<Json<Success<JobStatus>>, AppError> {
    let status = jobs::get_job_status(&engine.config().store.path, &job_id)
        .await
        .map_err(|e| internal(e.to_string()))?;
    Ok(success(status))
}
