//! JSON HTTP API.
//!
//! Exposes source status, sync triggers and the natural-language query
//! interpreter. `vmirror serve` also runs the periodic scheduler when
//! `[sync].interval_minutes` is non-zero.
//!
//! # Endpoints
//!
//! | Method | Path | Description |
//! |--------|------|-------------|
//! | `GET`  | `/health` | Health check (returns version) |
//! | `GET`  | `/api/sources` | All sources with their sync status |
//! | `GET`  | `/api/sources/{id}/status` | One source's sync status |
//! | `POST` | `/api/sync` | Sync all active sources, or `source_ids` |
//! | `POST` | `/api/query` | Interpret a free-text inventory question |
//!
//! `POST /api/sync` answers `202 Accepted` and syncs in the background
//! unless the body sets `"wait": true`, in which case the batch report is
//! returned once every source has finished.
//!
//! # Error Contract
//!
//! ```json
//! { "error": { "code": "not_found", "message": "source 7 not found" } }
//! ```
//!
//! Error codes: `bad_request` (400), `not_found` (404), `already_syncing` (409),
//! `internal` (500).

use anyhow::Context;
use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::SqlitePool;
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use tracing::{error, info};

use crate::config::Config;
use crate::db;
use crate::error::SyncError;
use crate::models::{Source, SyncStatus};
use crate::query::{QueryInterpreter, QueryResult, DEFAULT_SESSION};
use crate::scheduler::spawn_scheduler;
use crate::sync::{BatchReport, SyncOrchestrator};

/// Shared application state passed to all route handlers via Axum's `State` extractor.
#[derive(Clone)]
pub struct AppState {
    orchestrator: SyncOrchestrator,
    interpreter: Arc<QueryInterpreter>,
}

impl AppState {
    pub fn new(config: &Config, pool: SqlitePool) -> anyhow::Result<Self> {
        let interpreter = QueryInterpreter::new(pool.clone(), &config.query)
            .context("Invalid [query] name pattern")?;
        Ok(Self {
            orchestrator: SyncOrchestrator::with_builtin_adapters(pool, &config.sync),
            interpreter: Arc::new(interpreter),
        })
    }

    /// State over an existing orchestrator, e.g. one with custom adapters.
    pub fn with_orchestrator(orchestrator: SyncOrchestrator, interpreter: QueryInterpreter) -> Self {
        Self {
            orchestrator,
            interpreter: Arc::new(interpreter),
        }
    }

    pub fn orchestrator(&self) -> &SyncOrchestrator {
        &self.orchestrator
    }
}

pub fn router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/health", get(handle_health))
        .route("/api/sources", get(handle_list_sources))
        .route("/api/sources/{id}/status", get(handle_source_status))
        .route("/api/sync", post(handle_sync))
        .route("/api/query", post(handle_query))
        .layer(cors)
        .with_state(state)
}

/// Starts the HTTP server, plus the scheduler when an interval is configured.
///
/// Runs until Ctrl-C; the scheduler is stopped after the listener closes.
pub async fn run_server(config: &Config) -> anyhow::Result<()> {
    let pool = db::connect(config).await?;
    let state = AppState::new(config, pool.clone())?;

    let scheduler = config
        .sync
        .interval()
        .map(|period| spawn_scheduler(state.orchestrator.clone(), period));

    let bind_addr = config.server.bind.clone();
    let listener = tokio::net::TcpListener::bind(&bind_addr)
        .await
        .with_context(|| format!("Failed to bind {}", bind_addr))?;

    println!("vmirror API listening on http://{}", bind_addr);

    axum::serve(listener, router(state))
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
            info!("shutdown requested");
        })
        .await?;

    if let Some(scheduler) = scheduler {
        scheduler.shutdown().await;
    }
    pool.close().await;
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

fn not_found(message: impl Into<String>) -> AppError {
    AppError {
        status: StatusCode::NOT_FOUND,
        code: "not_found".to_string(),
        message: message.into(),
    }
}

fn internal(message: impl Into<String>) -> AppError {
    AppError {
        status: StatusCode::INTERNAL_SERVER_ERROR,
        code: "internal".to_string(),
        message: message.into(),
    }
}

impl From<sqlx::Error> for AppError {
    fn from(e: sqlx::Error) -> Self {
        error!(error = %e, "database error");
        internal(e.to_string())
    }
}

impl From<SyncError> for AppError {
    fn from(e: SyncError) -> Self {
        match e {
            SyncError::NotFound(_) => not_found(e.to_string()),
            SyncError::AlreadySyncing(_) => AppError {
                status: StatusCode::CONFLICT,
                code: e.kind().to_string(),
                message: e.to_string(),
            },
            other => internal(other.to_string()),
        }
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

// ============ GET /api/sources ============

async fn handle_list_sources(State(state): State<AppState>) -> Result<Json<Vec<Source>>, AppError> {
    Ok(Json(state.orchestrator.store().list_sources().await?))
}

// ============ GET /api/sources/{id}/status ============

#[derive(Serialize)]
struct StatusResponse {
    id: i64,
    hostname: String,
    sync_status: SyncStatus,
    last_sync: Option<DateTime<Utc>>,
    last_error: Option<String>,
}

async fn handle_source_status(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> Result<Json<StatusResponse>, AppError> {
    let source = state
        .orchestrator
        .store()
        .get_source(id)
        .await?
        .ok_or(SyncError::NotFound(id))?;

    Ok(Json(StatusResponse {
        id: source.id,
        hostname: source.hostname,
        sync_status: source.sync_status,
        last_sync: source.last_sync,
        last_error: source.last_error,
    }))
}

// ============ POST /api/sync ============

#[derive(Deserialize)]
struct SyncRequest {
    /// Sources to sync; all active sources when absent.
    #[serde(default)]
    source_ids: Option<Vec<i64>>,
    /// Block until the batch finishes and return its report.
    #[serde(default)]
    wait: bool,
}

#[derive(Serialize)]
struct SyncAccepted {
    status: &'static str,
    source_ids: Option<Vec<i64>>,
}

async fn run_batch(
    orchestrator: &SyncOrchestrator,
    ids: Option<&[i64]>,
) -> Result<BatchReport, SyncError> {
    match ids {
        Some(ids) => orchestrator.sync_sources(ids).await,
        None => orchestrator.sync_all().await,
    }
}

async fn handle_sync(
    State(state): State<AppState>,
    Json(req): Json<SyncRequest>,
) -> Result<Response, AppError> {
    if matches!(&req.source_ids, Some(ids) if ids.is_empty()) {
        return Err(bad_request("source_ids must not be empty"));
    }

    if req.wait {
        let report = run_batch(&state.orchestrator, req.source_ids.as_deref()).await?;
        return Ok(Json(report).into_response());
    }

    let orchestrator = state.orchestrator.clone();
    let ids = req.source_ids.clone();
    tokio::spawn(async move {
        if let Err(e) = run_batch(&orchestrator, ids.as_deref()).await {
            error!(error = %e, "background sync could not start");
        }
    });

    let body = SyncAccepted {
        status: "accepted",
        source_ids: req.source_ids,
    };
    Ok((StatusCode::ACCEPTED, Json(body)).into_response())
}

// ============ POST /api/query ============

#[derive(Deserialize)]
struct QueryRequest {
    query: String,
    #[serde(default)]
    session: Option<String>,
}

async fn handle_query(
    State(state): State<AppState>,
    Json(req): Json<QueryRequest>,
) -> Result<Json<QueryResult>, AppError> {
    if req.query.trim().is_empty() {
        return Err(bad_request("query must not be empty"));
    }

    let session = req.session.as_deref().unwrap_or(DEFAULT_SESSION);
    let result = state.interpreter.interpret_in(session, &req.query).await?;
    Ok(Json(result))
}
