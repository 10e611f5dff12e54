use std::net::SocketAddr;
use std::path::PathBuf;

use anyhow::Result;
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use tower_http::cors::CorsLayer;
use tracing::info;

use crate::baseline::selector::{is_baseline_stale, stable_baseline};
use crate::baseline::Baseline;
use crate::config::Config;
use crate::correlation::{Checkpoint, DetectedChange};
use crate::metrics::provider::provider_for_endpoint;
use crate::progress::ComposedProgress;
use crate::runner::{page_progress, run_evaluation_pass, run_recovery, EvaluationOutcome};
use crate::store::ChangeStore;

#[derive(Clone)]
struct ApiState {
    config: Config,
    db_path: PathBuf,
}

#[derive(Debug, Serialize)]
struct ApiResponse<T: Serialize> {
    ok: bool,
    data: T,
}

#[derive(Debug, Serialize)]
struct ApiErrorBody {
    ok: bool,
    error: String,
}

#[derive(Debug)]
struct ApiError {
    status: StatusCode,
    message: String,
}

impl ApiError {
    fn bad_request(message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::BAD_REQUEST,
            message: message.into(),
        }
    }

    fn not_found(message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::NOT_FOUND,
            message: message.into(),
        }
    }

    fn internal(error: impl std::fmt::Display) -> Self {
        Self {
            status: StatusCode::INTERNAL_SERVER_ERROR,
            message: error.to_string(),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let body = Json(ApiErrorBody {
            ok: false,
            error: self.message,
        });
        (self.status, body).into_response()
    }
}

type ApiResult<T> = std::result::Result<Json<ApiResponse<T>>, ApiError>;

#[derive(Debug, Clone, Default, Deserialize)]
struct PageRequest {
    page_id: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
struct CheckpointsRequest {
    change_id: i64,
}

#[derive(Debug, Serialize)]
struct HealthResponse {
    status: &'static str,
}

#[derive(Debug, Serialize)]
struct ProgressResponse {
    page_id: String,
    progress: ComposedProgress,
}

#[derive(Debug, Serialize)]
struct ChangesResponse {
    page_id: String,
    changes: Vec<DetectedChange>,
}

#[derive(Debug, Serialize)]
struct CheckpointsResponse {
    change: DetectedChange,
    checkpoints: Vec<Checkpoint>,
}

#[derive(Debug, Serialize)]
struct EvaluateResponse {
    outcomes: Vec<EvaluationOutcome>,
}

#[derive(Debug, Serialize)]
struct BaselineResponse {
    page_id: String,
    baseline: Option<Baseline>,
    stale: bool,
}

pub async fn run_server(config: Config, bind: SocketAddr) -> Result<()> {
    let state = ApiState {
        db_path: config.resolved_db_path(),
        config,
    };

    let app = Router::new()
        .route("/health", get(health))
        .route("/v1/config", get(show_config))
        .route("/v1/progress", post(progress))
        .route("/v1/changes", post(changes))
        .route("/v1/checkpoints", post(checkpoints))
        .route("/v1/evaluate", post(evaluate))
        .route("/v1/recover", post(recover))
        .route("/v1/baseline", post(baseline))
        .layer(CorsLayer::permissive())
        .with_state(state);

    let listener = tokio::net::TcpListener::bind(bind).await?;
    info!("REST API listening on http://{bind}");
    axum::serve(listener, app).await?;
    Ok(())
}

async fn health() -> Json<ApiResponse<HealthResponse>> {
    ok(HealthResponse { status: "ok" })
}

async fn show_config(State(state): State<ApiState>) -> Json<ApiResponse<Config>> {
    ok(state.config)
}

async fn progress(
    State(state): State<ApiState>,
    Json(request): Json<PageRequest>,
) -> ApiResult<ProgressResponse> {
    let page_id = resolve_page(&state, request.page_id)?;
    let store = open_store(&state)?;
    let progress = page_progress(&store, &page_id, Utc::now())
        .ok_or_else(|| ApiError::internal("progress unavailable and no snapshot cached"))?;
    Ok(ok(ProgressResponse { page_id, progress }))
}

async fn changes(
    State(state): State<ApiState>,
    Json(request): Json<PageRequest>,
) -> ApiResult<ChangesResponse> {
    let page_id = resolve_page(&state, request.page_id)?;
    let store = open_store(&state)?;
    let changes = store
        .load_evaluable_changes(Some(&page_id))
        .map_err(ApiError::internal)?;
    Ok(ok(ChangesResponse { page_id, changes }))
}

async fn checkpoints(
    State(state): State<ApiState>,
    Json(request): Json<CheckpointsRequest>,
) -> ApiResult<CheckpointsResponse> {
    let store = open_store(&state)?;
    let change = store
        .load_change(request.change_id)
        .map_err(ApiError::internal)?
        .ok_or_else(|| ApiError::not_found(format!("no change with id {}", request.change_id)))?;
    let checkpoints = store
        .load_checkpoints(request.change_id)
        .map_err(ApiError::internal)?;
    Ok(ok(CheckpointsResponse {
        change,
        checkpoints,
    }))
}

async fn evaluate(
    State(state): State<ApiState>,
    Json(request): Json<PageRequest>,
) -> ApiResult<EvaluateResponse> {
    let store = open_store(&state)?;
    let provider = provider_for_endpoint(&state.config.analytics.endpoint_url);
    let outcomes = run_evaluation_pass(
        &store,
        provider.as_ref(),
        request.page_id.as_deref(),
        Utc::now(),
    )
    .await
    .map_err(ApiError::internal)?;
    Ok(ok(EvaluateResponse { outcomes }))
}

async fn recover(State(state): State<ApiState>) -> ApiResult<EvaluateResponse> {
    let store = open_store(&state)?;
    let provider = provider_for_endpoint(&state.config.analytics.endpoint_url);
    let outcomes = run_recovery(&store, provider.as_ref(), Utc::now())
        .await
        .map_err(ApiError::internal)?;
    Ok(ok(EvaluateResponse { outcomes }))
}

async fn baseline(
    State(state): State<ApiState>,
    Json(request): Json<PageRequest>,
) -> ApiResult<BaselineResponse> {
    let page_id = resolve_page(&state, request.page_id)?;
    let store = open_store(&state)?;
    let pinned = store.pinned_analysis_id(&page_id).map_err(ApiError::internal)?;
    let analyses = store.load_analyses(&page_id).map_err(ApiError::internal)?;
    let now = Utc::now();
    let baseline = stable_baseline(pinned, &analyses, now);
    let stale = is_baseline_stale(
        baseline.as_ref(),
        state.config.evaluation.baseline_max_age_days,
        now,
    );
    Ok(ok(BaselineResponse {
        page_id,
        baseline,
        stale,
    }))
}

fn ok<T: Serialize>(data: T) -> Json<ApiResponse<T>> {
    Json(ApiResponse { ok: true, data })
}

fn open_store(state: &ApiState) -> std::result::Result<ChangeStore, ApiError> {
    ChangeStore::open(&state.db_path).map_err(ApiError::internal)
}

fn resolve_page(
    state: &ApiState,
    requested: Option<String>,
) -> std::result::Result<String, ApiError> {
    let page_id = requested.unwrap_or_else(|| state.config.page.id.clone());
    if page_id.trim().is_empty() {
        return Err(ApiError::bad_request(
            "page_id is required (no default page configured)",
        ));
    }
    Ok(page_id)
}
