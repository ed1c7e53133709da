use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::Arc;
use std::time::Instant;

use crate::domain::comparison::{ComparisonKind, ComparisonResult};
use crate::domain::comparison_schedule::{ComparisonSchedule, NewComparisonSchedule};
use crate::domain::comparison_scheduler::ComparisonScheduler;
use crate::domain::comparison_service::ComparisonService;
use crate::domain::drift::DriftReport;
use crate::domain::error::{ComparisonScheduleError, SchedulerError};
use crate::domain::scheduler::Scheduler;
use crate::domain::task::ScheduledTask;

/// Shared application state for all API handlers.
#[derive(Clone)]
pub struct AppState {
    pub scheduler: Arc<Scheduler>,
    pub comparisons: Arc<ComparisonService>,
    pub schedules: Arc<ComparisonScheduler>,
    pub started_at: Instant,
}

type ApiError = (StatusCode, String);

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/api/v1/tasks", get(list_tasks).post(create_task))
        .route("/api/v1/tasks/{id}", get(get_task))
        .route("/api/v1/tasks/{id}/cancel", post(cancel_task))
        .route("/api/v1/comparisons", get(list_comparisons).post(compare_device))
        .route("/api/v1/comparisons/{id}", get(get_comparison))
        .route(
            "/api/v1/comparison-schedules",
            get(list_schedules).post(create_schedule),
        )
        .route(
            "/api/v1/comparison-schedules/{id}",
            get(get_schedule).delete(delete_schedule),
        )
        .route("/api/v1/compare", post(compare_trees))
        .with_state(state)
}

#[derive(Debug, Serialize, Deserialize)]
pub struct HealthResponse {
    pub version: String,
    pub uptime_secs: u64,
    pub scheduler_running: bool,
    #[serde(default)]
    pub schedule_runner_running: bool,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ScheduleRequest {
    pub target_id: String,
    pub scheduled_for: String,
    #[serde(default)]
    pub notes: Option<String>,
    #[serde(default)]
    pub created_by: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct ListTasksQuery {
    /// Include completed tasks.
    #[serde(default)]
    pub all: bool,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct CancelResponse {
    pub id: String,
    pub cancelled: bool,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct CompareDeviceRequest {
    pub device_id: String,
    pub device_address: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct CompareTreesRequest {
    pub source: Value,
    pub device: Value,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct DeleteResponse {
    pub id: String,
    pub deleted: bool,
}

#[derive(Debug, Default, Deserialize)]
pub struct HistoryQuery {
    #[serde(default)]
    pub limit: Option<usize>,
}

fn scheduler_error(e: SchedulerError) -> ApiError {
    match e {
        SchedulerError::InvalidTime { .. } => (StatusCode::BAD_REQUEST, e.to_string()),
        SchedulerError::Persistence(_) => (StatusCode::INTERNAL_SERVER_ERROR, e.to_string()),
    }
}

fn schedule_error(e: ComparisonScheduleError) -> ApiError {
    match e {
        ComparisonScheduleError::Persistence(_) => {
            (StatusCode::INTERNAL_SERVER_ERROR, e.to_string())
        }
        _ => (StatusCode::BAD_REQUEST, e.to_string()),
    }
}

async fn health(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        version: env!("CARGO_PKG_VERSION").to_string(),
        uptime_secs: state.started_at.elapsed().as_secs(),
        scheduler_running: state.scheduler.is_running().await,
        schedule_runner_running: state.schedules.is_running().await,
    })
}

async fn list_tasks(
    State(state): State<AppState>,
    Query(query): Query<ListTasksQuery>,
) -> Result<Json<Vec<ScheduledTask>>, ApiError> {
    let tasks = if query.all {
        state.scheduler.list_all().await
    } else {
        state.scheduler.list().await
    };
    tasks.map(Json).map_err(scheduler_error)
}

async fn create_task(
    State(state): State<AppState>,
    Json(req): Json<ScheduleRequest>,
) -> Result<(StatusCode, Json<ScheduledTask>), ApiError> {
    if req.target_id.trim().is_empty() {
        return Err((StatusCode::BAD_REQUEST, "target_id must not be empty".to_string()));
    }
    state
        .scheduler
        .schedule(
            &req.target_id,
            &req.scheduled_for,
            req.notes,
            req.created_by.as_deref().unwrap_or("unknown"),
        )
        .await
        .map(|task| (StatusCode::CREATED, Json(task)))
        .map_err(scheduler_error)
}

async fn get_task(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<ScheduledTask>, ApiError> {
    state
        .scheduler
        .get(&id)
        .await
        .map_err(scheduler_error)?
        .map(Json)
        .ok_or_else(|| (StatusCode::NOT_FOUND, format!("no scheduled task {id}")))
}

/// Cancelling a terminal or unknown task is not an error: it reports
/// `cancelled: false`.
async fn cancel_task(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<CancelResponse>, ApiError> {
    let cancelled = state.scheduler.cancel(&id).await.map_err(scheduler_error)?;
    Ok(Json(CancelResponse { id, cancelled }))
}

async fn list_comparisons(
    State(state): State<AppState>,
    Query(query): Query<HistoryQuery>,
) -> Json<Vec<ComparisonResult>> {
    Json(state.comparisons.history(query.limit.unwrap_or(50)).await)
}

async fn compare_device(
    State(state): State<AppState>,
    Json(req): Json<CompareDeviceRequest>,
) -> Json<ComparisonResult> {
    Json(
        state
            .comparisons
            .compare_device(&req.device_id, &req.device_address, ComparisonKind::Instant)
            .await,
    )
}

async fn get_comparison(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<ComparisonResult>, ApiError> {
    state
        .comparisons
        .get(&id)
        .await
        .map(Json)
        .ok_or_else(|| (StatusCode::NOT_FOUND, format!("no comparison {id}")))
}

async fn list_schedules(
    State(state): State<AppState>,
) -> Result<Json<Vec<ComparisonSchedule>>, ApiError> {
    state.schedules.list().await.map(Json).map_err(schedule_error)
}

async fn create_schedule(
    State(state): State<AppState>,
    Json(req): Json<NewComparisonSchedule>,
) -> Result<(StatusCode, Json<ComparisonSchedule>), ApiError> {
    state
        .schedules
        .create(req)
        .await
        .map(|schedule| (StatusCode::CREATED, Json(schedule)))
        .map_err(schedule_error)
}

async fn get_schedule(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<ComparisonSchedule>, ApiError> {
    state
        .schedules
        .get(&id)
        .await
        .map_err(schedule_error)?
        .map(Json)
        .ok_or_else(|| (StatusCode::NOT_FOUND, format!("no comparison schedule {id}")))
}

async fn delete_schedule(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<DeleteResponse>, ApiError> {
    let deleted = state.schedules.delete(&id).await.map_err(schedule_error)?;
    if !deleted {
        return Err((StatusCode::NOT_FOUND, format!("no comparison schedule {id}")));
    }
    Ok(Json(DeleteResponse { id, deleted }))
}

async fn compare_trees(
    State(state): State<AppState>,
    Json(req): Json<CompareTreesRequest>,
) -> Json<DriftReport> {
    Json(state.comparisons.compare_trees(&req.source, &req.device))
}
