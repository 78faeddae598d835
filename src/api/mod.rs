// src/api/mod.rs
// =============================================================================
// The HTTP control API.
//
// Routes:
//   POST   /submit           {"urls": [...]}  -> {"task_id": "..."}
//   GET    /tasks                             -> {task_id: {status, result, ...}}
//   GET    /tasks/{task_id}                   -> {status, result, ...} or 404
//   DELETE /tasks/{task_id}                   -> 204 or 404
//   GET    /health                            -> {"status": "ok", ...limiter counters}
//
// Handlers are thin: they parse, call the Scheduler, and serialize.
// =============================================================================

mod error;

use axum::{
    extract::{rejection::JsonRejection, Path, State},
    http::StatusCode,
    response::Json,
    routing::{get, post},
    Router,
};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::collections::BTreeMap;
use tower_http::trace::TraceLayer;
use tracing::debug;

use crate::batch::{BatchId, BatchSnapshot, Scheduler, SchedulerError};
pub use error::{AppError, AppResult};

#[derive(Debug, Deserialize)]
pub struct SubmitRequest {
    pub urls: Vec<String>,
}

#[derive(Debug, Serialize)]
pub struct SubmitResponse {
    pub task_id: String,
}

pub fn router(scheduler: Scheduler) -> Router {
    Router::new()
        .route("/health", get(health_handler))
        .route("/submit", post(submit_handler))
        .route("/tasks", get(list_handler))
        .route("/tasks/{task_id}", get(status_handler).delete(delete_handler))
        .layer(TraceLayer::new_for_http())
        .with_state(scheduler)
}

async fn health_handler(State(scheduler): State<Scheduler>) -> Json<Value> {
    let limiter = scheduler.limiter();
    Json(json!({
        "status": "ok",
        "tasks": scheduler.task_count(),
        "in_flight": limiter.in_flight(),
        "peak_in_flight": limiter.peak(),
        "concurrency": limiter.capacity(),
    }))
}

async fn submit_handler(
    State(scheduler): State<Scheduler>,
    payload: Result<Json<SubmitRequest>, JsonRejection>,
) -> AppResult<Json<SubmitResponse>> {
    // A missing or non-list "urls" is the caller's mistake, same as an
    // empty list
    let Json(request) = payload.map_err(|rejection| {
        debug!(error = %rejection, "rejected submission");
        AppError::from(SchedulerError::Validation(rejection.body_text()))
    })?;

    let id = scheduler.submit(request.urls)?;

    Ok(Json(SubmitResponse {
        task_id: id.to_string(),
    }))
}

async fn list_handler(State(scheduler): State<Scheduler>) -> Json<BTreeMap<BatchId, BatchSnapshot>> {
    Json(scheduler.list())
}

async fn status_handler(
    State(scheduler): State<Scheduler>,
    Path(task_id): Path<String>,
) -> AppResult<Json<BatchSnapshot>> {
    let id = parse_task_id(&task_id)?;
    Ok(Json(scheduler.status(&id)?))
}

async fn delete_handler(
    State(scheduler): State<Scheduler>,
    Path(task_id): Path<String>,
) -> AppResult<StatusCode> {
    let id = parse_task_id(&task_id)?;
    scheduler.delete(&id)?;
    Ok(StatusCode::NO_CONTENT)
}

// Anything that is not a UUID cannot name a task
fn parse_task_id(task_id: &str) -> AppResult<BatchId> {
    task_id
        .parse()
        .map_err(|_| AppError::from(SchedulerError::NotFound(task_id.to_string())))
}
