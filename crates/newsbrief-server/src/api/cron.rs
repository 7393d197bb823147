//! Scheduler control routes.
//!
//! Thin wrappers over [`SchedulerService`]: status/start/stop report the
//! whole registry, the per-job routes validate the id against the known
//! set (404) and map a missing scheduler to a conflict (409).

use axum::{
    extract::{Path, State},
    Extension, Json,
};
use newsbrief_core::JobId;
use newsbrief_sched::{JobOverview, SchedulerError, SchedulerService, SchedulerState};
use serde::Serialize;

use super::{ApiError, AppState};
use crate::middleware::RequestId;

#[derive(Debug, Serialize)]
pub(super) struct CronStatus {
    state: SchedulerState,
    jobs: Vec<JobOverview>,
}

#[derive(Debug, Serialize)]
pub(super) struct CronState {
    state: SchedulerState,
}

#[derive(Debug, Serialize)]
pub(super) struct JobAction {
    job: JobId,
    status: &'static str,
}

async fn current_status(scheduler: &SchedulerService) -> CronStatus {
    CronStatus {
        state: scheduler.state(),
        jobs: scheduler.jobs_overview().await,
    }
}

pub(super) async fn status(State(state): State<AppState>) -> Json<CronStatus> {
    Json(current_status(&state.scheduler).await)
}

/// Best effort: a failed start is logged and the current state reported.
pub(super) async fn start(State(state): State<AppState>) -> Json<CronStatus> {
    if let Err(e) = state.scheduler.ensure_started(true).await {
        tracing::error!(error = %e, "failed to start scheduler");
    }
    Json(current_status(&state.scheduler).await)
}

pub(super) async fn stop(State(state): State<AppState>) -> Json<CronState> {
    state.scheduler.shutdown(false).await;
    Json(CronState {
        state: state.scheduler.state(),
    })
}

pub(super) async fn trigger(
    State(state): State<AppState>,
    Extension(req_id): Extension<RequestId>,
    Path(job_id): Path<String>,
) -> Result<Json<JobAction>, ApiError> {
    let job = parse_job_id(&job_id, &req_id.0)?;
    state
        .scheduler
        .trigger_job(job)
        .await
        .map_err(|e| map_scheduler_error(&req_id.0, &e))?;
    Ok(Json(JobAction {
        job,
        status: "triggered",
    }))
}

pub(super) async fn pause(
    State(state): State<AppState>,
    Extension(req_id): Extension<RequestId>,
    Path(job_id): Path<String>,
) -> Result<Json<JobAction>, ApiError> {
    let job = parse_job_id(&job_id, &req_id.0)?;
    state
        .scheduler
        .pause_job(job)
        .await
        .map_err(|e| map_scheduler_error(&req_id.0, &e))?;
    Ok(Json(JobAction {
        job,
        status: "paused",
    }))
}

pub(super) async fn resume(
    State(state): State<AppState>,
    Extension(req_id): Extension<RequestId>,
    Path(job_id): Path<String>,
) -> Result<Json<JobAction>, ApiError> {
    let job = parse_job_id(&job_id, &req_id.0)?;
    state
        .scheduler
        .resume_job(job)
        .await
        .map_err(|e| map_scheduler_error(&req_id.0, &e))?;
    Ok(Json(JobAction {
        job,
        status: "running",
    }))
}

fn parse_job_id(raw: &str, request_id: &str) -> Result<JobId, ApiError> {
    raw.parse::<JobId>()
        .map_err(|_| ApiError::new(request_id, "not_found", format!("unknown job '{raw}'")))
}

fn map_scheduler_error(request_id: &str, error: &SchedulerError) -> ApiError {
    match error {
        SchedulerError::NotRunning => {
            ApiError::new(request_id, "conflict", "scheduler is not running")
        }
        SchedulerError::UnknownJob(id) => {
            ApiError::new(request_id, "not_found", format!("unknown job '{id}'"))
        }
        SchedulerError::Backend(_) => {
            tracing::error!(error = %error, "scheduler operation failed");
            ApiError::new(request_id, "internal_error", "scheduler operation failed")
        }
    }
}
