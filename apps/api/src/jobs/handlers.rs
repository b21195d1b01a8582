//! Axum route handlers for the jobs CRUD API.

use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use serde::Serialize;
use uuid::Uuid;

use crate::errors::AppError;
use crate::jobs::store;
use crate::models::job::{CreateJobRequest, JobRow, UpdateJobRequest};
use crate::state::AppState;

#[derive(Debug, Serialize)]
pub struct JobListResponse {
    pub jobs: Vec<JobRow>,
}

/// GET /api/v1/jobs
pub async fn handle_list_jobs(
    State(state): State<AppState>,
) -> Result<Json<JobListResponse>, AppError> {
    let pool = state.pool()?;
    let jobs = store::list_jobs(&pool).await?;
    Ok(Json(JobListResponse { jobs }))
}

/// GET /api/v1/jobs/:id
pub async fn handle_get_job(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<JobRow>, AppError> {
    let pool = state.pool()?;
    let job = store::fetch_job(&pool, id)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("Job {id} not found")))?;
    Ok(Json(job))
}

/// POST /api/v1/jobs
pub async fn handle_create_job(
    State(state): State<AppState>,
    Json(req): Json<CreateJobRequest>,
) -> Result<(StatusCode, Json<JobRow>), AppError> {
    for (name, value) in [
        ("client_name", &req.client_name),
        ("company_name", &req.company_name),
        ("position", &req.position),
        ("job_description", &req.job_description),
    ] {
        if value.trim().is_empty() {
            return Err(AppError::Validation(format!("{name} cannot be empty")));
        }
    }

    let pool = state.pool()?;
    let job = store::insert_job(&pool, &req).await?;
    Ok((StatusCode::CREATED, Json(job)))
}

/// PUT /api/v1/jobs/:id
pub async fn handle_update_job(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(req): Json<UpdateJobRequest>,
) -> Result<Json<JobRow>, AppError> {
    let pool = state.pool()?;
    let job = store::update_job(&pool, id, &req)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("Job {id} not found")))?;
    Ok(Json(job))
}

/// DELETE /api/v1/jobs/:id
pub async fn handle_delete_job(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<StatusCode, AppError> {
    let pool = state.pool()?;
    if !store::delete_job(&pool, id).await? {
        return Err(AppError::NotFound(format!("Job {id} not found")));
    }
    Ok(StatusCode::NO_CONTENT)
}
