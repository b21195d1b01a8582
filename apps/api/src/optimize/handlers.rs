use axum::{
    extract::{Path, State},
    Json,
};
use serde::Serialize;
use tracing::info;
use uuid::Uuid;

use crate::errors::AppError;
use crate::jobs::store;
use crate::llm_client::LlmError;
use crate::models::job::JobRow;
use crate::optimize::prompts::{OPTIMIZE_PROMPT_TEMPLATE, OPTIMIZE_SYSTEM};
use crate::optimize::validator::{validate, validate_optimize_inputs, OptimizationResult};
use crate::state::AppState;

#[derive(Debug, Serialize)]
pub struct OptimizeJobResponse {
    pub job: JobRow,
    pub optimization: OptimizationResult,
}

/// POST /api/v1/jobs/:id/optimize
///
/// Loads the job, validates its inputs before spending a generation call,
/// then validates the raw response before anything is persisted. The job
/// moves to `optimized` only on full success.
pub async fn handle_optimize_job(
    State(state): State<AppState>,
    Path(job_id): Path<Uuid>,
) -> Result<Json<OptimizeJobResponse>, AppError> {
    let pool = state.pool()?;

    let job = store::fetch_job(&pool, job_id)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("Job {job_id} not found")))?;

    validate_optimize_inputs(job.base_resume.as_deref(), Some(job.job_description.as_str()))?;

    // Credential check happens after input validation but still before any
    // external call: a missing key is a server-side configuration error,
    // reported immediately and never retried.
    if state.config.gemini_api_key.is_none() {
        return Err(AppError::Config(
            "generation API key is not configured".to_string(),
        ));
    }

    let base_resume = job.base_resume.as_deref().unwrap_or_default();
    let prompt = OPTIMIZE_PROMPT_TEMPLATE
        .replace("{base_resume}", base_resume)
        .replace("{job_description}", &job.job_description);

    info!("Requesting resume optimization for job {job_id}");
    let raw = state
        .llm
        .call(&prompt, OPTIMIZE_SYSTEM)
        .await
        .map_err(|e| match e {
            LlmError::MissingApiKey => {
                AppError::Config("generation API key is not configured".to_string())
            }
            other => AppError::Llm(other.to_string()),
        })?;

    let optimization = validate(&raw)?;

    let job = store::mark_optimized(&pool, job_id, &optimization)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("Job {job_id} not found")))?;

    info!("Job {job_id} optimized");
    Ok(Json(OptimizeJobResponse { job, optimization }))
}
