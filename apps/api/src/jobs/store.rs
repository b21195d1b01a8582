//! Query layer for the `jobs` table.

use chrono::Utc;
use sqlx::PgPool;
use uuid::Uuid;

use crate::models::job::{
    CreateJobRequest, JobRow, UpdateJobRequest, STATUS_OPTIMIZED, STATUS_PENDING_OPTIMIZATION,
};
use crate::optimize::validator::OptimizationResult;

pub async fn list_jobs(pool: &PgPool) -> Result<Vec<JobRow>, sqlx::Error> {
    sqlx::query_as::<_, JobRow>("SELECT * FROM jobs ORDER BY created_at DESC")
        .fetch_all(pool)
        .await
}

pub async fn fetch_job(pool: &PgPool, id: Uuid) -> Result<Option<JobRow>, sqlx::Error> {
    sqlx::query_as::<_, JobRow>("SELECT * FROM jobs WHERE id = $1")
        .bind(id)
        .fetch_optional(pool)
        .await
}

pub async fn insert_job(pool: &PgPool, req: &CreateJobRequest) -> Result<JobRow, sqlx::Error> {
    sqlx::query_as::<_, JobRow>(
        r#"
        INSERT INTO jobs
            (id, client_name, company_name, position, job_description,
             job_application_link, base_resume, status)
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
        RETURNING *
        "#,
    )
    .bind(Uuid::new_v4())
    .bind(&req.client_name)
    .bind(&req.company_name)
    .bind(&req.position)
    .bind(&req.job_description)
    .bind(&req.job_application_link)
    .bind(&req.base_resume)
    .bind(STATUS_PENDING_OPTIMIZATION)
    .fetch_one(pool)
    .await
}

pub async fn update_job(
    pool: &PgPool,
    id: Uuid,
    req: &UpdateJobRequest,
) -> Result<Option<JobRow>, sqlx::Error> {
    sqlx::query_as::<_, JobRow>(
        r#"
        UPDATE jobs SET
            client_name = COALESCE($2, client_name),
            company_name = COALESCE($3, company_name),
            position = COALESCE($4, position),
            job_description = COALESCE($5, job_description),
            job_application_link = COALESCE($6, job_application_link),
            base_resume = COALESCE($7, base_resume),
            updated_at = $8
        WHERE id = $1
        RETURNING *
        "#,
    )
    .bind(id)
    .bind(&req.client_name)
    .bind(&req.company_name)
    .bind(&req.position)
    .bind(&req.job_description)
    .bind(&req.job_application_link)
    .bind(&req.base_resume)
    .bind(Utc::now())
    .fetch_optional(pool)
    .await
}

pub async fn delete_job(pool: &PgPool, id: Uuid) -> Result<bool, sqlx::Error> {
    let result = sqlx::query("DELETE FROM jobs WHERE id = $1")
        .bind(id)
        .execute(pool)
        .await?;
    Ok(result.rows_affected() > 0)
}

/// Persists a validated optimization result and moves the job to
/// `optimized`. Only ever called with output that passed the validator.
pub async fn mark_optimized(
    pool: &PgPool,
    id: Uuid,
    result: &OptimizationResult,
) -> Result<Option<JobRow>, sqlx::Error> {
    sqlx::query_as::<_, JobRow>(
        r#"
        UPDATE jobs SET
            optimized_resume = $2,
            changes_summary = $3,
            status = $4,
            optimized_on = $5,
            updated_at = $5
        WHERE id = $1
        RETURNING *
        "#,
    )
    .bind(id)
    .bind(&result.optimized_resume)
    .bind(&result.changes_summary)
    .bind(STATUS_OPTIMIZED)
    .bind(Utc::now())
    .fetch_optional(pool)
    .await
}
