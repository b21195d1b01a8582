pub mod health;

use axum::{
    routing::{get, post},
    Router,
};

use crate::jobs::handlers as jobs;
use crate::optimize::handlers as optimize;
use crate::state::AppState;

pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health::health_handler))
        .route(
            "/api/v1/jobs",
            get(jobs::handle_list_jobs).post(jobs::handle_create_job),
        )
        .route(
            "/api/v1/jobs/:id",
            get(jobs::handle_get_job)
                .put(jobs::handle_update_job)
                .delete(jobs::handle_delete_job),
        )
        .route(
            "/api/v1/jobs/:id/optimize",
            post(optimize::handle_optimize_job),
        )
        .with_state(state)
}
