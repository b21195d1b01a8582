use sqlx::PgPool;

use crate::config::Config;
use crate::db::ConnectionSupervisor;
use crate::errors::AppError;
use crate::llm_client::GeminiClient;

/// Shared application state injected into all route handlers via Axum extractors.
#[derive(Clone)]
pub struct AppState {
    pub db: ConnectionSupervisor,
    pub llm: GeminiClient,
    pub config: Config,
}

impl AppState {
    /// The live pool, or a 503 while the supervisor has no connection
    /// (limited mode).
    pub fn pool(&self) -> Result<PgPool, AppError> {
        self.db.pool().ok_or_else(|| {
            AppError::ServiceUnavailable(
                "database connection is not available; running in limited mode".to_string(),
            )
        })
    }
}
