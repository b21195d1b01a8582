use axum::{extract::State, Json};
use serde_json::{json, Value};

use crate::state::AppState;

/// GET /health
/// Returns service identity plus the database connection phase, so limited
/// mode is visible without poking a data route.
pub async fn health_handler(State(state): State<AppState>) -> Json<Value> {
    Json(json!({
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION"),
        "service": "jobtrack-api",
        "database": state.db.phase().as_str()
    }))
}
