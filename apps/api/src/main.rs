mod config;
mod db;
mod errors;
mod jobs;
mod llm_client;
mod models;
mod optimize;
mod routes;
mod state;

use anyhow::Result;
use axum::extract::DefaultBodyLimit;
use std::net::SocketAddr;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use crate::config::Config;
use crate::db::{ConnectionSettings, ConnectionSupervisor};
use crate::llm_client::GeminiClient;
use crate::routes::build_router;
use crate::state::AppState;

const MAX_BODY_BYTES: usize = 10 * 1024 * 1024;

#[tokio::main]
async fn main() -> Result<()> {
    // Load configuration first (fails fast on missing required env vars)
    let config = Config::from_env()?;

    // Initialize structured logging
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| {
            EnvFilter::new(format!("{}={}", env!("CARGO_PKG_NAME"), &config.rust_log))
        }))
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("Starting JobTrack API v{}", env!("CARGO_PKG_VERSION"));

    // Start the connection supervisor. This does not block the HTTP
    // listener: on total failure the service comes up in limited mode and
    // the supervisor keeps watching for the database in the background.
    let supervisor = ConnectionSupervisor::new(ConnectionSettings::new(
        config.database_url.clone(),
        config.database_fallback_url.clone(),
    ));
    supervisor.start().await;

    if let Some(pool) = supervisor.pool() {
        sqlx::migrate!().run(&pool).await?;
        info!("Database migrations applied");
    }

    // Initialize LLM client
    let llm = GeminiClient::new(config.gemini_api_key.clone());
    if config.gemini_api_key.is_none() {
        warn!("GEMINI_API_KEY is not set; resume optimization requests will fail");
    }
    info!("LLM client initialized (model: {})", llm_client::MODEL);

    // Build app state
    let state = AppState {
        db: supervisor.clone(),
        llm,
        config: config.clone(),
    };

    // Build router
    let app = build_router(state)
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive()) // TODO: tighten CORS in production
        .layer(DefaultBodyLimit::max(MAX_BODY_BYTES));

    let addr: SocketAddr = format!("0.0.0.0:{}", config.port).parse()?;
    info!("Listening on {addr}");

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    // Scoped close: exit 0 on a clean close, 1 when the pool won't shut down.
    match supervisor.shutdown().await {
        Ok(()) => {
            info!("Shutdown complete");
            Ok(())
        }
        Err(e) => {
            error!("Failed to close the database connection: {e}");
            std::process::exit(1);
        }
    }
}

async fn shutdown_signal() {
    tokio::signal::ctrl_c()
        .await
        .expect("failed to install Ctrl+C handler");
    info!("Termination signal received; shutting down");
}
