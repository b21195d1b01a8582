use anyhow::{Context, Result};

/// Application configuration loaded from environment variables.
/// Only the primary database endpoint is strictly required at startup;
/// the generation API key is checked per-request so the CRUD surface can
/// run without it.
#[derive(Debug, Clone)]
pub struct Config {
    pub database_url: String,
    pub database_fallback_url: Option<String>,
    pub gemini_api_key: Option<String>,
    pub port: u16,
    pub rust_log: String,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        dotenvy::dotenv().ok(); // load .env if present; ignore if missing

        Ok(Config {
            database_url: require_env("DATABASE_URL")?,
            database_fallback_url: std::env::var("DATABASE_FALLBACK_URL").ok(),
            gemini_api_key: std::env::var("GEMINI_API_KEY").ok(),
            port: std::env::var("PORT")
                .unwrap_or_else(|_| "8080".to_string())
                .parse::<u16>()
                .context("PORT must be a valid port number")?,
            rust_log: std::env::var("RUST_LOG").unwrap_or_else(|_| "info".to_string()),
        })
    }
}

fn require_env(key: &str) -> Result<String> {
    std::env::var(key).with_context(|| format!("Required environment variable '{key}' is not set"))
}
