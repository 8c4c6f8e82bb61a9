//! Application configuration from environment variables.

use std::path::PathBuf;

use crate::app::{EstuaryError, Result};

/// Runtime configuration, read once at startup.
#[derive(Debug, Clone)]
pub struct Config {
    pub db_path: PathBuf,
    pub cache_dir: PathBuf,
    pub uploads_dir: PathBuf,
    pub max_upload_size_mb: u64,

    pub anthropic_api_key: Option<String>,
    pub openai_api_key: Option<String>,
    pub google_api_key: Option<String>,
    pub llm_provider: Option<String>,
    pub llm_model: Option<String>,

    pub exa_api_key: Option<String>,
    pub enable_related_links: bool,

    pub enable_js_render: bool,
    pub enable_archive: bool,
    pub js_render_timeout_ms: u64,
    pub archive_max_age_days: i64,

    pub gmail_client_id: Option<String>,
    pub gmail_client_secret: Option<String>,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        let data_dir = Self::default_data_dir()?;

        Ok(Self {
            db_path: env_path("DB_PATH").unwrap_or_else(|| data_dir.join("articles.db")),
            cache_dir: env_path("CACHE_DIR").unwrap_or_else(|| data_dir.join("cache")),
            uploads_dir: env_path("UPLOADS_DIR").unwrap_or_else(|| data_dir.join("uploads")),
            max_upload_size_mb: env_u64("MAX_UPLOAD_SIZE_MB", 25),
            anthropic_api_key: env_opt("ANTHROPIC_API_KEY"),
            openai_api_key: env_opt("OPENAI_API_KEY"),
            google_api_key: env_opt("GOOGLE_API_KEY"),
            llm_provider: env_opt("LLM_PROVIDER"),
            llm_model: env_opt("LLM_MODEL"),
            exa_api_key: env_opt("EXA_API_KEY"),
            enable_related_links: env_bool("ENABLE_RELATED_LINKS", true),
            enable_js_render: env_bool("ENABLE_JS_RENDER", true),
            enable_archive: env_bool("ENABLE_ARCHIVE", true),
            js_render_timeout_ms: env_u64("JS_RENDER_TIMEOUT", 30_000),
            archive_max_age_days: env_u64("ARCHIVE_MAX_AGE_DAYS", 30) as i64,
            gmail_client_id: env_opt("GMAIL_CLIENT_ID"),
            gmail_client_secret: env_opt("GMAIL_CLIENT_SECRET"),
        })
    }

    fn default_data_dir() -> Result<PathBuf> {
        let data_dir = dirs::data_dir()
            .ok_or_else(|| EstuaryError::Config("Could not find data directory".into()))?;
        let estuary_dir = data_dir.join("estuary");
        std::fs::create_dir_all(&estuary_dir)?;
        Ok(estuary_dir)
    }
}

fn env_opt(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|v| !v.trim().is_empty())
}

fn env_path(key: &str) -> Option<PathBuf> {
    env_opt(key).map(PathBuf::from)
}

fn env_u64(key: &str, default: u64) -> u64 {
    env_opt(key)
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

fn env_bool(key: &str, default: bool) -> bool {
    match env_opt(key) {
        Some(v) => matches!(v.to_lowercase().as_str(), "true" | "1" | "yes" | "on"),
        None => default,
    }
}
