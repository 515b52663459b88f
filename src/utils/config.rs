use std::{path::PathBuf, str::FromStr, time::Duration};

use crate::models::error::{Error, Result};

pub const DEFAULT_FEED_BASE_URL: &str = "https://content.guardianapis.com";

#[derive(Debug, Clone)]
pub struct Config {
    pub guardian_api_key: String,
    pub guardian_base_url: String,
    /// Postgres connection string; the in-memory store is used without it.
    pub database_url: Option<String>,
    pub model_dir: PathBuf,
    pub refresh_interval: Duration,
    pub retry_interval: Duration,
    pub cache_ttl: Duration,
    pub log_level: String,
}

impl Config {
    pub fn init() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let var = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        Ok(Config {
            guardian_api_key: var("GUARDIAN_API_KEY")
                .ok_or_else(|| Error::Config("GUARDIAN_API_KEY not set".to_string()))?,
            guardian_base_url: var("GUARDIAN_BASE_URL")
                .unwrap_or_else(|| DEFAULT_FEED_BASE_URL.to_string()),
            database_url: var("DATABASE_URL"),
            model_dir: var("MODEL_DIR")
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from("models")),
            refresh_interval: seconds(var("REFRESH_INTERVAL_SECS"), "REFRESH_INTERVAL_SECS", 600)?,
            retry_interval: seconds(var("RETRY_INTERVAL_SECS"), "RETRY_INTERVAL_SECS", 60)?,
            cache_ttl: seconds(var("CACHE_TTL_SECS"), "CACHE_TTL_SECS", 300)?,
            log_level: var("LOG_LEVEL")
                .unwrap_or_else(|| "info".to_string())
                .to_lowercase(),
        })
    }
}

fn seconds(raw: Option<String>, key: &str, default: u64) -> Result<Duration> {
    match raw {
        None => Ok(Duration::from_secs(default)),
        Some(raw) => u64::from_str(raw.trim())
            .map(Duration::from_secs)
            .map_err(|e| Error::Config(format!("{key}={raw}: {e}"))),
    }
}
