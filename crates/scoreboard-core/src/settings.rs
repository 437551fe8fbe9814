//! Runtime settings loaded from defaults and environment variables

use crate::error::Result;
use config::{Config, Environment, Source};
use serde::Deserialize;

/// Development fallback for `JWT_SECRET_KEY`
pub const DEFAULT_JWT_SECRET: &str = "jwt-secret-key-change-in-production";

#[derive(Debug, Clone, Deserialize)]
pub struct Settings {
    /// Overrides the per-service default listen address
    #[serde(default)]
    pub bind_address: Option<String>,
    pub database_path: String,
    pub jwt_secret_key: String,
    pub upload_dir: String,
    pub max_upload_bytes: usize,
    pub leaderboard_cache_ttl_secs: u64,
    #[serde(default)]
    pub super_admin_username: Option<String>,
    #[serde(default)]
    pub super_admin_password: Option<String>,

    pub auth_service_url: String,
    pub user_service_url: String,
    pub group_service_url: String,
    pub scoring_service_url: String,
    pub leaderboard_service_url: String,

    pub rate_limit_window_secs: u64,
    pub rate_limit_default: u32,
    pub rate_limit_register: u32,
    pub rate_limit_login: u32,
    pub trust_proxy: bool,
    pub proxy_timeout_secs: u64,
    pub health_timeout_secs: u64,
}

impl Settings {
    /// Defaults overlaid with the process environment
    pub fn load() -> Result<Self> {
        Self::from_source(Environment::default().try_parsing(true))
    }

    /// Defaults overlaid with explicit `(VARIABLE, value)` pairs instead of
    /// the process environment
    pub fn from_pairs(pairs: &[(&str, &str)]) -> Result<Self> {
        let map: config::Map<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        Self::from_source(Environment::default().try_parsing(true).source(Some(map)))
    }

    pub fn from_source<S>(source: S) -> Result<Self>
    where
        S: Source + Send + Sync + 'static,
    {
        let settings = Config::builder()
            .set_default("database_path", "data/scoreboard.db")?
            .set_default("jwt_secret_key", DEFAULT_JWT_SECRET)?
            .set_default("upload_dir", "data/uploads")?
            .set_default("max_upload_bytes", 5_i64 * 1024 * 1024)?
            .set_default("leaderboard_cache_ttl_secs", 300_i64)?
            .set_default("auth_service_url", "http://localhost:5001")?
            .set_default("user_service_url", "http://localhost:5002")?
            .set_default("group_service_url", "http://localhost:5003")?
            .set_default("scoring_service_url", "http://localhost:5004")?
            .set_default("leaderboard_service_url", "http://localhost:5005")?
            .set_default("rate_limit_window_secs", 3600_i64)?
            .set_default("rate_limit_default", 100_i64)?
            .set_default("rate_limit_register", 10_i64)?
            .set_default("rate_limit_login", 20_i64)?
            .set_default("trust_proxy", false)?
            .set_default("proxy_timeout_secs", 30_i64)?
            .set_default("health_timeout_secs", 5_i64)?
            .add_source(source)
            .build()?;

        Ok(settings.try_deserialize()?)
    }

    pub fn uses_default_secret(&self) -> bool {
        self.jwt_secret_key == DEFAULT_JWT_SECRET
    }
}
