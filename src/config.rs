//! Type-safe configuration loader using the `config` crate (TOML + env
//! overrides), matching the teacher's `Settings` shape and extended with
//! the fields the ingestion/reasoning pipeline needs.

use std::{env, path::PathBuf, time::Duration};

use config::{Config, ConfigError, File};
use serde::Deserialize;

fn default_database_url() -> String {
    "postgres://localhost/osint_pipeline".to_string()
}

fn default_sources_path() -> PathBuf {
    PathBuf::from("data/sources.json")
}

fn default_pool_config_path() -> PathBuf {
    PathBuf::from("config/llm_pools.yaml")
}

fn default_server_bind() -> String {
    "0.0.0.0:8080".to_string()
}

fn default_ingest_interval() -> Duration {
    Duration::from_secs(2 * 60 * 60)
}

fn default_fetch_week_weeks() -> u64 {
    1
}

fn default_global_max_concurrent() -> usize {
    4
}

fn default_classify_max_concurrent() -> usize {
    3
}

fn default_true() -> bool {
    true
}

fn default_min_global_ms() -> u64 {
    500
}

fn default_max_global_ms() -> u64 {
    1_500
}

fn default_min_domain_secs() -> u64 {
    3
}

fn default_max_domain_secs() -> u64 {
    8
}

#[derive(Deserialize, Debug, Clone)]
pub struct Settings {
    /// Postgres connection URL.
    #[serde(default = "default_database_url")]
    pub database_url: String,

    /// Path to the source list (JSON or OPML), §6.
    #[serde(default = "default_sources_path")]
    pub sources_path: PathBuf,

    /// Path to the declarative model-pool config document, §6.
    #[serde(default = "default_pool_config_path")]
    pub pool_config_path: PathBuf,

    /// How often the periodic ingestion job fires (default 2h, §4.13).
    #[serde(default = "default_ingest_interval", with = "humantime_serde")]
    pub ingest_interval: Duration,

    /// HTTP bind address for the liveness/metrics/health server.
    #[serde(default = "default_server_bind")]
    pub server_bind: String,

    /// Optional HTTP proxy for feed fetches, from `NETWORK_PROXY`.
    #[serde(default)]
    pub network_proxy: Option<String>,

    /// Full-sync lookback window, in weeks back from now, when a feed is
    /// newly observed (§4.7 step 3: `[now − fetch_week, feed.updated]`).
    #[serde(default = "default_fetch_week_weeks")]
    pub fetch_week_weeks: u64,

    /// Global concurrency cap for the web extractor (§4.5).
    #[serde(default = "default_global_max_concurrent")]
    pub global_max_concurrent: usize,

    /// Whether anti-detection mode is enabled (caps concurrency at 2).
    #[serde(default = "default_true")]
    pub anti_detection: bool,

    /// Bounded-concurrency worker count for the `classify` workflow (§4.12).
    #[serde(default = "default_classify_max_concurrent")]
    pub classify_max_concurrent: usize,

    #[serde(default = "default_min_global_ms")]
    pub rate_limit_min_global_ms: u64,
    #[serde(default = "default_max_global_ms")]
    pub rate_limit_max_global_ms: u64,
    #[serde(default = "default_min_domain_secs")]
    pub rate_limit_min_domain_secs: u64,
    #[serde(default = "default_max_domain_secs")]
    pub rate_limit_max_domain_secs: u64,
}

impl Settings {
    /// Load defaults from `Config.toml` (if present), then apply
    /// environment-variable overrides:
    ///
    /// - `DATABASE_URL`, `NETWORK_PROXY`
    /// - `APP__INGEST_INTERVAL`, `APP__SERVER_BIND`, `APP__SOURCES_PATH`,
    ///   `APP__POOL_CONFIG_PATH`
    pub fn new() -> Result<Self, ConfigError> {
        let cfg = Config::builder()
            .add_source(File::with_name("Config").required(false))
            .build()?;
        let mut settings: Settings = cfg.try_deserialize()?;

        if let Ok(db_url) = env::var("DATABASE_URL") {
            settings.database_url = db_url;
        }
        if let Ok(proxy) = env::var("NETWORK_PROXY") {
            settings.network_proxy = Some(proxy);
        }
        if let Ok(interval_str) = env::var("APP__INGEST_INTERVAL") {
            settings.ingest_interval = humantime::parse_duration(&interval_str)
                .map_err(|e| ConfigError::Foreign(Box::new(e)))?;
        }
        if let Ok(bind) = env::var("APP__SERVER_BIND") {
            settings.server_bind = bind;
        }
        if let Ok(sources_path) = env::var("APP__SOURCES_PATH") {
            settings.sources_path = PathBuf::from(sources_path);
        }
        if let Ok(pool_config_path) = env::var("APP__POOL_CONFIG_PATH") {
            settings.pool_config_path = PathBuf::from(pool_config_path);
        }

        Ok(settings)
    }
}
