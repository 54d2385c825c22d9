use anyhow::{anyhow, Result};
use std::collections::HashMap;
use std::str::FromStr;

#[derive(Clone, Debug)]
pub struct AppConfig {
    pub app_mode: String,
    pub database_url: String,
    pub redis_url: String,
    pub queue_endpoint: String,
    pub queue_region: String,
    /// Base name for the four physical queues (two routing destinations,
    /// each split live/backlog).
    pub queue_prefix: String,
    pub queue_visibility_timeout_seconds: u32,
    /// A unit delivered more than this many times is dropped, not retried.
    pub queue_max_deliveries: u32,
    pub db_max_connections: u32,
    pub db_connect_timeout_seconds: u64,
    pub db_idle_timeout_seconds: u64,
    pub db_max_lifetime_seconds: u64,
    pub source_base_url: String,
    pub source_user_agent: String,
    /// Service account name -> bearer token. Credential issuance itself is
    /// handled outside this pipeline.
    pub source_account_tokens: HashMap<String, String>,
    /// Communities per reader chunk; bounded by source URL-length and
    /// rate-limit constraints.
    pub chunk_size: usize,
    pub page_limit: usize,
    pub poll_interval_seconds: u64,
    pub buffer_flush_threshold: usize,
    pub dispatch_chunk_size: usize,
    pub registry_refresh_seconds: u64,
    pub cache_retention_days: u32,
    pub worker_concurrency: usize,
    pub alert_body_max_chars: usize,
}

impl AppConfig {
    pub fn from_env() -> Result<Self> {
        let source_account_tokens: HashMap<String, String> =
            match std::env::var("SOURCE_ACCOUNT_TOKENS") {
                Ok(raw) => serde_json::from_str(&raw)
                    .map_err(|err| anyhow!("invalid SOURCE_ACCOUNT_TOKENS: {}", err))?,
                Err(_) => HashMap::new(),
            };

        Ok(Self {
            app_mode: env_or("APP_MODE", "ingest"),
            database_url: env_or_err("DATABASE_URL")?,
            redis_url: env_or("REDIS_URL", "redis://127.0.0.1/"),
            queue_endpoint: env_or_err("QUEUE_ENDPOINT")?,
            queue_region: env_or("QUEUE_REGION", "us-east-1"),
            queue_prefix: env_or("QUEUE_PREFIX", "vigil-actions"),
            queue_visibility_timeout_seconds: env_or_parse("QUEUE_VISIBILITY_TIMEOUT_SECONDS", "60")?,
            queue_max_deliveries: env_or_parse("QUEUE_MAX_DELIVERIES", "5")?,
            db_max_connections: env_or_parse("DB_MAX_CONNECTIONS", "25")?,
            db_connect_timeout_seconds: env_or_parse("DB_CONNECT_TIMEOUT_SECONDS", "5")?,
            db_idle_timeout_seconds: env_or_parse("DB_IDLE_TIMEOUT_SECONDS", "300")?,
            db_max_lifetime_seconds: env_or_parse("DB_MAX_LIFETIME_SECONDS", "1800")?,
            source_base_url: env_or("SOURCE_BASE_URL", "https://oauth.reddit.com"),
            source_user_agent: env_or("SOURCE_USER_AGENT", "vigil-modlog/0.1"),
            source_account_tokens,
            chunk_size: env_or_parse("CHUNK_SIZE", "10")?,
            page_limit: env_or_parse("PAGE_LIMIT", "500")?,
            poll_interval_seconds: env_or_parse("POLL_INTERVAL_SECONDS", "30")?,
            buffer_flush_threshold: env_or_parse("BUFFER_FLUSH_THRESHOLD", "500")?,
            dispatch_chunk_size: env_or_parse("DISPATCH_CHUNK_SIZE", "10")?,
            registry_refresh_seconds: env_or_parse("REGISTRY_REFRESH_SECONDS", "30")?,
            cache_retention_days: env_or_parse("CACHE_RETENTION_DAYS", "3")?,
            worker_concurrency: env_or_parse("WORKER_CONCURRENCY", "4")?,
            alert_body_max_chars: env_or_parse("ALERT_BODY_MAX_CHARS", "400")?,
        })
    }
}

fn env_or(key: &str, default: &str) -> String {
    std::env::var(key).unwrap_or_else(|_| default.to_string())
}

fn env_or_err(key: &str) -> Result<String> {
    std::env::var(key).map_err(|_| anyhow!("missing required env var: {}", key))
}

fn env_or_parse<T>(key: &str, default: &str) -> Result<T>
where
    T: FromStr,
    <T as FromStr>::Err: std::fmt::Display,
{
    let value = std::env::var(key).unwrap_or_else(|_| default.to_string());
    value
        .parse::<T>()
        .map_err(|err| anyhow!("invalid {}: {}", key, err))
}
