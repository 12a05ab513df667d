//! Process-level configuration with env-var loading.

use serde::{Deserialize, Serialize};

/// Engine configuration. Every field has a default so a bare `Config` is
/// runnable against local services.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// HTTP bind address for the dispatch server.
    pub address: String,
    /// DSN of the persistence substrate behind the backend.
    pub backend_dsn: String,
    pub redis_url: String,

    /// Send worker pool size; 0 = CPU count × 4.
    pub max_workers: usize,
    /// Period a repeated `(channel, external_id)` counts as a duplicate.
    pub dedup_window_secs: u64,

    pub request_timeout_secs: u64,
    pub send_timeout_secs: u64,
    pub fetch_timeout_secs: u64,
    pub shutdown_grace_secs: u64,

    pub max_body_bytes: usize,
    pub max_attachment_bytes: usize,
    pub max_redirects: usize,
    /// Outbound connections per provider host.
    pub per_host_concurrency: usize,

    /// Fraction of successful requests whose channel log is persisted
    /// anyway. Errored logs are always persisted.
    pub success_log_sample: f64,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            address: "0.0.0.0:8080".to_string(),
            backend_dsn: "postgres://localhost/courier".to_string(),
            redis_url: "redis://localhost:6379/0".to_string(),
            max_workers: 0,
            dedup_window_secs: 4 * 60 * 60,
            request_timeout_secs: 30,
            send_timeout_secs: 30,
            fetch_timeout_secs: 30,
            shutdown_grace_secs: 15,
            max_body_bytes: 1024 * 1024,
            max_attachment_bytes: 25 * 1024 * 1024,
            max_redirects: 5,
            per_host_concurrency: 16,
            success_log_sample: 0.1,
        }
    }
}

impl Config {
    /// Load from `HERALD_*` environment variables, falling back to defaults
    /// for anything unset or unparseable.
    pub fn from_env() -> Self {
        let mut config = Self::default();
        let defaults = Self::default();

        config.address = env_str("HERALD_ADDRESS", defaults.address);
        config.backend_dsn = env_str("HERALD_BACKEND_DSN", defaults.backend_dsn);
        config.redis_url = env_str("HERALD_REDIS_URL", defaults.redis_url);
        config.max_workers = env_parse("HERALD_MAX_WORKERS", defaults.max_workers);
        config.dedup_window_secs = env_parse("HERALD_DEDUP_WINDOW_SECS", defaults.dedup_window_secs);
        config.request_timeout_secs =
            env_parse("HERALD_REQUEST_TIMEOUT_SECS", defaults.request_timeout_secs);
        config.send_timeout_secs = env_parse("HERALD_SEND_TIMEOUT_SECS", defaults.send_timeout_secs);
        config.fetch_timeout_secs =
            env_parse("HERALD_FETCH_TIMEOUT_SECS", defaults.fetch_timeout_secs);
        config.shutdown_grace_secs =
            env_parse("HERALD_SHUTDOWN_GRACE_SECS", defaults.shutdown_grace_secs);
        config.max_body_bytes = env_parse("HERALD_MAX_BODY_BYTES", defaults.max_body_bytes);
        config.max_attachment_bytes =
            env_parse("HERALD_MAX_ATTACHMENT_BYTES", defaults.max_attachment_bytes);
        config.max_redirects = env_parse("HERALD_MAX_REDIRECTS", defaults.max_redirects);
        config.per_host_concurrency =
            env_parse("HERALD_PER_HOST_CONCURRENCY", defaults.per_host_concurrency);
        config.success_log_sample =
            env_parse("HERALD_SUCCESS_LOG_SAMPLE", defaults.success_log_sample);

        config
    }

    /// Effective worker pool size.
    pub fn worker_count(&self) -> usize {
        if self.max_workers > 0 {
            self.max_workers
        } else {
            std::thread::available_parallelism()
                .map(|n| n.get() * 4)
                .unwrap_or(16)
        }
    }
}

fn env_str(key: &str, default: String) -> String {
    std::env::var(key).unwrap_or(default)
}

fn env_parse<T: std::str::FromStr>(key: &str, default: T) -> T {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}
