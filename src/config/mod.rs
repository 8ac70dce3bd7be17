use std::env;
use std::time::Duration;

use crate::execution::{DispatcherConfig, RetryPolicy};

#[derive(Debug, Clone)]
pub struct EngineConfig {
    pub host: String,
    pub port: u16,
    /// Unset runs the engine against the in-memory store (dry-run/demo).
    pub database_url: Option<String>,

    // Execution
    pub per_venue_concurrency: usize,
    pub retry_max_attempts: u32,
    pub retry_base_backoff_ms: u64,
    pub retry_max_backoff_ms: u64,

    // Background services
    pub risk_monitor_interval_secs: u64,

    /// Platforms wired to the built-in dry-run adapter.
    pub paper_platforms: Vec<String>,
}

impl EngineConfig {
    pub fn from_env() -> anyhow::Result<Self> {
        let paper_raw = env::var("PAPER_PLATFORMS").unwrap_or_else(|_| "paper".into());
        let paper_platforms: Vec<String> = paper_raw
            .split(',')
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .collect();

        Ok(Self {
            host: env::var("HOST").unwrap_or_else(|_| "0.0.0.0".into()),
            port: env::var("PORT")
                .unwrap_or_else(|_| "8080".into())
                .parse()?,
            database_url: env::var("DATABASE_URL").ok(),

            per_venue_concurrency: env::var("PER_VENUE_CONCURRENCY")
                .unwrap_or_else(|_| "8".into())
                .parse()
                .unwrap_or(8),
            retry_max_attempts: env::var("RETRY_MAX_ATTEMPTS")
                .unwrap_or_else(|_| "3".into())
                .parse()
                .unwrap_or(3),
            retry_base_backoff_ms: env::var("RETRY_BASE_BACKOFF_MS")
                .unwrap_or_else(|_| "200".into())
                .parse()
                .unwrap_or(200),
            retry_max_backoff_ms: env::var("RETRY_MAX_BACKOFF_MS")
                .unwrap_or_else(|_| "2000".into())
                .parse()
                .unwrap_or(2_000),

            risk_monitor_interval_secs: env::var("RISK_MONITOR_INTERVAL_SECS")
                .unwrap_or_else(|_| "10".into())
                .parse()
                .unwrap_or(10),

            paper_platforms,
        })
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_attempts: self.retry_max_attempts.max(1),
            base_backoff: Duration::from_millis(self.retry_base_backoff_ms),
            max_backoff: Duration::from_millis(self.retry_max_backoff_ms),
        }
    }

    pub fn dispatcher_config(&self) -> DispatcherConfig {
        DispatcherConfig {
            per_venue_concurrency: self.per_venue_concurrency.max(1),
            retry: self.retry_policy(),
        }
    }
}
