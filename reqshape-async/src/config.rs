use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::error::ConfigError;

/// Per-resource admission control settings.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RateLimitConfig {
    /// Sliding window length in milliseconds
    pub window_ms: u64,
    /// Admissions allowed per window and resource key
    pub limit: u32,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            window_ms: 60_000,
            limit: 100,
        }
    }
}

/// Every tunable of the request shaper.
///
/// All fields have defaults, so a TOML document only needs the values it
/// changes:
///
/// ```
/// use reqshape_async::ShaperConfig;
///
/// let config = ShaperConfig::from_toml_str(r#"
///     max_size = 500
///     batch_size = 5
///
///     [rate_limit]
///     limit = 10
/// "#).unwrap();
///
/// assert_eq!(config.max_size, 500);
/// assert_eq!(config.rate_limit.limit, 10);
/// assert_eq!(config.rate_limit.window_ms, 60_000);
/// ```
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ShaperConfig {
    // cache
    /// Entry cap before LRU eviction
    pub max_size: usize,
    /// TTL used when adaptive sizing is off or not applicable
    pub ttl_default_ms: u64,
    /// Estimated bytes the cache may hold before oldest-first eviction
    pub memory_budget_bytes: usize,
    /// Expired-entry sweep period
    pub sweep_interval_ms: u64,
    /// Size TTLs from observed execution time
    pub adaptive_ttl: bool,

    // batching
    pub batching_enabled: bool,
    /// Max requests per drained batch
    pub batch_size: usize,
    /// Periodic batch flush
    pub flush_interval_ms: u64,
    /// How long a batched caller waits before `BatchTimeout`
    pub batch_timeout_ms: u64,
    /// Queue bound; further batchable requests are rejected with `QueueFull`
    pub max_queue_depth: usize,

    // pool
    pub max_connections: usize,
    /// Idle time after which a pooled connection may be reclaimed
    pub connection_timeout_ms: u64,

    pub rate_limit: RateLimitConfig,

    // executor
    /// Attempt budget per request
    pub retries: u32,
    /// Per-attempt timeout
    pub timeout_ms: u64,
    /// First backoff delay, doubled after every failed attempt
    pub backoff_base_ms: u64,

    /// Stats/pressure monitor period
    pub monitor_interval_ms: u64,
}

impl Default for ShaperConfig {
    fn default() -> Self {
        Self {
            max_size: 1000,
            ttl_default_ms: 5 * 60_000,
            memory_budget_bytes: reqshape_core::DEFAULT_MEMORY_BUDGET,
            sweep_interval_ms: 60_000,
            adaptive_ttl: true,
            batching_enabled: true,
            batch_size: 10,
            flush_interval_ms: 100,
            batch_timeout_ms: 30_000,
            max_queue_depth: 1000,
            max_connections: 10,
            connection_timeout_ms: 30_000,
            rate_limit: RateLimitConfig::default(),
            retries: 3,
            timeout_ms: 10_000,
            backoff_base_ms: 1000,
            monitor_interval_ms: 30_000,
        }
    }
}

impl ShaperConfig {
    /// Parses a TOML document and validates it.
    pub fn from_toml_str(source: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(source)?;
        config.validate()?;
        Ok(config)
    }

    /// Rejects zero sizes, budgets and periods.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let non_zero: [(&'static str, u64); 13] = [
            ("max_size", self.max_size as u64),
            ("ttl_default_ms", self.ttl_default_ms),
            ("memory_budget_bytes", self.memory_budget_bytes as u64),
            ("sweep_interval_ms", self.sweep_interval_ms),
            ("batch_size", self.batch_size as u64),
            ("flush_interval_ms", self.flush_interval_ms),
            ("batch_timeout_ms", self.batch_timeout_ms),
            ("max_queue_depth", self.max_queue_depth as u64),
            ("max_connections", self.max_connections as u64),
            ("rate_limit.window_ms", self.rate_limit.window_ms),
            ("retries", self.retries as u64),
            ("timeout_ms", self.timeout_ms),
            ("monitor_interval_ms", self.monitor_interval_ms),
        ];

        match non_zero.iter().find(|(_, value)| *value == 0) {
            Some((field, _)) => Err(ConfigError::Zero { field: *field }),
            None => Ok(()),
        }
    }

    pub fn ttl_default(&self) -> Duration {
        Duration::from_millis(self.ttl_default_ms)
    }

    pub fn sweep_interval(&self) -> Duration {
        Duration::from_millis(self.sweep_interval_ms)
    }

    pub fn flush_interval(&self) -> Duration {
        Duration::from_millis(self.flush_interval_ms)
    }

    pub fn batch_timeout(&self) -> Duration {
        Duration::from_millis(self.batch_timeout_ms)
    }

    pub fn connection_timeout(&self) -> Duration {
        Duration::from_millis(self.connection_timeout_ms)
    }

    pub fn rate_limit_window(&self) -> Duration {
        Duration::from_millis(self.rate_limit.window_ms)
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    pub fn backoff_base(&self) -> Duration {
        Duration::from_millis(self.backoff_base_ms)
    }

    pub fn monitor_interval(&self) -> Duration {
        Duration::from_millis(self.monitor_interval_ms)
    }
}
