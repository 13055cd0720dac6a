#![allow(dead_code)]

use reqshape_async::ShaperConfig;
use tracing_subscriber::EnvFilter;

/// Routes `tracing` output to the test harness; `RUST_LOG` picks the level.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

/// Defaults tuned for tests: fast timeouts and backoff, slow background
/// sweeps so they never interfere.
pub fn test_config() -> ShaperConfig {
    ShaperConfig {
        timeout_ms: 200,
        backoff_base_ms: 10,
        retries: 3,
        sweep_interval_ms: 60_000,
        monitor_interval_ms: 60_000,
        ..ShaperConfig::default()
    }
}
