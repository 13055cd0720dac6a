use futures::future::join_all;
use parking_lot::Mutex;
use reqshape_core::{ConnectionPool, SlidingWindowLimiter, TtlCache};
use std::sync::Arc;
use tracing::{debug, info};

use crate::tokio_clock::TokioClock;
use crate::config::ShaperConfig;
use crate::dispatcher::{BatchDispatcher, DispatchOptions};
use crate::error::{ConfigError, Result};
use crate::executor::{Connection, RetryingExecutor};
use crate::monitor::{PressureMonitor, ShaperStats};
use crate::request::{Request, Response};
use crate::task::PeriodicTask;
use crate::transport::Transport;

/// Outcome of [`RequestShaper::prewarm`].
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct PrewarmReport {
    pub succeeded: usize,
    pub failed: usize,
}

/// Owns and wires every component of the shaping layer.
///
/// `start` builds the cache, rate limiter, pool, executor, dispatcher and
/// monitor from one [`ShaperConfig`] and spawns the background tasks:
///
/// - expired-entry sweep (also prunes idle limiter keys and stale pooled
///   connections) every `sweep_interval`,
/// - batch flush every `flush_interval` when batching is enabled,
/// - memory pressure check every `monitor_interval`.
///
/// Call [`dispose`](Self::dispose) to stop them; dropping the shaper aborts
/// them instead.
pub struct RequestShaper {
    config: ShaperConfig,
    dispatcher: Arc<BatchDispatcher>,
    monitor: Arc<PressureMonitor>,
    tasks: Mutex<Vec<PeriodicTask>>,
}

impl RequestShaper {
    /// Validates `config` and starts the shaper. Must run inside a tokio
    /// runtime.
    pub fn start(config: ShaperConfig, transport: Arc<dyn Transport>) -> Result<Self, ConfigError> {
        config.validate()?;

        let cache = Arc::new(
            TtlCache::new(config.max_size, config.ttl_default())
                .with_memory_budget(config.memory_budget_bytes)
                .with_clock(TokioClock),
        );
        let pool = Arc::new(
            ConnectionPool::new(
                config.max_connections,
                config.connection_timeout(),
                Connection::open,
            )
            .with_clock(TokioClock),
        );
        let limiter = Arc::new(
            SlidingWindowLimiter::new(config.rate_limit.limit, config.rate_limit_window())
                .with_clock(TokioClock),
        );

        let executor = Arc::new(
            RetryingExecutor::new(transport, Arc::clone(&cache), Arc::clone(&pool))
                .with_backoff_base(config.backoff_base())
                .with_adaptive_ttl(config.adaptive_ttl),
        );
        let dispatcher = Arc::new(BatchDispatcher::new(
            executor,
            Arc::clone(&limiter),
            DispatchOptions::from_config(&config),
        ));
        let monitor = Arc::new(PressureMonitor::new(
            Arc::clone(&dispatcher),
            config.memory_budget_bytes,
        ));

        let mut tasks = Vec::with_capacity(3);
        tasks.push(PeriodicTask::spawn("cache-sweep", config.sweep_interval(), {
            let cache = Arc::clone(&cache);
            let limiter = Arc::clone(&limiter);
            let pool = Arc::clone(&pool);
            move || {
                let expired = cache.sweep_expired();
                let idle_keys = limiter.prune_idle();
                let idle_connections = pool.evict_idle();
                if expired + idle_keys + idle_connections > 0 {
                    debug!(expired, idle_keys, idle_connections, "sweep finished");
                }
                std::future::ready(())
            }
        }));
        if config.batching_enabled {
            tasks.push(dispatcher.spawn_flusher(config.flush_interval()));
        }
        tasks.push(monitor.spawn(config.monitor_interval()));

        info!(
            max_size = config.max_size,
            batch_size = config.batch_size,
            batching = config.batching_enabled,
            max_connections = config.max_connections,
            rate_limit = config.rate_limit.limit,
            "request shaper started"
        );

        Ok(Self {
            config,
            dispatcher,
            monitor,
            tasks: Mutex::new(tasks),
        })
    }

    pub fn config(&self) -> &ShaperConfig {
        &self.config
    }

    /// Sends `request` through cache, rate limiter and batching.
    pub async fn request(&self, request: Request) -> Result<Response> {
        self.dispatcher.dispatch(request).await
    }

    pub async fn get(&self, target: impl Into<String>) -> Result<Response> {
        self.request(Request::get(target)).await
    }

    /// Fetches every request concurrently so later reads hit the cache.
    /// Individual failures are counted, never propagated.
    pub async fn prewarm<I>(&self, requests: I) -> PrewarmReport
    where
        I: IntoIterator<Item = Request>,
    {
        let results = join_all(requests.into_iter().map(|request| self.request(request))).await;

        let report = results.iter().fold(PrewarmReport::default(), |mut report, result| {
            match result {
                Ok(_) => report.succeeded += 1,
                Err(err) => {
                    debug!(error = %err, "prewarm request failed");
                    report.failed += 1;
                }
            }
            report
        });
        info!(succeeded = report.succeeded, failed = report.failed, "prewarm finished");
        report
    }

    pub fn stats(&self) -> ShaperStats {
        self.monitor.snapshot()
    }

    pub fn dispatcher(&self) -> &Arc<BatchDispatcher> {
        &self.dispatcher
    }

    pub fn cache(&self) -> &Arc<TtlCache<Response>> {
        self.dispatcher.executor().cache()
    }

    pub fn limiter(&self) -> &Arc<SlidingWindowLimiter> {
        self.dispatcher.limiter()
    }

    pub fn pool(&self) -> &Arc<ConnectionPool<Connection>> {
        self.dispatcher.executor().pool()
    }

    /// Rejects queued requests, then stops and joins every background task.
    /// Calling it again is a no-op.
    pub async fn dispose(&self) {
        let rejected = self.dispatcher.shutdown();
        let tasks = std::mem::take(&mut *self.tasks.lock());
        if tasks.is_empty() {
            return;
        }

        for task in tasks {
            task.stop().await;
        }
        info!(rejected, "request shaper disposed");
    }
}
