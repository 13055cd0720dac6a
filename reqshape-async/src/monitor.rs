use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

use crate::dispatcher::BatchDispatcher;
use crate::task::PeriodicTask;

/// Point-in-time view of the whole shaping layer.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct ShaperStats {
    pub hit_rate: f64,
    pub hits: u64,
    pub misses: u64,
    pub evictions: u64,
    pub cache_size: usize,
    pub memory_estimate: usize,
    pub memory_budget: usize,
    pub active_connections: usize,
    pub idle_connections: usize,
    pub rate_limited_keys: usize,
    pub queue_depth: usize,
    pub pending_batched: usize,
    pub batches_flushed: u64,
    pub total_requests: u64,
    pub failed_requests: u64,
    pub retries: u64,
}

/// Aggregates counters and enforces the cache's memory budget.
pub struct PressureMonitor {
    dispatcher: Arc<BatchDispatcher>,
    memory_budget: usize,
}

impl PressureMonitor {
    pub fn new(dispatcher: Arc<BatchDispatcher>, memory_budget: usize) -> Self {
        Self {
            dispatcher,
            memory_budget,
        }
    }

    pub fn memory_budget(&self) -> usize {
        self.memory_budget
    }

    /// Forces oldest-first eviction when the cache estimate exceeds the
    /// budget. Returns the number of evicted entries.
    pub fn check(&self) -> usize {
        let cache = self.dispatcher.executor().cache();
        let estimate = cache.memory_estimate();
        if estimate <= self.memory_budget {
            return 0;
        }

        let evicted = cache.evict_for_memory_pressure();
        warn!(
            estimate,
            budget = self.memory_budget,
            evicted,
            "cache over memory budget, evicted oldest entries"
        );
        evicted
    }

    pub fn snapshot(&self) -> ShaperStats {
        let executor = self.dispatcher.executor();
        let cache = executor.cache().stats();
        let pool = executor.pool();

        ShaperStats {
            hit_rate: cache.hit_rate(),
            hits: cache.hits,
            misses: cache.misses,
            evictions: cache.evictions,
            cache_size: cache.size,
            memory_estimate: cache.memory_estimate,
            memory_budget: self.memory_budget,
            active_connections: pool.active_count(),
            idle_connections: pool.idle_count(),
            rate_limited_keys: self.dispatcher.limiter().tracked_keys(),
            queue_depth: self.dispatcher.queue_depth(),
            pending_batched: self.dispatcher.pending_count(),
            batches_flushed: self.dispatcher.batches_flushed(),
            total_requests: executor.total_requests(),
            failed_requests: executor.failed_requests(),
            retries: executor.retries(),
        }
    }

    /// Spawns the periodic pressure check.
    pub fn spawn(self: &Arc<Self>, interval: Duration) -> PeriodicTask {
        let monitor = Arc::clone(self);
        PeriodicTask::spawn("pressure-monitor", interval, move || {
            monitor.check();
            let stats = monitor.snapshot();
            debug!(
                hit_rate = stats.hit_rate,
                cache_size = stats.cache_size,
                memory = stats.memory_estimate,
                active = stats.active_connections,
                queue = stats.queue_depth,
                "shaper stats"
            );
            std::future::ready(())
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dispatcher::DispatchOptions;
    use crate::executor::{Connection, RetryingExecutor};
    use crate::request::Response;
    use crate::transport::ScriptedTransport;
    use reqshape_core::{ConnectionPool, SlidingWindowLimiter, TtlCache};

    fn monitor(budget: usize) -> PressureMonitor {
        let cache = Arc::new(TtlCache::new(100, Duration::from_secs(60)));
        let pool = Arc::new(ConnectionPool::new(4, Duration::from_secs(30), Connection::open));
        let executor = Arc::new(RetryingExecutor::new(
            Arc::new(ScriptedTransport::new()),
            cache,
            pool,
        ));
        let limiter = Arc::new(SlidingWindowLimiter::new(10, Duration::from_secs(1)));
        let dispatcher = Arc::new(BatchDispatcher::new(
            executor,
            limiter,
            DispatchOptions::default(),
        ));
        PressureMonitor::new(dispatcher, budget)
    }

    fn fill(monitor: &PressureMonitor, count: usize) {
        let cache = monitor.dispatcher.executor().cache();
        for i in 0..count {
            cache.set_default(&format!("GET:/item/{i}"), Response::new(200, vec![0u8; 512]));
        }
    }

    #[test]
    fn test_under_budget_is_noop() {
        let monitor = monitor(usize::MAX);
        fill(&monitor, 10);
        assert_eq!(monitor.check(), 0);
        assert_eq!(monitor.snapshot().cache_size, 10);
    }

    #[test]
    fn test_over_budget_evicts_oldest_fifth() {
        let monitor = monitor(1024);
        fill(&monitor, 10);

        assert_eq!(monitor.check(), 2);
        let stats = monitor.snapshot();
        assert_eq!(stats.cache_size, 8);
        assert_eq!(stats.evictions, 2);
        assert!(!monitor.dispatcher.executor().cache().contains("GET:/item/0"));
    }

    #[test]
    fn test_snapshot_serializes() {
        let monitor = monitor(4096);
        let json = serde_json::to_value(monitor.snapshot()).unwrap();
        assert_eq!(json["memory_budget"], 4096);
        assert_eq!(json["total_requests"], 0);
    }
}
