use futures::future::join_all;
use reqshape_core::{ConnectionPool, PoolLease, TtlCache};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, SystemTime};
use tokio::time::Instant;
use tracing::{debug, trace, warn};

use crate::config::ShaperConfig;
use crate::error::{RequestError, Result};
use crate::keys::{covers_key, target_prefix};
use crate::request::{Method, Request, Response};
use crate::transport::{Transport, TransportRequest};

const READ_METHODS: [Method; 3] = [Method::Get, Method::Head, Method::Options];

/// Handle kept by the connection pool for one backend resource.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Connection {
    pub resource: String,
    pub opened_at: SystemTime,
}

impl Connection {
    pub fn open(resource: &str) -> Self {
        Self {
            resource: resource.to_string(),
            opened_at: SystemTime::now(),
        }
    }
}

/// Per-call attempt budget.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ExecuteOptions {
    /// Limit for a single attempt
    pub timeout: Duration,
    /// Total attempts, including the first
    pub retries: u32,
}

impl Default for ExecuteOptions {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(10),
            retries: 3,
        }
    }
}

impl ExecuteOptions {
    pub fn from_config(config: &ShaperConfig) -> Self {
        Self {
            timeout: config.timeout(),
            retries: config.retries,
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_retries(mut self, retries: u32) -> Self {
        self.retries = retries;
        self
    }
}

/// TTL for a freshly fetched read, sized by how expensive it was to fetch.
///
/// ```
/// use reqshape_async::executor::adaptive_ttl;
/// use std::time::Duration;
///
/// assert_eq!(adaptive_ttl(Duration::from_millis(2500)), Duration::from_secs(300));
/// assert_eq!(adaptive_ttl(Duration::from_millis(800)), Duration::from_secs(60));
/// assert_eq!(adaptive_ttl(Duration::from_millis(40)), Duration::from_secs(30));
/// ```
pub fn adaptive_ttl(elapsed: Duration) -> Duration {
    if elapsed > Duration::from_millis(2000) {
        Duration::from_secs(5 * 60)
    } else if elapsed > Duration::from_millis(500) {
        Duration::from_secs(60)
    } else {
        Duration::from_secs(30)
    }
}

/// Returns the lease to the pool when the attempt ends, including when the
/// attempt future is dropped by a timeout.
struct LeaseGuard<'a> {
    pool: &'a ConnectionPool<Connection>,
    lease: PoolLease<Connection>,
}

impl Drop for LeaseGuard<'_> {
    fn drop(&mut self) {
        self.pool.release(&self.lease);
    }
}

/// Performs one logical operation against the transport with per-attempt
/// timeouts and exponential backoff, then feeds the cache.
pub struct RetryingExecutor {
    transport: Arc<dyn Transport>,
    cache: Arc<TtlCache<Response>>,
    pool: Arc<ConnectionPool<Connection>>,
    backoff_base: Duration,
    adaptive_ttl: bool,
    total_requests: AtomicU64,
    failed_requests: AtomicU64,
    retries: AtomicU64,
}

impl RetryingExecutor {
    pub fn new(
        transport: Arc<dyn Transport>,
        cache: Arc<TtlCache<Response>>,
        pool: Arc<ConnectionPool<Connection>>,
    ) -> Self {
        Self {
            transport,
            cache,
            pool,
            backoff_base: Duration::from_secs(1),
            adaptive_ttl: true,
            total_requests: AtomicU64::new(0),
            failed_requests: AtomicU64::new(0),
            retries: AtomicU64::new(0),
        }
    }

    pub fn with_backoff_base(mut self, base: Duration) -> Self {
        self.backoff_base = base;
        self
    }

    /// With adaptive TTL off, fresh reads are cached for the cache's default TTL.
    pub fn with_adaptive_ttl(mut self, enabled: bool) -> Self {
        self.adaptive_ttl = enabled;
        self
    }

    /// Key the request is rate limited and pooled under, as resolved by the
    /// transport.
    pub fn resource_key(&self, request: &Request) -> String {
        self.transport.resource_key(&request.target)
    }

    /// Delay slept after failed attempt number `attempt` (0-based).
    pub fn backoff_delay(&self, attempt: u32) -> Duration {
        self.backoff_base.saturating_mul(2u32.saturating_pow(attempt))
    }

    /// Runs `request` with up to `options.retries` attempts.
    ///
    /// Timeouts, transport failures and pool exhaustion are retried after
    /// `backoff_base * 2^attempt`. When the last attempt fails the result is
    /// [`RequestError::ExhaustedRetries`] wrapping that attempt's error.
    pub async fn execute(&self, request: &Request, options: ExecuteOptions) -> Result<Response> {
        self.total_requests.fetch_add(1, Ordering::Relaxed);

        let attempts = options.retries.max(1);
        let resource = self.resource_key(request);
        let outbound = TransportRequest::from(request);
        let mut last_error = None;

        for attempt in 0..attempts {
            if attempt > 0 {
                self.retries.fetch_add(1, Ordering::Relaxed);
            }

            let started = Instant::now();
            match self.attempt(&resource, &outbound, options.timeout).await {
                Ok(response) => {
                    let elapsed = started.elapsed();
                    trace!(
                        id = %request.id,
                        endpoint = %request.target,
                        attempt,
                        ?elapsed,
                        status = response.status_code,
                        "request succeeded"
                    );
                    self.store(request, &response, elapsed);
                    return Ok(response);
                }
                Err(err) if err.is_retryable() => {
                    debug!(
                        id = %request.id,
                        endpoint = %request.target,
                        attempt,
                        error = %err,
                        "attempt failed"
                    );
                    last_error = Some(err);
                    if attempt + 1 < attempts {
                        tokio::time::sleep(self.backoff_delay(attempt)).await;
                    }
                }
                Err(err) => {
                    self.failed_requests.fetch_add(1, Ordering::Relaxed);
                    return Err(err);
                }
            }
        }

        self.failed_requests.fetch_add(1, Ordering::Relaxed);
        let last = last_error.unwrap_or(RequestError::Timeout {
            timeout: options.timeout,
        });
        warn!(
            id = %request.id,
            endpoint = %request.target,
            attempts,
            error = %last,
            "request failed after all attempts"
        );
        Err(RequestError::ExhaustedRetries {
            attempts,
            last: Box::new(last),
        })
    }

    /// Runs a drained batch.
    ///
    /// The transport's readiness is checked once; if it fails, the whole
    /// batch fails with that error and no member is sent. Otherwise every
    /// member runs concurrently and results come back in input order.
    pub async fn execute_batch(
        &self,
        requests: &[Request],
        options: ExecuteOptions,
    ) -> Result<Vec<Result<Response>>> {
        if let Err(err) = self.transport.ready().await {
            let err = RequestError::from(err);
            warn!(size = requests.len(), error = %err, "batch rejected before execution");
            return Err(err);
        }

        debug!(size = requests.len(), "executing batch");
        Ok(join_all(requests.iter().map(|request| self.execute(request, options))).await)
    }

    async fn attempt(
        &self,
        resource: &str,
        outbound: &TransportRequest,
        timeout: Duration,
    ) -> Result<Response> {
        let lease = self
            .pool
            .acquire(resource)
            .ok_or_else(|| RequestError::PoolExhausted {
                key: resource.to_string(),
            })?;
        let _guard = LeaseGuard {
            pool: &self.pool,
            lease,
        };

        match tokio::time::timeout(timeout, self.transport.send(outbound)).await {
            Ok(Ok(response)) => Ok(response.into()),
            Ok(Err(err)) => Err(err.into()),
            Err(_) => Err(RequestError::Timeout { timeout }),
        }
    }

    fn store(&self, request: &Request, response: &Response, elapsed: Duration) {
        if !response.is_success() {
            return;
        }

        if request.method.is_read() {
            let ttl = if self.adaptive_ttl {
                adaptive_ttl(elapsed)
            } else {
                self.cache.default_ttl()
            };
            self.cache.set(&request.cache_key(), response.clone(), ttl);
        } else {
            let invalidated: usize = READ_METHODS
                .iter()
                .map(|method| {
                    let prefix = target_prefix(*method, &request.target);
                    self.cache.invalidate_matching(|key| covers_key(&prefix, key))
                })
                .sum();
            if invalidated > 0 {
                debug!(endpoint = %request.target, invalidated, "write invalidated cached reads");
            }
        }
    }

    pub fn cache(&self) -> &Arc<TtlCache<Response>> {
        &self.cache
    }

    pub fn pool(&self) -> &Arc<ConnectionPool<Connection>> {
        &self.pool
    }

    /// Calls to [`execute`](Self::execute), batched or not.
    pub fn total_requests(&self) -> u64 {
        self.total_requests.load(Ordering::Relaxed)
    }

    /// Calls that ended in an error.
    pub fn failed_requests(&self) -> u64 {
        self.failed_requests.load(Ordering::Relaxed)
    }

    /// Extra attempts beyond the first.
    pub fn retries(&self) -> u64 {
        self.retries.load(Ordering::Relaxed)
    }
}
