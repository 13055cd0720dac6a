use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, trace};

use crate::clock::{self, Clock, SharedClock};

/// One pooled handle and its usage bookkeeping.
#[derive(Debug)]
pub struct PoolEntry<H> {
    pub handle: H,
    pub last_used_at: Instant,
    pub in_use: bool,
    id: u64,
}

impl<H> PoolEntry<H> {
    fn idle_for(&self, now: Instant) -> Duration {
        now.saturating_duration_since(self.last_used_at)
    }
}

/// A handle checked out of a [`ConnectionPool`].
///
/// Hand it back with [`ConnectionPool::release`]; the pool keeps the
/// underlying handle for reuse.
#[derive(Clone, Debug)]
pub struct PoolLease<H> {
    key: String,
    id: u64,
    handle: H,
}

impl<H> PoolLease<H> {
    pub fn key(&self) -> &str {
        &self.key
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn handle(&self) -> &H {
        &self.handle
    }
}

type Factory<H> = Box<dyn Fn(&str) -> H + Send + Sync>;

struct PoolState<H> {
    entries: HashMap<String, Vec<PoolEntry<H>>>,
    total: usize,
    next_id: u64,
}

impl<H> PoolState<H> {
    fn evict_idle(&mut self, timeout: Duration, now: Instant) -> usize {
        let mut removed = 0;
        for group in self.entries.values_mut() {
            let before = group.len();
            group.retain(|entry| entry.in_use || entry.idle_for(now) <= timeout);
            removed += before - group.len();
        }
        self.entries.retain(|_, group| !group.is_empty());
        self.total -= removed;
        removed
    }
}

/// A bounded set of reusable handles grouped by resource key.
///
/// At most `max_connections` handles exist across all keys, and a handle
/// marked in use is never leased to a second caller. When the pool is full,
/// handles idle for longer than `connection_timeout` are discarded to make
/// room.
///
/// # Examples
///
/// ```
/// use reqshape_core::ConnectionPool;
/// use std::time::Duration;
///
/// let pool = ConnectionPool::new(2, Duration::from_secs(30), |key| format!("conn to {key}"));
///
/// let first = pool.acquire("db").unwrap();
/// assert_eq!(first.handle(), "conn to db");
/// assert_eq!(pool.active_count(), 1);
///
/// pool.release(&first);
/// let again = pool.acquire("db").unwrap();
/// assert_eq!(again.id(), first.id());
/// ```
pub struct ConnectionPool<H> {
    max_connections: usize,
    connection_timeout: Duration,
    factory: Factory<H>,
    state: Mutex<PoolState<H>>,
    clock: SharedClock,
}

impl<H: Clone> ConnectionPool<H> {
    pub fn new<F>(max_connections: usize, connection_timeout: Duration, factory: F) -> Self
    where
        F: Fn(&str) -> H + Send + Sync + 'static,
    {
        Self {
            max_connections,
            connection_timeout,
            factory: Box::new(factory),
            state: Mutex::new(PoolState {
                entries: HashMap::new(),
                total: 0,
                next_id: 0,
            }),
            clock: clock::system(),
        }
    }

    pub fn with_clock(mut self, clock: impl Clock + 'static) -> Self {
        self.clock = Arc::new(clock);
        self
    }

    pub fn max_connections(&self) -> usize {
        self.max_connections
    }

    /// Leases a handle for `key`.
    ///
    /// Reuses an idle handle for the same key, otherwise creates one if under
    /// the cap, otherwise evicts stale idle handles and tries creation once
    /// more. Returns `None` when the pool is saturated.
    pub fn acquire(&self, key: &str) -> Option<PoolLease<H>> {
        let now = self.clock.now();
        let mut state = self.state.lock();

        if let Some(entry) = state
            .entries
            .get_mut(key)
            .and_then(|group| group.iter_mut().find(|entry| !entry.in_use))
        {
            entry.in_use = true;
            entry.last_used_at = now;
            trace!(key, id = entry.id, "reusing pooled connection");
            return Some(PoolLease {
                key: key.to_string(),
                id: entry.id,
                handle: entry.handle.clone(),
            });
        }

        if state.total >= self.max_connections {
            let evicted = state.evict_idle(self.connection_timeout, now);
            if evicted > 0 {
                debug!(evicted, "evicted idle pooled connections");
            }
            if state.total >= self.max_connections {
                debug!(key, max = self.max_connections, "connection pool saturated");
                return None;
            }
        }

        let id = state.next_id;
        state.next_id += 1;
        let handle = (self.factory)(key);
        state.total += 1;
        state.entries.entry(key.to_string()).or_default().push(PoolEntry {
            handle: handle.clone(),
            last_used_at: now,
            in_use: true,
            id,
        });
        trace!(key, id, "opened pooled connection");

        Some(PoolLease {
            key: key.to_string(),
            id,
            handle,
        })
    }

    /// Marks the leased handle idle again. The handle itself is kept.
    pub fn release(&self, lease: &PoolLease<H>) {
        let mut state = self.state.lock();
        if let Some(entry) = state
            .entries
            .get_mut(&lease.key)
            .and_then(|group| group.iter_mut().find(|entry| entry.id == lease.id))
        {
            entry.in_use = false;
            entry.last_used_at = self.clock.now();
        }
    }

    /// Drops idle handles unused for longer than the connection timeout.
    pub fn evict_idle(&self) -> usize {
        let now = self.clock.now();
        self.state.lock().evict_idle(self.connection_timeout, now)
    }

    pub fn len(&self) -> usize {
        self.state.lock().total
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn active_count(&self) -> usize {
        self.count_where(|entry| entry.in_use)
    }

    pub fn idle_count(&self) -> usize {
        self.count_where(|entry| !entry.in_use)
    }

    fn count_where(&self, predicate: impl Fn(&PoolEntry<H>) -> bool) -> usize {
        self.state
            .lock()
            .entries
            .values()
            .flatten()
            .filter(|entry| predicate(entry))
            .count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ManualClock;
    use std::collections::HashSet;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use std::thread;

    fn counting_pool(max: usize, timeout: Duration) -> (ConnectionPool<usize>, Arc<AtomicUsize>) {
        let created = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&created);
        let pool = ConnectionPool::new(max, timeout, move |_| {
            counter.fetch_add(1, Ordering::SeqCst)
        });
        (pool, created)
    }

    #[test]
    fn test_reuses_idle_handle() {
        let (pool, created) = counting_pool(4, Duration::from_secs(30));
        let lease = pool.acquire("a").unwrap();
        pool.release(&lease);
        let again = pool.acquire("a").unwrap();

        assert_eq!(lease.handle(), again.handle());
        assert_eq!(created.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_in_use_handle_not_shared() {
        let (pool, _) = counting_pool(4, Duration::from_secs(30));
        let first = pool.acquire("a").unwrap();
        let second = pool.acquire("a").unwrap();

        assert_ne!(first.id(), second.id());
        assert_eq!(pool.active_count(), 2);
    }

    #[test]
    fn test_saturated_pool_returns_none() {
        let (pool, _) = counting_pool(2, Duration::from_secs(30));
        let _a = pool.acquire("a").unwrap();
        let _b = pool.acquire("b").unwrap();
        assert!(pool.acquire("c").is_none());
        assert_eq!(pool.len(), 2);
    }

    #[test]
    fn test_full_pool_reclaims_stale_idle_handles() {
        let (pool, _) = counting_pool(2, Duration::from_millis(20));
        let a = pool.acquire("a").unwrap();
        let b = pool.acquire("b").unwrap();
        pool.release(&a);
        pool.release(&b);

        // Idle but not yet stale: other keys cannot get a slot
        assert!(pool.acquire("c").is_none());

        thread::sleep(Duration::from_millis(40));
        let c = pool.acquire("c").unwrap();
        assert_eq!(c.key(), "c");
        assert!(pool.len() <= 2);
    }

    #[test]
    fn test_idle_timeout_follows_injected_clock() {
        let clock = ManualClock::new();
        let pool = ConnectionPool::new(2, Duration::from_secs(30), |key: &str| key.to_string())
            .with_clock(clock.clone());
        let lease = pool.acquire("a").unwrap();
        pool.release(&lease);

        clock.advance(Duration::from_secs(30));
        assert_eq!(pool.evict_idle(), 0);
        clock.advance(Duration::from_secs(1));
        assert_eq!(pool.evict_idle(), 1);
        assert!(pool.is_empty());
    }

    #[test]
    fn test_release_keeps_handle() {
        let (pool, _) = counting_pool(2, Duration::from_secs(30));
        let a = pool.acquire("a").unwrap();
        pool.release(&a);
        assert_eq!(pool.len(), 1);
        assert_eq!(pool.idle_count(), 1);
        assert_eq!(pool.active_count(), 0);
    }

    #[test]
    fn test_evict_idle_skips_in_use() {
        let (pool, _) = counting_pool(3, Duration::from_millis(10));
        let busy = pool.acquire("a").unwrap();
        let idle = pool.acquire("a").unwrap();
        pool.release(&idle);

        thread::sleep(Duration::from_millis(30));
        assert_eq!(pool.evict_idle(), 1);
        assert_eq!(pool.active_count(), 1);
        pool.release(&busy);
    }

    #[test]
    fn test_concurrent_leases_are_exclusive() {
        let pool = Arc::new(counting_pool(8, Duration::from_secs(30)).0);
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let pool = Arc::clone(&pool);
                thread::spawn(move || pool.acquire("shared").map(|lease| lease.id()))
            })
            .collect();

        let ids: Vec<u64> = handles
            .into_iter()
            .filter_map(|h| h.join().unwrap())
            .collect();
        let unique: HashSet<_> = ids.iter().collect();
        assert_eq!(ids.len(), 8);
        assert_eq!(unique.len(), 8);
        assert!(pool.acquire("shared").is_none());
    }
}
