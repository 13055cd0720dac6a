use crate::clock::{self, SharedClock};
use crate::utils::{expired_keys, find_lru_key, oldest_keys};
use crate::{CacheEntry, CacheStats, CacheStatsSnapshot, Clock, MemoryEstimator};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, trace};

/// Fixed bookkeeping cost charged to every entry on top of its key and value.
pub const ENTRY_OVERHEAD_BYTES: usize = 96;

/// Share of entries removed by one memory-pressure pass.
pub const MEMORY_EVICTION_FRACTION: f64 = 0.2;

/// Default memory budget: 50MB.
pub const DEFAULT_MEMORY_BUDGET: usize = 50 * 1024 * 1024;

struct CacheState<V> {
    map: HashMap<String, CacheEntry<V>>,
    memory_bytes: usize,
    clock: u64,
}

impl<V: MemoryEstimator> CacheState<V> {
    fn next_tick(&mut self) -> u64 {
        self.clock += 1;
        self.clock
    }

    fn remove(&mut self, key: &str) -> Option<CacheEntry<V>> {
        let entry = self.map.remove(key)?;
        self.memory_bytes = self
            .memory_bytes
            .saturating_sub(footprint(key, &entry.value));
        Some(entry)
    }

    fn remove_all(&mut self, keys: &[String]) -> usize {
        keys.iter().filter(|key| self.remove(key).is_some()).count()
    }
}

enum Lookup<V> {
    Hit(V),
    Expired,
    Missing,
}

fn footprint<V: MemoryEstimator>(key: &str, value: &V) -> usize {
    ENTRY_OVERHEAD_BYTES + key.len() + value.estimate_memory()
}

/// A key/value cache with per-entry TTL, LRU eviction on size overflow and
/// oldest-first eviction under memory pressure.
///
/// The cache is an owned object: build one, wrap it in an `Arc` and hand it to
/// whoever needs it. All methods take `&self` and hold the internal lock only
/// for the duration of the call, so the cache can be shared between tasks.
///
/// # Eviction rules
///
/// - **Size**: inserting a new key while `len() >= max_size` first evicts the
///   entry with the smallest `last_accessed_at`.
/// - **Memory**: if the estimated footprint after the insert would exceed the
///   memory budget, the oldest 20% of entries by `created_at` go first.
/// - **TTL**: expired entries are dropped lazily by [`get`](Self::get) and in
///   bulk by [`sweep_expired`](Self::sweep_expired).
///
/// Misses and evictions are never errors.
///
/// # Examples
///
/// ```
/// use reqshape_core::TtlCache;
/// use std::time::Duration;
///
/// let cache = TtlCache::new(2, Duration::from_secs(30));
/// cache.set("a", 1u32, Duration::from_secs(60));
/// cache.set("b", 2u32, Duration::from_secs(60));
///
/// // Touch "a" so "b" becomes least recently used
/// assert_eq!(cache.get("a"), Some(1));
///
/// cache.set("c", 3u32, Duration::from_secs(60));
/// assert_eq!(cache.get("b"), None);
/// assert_eq!(cache.len(), 2);
/// ```
pub struct TtlCache<V> {
    state: Mutex<CacheState<V>>,
    max_size: usize,
    default_ttl: Duration,
    memory_budget: usize,
    stats: CacheStats,
    clock: SharedClock,
}

impl<V: Clone + MemoryEstimator> TtlCache<V> {
    /// Creates an empty cache with the default memory budget.
    ///
    /// A `max_size` of zero is treated as one.
    pub fn new(max_size: usize, default_ttl: Duration) -> Self {
        Self {
            state: Mutex::new(CacheState {
                map: HashMap::new(),
                memory_bytes: 0,
                clock: 0,
            }),
            max_size: max_size.max(1),
            default_ttl,
            memory_budget: DEFAULT_MEMORY_BUDGET,
            stats: CacheStats::new(),
            clock: clock::system(),
        }
    }

    /// Replaces the memory budget, in bytes.
    pub fn with_memory_budget(mut self, bytes: usize) -> Self {
        self.memory_budget = bytes;
        self
    }

    /// Reads time from `clock` instead of the system clock.
    pub fn with_clock(mut self, clock: impl Clock + 'static) -> Self {
        self.clock = Arc::new(clock);
        self
    }

    pub fn max_size(&self) -> usize {
        self.max_size
    }

    pub fn default_ttl(&self) -> Duration {
        self.default_ttl
    }

    pub fn memory_budget(&self) -> usize {
        self.memory_budget
    }

    /// Inserts or overwrites `key`.
    ///
    /// Overwriting an existing key never evicts another entry. A value whose
    /// footprint alone exceeds the memory budget is not cached.
    pub fn set(&self, key: &str, value: V, ttl: Duration) {
        let size = footprint(key, &value);
        if size > self.memory_budget {
            debug!(key, size, budget = self.memory_budget, "value exceeds cache memory budget, not cached");
            return;
        }

        let mut state = self.state.lock();
        let replaced = state.remove(key).is_some();

        let mut evicted = 0u64;
        if state.memory_bytes + size > self.memory_budget {
            let victims = oldest_keys(&state.map, MEMORY_EVICTION_FRACTION);
            evicted += state.remove_all(&victims) as u64;
            debug!(
                evicted = victims.len(),
                memory = state.memory_bytes,
                "memory budget exceeded, evicted oldest entries"
            );
        }

        if !replaced && state.map.len() >= self.max_size {
            if let Some(victim) = find_lru_key(&state.map) {
                state.remove(&victim);
                evicted += 1;
                trace!(key = %victim, "evicted least recently used entry");
            }
        }

        let mut entry = CacheEntry::new_at(value, ttl, self.clock.now());
        entry.recency = state.next_tick();
        state.memory_bytes += size;
        state.map.insert(key.to_string(), entry);
        drop(state);

        if evicted > 0 {
            self.stats.record_evictions(evicted);
        }
    }

    /// Inserts with the cache's default TTL.
    pub fn set_default(&self, key: &str, value: V) {
        self.set(key, value, self.default_ttl);
    }

    /// Looks up `key`, counting exactly one hit or one miss.
    ///
    /// An expired entry is removed and reported as a miss.
    pub fn get(&self, key: &str) -> Option<V> {
        let now = self.clock.now();
        let mut state = self.state.lock();
        let tick = state.next_tick();

        let lookup = match state.map.get_mut(key) {
            None => Lookup::Missing,
            Some(entry) if entry.is_expired_at(now) => Lookup::Expired,
            Some(entry) => {
                entry.touch_at(now);
                entry.recency = tick;
                Lookup::Hit(entry.value.clone())
            }
        };

        match lookup {
            Lookup::Hit(value) => {
                drop(state);
                self.stats.record_hit();
                Some(value)
            }
            Lookup::Expired => {
                state.remove(key);
                drop(state);
                self.stats.record_evictions(1);
                self.stats.record_miss();
                trace!(key, "lazily expired cache entry");
                None
            }
            Lookup::Missing => {
                drop(state);
                self.stats.record_miss();
                None
            }
        }
    }

    /// Returns the value without touching recency or statistics.
    pub fn peek(&self, key: &str) -> Option<V> {
        let now = self.clock.now();
        let state = self.state.lock();
        state
            .map
            .get(key)
            .filter(|entry| !entry.is_expired_at(now))
            .map(|entry| entry.value.clone())
    }

    /// Remaining lifetime of a live entry.
    pub fn ttl_remaining(&self, key: &str) -> Option<Duration> {
        let now = self.clock.now();
        let state = self.state.lock();
        state
            .map
            .get(key)
            .filter(|entry| !entry.is_expired_at(now))
            .map(|entry| entry.remaining_ttl_at(now))
    }

    /// Sequential [`get`](Self::get) over `keys`; no cross-key atomicity.
    pub fn mget(&self, keys: &[&str]) -> Vec<Option<V>> {
        keys.iter().map(|key| self.get(key)).collect()
    }

    /// Sequential [`set`](Self::set) over `items`; no cross-key atomicity.
    pub fn mset<I, K>(&self, items: I)
    where
        I: IntoIterator<Item = (K, V, Duration)>,
        K: AsRef<str>,
    {
        for (key, value, ttl) in items {
            self.set(key.as_ref(), value, ttl);
        }
    }

    pub fn contains(&self, key: &str) -> bool {
        self.peek(key).is_some()
    }

    /// Removes `key`, returning whether it was present.
    pub fn delete(&self, key: &str) -> bool {
        self.state.lock().remove(key).is_some()
    }

    /// Removes every key starting with `prefix`.
    pub fn invalidate_prefix(&self, prefix: &str) -> usize {
        self.invalidate_matching(|key| key.starts_with(prefix))
    }

    /// Removes every key for which `predicate` returns true.
    pub fn invalidate_matching(&self, predicate: impl Fn(&str) -> bool) -> usize {
        let mut state = self.state.lock();
        let keys: Vec<String> = state
            .map
            .keys()
            .filter(|key| predicate(key))
            .cloned()
            .collect();
        state.remove_all(&keys)
    }

    pub fn clear(&self) {
        let mut state = self.state.lock();
        state.map.clear();
        state.memory_bytes = 0;
    }

    /// Physically stored entries, expired ones included until swept.
    pub fn len(&self) -> usize {
        self.state.lock().map.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Removes every expired entry regardless of access pattern.
    pub fn sweep_expired(&self) -> usize {
        let mut state = self.state.lock();
        let keys = expired_keys(&state.map, self.clock.now());
        let removed = state.remove_all(&keys);
        drop(state);

        if removed > 0 {
            self.stats.record_evictions(removed as u64);
            debug!(removed, "swept expired cache entries");
        }
        removed
    }

    /// Evicts the oldest 20% of entries by creation time.
    ///
    /// The pressure monitor calls this when the memory estimate is over
    /// budget; it is also usable directly.
    pub fn evict_for_memory_pressure(&self) -> usize {
        let mut state = self.state.lock();
        let victims = oldest_keys(&state.map, MEMORY_EVICTION_FRACTION);
        let removed = state.remove_all(&victims);
        drop(state);

        if removed > 0 {
            self.stats.record_evictions(removed as u64);
        }
        removed
    }

    /// Current estimated footprint in bytes.
    pub fn memory_estimate(&self) -> usize {
        self.state.lock().memory_bytes
    }

    pub fn is_over_budget(&self) -> bool {
        self.memory_estimate() > self.memory_budget
    }

    pub fn stats(&self) -> CacheStatsSnapshot {
        let (size, memory) = {
            let state = self.state.lock();
            (state.map.len(), state.memory_bytes)
        };
        self.stats.snapshot(size, memory)
    }

    /// Live counters, for callers that want to reset them.
    pub fn counters(&self) -> &CacheStats {
        &self.stats
    }
}
