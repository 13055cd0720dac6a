use std::time::{Duration, Instant};

use crate::MemoryEstimator;

/// A cached value together with the bookkeeping needed for TTL expiry and
/// LRU eviction.
///
/// An entry is *logically* absent once its age reaches `ttl`, even while it is
/// still physically stored. [`TtlCache::get`](crate::TtlCache::get) removes
/// such entries lazily and the periodic sweep removes the rest.
///
/// # Examples
///
/// ```
/// use reqshape_core::CacheEntry;
/// use std::time::Duration;
///
/// let entry = CacheEntry::new(42, Duration::from_secs(60));
/// assert_eq!(entry.value, 42);
/// assert_eq!(entry.access_count, 0);
/// assert!(!entry.is_expired());
/// ```
#[derive(Clone, Debug)]
pub struct CacheEntry<V> {
    pub value: V,
    pub created_at: Instant,
    pub ttl: Duration,
    pub access_count: u64,
    pub last_accessed_at: Instant,
    /// Logical access clock assigned by the owning cache; orders entries the
    /// same way `last_accessed_at` does without depending on clock resolution.
    pub(crate) recency: u64,
}

impl<V> CacheEntry<V> {
    /// Creates an entry stamped with the current instant.
    pub fn new(value: V, ttl: Duration) -> Self {
        Self::new_at(value, ttl, Instant::now())
    }

    /// Creates an entry stamped with `now`.
    pub fn new_at(value: V, ttl: Duration, now: Instant) -> Self {
        Self {
            value,
            created_at: now,
            ttl,
            access_count: 0,
            last_accessed_at: now,
            recency: 0,
        }
    }

    /// Returns true once the entry age has reached its TTL.
    ///
    /// # Examples
    ///
    /// ```
    /// use reqshape_core::CacheEntry;
    /// use std::thread;
    /// use std::time::Duration;
    ///
    /// let entry = CacheEntry::new("data", Duration::from_millis(20));
    /// assert!(!entry.is_expired());
    ///
    /// thread::sleep(Duration::from_millis(30));
    /// assert!(entry.is_expired());
    /// ```
    pub fn is_expired(&self) -> bool {
        self.is_expired_at(Instant::now())
    }

    /// Same as [`is_expired`](Self::is_expired) against an explicit instant.
    pub fn is_expired_at(&self, now: Instant) -> bool {
        now.saturating_duration_since(self.created_at) >= self.ttl
    }

    /// Time left before the entry expires, zero if it already has.
    pub fn remaining_ttl(&self) -> Duration {
        self.remaining_ttl_at(Instant::now())
    }

    pub fn remaining_ttl_at(&self, now: Instant) -> Duration {
        self.ttl
            .saturating_sub(now.saturating_duration_since(self.created_at))
    }

    /// Records a read: bumps the access counter and refreshes recency.
    pub fn touch(&mut self) {
        self.touch_at(Instant::now());
    }

    pub fn touch_at(&mut self, now: Instant) {
        self.access_count = self.access_count.saturating_add(1);
        self.last_accessed_at = now;
    }
}

impl<V: MemoryEstimator> MemoryEstimator for CacheEntry<V> {
    fn estimate_memory(&self) -> usize {
        let base = std::mem::size_of::<Self>();
        // size_of::<Self>() already covers the inline part of the value
        base + self
            .value
            .estimate_memory()
            .saturating_sub(std::mem::size_of_val(&self.value))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;

    #[test]
    fn test_new_entry_not_expired() {
        let entry = CacheEntry::new(42, Duration::from_secs(10));
        assert_eq!(entry.value, 42);
        assert_eq!(entry.created_at, entry.last_accessed_at);
        assert!(!entry.is_expired());
    }

    #[test]
    fn test_entry_expiration() {
        let entry = CacheEntry::new("data", Duration::from_millis(50));
        thread::sleep(Duration::from_millis(80));
        assert!(entry.is_expired());
        assert_eq!(entry.remaining_ttl(), Duration::ZERO);
    }

    #[test]
    fn test_expiry_boundary_is_inclusive() {
        let entry = CacheEntry::new(1u8, Duration::from_millis(100));
        let at_ttl = entry.created_at + Duration::from_millis(100);
        assert!(entry.is_expired_at(at_ttl));
        assert!(!entry.is_expired_at(at_ttl - Duration::from_millis(1)));
    }

    #[test]
    fn test_explicit_instants() {
        let created = Instant::now();
        let mut entry = CacheEntry::new_at("v", Duration::from_secs(10), created);
        let later = created + Duration::from_secs(4);

        assert_eq!(entry.remaining_ttl_at(later), Duration::from_secs(6));
        entry.touch_at(later);
        assert_eq!(entry.last_accessed_at, later);
        assert!(entry.is_expired_at(created + Duration::from_secs(10)));
    }

    #[test]
    fn test_touch_updates_recency() {
        let mut entry = CacheEntry::new(7u32, Duration::from_secs(10));
        let before = entry.last_accessed_at;
        thread::sleep(Duration::from_millis(5));
        entry.touch();
        entry.touch();
        assert_eq!(entry.access_count, 2);
        assert!(entry.last_accessed_at > before);
    }

    #[test]
    fn test_memory_estimation_string() {
        let s = String::from("Hello, World!");
        let entry = CacheEntry::new(s.clone(), Duration::from_secs(1));
        let expected_min = std::mem::size_of::<CacheEntry<String>>() + s.capacity();
        assert!(entry.estimate_memory() >= expected_min);
    }
}
