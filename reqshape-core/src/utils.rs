use crate::CacheEntry;
use std::collections::HashMap;

/// Finds the least recently used key.
///
/// Entries are compared by their recency clock, which advances in the same
/// order as `last_accessed_at`, so the returned key always carries the
/// minimum `last_accessed_at` among the current entries.
///
/// # Returns
///
/// * `Some(String)` - The key to evict
/// * `None` - If the map is empty
///
/// # Performance
///
/// O(n) scan over the bounded entry set.
pub fn find_lru_key<V>(map: &HashMap<String, CacheEntry<V>>) -> Option<String> {
    map.iter()
        .min_by_key(|(_, entry)| entry.recency)
        .map(|(key, _)| key.clone())
}

/// Returns the `fraction` of keys with the oldest `created_at`, oldest first.
///
/// At least one key is returned whenever the map is non-empty, so a memory
/// pressure pass always makes progress.
///
/// # Examples
///
/// ```
/// use reqshape_core::{utils::oldest_keys, CacheEntry};
/// use std::collections::HashMap;
/// use std::time::{Duration, Instant};
///
/// let now = Instant::now();
/// let mut map = HashMap::new();
/// for (i, key) in ["a", "b", "c", "d", "e"].iter().enumerate() {
///     let mut entry = CacheEntry::new(i, Duration::from_secs(60));
///     entry.created_at = now + Duration::from_millis(i as u64);
///     map.insert(key.to_string(), entry);
/// }
///
/// assert_eq!(oldest_keys(&map, 0.2), vec!["a".to_string()]);
/// assert_eq!(oldest_keys(&map, 0.4), vec!["a".to_string(), "b".to_string()]);
/// ```
pub fn oldest_keys<V>(map: &HashMap<String, CacheEntry<V>>, fraction: f64) -> Vec<String> {
    if map.is_empty() {
        return Vec::new();
    }

    let count = ((map.len() as f64 * fraction).floor() as usize).clamp(1, map.len());

    let mut by_age: Vec<(&String, &CacheEntry<V>)> = map.iter().collect();
    by_age.sort_by_key(|(_, entry)| (entry.created_at, entry.recency));
    by_age
        .into_iter()
        .take(count)
        .map(|(key, _)| key.clone())
        .collect()
}

/// Collects every key whose entry has expired at `now`.
pub fn expired_keys<V>(
    map: &HashMap<String, CacheEntry<V>>,
    now: std::time::Instant,
) -> Vec<String> {
    map.iter()
        .filter(|(_, entry)| entry.is_expired_at(now))
        .map(|(key, _)| key.clone())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::{Duration, Instant};

    fn entry_with(recency: u64, created_offset_ms: u64, base: Instant) -> CacheEntry<u32> {
        let mut entry = CacheEntry::new(0, Duration::from_millis(100));
        entry.recency = recency;
        entry.created_at = base + Duration::from_millis(created_offset_ms);
        entry
    }

    #[test]
    fn test_find_lru_key_empty() {
        let map: HashMap<String, CacheEntry<u32>> = HashMap::new();
        assert_eq!(find_lru_key(&map), None);
    }

    #[test]
    fn test_find_lru_key_picks_lowest_recency() {
        let base = Instant::now();
        let mut map = HashMap::new();
        map.insert("a".to_string(), entry_with(5, 0, base));
        map.insert("b".to_string(), entry_with(2, 1, base));
        map.insert("c".to_string(), entry_with(9, 2, base));
        assert_eq!(find_lru_key(&map), Some("b".to_string()));
    }

    #[test]
    fn test_oldest_keys_at_least_one() {
        let base = Instant::now();
        let mut map = HashMap::new();
        map.insert("only".to_string(), entry_with(0, 0, base));
        assert_eq!(oldest_keys(&map, 0.2), vec!["only".to_string()]);
    }

    #[test]
    fn test_oldest_keys_twenty_percent_of_ten() {
        let base = Instant::now();
        let mut map = HashMap::new();
        for i in 0..10u64 {
            map.insert(format!("k{i}"), entry_with(i, 100 - i, base));
        }
        // k9 and k8 were created first
        assert_eq!(
            oldest_keys(&map, 0.2),
            vec!["k9".to_string(), "k8".to_string()]
        );
    }

    #[test]
    fn test_expired_keys() {
        let base = Instant::now();
        let mut map = HashMap::new();
        map.insert("old".to_string(), entry_with(0, 0, base));
        map.insert("new".to_string(), entry_with(1, 500, base));
        let expired = expired_keys(&map, base + Duration::from_millis(150));
        assert_eq!(expired, vec!["old".to_string()]);
    }
}
