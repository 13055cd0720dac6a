//! Time source shared by the cache, the limiter and the pool.
//!
//! Every time-dependent decision in this crate reads "now" through a
//! [`Clock`], so a caller running on a virtual clock (for example tokio's
//! paused test clock) can plug that clock in and get consistent TTLs, windows
//! and idle timeouts.

use parking_lot::Mutex;
use std::sync::Arc;
use std::time::{Duration, Instant};

/// A source of monotonic instants.
pub trait Clock: Send + Sync {
    fn now(&self) -> Instant;
}

/// Reads [`Instant::now`].
#[derive(Clone, Copy, Debug, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Instant {
        Instant::now()
    }
}

/// A clock that only moves when told to.
///
/// Cloning shares the underlying time, so one handle can be given to a cache
/// while the test keeps another to advance it.
///
/// # Examples
///
/// ```
/// use reqshape_core::{ManualClock, TtlCache};
/// use std::time::Duration;
///
/// let clock = ManualClock::new();
/// let cache = TtlCache::new(10, Duration::from_secs(60)).with_clock(clock.clone());
///
/// cache.set("k", 1u32, Duration::from_secs(5));
/// clock.advance(Duration::from_secs(5));
/// assert_eq!(cache.get("k"), None);
/// ```
#[derive(Clone, Debug)]
pub struct ManualClock {
    now: Arc<Mutex<Instant>>,
}

impl Default for ManualClock {
    fn default() -> Self {
        Self::new()
    }
}

impl ManualClock {
    pub fn new() -> Self {
        Self {
            now: Arc::new(Mutex::new(Instant::now())),
        }
    }

    pub fn advance(&self, by: Duration) {
        *self.now.lock() += by;
    }
}

impl Clock for ManualClock {
    fn now(&self) -> Instant {
        *self.now.lock()
    }
}

pub(crate) type SharedClock = Arc<dyn Clock>;

pub(crate) fn system() -> SharedClock {
    Arc::new(SystemClock)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_manual_clock_moves_only_on_advance() {
        let clock = ManualClock::new();
        let start = clock.now();
        assert_eq!(clock.now(), start);

        let shared = clock.clone();
        shared.advance(Duration::from_millis(250));
        assert_eq!(clock.now() - start, Duration::from_millis(250));
    }
}
