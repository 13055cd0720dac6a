use parking_lot::Mutex;
use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::trace;

use crate::clock::{self, Clock, SharedClock};

/// Outcome of a [`SlidingWindowLimiter::check`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RateLimitDecision {
    pub allowed: bool,
    /// Admissions still available in the current window after this check.
    pub remaining: u32,
    /// Time until the oldest admission leaves the window. Zero when allowed
    /// with room to spare.
    pub reset_in: Duration,
}

/// Per-key sliding-window admission control.
///
/// Each key keeps the timestamps of its admissions inside the last `window`.
/// A check prunes timestamps older than the window and admits the call if
/// fewer than `limit` remain. Keys seen for the first time start with the
/// full budget.
///
/// In any interval of length `window`, at most `limit` checks for the same
/// key return `allowed = true`.
///
/// # Examples
///
/// ```
/// use reqshape_core::SlidingWindowLimiter;
/// use std::time::Duration;
///
/// let limiter = SlidingWindowLimiter::new(3, Duration::from_secs(1));
///
/// assert!(limiter.check("api.example.com").allowed);
/// assert!(limiter.check("api.example.com").allowed);
/// assert!(limiter.check("api.example.com").allowed);
///
/// let denied = limiter.check("api.example.com");
/// assert!(!denied.allowed);
/// assert_eq!(denied.remaining, 0);
/// assert!(denied.reset_in <= Duration::from_secs(1));
/// ```
pub struct SlidingWindowLimiter {
    limit: u32,
    window: Duration,
    windows: Mutex<HashMap<String, VecDeque<Instant>>>,
    clock: SharedClock,
}

impl SlidingWindowLimiter {
    pub fn new(limit: u32, window: Duration) -> Self {
        Self {
            limit,
            window,
            windows: Mutex::new(HashMap::new()),
            clock: clock::system(),
        }
    }

    pub fn with_clock(mut self, clock: impl Clock + 'static) -> Self {
        self.clock = Arc::new(clock);
        self
    }

    pub fn limit(&self) -> u32 {
        self.limit
    }

    pub fn window(&self) -> Duration {
        self.window
    }

    /// Prunes `key`'s window and records an admission if there is room.
    pub fn check(&self, key: &str) -> RateLimitDecision {
        let now = self.clock.now();
        let mut windows = self.windows.lock();
        let timestamps = windows.entry(key.to_string()).or_default();
        prune(timestamps, now, self.window);

        let used = timestamps.len() as u32;
        if used < self.limit {
            timestamps.push_back(now);
            let remaining = self.limit - used - 1;
            let reset_in = if remaining == 0 {
                self.reset_in(timestamps, now)
            } else {
                Duration::ZERO
            };
            RateLimitDecision {
                allowed: true,
                remaining,
                reset_in,
            }
        } else {
            let reset_in = self.reset_in(timestamps, now);
            trace!(key, limit = self.limit, ?reset_in, "rate limit reached");
            RateLimitDecision {
                allowed: false,
                remaining: 0,
                reset_in,
            }
        }
    }

    /// Reports the current state without recording an admission.
    pub fn peek(&self, key: &str) -> RateLimitDecision {
        let now = self.clock.now();
        let mut windows = self.windows.lock();
        let Some(timestamps) = windows.get_mut(key) else {
            return RateLimitDecision {
                allowed: self.limit > 0,
                remaining: self.limit,
                reset_in: Duration::ZERO,
            };
        };
        prune(timestamps, now, self.window);

        let remaining = self.limit.saturating_sub(timestamps.len() as u32);
        RateLimitDecision {
            allowed: remaining > 0,
            remaining,
            reset_in: if remaining > 0 {
                Duration::ZERO
            } else {
                self.reset_in(timestamps, now)
            },
        }
    }

    /// Forgets every admission recorded for `key`.
    pub fn reset(&self, key: &str) {
        self.windows.lock().remove(key);
    }

    /// Drops keys whose window holds no admissions any more.
    pub fn prune_idle(&self) -> usize {
        let now = self.clock.now();
        let mut windows = self.windows.lock();
        let before = windows.len();
        windows.retain(|_, timestamps| {
            prune(timestamps, now, self.window);
            !timestamps.is_empty()
        });
        before - windows.len()
    }

    /// Number of keys currently tracked.
    pub fn tracked_keys(&self) -> usize {
        self.windows.lock().len()
    }

    fn reset_in(&self, timestamps: &VecDeque<Instant>, now: Instant) -> Duration {
        timestamps
            .front()
            .map(|oldest| (*oldest + self.window).saturating_duration_since(now))
            .unwrap_or(Duration::ZERO)
    }
}

fn prune(timestamps: &mut VecDeque<Instant>, now: Instant, window: Duration) {
    while let Some(oldest) = timestamps.front() {
        if now.saturating_duration_since(*oldest) >= window {
            timestamps.pop_front();
        } else {
            break;
        }
    }
}
