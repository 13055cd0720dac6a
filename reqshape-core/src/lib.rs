//! # Reqshape Core
//!
//! Synchronous building blocks of the reqshape request-shaping layer.
//!
//! Everything here is an owned, `Sync` object: construct it once, share it
//! through an `Arc`, and call its `&self` methods from any task or thread.
//! None of these types perform I/O or spawn background work; periodic
//! maintenance (expiry sweeps, idle reaping) is driven from outside, usually by
//! `reqshape-async`.
//!
//! ## Module Organization
//!
//! - [`clock`] - Pluggable time source for TTLs, windows and idle timeouts
//! - [`cache_entry`] - Entry wrapper with creation/access timestamps for TTL and LRU
//! - [`ttl_cache`] - Key/value cache with TTL, LRU size cap and memory budget
//! - [`memory_estimator`] - Byte estimates used by the memory budget
//! - [`stats`] - Hit/miss/eviction counters
//! - [`rate_limiter`] - Per-key sliding-window admission control
//! - [`connection_pool`] - Bounded pool of reusable handles with idle eviction
//! - [`utils`] - Eviction victim selection helpers
//!
pub mod cache_entry;
pub mod clock;
pub mod connection_pool;
pub mod memory_estimator;
pub mod rate_limiter;
pub mod stats;
pub mod ttl_cache;
pub mod utils;

pub use cache_entry::CacheEntry;
pub use clock::{Clock, ManualClock, SystemClock};
pub use connection_pool::{ConnectionPool, PoolEntry, PoolLease};
pub use memory_estimator::MemoryEstimator;
pub use rate_limiter::{RateLimitDecision, SlidingWindowLimiter};
pub use stats::{CacheStats, CacheStatsSnapshot};
pub use ttl_cache::{TtlCache, DEFAULT_MEMORY_BUDGET, ENTRY_OVERHEAD_BYTES};
