//! Memoization for arbitrary async, fallible functions.
//!
//! [`CachedCall`] wraps a function `Fn(A) -> Future<Output = Result<V, E>>`
//! with a key function and stores successful results in a shared
//! [`TtlCache`]. Errors are never cached.
//!
//! # Examples
//!
//! ```
//! use reqshape_async::CachedCall;
//! use reqshape_core::TtlCache;
//! use std::sync::Arc;
//! use std::time::Duration;
//!
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() {
//! let cache = Arc::new(TtlCache::new(100, Duration::from_secs(60)));
//! let square = CachedCall::new(cache, |n: &u64| format!("square:{n}"), |n: u64| async move {
//!     Ok::<_, String>(n * n)
//! });
//!
//! assert_eq!(square.call(7).await, Ok(49));
//! assert!(square.is_cached(&7));
//! # }
//! ```

use reqshape_core::{MemoryEstimator, TtlCache};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tracing::trace;

type KeyFn<A> = Box<dyn Fn(&A) -> String + Send + Sync>;
type TtlFn<V> = Box<dyn Fn(&V) -> Duration + Send + Sync>;
type CacheIf<V> = Box<dyn Fn(&str, &V) -> bool + Send + Sync>;

pub struct CachedCall<A, V, F> {
    cache: Arc<TtlCache<V>>,
    key: KeyFn<A>,
    ttl: Option<TtlFn<V>>,
    cache_if: Option<CacheIf<V>>,
    call: F,
}

impl<A, V, F> CachedCall<A, V, F>
where
    V: Clone + MemoryEstimator,
{
    /// Results live for the cache's default TTL unless
    /// [`with_ttl`](Self::with_ttl) says otherwise.
    pub fn new<K>(cache: Arc<TtlCache<V>>, key: K, call: F) -> Self
    where
        K: Fn(&A) -> String + Send + Sync + 'static,
    {
        Self {
            cache,
            key: Box::new(key),
            ttl: None,
            cache_if: None,
            call,
        }
    }

    /// Sizes each entry's TTL from the value being stored.
    pub fn with_ttl<T>(mut self, ttl: T) -> Self
    where
        T: Fn(&V) -> Duration + Send + Sync + 'static,
    {
        self.ttl = Some(Box::new(ttl));
        self
    }

    /// Stores a successful value only when `predicate(key, value)` holds.
    pub fn with_cache_if<P>(mut self, predicate: P) -> Self
    where
        P: Fn(&str, &V) -> bool + Send + Sync + 'static,
    {
        self.cache_if = Some(Box::new(predicate));
        self
    }

    /// Returns the cached value for `args`, or runs the wrapped function and
    /// caches its `Ok` result.
    pub async fn call<Fut, E>(&self, args: A) -> Result<V, E>
    where
        F: Fn(A) -> Fut,
        Fut: Future<Output = Result<V, E>>,
    {
        let key = (self.key)(&args);
        if let Some(value) = self.cache.get(&key) {
            trace!(key, "cached call hit");
            return Ok(value);
        }

        let value = (self.call)(args).await?;

        let admit = self
            .cache_if
            .as_ref()
            .map(|predicate| predicate(&key, &value))
            .unwrap_or(true);
        if admit {
            let ttl = self
                .ttl
                .as_ref()
                .map(|ttl| ttl(&value))
                .unwrap_or_else(|| self.cache.default_ttl());
            self.cache.set(&key, value.clone(), ttl);
        }
        Ok(value)
    }

    pub fn is_cached(&self, args: &A) -> bool {
        self.cache.contains(&(self.key)(args))
    }

    /// Drops the cached result for `args`.
    pub fn invalidate(&self, args: &A) -> bool {
        self.cache.delete(&(self.key)(args))
    }

    pub fn cache(&self) -> &Arc<TtlCache<V>> {
        &self.cache
    }
}
