//! # reqshape-async
//!
//! The tokio side of reqshape: everything that awaits.
//!
//! Callers hand [`Request`]s to a [`RequestShaper`], which runs each one
//! through a fixed pipeline:
//!
//! 1. **Cache check**: reads that hit the [`TtlCache`](reqshape_core::TtlCache)
//!    resolve immediately with `from_cache = true`.
//! 2. **Rate limit**: a [`SlidingWindowLimiter`](reqshape_core::SlidingWindowLimiter)
//!    keyed by resource (the backend host, as resolved by the [`Transport`])
//!    admits or rejects.
//! 3. **Batch or direct**: normal-priority reads are queued and drained in
//!    batches by the [`BatchDispatcher`]; everything else goes straight to the
//!    [`RetryingExecutor`].
//! 4. **Execute**: each attempt leases a pooled connection, calls the
//!    [`Transport`] under a timeout and backs off exponentially on failure.
//! 5. **Store**: successful reads are cached with a TTL sized by how long they
//!    took; successful writes invalidate cached reads of the same target.
//!
//! ## Features
//!
//! - **Adaptive TTL**: slow responses are cached longer (30 s / 1 min / 5 min)
//! - **Bounded queue**: a full batch queue rejects with [`RequestError::QueueFull`]
//! - **Honest errors**: [`RequestError::BatchTimeout`] only for requests that
//!   never left the queue; a batch that ran reports what the executor saw
//! - **Clean shutdown**: [`RequestShaper::dispose`] rejects queued work and
//!   joins every background task
//! - **Pluggable transport**: [`HttpTransport`] (reqwest, `http` feature) or the
//!   deterministic [`ScriptedTransport`] for tests
//! - **Memoization**: [`CachedCall`] caches any async fallible function
//!
//! ## Quick Start
//!
//! ```
//! use reqshape_async::{Request, RequestShaper, ShaperConfig};
//! use reqshape_async::transport::ScriptedTransport;
//! use std::sync::Arc;
//!
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() {
//! let config = ShaperConfig::from_toml_str("batch_size = 1").unwrap();
//! let shaper = RequestShaper::start(config, Arc::new(ScriptedTransport::new())).unwrap();
//!
//! let first = shaper.request(Request::get("/api/users")).await.unwrap();
//! assert!(!first.from_cache);
//!
//! let second = shaper.request(Request::get("/api/users")).await.unwrap();
//! assert!(second.from_cache);
//!
//! shaper.dispose().await;
//! # }
//! ```

pub mod cached_call;
pub mod config;
pub mod dispatcher;
pub mod error;
pub mod executor;
pub mod keys;
pub mod monitor;
pub mod request;
pub mod shaper;
pub mod task;
pub mod tokio_clock;
pub mod transport;

pub use cached_call::CachedCall;
pub use config::{RateLimitConfig, ShaperConfig};
pub use dispatcher::{BatchDispatcher, DispatchOptions};
pub use error::{ConfigError, RequestError, Result, TransportError};
pub use executor::{adaptive_ttl, Connection, ExecuteOptions, RetryingExecutor};
pub use monitor::{PressureMonitor, ShaperStats};
pub use request::{Method, Priority, Request, Response};
pub use shaper::{PrewarmReport, RequestShaper};
pub use task::PeriodicTask;
pub use tokio_clock::TokioClock;
#[cfg(feature = "http")]
pub use transport::HttpTransport;
pub use transport::{ScriptedTransport, Step, Transport, TransportRequest, TransportResponse};
