//! # reqshape
//!
//! Client-side request shaping: let many concurrent callers share a bounded
//! set of outbound connections without overwhelming a backend.
//!
//! ## Features
//!
//! - **TTL/LRU cache** with a memory budget and oldest-first eviction under pressure
//! - **Sliding-window rate limiting** per resource (URL host)
//! - **Connection pooling** with idle reaping
//! - **Retries** with per-attempt timeouts and exponential backoff
//! - **Batching** of normal-priority reads, flushed on size or timer
//! - **Stats** for dashboards, serializable with serde
//!
//! This crate re-exports [`reqshape_core`] (synchronous building blocks) and
//! [`reqshape_async`] (the tokio pipeline), so one dependency is enough.
//!
//! ## Quick Start
//!
//! ```rust
//! use reqshape::{Request, RequestShaper, ShaperConfig, ScriptedTransport};
//! use std::sync::Arc;
//!
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() {
//! let shaper = RequestShaper::start(
//!     ShaperConfig::default(),
//!     Arc::new(ScriptedTransport::new()),
//! )
//! .unwrap();
//!
//! let response = shaper.request(Request::get("/api/health")).await.unwrap();
//! assert!(response.is_success());
//!
//! println!("{:?}", shaper.stats());
//! shaper.dispose().await;
//! # }
//! ```
//!
//! ## Using the cache on its own
//!
//! ```rust
//! use reqshape::TtlCache;
//! use std::time::Duration;
//!
//! let cache = TtlCache::new(1000, Duration::from_secs(300))
//!     .with_memory_budget(10 * 1024 * 1024);
//!
//! cache.set_default("user:42", String::from("Ada"));
//! assert_eq!(cache.get("user:42"), Some(String::from("Ada")));
//! assert_eq!(cache.stats().hits, 1);
//! ```
//!
//! ## Real HTTP
//!
//! With the default `http` feature, [`HttpTransport`] sends requests with
//! reqwest:
//!
//! ```rust,no_run
//! # #[cfg(feature = "http")]
//! # async fn run() -> Result<(), Box<dyn std::error::Error>> {
//! use reqshape::{HttpTransport, RequestShaper, ShaperConfig};
//! use std::sync::Arc;
//!
//! let transport = HttpTransport::new()?.with_base_url("https://api.example.com")?;
//! let shaper = RequestShaper::start(ShaperConfig::default(), Arc::new(transport))?;
//! let users = shaper.get("/v1/users").await?;
//! println!("{}", users.text());
//! # Ok(())
//! # }
//! ```

pub use reqshape_async::*;
pub use reqshape_core::*;

// Re-export parking_lot for callers sharing locks with the cache
pub use parking_lot;
