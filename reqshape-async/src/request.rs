use reqshape_core::MemoryEstimator;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::time::SystemTime;
use tokio::time::Instant;
use uuid::Uuid;

use crate::keys;

/// Request method. Reads are idempotent and eligible for caching and batching.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Method {
    Get,
    Head,
    Options,
    Post,
    Put,
    Patch,
    Delete,
}

impl Method {
    pub fn as_str(&self) -> &'static str {
        match self {
            Method::Get => "GET",
            Method::Head => "HEAD",
            Method::Options => "OPTIONS",
            Method::Post => "POST",
            Method::Put => "PUT",
            Method::Patch => "PATCH",
            Method::Delete => "DELETE",
        }
    }

    /// Read-only methods: safe to cache, batch and retry freely.
    pub fn is_read(&self) -> bool {
        matches!(self, Method::Get | Method::Head | Method::Options)
    }
}

impl fmt::Display for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Priority {
    Low,
    #[default]
    Normal,
    High,
    Critical,
}

/// One logical operation submitted to the dispatcher.
#[derive(Clone, Debug)]
pub struct Request {
    pub id: Uuid,
    pub method: Method,
    pub target: String,
    pub payload: Option<serde_json::Value>,
    pub headers: BTreeMap<String, String>,
    pub priority: Priority,
    pub enqueued_at: Instant,
}

impl Request {
    pub fn new(method: Method, target: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            method,
            target: target.into(),
            payload: None,
            headers: BTreeMap::new(),
            priority: Priority::Normal,
            enqueued_at: Instant::now(),
        }
    }

    pub fn get(target: impl Into<String>) -> Self {
        Self::new(Method::Get, target)
    }

    pub fn post(target: impl Into<String>, payload: serde_json::Value) -> Self {
        Self::new(Method::Post, target).with_payload(payload)
    }

    pub fn with_payload(mut self, payload: serde_json::Value) -> Self {
        self.payload = Some(payload);
        self
    }

    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(name.into(), value.into());
        self
    }

    pub fn with_priority(mut self, priority: Priority) -> Self {
        self.priority = priority;
        self
    }

    /// Deterministic cache slot for `(method, target, payload)`.
    pub fn cache_key(&self) -> String {
        keys::cache_key(self.method, &self.target, self.payload.as_ref())
    }
}

/// Result of a request, either fresh from the transport or served from cache.
#[derive(Clone, Debug, PartialEq)]
pub struct Response {
    pub value: Vec<u8>,
    pub status_code: u16,
    pub headers: BTreeMap<String, String>,
    pub observed_at: SystemTime,
    pub from_cache: bool,
}

impl Response {
    pub fn new(status_code: u16, value: impl Into<Vec<u8>>) -> Self {
        Self {
            value: value.into(),
            status_code,
            headers: BTreeMap::new(),
            observed_at: SystemTime::now(),
            from_cache: false,
        }
    }

    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status_code)
    }

    /// Decodes the body as JSON.
    pub fn json<T: serde::de::DeserializeOwned>(&self) -> serde_json::Result<T> {
        serde_json::from_slice(&self.value)
    }

    pub fn text(&self) -> std::borrow::Cow<'_, str> {
        String::from_utf8_lossy(&self.value)
    }

    pub(crate) fn cached(mut self) -> Self {
        self.from_cache = true;
        self
    }
}

impl MemoryEstimator for Response {
    fn estimate_memory(&self) -> usize {
        // the map's inline part is already inside size_of::<Self>()
        let headers = self
            .headers
            .estimate_memory()
            .saturating_sub(std::mem::size_of::<BTreeMap<String, String>>());
        std::mem::size_of::<Self>() + self.value.capacity() + headers
    }
}
