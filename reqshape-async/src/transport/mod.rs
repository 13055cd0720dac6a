//! The boundary to the outside world.
//!
//! The executor only ever talks to a [`Transport`]; the crate ships an HTTP
//! implementation ([`HttpTransport`], `http` feature) and a deterministic
//! double ([`ScriptedTransport`]) for tests and demos.

use async_trait::async_trait;
use std::collections::BTreeMap;

use crate::error::TransportError;
use crate::keys;
use crate::request::{Method, Request, Response};

#[cfg(feature = "http")]
mod http;
mod scripted;

#[cfg(feature = "http")]
pub use http::HttpTransport;
pub use scripted::{ScriptedTransport, Step};

/// What the transport is asked to send.
#[derive(Clone, Debug, PartialEq)]
pub struct TransportRequest {
    pub method: Method,
    pub target: String,
    pub payload: Option<serde_json::Value>,
    pub headers: BTreeMap<String, String>,
}

impl From<&Request> for TransportRequest {
    fn from(request: &Request) -> Self {
        Self {
            method: request.method,
            target: request.target.clone(),
            payload: request.payload.clone(),
            headers: request.headers.clone(),
        }
    }
}

/// What came back.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TransportResponse {
    pub status: u16,
    pub headers: BTreeMap<String, String>,
    pub body: Vec<u8>,
}

impl TransportResponse {
    pub fn new(status: u16, body: impl Into<Vec<u8>>) -> Self {
        Self {
            status,
            headers: BTreeMap::new(),
            body: body.into(),
        }
    }
}

impl From<TransportResponse> for Response {
    fn from(response: TransportResponse) -> Self {
        let mut converted = Response::new(response.status, response.body);
        converted.headers = response.headers;
        converted
    }
}

/// An outbound channel to a backend.
///
/// Implementations must be cancel-safe: the executor enforces its timeout by
/// dropping the `send` future.
#[async_trait]
pub trait Transport: Send + Sync {
    async fn send(&self, request: &TransportRequest) -> Result<TransportResponse, TransportError>;

    /// Checked once before a batch runs. An error here fails the whole batch
    /// without executing any member.
    async fn ready(&self) -> Result<(), TransportError> {
        Ok(())
    }

    /// Backend that `target` ends up at, used to group rate limiting and
    /// pooled connections.
    ///
    /// The default groups absolute URLs by host and every relative target
    /// under [`keys::DEFAULT_RESOURCE`]. Transports that resolve relative
    /// targets against a base should report the resolved host.
    fn resource_key(&self, target: &str) -> String {
        keys::resource_key(target)
    }
}
