use std::time::Duration;
use thiserror::Error;
use uuid::Uuid;

/// Caller-visible failures of the request-shaping layer.
///
/// The type is `Clone` so that a single batch-level failure can be delivered
/// to every member of the batch.
#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum RequestError {
    /// One attempt exceeded the per-attempt timeout.
    #[error("attempt timed out after {timeout:?}")]
    Timeout { timeout: Duration },

    /// The transport rejected the call.
    #[error("transport failure: {message}")]
    TransportFailure { message: String },

    /// No pooled connection could be leased for the resource.
    #[error("connection pool exhausted for `{key}`")]
    PoolExhausted { key: String },

    /// Admission denied; never retried here. `reset_in` tells the caller how
    /// long until a slot frees up.
    #[error("rate limit exceeded for `{key}`, retry in {reset_in:?}")]
    RateLimitExceeded { key: String, reset_in: Duration },

    /// A batched request was still queued when the handler deadline passed;
    /// it was never sent.
    #[error("batched request {id} not resolved within {waited:?}")]
    BatchTimeout { id: Uuid, waited: Duration },

    /// The batch carrying this request ended without producing its result,
    /// for instance because the batch task panicked.
    #[error("batch carrying request {id} ended without a result")]
    BatchAborted { id: Uuid },

    /// Every attempt failed; wraps the last failure.
    #[error("request failed after {attempts} attempt(s)")]
    ExhaustedRetries {
        attempts: u32,
        #[source]
        last: Box<RequestError>,
    },

    /// The batch queue is at capacity.
    #[error("batch queue full ({capacity} pending)")]
    QueueFull { capacity: usize },

    /// The dispatcher was shut down before the request could complete.
    #[error("request shaper is shutting down")]
    ShuttingDown,
}

impl RequestError {
    /// Whether the executor should try again after this error.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            RequestError::Timeout { .. }
                | RequestError::TransportFailure { .. }
                | RequestError::PoolExhausted { .. }
        )
    }

    /// The innermost error, looking through `ExhaustedRetries`.
    pub fn root_cause(&self) -> &RequestError {
        match self {
            RequestError::ExhaustedRetries { last, .. } => last.root_cause(),
            other => other,
        }
    }
}

impl From<TransportError> for RequestError {
    fn from(err: TransportError) -> Self {
        RequestError::TransportFailure {
            message: err.to_string(),
        }
    }
}

/// Failure reported by a [`Transport`](crate::Transport) implementation.
#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum TransportError {
    #[error("connection failed: {0}")]
    Connect(String),

    #[error("invalid request: {0}")]
    InvalidRequest(String),

    #[error("{0}")]
    Other(String),
}

/// Rejected configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to parse configuration: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("`{field}` must be greater than zero")]
    Zero { field: &'static str },
}

pub type Result<T, E = RequestError> = std::result::Result<T, E>;

#[cfg(test)]
mod tests {
    use super::*;
    use std::error::Error as _;

    #[test]
    fn test_retry_classification() {
        assert!(RequestError::Timeout {
            timeout: Duration::from_secs(1)
        }
        .is_retryable());
        assert!(RequestError::from(TransportError::Connect("refused".into())).is_retryable());
        assert!(!RequestError::RateLimitExceeded {
            key: "h".into(),
            reset_in: Duration::ZERO
        }
        .is_retryable());
        assert!(!RequestError::ShuttingDown.is_retryable());
    }

    #[test]
    fn test_exhausted_retries_source_chain() {
        let err = RequestError::ExhaustedRetries {
            attempts: 3,
            last: Box::new(RequestError::Timeout {
                timeout: Duration::from_millis(500),
            }),
        };
        assert!(err.source().is_some());
        assert!(matches!(err.root_cause(), RequestError::Timeout { .. }));
        assert_eq!(err.to_string(), "request failed after 3 attempt(s)");
    }
}
