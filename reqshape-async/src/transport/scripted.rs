use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use super::{Transport, TransportRequest, TransportResponse};
use crate::error::TransportError;

/// One scripted outcome of [`ScriptedTransport::send`].
#[derive(Clone, Debug)]
pub enum Step {
    /// Respond 200 with the request target as body.
    Echo,
    Respond(TransportResponse),
    Fail(TransportError),
    /// Never complete; only a timeout ends the attempt.
    Hang,
    /// Sleep on the tokio clock, then play the inner step.
    Delay(Duration, Box<Step>),
}

impl Step {
    pub fn ok(body: impl Into<Vec<u8>>) -> Self {
        Step::Respond(TransportResponse::new(200, body))
    }

    pub fn status(status: u16) -> Self {
        Step::Respond(TransportResponse::new(status, Vec::new()))
    }

    pub fn fail(message: impl Into<String>) -> Self {
        Step::Fail(TransportError::Connect(message.into()))
    }

    pub fn after(self, delay: Duration) -> Self {
        Step::Delay(delay, Box::new(self))
    }
}

/// Deterministic [`Transport`] that replays a script of outcomes.
///
/// Each `send` consumes the next scripted [`Step`]; once the script runs out
/// every call plays the fallback (by default [`Step::Echo`]). All requests and
/// the number of attempts are recorded for assertions.
///
/// # Examples
///
/// ```
/// use reqshape_async::transport::{ScriptedTransport, Step};
///
/// let transport = ScriptedTransport::new()
///     .then(Step::fail("connection reset"))
///     .then(Step::ok(b"done".to_vec()));
/// assert_eq!(transport.attempts(), 0);
/// ```
pub struct ScriptedTransport {
    script: Mutex<VecDeque<Step>>,
    fallback: Step,
    ready: Mutex<Option<TransportError>>,
    attempts: AtomicUsize,
    sent: Mutex<Vec<TransportRequest>>,
}

impl Default for ScriptedTransport {
    fn default() -> Self {
        Self::new()
    }
}

impl ScriptedTransport {
    pub fn new() -> Self {
        Self {
            script: Mutex::new(VecDeque::new()),
            fallback: Step::Echo,
            ready: Mutex::new(None),
            attempts: AtomicUsize::new(0),
            sent: Mutex::new(Vec::new()),
        }
    }

    /// Appends a step to the script.
    pub fn then(self, step: Step) -> Self {
        self.script.lock().push_back(step);
        self
    }

    /// Appends `count` copies of `step`.
    pub fn then_repeat(self, count: usize, step: Step) -> Self {
        {
            let mut script = self.script.lock();
            for _ in 0..count {
                script.push_back(step.clone());
            }
        }
        self
    }

    pub fn with_fallback(mut self, step: Step) -> Self {
        self.fallback = step;
        self
    }

    /// Makes [`Transport::ready`] fail until cleared with `None`.
    pub fn set_ready_error(&self, error: Option<TransportError>) {
        *self.ready.lock() = error;
    }

    pub fn push(&self, step: Step) {
        self.script.lock().push_back(step);
    }

    /// Number of `send` calls observed.
    pub fn attempts(&self) -> usize {
        self.attempts.load(Ordering::SeqCst)
    }

    /// Every request passed to `send`, in call order.
    pub fn sent(&self) -> Vec<TransportRequest> {
        self.sent.lock().clone()
    }
}

#[async_trait]
impl Transport for ScriptedTransport {
    async fn send(&self, request: &TransportRequest) -> Result<TransportResponse, TransportError> {
        self.attempts.fetch_add(1, Ordering::SeqCst);
        self.sent.lock().push(request.clone());
        let mut step = self
            .script
            .lock()
            .pop_front()
            .unwrap_or_else(|| self.fallback.clone());

        loop {
            match step {
                Step::Echo => {
                    return Ok(TransportResponse::new(200, request.target.as_bytes().to_vec()))
                }
                Step::Respond(response) => return Ok(response),
                Step::Fail(error) => return Err(error),
                Step::Hang => futures::future::pending::<()>().await,
                Step::Delay(delay, next) => {
                    tokio::time::sleep(delay).await;
                    step = *next;
                }
            }
        }
    }

    async fn ready(&self) -> Result<(), TransportError> {
        match self.ready.lock().clone() {
            Some(error) => Err(error),
            None => Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::request::Method;

    fn get(target: &str) -> TransportRequest {
        TransportRequest {
            method: Method::Get,
            target: target.to_string(),
            payload: None,
            headers: Default::default(),
        }
    }

    #[tokio::test]
    async fn test_script_then_fallback() {
        let transport = ScriptedTransport::new()
            .then(Step::fail("boom"))
            .then(Step::ok(b"second".to_vec()));

        assert!(transport.send(&get("/a")).await.is_err());
        assert_eq!(transport.send(&get("/a")).await.unwrap().body, b"second");
        assert_eq!(transport.send(&get("/echo")).await.unwrap().body, b"/echo");
        assert_eq!(transport.attempts(), 3);
        assert_eq!(transport.sent().len(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_delay_uses_tokio_clock() {
        let transport = ScriptedTransport::new().then(Step::ok(b"late".to_vec()).after(Duration::from_secs(5)));
        let started = tokio::time::Instant::now();
        let response = transport.send(&get("/slow")).await.unwrap();
        assert_eq!(response.body, b"late");
        assert!(started.elapsed() >= Duration::from_secs(5));
    }

    #[tokio::test]
    async fn test_ready_error() {
        let transport = ScriptedTransport::new();
        assert!(transport.ready().await.is_ok());
        transport.set_ready_error(Some(TransportError::Connect("down".into())));
        assert!(transport.ready().await.is_err());
    }
}
