use parking_lot::Mutex;
use reqshape_core::SlidingWindowLimiter;
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::oneshot;
use tracing::{debug, trace, warn};
use uuid::Uuid;

use crate::config::ShaperConfig;
use crate::error::{RequestError, Result};
use crate::executor::{ExecuteOptions, RetryingExecutor};
use crate::request::{Priority, Request, Response};
use crate::task::PeriodicTask;

/// Knobs of the batching path.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct DispatchOptions {
    pub batching_enabled: bool,
    pub batch_size: usize,
    /// How long a request may wait in the queue before it is given up on.
    /// Once its batch is drained the caller waits for the real outcome.
    pub batch_timeout: Duration,
    pub max_queue_depth: usize,
    pub execute: ExecuteOptions,
}

impl Default for DispatchOptions {
    fn default() -> Self {
        Self::from_config(&ShaperConfig::default())
    }
}

impl DispatchOptions {
    pub fn from_config(config: &ShaperConfig) -> Self {
        Self {
            batching_enabled: config.batching_enabled,
            batch_size: config.batch_size.max(1),
            batch_timeout: config.batch_timeout(),
            max_queue_depth: config.max_queue_depth.max(1),
            execute: ExecuteOptions::from_config(config),
        }
    }
}

type Waiter = oneshot::Sender<Result<Response>>;

#[derive(Default)]
struct QueueState {
    queue: VecDeque<Request>,
    waiters: HashMap<Uuid, Waiter>,
    closed: bool,
}

impl QueueState {
    /// Removes a request that will never be answered through the queue.
    fn forget(&mut self, id: Uuid) {
        self.waiters.remove(&id);
        self.queue.retain(|request| request.id != id);
    }

    fn is_queued(&self, id: Uuid) -> bool {
        self.queue.iter().any(|request| request.id == id)
    }
}

/// Answers the members of one drained batch. Whatever is still unanswered
/// when it drops, including on unwind, gets [`RequestError::BatchAborted`].
struct BatchCompletion {
    state: Arc<Mutex<QueueState>>,
    ids: Vec<Uuid>,
}

impl BatchCompletion {
    fn deliver(&self, outcome: Result<Vec<Result<Response>>>) {
        let mut state = self.state.lock();
        match outcome {
            Ok(results) => {
                for (id, result) in self.ids.iter().zip(results) {
                    if let Some(waiter) = state.waiters.remove(id) {
                        let _ = waiter.send(result);
                    }
                }
            }
            Err(err) => {
                for id in &self.ids {
                    if let Some(waiter) = state.waiters.remove(id) {
                        let _ = waiter.send(Err(err.clone()));
                    }
                }
            }
        }
    }
}

impl Drop for BatchCompletion {
    fn drop(&mut self) {
        let mut state = self.state.lock();
        for id in &self.ids {
            if let Some(waiter) = state.waiters.remove(id) {
                warn!(%id, "batch ended without a result");
                let _ = waiter.send(Err(RequestError::BatchAborted { id: *id }));
            }
        }
    }
}

/// Front door for requests: cache check, admission control, then either the
/// batch queue or direct execution.
///
/// Reads at [`Priority::Normal`] are queued and drained in batches of up to
/// `batch_size`, either as soon as the queue fills a batch or when
/// [`flush`](Self::flush) runs on its timer. Every other request goes
/// straight to the executor.
pub struct BatchDispatcher {
    executor: Arc<RetryingExecutor>,
    limiter: Arc<SlidingWindowLimiter>,
    options: DispatchOptions,
    state: Arc<Mutex<QueueState>>,
    batches: AtomicU64,
}

impl BatchDispatcher {
    pub fn new(
        executor: Arc<RetryingExecutor>,
        limiter: Arc<SlidingWindowLimiter>,
        options: DispatchOptions,
    ) -> Self {
        Self {
            executor,
            limiter,
            options,
            state: Arc::new(Mutex::new(QueueState::default())),
            batches: AtomicU64::new(0),
        }
    }

    pub fn options(&self) -> &DispatchOptions {
        &self.options
    }

    pub fn executor(&self) -> &Arc<RetryingExecutor> {
        &self.executor
    }

    pub fn limiter(&self) -> &Arc<SlidingWindowLimiter> {
        &self.limiter
    }

    /// Whether `request` would go through the batch queue.
    pub fn is_batchable(&self, request: &Request) -> bool {
        self.options.batching_enabled
            && request.method.is_read()
            && request.priority == Priority::Normal
    }

    /// Resolves `request`.
    ///
    /// # Errors
    ///
    /// - [`RequestError::ShuttingDown`] after [`shutdown`](Self::shutdown).
    /// - [`RequestError::RateLimitExceeded`] when the resource's window is full.
    /// - [`RequestError::QueueFull`] when a batchable request finds the queue
    ///   at `max_queue_depth`.
    /// - [`RequestError::BatchTimeout`] when a queued request is still waiting
    ///   in the queue after `batch_timeout`.
    /// - [`RequestError::BatchAborted`] when its batch ends without a result.
    /// - Whatever the executor returns otherwise.
    ///
    /// Requests rejected before they could be sent do not use up a slot of
    /// the rate-limit window.
    pub async fn dispatch(&self, request: Request) -> Result<Response> {
        if self.state.lock().closed {
            return Err(RequestError::ShuttingDown);
        }

        if request.method.is_read() {
            if let Some(hit) = self.executor.cache().get(&request.cache_key()) {
                trace!(id = %request.id, "served from cache");
                return Ok(hit.cached());
            }
        }

        let resource = self.executor.resource_key(&request);
        if self.is_batchable(&request) {
            self.enqueue(request, &resource).await
        } else {
            self.admit(&resource)?;
            self.executor.execute(&request, self.options.execute).await
        }
    }

    fn admit(&self, resource: &str) -> Result<()> {
        let decision = self.limiter.check(resource);
        if decision.allowed {
            return Ok(());
        }
        debug!(key = %resource, reset_in = ?decision.reset_in, "rate limited");
        Err(RequestError::RateLimitExceeded {
            key: resource.to_string(),
            reset_in: decision.reset_in,
        })
    }

    async fn enqueue(&self, request: Request, resource: &str) -> Result<Response> {
        let id = request.id;
        let (tx, mut rx) = oneshot::channel();

        let should_flush = {
            let mut state = self.state.lock();
            if state.closed {
                return Err(RequestError::ShuttingDown);
            }
            if state.queue.len() >= self.options.max_queue_depth {
                return Err(RequestError::QueueFull {
                    capacity: self.options.max_queue_depth,
                });
            }
            self.admit(resource)?;
            state.queue.push_back(request);
            state.waiters.insert(id, tx);
            trace!(%id, depth = state.queue.len(), "queued for batch");
            state.queue.len() >= self.options.batch_size
        };

        if should_flush {
            self.flush();
        }

        let answer = match tokio::time::timeout(self.options.batch_timeout, &mut rx).await {
            Ok(answer) => answer,
            Err(_) => {
                {
                    let mut state = self.state.lock();
                    if state.is_queued(id) {
                        state.forget(id);
                        drop(state);
                        warn!(%id, waited = ?self.options.batch_timeout, "batched request timed out in queue");
                        return Err(RequestError::BatchTimeout {
                            id,
                            waited: self.options.batch_timeout,
                        });
                    }
                }
                debug!(%id, "batch deadline passed while in flight, awaiting outcome");
                rx.await
            }
        };
        // the sender went away without an answer
        answer.unwrap_or(Err(RequestError::BatchAborted { id }))
    }

    /// Drains up to `batch_size` queued requests into one batch and runs it
    /// on a spawned task. Returns the number of requests drained.
    pub fn flush(&self) -> usize {
        let batch: Vec<Request> = {
            let mut state = self.state.lock();
            let take = state.queue.len().min(self.options.batch_size);
            state.queue.drain(..take).collect()
        };
        if batch.is_empty() {
            return 0;
        }

        let size = batch.len();
        self.batches.fetch_add(1, Ordering::Relaxed);
        debug!(size, "flushing batch");

        let executor = Arc::clone(&self.executor);
        let completion = BatchCompletion {
            state: Arc::clone(&self.state),
            ids: batch.iter().map(|request| request.id).collect(),
        };
        let options = self.options.execute;

        tokio::spawn(async move {
            let outcome = executor.execute_batch(&batch, options).await;
            completion.deliver(outcome);
        });

        size
    }

    /// Spawns the periodic flush.
    pub fn spawn_flusher(self: &Arc<Self>, interval: Duration) -> PeriodicTask {
        let dispatcher = Arc::clone(self);
        PeriodicTask::spawn("batch-flush", interval, move || {
            dispatcher.flush();
            std::future::ready(())
        })
    }

    /// Stops accepting requests and rejects everything still queued with
    /// [`RequestError::ShuttingDown`]. Batches already running finish
    /// normally. Returns the number of rejected requests.
    pub fn shutdown(&self) -> usize {
        let mut state = self.state.lock();
        state.closed = true;

        let queued: Vec<Request> = state.queue.drain(..).collect();
        for request in &queued {
            if let Some(waiter) = state.waiters.remove(&request.id) {
                let _ = waiter.send(Err(RequestError::ShuttingDown));
            }
        }
        if !queued.is_empty() {
            debug!(rejected = queued.len(), "rejected queued requests on shutdown");
        }
        queued.len()
    }

    pub fn is_shut_down(&self) -> bool {
        self.state.lock().closed
    }

    /// Requests waiting in the queue, not yet drained.
    pub fn queue_depth(&self) -> usize {
        self.state.lock().queue.len()
    }

    /// Batched callers still waiting for a result, queued or in flight.
    pub fn pending_count(&self) -> usize {
        self.state.lock().waiters.len()
    }

    /// Batches drained so far.
    pub fn batches_flushed(&self) -> u64 {
        self.batches.load(Ordering::Relaxed)
    }
}
