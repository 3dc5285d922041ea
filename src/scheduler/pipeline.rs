//! Three-queue admission pipeline with a single worker loop.
//!
//! Requests flow request queue → next-run queue → processing queue. The
//! request queue absorbs bursts and overflows fast; the next-run queue holds
//! the handful of requests contending for a concurrency permit; the
//! processing queue is bookkeeping for the live set. A counting semaphore is
//! the actual concurrency limit; permits travel inside the finish hook.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use serde::Serialize;
use thiserror::Error;
use tokio::sync::{oneshot, Semaphore};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::api::{ApiRequest, ApiResponse};
use crate::generation::FinishReason;
use crate::handler::{HandlerError, RequestHandler};

use super::queue::AdmissionQueue;
use super::task::{FinishHandler, FinishHook, RequestId, RequestTask};

#[derive(Debug, Clone, Copy)]
pub struct PipelineConfig {
    /// Concurrency permits (simultaneous generations).
    pub max_concurrency: usize,
    /// Admission bound; the request queue holds `max_queue_size - 1`.
    pub max_queue_size: usize,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            max_concurrency: 2,
            max_queue_size: 5,
        }
    }
}

impl PipelineConfig {
    /// Clamp to workable bounds (at least one permit, at least one queue slot).
    pub fn normalized(mut self) -> Self {
        self.max_concurrency = self.max_concurrency.max(1);
        self.max_queue_size = self.max_queue_size.max(2);
        self
    }
}

/// Point-in-time occupancy, shaped for the load endpoint.
#[derive(Debug, Clone, Serialize)]
pub struct LoadSnapshot {
    pub processing: usize,
    pub waiting: usize,
    pub max_processing: usize,
    pub max_waiting: usize,
    pub num_in_next_run_queue: usize,
    pub num_in_request_queue: usize,
}

#[derive(Debug, Error)]
pub enum SubmitError {
    #[error("request queue is full")]
    QueueFull,
}

pub struct AdmissionPipeline {
    request_queue: Arc<AdmissionQueue<RequestTask>>,
    next_run_queue: Arc<AdmissionQueue<RequestTask>>,
    processing_queue: Arc<AdmissionQueue<RequestId>>,
    permits: Arc<Semaphore>,
    next_id: AtomicU64,
    on_finish: parking_lot::Mutex<Option<FinishHandler>>,
    config: PipelineConfig,
}

impl AdmissionPipeline {
    pub fn new(config: PipelineConfig) -> Self {
        let config = config.normalized();
        Self {
            request_queue: Arc::new(AdmissionQueue::new(config.max_queue_size - 1)),
            next_run_queue: Arc::new(AdmissionQueue::new(config.max_concurrency + 1)),
            processing_queue: Arc::new(AdmissionQueue::new(config.max_concurrency)),
            permits: Arc::new(Semaphore::new(config.max_concurrency)),
            next_id: AtomicU64::new(1),
            on_finish: parking_lot::Mutex::new(None),
            config,
        }
    }

    /// Register an observer called once per finished request. Must be set
    /// before the worker starts to be seen by all requests.
    pub fn set_on_finish(&self, handler: FinishHandler) {
        *self.on_finish.lock() = Some(handler);
    }

    /// Admit a request. Returns the slot the caller awaits, or fails fast
    /// with no worker interaction when the request queue is full.
    pub fn submit(
        &self,
        request: ApiRequest,
    ) -> Result<oneshot::Receiver<ApiResponse>, SubmitError> {
        let id = RequestId(self.next_id.fetch_add(1, Ordering::Relaxed));
        let (result_tx, result_rx) = oneshot::channel();
        let task = RequestTask {
            id,
            request,
            result_tx,
        };
        match self.request_queue.try_push(task) {
            Ok(()) => {
                tracing::debug!(id = %id, "request admitted to queue");
                Ok(result_rx)
            }
            Err(_) => {
                tracing::info!(id = %id, "request rejected: queue full");
                Err(SubmitError::QueueFull)
            }
        }
    }

    /// Spawn the worker loop. Returns a handle for shutdown.
    pub fn spawn_worker(
        self: &Arc<Self>,
        handler: Arc<dyn RequestHandler>,
        shutdown: CancellationToken,
    ) -> JoinHandle<()> {
        let pipeline = Arc::clone(self);
        tokio::spawn(async move {
            pipeline.worker_loop(handler, shutdown).await;
        })
    }

    async fn worker_loop(&self, handler: Arc<dyn RequestHandler>, shutdown: CancellationToken) {
        loop {
            let task = tokio::select! {
                biased;
                () = shutdown.cancelled() => {
                    tracing::info!("admission worker: shutdown signal received");
                    break;
                }
                task = self.request_queue.pop() => task,
            };
            // Sized so the hand-off from the request queue always fits.
            if self.next_run_queue.try_push(task).is_err() {
                tracing::error!("next-run queue rejected a hand-off; worker stopping");
                break;
            }
            let permit = tokio::select! {
                biased;
                () = shutdown.cancelled() => {
                    tracing::info!("admission worker: shutdown while waiting for a permit");
                    break;
                }
                permit = self.permits.clone().acquire_owned() => match permit {
                    Ok(p) => p,
                    Err(_) => break,
                },
            };
            let task = self.next_run_queue.pop().await;
            let _ = self.processing_queue.try_push(task.id);
            let hook = FinishHook::new(
                task.id,
                permit,
                Arc::clone(&self.processing_queue),
                self.on_finish.lock().clone(),
            );
            self.execute(handler.as_ref(), task, hook).await;
        }
    }

    /// Run the handler for one admitted request and deliver its result.
    ///
    /// The handler either takes ownership of the hook (streaming continues
    /// after this returns) or fails, in which case the hook fires here so
    /// the permit can never leak.
    async fn execute(&self, handler: &dyn RequestHandler, task: RequestTask, hook: FinishHook) {
        let RequestTask {
            id,
            request,
            result_tx,
        } = task;
        let response = match handler.process_request(request, hook.clone()).await {
            Ok(response) => response,
            Err(HandlerError::ClientDisconnected) => {
                tracing::debug!(id = %id, "client disconnected before streaming");
                hook.invoke(FinishReason::ClientDisconnectedBeforeStreaming);
                ApiResponse::client_disconnected()
            }
            Err(err) => {
                tracing::warn!(id = %id, error = %err, "request handler failed");
                hook.invoke(FinishReason::UnknownError);
                ApiResponse::internal_error()
            }
        };
        // The submitting caller may itself be gone; the hook still governs
        // the permit either way.
        let _ = result_tx.send(response);
    }

    pub fn load(&self) -> LoadSnapshot {
        let num_request = self.request_queue.len();
        let num_next_run = self.next_run_queue.len();
        LoadSnapshot {
            processing: self.processing_queue.len(),
            waiting: num_request + num_next_run,
            max_processing: self.config.max_concurrency,
            max_waiting: self.request_queue.capacity() + self.next_run_queue.capacity(),
            num_in_next_run_queue: num_next_run,
            num_in_request_queue: num_request,
        }
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }
}
