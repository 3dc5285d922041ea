//! Queued request tasks and the once-only finish hook.

use std::sync::Arc;

use tokio::sync::{oneshot, OwnedSemaphorePermit};

use crate::api::{ApiRequest, ApiResponse};
use crate::generation::FinishReason;

use super::queue::AdmissionQueue;

/// Monotonic id assigned at admission.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RequestId(pub u64);

impl std::fmt::Display for RequestId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "req-{}", self.0)
    }
}

/// A request travelling through the pipeline, paired with the slot that the
/// submitting caller is awaiting.
pub struct RequestTask {
    pub id: RequestId,
    pub request: ApiRequest,
    pub result_tx: oneshot::Sender<ApiResponse>,
}

/// Pipeline-level observer invoked once per finished request.
pub type FinishHandler = Arc<dyn Fn(RequestId, FinishReason) + Send + Sync>;

struct HookInner {
    id: RequestId,
    permit: OwnedSemaphorePermit,
    processing: Arc<AdmissionQueue<RequestId>>,
    on_finish: Option<FinishHandler>,
}

/// Once-only completion hook for one admitted request.
///
/// Invoking it releases the concurrency permit, removes the request from the
/// processing queue, and notifies the registered finish handler, in that
/// order. Second and later invocations are no-ops, so every exit path can
/// call it unconditionally.
#[derive(Clone)]
pub struct FinishHook {
    inner: Arc<parking_lot::Mutex<Option<HookInner>>>,
}

impl FinishHook {
    pub(super) fn new(
        id: RequestId,
        permit: OwnedSemaphorePermit,
        processing: Arc<AdmissionQueue<RequestId>>,
        on_finish: Option<FinishHandler>,
    ) -> Self {
        Self {
            inner: Arc::new(parking_lot::Mutex::new(Some(HookInner {
                id,
                permit,
                processing,
                on_finish,
            }))),
        }
    }

    pub fn invoke(&self, reason: FinishReason) {
        let Some(inner) = self.inner.lock().take() else {
            tracing::trace!("finish hook invoked again; ignoring");
            return;
        };
        tracing::debug!(id = %inner.id, reason = %reason, "request finished");
        drop(inner.permit);
        inner.processing.remove_where(|id| *id == inner.id);
        if let Some(on_finish) = inner.on_finish {
            on_finish(inner.id, reason);
        }
    }

    /// Whether the hook already fired.
    pub fn is_spent(&self) -> bool {
        self.inner.lock().is_none()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tokio::sync::Semaphore;

    fn hook(counter: Arc<AtomicUsize>) -> (FinishHook, Arc<Semaphore>, Arc<AdmissionQueue<RequestId>>) {
        let semaphore = Arc::new(Semaphore::new(1));
        let permit = semaphore.clone().try_acquire_owned().unwrap();
        let processing = Arc::new(AdmissionQueue::new(1));
        processing.try_push(RequestId(7)).unwrap();
        let on_finish: FinishHandler = Arc::new(move |_, _| {
            counter.fetch_add(1, Ordering::SeqCst);
        });
        (
            FinishHook::new(RequestId(7), permit, processing.clone(), Some(on_finish)),
            semaphore,
            processing,
        )
    }

    #[tokio::test]
    async fn invoke_releases_permit_and_processing_slot() {
        let calls = Arc::new(AtomicUsize::new(0));
        let (hook, semaphore, processing) = self::hook(calls.clone());
        assert_eq!(semaphore.available_permits(), 0);
        hook.invoke(FinishReason::Success);
        assert_eq!(semaphore.available_permits(), 1);
        assert!(processing.is_empty());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert!(hook.is_spent());
    }

    #[tokio::test]
    async fn second_invoke_is_a_noop() {
        let calls = Arc::new(AtomicUsize::new(0));
        let (hook, semaphore, _) = self::hook(calls.clone());
        hook.invoke(FinishReason::Success);
        hook.clone().invoke(FinishReason::UnknownError);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(semaphore.available_permits(), 1);
    }
}
