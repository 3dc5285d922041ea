//! Request admission: bounded queues, concurrency permits, worker loop.

mod pipeline;
mod queue;
mod task;

pub use pipeline::{AdmissionPipeline, LoadSnapshot, PipelineConfig, SubmitError};
pub use queue::{AdmissionQueue, QueueError};
pub use task::{FinishHandler, FinishHook, RequestId, RequestTask};
