//! External text-engine seam.
//!
//! An engine consumes a rendered prompt and produces a stream of growing
//! full-text snapshots (prompt echo included). Everything model-specific
//! lives behind [`TextEngine`]; the runtime only sees snapshots.

pub mod mock;
mod params;

pub use params::{GenerationOverrides, GenerationParams, ParamsError};

use async_trait::async_trait;
use thiserror::Error;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

#[derive(Debug, Error)]
pub enum EngineError {
    /// Generation could not start; surfaces to the caller as a request error.
    #[error("engine failed to start generation: {0}")]
    Startup(String),
    /// Generation failed after output had begun.
    #[error("engine failed mid-generation: {0}")]
    Generation(String),
}

/// Receiving half of a snapshot channel.
pub struct SnapshotStream {
    receiver: mpsc::Receiver<Result<String, EngineError>>,
}

impl SnapshotStream {
    /// Create a bounded snapshot channel.
    pub fn channel(buffer: usize) -> (SnapshotSender, SnapshotStream) {
        let (tx, rx) = mpsc::channel(buffer.max(1));
        (SnapshotSender { sender: tx }, SnapshotStream { receiver: rx })
    }

    /// Next snapshot; `None` means the engine finished (or gave up after a
    /// reported error).
    pub async fn next(&mut self) -> Option<Result<String, EngineError>> {
        self.receiver.recv().await
    }
}

impl futures::Stream for SnapshotStream {
    type Item = Result<String, EngineError>;

    fn poll_next(
        mut self: std::pin::Pin<&mut Self>,
        cx: &mut std::task::Context<'_>,
    ) -> std::task::Poll<Option<Self::Item>> {
        self.receiver.poll_recv(cx)
    }
}

/// Sending half used by engine implementations.
#[derive(Clone)]
pub struct SnapshotSender {
    sender: mpsc::Sender<Result<String, EngineError>>,
}

impl SnapshotSender {
    /// Send one full-text snapshot. `Err` means the consumer is gone and
    /// generation should stop.
    pub async fn send(&self, full_text: String) -> Result<(), StreamClosed> {
        self.sender.send(Ok(full_text)).await.map_err(|_| StreamClosed)
    }

    /// Report a mid-generation failure and end the stream.
    pub async fn fail(self, error: EngineError) {
        let _ = self.sender.send(Err(error)).await;
    }
}

/// The consumer dropped the stream.
#[derive(Debug, Error)]
#[error("snapshot stream closed by consumer")]
pub struct StreamClosed;

/// A text generation backend.
#[async_trait]
pub trait TextEngine: Send + Sync {
    /// Begin generating for `prompt`. The returned stream yields growing
    /// full-text snapshots. Implementations should observe `cancel` and stop
    /// emitting promptly once it fires.
    async fn start(
        &self,
        prompt: &str,
        params: &GenerationParams,
        cancel: CancellationToken,
    ) -> Result<SnapshotStream, EngineError>;
}
