//! Generation session adapter.
//!
//! Bridges a conversation and an engine into the chunk stream a client sees:
//! render the prompt, start the engine, slice off the prompt echo, delta-encode
//! the growing text, run the replacement filter, and keep the conversation's
//! trailing responder message current as tokens are delivered.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{mpsc, Mutex as AsyncMutex};
use tokio_util::sync::CancellationToken;

use crate::engine::{EngineError, GenerationParams, SnapshotStream, TextEngine};
use crate::prompt::{Conversation, PromptTemplate};
use crate::stream::{
    apply_partial, apply_replacements, ChunkPosition, DeltaEncoder, OutputMode, StreamChunk,
    StreamingReplacer,
};

/// Why a generation finished. Exactly one reason fires per admitted request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FinishReason {
    Success,
    ClientDisconnectedBeforeStreaming,
    ClientDisconnectedWhileStreaming,
    UnknownError,
}

impl FinishReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            FinishReason::Success => "success",
            FinishReason::ClientDisconnectedBeforeStreaming => {
                "client_disconnected_before_streaming"
            }
            FinishReason::ClientDisconnectedWhileStreaming => {
                "client_disconnected_while_streaming"
            }
            FinishReason::UnknownError => "unknown_error_occurred",
        }
    }
}

impl std::fmt::Display for FinishReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Called exactly once when a generation reaches a terminal state.
pub type FinishCallback = Arc<dyn Fn(FinishReason) + Send + Sync>;

/// Factory for per-request generations; owns the engine/template pair.
pub struct GenerationSession {
    engine: Arc<dyn TextEngine>,
    template: Arc<dyn PromptTemplate>,
    emit_delay: Duration,
}

impl GenerationSession {
    pub fn new(
        engine: Arc<dyn TextEngine>,
        template: Arc<dyn PromptTemplate>,
        emit_delay: Duration,
    ) -> Self {
        Self {
            engine,
            template,
            emit_delay,
        }
    }

    pub fn template(&self) -> &Arc<dyn PromptTemplate> {
        &self.template
    }

    /// Render the prompt and start the engine.
    ///
    /// A startup failure here happens before any output and propagates to the
    /// caller; once `begin` returns, errors no longer can.
    pub async fn begin(
        &self,
        conversation: Arc<AsyncMutex<Conversation>>,
        mut params: GenerationParams,
        cancel: CancellationToken,
    ) -> Result<ActiveGeneration, EngineError> {
        let (prompt, skip_len, chat_mode) = {
            let conv = conversation.lock().await;
            let prompt = self.template.render(&conv, false);
            let chat_mode = conv.chat_mode_enabled();
            let skip_len = if chat_mode {
                // Byte length of everything that precedes responder output.
                self.template.render(&conv, true).len()
            } else {
                0
            };
            if chat_mode {
                params.stop_strings = self.template.stop_strings(&conv);
            }
            (prompt, skip_len, chat_mode)
        };
        tracing::debug!(prompt_len = prompt.len(), skip_len, "starting generation");
        let snapshots = self.engine.start(&prompt, &params, cancel.clone()).await?;
        let rules = self.template.output_replacements().to_vec();
        Ok(ActiveGeneration {
            snapshots,
            conversation,
            cancel,
            skip_len,
            chat_mode,
            delta: DeltaEncoder::new(),
            replacer: StreamingReplacer::new(rules.clone()),
            rules,
            emit_delay: self.emit_delay,
        })
    }
}

/// One in-flight generation, ready to be driven to completion.
pub struct ActiveGeneration {
    snapshots: SnapshotStream,
    conversation: Arc<AsyncMutex<Conversation>>,
    cancel: CancellationToken,
    skip_len: usize,
    chat_mode: bool,
    delta: DeltaEncoder,
    replacer: StreamingReplacer,
    rules: Vec<(String, String)>,
    emit_delay: Duration,
}

impl ActiveGeneration {
    /// Pump snapshots into `sink` until the engine finishes or the client
    /// goes away, then fire `finished` with the terminal reason.
    ///
    /// The conversation's trailing responder text is updated only after a
    /// chunk was delivered, so history never runs ahead of what the client
    /// received. The terminal chunk (pos = end) flushes the replacement
    /// filter and is emitted even when the stream stopped immediately.
    pub async fn drive(mut self, sink: mpsc::Sender<String>, mode: OutputMode, finished: FinishCallback) {
        let mut delivered = String::new();
        let mut index = 0usize;
        while let Some(item) = self.snapshots.next().await {
            let full = match item {
                Ok(full) => full,
                Err(err) => {
                    // Output already started; nothing to return to the
                    // caller. Still close the stream with a terminal chunk so
                    // held-back filter text is not lost.
                    tracing::warn!(error = %err, "engine failed mid-generation");
                    let end = StreamChunk {
                        response_text: apply_replacements(&delivered, &self.rules),
                        updated_text: self.replacer.flush(),
                        pos: ChunkPosition::End,
                    };
                    let _ = sink.send(mode.render(&end)).await;
                    finished(FinishReason::UnknownError);
                    return;
                }
            };
            if self.cancel.is_cancelled() {
                finished(FinishReason::ClientDisconnectedWhileStreaming);
                return;
            }
            let visible = self.visible_text(&full);
            let delta = self.delta.advance(&visible);
            let chunk = StreamChunk {
                response_text: apply_partial(&visible, &self.rules),
                updated_text: self.replacer.put(&delta),
                pos: if index == 0 { ChunkPosition::Begin } else { ChunkPosition::Mid },
            };
            if sink.send(mode.render(&chunk)).await.is_err() {
                self.cancel.cancel();
                finished(FinishReason::ClientDisconnectedWhileStreaming);
                return;
            }
            if self.chat_mode {
                self.conversation.lock().await.set_responder_last(visible.clone());
            }
            delivered = visible;
            index += 1;
            if !self.emit_delay.is_zero() {
                tokio::time::sleep(self.emit_delay).await;
            }
        }
        if self.cancel.is_cancelled() {
            finished(FinishReason::ClientDisconnectedWhileStreaming);
            return;
        }
        let end = StreamChunk {
            response_text: apply_replacements(&delivered, &self.rules),
            updated_text: self.replacer.flush(),
            pos: ChunkPosition::End,
        };
        if sink.send(mode.render(&end)).await.is_err() {
            finished(FinishReason::ClientDisconnectedWhileStreaming);
            return;
        }
        tracing::debug!(chunks = index + 1, "generation stream complete");
        finished(FinishReason::Success);
    }

    fn visible_text(&self, full: &str) -> String {
        if !self.chat_mode {
            return full.to_string();
        }
        full.get(self.skip_len..).unwrap_or_default().trim().to_string()
    }
}
