//! Incremental text delivery: delta encoding, position-tagged chunks, and
//! the buffering replacement filter applied on the way out.

mod delta;
mod replace;

pub use delta::DeltaEncoder;
pub use replace::{apply_partial, apply_replacements, StreamingReplacer};

use serde::{Deserialize, Serialize};

/// Position of a chunk within one generation stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChunkPosition {
    Begin,
    Mid,
    End,
}

/// One unit of streamed output.
///
/// `response_text` is the cumulative filtered text so far; `updated_text` is
/// the filtered delta added by this chunk. The terminal chunk carries the
/// flushed remainder of the replacement filter.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StreamChunk {
    pub response_text: String,
    pub updated_text: String,
    pub pos: ChunkPosition,
}

/// How chunks are rendered onto the transport body.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OutputMode {
    /// Cumulative text per chunk (each frame replaces the previous one).
    FullText,
    /// Only the filtered delta per chunk (frames concatenate).
    DeltaText,
    /// Newline-delimited JSON objects carrying text, delta, and position.
    Structured,
}

impl OutputMode {
    pub fn render(&self, chunk: &StreamChunk) -> String {
        match self {
            OutputMode::FullText => chunk.response_text.clone(),
            OutputMode::DeltaText => chunk.updated_text.clone(),
            OutputMode::Structured => {
                let mut line = serde_json::to_string(chunk).unwrap_or_default();
                line.push('\n');
                line
            }
        }
    }
}
