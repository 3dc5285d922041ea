//! Runtime configuration loading from environment variables.
//!
//! All configuration values are loaded from `STREAMGATE_*` environment
//! variables with sensible defaults. Invalid values fall back to defaults
//! without crashing.
//!
//! # Environment Variables
//!
//! | Variable | Default | Description |
//! |---|---|---|
//! | `STREAMGATE_NAME` | chat_stream | Instance name reported in load snapshots |
//! | `STREAMGATE_MAX_CONCURRENT` | 2 | Simultaneous generations |
//! | `STREAMGATE_MAX_QUEUE_SIZE` | 5 | Admission bound (see pipeline docs) |
//! | `STREAMGATE_OVERFLOW_AS_429` | false | Overflow as HTTP 429 instead of 200 |
//! | `STREAMGATE_OUTPUT_MODE` | full_text | full_text / delta_text / structured |
//! | `STREAMGATE_EMIT_DELAY_MS` | 10 | Pause between streamed chunks |
//! | `STREAMGATE_TEMPERATURE` | 1.0 | Default sampling temperature |
//! | `STREAMGATE_MAX_NEW_TOKENS` | 256 | Default generation cap |
//! | `STREAMGATE_CONTEXT_LEN` | 1024 | Default context length |

use std::time::Duration;

use crate::engine::GenerationParams;
use crate::scheduler::PipelineConfig;
use crate::stream::OutputMode;

/// All runtime configuration, constructor-level or loaded from environment.
#[derive(Debug, Clone)]
pub struct RuntimeConfig {
    /// Instance name reported by the load endpoint.
    pub name: String,
    pub pipeline: PipelineConfig,
    /// Report queue overflow as HTTP 429 rather than a 200 error body.
    pub overflow_as_http_error: bool,
    pub output_mode: OutputMode,
    /// Pause between streamed chunks.
    pub emit_delay: Duration,
    pub generation: GenerationParams,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            name: "chat_stream".to_string(),
            pipeline: PipelineConfig::default(),
            overflow_as_http_error: false,
            output_mode: OutputMode::FullText,
            emit_delay: Duration::from_millis(10),
            generation: GenerationParams::default(),
        }
    }
}

/// Parse a `usize` env var, returning `default` on missing or invalid.
fn parse_usize(key: &str, default: usize) -> usize {
    match std::env::var(key) {
        Ok(val) => val.parse::<usize>().unwrap_or(default),
        Err(_) => default,
    }
}

/// Parse a `u64` env var, returning `default` on missing or invalid.
fn parse_u64(key: &str, default: u64) -> u64 {
    match std::env::var(key) {
        Ok(val) => val.parse::<u64>().unwrap_or(default),
        Err(_) => default,
    }
}

/// Parse an `f32` env var, returning `default` on missing or invalid.
fn parse_f32(key: &str, default: f32) -> f32 {
    match std::env::var(key) {
        Ok(val) => val.parse::<f32>().unwrap_or(default),
        Err(_) => default,
    }
}

/// Parse a boolean env var ("1"/"true"/"yes", case-insensitive).
fn parse_bool(key: &str, default: bool) -> bool {
    match std::env::var(key) {
        Ok(val) => matches!(val.to_ascii_lowercase().as_str(), "1" | "true" | "yes"),
        Err(_) => default,
    }
}

fn parse_output_mode(key: &str, default: OutputMode) -> OutputMode {
    match std::env::var(key).as_deref() {
        Ok("full_text") => OutputMode::FullText,
        Ok("delta_text") => OutputMode::DeltaText,
        Ok("structured") => OutputMode::Structured,
        _ => default,
    }
}

/// Load all configuration from environment variables.
///
/// Missing or invalid values fall back to safe defaults without panicking.
pub fn load() -> RuntimeConfig {
    let defaults = RuntimeConfig::default();
    let max_concurrency = parse_usize("STREAMGATE_MAX_CONCURRENT", 2).max(1);
    let max_queue_size = parse_usize("STREAMGATE_MAX_QUEUE_SIZE", 5).max(2);
    let emit_delay_ms = parse_u64("STREAMGATE_EMIT_DELAY_MS", 10);
    let temperature = parse_f32("STREAMGATE_TEMPERATURE", 1.0).clamp(0.0, 1.0);
    let max_new_tokens = parse_usize("STREAMGATE_MAX_NEW_TOKENS", 256).max(1);
    let context_len = parse_usize("STREAMGATE_CONTEXT_LEN", 1024).max(1);

    RuntimeConfig {
        name: std::env::var("STREAMGATE_NAME").unwrap_or(defaults.name),
        pipeline: PipelineConfig {
            max_concurrency,
            max_queue_size,
        },
        overflow_as_http_error: parse_bool("STREAMGATE_OVERFLOW_AS_429", false),
        output_mode: parse_output_mode("STREAMGATE_OUTPUT_MODE", OutputMode::FullText),
        emit_delay: Duration::from_millis(emit_delay_ms),
        generation: GenerationParams {
            temperature,
            max_new_tokens,
            context_len,
            ..defaults.generation
        },
    }
}
