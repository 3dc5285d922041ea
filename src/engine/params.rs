//! Generation parameters and per-session overrides.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Effective sampling parameters handed to the engine.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GenerationParams {
    pub temperature: f32,
    pub max_new_tokens: usize,
    pub context_len: usize,
    pub top_k: Option<u32>,
    pub top_p: Option<f32>,
    pub repetition_penalty: Option<f32>,
    /// Filled from the active prompt template at request time.
    #[serde(default)]
    pub stop_strings: Vec<String>,
}

impl Default for GenerationParams {
    fn default() -> Self {
        Self {
            temperature: 1.0,
            max_new_tokens: 256,
            context_len: 1024,
            top_k: Some(50),
            top_p: Some(1.0),
            repetition_penalty: None,
            stop_strings: Vec::new(),
        }
    }
}

impl GenerationParams {
    /// Layer session-level overrides on top of the runtime defaults.
    pub fn apply_overrides(&mut self, overrides: &GenerationOverrides) {
        if let Some(t) = overrides.temperature {
            self.temperature = t;
        }
        if let Some(k) = overrides.top_k {
            self.top_k = Some(k);
        }
        if let Some(p) = overrides.top_p {
            self.top_p = Some(p);
        }
    }
}

/// Sparse per-session overrides, validated on write.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct GenerationOverrides {
    pub temperature: Option<f32>,
    pub top_k: Option<u32>,
    pub top_p: Option<f32>,
}

#[derive(Debug, Error, PartialEq)]
pub enum ParamsError {
    #[error("temperature must be within 0.0..=1.0, got {0}")]
    Temperature(f32),
    #[error("top_k must be within 1..=500, got {0}")]
    TopK(u32),
    #[error("top_p must be within 0.0..=1.0, got {0}")]
    TopP(f32),
}

impl GenerationOverrides {
    pub fn validate(&self) -> Result<(), ParamsError> {
        if let Some(t) = self.temperature {
            if !(0.0..=1.0).contains(&t) {
                return Err(ParamsError::Temperature(t));
            }
        }
        if let Some(k) = self.top_k {
            if !(1..=500).contains(&k) {
                return Err(ParamsError::TopK(k));
            }
        }
        if let Some(p) = self.top_p {
            if !(0.0..=1.0).contains(&p) {
                return Err(ParamsError::TopP(p));
            }
        }
        Ok(())
    }
}
