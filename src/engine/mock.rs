//! Canned-response engine for development and tests.
//!
//! Streams a prompt echo plus one of a rotating set of phrases, one word per
//! snapshot, honoring stop strings and cancellation. Lets the whole admission
//! and streaming path run without a model.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use super::{EngineError, GenerationParams, SnapshotStream, TextEngine};

pub struct MockEngine {
    phrases: Vec<String>,
    delay: Duration,
    calls: AtomicUsize,
}

impl MockEngine {
    pub fn new(phrases: Vec<String>, delay: Duration) -> Self {
        Self {
            phrases,
            delay,
            calls: AtomicUsize::new(0),
        }
    }

    /// Rotating default phrases with a short inter-word delay.
    pub fn with_default_phrases() -> Self {
        Self::new(
            vec![
                "Hello! This is a canned reply streamed one word at a time.".to_string(),
                "The mock engine exercises the full admission and delivery path.".to_string(),
                "Each response rotates through a fixed set of phrases.".to_string(),
            ],
            Duration::from_millis(20),
        )
    }
}

#[async_trait]
impl TextEngine for MockEngine {
    async fn start(
        &self,
        prompt: &str,
        params: &GenerationParams,
        cancel: CancellationToken,
    ) -> Result<SnapshotStream, EngineError> {
        if self.phrases.is_empty() {
            return Err(EngineError::Startup("mock engine has no phrases".into()));
        }
        let turn = self.calls.fetch_add(1, Ordering::Relaxed);
        let line = self.phrases[turn % self.phrases.len()].clone();
        let prompt = prompt.to_string();
        let stops = params.stop_strings.clone();
        let max_new_tokens = params.max_new_tokens;
        let delay = self.delay;

        let (tx, stream) = SnapshotStream::channel(16);
        tokio::spawn(async move {
            let mut text = prompt.clone();
            for (i, word) in line.split(' ').take(max_new_tokens.max(1)).enumerate() {
                if cancel.is_cancelled() {
                    return;
                }
                if i > 0 {
                    text.push(' ');
                }
                text.push_str(word);

                // Stop strings only apply to generated text, never the echo.
                let mut snapshot = text.clone();
                let mut stopped = false;
                for stop in &stops {
                    if let Some(pos) = snapshot[prompt.len()..].find(stop.as_str()) {
                        snapshot.truncate(prompt.len() + pos);
                        stopped = true;
                    }
                }
                if tx.send(snapshot).await.is_err() || stopped {
                    return;
                }
                if !delay.is_zero() {
                    tokio::time::sleep(delay).await;
                }
            }
        });
        Ok(stream)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn collect(mut stream: SnapshotStream) -> Vec<String> {
        let mut out = Vec::new();
        while let Some(item) = stream.next().await {
            out.push(item.unwrap());
        }
        out
    }

    #[tokio::test]
    async fn snapshots_grow_from_the_prompt_echo() {
        let engine = MockEngine::new(vec!["one two three".into()], Duration::ZERO);
        let stream = engine
            .start("PROMPT:", &GenerationParams::default(), CancellationToken::new())
            .await
            .unwrap();
        let snaps = collect(stream).await;
        assert_eq!(snaps[0], "PROMPT:one");
        assert_eq!(snaps.last().unwrap(), "PROMPT:one two three");
        for pair in snaps.windows(2) {
            assert!(pair[1].starts_with(&pair[0]));
        }
    }

    #[tokio::test]
    async fn stop_string_truncates_and_ends_the_stream() {
        let engine = MockEngine::new(vec!["alpha STOP beta".into()], Duration::ZERO);
        let params = GenerationParams {
            stop_strings: vec!["STOP".into()],
            ..GenerationParams::default()
        };
        let stream = engine
            .start("p:", &params, CancellationToken::new())
            .await
            .unwrap();
        let snaps = collect(stream).await;
        assert_eq!(snaps.last().unwrap(), "p:alpha ");
    }

    #[tokio::test]
    async fn cancellation_stops_emission() {
        let engine = MockEngine::new(
            vec!["w1 w2 w3 w4 w5 w6 w7 w8".into()],
            Duration::from_millis(5),
        );
        let cancel = CancellationToken::new();
        let mut stream = engine
            .start("p:", &GenerationParams::default(), cancel.clone())
            .await
            .unwrap();
        let first = stream.next().await.unwrap().unwrap();
        assert_eq!(first, "p:w1");
        cancel.cancel();
        let mut rest = 0;
        while stream.next().await.is_some() {
            rest += 1;
        }
        assert!(rest < 7, "engine kept emitting after cancel");
    }

    #[tokio::test]
    async fn phrases_rotate_per_call() {
        let engine = MockEngine::new(vec!["first".into(), "second".into()], Duration::ZERO);
        let params = GenerationParams::default();
        let a = collect(engine.start("", &params, CancellationToken::new()).await.unwrap()).await;
        let b = collect(engine.start("", &params, CancellationToken::new()).await.unwrap()).await;
        assert_eq!(a.last().unwrap(), "first");
        assert_eq!(b.last().unwrap(), "second");
    }
}
