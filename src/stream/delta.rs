//! Suffix delta encoding over a growing full-text snapshot stream.

/// Tracks the previously seen full text and emits only the appended suffix.
///
/// Snapshots normally grow monotonically. The one legal shrink is terminal
/// stop-string truncation, for which the encoder emits an empty delta and
/// resets to the truncated text.
#[derive(Debug, Default)]
pub struct DeltaEncoder {
    previous: String,
}

impl DeltaEncoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Consume the next full-text snapshot and return the delta.
    pub fn advance(&mut self, full_text: &str) -> String {
        // `get` fails both on shrink and on a non-boundary index; either way
        // the snapshot is not an append and the delta is empty.
        let delta = full_text
            .get(self.previous.len()..)
            .unwrap_or_default()
            .to_string();
        self.previous.clear();
        self.previous.push_str(full_text);
        delta
    }

    /// The last snapshot seen.
    pub fn previous(&self) -> &str {
        &self.previous
    }

    pub fn reset(&mut self) {
        self.previous.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn emits_appended_suffixes() {
        let mut enc = DeltaEncoder::new();
        assert_eq!(enc.advance("Hel"), "Hel");
        assert_eq!(enc.advance("Hello wo"), "lo wo");
        assert_eq!(enc.advance("Hello world"), "rld");
    }

    #[test]
    fn identical_snapshot_yields_empty_delta() {
        let mut enc = DeltaEncoder::new();
        enc.advance("abc");
        assert_eq!(enc.advance("abc"), "");
    }

    #[test]
    fn shrink_emits_empty_delta_and_resets() {
        let mut enc = DeltaEncoder::new();
        assert_eq!(enc.advance("abc"), "abc");
        assert_eq!(enc.advance("ab"), "");
        assert_eq!(enc.previous(), "ab");
        // Growth resumes from the truncated text.
        assert_eq!(enc.advance("abXY"), "XY");
    }

    #[test]
    fn multibyte_appends_stay_on_char_boundaries() {
        let mut enc = DeltaEncoder::new();
        assert_eq!(enc.advance("こん"), "こん");
        assert_eq!(enc.advance("こんにちは"), "にちは");
    }
}
