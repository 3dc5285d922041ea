//! Buffering literal replacement over a token stream.
//!
//! Replacement patterns can span chunk boundaries, so emission must hold back
//! any trailing text that is a proper prefix of a pattern until the match is
//! decided. Rules apply in declaration order, one pass; replacement output is
//! not re-scanned.

/// Apply all rules to complete text (no holdback).
pub fn apply_replacements(text: &str, rules: &[(String, String)]) -> String {
    let mut out = text.to_string();
    for (find, replace) in rules {
        if !find.is_empty() {
            out = out.replace(find.as_str(), replace);
        }
    }
    out
}

/// Emission-time view of a growing text: rules applied to the prefix that can
/// no longer be affected by future appends, with the ambiguous suffix held
/// back. At stream end [`apply_replacements`] gives the final form.
pub fn apply_partial(text: &str, rules: &[(String, String)]) -> String {
    let hold = held_suffix_len(text, rules);
    apply_replacements(&text[..text.len() - hold], rules)
}

/// Length in bytes of the longest suffix of `text` that is a proper prefix of
/// any pattern. Computed on character boundaries.
fn held_suffix_len(text: &str, rules: &[(String, String)]) -> usize {
    let mut held = 0usize;
    for (start, _) in text.char_indices() {
        let suffix = &text[start..];
        let partial = rules.iter().any(|(find, _)| {
            find.len() > suffix.len() && find.starts_with(suffix)
        });
        if partial {
            held = text.len() - start;
            break;
        }
    }
    held
}

/// Stateful filter for delta streams: feed appended text in, get replaced
/// text out, with cross-chunk patterns buffered until resolved.
#[derive(Debug)]
pub struct StreamingReplacer {
    rules: Vec<(String, String)>,
    pending: String,
}

impl StreamingReplacer {
    pub fn new(rules: Vec<(String, String)>) -> Self {
        Self {
            rules,
            pending: String::new(),
        }
    }

    /// Feed an appended chunk; returns the text safe to emit now.
    pub fn put(&mut self, chunk: &str) -> String {
        self.pending.push_str(chunk);
        let hold = held_suffix_len(&self.pending, &self.rules);
        let emit_end = self.pending.len() - hold;
        let emitted = apply_replacements(&self.pending[..emit_end], &self.rules);
        self.pending.drain(..emit_end);
        emitted
    }

    /// Stream end: resolve and emit whatever is still held back.
    pub fn flush(&mut self) -> String {
        let emitted = apply_replacements(&self.pending, &self.rules);
        self.pending.clear();
        emitted
    }

    pub fn pending(&self) -> &str {
        &self.pending
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rules() -> Vec<(String, String)> {
        vec![("<NL>".to_string(), "\n".to_string())]
    }

    #[test]
    fn whole_pattern_in_one_chunk_is_replaced() {
        let mut r = StreamingReplacer::new(rules());
        assert_eq!(r.put("a<NL>b"), "a\nb");
        assert_eq!(r.pending(), "");
    }

    #[test]
    fn split_pattern_is_held_then_replaced() {
        let mut r = StreamingReplacer::new(rules());
        assert_eq!(r.put("a<N"), "a");
        assert_eq!(r.pending(), "<N");
        assert_eq!(r.put("L>b"), "\nb");
    }

    #[test]
    fn false_prefix_is_released_when_disambiguated() {
        let mut r = StreamingReplacer::new(rules());
        assert_eq!(r.put("x<"), "x");
        // "<z" can no longer start "<NL>", so it flows through untouched.
        assert_eq!(r.put("z"), "<z");
    }

    #[test]
    fn flush_emits_unresolved_suffix_verbatim() {
        let mut r = StreamingReplacer::new(rules());
        assert_eq!(r.put("end<N"), "end");
        assert_eq!(r.flush(), "<N");
        assert_eq!(r.pending(), "");
    }

    #[test]
    fn rules_apply_in_declaration_order() {
        let rules = vec![
            ("aa".to_string(), "b".to_string()),
            ("b".to_string(), "c".to_string()),
        ];
        // Later rules see the output of earlier ones.
        assert_eq!(apply_replacements("aab", &rules), "cc");
    }

    #[test]
    fn partial_view_matches_streaming_emission() {
        let text = "line one<NL>line two<N";
        assert_eq!(apply_partial(text, &rules()), "line one\nline two");
        assert_eq!(apply_replacements(text, &rules()), "line one\nline two<N");
    }

    #[test]
    fn multibyte_text_around_patterns() {
        let mut r = StreamingReplacer::new(rules());
        assert_eq!(r.put("こんにちは<N"), "こんにちは");
        assert_eq!(r.put("L>世界"), "\n世界");
    }
}
