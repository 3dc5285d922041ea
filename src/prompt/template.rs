//! Prompt rendering.
//!
//! A [`PromptTemplate`] turns a [`Conversation`] into the flat text an engine
//! consumes, and declares the stop strings and literal replacement rules that
//! belong to the template's wire format.

use super::Conversation;

/// Rendering seam between conversation state and a concrete engine format.
pub trait PromptTemplate: Send + Sync {
    /// Render the conversation to prompt text.
    ///
    /// With `omit_last_text` the trailing message is rendered as if its text
    /// were absent, which yields the byte prefix that precedes the responder
    /// output (the skip length of the visible stream).
    fn render(&self, conversation: &Conversation, omit_last_text: bool) -> String;

    /// Stop strings for this template, e.g. the opening tag of the next turn.
    fn stop_strings(&self, conversation: &Conversation) -> Vec<String>;

    /// Literal `(find, replace)` pairs applied to requester input.
    fn input_replacements(&self) -> &[(String, String)] {
        &[]
    }

    /// Literal `(find, replace)` pairs applied to engine output.
    fn output_replacements(&self) -> &[(String, String)] {
        &[]
    }
}

/// Line-oriented tagged template: `role: text\n` per completed message,
/// `role:` (no newline) for a message whose text is still absent.
pub struct TaggedTemplate {
    stop_strings: Vec<String>,
    input_replacements: Vec<(String, String)>,
    output_replacements: Vec<(String, String)>,
}

impl TaggedTemplate {
    pub fn new() -> Self {
        Self {
            stop_strings: vec!["<|endoftext|>".to_string(), "\n<".to_string()],
            input_replacements: Vec::new(),
            output_replacements: Vec::new(),
        }
    }

    pub fn with_stop_strings(mut self, stops: Vec<String>) -> Self {
        self.stop_strings = stops;
        self
    }

    pub fn with_input_replacements(mut self, rules: Vec<(String, String)>) -> Self {
        self.input_replacements = rules;
        self
    }

    pub fn with_output_replacements(mut self, rules: Vec<(String, String)>) -> Self {
        self.output_replacements = rules;
        self
    }

    fn render_message(out: &mut String, role: &str, text: Option<&str>) {
        match text {
            Some(t) if !t.is_empty() => {
                out.push_str(role);
                out.push_str(": ");
                out.push_str(t);
                out.push('\n');
            }
            // Absent or empty text renders identically: an open turn.
            _ => {
                out.push_str(role);
                out.push(':');
            }
        }
    }
}

impl Default for TaggedTemplate {
    fn default() -> Self {
        Self::new()
    }
}

impl PromptTemplate for TaggedTemplate {
    fn render(&self, conversation: &Conversation, omit_last_text: bool) -> String {
        if !conversation.chat_mode_enabled() {
            // Completion mode: the engine sees the raw last requester text.
            return conversation.last_requester_text().unwrap_or_default().to_string();
        }
        let mut out = String::from(conversation.system());
        let messages = conversation.messages();
        for (i, message) in messages.iter().enumerate() {
            let omit = omit_last_text && i + 1 == messages.len();
            let text = if omit { None } else { message.text.as_deref() };
            Self::render_message(&mut out, &message.role, text);
        }
        out
    }

    fn stop_strings(&self, _conversation: &Conversation) -> Vec<String> {
        self.stop_strings.clone()
    }

    fn input_replacements(&self) -> &[(String, String)] {
        &self.input_replacements
    }

    fn output_replacements(&self) -> &[(String, String)] {
        &self.output_replacements
    }
}
