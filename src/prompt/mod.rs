//! Conversation state: an ordered, role-tagged message history.
//!
//! A [`Conversation`] holds the requester/responder turns for one chat
//! session. Mutating operations on a mismatched or empty tail are defensive
//! no-ops so that a structural edge case can never abort a stream mid-flight.

mod template;

pub use template::{PromptTemplate, TaggedTemplate};

use serde::{Deserialize, Serialize};

/// A single message in a conversation.
///
/// `text == None` marks a placeholder for an in-flight responder turn that
/// has not produced output yet.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    pub role: String,
    pub text: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
}

/// Ordered message history plus the rendering identity of both parties.
///
/// Turns are expected to alternate (requester message followed by a responder
/// placeholder). Alternation is a caller contract, not enforced here.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Conversation {
    system: String,
    messages: Vec<Message>,
    requester: String,
    responder: String,
    chat_mode: bool,
}

impl Conversation {
    /// Create an empty conversation with the given role tags.
    pub fn new(requester: impl Into<String>, responder: impl Into<String>) -> Self {
        Self {
            system: String::new(),
            messages: Vec::new(),
            requester: requester.into(),
            responder: responder.into(),
            chat_mode: true,
        }
    }

    pub fn set_system(&mut self, system: impl Into<String>) {
        self.system = system.into();
    }

    pub fn system(&self) -> &str {
        &self.system
    }

    pub fn requester_role(&self) -> &str {
        &self.requester
    }

    pub fn responder_role(&self) -> &str {
        &self.responder
    }

    pub fn set_chat_mode_enabled(&mut self, enabled: bool) {
        self.chat_mode = enabled;
    }

    pub fn chat_mode_enabled(&self) -> bool {
        self.chat_mode
    }

    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    /// Number of completed or in-flight turns (= requester messages).
    pub fn turn_count(&self) -> usize {
        self.messages.iter().filter(|m| m.role == self.requester).count()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    /// Append a requester message.
    pub fn push_requester(&mut self, text: impl Into<String>) {
        self.messages.push(Message {
            role: self.requester.clone(),
            text: Some(text.into()),
            id: None,
        });
    }

    /// Append a responder message; `None` is the in-flight placeholder.
    pub fn push_responder(&mut self, text: Option<String>) {
        self.messages.push(Message {
            role: self.responder.clone(),
            text,
            id: None,
        });
    }

    pub fn last_requester_text(&self) -> Option<&str> {
        self.messages
            .iter()
            .rev()
            .find(|m| m.role == self.requester)
            .and_then(|m| m.text.as_deref())
    }

    pub fn last_responder_text(&self) -> Option<&str> {
        self.messages
            .iter()
            .rev()
            .find(|m| m.role == self.responder)
            .and_then(|m| m.text.as_deref())
    }

    /// Replace the text of the trailing responder message.
    /// No-op when the tail is missing or not a responder message.
    pub fn set_responder_last(&mut self, text: impl Into<String>) {
        if let Some(last) = self.messages.last_mut() {
            if last.role == self.responder {
                last.text = Some(text.into());
            }
        }
    }

    /// Reset the trailing responder message back to the in-flight placeholder
    /// (used by regenerate). No-op when the tail is not a responder message.
    pub fn clear_last_responder(&mut self) {
        if let Some(last) = self.messages.last_mut() {
            if last.role == self.responder {
                last.text = None;
            }
        }
    }

    /// Pop the trailing message if it is a requester message.
    pub fn remove_last_requester(&mut self) {
        if self.messages.last().map(|m| m.role == self.requester).unwrap_or(false) {
            self.messages.pop();
        }
    }

    /// Pop the trailing message if it is a responder message.
    pub fn remove_last_responder(&mut self) {
        if self.messages.last().map(|m| m.role == self.responder).unwrap_or(false) {
            self.messages.pop();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn conv() -> Conversation {
        Conversation::new("<human>", "<bot>")
    }

    #[test]
    fn turn_count_counts_requester_messages() {
        let mut c = conv();
        assert_eq!(c.turn_count(), 0);
        c.push_requester("hi");
        c.push_responder(None);
        assert_eq!(c.turn_count(), 1);
        c.push_requester("again");
        c.push_responder(Some("sure".into()));
        assert_eq!(c.turn_count(), 2);
    }

    #[test]
    fn set_responder_last_is_noop_on_requester_tail() {
        let mut c = conv();
        c.push_requester("hi");
        c.set_responder_last("should not land");
        assert_eq!(c.last_requester_text(), Some("hi"));
        assert_eq!(c.last_responder_text(), None);
    }

    #[test]
    fn mutations_on_empty_conversation_do_not_panic() {
        let mut c = conv();
        c.set_responder_last("x");
        c.clear_last_responder();
        c.remove_last_requester();
        c.remove_last_responder();
        assert!(c.is_empty());
    }

    #[test]
    fn remove_last_pops_only_matching_role() {
        let mut c = conv();
        c.push_requester("q");
        c.push_responder(Some("a".into()));
        c.remove_last_requester(); // tail is responder: no-op
        assert_eq!(c.messages().len(), 2);
        c.remove_last_responder();
        assert_eq!(c.messages().len(), 1);
    }

    #[test]
    fn clear_last_responder_resets_placeholder() {
        let mut c = conv();
        c.push_requester("q");
        c.push_responder(Some("a".into()));
        c.clear_last_responder();
        assert_eq!(c.messages().last().unwrap().text, None);
    }

    #[test]
    fn serde_roundtrip_preserves_history() {
        let mut c = conv();
        c.set_system("preamble\n");
        c.push_requester("q");
        c.push_responder(None);
        let json = serde_json::to_string(&c).unwrap();
        let back: Conversation = serde_json::from_str(&json).unwrap();
        assert_eq!(back.messages(), c.messages());
        assert_eq!(back.system(), "preamble\n");
        assert!(back.chat_mode_enabled());
    }
}
