//! Prompt rendering tests: the tagged template wire format, skip-length
//! computation, and replacement rules on the way in and out.

use streamgate::prompt::{Conversation, PromptTemplate, TaggedTemplate};
use streamgate::stream::apply_replacements;

fn turing_conversation() -> Conversation {
    let mut conv = Conversation::new("<human>", "<bot>");
    conv.push_requester("Who is Alan Turing");
    conv.push_responder(None);
    conv
}

#[test]
fn open_turn_renders_without_a_trailing_newline() {
    let template = TaggedTemplate::new();
    let conv = turing_conversation();
    assert_eq!(
        template.render(&conv, false),
        "<human>: Who is Alan Turing\n<bot>:"
    );
}

#[test]
fn completed_turn_renders_with_the_answer_inline() {
    let template = TaggedTemplate::new();
    let mut conv = turing_conversation();
    conv.set_responder_last("He is a nice guy");
    assert_eq!(
        template.render(&conv, false),
        "<human>: Who is Alan Turing\n<bot>: He is a nice guy\n"
    );
}

#[test]
fn skip_length_equals_the_rendered_open_turn() {
    let template = TaggedTemplate::new();
    let mut conv = turing_conversation();
    let open_prompt = template.render(&conv, false);

    // Mid-generation the tail holds partial text; omitting it must
    // reproduce the byte prefix that precedes responder output.
    conv.set_responder_last("He is");
    assert_eq!(template.render(&conv, true), open_prompt);
    assert_eq!(template.render(&conv, true).len(), open_prompt.len());
}

#[test]
fn absent_and_empty_tail_text_render_identically() {
    let template = TaggedTemplate::new();
    let mut with_none = turing_conversation();
    let mut with_empty = turing_conversation();
    with_none.clear_last_responder();
    with_empty.set_responder_last("");
    assert_eq!(
        template.render(&with_none, false),
        template.render(&with_empty, false)
    );
}

#[test]
fn multi_turn_prompt_accumulates_history() {
    let template = TaggedTemplate::new();
    let mut conv = Conversation::new("<human>", "<bot>");
    conv.set_system("A chat between a person and an assistant.\n");
    conv.push_requester("hi");
    conv.push_responder(Some("hello".into()));
    conv.push_requester("how are you");
    conv.push_responder(None);
    assert_eq!(
        template.render(&conv, false),
        "A chat between a person and an assistant.\n\
         <human>: hi\n\
         <bot>: hello\n\
         <human>: how are you\n\
         <bot>:"
    );
}

#[test]
fn input_replacements_encode_requester_newlines() {
    let template = TaggedTemplate::new()
        .with_input_replacements(vec![("\n".to_string(), "<NL>".to_string())]);
    let encoded = apply_replacements("first line\nsecond line", template.input_replacements());
    assert_eq!(encoded, "first line<NL>second line");

    let mut conv = Conversation::new("user", "system");
    conv.push_requester(encoded);
    conv.push_responder(None);
    // The prompt stays single-line per message.
    assert_eq!(
        template.render(&conv, false),
        "user: first line<NL>second line\nsystem:"
    );
}

#[test]
fn stop_strings_come_from_the_template() {
    let template =
        TaggedTemplate::new().with_stop_strings(vec!["</s>".to_string(), "\n<".to_string()]);
    let conv = turing_conversation();
    assert_eq!(template.stop_strings(&conv), vec!["</s>", "\n<"]);
}
