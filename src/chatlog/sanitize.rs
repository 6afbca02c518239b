use crate::chatlog::message::{Message, Turn};
use regex::Regex;
use std::sync::OnceLock;

static TAG_PATTERN: OnceLock<Regex> = OnceLock::new();

fn tag_pattern() -> &'static Regex {
    TAG_PATTERN.get_or_init(|| Regex::new(r"<.*?>").expect("tag pattern is valid"))
}

fn clean_pass(text: &str) -> String {
    let decoded = html_escape::decode_html_entities(text);
    tag_pattern().replace_all(&decoded, "").into_owned()
}

/// Decodes HTML entities and strips markup tags, returning plain text.
///
/// Passes repeat until the text stops changing, so a value produced by `clean`
/// is always a fixed point. Every pass that changes the text makes it shorter,
/// which bounds the loop. Malformed markup (an unterminated `<`) is kept as-is.
pub fn clean(text: &str) -> String {
    let mut current = clean_pass(text);
    loop {
        let next = clean_pass(&current);
        if next == current {
            return current;
        }
        current = next;
    }
}

pub fn clean_message(message: Message) -> Message {
    match message {
        Message::Turn(turn) => Message::Turn(Turn {
            content: clean(&turn.content),
            ..turn
        }),
        meta @ Message::Meta(_) => meta,
    }
}

/// Cleans the content of every real turn. Metadata passes through untouched.
pub fn sanitize_history(history: Vec<Message>) -> Vec<Message> {
    history.into_iter().map(clean_message).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn decodes_entities_then_strips_tags() {
        assert_eq!(clean("<b>Fish &amp; chips</b>"), "Fish & chips");
        assert_eq!(clean("it&#39;s &quot;fine&quot;"), "it's \"fine\"");
        assert_eq!(clean("a&nbsp;b"), "a\u{a0}b");
    }

    #[test]
    fn encoded_markup_is_stripped_too() {
        assert_eq!(clean("&lt;i&gt;hello&lt;/i&gt;"), "hello");
        assert_eq!(clean("&amp;lt;b&amp;gt;x"), "x");
    }

    #[test]
    fn malformed_markup_degrades_without_panicking() {
        assert_eq!(clean("1 < 2 and <b"), "1 < 2 and <b");
        assert_eq!(clean("&lt;3 you"), "<3 you");
        assert_eq!(clean("&notanentity; &"), clean("&notanentity; &"));
    }

    #[test]
    fn clean_is_idempotent() {
        let samples = [
            "",
            "already plain text",
            "<p>para</p><br/>",
            "&amp;amp;amp;lt;tag&amp;amp;amp;gt;",
            "unterminated <div class=\"x\"",
            "math: 3 &lt; 4 &gt; 2",
            "<<nested>>",
            "&amp",
            "emoji &#x1F600; and &#128512;",
        ];
        for sample in samples {
            let once = clean(sample);
            assert_eq!(clean(&once), once, "not idempotent for {sample:?}");
        }
    }

    #[test]
    fn sanitize_history_leaves_metadata_alone() {
        let meta = Message::Meta(json!({"type": "tool_call", "data": {"content": "<b>raw</b>"}}));
        let cleaned = sanitize_history(vec![Message::user("<i>hi</i>"), meta.clone()]);
        assert_eq!(cleaned, vec![Message::user("hi"), meta]);
    }
}
