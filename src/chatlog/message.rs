use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
    System,
}

impl Role {
    pub fn as_str(self) -> &'static str {
        match self {
            Role::User => "user",
            Role::Assistant => "assistant",
            Role::System => "system",
        }
    }

    fn parse(raw: &str) -> Option<Self> {
        match raw {
            "user" => Some(Role::User),
            "assistant" => Some(Role::Assistant),
            "system" => Some(Role::System),
            _ => None,
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A real conversational turn.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Turn {
    pub role: Role,
    pub content: String,
}

impl Turn {
    pub fn new(role: Role, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
        }
    }
}

/// One record of a transcript: either a real turn or metadata kept verbatim
/// (tool calls, recommendations, anything without a usable role/content pair).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(from = "Value", into = "Value")]
pub enum Message {
    Turn(Turn),
    Meta(Value),
}

pub type ChatHistory = Vec<Message>;

#[cfg(test)]
impl Message {
    pub fn user(content: impl Into<String>) -> Self {
        Message::Turn(Turn::new(Role::User, content))
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Message::Turn(Turn::new(Role::Assistant, content))
    }

    pub fn system(content: impl Into<String>) -> Self {
        Message::Turn(Turn::new(Role::System, content))
    }
}

impl Message {
    pub fn as_turn(&self) -> Option<&Turn> {
        match self {
            Message::Turn(turn) => Some(turn),
            Message::Meta(_) => None,
        }
    }

    pub fn is_real(&self) -> bool {
        matches!(self, Message::Turn(_))
    }

    pub fn is_user_turn(&self) -> bool {
        matches!(self, Message::Turn(turn) if turn.role == Role::User)
    }
}

fn real_parts(object: &Map<String, Value>) -> Option<(Role, &str)> {
    let role = object.get("role").and_then(Value::as_str).and_then(Role::parse)?;
    let content = object.get("content").and_then(Value::as_str)?;
    Some((role, content))
}

/// Turns a raw transcript record into a [`Message`]. A record is a real turn
/// when it is an object with a known `role` and a string `content`; extra
/// fields on a real turn are dropped. Anything else is kept as metadata.
pub fn classify(value: Value) -> Message {
    let parts = value
        .as_object()
        .and_then(real_parts)
        .map(|(role, content)| Turn::new(role, content));
    match parts {
        Some(turn) => Message::Turn(turn),
        None => Message::Meta(value),
    }
}

impl From<Value> for Message {
    fn from(value: Value) -> Self {
        classify(value)
    }
}

impl From<Message> for Value {
    fn from(message: Message) -> Self {
        match message {
            Message::Turn(turn) => serde_json::json!({
                "role": turn.role.as_str(),
                "content": turn.content,
            }),
            Message::Meta(value) => value,
        }
    }
}

pub fn real_turns(history: &[Message]) -> impl Iterator<Item = &Turn> {
    history.iter().filter_map(Message::as_turn)
}

pub fn has_real_turns(history: &[Message]) -> bool {
    history.iter().any(Message::is_real)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn role_and_content_make_a_real_turn() {
        assert!(classify(json!({"role": "user", "content": "Hello!"})).is_real());
        assert!(classify(json!({"role": "system", "content": ""})).is_real());
    }

    #[test]
    fn discriminated_records_are_metadata() {
        assert!(!classify(json!({"type": "tool_call", "data": {"content": "example"}})).is_real());
        assert!(!classify(json!({"kind": "recommendations", "payload": []})).is_real());
        assert!(!classify(json!({"role": "tool", "content": "x"})).is_real());
        assert!(!classify(json!({"role": "", "content": "x"})).is_real());
        assert!(!classify(json!({"role": "user"})).is_real());
        assert!(!classify(json!({"role": "user", "content": [{"type": "text"}]})).is_real());
        assert!(!classify(json!("plain string")).is_real());
    }

    #[test]
    fn classify_drops_extra_fields_on_turns_only() {
        let turn = classify(json!({"role": "assistant", "content": "hi", "id": 7}));
        assert_eq!(turn, Message::assistant("hi"));

        let raw = json!({"type": "recommendations", "data": {"items": ["a", "b"]}});
        let meta = classify(raw.clone());
        assert_eq!(meta, Message::Meta(raw));
    }

    #[test]
    fn transcript_deserializes_and_serializes_verbatim() {
        let raw = r#"[
            {"role": "user", "content": "Hello!"},
            {"type": "tool_call", "data": {"content": "example"}},
            {"role": "assistant", "content": "Hi there!"}
        ]"#;
        let history: ChatHistory = serde_json::from_str(raw).expect("parse");
        assert_eq!(history.len(), 3);
        assert!(history[0].is_user_turn());
        assert!(!history[1].is_real());
        assert_eq!(real_turns(&history).count(), 2);

        let back = serde_json::to_value(&history).expect("serialize");
        assert_eq!(back[1], json!({"type": "tool_call", "data": {"content": "example"}}));
        assert_eq!(back[2], json!({"role": "assistant", "content": "Hi there!"}));
    }
}
