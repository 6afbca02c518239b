use crate::chatlog::message::{Message, real_turns};
use crate::chatlog::sanitize::clean;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fmt;

pub const DELIMITER: &str = ";";
const DIGEST_HEX_CHARS: usize = 16;

/// Identity of a conversation: its real turns as `role: content`, in order.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Fingerprint(String);

impl Fingerprint {
    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Short stable hash for log lines; the key itself can be the whole conversation.
    pub fn digest(&self) -> String {
        let mut hasher = Sha256::new();
        hasher.update(self.as_str().as_bytes());
        let mut hex = format!("{:x}", hasher.finalize());
        hex.truncate(DIGEST_HEX_CHARS);
        hex
    }
}

impl fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<String> for Fingerprint {
    fn from(value: String) -> Self {
        Self(value)
    }
}

pub fn fingerprint(history: &[Message]) -> Fingerprint {
    let key = real_turns(history)
        .map(|turn| format!("{}: {}", turn.role, clean(&turn.content)))
        .collect::<Vec<_>>()
        .join(DELIMITER);
    Fingerprint(key)
}

/// Everything before the last real user turn, or `None` without one.
pub fn strip_final_user_turn(history: &[Message]) -> Option<&[Message]> {
    let last_user = history.iter().rposition(Message::is_user_turn)?;
    Some(&history[..last_user])
}
