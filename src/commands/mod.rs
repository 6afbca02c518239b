pub mod dedupe;
pub mod fingerprint;
pub mod ingest;
pub mod show;
pub mod status;
pub mod sweep;

use crate::chatlog::message::ChatHistory;
use anyhow::{Context, Result};
use serde::Serialize;
use serde_json::Value;
use std::fs;
use std::io::Read;
use std::path::Path;

#[derive(Debug, Clone, Serialize)]
pub struct CommandReport {
    pub command: String,
    pub ok: bool,
    pub details: Vec<String>,
    pub issues: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

impl CommandReport {
    pub fn new(command: impl Into<String>) -> Self {
        Self {
            command: command.into(),
            ok: true,
            details: Vec::new(),
            issues: Vec::new(),
            data: None,
        }
    }

    pub fn detail(&mut self, text: impl Into<String>) {
        self.details.push(text.into());
    }

    pub fn issue(&mut self, text: impl Into<String>) {
        self.ok = false;
        self.issues.push(text.into());
    }

    pub fn attach(&mut self, data: impl Serialize) -> Result<()> {
        self.data = Some(serde_json::to_value(data)?);
        Ok(())
    }
}

/// Reads a JSON array of messages from `file`, or from stdin when absent.
pub fn read_transcript(file: Option<&Path>) -> Result<ChatHistory> {
    let (raw, origin) = match file {
        Some(path) => (
            fs::read_to_string(path)
                .with_context(|| format!("failed to read transcript {}", path.display()))?,
            path.display().to_string(),
        ),
        None => {
            let mut raw = String::new();
            std::io::stdin()
                .read_to_string(&mut raw)
                .context("failed to read transcript from stdin")?;
            (raw, "stdin".to_string())
        }
    };
    parse_transcript(&raw).with_context(|| format!("invalid transcript from {origin}"))
}

fn parse_transcript(raw: &str) -> Result<ChatHistory> {
    let history: ChatHistory =
        serde_json::from_str(raw).context("expected a JSON array of messages")?;
    Ok(history)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chatlog::message::Message;

    #[test]
    fn transcript_keeps_metadata_entries() {
        let history = parse_transcript(
            r#"[{"role":"user","content":"Hello!"},{"type":"tool_call","id":7}]"#,
        )
        .expect("parse");
        assert_eq!(history.len(), 2);
        assert_eq!(history[0], Message::user("Hello!"));
        assert!(!history[1].is_real());
    }

    #[test]
    fn transcript_must_be_an_array() {
        assert!(parse_transcript(r#"{"role":"user","content":"hi"}"#).is_err());
        assert!(parse_transcript("not json").is_err());
    }

    #[test]
    fn issue_marks_report_failed() {
        let mut report = CommandReport::new("ingest");
        report.detail("status=skipped");
        assert!(report.ok);
        report.issue("E002_MALFORMED_TRANSCRIPT: transcript has no user turn");
        assert!(!report.ok);
        assert_eq!(report.issues.len(), 1);
    }
}
