use crate::chatlog::paths::ChatlogPaths;
use crate::chatlog::util::now_epoch_secs;
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::io::Write;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditEvent {
    pub at_epoch_secs: u64,
    pub phase: String,
    pub status: String,
    pub message: String,
}

pub fn append_event(paths: &ChatlogPaths, phase: &str, status: &str, message: &str) -> Result<()> {
    fs::create_dir_all(&paths.logs_dir)
        .with_context(|| format!("failed to create {}", paths.logs_dir.display()))?;
    let event = AuditEvent {
        at_epoch_secs: now_epoch_secs()?,
        phase: phase.to_string(),
        status: status.to_string(),
        message: message.to_string(),
    };

    let line = format!("{}\n", serde_json::to_string(&event)?);
    let path = paths.audit_log_file();
    let mut file = fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(&path)
        .with_context(|| format!("failed to open {}", path.display()))?;
    file.write_all(line.as_bytes())?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn events_append_as_json_lines() {
        let tmp = tempdir().expect("tempdir");
        let paths = ChatlogPaths {
            chatlog_home: tmp.path().to_path_buf(),
            store_dir: tmp.path().join("conversations"),
            state_dir: tmp.path().join("state"),
            logs_dir: tmp.path().join("logs"),
        };

        append_event(&paths, "ingest", "ok", "new chat logged id=a").expect("first");
        append_event(&paths, "ingest", "failed", "E001_DIVERGENT_HISTORY").expect("second");

        let raw = fs::read_to_string(paths.audit_log_file()).expect("read");
        let events: Vec<AuditEvent> = raw
            .lines()
            .map(|line| serde_json::from_str(line).expect("event"))
            .collect();
        assert_eq!(events.len(), 2);
        assert_eq!(events[1].status, "failed");
        assert_eq!(events[1].message, "E001_DIVERGENT_HISTORY");
    }
}
