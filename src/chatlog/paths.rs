use anyhow::Result;
use std::env;
use std::path::PathBuf;

#[derive(Debug, Clone)]
pub struct ChatlogPaths {
    pub chatlog_home: PathBuf,
    pub store_dir: PathBuf,
    pub state_dir: PathBuf,
    pub logs_dir: PathBuf,
}

impl ChatlogPaths {
    pub fn cache_snapshot_file(&self) -> PathBuf {
        self.state_dir.join("continuation_cache.json")
    }

    pub fn ingest_lock_file(&self) -> PathBuf {
        self.state_dir.join("ingest.lock")
    }

    pub fn audit_log_file(&self) -> PathBuf {
        self.logs_dir.join("audit.log")
    }
}

/// `CHATLOG_HOME` when set, else `~/.chatlog`.
pub fn chatlog_home(custom: Option<&str>, home_dir: Option<PathBuf>) -> Option<PathBuf> {
    match custom.map(str::trim) {
        Some(custom) if !custom.is_empty() => Some(PathBuf::from(custom)),
        _ => home_dir.map(|home| home.join(".chatlog")),
    }
}

fn env_or_default_path(var: &str, fallback: PathBuf) -> PathBuf {
    match env::var(var) {
        Ok(v) if !v.trim().is_empty() => PathBuf::from(v.trim()),
        _ => fallback,
    }
}

pub fn resolve_paths() -> Result<ChatlogPaths> {
    let chatlog_home = chatlog_home(env::var("CHATLOG_HOME").ok().as_deref(), dirs::home_dir())
        .ok_or_else(|| anyhow::anyhow!("HOME directory could not be resolved"))?;

    let store_dir = env_or_default_path("CHATLOG_STORE_DIR", chatlog_home.join("conversations"));
    let state_dir = env_or_default_path("CHATLOG_STATE_DIR", chatlog_home.join("state"));
    let logs_dir = env_or_default_path("CHATLOG_LOGS_DIR", chatlog_home.join("logs"));

    Ok(ChatlogPaths {
        chatlog_home,
        store_dir,
        state_dir,
        logs_dir,
    })
}
