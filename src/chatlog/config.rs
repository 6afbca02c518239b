use anyhow::{Result, anyhow};
use serde::{Deserialize, Serialize};
use std::env;
use std::fs;
use std::path::PathBuf;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatlogCacheConfig {
    pub retention_hours: u64,
    #[serde(default = "default_sweep_on_ingest")]
    pub sweep_on_ingest: bool,
}

fn default_sweep_on_ingest() -> bool {
    true
}

impl Default for ChatlogCacheConfig {
    fn default() -> Self {
        Self {
            retention_hours: 48,
            sweep_on_ingest: true,
        }
    }
}

impl ChatlogCacheConfig {
    pub fn retention_secs(&self) -> u64 {
        self.retention_hours.saturating_mul(3600)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatlogStoreConfig {
    pub backend: String,
    #[serde(default = "default_table")]
    pub table: String,
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
}

fn default_table() -> String {
    "chats".to_string()
}

fn default_request_timeout_secs() -> u64 {
    30
}

impl Default for ChatlogStoreConfig {
    fn default() -> Self {
        Self {
            backend: "dir".to_string(),
            table: default_table(),
            request_timeout_secs: default_request_timeout_secs(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct ChatlogConfig {
    pub cache: ChatlogCacheConfig,
    pub store: ChatlogStoreConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
struct PartialChatlogConfig {
    cache: Option<ChatlogCacheConfig>,
    store: Option<ChatlogStoreConfig>,
}

fn env_or_u64(var: &str, fallback: u64) -> u64 {
    match env::var(var) {
        Ok(v) => v.trim().parse::<u64>().ok().unwrap_or(fallback),
        Err(_) => fallback,
    }
}

fn env_or_bool(var: &str, fallback: bool) -> bool {
    match env::var(var) {
        Ok(v) => match v.trim() {
            "1" | "true" | "TRUE" | "yes" | "on" => true,
            "0" | "false" | "FALSE" | "no" | "off" => false,
            _ => fallback,
        },
        Err(_) => fallback,
    }
}

fn env_or_string(var: &str, fallback: &str) -> String {
    match env::var(var) {
        Ok(v) if !v.trim().is_empty() => v.trim().to_string(),
        _ => fallback.to_string(),
    }
}

fn validate(cfg: &ChatlogConfig) -> Result<()> {
    if cfg.cache.retention_hours == 0 {
        return Err(anyhow!("invalid cache retention: must be >= 1 hour"));
    }
    if cfg.store.backend != "dir" && cfg.store.backend != "supabase" {
        return Err(anyhow!("invalid store backend: use `dir` or `supabase`"));
    }
    if cfg.store.table.trim().is_empty() {
        return Err(anyhow!("invalid store table: cannot be empty"));
    }
    if cfg.store.request_timeout_secs == 0 {
        return Err(anyhow!("invalid store request timeout: must be >= 1 second"));
    }
    Ok(())
}

fn resolve_config_path() -> Option<PathBuf> {
    if let Ok(custom) = env::var("CHATLOG_CONFIG_PATH") {
        let trimmed = custom.trim();
        if !trimmed.is_empty() {
            return Some(PathBuf::from(trimmed));
        }
    }

    let home = dirs::home_dir()?;
    Some(home.join(".chatlog").join("chatlog.toml"))
}

fn merge_file_config(base: &mut ChatlogConfig, raw: &str, origin: &str) -> Result<()> {
    let parsed: PartialChatlogConfig = toml::from_str(raw)
        .map_err(|err| anyhow!("failed to parse chatlog config {origin}: {err}"))?;
    if let Some(cache) = parsed.cache {
        base.cache = cache;
    }
    if let Some(store) = parsed.store {
        base.store = store;
    }
    Ok(())
}

fn apply_env_overrides(cfg: &mut ChatlogConfig) {
    cfg.cache.retention_hours = env_or_u64("CHATLOG_RETENTION_HOURS", cfg.cache.retention_hours);
    cfg.cache.sweep_on_ingest = env_or_bool("CHATLOG_SWEEP_ON_INGEST", cfg.cache.sweep_on_ingest);
    cfg.store.backend = env_or_string("CHATLOG_STORE_BACKEND", &cfg.store.backend);
    cfg.store.table = env_or_string("CHATLOG_SUPABASE_TABLE", &cfg.store.table);
    cfg.store.request_timeout_secs =
        env_or_u64("CHATLOG_STORE_TIMEOUT_SECS", cfg.store.request_timeout_secs);
}

pub fn load_config() -> Result<ChatlogConfig> {
    let mut cfg = ChatlogConfig::default();
    if let Some(path) = resolve_config_path()
        && path.exists()
    {
        let raw = fs::read_to_string(&path)?;
        merge_file_config(&mut cfg, &raw, &path.display().to_string())?;
    }

    apply_env_overrides(&mut cfg);
    validate(&cfg)?;
    Ok(cfg)
}
