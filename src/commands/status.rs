use anyhow::Result;
use std::env;

use crate::chatlog::config::load_config;
use crate::chatlog::paths::resolve_paths;
use crate::chatlog::state::load_cache;
use crate::commands::CommandReport;
use crate::store::open_store;

include!(concat!(env!("OUT_DIR"), "/chatlog_env_allowlist.rs"));

fn set_env_vars() -> Vec<&'static str> {
    GENERATED_CHATLOG_ENV_ALLOWLIST
        .iter()
        .copied()
        .filter(|key| env::var_os(key).is_some())
        .collect()
}

pub fn run() -> Result<CommandReport> {
    let paths = resolve_paths()?;
    let cfg = load_config()?;
    let mut report = CommandReport::new("status");

    report.detail(format!("build_uuid={}", env!("BUILD_UUID")));
    report.detail(format!("chatlog_home={}", paths.chatlog_home.display()));
    report.detail(format!("store_dir={}", paths.store_dir.display()));
    report.detail(format!("state_dir={}", paths.state_dir.display()));
    report.detail(format!("logs_dir={}", paths.logs_dir.display()));
    report.detail(format!("store_backend={}", cfg.store.backend));
    report.detail(format!("retention_hours={}", cfg.cache.retention_hours));

    let cache = load_cache(&paths, cfg.cache.retention_secs())?;
    report.detail(format!(
        "cache_entries={} (last {}h)",
        cache.len(),
        cfg.cache.retention_hours
    ));

    match open_store(&paths, &cfg).and_then(|store| store.count()) {
        Ok(count) => report.detail(format!("stored_conversations={count}")),
        Err(err) => report.issue(format!("failed to count stored conversations: {err:#}")),
    }

    let set = set_env_vars();
    if set.is_empty() {
        report.detail("env_overrides=<none>");
    } else {
        report.detail(format!("env_overrides={}", set.join(",")));
    }

    Ok(report)
}
