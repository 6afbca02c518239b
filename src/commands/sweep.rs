use anyhow::Result;

use crate::chatlog::config::load_config;
use crate::chatlog::paths::resolve_paths;
use crate::chatlog::state::{load_cache, lock_state, save_cache};
use crate::chatlog::util::now_epoch_secs;
use crate::commands::CommandReport;

pub fn run() -> Result<CommandReport> {
    let paths = resolve_paths()?;
    let cfg = load_config()?;
    let mut report = CommandReport::new("sweep");

    let _lock = lock_state(&paths)?;
    let cache = load_cache(&paths, cfg.cache.retention_secs())?;
    let before = cache.len();
    let evicted = cache.sweep(now_epoch_secs()?);

    report.detail(format!("retention_secs={}", cache.retention_secs()));
    report.detail(format!("evicted={evicted}"));
    report.detail(format!("remaining={}", before - evicted));
    if evicted > 0 {
        let snapshot = save_cache(&paths, &cache)?;
        report.detail(format!("cache_snapshot={}", snapshot.display()));
    }
    Ok(report)
}
