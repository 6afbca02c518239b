use anyhow::Result;
use std::collections::HashSet;
use tracing::warn;

use crate::chatlog::audit;
use crate::chatlog::config::load_config;
use crate::chatlog::dedupe::run_dedupe;
use crate::chatlog::paths::resolve_paths;
use crate::chatlog::state::{load_cache, lock_state, save_cache};
use crate::commands::CommandReport;
use crate::store::{StorageId, open_store};

pub fn run(dry_run: bool) -> Result<CommandReport> {
    let paths = resolve_paths()?;
    let cfg = load_config()?;
    let store = open_store(&paths, &cfg)?;
    let mut report = CommandReport::new("dedupe");

    let _lock = lock_state(&paths)?;
    let outcome = run_dedupe(store.as_ref(), dry_run)?;

    report.detail(format!("store={}", store.label()));
    report.detail(format!("dry_run={dry_run}"));
    report.detail(format!("scanned={}", outcome.plan.scanned));
    report.detail(format!("kept={}", outcome.plan.kept.len()));
    report.detail(format!("duplicates={}", outcome.plan.duplicates.len()));
    for duplicate in &outcome.plan.duplicates {
        report.detail(format!("duplicate {} -> kept {}", duplicate.id, duplicate.kept_id));
    }

    if dry_run {
        return Ok(report);
    }

    report.detail(format!("deleted={}", outcome.deleted));
    if outcome.missing > 0 {
        report.detail(format!("already_missing={}", outcome.missing));
    }

    let gone: HashSet<StorageId> = outcome
        .plan
        .duplicates
        .iter()
        .map(|duplicate| duplicate.id.clone())
        .collect();
    if !gone.is_empty() {
        let cache = load_cache(&paths, cfg.cache.retention_secs())?;
        let forgotten = cache.forget_storage(&gone);
        if forgotten > 0 {
            save_cache(&paths, &cache)?;
        }
        report.detail(format!("cache_entries_forgotten={forgotten}"));
    }

    let message = format!(
        "scanned={} deleted={}",
        outcome.plan.scanned, outcome.deleted
    );
    if let Err(err) = audit::append_event(&paths, "dedupe", "ok", &message) {
        warn!(error = %format!("{err:#}"), "failed to append audit event");
    }
    Ok(report)
}
