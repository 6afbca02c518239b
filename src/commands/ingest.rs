use anyhow::Result;
use serde_json::json;
use std::path::Path;
use tracing::warn;

use crate::chatlog::audit;
use crate::chatlog::config::load_config;
use crate::chatlog::engine::{ContinuationEngine, IngestOutcome};
use crate::chatlog::paths::{ChatlogPaths, resolve_paths};
use crate::chatlog::state::{load_cache, lock_state, save_cache};
use crate::commands::{CommandReport, read_transcript};
use crate::store::open_store;

fn record_audit(paths: &ChatlogPaths, status: &str, message: &str) {
    if let Err(err) = audit::append_event(paths, "ingest", status, message) {
        warn!(error = %format!("{err:#}"), "failed to append audit event");
    }
}

pub fn run(file: Option<&Path>) -> Result<CommandReport> {
    let paths = resolve_paths()?;
    let cfg = load_config()?;
    let transcript = read_transcript(file)?;
    let store = open_store(&paths, &cfg)?;
    let mut report = CommandReport::new("ingest");
    report.detail(format!("store={}", store.label()));

    let _lock = lock_state(&paths)?;
    let cache = load_cache(&paths, cfg.cache.retention_secs())?;
    let engine =
        ContinuationEngine::new(cache, store).with_sweep_on_ingest(cfg.cache.sweep_on_ingest);

    let outcome = match engine.ingest(transcript) {
        Ok(outcome) => outcome,
        Err(err) => {
            let message = format!("{}: {err}", err.code().as_str());
            record_audit(&paths, "failed", &message);
            report.issue(message);
            return Ok(report);
        }
    };

    report.detail(format!("status={}", outcome.status()));
    if let Some(id) = outcome.storage_id() {
        report.detail(format!("storage_id={id}"));
        report.detail(format!("messages={}", outcome.history().len()));
    }
    if let IngestOutcome::Merged { appended, .. } = &outcome {
        report.detail(format!("appended={appended}"));
    }

    if !matches!(outcome, IngestOutcome::Skipped) {
        let snapshot = save_cache(&paths, engine.cache())?;
        report.detail(format!("cache_entries={}", engine.cache().len()));
        report.detail(format!("cache_snapshot={}", snapshot.display()));
    }

    let summary = match outcome.storage_id() {
        Some(id) => format!("{} id={id}", outcome.status()),
        None => outcome.status().to_string(),
    };
    record_audit(&paths, "ok", &summary);

    let appended = match &outcome {
        IngestOutcome::Merged { appended, .. } => Some(*appended),
        _ => None,
    };
    report.attach(json!({
        "status": outcome.status(),
        "storage_id": outcome.storage_id(),
        "appended": appended,
        "messages": outcome.history(),
    }))?;
    Ok(report)
}
