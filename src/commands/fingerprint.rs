use anyhow::Result;
use serde_json::json;
use std::path::Path;

use crate::chatlog::engine::check_transcript_shape;
use crate::chatlog::fingerprint::fingerprint;
use crate::chatlog::message::has_real_turns;
use crate::chatlog::sanitize::sanitize_history;
use crate::commands::{CommandReport, read_transcript};
use crate::error::IngestError;

pub fn run(file: Option<&Path>) -> Result<CommandReport> {
    let history = sanitize_history(read_transcript(file)?);
    let mut report = CommandReport::new("fingerprint");

    let full = fingerprint(&history);
    report.detail(format!("messages={}", history.len()));
    report.detail(format!("full_digest={}", full.digest()));
    report.detail(format!("full_key={full}"));

    if !has_real_turns(&history) {
        report.detail("lookup_key=<none> (no real turns; ingest would skip)");
        report.attach(json!({ "full_key": full, "lookup_key": null }))?;
        return Ok(report);
    }

    match check_transcript_shape(&history) {
        Ok(prefix) if has_real_turns(prefix) => {
            let lookup = fingerprint(prefix);
            report.detail(format!("lookup_digest={}", lookup.digest()));
            report.detail(format!("lookup_key={lookup}"));
            report.attach(json!({ "full_key": full, "lookup_key": lookup }))?;
        }
        Ok(_) => {
            report.detail("lookup_key=<none> (first user turn)");
            report.attach(json!({ "full_key": full, "lookup_key": null }))?;
        }
        Err(err) => {
            let err = IngestError::from(err);
            report.issue(format!("{}: {err}", err.code().as_str()));
        }
    }
    Ok(report)
}
