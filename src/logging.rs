use anyhow::{Result, anyhow};
use std::env;
use tracing_subscriber::EnvFilter;

const LOG_FILTER_VAR: &str = "CHATLOG_LOG";

fn build_env_filter(debug: bool) -> Result<EnvFilter> {
    if let Ok(filter) = env::var(LOG_FILTER_VAR)
        && !filter.trim().is_empty()
    {
        return EnvFilter::try_new(filter.trim())
            .map_err(|err| anyhow!("invalid {LOG_FILTER_VAR} filter: {err}"));
    }
    Ok(EnvFilter::new(if debug { "debug" } else { "info" }))
}

/// Logs go to stderr; stdout carries command reports.
pub fn init(debug: bool) -> Result<()> {
    let filter = build_env_filter(debug)?;
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .compact()
        .try_init()
        .map_err(|err| anyhow!("failed to initialize logging: {err}"))
}
