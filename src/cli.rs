use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;

use crate::commands::{self, CommandReport};
use crate::logging;

#[derive(Debug, Parser)]
#[command(
    name = "chatlog",
    version,
    about = "Log chat transcripts, merging continuations into one stored conversation"
)]
struct Cli {
    /// Log at debug level unless CHATLOG_LOG is set.
    #[arg(long, global = true)]
    debug: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Log one transcript (JSON array of messages).
    Ingest {
        /// Read the transcript from this file instead of stdin.
        #[arg(long)]
        file: Option<PathBuf>,
        #[arg(long)]
        json: bool,
    },
    /// Print the full and lookup fingerprints of a transcript.
    Fingerprint {
        #[arg(long)]
        file: Option<PathBuf>,
        #[arg(long)]
        json: bool,
    },
    /// Show paths, cache size and stored conversation count.
    Status {
        #[arg(long)]
        json: bool,
    },
    /// Print one stored conversation.
    Show {
        id: String,
        #[arg(long)]
        json: bool,
    },
    /// Delete stored conversations that are older copies of a newer one.
    Dedupe {
        #[arg(long)]
        dry_run: bool,
        #[arg(long)]
        json: bool,
    },
    /// Evict cache entries past the retention window.
    Sweep {
        #[arg(long)]
        json: bool,
    },
}

fn render(report: &CommandReport, json: bool) -> Result<()> {
    if json {
        println!("{}", serde_json::to_string_pretty(report)?);
        return Ok(());
    }

    let state = if report.ok { "ok" } else { "failed" };
    println!("{}: {state}", report.command);
    for detail in &report.details {
        println!("  {detail}");
    }
    for issue in &report.issues {
        println!("  issue: {issue}");
    }
    Ok(())
}

pub fn run() -> Result<()> {
    let cli = Cli::parse();
    logging::init(cli.debug)?;

    let (report, json) = match cli.command {
        Command::Ingest { file, json } => (commands::ingest::run(file.as_deref())?, json),
        Command::Fingerprint { file, json } => {
            (commands::fingerprint::run(file.as_deref())?, json)
        }
        Command::Status { json } => (commands::status::run()?, json),
        Command::Show { id, json } => (commands::show::run(&id)?, json),
        Command::Dedupe { dry_run, json } => (commands::dedupe::run(dry_run)?, json),
        Command::Sweep { json } => (commands::sweep::run()?, json),
    };

    render(&report, json)?;
    if !report.ok {
        anyhow::bail!("{} reported {} issue(s)", report.command, report.issues.len());
    }
    Ok(())
}
