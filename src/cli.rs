use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;

use crate::commands::{self, CommandReport};
use crate::logging;

#[derive(Debug, Parser)]
#[command(
    name = "stubsync",
    version,
    about = "Track placeholder messages and reconcile them with their complete articles"
)]
struct Cli {
    /// Print the command report as JSON.
    #[arg(long, global = true)]
    json: bool,

    /// Debug logging on stderr (STUBSYNC_LOG overrides).
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Ingest the source folder once.
    Sync {
        /// Process at most N messages, oldest first.
        #[arg(long, value_name = "N")]
        max_messages: Option<usize>,
    },
    /// Complete pending stubs whose article already sits in the indexed folder.
    Reconcile {
        #[arg(long)]
        dry_run: bool,
    },
    /// Paths, registry statistics, last run and pending stubs.
    Status,
    /// Show how messages would be classified without moving them.
    Classify {
        /// A single message file.
        path: Option<PathBuf>,
        /// Mailbox folder to classify instead (default: source folder).
        #[arg(long, conflicts_with = "path")]
        folder: Option<String>,
    },
    /// Delete pending stubs, or archived mail, older than N days.
    Prune {
        /// Pending stubs received more than N days ago.
        #[arg(long, value_name = "N", required_unless_present = "processed_older_than_days")]
        older_than_days: Option<u32>,
        /// Messages in the archive folder received more than N days ago.
        #[arg(long, value_name = "N")]
        processed_older_than_days: Option<u32>,
        #[arg(long)]
        dry_run: bool,
    },
    /// Rebuild the registry from the holding and archive folders.
    Rebuild,
}

fn render(report: &CommandReport, json: bool) -> Result<()> {
    if json {
        println!("{}", serde_json::to_string_pretty(report)?);
        return Ok(());
    }

    let state = if report.ok { "ok" } else { "issues" };
    println!("{}: {state}", report.command);
    for line in &report.details {
        println!("  {line}");
    }
    for line in &report.issues {
        println!("  issue: {line}");
    }
    Ok(())
}

/// Returns the process exit code: 0 when the report is clean, 2 when it
/// carries issues.
pub fn run() -> Result<i32> {
    let cli = Cli::parse();
    logging::init_tracing(cli.verbose);

    let report = match cli.command {
        Command::Sync { max_messages } => commands::sync::run(max_messages)?,
        Command::Reconcile { dry_run } => commands::reconcile::run(dry_run)?,
        Command::Status => commands::status::run()?,
        Command::Classify { path, folder } => {
            commands::classify::run(path.as_deref(), folder.as_deref())?
        }
        Command::Prune {
            older_than_days,
            processed_older_than_days,
            dry_run,
        } => commands::prune::run(older_than_days, processed_older_than_days, dry_run)?,
        Command::Rebuild => commands::rebuild::run()?,
    };

    render(&report, cli.json)?;
    Ok(if report.ok { 0 } else { 2 })
}
