use anyhow::Result;
use chrono::Local;

use crate::commands::{CommandReport, Workspace, record_audit};
use crate::error::ErrorCode;
use crate::stub::lock::RunLock;
use crate::stub::maintenance::{PruneCandidate, prune_stale, purge_archive};

fn candidate_line(label: &str, candidate: &PruneCandidate) -> String {
    format!(
        "{label} {} | received={} | {}",
        candidate.external_id, candidate.received_at, candidate.subject
    )
}

/// Stale PENDING stubs and, separately, old archived mail.
pub fn run(
    stubs_older_than_days: Option<u32>,
    processed_older_than_days: Option<u32>,
    dry_run: bool,
) -> Result<CommandReport> {
    let ws = Workspace::load()?;
    let mut report = CommandReport::new("prune");
    let _lock = RunLock::acquire(&ws.paths.lock_file)?;
    report.detail(format!("dry_run={dry_run}"));
    let mut audit = vec![format!("dry_run={dry_run}")];

    if let Some(days) = stubs_older_than_days {
        let mut registry = ws.open_registry(&mut report)?;
        let outcome = prune_stale(
            &mut registry,
            &ws.connector,
            days,
            Local::now().fixed_offset(),
            dry_run,
        );

        report.detail(format!("stubs.older_than_days={days}"));
        for candidate in &outcome.candidates {
            report.detail(candidate_line("stale", candidate));
        }
        report.detail(format!("stubs.candidates={}", outcome.candidates.len()));
        report.detail(format!("stubs.removed={}", outcome.removed));
        for failure in &outcome.failures {
            report.issue(failure.clone());
        }
        audit.push(format!(
            "stubs.candidates={} stubs.removed={}",
            outcome.candidates.len(),
            outcome.removed
        ));
    }

    if let Some(days) = processed_older_than_days {
        let archive = ws.config.folders.archive.as_str();
        report.detail(format!("processed.older_than_days={days}"));
        match purge_archive(&ws.connector, archive, days, Local::now().fixed_offset(), dry_run) {
            Ok(outcome) => {
                for candidate in &outcome.candidates {
                    report.detail(candidate_line("old", candidate));
                }
                report.detail(format!("processed.candidates={}", outcome.candidates.len()));
                report.detail(format!("processed.deleted={}", outcome.deleted));
                for failure in &outcome.failures {
                    report.issue(failure.clone());
                }
                audit.push(format!(
                    "processed.candidates={} processed.deleted={}",
                    outcome.candidates.len(),
                    outcome.deleted
                ));
            }
            Err(err) => {
                report.coded_issue(ErrorCode::E003SourceUnavailable, &err);
                audit.push(err.to_string());
            }
        }
    }

    record_audit(&ws.paths, &report, &audit.join(" "));
    Ok(report)
}
