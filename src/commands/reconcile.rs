use anyhow::Result;

use crate::commands::{CommandReport, Workspace, record_audit};
use crate::error::ErrorCode;
use crate::processing::cleaner::BasicCleaner;
use crate::processing::metadata::PatternExtractor;
use crate::stub::lock::RunLock;
use crate::stub::state::{self, SweepRecord};
use crate::stub::sweep::{SweepOptions, sweep};
use crate::stub::util::now_epoch_secs;

pub fn run(dry_run: bool) -> Result<CommandReport> {
    let ws = Workspace::load()?;
    let mut report = CommandReport::new("reconcile");
    let _lock = RunLock::acquire(&ws.paths.lock_file)?;
    ws.ensure_folders()?;
    let mut registry = ws.open_registry(&mut report)?;

    let outcome = match sweep(
        &mut registry,
        &ws.connector,
        &ws.config.folders,
        &BasicCleaner::new(),
        &PatternExtractor,
        SweepOptions { dry_run },
    ) {
        Ok(outcome) => outcome,
        Err(err) => {
            report.coded_issue(ErrorCode::E003SourceUnavailable, &err);
            record_audit(&ws.paths, &report, &err.to_string());
            return Ok(report);
        }
    };

    report.detail(format!("dry_run={dry_run}"));
    report.detail(format!("indexed.scanned={}", outcome.documents_scanned));
    report.detail(format!("pending.checked={}", outcome.pending_checked));
    report.detail(format!("relinked={}", outcome.relinked));
    report.detail(format!("matched={}", outcome.matches.len()));
    report.detail(format!("completed={}", outcome.completed));
    report.detail(format!("completed_in_place={}", outcome.completed_in_place));
    for hit in &outcome.matches {
        report.detail(format!(
            "match {} -> {} via {} ({})",
            hit.external_id,
            hit.document_id,
            hit.kind.as_str(),
            hit.subject
        ));
    }
    for failure in &outcome.failures {
        report.issue(failure.clone());
    }

    if !dry_run {
        let mut current = state::load(&ws.paths).unwrap_or_default();
        current.last_sweep = Some(SweepRecord::from_outcome(now_epoch_secs()?, &outcome));
        state::save(&ws.paths, &current)?;
    }

    record_audit(
        &ws.paths,
        &report,
        &format!(
            "dry_run={dry_run} matched={} completed={}",
            outcome.matches.len(),
            outcome.completed + outcome.completed_in_place
        ),
    );
    Ok(report)
}
