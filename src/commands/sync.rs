use anyhow::Result;

use crate::commands::{CommandReport, Workspace, record_audit};
use crate::error::ErrorCode;
use crate::processing::cleaner::BasicCleaner;
use crate::processing::metadata::PatternExtractor;
use crate::stub::classifier::Classifier;
use crate::stub::lock::RunLock;
use crate::stub::pipeline::SyncPipeline;
use crate::stub::{report, state};

pub fn run(max_messages: Option<usize>) -> Result<CommandReport> {
    let ws = Workspace::load()?;
    let mut report = CommandReport::new("sync");
    let _lock = RunLock::acquire(&ws.paths.lock_file)?;
    ws.ensure_folders()?;
    let mut registry = ws.open_registry(&mut report)?;

    let limit = max_messages.unwrap_or(ws.config.sync.max_messages_per_run);
    let classifier = Classifier::new(ws.config.classifier.clone());
    let cleaner = BasicCleaner::new();
    let pipeline = SyncPipeline {
        connector: &ws.connector,
        classifier: &classifier,
        cleaner: &cleaner,
        extractor: &PatternExtractor,
        folders: &ws.config.folders,
    };

    report.detail(format!("source={}", ws.config.folders.source));
    if limit > 0 {
        report.detail(format!("max_messages={limit}"));
    }

    let summary = match pipeline.run(&mut registry, limit) {
        Ok(summary) => summary,
        Err(err) => {
            report.coded_issue(ErrorCode::E003SourceUnavailable, &err);
            record_audit(&ws.paths, &report, &err.to_string());
            return Ok(report);
        }
    };

    for line in report::summary_lines("sync", &summary) {
        report.detail(line);
    }
    for line in report::stats_lines(&registry.statistics()) {
        report.detail(line);
    }
    for failure in &summary.failures {
        report.issue(failure.clone());
    }

    let mut current = state::load(&ws.paths).unwrap_or_default();
    current.last_sync = Some(summary.clone());
    let state_file = state::save(&ws.paths, &current)?;
    report.detail(format!("state_file={}", state_file.display()));

    record_audit(
        &ws.paths,
        &report,
        &format!(
            "seen={} stubs_created={} stubs_completed={} errors={}",
            summary.messages_seen, summary.stubs_created, summary.stubs_completed, summary.errors
        ),
    );
    Ok(report)
}
