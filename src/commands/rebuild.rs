use anyhow::{Context, Result};

use crate::commands::{CommandReport, Workspace, record_audit};
use crate::error::ErrorCode;
use crate::processing::cleaner::BasicCleaner;
use crate::processing::metadata::PatternExtractor;
use crate::stub::lock::RunLock;
use crate::stub::maintenance::rebuild_records;
use crate::stub::registry::StubRegistry;
use crate::stub::report;

/// Replace the registry with what the holding and archive folders imply.
pub fn run() -> Result<CommandReport> {
    let ws = Workspace::load()?;
    let mut report = CommandReport::new("rebuild");
    let _lock = RunLock::acquire(&ws.paths.lock_file)?;
    ws.ensure_folders()?;

    let records = match rebuild_records(
        &ws.connector,
        &ws.config.folders,
        &BasicCleaner::new(),
        &PatternExtractor,
    ) {
        Ok(records) => records,
        Err(err) => {
            report.coded_issue(ErrorCode::E003SourceUnavailable, &err);
            record_audit(&ws.paths, &report, &err.to_string());
            return Ok(report);
        }
    };

    let mut registry = StubRegistry::open(&ws.paths.registry_file).with_context(|| {
        format!(
            "{}: failed to open registry {}",
            ErrorCode::E002RegistryIo.as_str(),
            ws.paths.registry_file.display()
        )
    })?;
    if let Some(aside) = registry.quarantined() {
        report.detail(format!("unreadable registry moved to {}", aside.display()));
    }
    let previous = registry.len();
    registry.replace_all(records).with_context(|| {
        format!(
            "{}: failed to write rebuilt registry {}",
            ErrorCode::E002RegistryIo.as_str(),
            ws.paths.registry_file.display()
        )
    })?;

    report.detail(format!("previous_records={previous}"));
    for line in report::stats_lines(&registry.statistics()) {
        report.detail(line);
    }
    record_audit(
        &ws.paths,
        &report,
        &format!("previous={previous} rebuilt={}", registry.len()),
    );
    Ok(report)
}
