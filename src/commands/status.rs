use anyhow::Result;

use crate::commands::{CommandReport, Workspace};
use crate::error::ErrorCode;
use crate::source::Connector;
use crate::stub::config::unknown_env_keys;
use crate::stub::registry::StubRegistry;
use crate::stub::{report, state};

const PENDING_LINES: usize = 20;

pub fn run() -> Result<CommandReport> {
    let ws = Workspace::load()?;
    let paths = &ws.paths;
    let folders = &ws.config.folders;
    let mut report = CommandReport::new("status");

    report.detail(format!("build_id={}", env!("STUBSYNC_BUILD_ID")));
    report.detail(format!("home={}", paths.home.display()));
    report.detail(format!("registry_file={}", paths.registry_file.display()));
    report.detail(format!("state_file={}", paths.state_file.display()));
    report.detail(format!("logs_dir={}", paths.logs_dir.display()));
    report.detail(format!("mailbox_dir={}", paths.mailbox_dir.display()));
    report.detail(format!(
        "folders=source:{} indexed:{} holding:{} archive:{}",
        folders.source, folders.indexed, folders.holding, folders.archive
    ));

    for folder in [&folders.source, &folders.indexed, &folders.holding, &folders.archive] {
        if !ws.mailbox().folder_dir(folder).is_dir() {
            report.detail(format!("folder.{folder}=missing (created on first sync)"));
            continue;
        }
        match ws.connector.list_messages(folder) {
            Ok(messages) => report.detail(format!("folder.{folder}.messages={}", messages.len())),
            Err(err) => report.coded_issue(ErrorCode::E003SourceUnavailable, err),
        }
    }

    match StubRegistry::open_read_only(&paths.registry_file) {
        Ok(registry) => {
            for line in report::stats_lines(&registry.statistics()) {
                report.detail(line);
            }
            for line in report::pending_lines(&registry, PENDING_LINES) {
                report.detail(line);
            }
        }
        Err(err) => report.coded_issue(ErrorCode::E002RegistryIo, err),
    }

    match state::load(paths) {
        Ok(current) => {
            match &current.last_sync {
                Some(summary) => {
                    for line in report::summary_lines("last_sync", summary) {
                        report.detail(line);
                    }
                }
                None => report.detail("last_sync=never"),
            }
            match &current.last_sweep {
                Some(sweep) => report.detail(format!(
                    "last_sweep.at_epoch_secs={} completed={} relinked={} failures={}",
                    sweep.at_epoch_secs, sweep.completed, sweep.relinked, sweep.failures
                )),
                None => report.detail("last_sweep=never"),
            }
        }
        Err(err) => report.issue(format!("state unreadable: {err:#}")),
    }

    for key in unknown_env_keys() {
        report.issue(format!("unknown environment key {key}"));
    }

    Ok(report)
}
