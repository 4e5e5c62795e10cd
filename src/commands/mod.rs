pub mod classify;
pub mod prune;
pub mod rebuild;
pub mod reconcile;
pub mod status;
pub mod sync;

use anyhow::{Context, Result};
use serde::Serialize;
use std::time::Duration;
use tracing::warn;

use crate::error::ErrorCode;
use crate::source::mailbox::MailboxConnector;
use crate::source::timeout::TimedConnector;
use crate::stub::audit;
use crate::stub::config::{StubsyncConfig, load_config};
use crate::stub::paths::{StubPaths, resolve_paths};
use crate::stub::registry::StubRegistry;

#[derive(Debug, Clone, Serialize)]
pub struct CommandReport {
    pub command: String,
    pub ok: bool,
    pub details: Vec<String>,
    pub issues: Vec<String>,
}

impl CommandReport {
    pub fn new(command: impl Into<String>) -> Self {
        Self {
            command: command.into(),
            ok: true,
            details: Vec::new(),
            issues: Vec::new(),
        }
    }

    pub fn detail(&mut self, text: impl Into<String>) {
        self.details.push(text.into());
    }

    pub fn issue(&mut self, text: impl Into<String>) {
        self.ok = false;
        self.issues.push(text.into());
    }

    pub fn coded_issue(&mut self, code: ErrorCode, text: impl std::fmt::Display) {
        self.issue(format!("[{}] {text}", code.as_str()));
    }
}

/// Resolved paths, validated config and the connector every command uses.
pub struct Workspace {
    pub paths: StubPaths,
    pub config: StubsyncConfig,
    pub connector: TimedConnector<MailboxConnector>,
}

impl Workspace {
    pub fn load() -> Result<Self> {
        let paths = resolve_paths()?;
        let config = load_config()
            .with_context(|| format!("{}: configuration rejected", ErrorCode::E005ConfigInvalid.as_str()))?;
        let connector = TimedConnector::new(
            MailboxConnector::new(paths.mailbox_dir.clone()),
            Duration::from_secs(config.connector.timeout_secs),
        );
        Ok(Self {
            paths,
            config,
            connector,
        })
    }

    pub fn mailbox(&self) -> &MailboxConnector {
        self.connector.inner()
    }

    pub fn ensure_folders(&self) -> Result<()> {
        let f = &self.config.folders;
        self.mailbox()
            .ensure_folders([
                f.source.as_str(),
                f.indexed.as_str(),
                f.holding.as_str(),
                f.archive.as_str(),
            ])
            .with_context(|| {
                format!(
                    "{}: failed to prepare mailbox {}",
                    ErrorCode::E003SourceUnavailable.as_str(),
                    self.paths.mailbox_dir.display()
                )
            })
    }

    /// Open the registry for mutation, flagging a document that had to be
    /// moved aside.
    pub fn open_registry(&self, report: &mut CommandReport) -> Result<StubRegistry> {
        let registry = StubRegistry::open(&self.paths.registry_file).with_context(|| {
            format!(
                "{}: failed to open registry {}",
                ErrorCode::E002RegistryIo.as_str(),
                self.paths.registry_file.display()
            )
        })?;
        if let Some(aside) = registry.quarantined() {
            report.coded_issue(
                ErrorCode::E002RegistryIo,
                format!(
                    "registry was unreadable and moved to {}; run `stubsync rebuild` to restore it",
                    aside.display()
                ),
            );
        }
        Ok(registry)
    }
}

pub fn record_audit(paths: &StubPaths, report: &CommandReport, message: &str) {
    let status = if report.ok { "ok" } else { "issues" };
    if let Err(err) = audit::append_event(paths, &report.command, status, message) {
        warn!("failed to append audit event: {err:#}");
    }
}
