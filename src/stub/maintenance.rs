//! Explicit, operator-invoked upkeep: pruning old stubs, clearing old mail
//! out of the archive folder and rebuilding the registry from the folders.

use crate::error::{SourceError, StubError};
use crate::processing::cleaner::TextCleaner;
use crate::processing::metadata::MetadataExtractor;
use crate::source::{Connector, RawMessage};
use crate::stub::config::FolderConfig;
use crate::stub::fingerprint::fingerprint;
use crate::stub::registry::{StubRecord, StubRegistry, StubStatus};
use chrono::{DateTime, Duration, FixedOffset};
use serde::Serialize;
use tracing::{info, warn};

#[derive(Debug, Clone, Serialize)]
pub struct PruneCandidate {
    pub external_id: String,
    pub subject: String,
    pub received_at: String,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct PruneOutcome {
    pub candidates: Vec<PruneCandidate>,
    pub removed: usize,
    pub failures: Vec<String>,
}

/// Delete PENDING stubs received more than `older_than_days` before `now`,
/// both their holding message and their record. A message that is already
/// gone does not block removing the record.
pub fn prune_stale<C: Connector>(
    registry: &mut StubRegistry,
    connector: &C,
    older_than_days: u32,
    now: DateTime<FixedOffset>,
    dry_run: bool,
) -> PruneOutcome {
    let Some(cutoff) = now.checked_sub_signed(Duration::days(i64::from(older_than_days))) else {
        return PruneOutcome::default();
    };
    let stale = registry
        .pending()
        .filter(|r| r.received_at < cutoff)
        .cloned()
        .collect::<Vec<_>>();

    let mut outcome = PruneOutcome::default();
    for record in stale {
        outcome.candidates.push(PruneCandidate {
            external_id: record.external_id.clone(),
            subject: record.subject.clone(),
            received_at: record.received_at.format("%Y-%m-%d %H:%M").to_string(),
        });
        if dry_run {
            continue;
        }

        match connector.delete(&record.external_id) {
            Ok(()) => {}
            Err(SourceError::MessageNotFound(_)) => {
                warn!(external_id = %record.external_id, "stub message already gone");
            }
            Err(err) => {
                let err = StubError::from(err);
                outcome.failures.push(format!(
                    "{}: [{}] {err}",
                    record.external_id,
                    err.code().as_str()
                ));
                continue;
            }
        }
        match registry.remove(&record.external_id) {
            Ok(true) => outcome.removed += 1,
            Ok(false) => {}
            Err(err) => outcome
                .failures
                .push(format!("{}: {err}", record.external_id)),
        }
    }
    info!(
        candidates = outcome.candidates.len(),
        removed = outcome.removed,
        dry_run,
        "prune finished"
    );
    outcome
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct PurgeOutcome {
    pub candidates: Vec<PruneCandidate>,
    pub deleted: usize,
    pub failures: Vec<String>,
}

/// Delete archived messages received more than `older_than_days` before
/// `now`. Registry records are kept as history.
pub fn purge_archive<C: Connector>(
    connector: &C,
    archive_folder: &str,
    older_than_days: u32,
    now: DateTime<FixedOffset>,
    dry_run: bool,
) -> Result<PurgeOutcome, SourceError> {
    let mut outcome = PurgeOutcome::default();
    let Some(cutoff) = now.checked_sub_signed(Duration::days(i64::from(older_than_days))) else {
        return Ok(outcome);
    };

    let old = connector
        .list_messages(archive_folder)?
        .into_iter()
        .filter(|m| m.received_at < cutoff)
        .collect::<Vec<_>>();
    for message in old {
        outcome.candidates.push(PruneCandidate {
            external_id: message.external_id.clone(),
            subject: message.subject.clone(),
            received_at: message.received_at.format("%Y-%m-%d %H:%M").to_string(),
        });
        if dry_run {
            continue;
        }
        match connector.delete(&message.external_id) {
            Ok(()) => outcome.deleted += 1,
            Err(SourceError::MessageNotFound(_)) => {
                warn!(external_id = %message.external_id, "archived message already gone");
            }
            Err(err) => outcome
                .failures
                .push(format!("{}: {err}", message.external_id)),
        }
    }
    info!(
        folder = archive_folder,
        candidates = outcome.candidates.len(),
        deleted = outcome.deleted,
        dry_run,
        "archive purge finished"
    );
    Ok(outcome)
}

fn record_from(
    message: &RawMessage,
    status: StubStatus,
    cleaner: &dyn TextCleaner,
    extractor: &dyn MetadataExtractor,
) -> StubRecord {
    let cleaned = cleaner.clean(&message.body);
    let meta = extractor.extract(&message.subject, &cleaned, &message.received_at);
    let mut record = StubRecord::pending(
        message.external_id.clone(),
        meta.story_id,
        fingerprint(&message.subject, &message.received_at),
        message.subject.clone(),
        message.received_at,
    );
    record.status = status;
    record
}

/// Registry contents implied by the folders: every holding message is a
/// PENDING stub, every archived message a COMPLETED one. The completion time
/// of archived stubs is unknown and left empty.
pub fn rebuild_records<C: Connector>(
    connector: &C,
    folders: &FolderConfig,
    cleaner: &dyn TextCleaner,
    extractor: &dyn MetadataExtractor,
) -> Result<Vec<StubRecord>, SourceError> {
    let holding = connector.list_messages(&folders.holding)?;
    let archive = connector.list_messages(&folders.archive)?;

    let mut records = Vec::with_capacity(holding.len() + archive.len());
    for message in &holding {
        records.push(record_from(message, StubStatus::Pending, cleaner, extractor));
    }
    for message in &archive {
        records.push(record_from(message, StubStatus::Completed, cleaner, extractor));
    }
    info!(
        pending = holding.len(),
        completed = archive.len(),
        "rebuilt registry records from folders"
    );
    Ok(records)
}
