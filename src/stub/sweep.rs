//! Reconciliation sweep over the indexed folder.
//!
//! Repairs drift between the registry and the folders: PENDING records whose
//! holding-folder id went stale are relinked, and PENDING records whose
//! complete counterpart already sits in the indexed folder are completed.
//! Only PENDING records are ever touched, so a second run finds nothing.

use crate::error::{ErrorCode, SourceError, StubError};
use crate::processing::cleaner::TextCleaner;
use crate::processing::metadata::MetadataExtractor;
use crate::source::{Connector, RawMessage};
use crate::stub::config::FolderConfig;
use crate::stub::fingerprint::fingerprint;
use crate::stub::matcher::{DocumentIdentity, MatchKind, StubMatcher};
use crate::stub::registry::{StubRecord, StubRegistry, StubStatus};
use chrono::Local;
use serde::Serialize;
use std::collections::{BTreeSet, HashMap};
use tracing::{debug, info, warn};

#[derive(Debug, Clone, Copy, Default)]
pub struct SweepOptions {
    pub dry_run: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SweepMatch {
    pub external_id: String,
    pub subject: String,
    pub kind: MatchKind,
    pub document_id: String,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct SweepOutcome {
    pub dry_run: bool,
    pub documents_scanned: usize,
    pub pending_checked: usize,
    pub relinked: usize,
    pub matches: Vec<SweepMatch>,
    pub completed: usize,
    /// Completed without an archive move because the stub's message is gone.
    pub completed_in_place: usize,
    pub failures: Vec<String>,
}

struct IndexedDocs {
    docs: Vec<(String, DocumentIdentity)>,
    by_story: HashMap<String, usize>,
    by_fingerprint: HashMap<String, usize>,
}

impl IndexedDocs {
    fn build(
        messages: &[RawMessage],
        cleaner: &dyn TextCleaner,
        extractor: &dyn MetadataExtractor,
    ) -> Self {
        let mut docs = Vec::with_capacity(messages.len());
        let mut by_story = HashMap::new();
        let mut by_fingerprint = HashMap::new();
        for message in messages {
            let cleaned = cleaner.clean(&message.body);
            let meta = extractor.extract(&message.subject, &cleaned, &message.received_at);
            let identity = DocumentIdentity::new(&message.subject, &message.received_at, meta.story_id);
            let idx = docs.len();
            if let Some(story_id) = identity.story_id.clone() {
                by_story.entry(story_id).or_insert(idx);
            }
            by_fingerprint.entry(identity.fingerprint.clone()).or_insert(idx);
            docs.push((message.external_id.clone(), identity));
        }
        Self {
            docs,
            by_story,
            by_fingerprint,
        }
    }

    fn lookup(&self, record: &StubRecord) -> Option<(usize, MatchKind)> {
        if let Some(idx) = record.story_id.as_deref().and_then(|id| self.by_story.get(id)) {
            return Some((*idx, MatchKind::StoryId));
        }
        let recomputed = fingerprint(&record.subject, &record.received_at);
        [record.fingerprint.as_str(), recomputed.as_str()]
            .into_iter()
            .find_map(|fp| self.by_fingerprint.get(fp))
            .map(|idx| (*idx, MatchKind::Fingerprint))
    }
}

/// Re-point PENDING records whose id is no longer in the holding folder at the
/// holding message with the same subject and received time. Records with no
/// such candidate keep their id; their message may still sit in the source
/// folder after a failed holding move.
fn relink_holding_ids(
    registry: &mut StubRegistry,
    holding: &[RawMessage],
    dry_run: bool,
    outcome: &mut SweepOutcome,
) {
    let held = holding
        .iter()
        .map(|m| m.external_id.as_str())
        .collect::<BTreeSet<_>>();
    let mut claimed = registry
        .records()
        .iter()
        .map(|r| r.external_id.clone())
        .filter(|id| held.contains(id.as_str()))
        .collect::<BTreeSet<_>>();

    let stale = registry
        .pending()
        .filter(|r| !held.contains(r.external_id.as_str()))
        .cloned()
        .collect::<Vec<_>>();

    for record in stale {
        let candidate = holding.iter().find(|m| {
            m.subject == record.subject
                && m.received_at == record.received_at
                && !claimed.contains(&m.external_id)
        });
        let Some(candidate) = candidate else {
            debug!(external_id = %record.external_id, subject = %record.subject, "stub message not in holding");
            continue;
        };

        claimed.insert(candidate.external_id.clone());
        if dry_run {
            outcome.relinked += 1;
            continue;
        }
        match registry.update_external_id(&record.external_id, &candidate.external_id) {
            Ok(true) => {
                info!(old_id = %record.external_id, new_id = %candidate.external_id, "relinked stale stub id");
                outcome.relinked += 1;
            }
            Ok(false) => outcome
                .failures
                .push(format!("{}: relink to {} refused", record.external_id, candidate.external_id)),
            Err(err) => outcome
                .failures
                .push(format!("{}: relink failed: {err}", record.external_id)),
        }
    }
}

pub fn sweep<C: Connector>(
    registry: &mut StubRegistry,
    connector: &C,
    folders: &FolderConfig,
    cleaner: &dyn TextCleaner,
    extractor: &dyn MetadataExtractor,
    options: SweepOptions,
) -> Result<SweepOutcome, SourceError> {
    let mut outcome = SweepOutcome {
        dry_run: options.dry_run,
        ..SweepOutcome::default()
    };

    let holding = connector.list_messages(&folders.holding)?;
    relink_holding_ids(registry, &holding, options.dry_run, &mut outcome);

    let indexed = connector.list_messages(&folders.indexed)?;
    let docs = IndexedDocs::build(&indexed, cleaner, extractor);
    outcome.documents_scanned = docs.docs.len();

    let pending = registry.pending().cloned().collect::<Vec<_>>();
    outcome.pending_checked = pending.len();

    let matcher = StubMatcher::new(connector, folders.archive.as_str());
    for record in pending {
        let Some((idx, kind)) = docs.lookup(&record) else {
            continue;
        };
        let (document_id, _) = &docs.docs[idx];
        outcome.matches.push(SweepMatch {
            external_id: record.external_id.clone(),
            subject: record.subject.clone(),
            kind,
            document_id: document_id.clone(),
        });
        if options.dry_run {
            continue;
        }

        let now = Local::now().fixed_offset();
        match matcher.complete_stub(registry, &record, now) {
            Ok(true) => outcome.completed += 1,
            Ok(false) => {}
            Err(StubError::Source(SourceError::MessageNotFound(_))) => {
                warn!(external_id = %record.external_id, "stub message is gone, completing record in place");
                match registry.update_status(&record.external_id, StubStatus::Completed, Some(now)) {
                    Ok(true) => outcome.completed_in_place += 1,
                    Ok(false) => {}
                    Err(err) => outcome.failures.push(format!(
                        "{}: [{}] {err}",
                        record.external_id,
                        ErrorCode::E002RegistryIo.as_str()
                    )),
                }
            }
            Err(err) => {
                warn!(external_id = %record.external_id, "sweep could not complete stub: {err}");
                outcome
                    .failures
                    .push(format!("{}: [{}] {err}", record.external_id, err.code().as_str()));
            }
        }
    }

    info!(
        scanned = outcome.documents_scanned,
        pending = outcome.pending_checked,
        matched = outcome.matches.len(),
        completed = outcome.completed + outcome.completed_in_place,
        dry_run = outcome.dry_run,
        "reconciliation sweep finished"
    );
    Ok(outcome)
}
