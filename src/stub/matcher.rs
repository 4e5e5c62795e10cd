use crate::error::StubError;
use crate::source::Connector;
use crate::stub::fingerprint::fingerprint;
use crate::stub::registry::{StubRecord, StubRegistry, StubStatus};
use chrono::{DateTime, FixedOffset};
use serde::Serialize;
use tracing::{debug, error, info};

/// Join keys of a complete document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DocumentIdentity {
    pub story_id: Option<String>,
    pub fingerprint: String,
    pub subject: String,
}

impl DocumentIdentity {
    pub fn new(subject: &str, received_at: &DateTime<FixedOffset>, story_id: Option<String>) -> Self {
        Self {
            story_id: story_id.filter(|id| !id.trim().is_empty()),
            fingerprint: fingerprint(subject, received_at),
            subject: subject.to_string(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum MatchKind {
    StoryId,
    Fingerprint,
}

impl MatchKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::StoryId => "story_id",
            Self::Fingerprint => "fingerprint",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StubMatch {
    pub record: StubRecord,
    pub kind: MatchKind,
}

/// Story id first, then fingerprint. Only PENDING records are candidates.
pub fn find_matching_stub(registry: &StubRegistry, doc: &DocumentIdentity) -> Option<StubMatch> {
    let by_story = doc
        .story_id
        .as_deref()
        .and_then(|story_id| registry.find_by_story_id(story_id));
    if let Some(record) = by_story {
        debug!(external_id = %record.external_id, "stub matched by story id");
        return Some(StubMatch {
            record: record.clone(),
            kind: MatchKind::StoryId,
        });
    }

    registry.find_by_fingerprint(&doc.fingerprint).map(|record| {
        debug!(fingerprint = %doc.fingerprint, external_id = %record.external_id, "stub matched by fingerprint");
        StubMatch {
            record: record.clone(),
            kind: MatchKind::Fingerprint,
        }
    })
}

/// Moves matched stubs into the archive folder and marks them COMPLETED.
pub struct StubMatcher<C> {
    connector: C,
    archive_folder: String,
}

impl<C: Connector> StubMatcher<C> {
    pub fn new(connector: C, archive_folder: impl Into<String>) -> Self {
        Self {
            connector,
            archive_folder: archive_folder.into(),
        }
    }

    /// Archive the stub's message, refresh its id, then mark it COMPLETED.
    ///
    /// Looks the record up again by id first: a record that is gone or
    /// already COMPLETED makes this a no-op returning `Ok(false)`.
    pub fn complete_stub(
        &self,
        registry: &mut StubRegistry,
        record: &StubRecord,
        now: DateTime<FixedOffset>,
    ) -> Result<bool, StubError> {
        let old_id = record.external_id.as_str();
        match registry.get(old_id) {
            Some(live) if live.is_pending() => {}
            Some(_) => {
                debug!(external_id = old_id, "stub already completed");
                return Ok(false);
            }
            None => {
                debug!(external_id = old_id, "stub no longer registered under this id");
                return Ok(false);
            }
        }

        let new_id = self.connector.move_message(old_id, &self.archive_folder)?;

        let partial = |reason: String| {
            error!(old_id, new_id = %new_id, "stub archived but registry not updated: {reason}");
            StubError::MovedNotRecorded {
                old_id: old_id.to_string(),
                new_id: new_id.clone(),
                reason,
            }
        };

        match registry.update_external_id(old_id, &new_id) {
            Ok(true) => {}
            Ok(false) => return Err(partial("id refresh refused".to_string())),
            Err(err) => return Err(partial(err.to_string())),
        }
        match registry.update_status(&new_id, StubStatus::Completed, Some(now)) {
            Ok(true) => {}
            Ok(false) => return Err(partial("status update refused".to_string())),
            Err(err) => return Err(partial(err.to_string())),
        }

        info!(external_id = %new_id, subject = %record.subject, "stub completed");
        Ok(true)
    }
}
