//! One ingestion run over the source folder.

use crate::error::SourceError;
use crate::processing::cleaner::TextCleaner;
use crate::processing::metadata::MetadataExtractor;
use crate::source::{Connector, RawMessage};
use crate::stub::classifier::{Classifier, StubTag};
use crate::stub::config::FolderConfig;
use crate::stub::manager::{StubIntake, StubManager};
use crate::stub::matcher::{DocumentIdentity, StubMatcher, find_matching_stub};
use crate::stub::registry::StubRegistry;
use crate::stub::timestamp;
use chrono::{DateTime, FixedOffset, Local};
use serde::{Deserialize, Serialize};
use tracing::{error, info, warn};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunSummary {
    #[serde(with = "timestamp")]
    pub started_at: DateTime<FixedOffset>,
    #[serde(with = "timestamp")]
    pub finished_at: DateTime<FixedOffset>,
    pub messages_seen: usize,
    pub complete_indexed: usize,
    pub stubs_created: usize,
    pub stubs_completed: usize,
    pub duplicates: usize,
    pub errors: usize,
    #[serde(default)]
    pub failures: Vec<String>,
}

impl RunSummary {
    fn begin(now: DateTime<FixedOffset>) -> Self {
        Self {
            started_at: now,
            finished_at: now,
            messages_seen: 0,
            complete_indexed: 0,
            stubs_created: 0,
            stubs_completed: 0,
            duplicates: 0,
            errors: 0,
            failures: Vec::new(),
        }
    }

    fn fail(&mut self, message: &RawMessage, reason: impl std::fmt::Display) {
        error!(external_id = %message.external_id, subject = %message.subject, "{reason}");
        self.errors += 1;
        self.failures.push(format!("{}: {reason}", message.subject));
    }

    pub fn duration_secs(&self) -> f64 {
        (self.finished_at - self.started_at).num_milliseconds() as f64 / 1000.0
    }
}

pub struct SyncPipeline<'a, C> {
    pub connector: &'a C,
    pub classifier: &'a Classifier,
    pub cleaner: &'a dyn TextCleaner,
    pub extractor: &'a dyn MetadataExtractor,
    pub folders: &'a FolderConfig,
}

impl<C: Connector> SyncPipeline<'_, C> {
    /// Classify and route every message in the source folder, oldest first.
    /// `max_messages == 0` means no limit. Per-message failures are counted
    /// and the run carries on; only an unreadable source folder aborts it.
    pub fn run(
        &self,
        registry: &mut StubRegistry,
        max_messages: usize,
    ) -> Result<RunSummary, SourceError> {
        let mut summary = RunSummary::begin(Local::now().fixed_offset());
        let mut messages = self.connector.list_messages(&self.folders.source)?;
        if max_messages > 0 && messages.len() > max_messages {
            info!(
                available = messages.len(),
                max_messages, "limiting run to the oldest messages"
            );
            messages.truncate(max_messages);
        }
        summary.messages_seen = messages.len();

        let manager = StubManager::new(
            self.connector,
            self.folders.holding.as_str(),
            self.folders.archive.as_str(),
        );
        let matcher = StubMatcher::new(self.connector, self.folders.archive.as_str());

        for message in &messages {
            let cleaned = self.cleaner.clean(&message.body);
            let verdict = self.classifier.classify_cleaned(&cleaned);
            let meta = self
                .extractor
                .extract(&message.subject, &cleaned, &message.received_at);
            info!(
                external_id = %message.external_id,
                tag = %verdict.tag,
                rule = verdict.rule,
                "processing message"
            );

            match verdict.tag {
                StubTag::Stub => match manager.process_stub(registry, message, meta.story_id) {
                    Ok(StubIntake::Registered { .. }) => summary.stubs_created += 1,
                    Ok(StubIntake::Duplicate { .. }) => summary.duplicates += 1,
                    Err(err) => summary.fail(message, format!("[{}] {err}", err.code().as_str())),
                },
                StubTag::Complete => {
                    let doc = DocumentIdentity::new(&message.subject, &message.received_at, meta.story_id);
                    if let Some(hit) = find_matching_stub(registry, &doc) {
                        info!(
                            external_id = %hit.record.external_id,
                            kind = hit.kind.as_str(),
                            "complete document matches a pending stub"
                        );
                        match matcher.complete_stub(registry, &hit.record, Local::now().fixed_offset()) {
                            Ok(true) => summary.stubs_completed += 1,
                            Ok(false) => {}
                            Err(err) => {
                                summary.fail(message, format!("[{}] {err}", err.code().as_str()))
                            }
                        }
                    }

                    match self.connector.move_message(&message.external_id, &self.folders.indexed) {
                        Ok(_) => summary.complete_indexed += 1,
                        Err(err) => summary.fail(message, format!("failed to move to indexed: {err}")),
                    }
                }
            }
        }

        summary.finished_at = Local::now().fixed_offset();
        if summary.errors > 0 {
            warn!(errors = summary.errors, "sync finished with errors");
        }
        info!(
            seen = summary.messages_seen,
            indexed = summary.complete_indexed,
            stubs_created = summary.stubs_created,
            stubs_completed = summary.stubs_completed,
            "sync finished"
        );
        Ok(summary)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::processing::cleaner::BasicCleaner;
    use crate::processing::metadata::PatternExtractor;
    use crate::source::mailbox::{MailboxConnector, MessageFile};
    use crate::stub::config::ClassifierConfig;
    use crate::stub::registry::StubStatus;
    use tempfile::tempdir;

    const ARTICLE: &str = "(Bloomberg) -- The Federal Reserve raised interest rates on Wednesday, \
lifting its benchmark to the highest level in more than two decades as officials pressed on \
with their campaign against inflation.\n\nPolicymakers signaled they remain open to further \
increases, while noting the economy has held up better than expected.\n\nTopics\nCentral Banks";

    fn message(subject: &str, body: &str, at: &str) -> MessageFile {
        MessageFile {
            subject: subject.to_string(),
            body: body.to_string(),
            sender: "feed@example.com".to_string(),
            received_at: DateTime::parse_from_rfc3339(at).expect("timestamp"),
        }
    }

    #[test]
    fn placeholder_then_article_completes_the_stub() {
        let tmp = tempdir().expect("tempdir");
        let mailbox = MailboxConnector::new(tmp.path().join("mailbox"));
        let folders = FolderConfig::default();
        mailbox
            .ensure_folders([
                folders.source.as_str(),
                folders.indexed.as_str(),
                folders.holding.as_str(),
                folders.archive.as_str(),
            ])
            .expect("folders");
        let classifier = Classifier::new(ClassifierConfig::default());
        let cleaner = BasicCleaner::new();
        let pipeline = SyncPipeline {
            connector: &mailbox,
            classifier: &classifier,
            cleaner: &cleaner,
            extractor: &PatternExtractor,
            folders: &folders,
        };
        let mut registry = StubRegistry::open(tmp.path().join("reg.json")).expect("open");

        mailbox
            .deliver(
                "inbox",
                "stub",
                &message(
                    "Fed Raises Rates",
                    "Alert: SPOTLIGHT NEWS\nSource: BN (Bloomberg News)\nTickers\nAAPL US",
                    "2024-01-15T09:00:00Z",
                ),
            )
            .expect("stub");
        let first = pipeline.run(&mut registry, 0).expect("first run");
        assert_eq!(first.stubs_created, 1);
        assert_eq!(first.errors, 0);
        assert_eq!(registry.pending().count(), 1);

        mailbox
            .deliver(
                "inbox",
                "full",
                &message("(XX) Fed Raises Rates", ARTICLE, "2024-01-15T15:00:00Z"),
            )
            .expect("article");
        let second = pipeline.run(&mut registry, 0).expect("second run");
        assert_eq!(second.messages_seen, 1);
        assert_eq!(second.stubs_completed, 1);
        assert_eq!(second.complete_indexed, 1);

        let stats = registry.statistics();
        assert_eq!((stats.completed, stats.pending), (1, 0));
        assert_eq!(registry.records()[0].status, StubStatus::Completed);
        assert_eq!(mailbox.list_messages("processed").expect("archive").len(), 1);
        assert_eq!(mailbox.list_messages("indexed").expect("indexed").len(), 1);
        assert!(mailbox.list_messages("inbox").expect("inbox").is_empty());
    }

    #[test]
    fn message_limit_takes_the_oldest() {
        let tmp = tempdir().expect("tempdir");
        let mailbox = MailboxConnector::new(tmp.path().join("mailbox"));
        let folders = FolderConfig::default();
        mailbox
            .ensure_folders(["inbox", "indexed", "stubs", "processed"])
            .expect("folders");
        for (stem, at) in [("b", "2024-01-15T11:00:00Z"), ("a", "2024-01-15T10:00:00Z")] {
            mailbox
                .deliver("inbox", stem, &message(stem, ARTICLE, at))
                .expect("deliver");
        }
        let classifier = Classifier::new(ClassifierConfig::default());
        let pipeline = SyncPipeline {
            connector: &mailbox,
            classifier: &classifier,
            cleaner: &BasicCleaner::new(),
            extractor: &PatternExtractor,
            folders: &folders,
        };
        let mut registry = StubRegistry::open(tmp.path().join("reg.json")).expect("open");

        let summary = pipeline.run(&mut registry, 1).expect("run");
        assert_eq!(summary.messages_seen, 1);
        let left = mailbox.list_messages("inbox").expect("inbox");
        assert_eq!(left.len(), 1);
        assert_eq!(left[0].subject, "b");
    }

    #[test]
    fn missing_source_folder_aborts_the_run() {
        let tmp = tempdir().expect("tempdir");
        let mailbox = MailboxConnector::new(tmp.path().join("mailbox"));
        let folders = FolderConfig::default();
        let classifier = Classifier::new(ClassifierConfig::default());
        let pipeline = SyncPipeline {
            connector: &mailbox,
            classifier: &classifier,
            cleaner: &BasicCleaner::new(),
            extractor: &PatternExtractor,
            folders: &folders,
        };
        let mut registry = StubRegistry::open(tmp.path().join("reg.json")).expect("open");
        assert!(matches!(
            pipeline.run(&mut registry, 0),
            Err(SourceError::FolderMissing(_))
        ));
    }
}
