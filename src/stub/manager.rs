use crate::error::StubError;
use crate::source::{Connector, RawMessage};
use crate::stub::fingerprint::fingerprint;
use crate::stub::registry::{StubRecord, StubRegistry};
use tracing::{error, info, warn};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StubIntake {
    /// New record, message now in the holding folder under `external_id`.
    Registered { external_id: String },
    /// Already registered. `moved` is true when a message left behind by an
    /// earlier run was moved into holding this time.
    Duplicate { moved: bool },
}

/// Registers stubs and parks their messages in the holding folder.
pub struct StubManager<C> {
    connector: C,
    holding_folder: String,
    archive_folder: String,
}

impl<C: Connector> StubManager<C> {
    pub fn new(
        connector: C,
        holding_folder: impl Into<String>,
        archive_folder: impl Into<String>,
    ) -> Self {
        Self {
            connector,
            holding_folder: holding_folder.into(),
            archive_folder: archive_folder.into(),
        }
    }

    /// A message whose record is already COMPLETED goes straight to the
    /// archive so later runs stop seeing it.
    fn retire(&self, registry: &mut StubRegistry, old_id: &str) -> Result<bool, StubError> {
        let new_id = match self.connector.move_message(old_id, &self.archive_folder) {
            Ok(id) => id,
            Err(err) => {
                warn!(external_id = old_id, "could not archive completed stub's message: {err}");
                return Ok(false);
            }
        };
        match registry.update_external_id(old_id, &new_id) {
            Ok(true) => {
                info!(old_id, new_id = %new_id, "archived message of completed stub");
                Ok(true)
            }
            Ok(false) => Err(StubError::MovedNotRecorded {
                old_id: old_id.to_string(),
                new_id,
                reason: "id refresh refused".to_string(),
            }),
            Err(err) => Err(StubError::MovedNotRecorded {
                old_id: old_id.to_string(),
                new_id,
                reason: err.to_string(),
            }),
        }
    }

    fn park(&self, registry: &mut StubRegistry, old_id: &str) -> Result<String, StubError> {
        let new_id = self
            .connector
            .move_message(old_id, &self.holding_folder)
            .map_err(|source| {
                error!(external_id = old_id, "stub registered but not moved to holding: {source}");
                StubError::RegisteredNotMoved {
                    external_id: old_id.to_string(),
                    source,
                }
            })?;

        let refreshed = registry
            .update_external_id(old_id, &new_id)
            .map_err(|err| err.to_string())
            .and_then(|ok| {
                if ok {
                    Ok(())
                } else {
                    Err("id refresh refused".to_string())
                }
            });
        if let Err(reason) = refreshed {
            error!(old_id, new_id = %new_id, "stub moved but registry not updated: {reason}");
            return Err(StubError::MovedNotRecorded {
                old_id: old_id.to_string(),
                new_id,
                reason,
            });
        }
        Ok(new_id)
    }

    pub fn process_stub(
        &self,
        registry: &mut StubRegistry,
        message: &RawMessage,
        story_id: Option<String>,
    ) -> Result<StubIntake, StubError> {
        let record = StubRecord::pending(
            message.external_id.clone(),
            story_id.filter(|id| !id.trim().is_empty()),
            fingerprint(&message.subject, &message.received_at),
            message.subject.clone(),
            message.received_at,
        );

        if !registry.register(record)? {
            let still_pending = registry
                .get(&message.external_id)
                .is_some_and(StubRecord::is_pending);
            if !still_pending {
                let moved = self.retire(registry, &message.external_id)?;
                return Ok(StubIntake::Duplicate { moved });
            }
            return match self.park(registry, &message.external_id) {
                Ok(new_id) => {
                    info!(external_id = %new_id, "moved previously registered stub into holding");
                    Ok(StubIntake::Duplicate { moved: true })
                }
                Err(err) => {
                    warn!(external_id = %message.external_id, "retrying holding move failed: {err}");
                    Ok(StubIntake::Duplicate { moved: false })
                }
            };
        }

        let new_id = self.park(registry, &message.external_id)?;
        info!(external_id = %new_id, subject = %message.subject, "stub registered");
        Ok(StubIntake::Registered { external_id: new_id })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::source::mailbox::{MailboxConnector, MessageFile};
    use crate::stub::registry::StubStatus;
    use chrono::DateTime;
    use tempfile::tempdir;

    fn placeholder() -> MessageFile {
        MessageFile {
            subject: "Fed Raises Rates".to_string(),
            body: "Alert: SPOTLIGHT NEWS\nSource: BN\nTickers\nAAPL US".to_string(),
            sender: "feed@example.com".to_string(),
            received_at: DateTime::parse_from_rfc3339("2024-01-15T09:00:00Z").expect("ts"),
        }
    }

    #[test]
    fn stub_is_registered_and_parked() {
        let tmp = tempdir().expect("tempdir");
        let mailbox = MailboxConnector::new(tmp.path().join("mailbox"));
        mailbox.ensure_folders(["inbox", "stubs"]).expect("folders");
        let id = mailbox.deliver("inbox", "m1", &placeholder()).expect("deliver");
        let message = mailbox.read_message(&id).expect("read");

        let mut registry = StubRegistry::open(tmp.path().join("reg.json")).expect("open");
        let manager = StubManager::new(&mailbox, "stubs", "processed");
        let intake = manager
            .process_stub(&mut registry, &message, Some("L1".into()))
            .expect("intake");

        let StubIntake::Registered { external_id } = intake else {
            panic!("expected registration, got {intake:?}");
        };
        assert!(external_id.starts_with("stubs:"));
        let record = registry.get(&external_id).expect("record under new id");
        assert_eq!(record.status, StubStatus::Pending);
        assert_eq!(record.story_id.as_deref(), Some("L1"));
        assert_eq!(record.fingerprint, "fed raises rates_20240115");
        assert!(registry.get(&id).is_none());
    }

    #[test]
    fn move_failure_is_partial_state() {
        let tmp = tempdir().expect("tempdir");
        let mailbox = MailboxConnector::new(tmp.path().join("mailbox"));
        let id = mailbox.deliver("inbox", "m1", &placeholder()).expect("deliver");
        let message = mailbox.read_message(&id).expect("read");

        let mut registry = StubRegistry::open(tmp.path().join("reg.json")).expect("open");
        let manager = StubManager::new(&mailbox, "stubs", "processed");
        let err = manager
            .process_stub(&mut registry, &message, None)
            .expect_err("holding folder missing");
        assert!(matches!(err, StubError::RegisteredNotMoved { .. }));
        assert!(registry.get(&id).expect("still registered").is_pending());

        mailbox.ensure_folders(["stubs"]).expect("folders");
        let intake = manager
            .process_stub(&mut registry, &message, None)
            .expect("retry");
        assert_eq!(intake, StubIntake::Duplicate { moved: true });
        assert_eq!(registry.len(), 1);
        assert!(registry.records()[0].external_id.starts_with("stubs:"));
    }

    #[test]
    fn completed_duplicate_is_archived_once() {
        let tmp = tempdir().expect("tempdir");
        let mailbox = MailboxConnector::new(tmp.path().join("mailbox"));
        mailbox.ensure_folders(["inbox", "stubs", "processed"]).expect("folders");
        let id = mailbox.deliver("inbox", "m1", &placeholder()).expect("deliver");
        let message = mailbox.read_message(&id).expect("read");

        let mut registry = StubRegistry::open(tmp.path().join("reg.json")).expect("open");
        registry
            .register(StubRecord::pending(
                id.clone(),
                None,
                fingerprint(&message.subject, &message.received_at),
                message.subject.clone(),
                message.received_at,
            ))
            .expect("register");
        let done_at = DateTime::parse_from_rfc3339("2024-01-15T12:00:00Z").expect("ts");
        registry
            .update_status(&id, StubStatus::Completed, Some(done_at))
            .expect("complete");

        let manager = StubManager::new(&mailbox, "stubs", "processed");
        let intake = manager
            .process_stub(&mut registry, &message, None)
            .expect("intake");
        assert_eq!(intake, StubIntake::Duplicate { moved: true });

        assert!(mailbox.list_messages("inbox").expect("inbox").is_empty());
        let archived = mailbox.list_messages("processed").expect("archive");
        assert_eq!(archived.len(), 1);
        let record = registry.get(&archived[0].external_id).expect("record follows the move");
        assert_eq!(record.status, StubStatus::Completed);
        assert_eq!(record.completed_at, Some(done_at));
        assert_eq!(registry.len(), 1);
    }
}
