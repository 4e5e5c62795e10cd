pub mod mailbox;
pub mod timeout;

use crate::error::SourceError;
use chrono::{DateTime, FixedOffset};
use serde::Serialize;

/// One message as the source hands it over. The id is only good until the
/// message is moved.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RawMessage {
    pub external_id: String,
    pub subject: String,
    pub body: String,
    pub received_at: DateTime<FixedOffset>,
    pub sender: String,
}

pub trait Connector {
    fn list_messages(&self, folder: &str) -> Result<Vec<RawMessage>, SourceError>;

    /// Move a message and return the identifier it carries in `target`.
    fn move_message(&self, external_id: &str, target: &str) -> Result<String, SourceError>;

    fn delete(&self, external_id: &str) -> Result<(), SourceError>;
}

impl<C: Connector + ?Sized> Connector for &C {
    fn list_messages(&self, folder: &str) -> Result<Vec<RawMessage>, SourceError> {
        (**self).list_messages(folder)
    }

    fn move_message(&self, external_id: &str, target: &str) -> Result<String, SourceError> {
        (**self).move_message(external_id, target)
    }

    fn delete(&self, external_id: &str) -> Result<(), SourceError> {
        (**self).delete(external_id)
    }
}
