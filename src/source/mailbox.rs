//! Directory-backed mailbox: one directory per folder, one JSON file per
//! message. Moving a message renames it under a fresh digest-derived stem, so
//! identifiers go stale after a move the same way they do on a real mail
//! store.

use crate::error::SourceError;
use crate::source::{Connector, RawMessage};
use crate::stub::timestamp;
use chrono::{DateTime, FixedOffset};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{SystemTime, UNIX_EPOCH};
use tracing::{debug, warn};

const MESSAGE_EXT: &str = "json";

static MOVE_COUNTER: AtomicU64 = AtomicU64::new(0);

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MessageFile {
    pub subject: String,
    #[serde(default)]
    pub body: String,
    #[serde(default)]
    pub sender: String,
    #[serde(with = "timestamp")]
    pub received_at: DateTime<FixedOffset>,
}

#[derive(Debug, Clone)]
pub struct MailboxConnector {
    root: PathBuf,
}

fn io_err(path: &Path) -> impl FnOnce(std::io::Error) -> SourceError + '_ {
    move |source| SourceError::Io {
        path: path.to_path_buf(),
        source,
    }
}

fn split_id(external_id: &str) -> Result<(&str, &str), SourceError> {
    match external_id.rsplit_once(':') {
        Some((folder, stem)) if !folder.is_empty() && !stem.is_empty() => Ok((folder, stem)),
        _ => Err(SourceError::MessageNotFound(external_id.to_string())),
    }
}

fn fresh_stem(external_id: &str, target: &str) -> String {
    let nanos = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_nanos())
        .unwrap_or_default();
    let seq = MOVE_COUNTER.fetch_add(1, Ordering::Relaxed);
    let mut hasher = Sha256::new();
    hasher.update(external_id.as_bytes());
    hasher.update(target.as_bytes());
    hasher.update(nanos.to_le_bytes());
    hasher.update(seq.to_le_bytes());
    let digest = format!("{:x}", hasher.finalize());
    digest[..24].to_string()
}

impl MailboxConnector {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn folder_dir(&self, folder: &str) -> PathBuf {
        self.root.join(folder)
    }

    /// Create any of `folders` that do not exist yet.
    pub fn ensure_folders<'a>(
        &self,
        folders: impl IntoIterator<Item = &'a str>,
    ) -> Result<(), SourceError> {
        for folder in folders {
            let dir = self.folder_dir(folder);
            fs::create_dir_all(&dir).map_err(io_err(&dir))?;
        }
        Ok(())
    }

    fn message_path(&self, external_id: &str) -> Result<PathBuf, SourceError> {
        let (folder, stem) = split_id(external_id)?;
        let path = self.folder_dir(folder).join(format!("{stem}.{MESSAGE_EXT}"));
        if !path.is_file() {
            return Err(SourceError::MessageNotFound(external_id.to_string()));
        }
        Ok(path)
    }

    /// Drop a message into `folder`. Returns its identifier.
    pub fn deliver(&self, folder: &str, stem: &str, message: &MessageFile) -> Result<String, SourceError> {
        let dir = self.folder_dir(folder);
        fs::create_dir_all(&dir).map_err(io_err(&dir))?;
        let path = dir.join(format!("{stem}.{MESSAGE_EXT}"));
        let data = serde_json::to_string_pretty(message).map_err(|err| SourceError::Malformed {
            id: format!("{folder}:{stem}"),
            reason: err.to_string(),
        })?;
        fs::write(&path, format!("{data}\n")).map_err(io_err(&path))?;
        Ok(format!("{folder}:{stem}"))
    }

    pub fn read_message(&self, external_id: &str) -> Result<RawMessage, SourceError> {
        let path = self.message_path(external_id)?;
        read_message_file(&path, external_id)
    }
}

/// Parse a message file. `external_id` is the identifier reported back.
pub fn read_message_file(path: &Path, external_id: &str) -> Result<RawMessage, SourceError> {
    let raw = fs::read_to_string(path).map_err(io_err(path))?;
    let parsed: MessageFile = serde_json::from_str(&raw).map_err(|err| SourceError::Malformed {
        id: external_id.to_string(),
        reason: err.to_string(),
    })?;
    Ok(RawMessage {
        external_id: external_id.to_string(),
        subject: parsed.subject,
        body: parsed.body,
        received_at: parsed.received_at,
        sender: parsed.sender,
    })
}

impl Connector for MailboxConnector {
    fn list_messages(&self, folder: &str) -> Result<Vec<RawMessage>, SourceError> {
        let dir = self.folder_dir(folder);
        if !dir.is_dir() {
            return Err(SourceError::FolderMissing(folder.to_string()));
        }

        let mut out = Vec::new();
        for entry in fs::read_dir(&dir).map_err(io_err(&dir))? {
            let path = entry.map_err(io_err(&dir))?.path();
            if path.extension().and_then(|ext| ext.to_str()) != Some(MESSAGE_EXT) {
                continue;
            }
            let Some(stem) = path.file_stem().and_then(|s| s.to_str()) else {
                continue;
            };
            if stem.contains(':') {
                warn!(path = %path.display(), "skipping message file with ':' in its name");
                continue;
            }
            let external_id = format!("{folder}:{stem}");
            match read_message_file(&path, &external_id) {
                Ok(message) => out.push(message),
                Err(err) => warn!("skipping unreadable message: {err}"),
            }
        }

        out.sort_by(|a, b| {
            a.received_at
                .cmp(&b.received_at)
                .then_with(|| a.external_id.cmp(&b.external_id))
        });
        debug!(folder, count = out.len(), "listed mailbox folder");
        Ok(out)
    }

    fn move_message(&self, external_id: &str, target: &str) -> Result<String, SourceError> {
        let from = self.message_path(external_id)?;
        let target_dir = self.folder_dir(target);
        if !target_dir.is_dir() {
            return Err(SourceError::FolderMissing(target.to_string()));
        }

        let stem = fresh_stem(external_id, target);
        let to = target_dir.join(format!("{stem}.{MESSAGE_EXT}"));
        fs::rename(&from, &to).map_err(io_err(&from))?;

        let new_id = format!("{target}:{stem}");
        debug!(from = external_id, to = %new_id, "moved message");
        Ok(new_id)
    }

    fn delete(&self, external_id: &str) -> Result<(), SourceError> {
        let path = self.message_path(external_id)?;
        fs::remove_file(&path).map_err(io_err(&path))?;
        debug!(external_id, "deleted message");
        Ok(())
    }
}
