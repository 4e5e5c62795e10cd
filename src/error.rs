use std::path::PathBuf;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum SourceError {
    #[error("folder not found: {0}")]
    FolderMissing(String),
    #[error("message not found: {0}")]
    MessageNotFound(String),
    #[error("message {id} is malformed: {reason}")]
    Malformed { id: String, reason: String },
    #[error("connector call `{op}` timed out after {millis}ms")]
    Timeout { op: &'static str, millis: u64 },
    #[error("connector unavailable: {0}")]
    Unavailable(String),
    #[error("mailbox i/o failed at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

#[derive(Debug, Error)]
pub enum RegistryError {
    #[error("failed to read registry {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to write registry {path}: {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("registry {path} is unreadable: {reason}")]
    Corrupt { path: PathBuf, reason: String },
    #[error("failed to encode registry: {0}")]
    Encode(#[from] serde_json::Error),
}

#[derive(Debug, Error)]
pub enum StubError {
    #[error(transparent)]
    Source(#[from] SourceError),
    #[error(transparent)]
    Registry(#[from] RegistryError),
    #[error("stub {external_id} registered but not moved to holding: {source}")]
    RegisteredNotMoved {
        external_id: String,
        #[source]
        source: SourceError,
    },
    #[error("stub moved ({old_id} -> {new_id}) but registry not updated: {reason}")]
    MovedNotRecorded {
        old_id: String,
        new_id: String,
        reason: String,
    },
}

impl StubError {
    pub fn code(&self) -> ErrorCode {
        match self {
            Self::Source(_) => ErrorCode::E003SourceUnavailable,
            Self::Registry(_) => ErrorCode::E002RegistryIo,
            Self::RegisteredNotMoved { .. } | Self::MovedNotRecorded { .. } => {
                ErrorCode::E004PartialState
            }
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCode {
    E001Locked,
    E002RegistryIo,
    E003SourceUnavailable,
    E004PartialState,
    E005ConfigInvalid,
}

impl ErrorCode {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::E001Locked => "E001_LOCKED",
            Self::E002RegistryIo => "E002_REGISTRY_IO",
            Self::E003SourceUnavailable => "E003_SOURCE_UNAVAILABLE",
            Self::E004PartialState => "E004_PARTIAL_STATE",
            Self::E005ConfigInvalid => "E005_CONFIG_INVALID",
        }
    }
}
