//! Persistent registry of stub records.
//!
//! The whole document is loaded at open and rewritten after every mutation
//! through a temp file in the same directory, then renamed over the target.
//! A mutation whose save fails is rolled back in memory.

use crate::error::RegistryError;
use crate::stub::timestamp;
use chrono::{DateTime, FixedOffset, Local};
use serde::{Deserialize, Serialize};
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use tracing::{debug, error, info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StubStatus {
    Pending,
    Completed,
}

impl StubStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Completed => "completed",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StubRecord {
    #[serde(alias = "outlook_entry_id")]
    pub external_id: String,
    #[serde(default)]
    pub story_id: Option<String>,
    pub fingerprint: String,
    pub subject: String,
    #[serde(rename = "received_time", with = "timestamp")]
    pub received_at: DateTime<FixedOffset>,
    pub status: StubStatus,
    #[serde(default, with = "timestamp::option")]
    pub completed_at: Option<DateTime<FixedOffset>>,
}

impl StubRecord {
    pub fn pending(
        external_id: impl Into<String>,
        story_id: Option<String>,
        fingerprint: impl Into<String>,
        subject: impl Into<String>,
        received_at: DateTime<FixedOffset>,
    ) -> Self {
        Self {
            external_id: external_id.into(),
            story_id,
            fingerprint: fingerprint.into(),
            subject: subject.into(),
            received_at,
            status: StubStatus::Pending,
            completed_at: None,
        }
    }

    pub fn is_pending(&self) -> bool {
        self.status == StubStatus::Pending
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RegistryStats {
    pub total: usize,
    pub pending: usize,
    pub completed: usize,
    pub pending_with_story_id: usize,
    pub pending_without_story_id: usize,
}

#[derive(Debug)]
pub struct StubRegistry {
    path: PathBuf,
    records: Vec<StubRecord>,
    quarantined: Option<PathBuf>,
}

fn quarantine_path(path: &Path) -> PathBuf {
    let stamp = crate::stub::util::now_epoch_secs().unwrap_or_default();
    let name = path
        .file_name()
        .and_then(|n| n.to_str())
        .unwrap_or("stub_registry.json");
    path.with_file_name(format!("{name}.corrupt-{stamp}"))
}

impl StubRegistry {
    /// Load the registry at `path`. A missing file is an empty registry; a file
    /// that does not parse is moved aside and the registry starts empty.
    pub fn open(path: impl Into<PathBuf>) -> Result<Self, RegistryError> {
        Self::load(path.into(), true)
    }

    /// Load without touching the file. An unreadable document is an error.
    pub fn open_read_only(path: impl Into<PathBuf>) -> Result<Self, RegistryError> {
        Self::load(path.into(), false)
    }

    fn load(path: PathBuf, quarantine: bool) -> Result<Self, RegistryError> {
        if !path.exists() {
            info!(path = %path.display(), "no registry yet, starting empty");
            return Ok(Self {
                path,
                records: Vec::new(),
                quarantined: None,
            });
        }

        let raw = fs::read_to_string(&path).map_err(|source| RegistryError::Read {
            path: path.clone(),
            source,
        })?;
        if raw.trim().is_empty() {
            return Ok(Self {
                path,
                records: Vec::new(),
                quarantined: None,
            });
        }

        match serde_json::from_str::<Vec<StubRecord>>(&raw) {
            Ok(records) => {
                info!(count = records.len(), "loaded stub registry");
                Ok(Self {
                    path,
                    records,
                    quarantined: None,
                })
            }
            Err(err) if !quarantine => Err(RegistryError::Corrupt {
                path,
                reason: err.to_string(),
            }),
            Err(err) => {
                let aside = quarantine_path(&path);
                error!(
                    path = %path.display(),
                    moved_to = %aside.display(),
                    "registry unreadable ({err}); starting empty"
                );
                fs::rename(&path, &aside).map_err(|source| RegistryError::Write {
                    path: aside.clone(),
                    source,
                })?;
                Ok(Self {
                    path,
                    records: Vec::new(),
                    quarantined: Some(aside),
                })
            }
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Where an unreadable registry was moved at open, if that happened.
    pub fn quarantined(&self) -> Option<&Path> {
        self.quarantined.as_deref()
    }

    pub fn records(&self) -> &[StubRecord] {
        &self.records
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn get(&self, external_id: &str) -> Option<&StubRecord> {
        self.records.iter().find(|r| r.external_id == external_id)
    }

    fn position(&self, external_id: &str) -> Option<usize> {
        self.records.iter().position(|r| r.external_id == external_id)
    }

    pub fn pending(&self) -> impl Iterator<Item = &StubRecord> {
        self.records.iter().filter(|r| r.is_pending())
    }

    pub fn completed(&self) -> impl Iterator<Item = &StubRecord> {
        self.records.iter().filter(|r| !r.is_pending())
    }

    /// Append `record` as PENDING. Returns false when its external id is
    /// already registered; the existing record is left untouched.
    pub fn register(&mut self, mut record: StubRecord) -> Result<bool, RegistryError> {
        if self.get(&record.external_id).is_some() {
            warn!(external_id = %record.external_id, "stub already registered");
            return Ok(false);
        }

        record.status = StubStatus::Pending;
        record.completed_at = None;
        debug!(
            external_id = %record.external_id,
            fingerprint = %record.fingerprint,
            story_id = record.story_id.as_deref().unwrap_or("-"),
            "registering stub"
        );
        self.records.push(record);

        if let Err(err) = self.save() {
            self.records.pop();
            return Err(err);
        }
        Ok(true)
    }

    pub fn find_by_story_id(&self, story_id: &str) -> Option<&StubRecord> {
        if story_id.trim().is_empty() {
            return None;
        }
        self.pending()
            .find(|r| r.story_id.as_deref() == Some(story_id))
    }

    pub fn find_by_fingerprint(&self, fingerprint: &str) -> Option<&StubRecord> {
        if fingerprint.is_empty() {
            return None;
        }
        self.pending().find(|r| r.fingerprint == fingerprint)
    }

    /// Returns true when the record changed. Unknown ids, repeated
    /// completions and COMPLETED -> PENDING are refused with false.
    pub fn update_status(
        &mut self,
        external_id: &str,
        status: StubStatus,
        completed_at: Option<DateTime<FixedOffset>>,
    ) -> Result<bool, RegistryError> {
        let Some(idx) = self.position(external_id) else {
            warn!(external_id, "stub not found for status update");
            return Ok(false);
        };

        let current = self.records[idx].status;
        if current == status {
            debug!(external_id, status = status.as_str(), "status unchanged");
            return Ok(false);
        }
        if current == StubStatus::Completed {
            warn!(external_id, "refusing to reopen a completed stub");
            return Ok(false);
        }

        let before = self.records[idx].clone();
        let record = &mut self.records[idx];
        record.status = status;
        record.completed_at = Some(completed_at.unwrap_or_else(|| Local::now().fixed_offset()));

        if let Err(err) = self.save() {
            self.records[idx] = before;
            return Err(err);
        }
        info!(external_id, status = status.as_str(), "stub status updated");
        Ok(true)
    }

    /// Point the record known as `old_id` at the identifier the source
    /// assigned after a move.
    pub fn update_external_id(&mut self, old_id: &str, new_id: &str) -> Result<bool, RegistryError> {
        let Some(idx) = self.position(old_id) else {
            warn!(old_id, new_id, "stub not found for id refresh");
            return Ok(false);
        };
        if old_id == new_id {
            return Ok(true);
        }
        if self.get(new_id).is_some() {
            warn!(old_id, new_id, "new id already belongs to another stub");
            return Ok(false);
        }

        self.records[idx].external_id = new_id.to_string();
        if let Err(err) = self.save() {
            self.records[idx].external_id = old_id.to_string();
            return Err(err);
        }
        debug!(old_id, new_id, "stub id refreshed");
        Ok(true)
    }

    pub fn remove(&mut self, external_id: &str) -> Result<bool, RegistryError> {
        let Some(idx) = self.position(external_id) else {
            return Ok(false);
        };
        let removed = self.records.remove(idx);
        if let Err(err) = self.save() {
            self.records.insert(idx, removed);
            return Err(err);
        }
        Ok(true)
    }

    pub fn replace_all(&mut self, records: Vec<StubRecord>) -> Result<(), RegistryError> {
        let before = std::mem::replace(&mut self.records, records);
        if let Err(err) = self.save() {
            self.records = before;
            return Err(err);
        }
        Ok(())
    }

    pub fn statistics(&self) -> RegistryStats {
        let mut stats = RegistryStats {
            total: self.records.len(),
            ..RegistryStats::default()
        };
        for record in &self.records {
            match record.status {
                StubStatus::Pending => {
                    stats.pending += 1;
                    if record.story_id.is_some() {
                        stats.pending_with_story_id += 1;
                    } else {
                        stats.pending_without_story_id += 1;
                    }
                }
                StubStatus::Completed => stats.completed += 1,
            }
        }
        stats
    }

    pub fn save(&self) -> Result<(), RegistryError> {
        let parent = self
            .path
            .parent()
            .filter(|dir| !dir.as_os_str().is_empty())
            .unwrap_or_else(|| Path::new("."));
        let write_err = |source| RegistryError::Write {
            path: self.path.clone(),
            source,
        };

        fs::create_dir_all(parent).map_err(write_err)?;
        let data = serde_json::to_string_pretty(&self.records)?;

        let mut tmp = tempfile::NamedTempFile::new_in(parent).map_err(write_err)?;
        tmp.write_all(data.as_bytes()).map_err(write_err)?;
        tmp.write_all(b"\n").map_err(write_err)?;
        tmp.as_file().sync_all().map_err(write_err)?;
        tmp.persist(&self.path).map_err(|err| write_err(err.error))?;

        debug!(count = self.records.len(), path = %self.path.display(), "saved stub registry");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn ts(raw: &str) -> DateTime<FixedOffset> {
        DateTime::parse_from_rfc3339(raw).expect("timestamp")
    }

    fn record(id: &str, story: Option<&str>, fp: &str) -> StubRecord {
        StubRecord::pending(
            id,
            story.map(str::to_string),
            fp,
            "Fed Raises Rates",
            ts("2024-01-15T10:30:00.123456789+01:00"),
        )
    }

    #[test]
    fn register_rejects_duplicate_ids() {
        let tmp = tempdir().expect("tempdir");
        let mut registry = StubRegistry::open(tmp.path().join("reg.json")).expect("open");

        assert!(registry.register(record("A1", None, "fp_1")).expect("first"));
        let mut dup = record("A1", Some("S9"), "fp_other");
        dup.subject = "Different".into();
        assert!(!registry.register(dup).expect("second"));

        assert_eq!(registry.len(), 1);
        let kept = registry.get("A1").expect("kept");
        assert_eq!(kept.fingerprint, "fp_1");
        assert!(kept.is_pending());
    }

    #[test]
    fn register_forces_pending_status() {
        let tmp = tempdir().expect("tempdir");
        let mut registry = StubRegistry::open(tmp.path().join("reg.json")).expect("open");
        let mut rec = record("A1", None, "fp_1");
        rec.status = StubStatus::Completed;
        rec.completed_at = Some(ts("2024-01-16T00:00:00Z"));
        registry.register(rec).expect("register");
        let got = registry.get("A1").expect("record");
        assert_eq!(got.status, StubStatus::Pending);
        assert_eq!(got.completed_at, None);
    }

    #[test]
    fn save_then_open_reproduces_records() {
        let tmp = tempdir().expect("tempdir");
        let path = tmp.path().join("nested/reg.json");
        let mut registry = StubRegistry::open(&path).expect("open");
        registry.register(record("A1", Some("L1"), "fp_1")).expect("a1");
        registry.register(record("A2", None, "fp_2")).expect("a2");
        registry
            .update_status("A2", StubStatus::Completed, Some(ts("2024-01-16T08:00:00.5Z")))
            .expect("complete");

        let reopened = StubRegistry::open(&path).expect("reopen");
        assert_eq!(reopened.records(), registry.records());
        assert_eq!(
            reopened.get("A1").expect("a1").received_at.timestamp_subsec_nanos(),
            123_456_789
        );
    }

    #[test]
    fn document_uses_wire_field_names() {
        let tmp = tempdir().expect("tempdir");
        let path = tmp.path().join("reg.json");
        let mut registry = StubRegistry::open(&path).expect("open");
        registry.register(record("A1", None, "fp_1")).expect("a1");

        let raw = fs::read_to_string(&path).expect("read");
        let value: serde_json::Value = serde_json::from_str(&raw).expect("json");
        let entry = &value[0];
        assert_eq!(entry["external_id"], "A1");
        assert_eq!(entry["status"], "pending");
        assert_eq!(entry["received_time"], "2024-01-15T10:30:00.123456789+01:00");
        assert!(entry["story_id"].is_null());
        assert!(entry["completed_at"].is_null());
    }

    #[test]
    fn legacy_documents_still_load() {
        let tmp = tempdir().expect("tempdir");
        let path = tmp.path().join("reg.json");
        fs::write(
            &path,
            r#"[{"outlook_entry_id":"OLD1","story_id":null,"fingerprint":"fed raises rates_20240115",
                "subject":"Fed Raises Rates","received_time":"2024-01-15T10:30:00",
                "status":"pending","completed_at":null}]"#,
        )
        .expect("write");
        let registry = StubRegistry::open(&path).expect("open");
        let rec = registry.get("OLD1").expect("legacy record");
        assert_eq!(rec.received_at, ts("2024-01-15T10:30:00Z"));
    }

    #[test]
    fn lookups_only_see_pending_records() {
        let tmp = tempdir().expect("tempdir");
        let mut registry = StubRegistry::open(tmp.path().join("reg.json")).expect("open");
        registry.register(record("A1", Some("L1"), "fp_1")).expect("a1");
        registry.register(record("A2", Some("L1"), "fp_1")).expect("a2");

        assert_eq!(registry.find_by_story_id("L1").expect("hit").external_id, "A1");
        registry
            .update_status("A1", StubStatus::Completed, None)
            .expect("complete");
        assert_eq!(registry.find_by_story_id("L1").expect("hit").external_id, "A2");
        assert_eq!(registry.find_by_fingerprint("fp_1").expect("hit").external_id, "A2");
        assert!(registry.find_by_story_id("").is_none());
        assert!(registry.find_by_fingerprint("fp_missing").is_none());
    }

    #[test]
    fn status_transitions_are_one_way() {
        let tmp = tempdir().expect("tempdir");
        let mut registry = StubRegistry::open(tmp.path().join("reg.json")).expect("open");
        registry.register(record("A1", None, "fp_1")).expect("a1");

        let first = ts("2024-01-16T08:00:00Z");
        assert!(registry.update_status("A1", StubStatus::Completed, Some(first)).expect("c1"));
        assert!(!registry.update_status("A1", StubStatus::Completed, None).expect("c2"));
        assert!(!registry.update_status("A1", StubStatus::Pending, None).expect("reopen"));
        assert!(!registry.update_status("nope", StubStatus::Completed, None).expect("missing"));

        let rec = registry.get("A1").expect("a1");
        assert_eq!(rec.status, StubStatus::Completed);
        assert_eq!(rec.completed_at, Some(first));
    }

    #[test]
    fn external_id_refresh_guards_collisions() {
        let tmp = tempdir().expect("tempdir");
        let mut registry = StubRegistry::open(tmp.path().join("reg.json")).expect("open");
        registry.register(record("A1", None, "fp_1")).expect("a1");
        registry.register(record("A2", None, "fp_2")).expect("a2");

        assert!(registry.update_external_id("A1", "B1").expect("refresh"));
        assert!(registry.get("A1").is_none());
        assert_eq!(registry.get("B1").expect("b1").fingerprint, "fp_1");
        assert!(!registry.update_external_id("B1", "A2").expect("collision"));
        assert!(!registry.update_external_id("ghost", "C1").expect("missing"));
    }

    #[test]
    fn unreadable_document_is_quarantined() {
        let tmp = tempdir().expect("tempdir");
        let path = tmp.path().join("reg.json");
        fs::write(&path, "[{\"external_id\": \"A1\", truncated").expect("write");

        let mut registry = StubRegistry::open(&path).expect("open");
        assert!(registry.is_empty());
        let aside = registry.quarantined().expect("quarantined").to_path_buf();
        assert!(aside.exists());
        assert!(!path.exists());

        registry.register(record("A1", None, "fp_1")).expect("register after recovery");
        assert!(path.exists());
    }

    #[test]
    fn read_only_open_leaves_unreadable_document_alone() {
        let tmp = tempdir().expect("tempdir");
        let path = tmp.path().join("reg.json");
        fs::write(&path, "not json").expect("write");

        let err = StubRegistry::open_read_only(&path).expect_err("corrupt");
        assert!(matches!(err, RegistryError::Corrupt { .. }));
        assert!(path.exists());
    }

    #[test]
    fn failed_save_rolls_back_memory() {
        let tmp = tempdir().expect("tempdir");
        let blocker = tmp.path().join("not-a-dir");
        fs::write(&blocker, "file").expect("write blocker");
        let mut registry = StubRegistry::open(blocker.join("reg.json")).expect("open");

        assert!(registry.register(record("A1", None, "fp_1")).is_err());
        assert!(registry.is_empty());
    }

    #[test]
    fn statistics_split_pending_by_story_id() {
        let tmp = tempdir().expect("tempdir");
        let mut registry = StubRegistry::open(tmp.path().join("reg.json")).expect("open");
        registry.register(record("A1", Some("L1"), "fp_1")).expect("a1");
        registry.register(record("A2", None, "fp_2")).expect("a2");
        registry.register(record("A3", None, "fp_3")).expect("a3");
        registry
            .update_status("A3", StubStatus::Completed, None)
            .expect("complete");

        assert_eq!(
            registry.statistics(),
            RegistryStats {
                total: 3,
                pending: 2,
                completed: 1,
                pending_with_story_id: 1,
                pending_without_story_id: 1,
            }
        );
        assert_eq!(registry.completed().count(), 1);
    }

    #[test]
    fn remove_and_replace_persist() {
        let tmp = tempdir().expect("tempdir");
        let path = tmp.path().join("reg.json");
        let mut registry = StubRegistry::open(&path).expect("open");
        registry.register(record("A1", None, "fp_1")).expect("a1");
        assert!(registry.remove("A1").expect("remove"));
        assert!(!registry.remove("A1").expect("remove again"));

        registry
            .replace_all(vec![record("R1", None, "fp_r1"), record("R2", None, "fp_r2")])
            .expect("replace");
        assert_eq!(StubRegistry::open(&path).expect("reopen").len(), 2);
    }
}
