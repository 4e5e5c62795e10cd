use crate::stub::paths::StubPaths;
use crate::stub::util::now_epoch_secs;
use anyhow::{Context, Result};
use serde::Serialize;
use std::fs;
use std::io::Write;

pub const AUDIT_FILE: &str = "audit.log";

#[derive(Debug, Clone, Serialize)]
pub struct AuditEvent<'a> {
    pub at_epoch_secs: u64,
    pub command: &'a str,
    pub status: &'a str,
    pub message: &'a str,
}

/// Append one JSON line to `logs/audit.log`.
pub fn append_event(paths: &StubPaths, command: &str, status: &str, message: &str) -> Result<()> {
    fs::create_dir_all(&paths.logs_dir)
        .with_context(|| format!("failed to create {}", paths.logs_dir.display()))?;
    let event = AuditEvent {
        at_epoch_secs: now_epoch_secs()?,
        command,
        status,
        message,
    };

    let line = format!("{}\n", serde_json::to_string(&event)?);
    let path = paths.logs_dir.join(AUDIT_FILE);
    let mut file = fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(&path)
        .with_context(|| format!("failed to open {}", path.display()))?;
    file.write_all(line.as_bytes())
        .with_context(|| format!("failed to append {}", path.display()))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn events_append_as_json_lines() {
        let tmp = tempdir().expect("tempdir");
        let paths = StubPaths::under(tmp.path().to_path_buf());
        append_event(&paths, "sync", "ok", "seen=2").expect("first");
        append_event(&paths, "reconcile", "issues", "failures=1").expect("second");

        let raw = fs::read_to_string(paths.logs_dir.join(AUDIT_FILE)).expect("read");
        let lines = raw.lines().collect::<Vec<_>>();
        assert_eq!(lines.len(), 2);
        let second: serde_json::Value = serde_json::from_str(lines[1]).expect("json");
        assert_eq!(second["command"], "reconcile");
        assert_eq!(second["status"], "issues");
    }
}
