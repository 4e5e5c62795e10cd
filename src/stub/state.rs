use crate::stub::paths::StubPaths;
use crate::stub::pipeline::RunSummary;
use crate::stub::sweep::SweepOutcome;
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::PathBuf;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SweepRecord {
    pub at_epoch_secs: u64,
    pub documents_scanned: usize,
    pub completed: usize,
    pub relinked: usize,
    pub failures: usize,
}

impl SweepRecord {
    pub fn from_outcome(at_epoch_secs: u64, outcome: &SweepOutcome) -> Self {
        Self {
            at_epoch_secs,
            documents_scanned: outcome.documents_scanned,
            completed: outcome.completed + outcome.completed_in_place,
            relinked: outcome.relinked,
            failures: outcome.failures.len(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StubsyncState {
    pub schema_version: u32,
    pub last_sync: Option<RunSummary>,
    pub last_sweep: Option<SweepRecord>,
}

impl Default for StubsyncState {
    fn default() -> Self {
        Self {
            schema_version: 1,
            last_sync: None,
            last_sweep: None,
        }
    }
}

pub fn load(paths: &StubPaths) -> Result<StubsyncState> {
    let file = &paths.state_file;
    if !file.exists() {
        return Ok(StubsyncState::default());
    }

    let raw =
        fs::read_to_string(file).with_context(|| format!("failed to read {}", file.display()))?;
    let parsed: StubsyncState = serde_json::from_str(&raw)
        .with_context(|| format!("failed to parse {}", file.display()))?;
    Ok(parsed)
}

pub fn save(paths: &StubPaths, state: &StubsyncState) -> Result<PathBuf> {
    let file = paths.state_file.clone();
    if let Some(parent) = file.parent() {
        fs::create_dir_all(parent)
            .with_context(|| format!("failed to create {}", parent.display()))?;
    }
    let data = serde_json::to_string_pretty(state)?;
    fs::write(&file, format!("{data}\n"))
        .with_context(|| format!("failed to write {}", file.display()))?;
    Ok(file)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn missing_state_loads_default_and_saves_round_trip() {
        let tmp = tempdir().expect("tempdir");
        let paths = StubPaths::under(tmp.path().to_path_buf());
        let mut state = load(&paths).expect("default");
        assert!(state.last_sync.is_none());

        state.last_sweep = Some(SweepRecord {
            at_epoch_secs: 42,
            documents_scanned: 3,
            completed: 1,
            relinked: 0,
            failures: 0,
        });
        let written = save(&paths, &state).expect("save");
        assert_eq!(written, paths.state_file);
        let reloaded = load(&paths).expect("reload");
        assert_eq!(reloaded.last_sweep.expect("sweep").completed, 1);
    }
}
