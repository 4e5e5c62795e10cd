use anyhow::{Result, anyhow};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::env;
use std::fs;
use std::path::PathBuf;

include!(concat!(env!("OUT_DIR"), "/stubsync_env_allowlist.rs"));

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ClassifierConfig {
    pub article_sentinel: String,
    pub byline_window_chars: usize,
    pub early_marker_window_chars: usize,
    pub thin_content_chars: usize,
    pub min_complete_chars: usize,
    pub operator_markers: Vec<String>,
    pub metadata_headers: Vec<String>,
}

impl Default for ClassifierConfig {
    fn default() -> Self {
        Self {
            article_sentinel: "(Bloomberg) --".to_string(),
            byline_window_chars: 500,
            early_marker_window_chars: 500,
            thin_content_chars: 200,
            min_complete_chars: 500,
            operator_markers: vec!["Alert:".to_string(), "Source:".to_string()],
            metadata_headers: vec![
                "Tickers".to_string(),
                "People".to_string(),
                "Topics".to_string(),
            ],
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct FolderConfig {
    pub source: String,
    pub indexed: String,
    pub holding: String,
    pub archive: String,
}

impl Default for FolderConfig {
    fn default() -> Self {
        Self {
            source: "inbox".to_string(),
            indexed: "indexed".to_string(),
            holding: "stubs".to_string(),
            archive: "processed".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ConnectorConfig {
    pub timeout_secs: u64,
}

impl Default for ConnectorConfig {
    fn default() -> Self {
        Self { timeout_secs: 30 }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct SyncConfig {
    /// Zero means no limit.
    pub max_messages_per_run: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct StubsyncConfig {
    pub classifier: ClassifierConfig,
    pub folders: FolderConfig,
    pub connector: ConnectorConfig,
    pub sync: SyncConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
struct PartialStubsyncConfig {
    classifier: Option<ClassifierConfig>,
    folders: Option<FolderConfig>,
    connector: Option<ConnectorConfig>,
    sync: Option<SyncConfig>,
}

fn env_or_usize(var: &str, fallback: usize) -> usize {
    match env::var(var) {
        Ok(v) => v.trim().parse::<usize>().ok().unwrap_or(fallback),
        Err(_) => fallback,
    }
}

fn env_or_u64(var: &str, fallback: u64) -> u64 {
    match env::var(var) {
        Ok(v) => v.trim().parse::<u64>().ok().unwrap_or(fallback),
        Err(_) => fallback,
    }
}

fn env_or_string(var: &str, fallback: &str) -> String {
    match env::var(var) {
        Ok(v) if !v.trim().is_empty() => v.trim().to_string(),
        _ => fallback.to_string(),
    }
}

fn env_or_csv(var: &str, fallback: &[String]) -> Vec<String> {
    match env::var(var) {
        Ok(v) => {
            let out = v
                .split(',')
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(ToOwned::to_owned)
                .collect::<Vec<_>>();
            if out.is_empty() {
                fallback.to_vec()
            } else {
                out
            }
        }
        Err(_) => fallback.to_vec(),
    }
}

pub fn validate(cfg: &StubsyncConfig) -> Result<()> {
    let c = &cfg.classifier;
    if c.article_sentinel.trim().is_empty() {
        return Err(anyhow!("invalid classifier sentinel: cannot be empty"));
    }
    if c.byline_window_chars == 0 || c.early_marker_window_chars == 0 {
        return Err(anyhow!("invalid classifier windows: must be >= 1 char"));
    }
    if c.thin_content_chars == 0 || c.min_complete_chars == 0 {
        return Err(anyhow!(
            "invalid classifier content thresholds: must be >= 1 char"
        ));
    }
    if c.operator_markers.iter().all(|m| m.trim().is_empty()) {
        return Err(anyhow!("invalid operator markers: need at least one"));
    }

    let f = &cfg.folders;
    let names = [&f.source, &f.indexed, &f.holding, &f.archive];
    if names.iter().any(|n| n.trim().is_empty()) {
        return Err(anyhow!("invalid folder layout: folder names cannot be empty"));
    }
    let unique = names.iter().map(|n| n.trim()).collect::<BTreeSet<_>>();
    if unique.len() != names.len() {
        return Err(anyhow!(
            "invalid folder layout: source, indexed, holding and archive must differ"
        ));
    }

    if cfg.connector.timeout_secs == 0 {
        return Err(anyhow!("invalid connector timeout: must be >= 1 second"));
    }
    Ok(())
}

fn resolve_config_path() -> Option<PathBuf> {
    if let Ok(custom) = env::var("STUBSYNC_CONFIG_PATH") {
        let trimmed = custom.trim();
        if !trimmed.is_empty() {
            return Some(PathBuf::from(trimmed));
        }
    }

    if let Ok(home) = env::var("STUBSYNC_HOME") {
        let trimmed = home.trim();
        if !trimmed.is_empty() {
            return Some(PathBuf::from(trimmed).join("stubsync.toml"));
        }
    }

    let home = dirs::home_dir()?;
    Some(home.join(".stubsync").join("stubsync.toml"))
}

fn merge_file_config(base: &mut StubsyncConfig) -> Result<()> {
    let Some(path) = resolve_config_path() else {
        return Ok(());
    };
    if !path.exists() {
        return Ok(());
    }

    let raw = fs::read_to_string(&path)?;
    let parsed: PartialStubsyncConfig = toml::from_str(&raw)
        .map_err(|err| anyhow!("failed to parse stubsync config {}: {err}", path.display()))?;
    if let Some(classifier) = parsed.classifier {
        base.classifier = classifier;
    }
    if let Some(folders) = parsed.folders {
        base.folders = folders;
    }
    if let Some(connector) = parsed.connector {
        base.connector = connector;
    }
    if let Some(sync) = parsed.sync {
        base.sync = sync;
    }
    Ok(())
}

pub fn load_config() -> Result<StubsyncConfig> {
    let mut cfg = StubsyncConfig::default();
    merge_file_config(&mut cfg)?;

    let c = &mut cfg.classifier;
    c.article_sentinel = env_or_string("STUBSYNC_ARTICLE_SENTINEL", &c.article_sentinel);
    c.byline_window_chars = env_or_usize("STUBSYNC_BYLINE_WINDOW_CHARS", c.byline_window_chars);
    c.early_marker_window_chars = env_or_usize(
        "STUBSYNC_EARLY_MARKER_WINDOW_CHARS",
        c.early_marker_window_chars,
    );
    c.thin_content_chars = env_or_usize("STUBSYNC_THIN_CONTENT_CHARS", c.thin_content_chars);
    c.min_complete_chars = env_or_usize("STUBSYNC_MIN_COMPLETE_CHARS", c.min_complete_chars);
    c.operator_markers = env_or_csv("STUBSYNC_OPERATOR_MARKERS", &c.operator_markers);
    c.metadata_headers = env_or_csv("STUBSYNC_METADATA_HEADERS", &c.metadata_headers);

    let f = &mut cfg.folders;
    f.source = env_or_string("STUBSYNC_FOLDER_SOURCE", &f.source);
    f.indexed = env_or_string("STUBSYNC_FOLDER_INDEXED", &f.indexed);
    f.holding = env_or_string("STUBSYNC_FOLDER_HOLDING", &f.holding);
    f.archive = env_or_string("STUBSYNC_FOLDER_ARCHIVE", &f.archive);

    cfg.connector.timeout_secs =
        env_or_u64("STUBSYNC_CONNECTOR_TIMEOUT_SECS", cfg.connector.timeout_secs);
    cfg.sync.max_messages_per_run =
        env_or_usize("STUBSYNC_MAX_MESSAGES", cfg.sync.max_messages_per_run);

    validate(&cfg)?;
    Ok(cfg)
}

/// `STUBSYNC_*` keys present in the environment that nothing in the crate reads.
pub fn unknown_env_keys() -> Vec<String> {
    let known = GENERATED_STUBSYNC_ENV_ALLOWLIST
        .iter()
        .copied()
        .collect::<BTreeSet<_>>();
    let mut out = env::vars()
        .map(|(key, _)| key)
        .filter(|key| key.starts_with("STUBSYNC_") && !known.contains(key.as_str()))
        .collect::<Vec<_>>();
    out.sort();
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_validate() {
        validate(&StubsyncConfig::default()).expect("defaults are valid");
    }

    #[test]
    fn shared_folder_names_are_rejected() {
        let mut cfg = StubsyncConfig::default();
        cfg.folders.archive = cfg.folders.holding.clone();
        let err = validate(&cfg).expect_err("duplicate folder");
        assert!(err.to_string().contains("must differ"));
    }

    #[test]
    fn zero_timeout_is_rejected() {
        let mut cfg = StubsyncConfig::default();
        cfg.connector.timeout_secs = 0;
        assert!(validate(&cfg).is_err());
    }

    #[test]
    fn partial_file_replaces_only_present_sections() {
        let raw = r#"
[folders]
source = "Inbox/Feed"
indexed = "Inbox/Feed/indexed"
holding = "Inbox/Feed/stubs"
archive = "Inbox/Feed/processed"
"#;
        let parsed: PartialStubsyncConfig = toml::from_str(raw).expect("parse");
        assert!(parsed.classifier.is_none());
        let folders = parsed.folders.expect("folders");
        assert_eq!(folders.holding, "Inbox/Feed/stubs");
    }

    #[test]
    fn allowlist_knows_the_home_variable() {
        assert!(GENERATED_STUBSYNC_ENV_ALLOWLIST.contains(&"STUBSYNC_HOME"));
    }
}
