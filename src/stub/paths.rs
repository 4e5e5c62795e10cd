use anyhow::Result;
use std::env;
use std::path::PathBuf;

#[derive(Debug, Clone)]
pub struct StubPaths {
    pub home: PathBuf,
    pub registry_file: PathBuf,
    pub state_file: PathBuf,
    pub logs_dir: PathBuf,
    pub mailbox_dir: PathBuf,
    pub lock_file: PathBuf,
}

impl StubPaths {
    pub fn under(home: PathBuf) -> Self {
        Self {
            registry_file: home.join("data").join("stub_registry.json"),
            state_file: home.join("state").join("last_run.json"),
            logs_dir: home.join("logs"),
            mailbox_dir: home.join("mailbox"),
            lock_file: home.join("data").join("stubsync.lock"),
            home,
        }
    }
}

fn required_home_dir() -> Result<PathBuf> {
    if let Some(home) = dirs::home_dir() {
        return Ok(home);
    }
    Err(anyhow::anyhow!("HOME directory could not be resolved"))
}

fn env_or_default_path(var: &str, fallback: PathBuf) -> PathBuf {
    match env::var(var) {
        Ok(v) if !v.trim().is_empty() => PathBuf::from(v.trim()),
        _ => fallback,
    }
}

pub fn resolve_paths() -> Result<StubPaths> {
    let home = match env::var("STUBSYNC_HOME") {
        Ok(v) if !v.trim().is_empty() => PathBuf::from(v.trim()),
        _ => required_home_dir()?.join(".stubsync"),
    };
    let defaults = StubPaths::under(home);

    Ok(StubPaths {
        registry_file: env_or_default_path("STUBSYNC_REGISTRY_FILE", defaults.registry_file),
        state_file: env_or_default_path("STUBSYNC_STATE_FILE", defaults.state_file),
        logs_dir: env_or_default_path("STUBSYNC_LOGS_DIR", defaults.logs_dir),
        mailbox_dir: env_or_default_path("STUBSYNC_MAILBOX_DIR", defaults.mailbox_dir),
        lock_file: env_or_default_path("STUBSYNC_LOCK_FILE", defaults.lock_file),
        home: defaults.home,
    })
}

#[cfg(test)]
mod tests {
    use super::StubPaths;
    use std::path::PathBuf;

    #[test]
    fn layout_keeps_lock_beside_registry() {
        let paths = StubPaths::under(PathBuf::from("/srv/stubsync"));
        assert_eq!(
            paths.registry_file,
            PathBuf::from("/srv/stubsync/data/stub_registry.json")
        );
        assert_eq!(paths.lock_file.parent(), paths.registry_file.parent());
    }
}
