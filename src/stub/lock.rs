use crate::error::ErrorCode;
use anyhow::{Context, Result, bail};
use fs2::FileExt;
use std::fs::{self, File};
use std::io::{Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use tracing::debug;

fn write_holder(file: &mut File) -> std::io::Result<()> {
    file.set_len(0)?;
    file.seek(SeekFrom::Start(0))?;
    write!(file, "{}", std::process::id())?;
    file.flush()
}

/// Exclusive advisory lock held for the length of one mutating command.
/// Released on drop.
#[derive(Debug)]
pub struct RunLock {
    file: File,
    path: PathBuf,
}

impl RunLock {
    pub fn acquire(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)
                .with_context(|| format!("failed to create {}", parent.display()))?;
        }
        let mut file = fs::OpenOptions::new()
            .create(true)
            .read(true)
            .write(true)
            .truncate(false)
            .open(path)
            .with_context(|| format!("failed to open lock {}", path.display()))?;

        if file.try_lock_exclusive().is_err() {
            let holder = fs::read_to_string(path).unwrap_or_default();
            bail!(
                "{}: another stubsync run holds {} (pid {})",
                ErrorCode::E001Locked.as_str(),
                path.display(),
                holder.trim()
            );
        }

        write_holder(&mut file).with_context(|| format!("failed to write lock {}", path.display()))?;
        debug!(path = %path.display(), "run lock acquired");

        Ok(Self {
            file,
            path: path.to_path_buf(),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for RunLock {
    fn drop(&mut self) {
        let _ = self.file.set_len(0);
        let _ = FileExt::unlock(&self.file);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn second_holder_is_refused_until_release() {
        let tmp = tempdir().expect("tempdir");
        let path = tmp.path().join("data/stubsync.lock");

        let first = RunLock::acquire(&path).expect("first lock");
        let err = RunLock::acquire(&path).expect_err("already held");
        assert!(err.to_string().starts_with("E001_LOCKED"));

        drop(first);
        let again = RunLock::acquire(&path).expect("lock after release");
        assert_eq!(again.path(), path.as_path());
    }
}
