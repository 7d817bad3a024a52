// Local crates
use crate::monitor::Housekeeping;

// External crates
use anyhow::{Context, Result};
use std::fs;
use std::path::PathBuf;
use std::time::{Duration, SystemTime};

/// Deletes rolled log files of this process once they are older than
/// `max_age`.
///
/// Only files named `<log_name>.log.<suffix>` in the log directory are
/// considered, and the most recent one is always kept since the appender may
/// still be writing to it.
#[derive(Debug, Clone)]
pub struct LogRetention {
    dir: PathBuf,
    prefix: String,
    max_age: Duration,
}

impl LogRetention {
    /// Retention for the files `init_tracing` creates under `dir`.
    pub fn new(dir: impl Into<PathBuf>, log_name: &str, max_age: Duration) -> Self {
        Self {
            dir: dir.into(),
            prefix: format!("{log_name}.log."),
            max_age,
        }
    }

    fn rolled_files(&self) -> Result<Vec<(SystemTime, PathBuf)>> {
        let entries = fs::read_dir(&self.dir)
            .with_context(|| format!("Failed to list log directory {}", self.dir.display()))?;

        let mut files = Vec::new();
        for entry in entries {
            let entry = entry?;
            let is_ours = entry
                .file_name()
                .to_str()
                .is_some_and(|name| name.starts_with(&self.prefix));
            if !is_ours {
                continue;
            }
            let metadata = entry.metadata()?;
            if metadata.is_file() {
                files.push((metadata.modified()?, entry.path()));
            }
        }
        files.sort();
        Ok(files)
    }
}

impl Housekeeping for LogRetention {
    fn name(&self) -> &str {
        "log-retention"
    }

    fn run(&mut self) -> Result<()> {
        let mut files = self.rolled_files()?;
        // Newest last; never touch it.
        files.pop();

        for (modified, path) in files {
            let age = modified.elapsed().unwrap_or_default();
            if age < self.max_age {
                continue;
            }
            fs::remove_file(&path).with_context(|| format!("Failed to remove old log {}", path.display()))?;
            tracing::debug!(path = %path.display(), age = ?age, "Removed rolled log file");
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_prunes_old_rolled_files_but_keeps_newest_and_foreign() {
        let dir = tempfile::tempdir().unwrap();
        for name in ["worker.log.2026-10-16", "worker.log.2026-10-17", "other.log.2026-10-16"] {
            fs::write(dir.path().join(name), b"line\n").unwrap();
        }

        let mut retention = LogRetention::new(dir.path(), "worker", Duration::ZERO);
        retention.run().unwrap();

        assert!(!dir.path().join("worker.log.2026-10-16").exists());
        assert!(dir.path().join("worker.log.2026-10-17").exists());
        assert!(dir.path().join("other.log.2026-10-16").exists());
    }

    #[test]
    fn test_recent_files_are_kept() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("worker.log.2026-10-16"), b"").unwrap();
        fs::write(dir.path().join("worker.log.2026-10-17"), b"").unwrap();

        let mut retention = LogRetention::new(dir.path(), "worker", Duration::from_secs(3600));
        retention.run().unwrap();

        assert!(dir.path().join("worker.log.2026-10-16").exists());
    }

    #[test]
    fn test_missing_directory_is_a_failure() {
        let dir = tempfile::tempdir().unwrap();
        let mut retention = LogRetention::new(dir.path().join("gone"), "worker", Duration::ZERO);
        assert!(retention.run().is_err());
    }
}
