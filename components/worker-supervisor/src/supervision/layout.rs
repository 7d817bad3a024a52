// Local crates
use crate::supervision::role::AgentIdentity;

// External crates
use std::fs;
use std::path::{Path, PathBuf};

/// Marker file locations under the shared work directory.
///
/// ```text
/// <work>/agents/<prefix>-<serviceId>~<agentId>   liveness probe, locked by the parent
/// <work>/gsa/gsa-<serviceId>-<agentId>-stop      stop command, written by the parent
/// ```
#[derive(Debug, Clone)]
pub struct WorkLayout {
    work_dir: PathBuf,
    probe_prefix: String,
}

impl WorkLayout {
    /// Layout rooted at `work_dir` with probes named `<probe_prefix>-...`.
    pub fn new(work_dir: impl Into<PathBuf>, probe_prefix: impl Into<String>) -> Self {
        Self {
            work_dir: work_dir.into(),
            probe_prefix: probe_prefix.into(),
        }
    }

    /// Root of the layout.
    pub fn work_dir(&self) -> &Path {
        &self.work_dir
    }

    /// Directory of parent probe files.
    pub fn agents_dir(&self) -> PathBuf {
        self.work_dir.join("agents")
    }

    /// Directory of stop commands.
    pub fn commands_dir(&self) -> PathBuf {
        self.work_dir.join("gsa")
    }

    /// Where the parent keeps its liveness lock.
    pub fn probe_path(&self, identity: &AgentIdentity) -> PathBuf {
        self.agents_dir().join(format!(
            "{}-{}~{}",
            self.probe_prefix, identity.service_id, identity.agent_id
        ))
    }

    /// Where the parent drops a stop request for this process.
    pub fn stop_command_path(&self, identity: &AgentIdentity) -> PathBuf {
        self.commands_dir().join(format!(
            "gsa-{}-{}-stop",
            identity.service_id, identity.agent_id
        ))
    }

    /// The probe file to test, if any exists.
    ///
    /// Prefers the exact path. Otherwise scans the agents directory for a file
    /// named `<prefix>-*~<agentId>`, which tolerates the parent registering
    /// under a different service id than the one we were given.
    pub fn locate_probe(&self, identity: &AgentIdentity) -> Option<PathBuf> {
        let exact = self.probe_path(identity);
        if exact.exists() {
            return Some(exact);
        }

        let head = format!("{}-", self.probe_prefix);
        let tail = format!("~{}", identity.agent_id);
        let entries = match fs::read_dir(self.agents_dir()) {
            Ok(entries) => entries,
            Err(e) => {
                tracing::trace!(error = %e, dir = %self.agents_dir().display(), "Agents directory not readable");
                return None;
            }
        };

        entries
            .filter_map(|entry| entry.ok())
            .map(|entry| entry.path())
            .find(|path| {
                path.file_name()
                    .and_then(|name| name.to_str())
                    .is_some_and(|name| name.starts_with(&head) && name.ends_with(&tail))
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn identity() -> AgentIdentity {
        AgentIdentity {
            agent_id: "2".to_string(),
            service_id: "svc-a".to_string(),
        }
    }

    #[test]
    fn test_marker_paths() {
        let layout = WorkLayout::new("/srv/work", "gsa");
        assert_eq!(
            layout.probe_path(&identity()),
            PathBuf::from("/srv/work/agents/gsa-svc-a~2")
        );
        assert_eq!(
            layout.stop_command_path(&identity()),
            PathBuf::from("/srv/work/gsa/gsa-svc-a-2-stop")
        );
    }

    #[test]
    fn test_locate_probe_prefers_exact_then_scans() {
        let dir = tempfile::tempdir().unwrap();
        let layout = WorkLayout::new(dir.path(), "gsa");
        assert_eq!(layout.locate_probe(&identity()), None);

        fs::create_dir_all(layout.agents_dir()).unwrap();
        let renamed = layout.agents_dir().join("gsa-other-service~2");
        fs::write(&renamed, b"").unwrap();
        fs::write(layout.agents_dir().join("gsa-other-service~12"), b"").unwrap();
        assert_eq!(layout.locate_probe(&identity()), Some(renamed));

        let exact = layout.probe_path(&identity());
        fs::write(&exact, b"").unwrap();
        assert_eq!(layout.locate_probe(&identity()), Some(exact));
    }
}
