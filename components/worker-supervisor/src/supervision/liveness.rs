//! Parent liveness through a cooperative file lock.
//!
//! The parent agent holds an exclusive lock on its probe file for as long as
//! it lives. If we can take that lock ourselves, nobody is holding it and the
//! parent is gone, even though a parent that dies normally would also have
//! removed the file. A missing file means the same thing. Anything we cannot
//! determine is reported as alive so a flaky filesystem never makes a healthy
//! worker kill itself.

// Local crates
use crate::supervision::{layout::WorkLayout, role::AgentIdentity};

// External crates
use fs3::FileExt;
use std::fs::OpenOptions;
use std::path::Path;

/// Verdict of a liveness probe.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParentLiveness {
    /// The parent holds its probe, or we could not tell.
    Alive,
    /// The probe is missing or unlocked.
    Dead,
}

/// Anything that can tell whether the supervising parent is still around.
pub trait LivenessCheck: Send + Sync {
    /// Probe once. Must not block for long.
    fn check(&self) -> ParentLiveness;
}

/// Probe a single lock file.
pub fn check_parent_liveness(probe: &Path) -> ParentLiveness {
    if !probe.exists() {
        tracing::debug!(probe = %probe.display(), "Parent probe file missing");
        return ParentLiveness::Dead;
    }

    let file = match OpenOptions::new().read(true).write(true).open(probe) {
        Ok(file) => file,
        Err(e) => {
            tracing::debug!(error = %e, probe = %probe.display(), "Cannot open parent probe, assuming alive");
            return ParentLiveness::Alive;
        }
    };

    match file.try_lock_exclusive() {
        Ok(()) => {
            if let Err(e) = FileExt::unlock(&file) {
                tracing::debug!(error = %e, "Failed to release probe lock");
            }
            tracing::debug!(probe = %probe.display(), "Parent probe lock is free, parent is not holding it");
            ParentLiveness::Dead
        }
        Err(e) if e.raw_os_error() == fs3::lock_contended_error().raw_os_error() => ParentLiveness::Alive,
        Err(e) => {
            tracing::debug!(error = %e, probe = %probe.display(), "Cannot lock parent probe, assuming alive");
            ParentLiveness::Alive
        }
    }
}

/// Liveness check for one agent identity within a work layout.
#[derive(Debug, Clone)]
pub struct ParentProbe {
    layout: WorkLayout,
    identity: AgentIdentity,
}

impl ParentProbe {
    /// Probe for `identity` within `layout`.
    pub fn new(layout: WorkLayout, identity: AgentIdentity) -> Self {
        Self { layout, identity }
    }
}

impl LivenessCheck for ParentProbe {
    fn check(&self) -> ParentLiveness {
        match self.layout.locate_probe(&self.identity) {
            Some(probe) => check_parent_liveness(&probe),
            None => {
                tracing::debug!(
                    agent_id = %self.identity.agent_id,
                    service_id = %self.identity.service_id,
                    "No parent probe file found"
                );
                ParentLiveness::Dead
            }
        }
    }
}
