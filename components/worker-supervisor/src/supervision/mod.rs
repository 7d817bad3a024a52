//! Who supervises us, where the parent's markers live, and whether the parent
//! is still alive.

/// Marker file paths.
pub mod layout;
/// Parent liveness probe.
pub mod liveness;
/// Standalone or supervised.
pub mod role;

pub use layout::WorkLayout;
pub use liveness::{LivenessCheck, ParentLiveness, ParentProbe, check_parent_liveness};
pub use role::{AgentIdentity, ProcessRole};
