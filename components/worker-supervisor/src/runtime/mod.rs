/// Exit statuses and the orphan exit path.
pub mod exit;
/// The supervised run.
pub mod runtime;
/// OS termination signals.
pub mod signals;

pub use exit::{ExitStatus, announce_orphaned};
pub use runtime::{Supervisor, Termination};
