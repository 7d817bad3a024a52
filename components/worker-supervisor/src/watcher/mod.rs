//! Out-of-band stop requests from the parent agent.

/// Stop marker polling.
pub mod stop_command;

pub use stop_command::{StopCommandWatcher, StopTrigger, StopWatchSettings};
