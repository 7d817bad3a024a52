//! Shutdown hook registration and the bounded shutdown sweep.

/// Bounded hook sweep.
pub mod coordinator;
/// Hook registry and exit guard.
pub mod registry;
/// Sweep report.
pub mod report;

pub use coordinator::{DEFAULT_HOOK_TIMEOUT, ShutdownCoordinator};
pub use registry::{ExitGuard, HookId, ShutdownHook, ShutdownHookRegistry};
pub use report::{HookOutcome, HookRecord, ShutdownReport};
