//! Supervision core for cluster worker processes.
//!
//! A worker boots a set of named services, optionally runs under a parent
//! agent that can ask it to stop or disappear without notice, and closes
//! everything it started in reverse order when it exits.
//!
//! - [`shutdown`]: hook registry, bounded sweep and the exit safety net.
//! - [`supervision`]: process role, work-directory layout and the parent
//!   liveness probe.
//! - [`monitor`]: periodic health sampling, housekeeping and liveness checks.
//! - [`watcher`]: the parent's stop-command file.
//! - [`runtime`]: ties the pieces into one supervised run.

/// Command-line entrypoint.
pub mod cli;
/// Error types.
pub mod error;
/// Configuration, process interrupt and panic helpers.
pub mod helpers;
/// Logging setup and log retention.
pub mod instrumentation;
/// Background liveness loop.
pub mod monitor;
/// Suppressible stdout and stderr.
pub mod output;
/// Supervised run and process exit.
pub mod runtime;
/// Named service boot.
pub mod services;
/// Shutdown hooks and the sweep.
pub mod shutdown;
/// Process role and parent liveness.
pub mod supervision;
/// Stop-command watching.
pub mod watcher;

pub use error::{Result, SupervisorError};
