//! Background health and parent-liveness loop.

/// Health sampling.
pub mod health;
/// Bounded best-effort tasks.
pub mod housekeeping;
/// The monitor loop.
pub mod monitor;

pub use health::{HealthSample, HealthSampler, StallSampler};
pub use housekeeping::{BoundedHousekeeping, FnHousekeeping, Housekeeping, HousekeepingTick};
pub use monitor::{LivenessMonitor, MonitorExit, MonitorSettings};
