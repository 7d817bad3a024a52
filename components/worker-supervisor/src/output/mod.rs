//! Controllable stdout/stderr.

/// The output gate.
pub mod gate;

pub use gate::{GatedWriter, OutputGate, SuppressGuard};
