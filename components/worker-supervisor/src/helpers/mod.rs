/// Layered configuration.
pub mod load_config;
/// Panic payloads and traces.
pub mod panics;
/// Process-wide interrupt.
pub mod shutdown;
