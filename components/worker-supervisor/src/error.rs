//! Error types for the supervision core.

use thiserror::Error;

/// Result type for supervision operations.
pub type Result<T> = std::result::Result<T, SupervisorError>;

/// Errors that can abort booting or supervising a worker process.
///
/// Failures inside shutdown hooks, liveness probes and housekeeping are never
/// surfaced through this type; they are recorded or logged where they happen.
#[derive(Debug, Error)]
pub enum SupervisorError {
    /// Configuration could not be loaded or deserialized.
    #[error("configuration error: {0}")]
    Config(#[from] config::ConfigError),

    /// The supervising agent identity is incomplete.
    #[error("invalid process role: {0}")]
    Role(String),

    /// A named service failed to start during boot.
    #[error("failed to start service {name}: {source}")]
    ServiceStart {
        /// Name of the service as requested in the service list.
        name: String,
        /// Error reported by the service starter.
        #[source]
        source: Box<dyn std::error::Error + Send + Sync + 'static>,
    },
}
