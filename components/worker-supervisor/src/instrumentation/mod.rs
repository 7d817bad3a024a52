/// Removal of old rolled log files.
pub mod retention;
/// Subscriber and panic hook setup.
pub mod tracing;

pub use retention::LogRetention;
