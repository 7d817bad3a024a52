//! Boot-time hand-off to externally defined services.

/// Service starters and boot.
pub mod catalog;

pub use catalog::{ServiceCatalog, ServiceHandle, ServiceStarter, parse_service_list};
