// Local crates
use crate::error::{Result, SupervisorError};
use crate::shutdown::{ShutdownHook, ShutdownHookRegistry};

// External crates
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;
use tracing::{info, instrument, warn};

/// Close action returned by a started service. Registered as a shutdown hook.
pub type ServiceHandle = Box<dyn FnOnce() -> anyhow::Result<()> + Send + 'static>;

/// Starts one externally defined named service.
pub trait ServiceStarter: Send + Sync {
    /// Start the service. Return a close action if it needs cleanup.
    fn start(&self, name: &str) -> anyhow::Result<Option<ServiceHandle>>;
}

impl<F> ServiceStarter for F
where
    F: Fn(&str) -> anyhow::Result<Option<ServiceHandle>> + Send + Sync,
{
    fn start(&self, name: &str) -> anyhow::Result<Option<ServiceHandle>> {
        self(name)
    }
}

/// Split a service list such as `GSC,GSM` or `"GSC GSM"` into names.
///
/// Accepts the legacy `services=...` form, strips quotes, keeps first-seen
/// order and drops duplicates.
pub fn parse_service_list(raw: &str) -> Vec<String> {
    let raw = raw.trim();
    let raw = raw.strip_prefix("services=").unwrap_or(raw);
    let mut services: Vec<String> = Vec::new();
    for token in raw
        .split([' ', ','])
        .map(|t| t.trim_matches('"').trim())
        .filter(|t| !t.is_empty())
    {
        if !services.iter().any(|s| s == token) {
            services.push(token.to_string());
        }
    }
    services
}

/// Name → starter table consulted once at boot.
///
/// Lookups are case-insensitive.
#[derive(Default, Clone)]
pub struct ServiceCatalog {
    starters: BTreeMap<String, Arc<dyn ServiceStarter>>,
}

impl ServiceCatalog {
    /// Empty catalog.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add or replace the starter for `name`.
    pub fn register(&mut self, name: &str, starter: impl ServiceStarter + 'static) -> &mut Self {
        self.starters
            .insert(name.to_ascii_uppercase(), Arc::new(starter));
        self
    }

    /// Start every requested service in order.
    ///
    /// Services without a starter are skipped with a warning. Close actions
    /// are registered as `service:<name>` hooks, so services started later
    /// are closed first. The first starter error aborts boot.
    #[instrument(name = "service_boot", target = "services::catalog", level = "debug", skip_all)]
    pub fn boot(&self, services: &[String], registry: &ShutdownHookRegistry) -> Result<usize> {
        let mut started = 0;
        for name in services {
            let Some(starter) = self.starters.get(&name.to_ascii_uppercase()) else {
                warn!(service = %name, "No starter registered for service, skipping");
                continue;
            };

            info!(service = %name, "Creating service");
            let handle = starter
                .start(name)
                .map_err(|e| SupervisorError::ServiceStart {
                    name: name.clone(),
                    source: e.into(),
                })?;

            if let Some(close) = handle {
                registry.register(ShutdownHook::new(format!("service:{name}"), close));
            }
            started += 1;
        }
        Ok(started)
    }
}

impl fmt::Debug for ServiceCatalog {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ServiceCatalog")
            .field("services", &self.starters.keys().collect::<Vec<_>>())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;

    #[test]
    fn test_parse_service_list() {
        assert_eq!(parse_service_list("GSC,GSM"), ["GSC", "GSM"]);
        assert_eq!(parse_service_list("services=\"GSC GSM, LUS\""), ["GSC", "GSM", "LUS"]);
        assert_eq!(parse_service_list(" GSC ,,GSC "), ["GSC"]);
        assert!(parse_service_list("").is_empty());
    }

    #[test]
    fn test_boot_registers_close_hooks_and_skips_unknown() {
        let closed = Arc::new(Mutex::new(Vec::new()));
        let mut catalog = ServiceCatalog::new();
        for service in ["alpha", "beta"] {
            let closed = Arc::clone(&closed);
            catalog.register(service, move |name: &str| -> anyhow::Result<Option<ServiceHandle>> {
                let closed = Arc::clone(&closed);
                let name = name.to_string();
                Ok(Some(Box::new(move || {
                    closed.lock().push(name);
                    Ok(())
                })))
            });
        }
        let registry = ShutdownHookRegistry::new();

        let services = parse_service_list("ALPHA,ghost,BETA");
        let started = catalog.boot(&services, &registry).unwrap();

        assert_eq!(started, 2);
        assert_eq!(registry.names(), ["service:ALPHA", "service:BETA"]);

        crate::shutdown::ShutdownCoordinator::default().shutdown(&registry);
        assert_eq!(*closed.lock(), ["BETA", "ALPHA"]);
    }

    #[test]
    fn test_starter_error_aborts_boot() {
        let mut catalog = ServiceCatalog::new();
        catalog.register("broken", |_: &str| -> anyhow::Result<Option<ServiceHandle>> {
            Err(anyhow::anyhow!("port in use"))
        });
        catalog.register("after", |_: &str| -> anyhow::Result<Option<ServiceHandle>> { Ok(None) });
        let registry = ShutdownHookRegistry::new();

        let err = catalog
            .boot(&["broken".to_string(), "after".to_string()], &registry)
            .unwrap_err();

        assert!(matches!(err, SupervisorError::ServiceStart { ref name, .. } if name == "broken"));
        assert!(registry.is_empty());
    }
}
