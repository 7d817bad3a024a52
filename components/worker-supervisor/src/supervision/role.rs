// Local crates
use crate::error::{Result, SupervisorError};

// External crates
use std::fmt;

/// Agent id assigned by the supervising parent.
pub const ENV_AGENT_ID: &str = "WORKER_AGENT_ID";
/// Service id of the parent agent.
pub const ENV_SERVICE_ID: &str = "WORKER_SERVICE_ID";
/// Optional service type, used to name the log file.
pub const ENV_SERVICE_TYPE: &str = "WORKER_SERVICE_TYPE";

/// Identity of the parent agent that launched this process.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AgentIdentity {
    /// Id the parent assigned to this worker.
    pub agent_id: String,
    /// Service id of the parent agent.
    pub service_id: String,
}

/// Whether this process runs on its own or under a parent agent.
///
/// Decided once at startup and read-only afterwards.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProcessRole {
    /// Running on its own.
    Standalone,
    /// Launched by a parent agent.
    Supervised(AgentIdentity),
}

impl ProcessRole {
    /// Role from the process environment.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Role from any key lookup. An agent id makes the process supervised, in
    /// which case a service id is required too.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let non_empty = |key: &str| lookup(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());

        let Some(agent_id) = non_empty(ENV_AGENT_ID) else {
            return Ok(ProcessRole::Standalone);
        };
        let service_id = non_empty(ENV_SERVICE_ID).ok_or_else(|| {
            SupervisorError::Role(format!(
                "{ENV_AGENT_ID} is set to {agent_id:?} but {ENV_SERVICE_ID} is missing"
            ))
        })?;

        Ok(ProcessRole::Supervised(AgentIdentity {
            agent_id,
            service_id,
        }))
    }

    /// Explicit override, e.g. from command-line flags.
    pub fn supervised(agent_id: impl Into<String>, service_id: impl Into<String>) -> Self {
        ProcessRole::Supervised(AgentIdentity {
            agent_id: agent_id.into(),
            service_id: service_id.into(),
        })
    }

    /// Whether a parent agent launched this process.
    pub fn is_supervised(&self) -> bool {
        matches!(self, ProcessRole::Supervised(_))
    }

    /// Parent identity when supervised.
    pub fn identity(&self) -> Option<&AgentIdentity> {
        match self {
            ProcessRole::Standalone => None,
            ProcessRole::Supervised(identity) => Some(identity),
        }
    }

    /// Base name for this process' log file.
    ///
    /// An explicit service type wins; otherwise the service list is joined
    /// with `_` and lowercased. Supervised processes append their agent id so
    /// siblings under one agent do not share a file.
    pub fn log_name(&self, service_type: Option<&str>, services: &[String]) -> String {
        let base = match service_type.map(str::trim).filter(|s| !s.is_empty()) {
            Some(service_type) => service_type.to_string(),
            None if services.is_empty() => "worker".to_string(),
            None => services
                .iter()
                .map(|s| s.replace(' ', "_").to_lowercase())
                .collect::<Vec<_>>()
                .join("_"),
        };

        match self {
            ProcessRole::Standalone => base,
            ProcessRole::Supervised(identity) => format!("{base}_{}", identity.agent_id),
        }
    }
}

impl fmt::Display for ProcessRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ProcessRole::Standalone => write!(f, "standalone"),
            ProcessRole::Supervised(id) => {
                write!(f, "supervised(agent={}, service={})", id.agent_id, id.service_id)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_no_agent_id_is_standalone() {
        let role = ProcessRole::from_lookup(lookup(&[(ENV_SERVICE_ID, "svc")])).unwrap();
        assert_eq!(role, ProcessRole::Standalone);
        assert!(!role.is_supervised());
    }

    #[test]
    fn test_agent_and_service_ids_make_supervised() {
        let role =
            ProcessRole::from_lookup(lookup(&[(ENV_AGENT_ID, "3"), (ENV_SERVICE_ID, "gsa-7")])).unwrap();
        assert_eq!(role, ProcessRole::supervised("3", "gsa-7"));
    }

    #[test]
    fn test_agent_id_without_service_id_is_rejected() {
        let err = ProcessRole::from_lookup(lookup(&[(ENV_AGENT_ID, "3")])).unwrap_err();
        assert!(matches!(err, SupervisorError::Role(_)));
    }

    #[test]
    fn test_blank_agent_id_is_standalone() {
        let role = ProcessRole::from_lookup(lookup(&[(ENV_AGENT_ID, "  ")])).unwrap();
        assert_eq!(role, ProcessRole::Standalone);
    }

    #[test]
    fn test_log_name() {
        let services = vec!["GSC".to_string(), "GSM".to_string()];
        assert_eq!(ProcessRole::Standalone.log_name(None, &services), "gsc_gsm");
        assert_eq!(ProcessRole::Standalone.log_name(None, &[]), "worker");
        assert_eq!(
            ProcessRole::supervised("4", "svc").log_name(Some("gsc"), &services),
            "gsc_4"
        );
    }
}
