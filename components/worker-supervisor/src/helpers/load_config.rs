// Local crates
use crate::error::Result;
use crate::monitor::MonitorSettings;
use crate::watcher::StopWatchSettings;

// External crates
use config::{Environment, File, FileFormat};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::instrument;

/// Environment variable prefix for configuration overrides, e.g.
/// `WORKER__MONITOR__PERIOD_MS=5000`.
pub const ENV_PREFIX: &str = "WORKER";

/// `[general]`: where the worker lives and what it runs.
#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
#[serde(default)]
pub struct GeneralConfig {
    /// Shared work directory holding the agent probe and stop markers.
    pub work_dir: PathBuf,
    /// Services to boot, in order.
    pub services: Vec<String>,
    /// Directory for the rolling log files.
    pub log_dir: PathBuf,
    /// Rolled log files older than this many days are removed by the
    /// housekeeping task.
    pub log_retention_days: u64,
    /// Enable the tokio-console layer.
    pub tokio_console: bool,
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            work_dir: PathBuf::from("./work"),
            services: Vec::new(),
            log_dir: PathBuf::from("./logs"),
            log_retention_days: 7,
            tokio_console: false,
        }
    }
}

impl GeneralConfig {
    /// Age after which rolled log files are removed.
    pub fn log_retention(&self) -> Duration {
        Duration::from_secs(self.log_retention_days.saturating_mul(24 * 60 * 60))
    }
}

/// `[monitor]`: the background liveness loop.
#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
#[serde(default)]
pub struct MonitorConfig {
    /// Sleep between monitor rounds.
    pub period_ms: u64,
    /// Pause per round above which a warning is logged.
    pub pause_warning_ms: u64,
    /// Run the housekeeping task (log retention in the binary) each round.
    pub housekeeping_enabled: bool,
    /// Consecutive housekeeping failures before it is switched off.
    pub housekeeping_max_failures: u32,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            period_ms: 10_000,
            pause_warning_ms: 60_000,
            housekeeping_enabled: true,
            housekeeping_max_failures: 3,
        }
    }
}

impl MonitorConfig {
    /// Timing for the liveness monitor.
    pub fn settings(&self) -> MonitorSettings {
        MonitorSettings {
            period: Duration::from_millis(self.period_ms),
            pause_warning: Duration::from_millis(self.pause_warning_ms),
        }
    }
}

/// `[watcher]`: stop-command polling.
#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
#[serde(default)]
pub struct WatcherConfig {
    /// How often to look for the stop marker.
    pub poll_interval_ms: u64,
    /// Attempts at deleting a consumed marker.
    pub delete_attempts: u32,
    /// Pause between delete attempts.
    pub delete_backoff_ms: u64,
}

impl Default for WatcherConfig {
    fn default() -> Self {
        Self {
            poll_interval_ms: 1_000,
            delete_attempts: 5,
            delete_backoff_ms: 5,
        }
    }
}

impl WatcherConfig {
    /// Polling settings for the stop-command watcher.
    pub fn settings(&self) -> StopWatchSettings {
        StopWatchSettings {
            poll_interval: Duration::from_millis(self.poll_interval_ms),
            delete_attempts: self.delete_attempts,
            delete_backoff: Duration::from_millis(self.delete_backoff_ms),
        }
    }
}

/// `[shutdown]`: the hook sweep and the exit protocol.
#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
#[serde(default)]
pub struct ShutdownConfig {
    /// Per-hook time limit.
    pub hook_timeout_ms: u64,
    /// Line printed after the report so the parent knows we are done.
    pub completion_token: String,
    /// Pause after printing the completion token, before exiting.
    pub exit_linger_ms: u64,
    /// Pause after a signal while supervised, before sweeping.
    pub signal_linger_ms: u64,
    /// Bound on waiting for the orphan log line to flush.
    pub orphan_grace_ms: u64,
}

impl Default for ShutdownConfig {
    fn default() -> Self {
        Self {
            hook_timeout_ms: 10_000,
            completion_token: "gsa-exit-done".to_string(),
            exit_linger_ms: 20,
            signal_linger_ms: 200,
            orphan_grace_ms: 1_000,
        }
    }
}

impl ShutdownConfig {
    /// Per-hook time limit.
    pub fn hook_timeout(&self) -> Duration {
        Duration::from_millis(self.hook_timeout_ms)
    }

    /// Pause after the completion token.
    pub fn exit_linger(&self) -> Duration {
        Duration::from_millis(self.exit_linger_ms)
    }

    /// Pause after a signal while supervised.
    pub fn signal_linger(&self) -> Duration {
        Duration::from_millis(self.signal_linger_ms)
    }

    /// Bound on the orphan notice.
    pub fn orphan_grace(&self) -> Duration {
        Duration::from_millis(self.orphan_grace_ms)
    }
}

/// `[probe]`: naming of the parent's liveness probe.
#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
#[serde(default)]
pub struct ProbeConfig {
    /// Leading part of the probe file name.
    pub prefix: String,
}

impl Default for ProbeConfig {
    fn default() -> Self {
        Self {
            prefix: "gsa".to_string(),
        }
    }
}

/// Worker configuration.
#[derive(Debug, Deserialize, Serialize, Clone, Default, PartialEq)]
#[serde(default)]
pub struct Config {
    /// `[general]` section.
    pub general: GeneralConfig,
    /// `[monitor]` section.
    pub monitor: MonitorConfig,
    /// `[watcher]` section.
    pub watcher: WatcherConfig,
    /// `[shutdown]` section.
    pub shutdown: ShutdownConfig,
    /// `[probe]` section.
    pub probe: ProbeConfig,
}

impl Config {
    /// Load configuration: built-in defaults, then the optional TOML file,
    /// then `WORKER__*` environment overrides.
    #[instrument(
        name = "config_loader",
        target = "helpers::load_config",
        level = "trace",
        skip_all
    )]
    pub fn load(path: Option<&Path>) -> Result<Self> {
        Self::load_with_env(path, Environment::with_prefix(ENV_PREFIX))
    }

    fn load_with_env(path: Option<&Path>, env: Environment) -> Result<Self> {
        let mut builder = config::Config::builder();

        if let Some(path_ref) = path {
            tracing::trace!(
                configuration_file_path = %path_ref.display(),
                "Loading worker configuration file"
            );
            builder = builder.add_source(File::from(path_ref).format(FileFormat::Toml).required(true));
        }

        let env = env
            .prefix_separator("__")
            .separator("__")
            .try_parsing(true)
            .list_separator(",")
            .with_list_parse_key("general.services");

        let config: Config = match builder.add_source(env).build().and_then(|c| c.try_deserialize()) {
            Ok(cfg) => cfg,
            Err(e) => {
                tracing::error!(error = %e, "Failed to load configuration");
                return Err(e.into());
            }
        };

        tracing::trace!("Worker configuration loaded successfully");
        Ok(config)
    }

    /// Render the effective configuration as TOML.
    pub fn to_toml(&self) -> std::result::Result<String, toml::ser::Error> {
        toml::to_string_pretty(self)
    }
}
