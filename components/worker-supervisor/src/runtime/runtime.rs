// Local crates
use crate::{
    error::Result,
    helpers::{load_config::Config, shutdown::Shutdown},
    monitor::{BoundedHousekeeping, HealthSampler, Housekeeping, LivenessMonitor, MonitorExit, StallSampler},
    output::OutputGate,
    runtime::{exit::ExitStatus, signals::spawn_signal_listener},
    services::ServiceCatalog,
    shutdown::{ShutdownCoordinator, ShutdownHookRegistry, ShutdownReport},
    supervision::{ParentProbe, ProcessRole, WorkLayout},
    watcher::{StopCommandWatcher, StopTrigger},
};

// External crates
use chrono::Utc;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, instrument, warn};

const REASON_PARENT_LOST: &str = "parent-lost";
const REASON_STOPPING: &str = "stopping";

/// How a supervised run ended.
#[derive(Debug)]
pub enum Termination {
    /// Hooks were swept; the process should exit cleanly.
    Stopped {
        /// What ended the wait.
        trigger: StopTrigger,
        /// Outcome of the sweep.
        report: ShutdownReport,
    },
    /// The parent is gone. Hooks were deliberately not run and console
    /// output is left suppressed.
    Orphaned,
}

impl Termination {
    /// Exit status matching how the run ended.
    pub fn exit_status(&self) -> ExitStatus {
        match self {
            Termination::Stopped { .. } => ExitStatus::Graceful,
            Termination::Orphaned => ExitStatus::Orphaned,
        }
    }
}

/// Boots the configured services and keeps the process alive until it is
/// told to stop.
///
/// Standalone processes park until interrupted. Supervised processes also
/// watch for the parent's stop command and run the liveness check in the
/// background monitor. Stop command, signal and explicit trigger all end in
/// the same hook sweep; a lost parent ends the run without one.
pub struct Supervisor {
    config: Config,
    role: ProcessRole,
    registry: Arc<ShutdownHookRegistry>,
    gate: Arc<OutputGate>,
    catalog: ServiceCatalog,
    sampler: Option<Box<dyn HealthSampler>>,
    housekeeping: Option<Box<dyn Housekeeping>>,
    shutdown: Shutdown,
    listen_for_signals: bool,
}

impl Supervisor {
    /// Supervisor over `registry`, writing protocol lines through `gate`.
    pub fn new(
        config: Config,
        role: ProcessRole,
        registry: Arc<ShutdownHookRegistry>,
        gate: Arc<OutputGate>,
    ) -> Self {
        Self {
            config,
            role,
            registry,
            gate,
            catalog: ServiceCatalog::new(),
            sampler: None,
            housekeeping: None,
            shutdown: Shutdown::new(),
            listen_for_signals: true,
        }
    }

    /// Starters for the configured services.
    pub fn with_catalog(mut self, catalog: ServiceCatalog) -> Self {
        self.catalog = catalog;
        self
    }

    /// Replace the default stall sampler.
    pub fn with_sampler(mut self, sampler: Box<dyn HealthSampler>) -> Self {
        self.sampler = Some(sampler);
        self
    }

    /// Best-effort task run every monitor round.
    pub fn with_housekeeping(mut self, housekeeping: Box<dyn Housekeeping>) -> Self {
        self.housekeeping = Some(housekeeping);
        self
    }

    /// Leave OS signals alone; the run then ends only through the stop
    /// command, the shutdown handle or a lost parent.
    pub fn without_signal_handlers(mut self) -> Self {
        self.listen_for_signals = false;
        self
    }

    /// Handle that interrupts the run from elsewhere.
    pub fn shutdown_handle(&self) -> Shutdown {
        self.shutdown.clone()
    }

    /// Registry the sweep drains.
    pub fn registry(&self) -> Arc<ShutdownHookRegistry> {
        Arc::clone(&self.registry)
    }

    /// Coordinator configured with the per-hook timeout.
    pub fn coordinator(&self) -> ShutdownCoordinator {
        ShutdownCoordinator::new(self.config.shutdown.hook_timeout())
    }

    fn layout(&self) -> WorkLayout {
        WorkLayout::new(&self.config.general.work_dir, &self.config.probe.prefix)
    }

    /// Boot services and wait for a stop trigger or a lost parent.
    #[instrument(name = "worker_supervisor", target = "runtime::runtime", level = "debug", skip_all, fields(role = %self.role))]
    pub async fn run(mut self) -> Result<Termination> {
        info!(services = ?self.config.general.services, "Starting worker");

        if self.role.is_supervised() {
            // The parent learns our pid from this line.
            self.emit(&format!("pid={}", std::process::id()));
        }

        let started = self.catalog.boot(&self.config.general.services, &self.registry)?;
        info!(started, hooks = self.registry.len(), "Services booted");

        let signals = self
            .listen_for_signals
            .then(|| spawn_signal_listener(self.shutdown.clone()));

        let monitor = self.build_monitor();
        let monitor_cancel = self.shutdown.subscribe();
        let monitor_shutdown = self.shutdown.clone();
        let monitor_gate = Arc::clone(&self.gate);
        let monitor_task = tokio::spawn(async move {
            let exit = monitor.run(monitor_cancel).await;
            if exit == MonitorExit::ParentLost {
                // Nobody drains our pipes any more; a console write could
                // block forever. Stays muted until the orphan notice.
                monitor_gate.suppress();
                warn!("Supervising parent is gone");
                monitor_shutdown.trigger(REASON_PARENT_LOST);
            }
            exit
        });

        let watcher = self.role.identity().map(|identity| {
            StopCommandWatcher::new(
                self.layout().stop_command_path(identity),
                self.config.watcher.settings(),
            )
        });

        let interrupt = self.shutdown.subscribe();
        let mut trigger = match &watcher {
            Some(watcher) => watcher.wait(&interrupt).await,
            None => {
                interrupt.cancelled().await;
                StopTrigger::Interrupted
            }
        };

        if let Some(signals) = signals {
            signals.abort();
        }

        if trigger == StopTrigger::Interrupted && self.shutdown.reason() == Some(REASON_PARENT_LOST) {
            return Ok(Termination::Orphaned);
        }

        if let (StopTrigger::Interrupted, Some(watcher)) = (trigger, &watcher) {
            // The parent may have written a stop command right before
            // signalling us; give it a moment and honour it if it shows up.
            tokio::time::sleep(self.config.shutdown.signal_linger()).await;
            if watcher.poll().await {
                trigger = StopTrigger::StopCommand;
            }
        }

        self.shutdown.trigger(REASON_STOPPING);
        if tokio::time::timeout(Duration::from_secs(1), monitor_task).await.is_err() {
            warn!("Liveness monitor did not stop in time");
        }

        let report = match trigger {
            StopTrigger::StopCommand => {
                info!("Received stop command from parent agent, exiting");
                let report = {
                    let _quiet = self.gate.suppressed();
                    let report = sweep(Arc::clone(&self.registry), self.coordinator()).await;
                    log_completion(&report);
                    report
                };
                // The completion token must be the last line the parent sees.
                self.emit(&format!("Exiting...\n{report}"));
                self.emit(&self.config.shutdown.completion_token);
                tokio::time::sleep(self.config.shutdown.exit_linger()).await;
                report
            }
            StopTrigger::Interrupted => {
                let report = sweep(Arc::clone(&self.registry), self.coordinator()).await;
                log_completion(&report);
                self.emit(&format!("Exiting...\n{report}"));
                report
            }
        };

        Ok(Termination::Stopped { trigger, report })
    }

    fn build_monitor(&mut self) -> LivenessMonitor {
        let settings = self.config.monitor.settings();
        let sampler = self
            .sampler
            .take()
            .unwrap_or_else(|| Box::new(StallSampler::new(settings.period)));
        let mut monitor = LivenessMonitor::new(settings, sampler);

        if let Some(task) = self.housekeeping.take() {
            if self.config.monitor.housekeeping_enabled {
                monitor = monitor.with_housekeeping(BoundedHousekeeping::new(
                    task,
                    self.config.monitor.housekeeping_max_failures,
                ));
            }
        }

        if let Some(identity) = self.role.identity() {
            monitor = monitor.with_liveness_check(Box::new(ParentProbe::new(self.layout(), identity.clone())));
        }

        monitor
    }

    /// Write a protocol line to stdout and flush it.
    fn emit(&self, line: &str) {
        if let Err(e) = self.gate.println(line).and_then(|()| self.gate.flush()) {
            warn!(error = %e, "Failed to write to stdout");
        }
    }
}

fn log_completion(report: &ShutdownReport) {
    info!(
        hooks = report.len(),
        failures = report.failures(),
        elapsed = ?report.elapsed(),
        "Worker shutdown complete"
    );
}

/// Drain and run every registered hook off the async runtime.
async fn sweep(registry: Arc<ShutdownHookRegistry>, coordinator: ShutdownCoordinator) -> ShutdownReport {
    let timeout = coordinator.hook_timeout();
    match tokio::task::spawn_blocking(move || coordinator.shutdown(&registry)).await {
        Ok(report) => report,
        Err(e) => {
            error!(error = %e, "Shutdown sweep aborted");
            let now = Utc::now();
            ShutdownReport::new(now, now, Duration::ZERO, timeout, Vec::new())
        }
    }
}

impl fmt::Debug for Supervisor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Supervisor")
            .field("role", &self.role)
            .field("catalog", &self.catalog)
            .field("registry", &self.registry)
            .field("shutdown", &self.shutdown)
            .finish_non_exhaustive()
    }
}
