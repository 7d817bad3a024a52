// Local crates
use crate::monitor::{
    health::HealthSampler,
    housekeeping::BoundedHousekeeping,
};
use crate::supervision::liveness::{LivenessCheck, ParentLiveness};

// External crates
use std::fmt;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{info, instrument, warn};

/// Timing for the liveness monitor loop.
#[derive(Debug, Clone, Copy)]
pub struct MonitorSettings {
    /// Sleep between rounds.
    pub period: Duration,
    /// Pause delta per round above which a warning is logged.
    pub pause_warning: Duration,
}

impl Default for MonitorSettings {
    fn default() -> Self {
        Self {
            period: Duration::from_secs(10),
            pause_warning: Duration::from_secs(60),
        }
    }
}

/// Why the monitor loop ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MonitorExit {
    /// Cancelled from outside.
    Cancelled,
    /// The supervising parent is gone; the caller must terminate the process.
    ParentLost,
}

/// Periodic background loop: pause sampling, housekeeping and, when
/// supervised, the parent liveness check.
pub struct LivenessMonitor {
    settings: MonitorSettings,
    sampler: Box<dyn HealthSampler>,
    housekeeping: Option<BoundedHousekeeping>,
    liveness: Option<Box<dyn LivenessCheck>>,
}

impl LivenessMonitor {
    /// Monitor without housekeeping or parent check.
    pub fn new(settings: MonitorSettings, sampler: Box<dyn HealthSampler>) -> Self {
        Self {
            settings,
            sampler,
            housekeeping: None,
            liveness: None,
        }
    }

    /// Run `housekeeping` once per round.
    pub fn with_housekeeping(mut self, housekeeping: BoundedHousekeeping) -> Self {
        self.housekeeping = Some(housekeeping);
        self
    }

    /// Enable the parent check. Only set for supervised processes.
    pub fn with_liveness_check(mut self, check: Box<dyn LivenessCheck>) -> Self {
        self.liveness = Some(check);
        self
    }

    /// Run until cancelled or until the parent is found dead.
    #[instrument(name = "liveness_monitor", target = "monitor::monitor", level = "debug", skip_all)]
    pub async fn run(mut self, cancel: CancellationToken) -> MonitorExit {
        info!(
            period = ?self.settings.period,
            pause_warning = ?self.settings.pause_warning,
            parent_check = self.liveness.is_some(),
            "Liveness monitor started"
        );
        let mut previous = self.sampler.sample();

        loop {
            tokio::select! {
                biased;

                _ = cancel.cancelled() => {
                    info!("Liveness monitor cancelled");
                    return MonitorExit::Cancelled;
                }

                _ = tokio::time::sleep(self.settings.period) => {}
            }

            let current = self.sampler.sample();
            let pause = current.pause_since(&previous);
            if pause > self.settings.pause_warning {
                warn!(
                    pause = ?pause,
                    threshold = ?self.settings.pause_warning,
                    "Long process pause detected"
                );
            }
            tracing::trace!(
                pause = ?pause,
                resident_bytes = ?current.resident_bytes,
                "Health sample taken"
            );
            previous = current;

            if let Some(housekeeping) = self.housekeeping.as_mut() {
                housekeeping.tick();
            }

            // Returns without logging; the caller mutes the console first.
            if let Some(check) = &self.liveness {
                if check.check() == ParentLiveness::Dead {
                    return MonitorExit::ParentLost;
                }
            }

            self.sampler.round_finished();

            if cancel.is_cancelled() {
                return MonitorExit::Cancelled;
            }
        }
    }
}

impl fmt::Debug for LivenessMonitor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LivenessMonitor")
            .field("settings", &self.settings)
            .field("housekeeping", &self.housekeeping)
            .field("parent_check", &self.liveness.is_some())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::monitor::health::HealthSample;
    use crate::monitor::housekeeping::FnHousekeeping;
    use chrono::Utc;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicU32, Ordering};

    /// Reports a fixed pause increment per sample.
    struct SteppedSampler {
        step: Duration,
        total: Duration,
    }

    impl HealthSampler for SteppedSampler {
        fn sample(&mut self) -> HealthSample {
            self.total += self.step;
            HealthSample {
                taken_at: Utc::now(),
                cumulative_pause: self.total,
                resident_bytes: None,
            }
        }
    }

    /// Alive for a number of checks, dead afterwards.
    struct CountdownParent(AtomicU32);

    impl LivenessCheck for CountdownParent {
        fn check(&self) -> ParentLiveness {
            match self.0.fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1)) {
                Ok(_) => ParentLiveness::Alive,
                Err(_) => ParentLiveness::Dead,
            }
        }
    }

    fn fast() -> MonitorSettings {
        MonitorSettings {
            period: Duration::from_millis(10),
            pause_warning: Duration::from_millis(5),
        }
    }

    fn sampler() -> Box<dyn HealthSampler> {
        Box::new(SteppedSampler {
            step: Duration::from_millis(20),
            total: Duration::ZERO,
        })
    }

    #[tokio::test]
    async fn test_cancel_stops_monitor() {
        let cancel = CancellationToken::new();
        let monitor = LivenessMonitor::new(fast(), sampler());
        let handle = tokio::spawn(monitor.run(cancel.clone()));

        tokio::time::sleep(Duration::from_millis(30)).await;
        cancel.cancel();

        let exit = tokio::time::timeout(Duration::from_secs(1), handle)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(exit, MonitorExit::Cancelled);
    }

    #[tokio::test]
    async fn test_dead_parent_ends_monitor() {
        let monitor = LivenessMonitor::new(fast(), sampler())
            .with_liveness_check(Box::new(CountdownParent(AtomicU32::new(2))));

        let exit = tokio::time::timeout(Duration::from_secs(1), monitor.run(CancellationToken::new()))
            .await
            .unwrap();

        assert_eq!(exit, MonitorExit::ParentLost);
    }

    #[tokio::test]
    async fn test_housekeeping_disabled_but_loop_continues() {
        let calls = Arc::new(AtomicU32::new(0));
        let counter = Arc::clone(&calls);
        let failing = FnHousekeeping::new("always-fails", move || {
            counter.fetch_add(1, Ordering::SeqCst);
            Err(anyhow::anyhow!("nope"))
        });
        let monitor = LivenessMonitor::new(fast(), sampler())
            .with_housekeeping(BoundedHousekeeping::new(Box::new(failing), 3))
            .with_liveness_check(Box::new(CountdownParent(AtomicU32::new(8))));

        let exit = monitor.run(CancellationToken::new()).await;

        // Nine rounds ran, but housekeeping stopped after its third failure.
        assert_eq!(exit, MonitorExit::ParentLost);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }
}
