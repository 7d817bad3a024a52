// External crates
use chrono::{DateTime, Utc};
use std::time::{Duration, Instant};
use sysinfo::{Pid, ProcessRefreshKind, ProcessesToUpdate, System};

/// Point-in-time runtime health reading.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HealthSample {
    /// When the sample was taken.
    pub taken_at: DateTime<Utc>,
    /// Total time the process has spent stalled since sampling began.
    pub cumulative_pause: Duration,
    /// Resident set size, when the platform reports it.
    pub resident_bytes: Option<u64>,
}

impl HealthSample {
    /// Pause time accumulated between `previous` and `self`.
    pub fn pause_since(&self, previous: &HealthSample) -> Duration {
        self.cumulative_pause.saturating_sub(previous.cumulative_pause)
    }
}

/// Source of health samples for the liveness monitor.
pub trait HealthSampler: Send {
    /// Take a sample at the start of a monitor round.
    fn sample(&mut self) -> HealthSample;

    /// Called once the round's own work (housekeeping, liveness check) is
    /// done, right before the monitor goes back to sleep.
    fn round_finished(&mut self) {}
}

/// Measures stalls as lateness of the monitor's own wake-ups.
///
/// Each sample expects to be taken one period after the previous round
/// finished; any extra wall-clock time is counted as a pause. Time spent in
/// the round itself is not. A process frozen by memory
/// pressure, a stopped scheduler or a suspended VM shows up here the same way
/// a collector pause would in a managed runtime. Resident memory comes from
/// `sysinfo`.
#[derive(Debug)]
pub struct StallSampler {
    expected_period: Duration,
    last_wake: Option<Instant>,
    cumulative: Duration,
    system: System,
    pid: Option<Pid>,
}

impl StallSampler {
    /// Sampler for a monitor sleeping `expected_period` between rounds.
    pub fn new(expected_period: Duration) -> Self {
        let pid = match sysinfo::get_current_pid() {
            Ok(pid) => Some(pid),
            Err(e) => {
                tracing::debug!(error = %e, "Process id unavailable, memory sampling disabled");
                None
            }
        };
        Self {
            expected_period,
            last_wake: None,
            cumulative: Duration::ZERO,
            system: System::new(),
            pid,
        }
    }

    fn resident_bytes(&mut self) -> Option<u64> {
        let pid = self.pid?;
        self.system.refresh_processes_specifics(
            ProcessesToUpdate::Some(&[pid]),
            true,
            ProcessRefreshKind::nothing().with_memory(),
        );
        self.system.process(pid).map(|process| process.memory())
    }
}

impl HealthSampler for StallSampler {
    fn sample(&mut self) -> HealthSample {
        let now = Instant::now();
        if let Some(last) = self.last_wake {
            let late = now
                .duration_since(last)
                .saturating_sub(self.expected_period);
            self.cumulative += late;
        }
        self.last_wake = Some(now);

        HealthSample {
            taken_at: Utc::now(),
            cumulative_pause: self.cumulative,
            resident_bytes: self.resident_bytes(),
        }
    }

    fn round_finished(&mut self) {
        self.last_wake = Some(Instant::now());
    }
}
