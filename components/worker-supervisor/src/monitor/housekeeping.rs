// Local crates
use crate::helpers::panics::{describe_caught_panic, install_trace_recorder};

// External crates
use std::fmt;
use std::panic::{self, AssertUnwindSafe};

/// Consecutive failures after which housekeeping is switched off for good.
pub const DEFAULT_MAX_FAILURES: u32 = 3;

/// Best-effort periodic work run by the liveness monitor.
pub trait Housekeeping: Send {
    /// Name used in logs.
    fn name(&self) -> &str;

    /// Run one round. Errors are counted, never propagated.
    fn run(&mut self) -> anyhow::Result<()>;
}

/// Housekeeping backed by a closure.
pub struct FnHousekeeping<F> {
    name: String,
    task: F,
}

impl<F> FnHousekeeping<F>
where
    F: FnMut() -> anyhow::Result<()> + Send,
{
    /// Named task running `task` each round.
    pub fn new(name: impl Into<String>, task: F) -> Self {
        Self {
            name: name.into(),
            task,
        }
    }
}

impl<F> Housekeeping for FnHousekeeping<F>
where
    F: FnMut() -> anyhow::Result<()> + Send,
{
    fn name(&self) -> &str {
        &self.name
    }

    fn run(&mut self) -> anyhow::Result<()> {
        (self.task)()
    }
}

impl<F> fmt::Debug for FnHousekeeping<F> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FnHousekeeping")
            .field("name", &self.name)
            .finish_non_exhaustive()
    }
}

/// What a housekeeping tick did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HousekeepingTick {
    /// Ran and succeeded.
    Ran,
    /// Failed; holds the current run of consecutive failures.
    Failed(u32),
    /// Failed and hit the limit on this tick.
    Disabled,
    /// Switched off on an earlier tick, nothing ran.
    Skipped,
}

/// Wraps a housekeeping task with the consecutive-failure limit.
pub struct BoundedHousekeeping {
    task: Box<dyn Housekeeping>,
    max_failures: u32,
    consecutive_failures: u32,
    disabled: bool,
}

impl BoundedHousekeeping {
    /// Switch `task` off after `max_failures` failures in a row (at least one).
    pub fn new(task: Box<dyn Housekeeping>, max_failures: u32) -> Self {
        Self {
            task,
            max_failures: max_failures.max(1),
            consecutive_failures: 0,
            disabled: false,
        }
    }

    /// Whether the failure limit has been reached.
    pub fn is_disabled(&self) -> bool {
        self.disabled
    }

    /// Run the task once unless it has been switched off.
    ///
    /// A panic inside the task counts as a failure like any returned error.
    pub fn tick(&mut self) -> HousekeepingTick {
        if self.disabled {
            return HousekeepingTick::Skipped;
        }

        install_trace_recorder();
        let task = &mut self.task;
        let result = match panic::catch_unwind(AssertUnwindSafe(|| task.run())) {
            Ok(result) => result,
            Err(payload) => Err(anyhow::anyhow!(describe_caught_panic(payload.as_ref()))),
        };

        match result {
            Ok(()) => {
                self.consecutive_failures = 0;
                HousekeepingTick::Ran
            }
            Err(e) => {
                self.consecutive_failures += 1;
                if self.consecutive_failures >= self.max_failures {
                    self.disabled = true;
                    tracing::warn!(
                        task = %self.task.name(),
                        failures = self.consecutive_failures,
                        error = %e,
                        "Housekeeping keeps failing, disabling it for the rest of the process lifetime"
                    );
                    HousekeepingTick::Disabled
                } else {
                    tracing::debug!(
                        task = %self.task.name(),
                        failures = self.consecutive_failures,
                        error = %e,
                        "Housekeeping failed"
                    );
                    HousekeepingTick::Failed(self.consecutive_failures)
                }
            }
        }
    }
}

impl fmt::Debug for BoundedHousekeeping {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BoundedHousekeeping")
            .field("task", &self.task.name())
            .field("max_failures", &self.max_failures)
            .field("consecutive_failures", &self.consecutive_failures)
            .field("disabled", &self.disabled)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::VecDeque;

    fn scripted(results: &[bool]) -> BoundedHousekeeping {
        let mut script: VecDeque<bool> = results.iter().copied().collect();
        let task = FnHousekeeping::new("scripted", move || {
            if script.pop_front().unwrap_or(true) {
                Ok(())
            } else {
                Err(anyhow::anyhow!("scripted failure"))
            }
        });
        BoundedHousekeeping::new(Box::new(task), DEFAULT_MAX_FAILURES)
    }

    #[test]
    fn test_disabled_after_three_consecutive_failures() {
        let mut housekeeping = scripted(&[false, false, false, true]);

        assert_eq!(housekeeping.tick(), HousekeepingTick::Failed(1));
        assert_eq!(housekeeping.tick(), HousekeepingTick::Failed(2));
        assert_eq!(housekeeping.tick(), HousekeepingTick::Disabled);
        assert!(housekeeping.is_disabled());
        assert_eq!(housekeeping.tick(), HousekeepingTick::Skipped);
    }

    #[test]
    fn test_panicking_task_is_counted_as_failure() {
        let mut rounds = 0;
        let task = FnHousekeeping::new("explodes", move || -> anyhow::Result<()> {
            rounds += 1;
            if rounds < 3 {
                panic!("housekeeping round {rounds} blew up");
            }
            Ok(())
        });
        let mut housekeeping = BoundedHousekeeping::new(Box::new(task), DEFAULT_MAX_FAILURES);

        assert_eq!(housekeeping.tick(), HousekeepingTick::Failed(1));
        assert_eq!(housekeeping.tick(), HousekeepingTick::Failed(2));
        assert_eq!(housekeeping.tick(), HousekeepingTick::Ran);
        assert!(!housekeeping.is_disabled());
    }

    #[test]
    fn test_success_resets_failure_run() {
        let mut housekeeping = scripted(&[false, false, true, false, false, true]);

        let ticks: Vec<_> = (0..6).map(|_| housekeeping.tick()).collect();

        assert_eq!(
            ticks,
            [
                HousekeepingTick::Failed(1),
                HousekeepingTick::Failed(2),
                HousekeepingTick::Ran,
                HousekeepingTick::Failed(1),
                HousekeepingTick::Failed(2),
                HousekeepingTick::Ran,
            ]
        );
        assert!(!housekeeping.is_disabled());
    }
}
