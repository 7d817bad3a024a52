// External crates
use chrono::{DateTime, Utc};
use std::fmt;
use std::time::Duration;

/// How a single hook ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HookOutcome {
    /// Returned normally within its timeout.
    Completed,
    /// Overran its timeout and was abandoned.
    TimedOut,
    /// Returned an error or panicked. Holds the rendered error and trace.
    Failed(String),
}

impl HookOutcome {
    /// Short label used in logs.
    pub fn label(&self) -> &'static str {
        match self {
            HookOutcome::Completed => "completed",
            HookOutcome::TimedOut => "timed-out",
            HookOutcome::Failed(_) => "failed",
        }
    }
}

/// Outcome of one hook within a sweep.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HookRecord {
    /// Hook name.
    pub name: String,
    /// How it ended.
    pub outcome: HookOutcome,
    /// Time spent waiting on it.
    pub elapsed: Duration,
}

/// Result of one shutdown sweep, hooks listed in the order they were invoked.
#[derive(Debug, Clone)]
pub struct ShutdownReport {
    started_at: DateTime<Utc>,
    completed_at: DateTime<Utc>,
    elapsed: Duration,
    timeout: Duration,
    records: Vec<HookRecord>,
}

impl ShutdownReport {
    pub(crate) fn new(
        started_at: DateTime<Utc>,
        completed_at: DateTime<Utc>,
        elapsed: Duration,
        timeout: Duration,
        records: Vec<HookRecord>,
    ) -> Self {
        Self {
            started_at,
            completed_at,
            elapsed,
            timeout,
            records,
        }
    }

    /// Per-hook records in invocation order.
    pub fn records(&self) -> &[HookRecord] {
        &self.records
    }

    /// True when no hook ran.
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Number of hooks invoked.
    pub fn len(&self) -> usize {
        self.records.len()
    }

    /// When the sweep began.
    pub fn started_at(&self) -> DateTime<Utc> {
        self.started_at
    }

    /// When the sweep ended.
    pub fn completed_at(&self) -> DateTime<Utc> {
        self.completed_at
    }

    /// Wall-clock time of the whole sweep.
    pub fn elapsed(&self) -> Duration {
        self.elapsed
    }

    /// Hook names in invocation order.
    pub fn hook_names(&self) -> Vec<&str> {
        self.records.iter().map(|r| r.name.as_str()).collect()
    }

    /// Number of hooks that did not complete.
    pub fn failures(&self) -> usize {
        self.records
            .iter()
            .filter(|r| r.outcome != HookOutcome::Completed)
            .count()
    }
}

impl fmt::Display for ShutdownReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Started shutdown at: {}", self.started_at.to_rfc3339())?;
        writeln!(f, "Calling [{}] shutdown hooks...", self.records.len())?;
        for record in &self.records {
            match &record.outcome {
                HookOutcome::Completed => writeln!(
                    f,
                    "> shutdown hook called for: {} ({:?})",
                    record.name, record.elapsed
                )?,
                HookOutcome::TimedOut => writeln!(
                    f,
                    "> timeout waiting for shutdown hook of: {} (limit {:?})",
                    record.name, self.timeout
                )?,
                HookOutcome::Failed(trace) => {
                    writeln!(f, "> shutdown hook of: {} reported error:", record.name)?;
                    writeln!(f, "{trace}")?
                }
            }
        }
        write!(
            f,
            "Completed shutdown at: {} (took {:?})",
            self.completed_at.to_rfc3339(),
            self.elapsed
        )
    }
}
