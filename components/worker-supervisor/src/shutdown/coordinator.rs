// Local crates
use crate::helpers::panics::{describe_caught_panic, install_trace_recorder};
use crate::shutdown::{
    registry::{HookAction, ShutdownHook, ShutdownHookRegistry},
    report::{HookOutcome, HookRecord, ShutdownReport},
};

// External crates
use chrono::Utc;
use crossbeam::channel::{self, RecvTimeoutError, Sender};
use std::panic::{self, AssertUnwindSafe};
use std::thread;
use std::time::{Duration, Instant};
use tokio_util::sync::CancellationToken;
use tracing::instrument;

/// Per-hook limit used when nothing else is configured.
pub const DEFAULT_HOOK_TIMEOUT: Duration = Duration::from_secs(10);

/// Runs shutdown hooks one at a time, each bounded by a timeout.
///
/// Every hook executes on a dedicated worker thread. A hook that returns an
/// error or panics is recorded and the sweep continues on the same worker. A
/// hook that overruns its timeout gets its interrupt token cancelled and its
/// worker is abandoned; the next hook gets a fresh thread so it never queues
/// behind a stuck one.
#[derive(Debug, Clone)]
pub struct ShutdownCoordinator {
    hook_timeout: Duration,
}

impl Default for ShutdownCoordinator {
    fn default() -> Self {
        Self::new(DEFAULT_HOOK_TIMEOUT)
    }
}

impl ShutdownCoordinator {
    /// Coordinator with a per-hook limit of `hook_timeout`.
    pub fn new(hook_timeout: Duration) -> Self {
        Self { hook_timeout }
    }

    /// Per-hook limit used by `.shutdown()`.
    pub fn hook_timeout(&self) -> Duration {
        self.hook_timeout
    }

    /// Drain `registry` and run everything it held. A second call finds the
    /// registry empty and returns an empty report.
    pub fn shutdown(&self, registry: &ShutdownHookRegistry) -> ShutdownReport {
        self.run_shutdown(registry.drain_reverse(), self.hook_timeout)
    }

    /// Run `hooks` in the given order.
    #[instrument(
        name = "shutdown_sweep",
        target = "shutdown::coordinator",
        level = "debug",
        skip_all,
        fields(hooks = hooks.len())
    )]
    pub fn run_shutdown(&self, hooks: Vec<ShutdownHook>, per_hook_timeout: Duration) -> ShutdownReport {
        install_trace_recorder();
        let started_at = Utc::now();
        let sweep_start = Instant::now();
        let mut records = Vec::with_capacity(hooks.len());
        let mut worker: Option<HookWorker> = None;
        let mut spawned = 0usize;

        for hook in hooks {
            let (name, action) = hook.into_parts();
            let hook_start = Instant::now();

            let current = match worker.take() {
                Some(current) => current,
                None => {
                    spawned += 1;
                    match HookWorker::spawn(spawned) {
                        Ok(fresh) => fresh,
                        Err(e) => {
                            tracing::error!(hook = %name, error = %e, "Failed to spawn shutdown worker");
                            records.push(HookRecord {
                                name,
                                outcome: HookOutcome::Failed(format!("could not spawn worker: {e}")),
                                elapsed: hook_start.elapsed(),
                            });
                            continue;
                        }
                    }
                }
            };

            tracing::debug!(hook = %name, "Running shutdown hook");
            let (done_tx, done_rx) = channel::bounded(1);
            let interrupt = CancellationToken::new();
            let job = Job {
                action,
                interrupt: interrupt.clone(),
                done: done_tx,
            };

            let outcome = if current.submit(job) {
                match done_rx.recv_timeout(per_hook_timeout) {
                    Ok(Ok(())) => {
                        worker = Some(current);
                        HookOutcome::Completed
                    }
                    Ok(Err(trace)) => {
                        worker = Some(current);
                        HookOutcome::Failed(trace)
                    }
                    Err(RecvTimeoutError::Timeout) => {
                        interrupt.cancel();
                        current.abandon();
                        HookOutcome::TimedOut
                    }
                    Err(RecvTimeoutError::Disconnected) => {
                        current.abandon();
                        HookOutcome::Failed("shutdown worker terminated unexpectedly".to_string())
                    }
                }
            } else {
                current.abandon();
                HookOutcome::Failed("shutdown worker is not accepting work".to_string())
            };

            let elapsed = hook_start.elapsed();
            match &outcome {
                HookOutcome::Completed => {
                    tracing::debug!(hook = %name, elapsed = ?elapsed, "Shutdown hook completed")
                }
                HookOutcome::TimedOut => tracing::warn!(
                    hook = %name,
                    timeout = ?per_hook_timeout,
                    "Shutdown hook timed out, moving on"
                ),
                HookOutcome::Failed(trace) => {
                    tracing::warn!(hook = %name, error = %trace, "Shutdown hook failed")
                }
            }
            records.push(HookRecord {
                name,
                outcome,
                elapsed,
            });
        }

        if let Some(last) = worker {
            last.retire();
        }

        ShutdownReport::new(
            started_at,
            Utc::now(),
            sweep_start.elapsed(),
            per_hook_timeout,
            records,
        )
    }
}

struct Job {
    action: HookAction,
    interrupt: CancellationToken,
    done: Sender<Result<(), String>>,
}

/// Single worker thread fed one job at a time.
struct HookWorker {
    jobs: Sender<Job>,
    handle: thread::JoinHandle<()>,
}

impl HookWorker {
    fn spawn(seq: usize) -> std::io::Result<Self> {
        let (jobs, queue) = channel::unbounded::<Job>();
        let handle = thread::Builder::new()
            .name(format!("shutdown-hook-worker-{seq}"))
            .spawn(move || {
                for job in queue {
                    let Job {
                        action,
                        interrupt,
                        done,
                    } = job;
                    let result = match panic::catch_unwind(AssertUnwindSafe(|| action(interrupt))) {
                        Ok(Ok(())) => Ok(()),
                        Ok(Err(e)) => Err(format!("{e:?}")),
                        Err(payload) => Err(describe_caught_panic(payload.as_ref())),
                    };
                    // The coordinator may have stopped waiting.
                    let _ = done.send(result);
                }
            })?;
        Ok(Self { jobs, handle })
    }

    fn submit(&self, job: Job) -> bool {
        self.jobs.send(job).is_ok()
    }

    /// Close the queue and wait for the idle worker to exit.
    fn retire(self) {
        drop(self.jobs);
        if self.handle.join().is_err() {
            tracing::debug!("Shutdown worker exited abnormally");
        }
    }

    /// Close the queue and detach; the thread ends whenever its hook returns.
    fn abandon(self) {
        drop(self.jobs);
        drop(self.handle);
    }
}
