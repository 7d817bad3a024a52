// Local crates
use crate::output::OutputGate;

// External crates
use crossbeam::channel;
use std::sync::Arc;
use std::thread;
use std::time::Duration;

/// Process exit statuses.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExitStatus {
    /// Orderly shutdown after a stop command or signal.
    Graceful,
    /// Boot failed before supervision started.
    BootFailure,
    /// The supervising parent disappeared.
    Orphaned,
}

impl ExitStatus {
    /// Numeric code handed to `std::process::exit`.
    pub fn code(self) -> i32 {
        match self {
            ExitStatus::Graceful => 0,
            ExitStatus::BootFailure => 1,
            ExitStatus::Orphaned => 2,
        }
    }
}

/// Log the orphan notice from a side thread and wait at most `grace` for it.
///
/// Console output goes to a pipe nobody may be reading any more, so the write
/// can block forever. The gate is opened for the notice only; when this
/// returns it is suppressed again, whether or not the notice got through, and
/// the caller is expected to exit right away.
pub fn announce_orphaned(gate: &Arc<OutputGate>, grace: Duration) {
    let (done_tx, done_rx) = channel::bounded::<()>(1);
    let dispatch = tracing::dispatcher::get_default(|dispatch| dispatch.clone());
    let notice_gate = Arc::clone(gate);

    let spawned = thread::Builder::new()
        .name("orphan-notice".to_string())
        .spawn(move || {
            notice_gate.resume();
            tracing::dispatcher::with_default(&dispatch, || {
                tracing::error!("Supervising parent missing, exiting");
            });
            let _ = done_tx.send(());
        });

    if spawned.is_ok() && done_rx.recv_timeout(grace).is_err() {
        tracing::debug!(grace = ?grace, "Orphan notice did not complete in time");
    }
    gate.suppress();
}
