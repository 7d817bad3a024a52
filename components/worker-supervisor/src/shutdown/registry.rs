// Local crates
use crate::shutdown::{coordinator::ShutdownCoordinator, report::ShutdownReport};

// External crates
use parking_lot::Mutex;
use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use tokio_util::sync::CancellationToken;
use tracing::instrument;

/// Body of a shutdown hook. The token is cancelled when the hook overruns its
/// timeout; long-running hooks should poll it and return early.
pub type HookAction = Box<dyn FnOnce(CancellationToken) -> anyhow::Result<()> + Send + 'static>;

static NEXT_HOOK_ID: AtomicU64 = AtomicU64::new(1);

/// Identity of a registered hook, used for deregistration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct HookId(u64);

/// A named unit of cleanup work run once during orderly termination.
pub struct ShutdownHook {
    id: HookId,
    name: String,
    action: HookAction,
}

impl ShutdownHook {
    /// Hook from a plain closure.
    pub fn new<F>(name: impl Into<String>, action: F) -> Self
    where
        F: FnOnce() -> anyhow::Result<()> + Send + 'static,
    {
        Self::interruptible(name, move |_| action())
    }

    /// Hook whose body observes the interrupt token.
    pub fn interruptible<F>(name: impl Into<String>, action: F) -> Self
    where
        F: FnOnce(CancellationToken) -> anyhow::Result<()> + Send + 'static,
    {
        Self {
            id: HookId(NEXT_HOOK_ID.fetch_add(1, Ordering::Relaxed)),
            name: name.into(),
            action: Box::new(action),
        }
    }

    /// Id for `.deregister()`.
    pub fn id(&self) -> HookId {
        self.id
    }

    /// Human-readable name used in the report.
    pub fn name(&self) -> &str {
        &self.name
    }

    pub(crate) fn into_parts(self) -> (String, HookAction) {
        (self.name, self.action)
    }
}

impl fmt::Debug for ShutdownHook {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ShutdownHook")
            .field("id", &self.id)
            .field("name", &self.name)
            .finish_non_exhaustive()
    }
}

#[derive(Debug, Default)]
struct RegistryState {
    hooks: Vec<ShutdownHook>,
    drained: bool,
}

/// Ordered collection of shutdown hooks for one process.
///
/// Registration, deregistration and draining all go through one lock, so a
/// hook is never lost or run twice. Once drained the registry is sealed: hooks
/// registered afterwards are dropped without running, since the shutdown
/// sweep they would belong to has already happened.
#[derive(Debug, Default)]
pub struct ShutdownHookRegistry {
    state: Mutex<RegistryState>,
}

impl ShutdownHookRegistry {
    /// Empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a hook. Hooks run in reverse registration order.
    ///
    /// The hook is covered both by the coordinated sweep and by the
    /// [`ExitGuard`] safety net held by the process entrypoint.
    #[instrument(name = "shutdown_hook_register", target = "shutdown::registry", level = "trace", skip_all, fields(hook = %hook.name))]
    pub fn register(&self, hook: ShutdownHook) -> HookId {
        let id = hook.id;
        let mut state = self.state.lock();
        if state.drained {
            tracing::debug!(hook = %hook.name, "Registry already drained, hook will never run");
            return id;
        }
        state.hooks.push(hook);
        tracing::trace!(registered = state.hooks.len(), "Shutdown hook registered");
        id
    }

    /// Remove a hook by identity. Returns `false` if it was not registered,
    /// including when it has already been drained.
    pub fn deregister(&self, id: HookId) -> bool {
        let mut state = self.state.lock();
        match state.hooks.iter().position(|hook| hook.id == id) {
            Some(index) => {
                let hook = state.hooks.remove(index);
                tracing::trace!(hook = %hook.name, "Shutdown hook deregistered");
                true
            }
            None => false,
        }
    }

    /// Take every registered hook, last registered first, leaving the
    /// registry empty and sealed.
    pub fn drain_reverse(&self) -> Vec<ShutdownHook> {
        let mut state = self.state.lock();
        state.drained = true;
        let mut hooks = std::mem::take(&mut state.hooks);
        hooks.reverse();
        hooks
    }

    /// Number of hooks waiting to run.
    pub fn len(&self) -> usize {
        self.state.lock().hooks.len()
    }

    /// Whether no hooks are waiting to run.
    pub fn is_empty(&self) -> bool {
        self.state.lock().hooks.is_empty()
    }

    /// Whether a shutdown sweep has already taken the hooks.
    pub fn is_drained(&self) -> bool {
        self.state.lock().drained
    }

    /// Hook names in registration order.
    pub fn names(&self) -> Vec<String> {
        self.state
            .lock()
            .hooks
            .iter()
            .map(|hook| hook.name.clone())
            .collect()
    }
}

/// Runs whatever is still registered when dropped.
///
/// Held by the process entrypoint so an early return or unwind that bypasses
/// the supervisor still cleans up. Does nothing if a sweep already drained the
/// registry. `std::process::exit` skips it, which is what the orphan path
/// relies on.
#[derive(Debug)]
pub struct ExitGuard {
    registry: Option<Arc<ShutdownHookRegistry>>,
    coordinator: ShutdownCoordinator,
}

impl ExitGuard {
    /// Arm the safety net for `registry`.
    pub fn new(registry: Arc<ShutdownHookRegistry>, coordinator: ShutdownCoordinator) -> Self {
        Self {
            registry: Some(registry),
            coordinator,
        }
    }

    /// Release the registry without running anything.
    pub fn disarm(mut self) {
        self.registry = None;
    }

    /// Run the safety-net sweep now instead of on drop.
    pub fn fire(mut self) -> Option<ShutdownReport> {
        self.sweep()
    }

    fn sweep(&mut self) -> Option<ShutdownReport> {
        let registry = self.registry.take()?;
        if registry.is_drained() {
            return None;
        }
        tracing::warn!(
            pending = registry.len(),
            "Process exiting without a coordinated shutdown, running remaining hooks"
        );
        let report = self.coordinator.shutdown(&registry);
        tracing::info!(report = %report, "Safety-net shutdown finished");
        Some(report)
    }
}

impl Drop for ExitGuard {
    fn drop(&mut self) {
        let _ = self.sweep();
    }
}
