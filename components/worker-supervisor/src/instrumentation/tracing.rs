// Local crates
use crate::helpers::{load_config::GeneralConfig, panics};
use crate::output::OutputGate;

// External crates
use anyhow::{Context, Result};
use console_subscriber::ConsoleLayer;
use std::panic;
use std::sync::Arc;
use tracing::error;
use tracing_appender::{non_blocking::WorkerGuard, rolling};
use tracing_error::ErrorLayer;
use tracing_subscriber::{
    filter::{Directive, EnvFilter},
    fmt,
    prelude::*,
    registry::Registry,
};

/// Install the global subscriber.
///
/// Logs go to a daily rolling `<log_name>.log` under `general.log_dir` and to
/// stdout through `gate`, so console logging falls silent whenever the gate
/// is suppressed. `RUST_LOG` overrides the default `info` filter.
///
/// The returned guard flushes the file writer on drop; keep it alive until
/// the process exits.
pub fn init_tracing(general: &GeneralConfig, log_name: &str, gate: &Arc<OutputGate>) -> Result<WorkerGuard> {
    std::fs::create_dir_all(&general.log_dir)
        .with_context(|| format!("Failed to create log directory {}", general.log_dir.display()))?;

    let file_appender = rolling::daily(&general.log_dir, format!("{log_name}.log"));
    let (non_blocking_writer, guard) = tracing_appender::non_blocking(file_appender);

    let mut filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    if general.tokio_console {
        if let Ok(tokio_directive) = "tokio=trace".parse::<Directive>() {
            filter = filter.add_directive(tokio_directive);
        }
        if let Ok(runtime_directive) = "runtime=trace".parse::<Directive>() {
            filter = filter.add_directive(runtime_directive);
        }
    }

    let file_layer = fmt::layer()
        .with_ansi(false)
        .with_writer(non_blocking_writer)
        .with_file(true)
        .with_line_number(true)
        .with_thread_ids(true)
        .with_target(false)
        .with_timer(fmt::time::UtcTime::rfc_3339());

    let stdout_layer = fmt::layer()
        .with_ansi(false)
        .with_writer(gate.stdout())
        .with_target(false)
        .with_timer(fmt::time::UtcTime::rfc_3339());

    let console_layer = general
        .tokio_console
        .then(|| ConsoleLayer::builder().spawn());

    let subscriber = Registry::default()
        .with(console_layer)
        .with(filter)
        .with(file_layer)
        .with(stdout_layer)
        .with(ErrorLayer::default());

    tracing::subscriber::set_global_default(subscriber).context("Failed to set global tracing subscriber")?;
    Ok(guard)
}

/// Route panics into the log before the default unwinding continues.
///
/// The location and stack are also recorded for code that catches the unwind,
/// such as the shutdown sweep.
pub fn init_panic_handler() {
    panic::set_hook(Box::new(|panic_info| {
        panics::record_panic(panic_info);

        let thread = std::thread::current();
        error!(
            message = %panics::panic_message(panic_info.payload()),
            location = %panics::panic_location(panic_info),
            thread = thread.name().unwrap_or("unnamed"),
            "Worker panicked!"
        );
    }));
}
