//! Panic payloads and traces for code that survives a caught panic.
//!
//! `catch_unwind` hands back only the payload; the location and the stack are
//! gone by then. [`install_trace_recorder`] chains a panic hook that stores
//! both in a thread-local, and [`take_panic_trace`] picks them up on the same
//! thread once the unwind has been caught.

// External crates
use std::any::Any;
use std::backtrace::Backtrace;
use std::cell::RefCell;
use std::panic::{self, PanicHookInfo};
use std::sync::Once;

thread_local! {
    static LAST_PANIC: RefCell<Option<String>> = const { RefCell::new(None) };
}

static INSTALL: Once = Once::new();

/// Render a panic payload as text.
pub fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic payload".to_string()
    }
}

/// `file:line` of a panic, if known.
pub fn panic_location(info: &PanicHookInfo<'_>) -> String {
    info.location()
        .map(|l| format!("{}:{}", l.file(), l.line()))
        .unwrap_or_else(|| "unknown location".to_string())
}

/// Store the location and a forced backtrace of a panic on the current thread.
pub fn record_panic(info: &PanicHookInfo<'_>) {
    let trace = format!(
        "at {}\nstack backtrace:\n{}",
        panic_location(info),
        Backtrace::force_capture()
    );
    LAST_PANIC.with(|slot| *slot.borrow_mut() = Some(trace));
}

/// Chain [`record_panic`] in front of whatever panic hook is installed.
/// Runs once per process; later hook replacements must record on their own.
pub fn install_trace_recorder() {
    INSTALL.call_once(|| {
        let previous = panic::take_hook();
        panic::set_hook(Box::new(move |info| {
            record_panic(info);
            previous(info);
        }));
    });
}

/// Trace recorded by the most recent panic on this thread, cleared on read.
pub fn take_panic_trace() -> Option<String> {
    LAST_PANIC.with(|slot| slot.borrow_mut().take())
}

/// Message of a caught panic, followed by its location and stack when they
/// were recorded.
pub fn describe_caught_panic(payload: &(dyn Any + Send)) -> String {
    let message = panic_message(payload);
    match take_panic_trace() {
        Some(trace) => format!("panicked: {message} {trace}"),
        None => format!("panicked: {message}"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_payload_rendering() {
        assert_eq!(panic_message(&"static str"), "static str");
        assert_eq!(panic_message(&String::from("owned")), "owned");
        assert_eq!(panic_message(&42u8), "unknown panic payload");
    }

    #[test]
    fn test_caught_panic_carries_location_and_stack() {
        install_trace_recorder();

        let payload = panic::catch_unwind(|| panic!("worker fell over")).unwrap_err();
        let described = describe_caught_panic(payload.as_ref());

        assert!(described.starts_with("panicked: worker fell over at "));
        assert!(described.contains("panics.rs:"));
        assert!(described.contains("stack backtrace:"));
        assert!(take_panic_trace().is_none());
    }
}
