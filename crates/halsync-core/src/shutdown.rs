//! Process-wide stop request.
//!
//! Raised by the signal handler, polled between remote actions. Nothing is
//! rolled back: a stopped run leaves the store as far as it got.

use std::sync::atomic::{AtomicBool, Ordering};

static STOP_REQUESTED: AtomicBool = AtomicBool::new(false);

/// The flag itself, for signal handlers and for code that takes a `&AtomicBool`.
pub fn shutdown_flag() -> &'static AtomicBool {
    &STOP_REQUESTED
}

pub fn is_shutdown_requested() -> bool {
    STOP_REQUESTED.load(Ordering::Relaxed)
}
