//! Ctrl-C handling
//!
//! SIGINT only raises a flag; a watcher thread turns it into a cancellation
//! of the running batch. Children run in their own process groups, so the
//! terminal's SIGINT never reaches them directly.

use ifsbench_run::CancellationToken;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;
use std::time::Duration;
use tracing::warn;

static INTERRUPTED: AtomicBool = AtomicBool::new(false);

extern "C" fn on_sigint(_signal: libc::c_int) {
    INTERRUPTED.store(true, Ordering::SeqCst);
}

/// Cancel `token` when SIGINT arrives
pub fn cancel_on_interrupt(token: CancellationToken) {
    let handler = on_sigint as extern "C" fn(libc::c_int);
    // SAFETY: the handler only stores to an atomic, which is async-signal-safe.
    let previous = unsafe { libc::signal(libc::SIGINT, handler as libc::sighandler_t) };
    if previous == libc::SIG_ERR {
        warn!("Could not install SIGINT handler; Ctrl-C will not cancel runs");
        return;
    }

    thread::spawn(move || {
        loop {
            if INTERRUPTED.swap(false, Ordering::SeqCst) {
                warn!("Interrupted, cancelling active runs");
                token.cancel();
            }
            if token.is_cancelled() {
                break;
            }
            thread::sleep(Duration::from_millis(50));
        }
    });
}
