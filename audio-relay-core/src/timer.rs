//! One-shot scheduled tasks.
//!
//! Delayed work (ready grace, drain retries) runs on short-lived named
//! threads. Scheduled closures must capture the controller epoch current
//! at scheduling time and re-check it before mutating anything: a task
//! that fires after a teardown has to no-op.

use std::thread;
use std::time::Duration;

/// Run `task` after `delay` on a named background thread.
pub(crate) fn schedule_after(name: &str, delay: Duration, task: impl FnOnce() + Send + 'static) {
    let result = thread::Builder::new()
        .name(name.to_owned())
        .spawn(move || {
            thread::sleep(delay);
            task();
        });
    if let Err(e) = result {
        log::error!("failed to spawn {name} timer: {e}");
    }
}
