//! SIGINT/SIGTERM handling for the long-running commands.
//!
//! The handler only raises a flag. Loops poll [`requested`] and return
//! normally, so the attached device is dropped and the fan goes back to
//! firmware control instead of staying pinned at the last manual duty.

use std::sync::atomic::{AtomicBool, Ordering};

static SHUTDOWN: AtomicBool = AtomicBool::new(false);

#[cfg(unix)]
extern "C" fn on_signal(_signal: libc::c_int) {
    SHUTDOWN.store(true, Ordering::SeqCst);
}

/// Route SIGINT and SIGTERM to the shutdown flag.
pub fn install() {
    #[cfg(unix)]
    unsafe {
        let handler = on_signal as extern "C" fn(libc::c_int) as libc::sighandler_t;
        libc::signal(libc::SIGINT, handler);
        libc::signal(libc::SIGTERM, handler);
    }
}

pub fn requested() -> bool {
    SHUTDOWN.load(Ordering::SeqCst)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[cfg(unix)]
    #[test]
    fn signal_sets_flag() {
        on_signal(libc::SIGTERM);
        assert!(requested());
        SHUTDOWN.store(false, Ordering::SeqCst);
    }
}
