//! Interrupt handling for the blocking event loop.
//!
//! SIGINT and SIGTERM only set a flag. The handlers are installed without
//! `SA_RESTART`, so a readiness wait in progress returns `EINTR`, the
//! selector reports an empty batch, and the loop sees the flag and runs its
//! orderly shutdown instead of the process dying with descriptors open.

use std::io;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;

static REQUESTED: AtomicBool = AtomicBool::new(false);
static INSTALLED: Mutex<bool> = Mutex::new(false);

extern "C" fn on_signal(_signum: libc::c_int) {
    REQUESTED.store(true, Ordering::SeqCst);
}

/// Install the SIGINT/SIGTERM handlers. Safe to call more than once.
pub fn install() -> io::Result<()> {
    let mut installed = INSTALLED.lock().unwrap_or_else(|e| e.into_inner());
    if *installed {
        return Ok(());
    }

    for signum in [libc::SIGINT, libc::SIGTERM] {
        // SAFETY: the handler only touches an atomic, which is
        // async-signal-safe, and the sigaction struct is fully initialized.
        unsafe {
            let mut action: libc::sigaction = std::mem::zeroed();
            action.sa_sigaction = on_signal as extern "C" fn(libc::c_int) as libc::sighandler_t;
            action.sa_flags = 0;
            libc::sigemptyset(&mut action.sa_mask);
            if libc::sigaction(signum, &action, std::ptr::null_mut()) != 0 {
                return Err(io::Error::last_os_error());
            }
        }
    }

    *installed = true;
    Ok(())
}

/// Whether an interrupt arrived since the last [`reset`].
pub fn requested() -> bool {
    REQUESTED.load(Ordering::SeqCst)
}

/// Forget a previously observed interrupt.
pub fn reset() {
    REQUESTED.store(false, Ordering::SeqCst);
}
