//! Operator interrupt handling.
//!
//! SIGINT and SIGTERM set a process-wide flag. The handler is installed
//! without `SA_RESTART`, so a blocking `read` on stdin or the socket returns
//! `EINTR` and the session can unwind to the top level instead of being
//! killed with the connection still open.

use std::io;
use std::sync::atomic::{AtomicBool, Ordering};

static INTERRUPTED: AtomicBool = AtomicBool::new(false);

extern "C" fn on_signal(_signum: libc::c_int) {
    INTERRUPTED.store(true, Ordering::SeqCst);
}

/// Install the interrupt handler for SIGINT and SIGTERM.
pub fn install() -> io::Result<()> {
    for signum in [libc::SIGINT, libc::SIGTERM] {
        // SAFETY: the action is fully initialized before use and the handler
        // only touches an atomic, which is async-signal-safe.
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
    Ok(())
}

/// Handle for observing whether the operator asked the client to stop.
#[derive(Debug, Clone, Copy)]
pub struct Interrupt {
    flag: &'static AtomicBool,
}

impl Interrupt {
    /// The flag driven by the process signal handler.
    pub fn process() -> Self {
        Self { flag: &INTERRUPTED }
    }

    /// A flag not connected to any signal.
    #[cfg(test)]
    pub fn detached() -> Self {
        Self {
            flag: Box::leak(Box::new(AtomicBool::new(false))),
        }
    }

    #[cfg(test)]
    pub fn trigger(&self) {
        self.flag.store(true, Ordering::SeqCst);
    }

    /// Whether an interrupt has been received.
    pub fn requested(&self) -> bool {
        self.flag.load(Ordering::SeqCst)
    }

    /// Whether `err` is a syscall cut short by an operator interrupt.
    ///
    /// `EINTR` from some other signal is not an interrupt and should be
    /// retried.
    pub fn is_cause(&self, err: &io::Error) -> bool {
        err.kind() == io::ErrorKind::Interrupted && self.requested()
    }

    /// The error returned when a blocking step notices the flag.
    pub fn error() -> io::Error {
        io::Error::new(io::ErrorKind::Interrupted, "interrupted by operator")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_detached_flag() {
        let interrupt = Interrupt::detached();
        assert!(!interrupt.requested());
        assert!(!interrupt.is_cause(&Interrupt::error()));

        interrupt.trigger();
        assert!(interrupt.requested());
        assert!(interrupt.is_cause(&Interrupt::error()));
        assert!(!interrupt.is_cause(&io::Error::from(io::ErrorKind::ConnectionReset)));
    }

    #[test]
    fn test_detached_flags_are_independent() {
        let a = Interrupt::detached();
        let b = Interrupt::detached();
        a.trigger();
        assert!(!b.requested());
    }
}
