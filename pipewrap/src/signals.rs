use std::{
    io, mem,
    sync::atomic::{AtomicI32, Ordering},
};

use libc::c_int;

/// Signals forwarded to the workflow engine
const FORWARDED: [c_int; 3] = [libc::SIGINT, libc::SIGTERM, libc::SIGHUP];

/// Process group of the running engine (0 if none)
static CHILD_PGID: AtomicI32 = AtomicI32::new(0);
/// Last signal received while the forwarder was installed (0 if none)
static RECEIVED: AtomicI32 = AtomicI32::new(0);

// Only async-signal-safe operations allowed here
extern "C" fn forward_signal(sig: c_int) {
    RECEIVED.store(sig, Ordering::SeqCst);
    let pgid = CHILD_PGID.load(Ordering::SeqCst);
    if pgid > 0 {
        unsafe {
            libc::kill(-pgid, libc::SIGTERM);
        }
    }
}

fn terminate_group(pgid: i32) {
    debug!("Sending SIGTERM to process group {}", pgid);
    if unsafe { libc::kill(-pgid, libc::SIGTERM) } != 0 {
        debug!(
            "Could not signal process group {}: {}",
            pgid,
            io::Error::last_os_error()
        );
    }
}

/// SignalForwarder
///
/// While alive, SIGINT, SIGTERM and SIGHUP delivered to this process are turned into a
/// SIGTERM sent to the process group of the attached child.  The previous handlers are
/// restored on drop.  Only one forwarder should exist at a time
///
pub struct SignalForwarder {
    saved: Vec<(c_int, libc::sigaction)>,
}

impl SignalForwarder {
    pub fn install() -> io::Result<Self> {
        CHILD_PGID.store(0, Ordering::SeqCst);
        RECEIVED.store(0, Ordering::SeqCst);
        let mut fwd = Self {
            saved: Vec::with_capacity(FORWARDED.len()),
        };
        for sig in FORWARDED {
            let old = unsafe {
                let mut action: libc::sigaction = mem::zeroed();
                action.sa_sigaction = forward_signal as extern "C" fn(c_int) as libc::sighandler_t;
                action.sa_flags = libc::SA_RESTART;
                libc::sigemptyset(&mut action.sa_mask);
                let mut old: libc::sigaction = mem::zeroed();
                if libc::sigaction(sig, &action, &mut old) != 0 {
                    // fwd is dropped here, restoring the handlers already replaced
                    return Err(io::Error::last_os_error());
                }
                old
            };
            fwd.saved.push((sig, old));
        }
        trace!("Signal forwarding installed");
        Ok(fwd)
    }

    /// Attach the child whose process group should receive forwarded signals.  The child
    /// must lead its own process group.  A signal that arrived before the child was
    /// attached is forwarded immediately
    pub fn attach(&self, pid: u32) {
        let pgid = pid as i32;
        CHILD_PGID.store(pgid, Ordering::SeqCst);
        if RECEIVED.load(Ordering::SeqCst) != 0 {
            terminate_group(pgid)
        }
    }

    /// Stop forwarding; called once the child has been reaped
    pub fn detach(&self) {
        CHILD_PGID.store(0, Ordering::SeqCst);
    }

    /// Signal received since the forwarder was installed, if any
    pub fn received(&self) -> Option<i32> {
        match RECEIVED.load(Ordering::SeqCst) {
            0 => None,
            s => Some(s),
        }
    }
}

impl Drop for SignalForwarder {
    fn drop(&mut self) {
        self.detach();
        for (sig, old) in self.saved.drain(..) {
            unsafe {
                libc::sigaction(sig, &old, std::ptr::null_mut());
            }
        }
        trace!("Signal handlers restored");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn signal_is_held_until_child_attached() {
        let fwd = SignalForwarder::install().unwrap();
        assert_eq!(fwd.received(), None);
        // Delivered synchronously to this thread; the process must survive it
        unsafe {
            libc::raise(libc::SIGTERM);
        }
        assert_eq!(fwd.received(), Some(libc::SIGTERM));
        drop(fwd);

        // Old disposition back in place
        let mut cur: libc::sigaction = unsafe { mem::zeroed() };
        unsafe {
            libc::sigaction(libc::SIGTERM, std::ptr::null(), &mut cur);
        }
        assert_eq!(cur.sa_sigaction, libc::SIG_DFL);
    }
}
