//! Signal flags scoped to one spawned session.
//!
//! Handlers only flip atomics; the bridge's poll loop picks them up, so
//! resizing and forwarding never run concurrently with the data pump.
//!
//! signal-hook keeps its OS-level handler installed after the last action is
//! unregistered, which would leave the terminating signals ignored. The
//! dispositions found when the first live session registers are therefore
//! put back when the last live session drops, and signal-hook's handler is
//! reinstalled when a later session starts.

use signal_hook::SigId;
use signal_hook::consts::signal::{SIGHUP, SIGINT, SIGQUIT, SIGTERM, SIGWINCH};
use std::io;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

/// Signals relayed to the child's foreground process group.
const FORWARDED: [libc::c_int; 4] = [SIGINT, SIGTERM, SIGHUP, SIGQUIT];

/// Every signal a session takes over.
const HANDLED: [libc::c_int; 5] = [SIGWINCH, SIGINT, SIGTERM, SIGHUP, SIGQUIT];

type Dispositions = Vec<(libc::c_int, libc::sigaction)>;

/// Process-wide bookkeeping shared by all live sessions.
struct Installed {
    sessions: usize,
    /// Dispositions in place before the first live session.
    prior: Dispositions,
    /// signal-hook's handlers, captured the first time they were installed.
    hooked: Dispositions,
}

static INSTALLED: Mutex<Installed> = Mutex::new(Installed {
    sessions: 0,
    prior: Vec::new(),
    hooked: Vec::new(),
});

fn installed() -> MutexGuard<'static, Installed> {
    INSTALLED.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Current disposition of `signal`.
fn disposition(signal: libc::c_int) -> io::Result<libc::sigaction> {
    let mut current: libc::sigaction = unsafe { std::mem::zeroed() };
    if unsafe { libc::sigaction(signal, std::ptr::null(), &mut current) } != 0 {
        return Err(io::Error::last_os_error());
    }
    Ok(current)
}

fn install(signal: libc::c_int, action: &libc::sigaction) -> io::Result<()> {
    if unsafe { libc::sigaction(signal, action, std::ptr::null_mut()) } != 0 {
        return Err(io::Error::last_os_error());
    }
    Ok(())
}

fn snapshot() -> io::Result<Dispositions> {
    HANDLED
        .iter()
        .map(|&signal| Ok((signal, disposition(signal)?)))
        .collect()
}

impl Installed {
    /// Make sure signal-hook's handlers are the live ones.
    fn arm(&mut self) -> io::Result<()> {
        if self.hooked.is_empty() {
            self.hooked = snapshot()?;
            return Ok(());
        }
        for (signal, action) in &self.hooked {
            install(*signal, action)?;
        }
        Ok(())
    }

    fn restore(&self) {
        for (signal, action) in &self.prior {
            if let Err(e) = install(*signal, action) {
                tracing::warn!(signal, "failed to restore signal disposition: {e}");
            }
        }
    }
}

/// Registered handlers; unregistered on drop.
pub struct SessionSignals {
    resized: Arc<AtomicBool>,
    forwarded: Arc<AtomicUsize>,
    ids: Vec<SigId>,
}

impl SessionSignals {
    pub fn register() -> io::Result<Self> {
        let mut state = installed();
        if state.sessions == 0 {
            state.prior = snapshot()?;
        }

        let resized = Arc::new(AtomicBool::new(false));
        let forwarded = Arc::new(AtomicUsize::new(0));
        let ids = register_flags(&resized, &forwarded)?;

        if state.sessions == 0
            && let Err(e) = state.arm()
        {
            unregister_all(ids);
            state.restore();
            return Err(e);
        }
        state.sessions += 1;
        tracing::trace!(sessions = state.sessions, "session signal handlers registered");

        Ok(Self {
            resized,
            forwarded,
            ids,
        })
    }

    /// Whether the terminal was resized since the last call.
    pub fn take_resize(&self) -> bool {
        self.resized.swap(false, Ordering::Relaxed)
    }

    /// The last interrupt-style signal received since the last call.
    pub fn take_forwarded(&self) -> Option<libc::c_int> {
        match self.forwarded.swap(0, Ordering::Relaxed) {
            0 => None,
            signal => Some(signal as libc::c_int),
        }
    }
}

fn register_flags(resized: &Arc<AtomicBool>, forwarded: &Arc<AtomicUsize>) -> io::Result<Vec<SigId>> {
    let mut ids = Vec::with_capacity(HANDLED.len());
    let registered = signal_hook::flag::register(SIGWINCH, Arc::clone(resized)).and_then(|id| {
        ids.push(id);
        for signal in FORWARDED {
            ids.push(signal_hook::flag::register_usize(
                signal,
                Arc::clone(forwarded),
                signal as usize,
            )?);
        }
        Ok(())
    });
    match registered {
        Ok(()) => Ok(ids),
        Err(e) => {
            unregister_all(ids);
            Err(e)
        }
    }
}

fn unregister_all(ids: Vec<SigId>) {
    for id in ids {
        signal_hook::low_level::unregister(id);
    }
}

impl Drop for SessionSignals {
    fn drop(&mut self) {
        let mut state = installed();
        unregister_all(std::mem::take(&mut self.ids));
        state.sessions = state.sessions.saturating_sub(1);
        if state.sessions == 0 {
            state.restore();
        }
        tracing::trace!(sessions = state.sessions, "session signal handlers unregistered");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resize_flag_set_by_sigwinch() {
        let signals = SessionSignals::register().unwrap();
        assert!(!signals.take_resize());
        signal_hook::low_level::raise(SIGWINCH).unwrap();
        assert!(signals.take_resize());
        assert!(!signals.take_resize());
    }

    #[test]
    fn test_nothing_forwarded_initially() {
        let signals = SessionSignals::register().unwrap();
        assert_eq!(signals.take_forwarded(), None);
    }

    #[test]
    fn test_sessions_are_counted() {
        let a = SessionSignals::register().unwrap();
        let b = SessionSignals::register().unwrap();
        assert!(installed().sessions >= 2);
        drop(a);
        // The surviving session still receives signals.
        signal_hook::low_level::raise(SIGWINCH).unwrap();
        assert!(b.take_resize());
    }
}
