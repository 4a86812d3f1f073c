//! Console interrupts while a startup-script shell owns the console.
//!
//! Windows delivers Ctrl+C to every process attached to the console. While
//! an [`InterruptGuard`] is alive the interrupt is left to the child shell;
//! outside of one, this process exits as it would by default.

use std::sync::atomic::{AtomicUsize, Ordering};

/// Exit status used when an interrupt arrives with no guard alive.
pub const INTERRUPTED_EXIT_CODE: i32 = 130;

static GUARDS: AtomicUsize = AtomicUsize::new(0);

/// Keeps console interrupts from terminating this process.
#[derive(Debug)]
pub struct InterruptGuard {
    _private: (),
}

impl InterruptGuard {
    pub fn new() -> Self {
        install_handler();
        GUARDS.fetch_add(1, Ordering::SeqCst);
        Self { _private: () }
    }
}

impl Default for InterruptGuard {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for InterruptGuard {
    fn drop(&mut self) {
        GUARDS.fetch_sub(1, Ordering::SeqCst);
    }
}

/// Whether an interrupt would currently be left to the child.
pub fn interrupts_deferred() -> bool {
    GUARDS.load(Ordering::SeqCst) > 0
}

#[cfg_attr(not(windows), allow(dead_code))]
fn on_interrupt() {
    if interrupts_deferred() {
        tracing::debug!("console interrupt left to the child shell");
    } else {
        std::process::exit(INTERRUPTED_EXIT_CODE);
    }
}

#[cfg(windows)]
fn install_handler() {
    use std::sync::OnceLock;

    static INSTALLED: OnceLock<()> = OnceLock::new();
    INSTALLED.get_or_init(|| {
        if let Err(e) = ctrlc::set_handler(on_interrupt) {
            tracing::warn!("failed to install console interrupt handler: {e}");
        }
    });
}

/// The pty bridge forwards interrupts itself on unix.
#[cfg(not(windows))]
fn install_handler() {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_guard_defers_interrupts_while_alive() {
        let guard = InterruptGuard::new();
        assert!(interrupts_deferred());
        let nested = InterruptGuard::new();
        drop(guard);
        assert!(interrupts_deferred());
        drop(nested);
    }

    #[test]
    fn test_interrupt_with_guard_keeps_running() {
        let _guard = InterruptGuard::new();
        on_interrupt();
    }
}
