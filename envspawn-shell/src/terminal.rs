//! Terminal utilities.
//!
//! Raw mode handling for the user's terminal and size queries for the pty.

use portable_pty::PtySize;
use std::io;

const DEFAULT_ROWS: u16 = 24;
const DEFAULT_COLS: u16 = 80;

/// Size of the controlling terminal, if there is one.
pub fn controlling_terminal_size() -> Option<PtySize> {
    match crossterm::terminal::size() {
        Ok((cols, rows)) if cols > 0 && rows > 0 => Some(PtySize {
            rows,
            cols,
            pixel_width: 0,
            pixel_height: 0,
        }),
        _ => None,
    }
}

/// Size for a new pty: the controlling terminal's, or 80x24.
pub fn terminal_size() -> PtySize {
    controlling_terminal_size().unwrap_or(PtySize {
        rows: DEFAULT_ROWS,
        cols: DEFAULT_COLS,
        pixel_width: 0,
        pixel_height: 0,
    })
}

/// Raw terminal mode guard that restores terminal state on drop.
///
/// If stdin is not a TTY (CI, pipes, tests) the guard does nothing.
pub struct RawModeGuard {
    #[cfg(unix)]
    original: Option<libc::termios>,
}

impl RawModeGuard {
    pub fn new() -> io::Result<Self> {
        #[cfg(unix)]
        {
            use std::os::unix::io::AsRawFd;
            let fd = io::stdin().as_raw_fd();

            if unsafe { libc::isatty(fd) } == 0 {
                return Ok(Self { original: None });
            }

            let mut termios: libc::termios = unsafe { std::mem::zeroed() };
            if unsafe { libc::tcgetattr(fd, &mut termios) } != 0 {
                return Err(io::Error::last_os_error());
            }
            let original = termios;

            unsafe { libc::cfmakeraw(&mut termios) };
            if unsafe { libc::tcsetattr(fd, libc::TCSANOW, &termios) } != 0 {
                return Err(io::Error::last_os_error());
            }
            tracing::trace!("stdin switched to raw mode");

            Ok(Self {
                original: Some(original),
            })
        }

        #[cfg(not(unix))]
        Ok(Self {})
    }
}

impl Drop for RawModeGuard {
    fn drop(&mut self) {
        #[cfg(unix)]
        if let Some(original) = self.original {
            use std::os::unix::io::AsRawFd;
            let fd = io::stdin().as_raw_fd();
            unsafe { libc::tcsetattr(fd, libc::TCSANOW, &original) };
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_terminal_size_never_zero() {
        let size = terminal_size();
        assert!(size.rows > 0);
        assert!(size.cols > 0);
    }

    #[test]
    fn test_raw_mode_guard_creation() {
        // Succeeds without a TTY too.
        let guard = RawModeGuard::new();
        assert!(guard.is_ok());
    }
}
