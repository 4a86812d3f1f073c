//! PTY (pseudo-terminal) management.
//!
//! [`TerminalBridge`] owns one child shell attached to a pty. All I/O runs on
//! the calling thread through `poll(2)`: the handshake drives it with
//! [`TerminalBridge::send_line`] and [`TerminalBridge::expect`], then hands it
//! to the user with [`TerminalBridge::interact`] or mirrors it with
//! [`TerminalBridge::relay_output`].

pub use crate::error::BridgeError;
use crate::signals::SessionSignals;
use crate::terminal::{RawModeGuard, controlling_terminal_size};
use nix::errno::Errno;
use nix::poll::{PollFd, PollFlags, PollTimeout, poll};
use nix::sys::signal::{Signal, killpg};
use nix::sys::termios::{LocalFlags, SetArg, tcgetattr, tcsetattr};
use nix::unistd::Pid;
use portable_pty::{Child, CommandBuilder, MasterPty, PtySize, native_pty_system};
use std::collections::BTreeMap;
use std::ffi::OsString;
use std::io::{self, Write};
use std::os::fd::{BorrowedFd, RawFd};
use std::path::Path;
use std::time::{Duration, Instant};

/// Upper bound for one poll; signal flags are serviced at least this often.
const TICK: Duration = Duration::from_millis(100);
const READ_CHUNK: usize = 4096;

/// Where the pty's size comes from when a resize is signalled.
pub type SizeSource = Box<dyn Fn() -> Option<PtySize> + Send>;

/// Result of waiting for output.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExpectOutcome {
    Matched,
    /// The child closed the pty first.
    Eof,
    TimedOut,
}

/// A child process on a pty plus the buffered output not yet shown.
pub struct TerminalBridge {
    master: Box<dyn MasterPty + Send>,
    child: Box<dyn Child + Send + Sync>,
    writer: Box<dyn Write + Send>,
    master_fd: RawFd,
    pending: Vec<u8>,
    size: PtySize,
    size_source: SizeSource,
    signals: SessionSignals,
    eof: bool,
}

impl TerminalBridge {
    /// Spawn `executable` on a new pty with echo disabled.
    ///
    /// The child gets exactly `env` and the current working directory.
    pub fn spawn(
        executable: &Path,
        args: &[String],
        env: &BTreeMap<OsString, OsString>,
        size: PtySize,
    ) -> Result<Self, BridgeError> {
        let signals = SessionSignals::register()?;

        let pair = native_pty_system()
            .openpty(size)
            .map_err(|e| BridgeError::Create(e.to_string()))?;
        let master_fd = pair.master.as_raw_fd().ok_or(BridgeError::NoFd)?;
        set_echo(master_fd, false)?;

        let mut cmd = CommandBuilder::new(executable);
        cmd.args(args);
        cmd.env_clear();
        for (key, value) in env {
            cmd.env(key, value);
        }
        if let Ok(cwd) = std::env::current_dir() {
            cmd.cwd(cwd);
        }

        let child = pair
            .slave
            .spawn_command(cmd)
            .map_err(|e| BridgeError::Spawn {
                executable: executable.to_path_buf(),
                reason: e.to_string(),
            })?;
        // Only the child holds the slave now, so EOF on the master means the
        // session is gone.
        drop(pair.slave);

        let writer = pair
            .master
            .take_writer()
            .map_err(|e| BridgeError::Writer(e.to_string()))?;

        tracing::debug!(
            executable = %executable.display(),
            pid = ?child.process_id(),
            rows = size.rows,
            cols = size.cols,
            "spawned child on pty"
        );

        Ok(Self {
            master: pair.master,
            child,
            writer,
            master_fd,
            pending: Vec::new(),
            size,
            size_source: Box::new(controlling_terminal_size),
            signals,
            eof: false,
        })
    }

    pub fn pid(&self) -> Option<u32> {
        self.child.process_id()
    }

    /// Dimensions last applied to the pty.
    pub fn size(&self) -> PtySize {
        self.size
    }

    pub fn resize(&mut self, size: PtySize) -> Result<(), BridgeError> {
        self.master
            .resize(size)
            .map_err(|e| BridgeError::Resize(e.to_string()))?;
        tracing::trace!(rows = size.rows, cols = size.cols, "resized pty");
        self.size = size;
        Ok(())
    }

    /// Query `source` instead of the controlling terminal on resize.
    pub fn follow_size(&mut self, source: impl Fn() -> Option<PtySize> + Send + 'static) {
        self.size_source = Box::new(source);
    }

    /// Toggle the pty's local echo.
    pub fn set_echo(&self, enabled: bool) -> Result<(), BridgeError> {
        set_echo(self.master_fd, enabled)
    }

    /// Whether the pty currently echoes input.
    pub fn echo_enabled(&self) -> Result<bool, BridgeError> {
        let fd = unsafe { BorrowedFd::borrow_raw(self.master_fd) };
        Ok(tcgetattr(fd)?.local_flags.contains(LocalFlags::ECHO))
    }

    /// Write `line` followed by a newline to the child.
    pub fn send_line(&mut self, line: &str) -> Result<(), BridgeError> {
        tracing::trace!(line, "send_line");
        self.writer.write_all(line.as_bytes())?;
        self.writer.write_all(b"\n")?;
        self.writer.flush()?;
        Ok(())
    }

    /// Remove and return up to `max_bytes` of output, waiting at most `grace`
    /// for that many to arrive.
    pub fn consume(&mut self, max_bytes: usize, grace: Duration) -> Result<Vec<u8>, BridgeError> {
        let deadline = Instant::now() + grace;
        while self.pending.len() < max_bytes && !self.eof {
            let now = Instant::now();
            if now >= deadline {
                break;
            }
            self.fill(deadline - now)?;
        }
        let n = max_bytes.min(self.pending.len());
        Ok(self.pending.drain(..n).collect())
    }

    /// Discard output up to and including `needle`.
    ///
    /// With `timeout` of `None` this waits until the needle shows up or the
    /// child goes away. Output after the match stays buffered.
    pub fn expect(&mut self, needle: &[u8], timeout: Option<Duration>) -> Result<ExpectOutcome, BridgeError> {
        let deadline = timeout.map(|t| Instant::now() + t);
        loop {
            if let Some(pos) = find(&self.pending, needle) {
                self.pending.drain(..pos + needle.len());
                return Ok(ExpectOutcome::Matched);
            }
            if self.eof {
                return Ok(ExpectOutcome::Eof);
            }
            let wait = match deadline {
                Some(deadline) => {
                    let now = Instant::now();
                    if now >= deadline {
                        return Ok(ExpectOutcome::TimedOut);
                    }
                    (deadline - now).min(TICK)
                }
                None => TICK,
            };
            self.fill(wait)?;
        }
    }

    /// Drop one leading line terminator (`\r\n` or `\n`) if it arrives
    /// within `grace`.
    pub fn skip_line_terminator(&mut self, grace: Duration) -> Result<bool, BridgeError> {
        let deadline = Instant::now() + grace;
        loop {
            if self.pending.starts_with(b"\r\n") {
                self.pending.drain(..2);
                return Ok(true);
            }
            if self.pending.first() == Some(&b'\n') {
                self.pending.drain(..1);
                return Ok(true);
            }
            if self.pending.len() >= 2 || (self.pending.len() == 1 && self.pending[0] != b'\r') {
                return Ok(false);
            }
            let now = Instant::now();
            if self.eof || now >= deadline {
                return Ok(false);
            }
            self.fill(deadline - now)?;
        }
    }

    /// Output read but not yet shown, e.g. what followed an expected match.
    pub fn take_pending(&mut self) -> Vec<u8> {
        std::mem::take(&mut self.pending)
    }

    /// Apply resizes and forward interrupts received since the last call.
    pub fn service_signals(&mut self) {
        if self.signals.take_resize()
            && let Some(size) = (self.size_source)()
            && (size.rows, size.cols) != (self.size.rows, self.size.cols)
            && let Err(e) = self.resize(size)
        {
            tracing::warn!("{e}");
        }
        if let Some(signal) = self.signals.take_forwarded() {
            self.forward_signal(signal);
        }
    }

    /// Deliver `signal` to the child's foreground process group.
    pub fn forward_signal(&self, signal: libc::c_int) {
        let pgid = self
            .master
            .process_group_leader()
            .or_else(|| self.child.process_id().map(|pid| pid as libc::pid_t));
        let (Some(pgid), Ok(signal)) = (pgid, Signal::try_from(signal)) else {
            return;
        };
        tracing::debug!(pgid, ?signal, "forwarding signal to child");
        if let Err(e) = killpg(Pid::from_raw(pgid), signal) {
            tracing::warn!(pgid, ?signal, "failed to forward signal: {e}");
        }
    }

    /// Connect the user's terminal to the child until it exits.
    ///
    /// Buffered output is written first. Returns the child's exit code.
    pub fn interact(&mut self) -> Result<i32, BridgeError> {
        let _raw = RawModeGuard::new()?;
        let stdin = unsafe { BorrowedFd::borrow_raw(libc::STDIN_FILENO) };
        let mut stdout = io::stdout().lock();
        self.interact_with(stdin, &mut stdout)
    }

    /// Pump `input` to the child and its output to `out` until it exits.
    ///
    /// End of `input` stops forwarding but not the session.
    pub fn interact_with<W: Write>(&mut self, input: BorrowedFd<'_>, out: &mut W) -> Result<i32, BridgeError> {
        out.write_all(&self.take_pending())?;
        out.flush()?;

        let mut input_open = true;
        let mut buf = [0u8; READ_CHUNK];

        while !self.eof {
            self.service_signals();
            let master = unsafe { BorrowedFd::borrow_raw(self.master_fd) };
            let mut fds = vec![PollFd::new(master, PollFlags::POLLIN)];
            if input_open {
                fds.push(PollFd::new(input, PollFlags::POLLIN));
            }
            match poll(&mut fds, poll_timeout(TICK)) {
                Ok(0) => {
                    if self.has_exited()? {
                        self.drain_into(out)?;
                        break;
                    }
                    continue;
                }
                Ok(_) => {}
                Err(Errno::EINTR) => continue,
                Err(e) => return Err(e.into()),
            }

            let master_ready = readable(&fds[0]);
            let input_ready = input_open && readable(&fds[1]);

            if master_ready {
                let data = self.read_chunk(&mut buf)?;
                out.write_all(data)?;
                out.flush()?;
            }
            if input_ready {
                match nix::unistd::read(input, &mut buf) {
                    Ok(0) => {
                        tracing::trace!("input reached EOF");
                        input_open = false;
                    }
                    Ok(n) => {
                        self.writer.write_all(&buf[..n])?;
                        self.writer.flush()?;
                    }
                    Err(Errno::EINTR) | Err(Errno::EAGAIN) => {}
                    Err(e) => {
                        tracing::debug!("input closed: {e}");
                        input_open = false;
                    }
                }
            }
        }

        self.wait()
    }

    /// Copy the child's output to `out` until it exits; stdin is not read.
    pub fn relay_output<W: Write>(&mut self, out: &mut W) -> Result<i32, BridgeError> {
        out.write_all(&self.take_pending())?;
        out.flush()?;

        let mut buf = [0u8; READ_CHUNK];
        while !self.eof {
            self.service_signals();
            let master = unsafe { BorrowedFd::borrow_raw(self.master_fd) };
            let mut fds = [PollFd::new(master, PollFlags::POLLIN)];
            match poll(&mut fds, poll_timeout(TICK)) {
                Ok(0) => {
                    if self.has_exited()? {
                        self.drain_into(out)?;
                        break;
                    }
                    continue;
                }
                Ok(_) => {}
                Err(Errno::EINTR) => continue,
                Err(e) => return Err(e.into()),
            }
            if readable(&fds[0]) {
                let data = self.read_chunk(&mut buf)?;
                out.write_all(data)?;
                out.flush()?;
            }
        }

        self.wait()
    }

    /// Block until the child exits and return its exit code.
    pub fn wait(&mut self) -> Result<i32, BridgeError> {
        let status = self
            .child
            .wait()
            .map_err(|e| BridgeError::Wait(e.to_string()))?;
        let code = status.exit_code() as i32;
        tracing::debug!(code, "child exited");
        Ok(code)
    }

    pub fn kill(&mut self) -> Result<(), BridgeError> {
        tracing::debug!(pid = ?self.child.process_id(), "killing child");
        self.child.kill()?;
        Ok(())
    }

    /// Whether the child has exited, without blocking.
    pub fn has_exited(&mut self) -> Result<bool, BridgeError> {
        let status = self
            .child
            .try_wait()
            .map_err(|e| BridgeError::Wait(e.to_string()))?;
        Ok(status.is_some())
    }

    /// Append whatever arrives within `timeout` to `pending`.
    fn fill(&mut self, timeout: Duration) -> Result<usize, BridgeError> {
        self.service_signals();
        let master = unsafe { BorrowedFd::borrow_raw(self.master_fd) };
        let mut fds = [PollFd::new(master, PollFlags::POLLIN)];
        match poll(&mut fds, poll_timeout(timeout.min(TICK))) {
            Ok(0) | Err(Errno::EINTR) => {
                // A child that exited while a background job holds the pty
                // open never produces EOF.
                if self.has_exited()? {
                    self.eof = true;
                }
                return Ok(0);
            }
            Ok(_) => {}
            Err(e) => return Err(e.into()),
        }
        if !readable(&fds[0]) {
            return Ok(0);
        }
        let mut buf = [0u8; READ_CHUNK];
        let n = self.read_chunk(&mut buf)?.len();
        self.pending.extend_from_slice(&buf[..n]);
        Ok(n)
    }

    /// One read from the master. EOF and EIO mark the session as closed.
    fn read_chunk<'a>(&mut self, buf: &'a mut [u8]) -> Result<&'a [u8], BridgeError> {
        let master = unsafe { BorrowedFd::borrow_raw(self.master_fd) };
        loop {
            match nix::unistd::read(master, buf) {
                Ok(0) | Err(Errno::EIO) => {
                    tracing::trace!("pty reached EOF");
                    self.eof = true;
                    return Ok(&buf[..0]);
                }
                Ok(n) => {
                    tracing::trace!(bytes = n, "pty read");
                    return Ok(&buf[..n]);
                }
                Err(Errno::EINTR) => continue,
                Err(Errno::EAGAIN) => return Ok(&buf[..0]),
                Err(e) => return Err(e.into()),
            }
        }
    }

    /// Copy output that is still readable without waiting.
    fn drain_into<W: Write>(&mut self, out: &mut W) -> Result<(), BridgeError> {
        let mut buf = [0u8; READ_CHUNK];
        loop {
            let master = unsafe { BorrowedFd::borrow_raw(self.master_fd) };
            let mut fds = [PollFd::new(master, PollFlags::POLLIN)];
            match poll(&mut fds, PollTimeout::from(0u16)) {
                Ok(0) => break,
                Ok(_) if readable(&fds[0]) => {
                    let data = self.read_chunk(&mut buf)?;
                    if data.is_empty() {
                        break;
                    }
                    out.write_all(data)?;
                }
                Ok(_) => break,
                Err(Errno::EINTR) => continue,
                Err(e) => return Err(e.into()),
            }
        }
        out.flush()?;
        self.eof = true;
        Ok(())
    }
}

fn set_echo(fd: RawFd, enabled: bool) -> Result<(), BridgeError> {
    let fd = unsafe { BorrowedFd::borrow_raw(fd) };
    let mut termios = tcgetattr(fd)?;
    termios.local_flags.set(LocalFlags::ECHO, enabled);
    tcsetattr(fd, SetArg::TCSANOW, &termios)?;
    tracing::trace!(enabled, "pty echo");
    Ok(())
}

fn readable(fd: &PollFd<'_>) -> bool {
    fd.revents()
        .is_some_and(|r| r.intersects(PollFlags::POLLIN | PollFlags::POLLHUP | PollFlags::POLLERR))
}

fn poll_timeout(timeout: Duration) -> PollTimeout {
    PollTimeout::from(timeout.as_millis().min(u128::from(u16::MAX)) as u16)
}

fn find(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    if needle.is_empty() {
        return Some(0);
    }
    haystack.windows(needle.len()).position(|w| w == needle)
}
