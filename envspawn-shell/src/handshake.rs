//! The activation handshake.
//!
//! For pty shells the activation line is typed into a freshly spawned shell
//! whose pty has echo disabled:
//!
//! ```text
//!  . '/tmp/envspawn-XXXX.sh' && PS1="(env) ${PS1:-}"; stty echo; printf '__ENVSPAWN_%s__\n' READY
//! ```
//!
//! Everything the shell prints up to the ready sentinel is discarded, so
//! neither the line nor its output reaches the user. The sentinel literal
//! never appears in the line itself, which keeps a shell that draws its own
//! input line (zsh) from matching early.
//!
//! Startup-script shells (cmd.exe, PowerShell) get one script that does all
//! of it and are simply waited on.

use crate::adapter::{ActivationPayload, ShellAdapter, Transport};
use crate::error::SpawnError;
use crate::interrupt::InterruptGuard;
use crate::staging::StagedScript;
use envspawn_activate::EnvironmentRef;
use portable_pty::PtySize;
use std::borrow::Cow;
use std::fmt;
use std::path::Path;
use std::time::Duration;

#[cfg(unix)]
use crate::pty::{ExpectOutcome, TerminalBridge};
#[cfg(unix)]
use crate::terminal::terminal_size;
#[cfg(unix)]
use std::io::{self, Write};

/// Printed by the activation line once sourcing, prompt and echo are done.
pub const READY_SENTINEL: &str = "__ENVSPAWN_READY__";
const SENTINEL_OPEN: &str = "__ENVSPAWN_";
const SENTINEL_CLOSE: &str = "__";

/// How long to wait for each extra line terminator before handoff.
const HANDOFF_GRACE: Duration = Duration::from_millis(250);

/// Where a spawn is in the handshake.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HandshakeState {
    Init,
    Staged,
    Sourced,
    PromptSet,
    EchoRestored,
    CommandSent,
    Interactive,
    Completed,
}

impl fmt::Display for HandshakeState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            HandshakeState::Init => "init",
            HandshakeState::Staged => "staged",
            HandshakeState::Sourced => "sourced",
            HandshakeState::PromptSet => "prompt-set",
            HandshakeState::EchoRestored => "echo-restored",
            HandshakeState::CommandSent => "command-sent",
            HandshakeState::Interactive => "interactive",
            HandshakeState::Completed => "completed",
        };
        f.write_str(name)
    }
}

/// What happens once the shell is activated.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Handoff {
    /// The user gets the terminal.
    Interactive,
    /// The shell exits after the command; its output is relayed.
    Completed,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct SpawnOptions {
    /// Bound on the wait for the ready sentinel; `None` waits forever.
    pub handshake_timeout: Option<Duration>,
    /// Initial pty size; defaults to the controlling terminal's.
    pub size: Option<PtySize>,
}

/// The line that sources `script`, sets the prompt, restores echo and prints
/// the ready sentinel.
pub fn activation_line(script: &Path, prompt_injection: &str) -> String {
    let script = shell_escape::unix::escape(Cow::Owned(script.to_string_lossy().into_owned()));
    let ready = format!("printf '{SENTINEL_OPEN}%s{SENTINEL_CLOSE}\\n' READY");
    if prompt_injection.is_empty() {
        format!(" . {script}; stty echo; {ready}")
    } else {
        format!(" . {script} && {prompt_injection}; stty echo; {ready}")
    }
}

/// Text of the startup script for shells that are not driven over a pty.
pub fn startup_script(
    adapter: &dyn ShellAdapter,
    payload: &ActivationPayload,
    command: Option<&[String]>,
    handoff: Handoff,
) -> String {
    let line_ending = adapter.syntax().line_ending();
    let mut script = payload.script_body.clone();
    let mut push = |line: String| {
        script.push_str(&line);
        script.push_str(line_ending);
    };
    if !payload.prompt_injection.is_empty() {
        push(payload.prompt_injection.clone());
    }
    if let Some(argv) = command.filter(|argv| !argv.is_empty()) {
        let line = adapter.command_line(argv);
        push(adapter.echo_statement(&line));
        push(adapter.script_statement(&line));
    }
    if handoff == Handoff::Completed {
        push(adapter.exit_statement());
    }
    script
}

/// Drives one spawn from staging to handoff.
pub struct Handshake<'a> {
    adapter: &'a dyn ShellAdapter,
    env: &'a EnvironmentRef,
    options: SpawnOptions,
    state: HandshakeState,
}

impl<'a> Handshake<'a> {
    pub fn new(adapter: &'a dyn ShellAdapter, env: &'a EnvironmentRef, options: SpawnOptions) -> Self {
        Self {
            adapter,
            env,
            options,
            state: HandshakeState::Init,
        }
    }

    pub fn state(&self) -> HandshakeState {
        self.state
    }

    /// Activate, optionally run `command`, and return the shell's exit code.
    pub fn run(self, command: Option<&[String]>, handoff: Handoff) -> Result<i32, SpawnError> {
        match self.adapter.transport() {
            Transport::Pty => self.run_pty(command, handoff),
            Transport::StartupScript => self.run_script(command, handoff),
        }
    }

    #[cfg(unix)]
    fn run_pty(self, command: Option<&[String]>, handoff: Handoff) -> Result<i32, SpawnError> {
        match self.activate()? {
            Activation::Ready(session) => session.finish(command, handoff),
            Activation::Exited(code) => Ok(code),
        }
    }

    #[cfg(not(unix))]
    fn run_pty(self, _command: Option<&[String]>, _handoff: Handoff) -> Result<i32, SpawnError> {
        Err(SpawnError::Unavailable {
            shell: self.adapter.name().to_string(),
        })
    }

    /// Spawn the shell on a pty and run the handshake up to echo restoration.
    #[cfg(unix)]
    pub fn activate(mut self) -> Result<Activation<'a>, SpawnError> {
        let payload = self.adapter.activation_payload(self.env)?;
        let staged = StagedScript::create(&payload.script_body, &payload.file_extension)
            .map_err(SpawnError::Staging)?;
        self.advance(HandshakeState::Staged);

        let size = self.options.size.unwrap_or_else(terminal_size);
        let mut bridge = TerminalBridge::spawn(
            self.adapter.executable(),
            &self.adapter.args(),
            &self.adapter.process_environment(),
            size,
        )?;

        if let Err(e) = bridge.send_line(&activation_line(staged.path(), &payload.prompt_injection)) {
            if !bridge.has_exited()? {
                return Err(e.into());
            }
            let code = bridge.wait()?;
            tracing::warn!(code, shell = self.adapter.name(), "shell exited before activation");
            return Ok(Activation::Exited(code));
        }
        self.advance(HandshakeState::Sourced);

        match bridge.expect(READY_SENTINEL.as_bytes(), self.options.handshake_timeout)? {
            ExpectOutcome::Matched => {}
            ExpectOutcome::Eof => {
                let code = bridge.wait()?;
                tracing::warn!(code, shell = self.adapter.name(), "shell exited during activation");
                return Ok(Activation::Exited(code));
            }
            ExpectOutcome::TimedOut => {
                let timeout = self.options.handshake_timeout.unwrap_or_default();
                if let Err(e) = bridge.kill() {
                    tracing::warn!("failed to kill unresponsive shell: {e}");
                }
                return Err(SpawnError::HandshakeTimeout(timeout));
            }
        }
        // The sentinel only prints after the line has run to the end.
        if !payload.prompt_injection.is_empty() {
            self.advance(HandshakeState::PromptSet);
        }
        self.advance(HandshakeState::EchoRestored);

        bridge.skip_line_terminator(HANDOFF_GRACE)?;
        for _ in 0..self.adapter.handoff_newlines() {
            if !bridge.skip_line_terminator(HANDOFF_GRACE)? {
                break;
            }
        }

        if let Err(e) = staged.release() {
            tracing::warn!("failed to remove staged script: {e}");
        }

        Ok(Activation::Ready(ActiveSession {
            adapter: self.adapter,
            bridge,
            state: self.state,
        }))
    }

    fn run_script(mut self, command: Option<&[String]>, handoff: Handoff) -> Result<i32, SpawnError> {
        let payload = self.adapter.activation_payload(self.env)?;
        let script = startup_script(self.adapter, &payload, command, handoff);
        let staged = StagedScript::create(&script, &payload.file_extension).map_err(SpawnError::Staging)?;
        self.advance(HandshakeState::Staged);

        let args = match handoff {
            Handoff::Interactive => self.adapter.args(),
            Handoff::Completed => self.adapter.one_shot_args(),
        };
        let executable = self.adapter.executable();
        tracing::debug!(executable = %executable.display(), ?args, "running startup script");
        // Console interrupts belong to the child until it exits.
        let interrupts = InterruptGuard::new();
        let status = std::process::Command::new(executable)
            .args(&args)
            .arg(staged.path())
            .env_clear()
            .envs(self.adapter.process_environment())
            .status()
            .map_err(|e| SpawnError::Spawn {
                executable: executable.to_path_buf(),
                reason: e.to_string(),
            })?;
        drop(interrupts);
        self.advance(match handoff {
            Handoff::Interactive => HandshakeState::Interactive,
            Handoff::Completed => HandshakeState::Completed,
        });

        if let Err(e) = staged.release() {
            tracing::warn!("failed to remove staged script: {e}");
        }
        Ok(status.code().unwrap_or(1))
    }

    fn advance(&mut self, next: HandshakeState) {
        tracing::debug!(from = %self.state, to = %next, shell = self.adapter.name(), "handshake");
        self.state = next;
    }
}

/// Outcome of [`Handshake::activate`].
#[cfg(unix)]
pub enum Activation<'a> {
    Ready(ActiveSession<'a>),
    /// The shell exited before it finished activating.
    Exited(i32),
}

/// An activated shell whose echo has been restored.
#[cfg(unix)]
pub struct ActiveSession<'a> {
    adapter: &'a dyn ShellAdapter,
    bridge: TerminalBridge,
    state: HandshakeState,
}

#[cfg(unix)]
impl ActiveSession<'_> {
    pub fn state(&self) -> HandshakeState {
        self.state
    }

    pub fn bridge_mut(&mut self) -> &mut TerminalBridge {
        &mut self.bridge
    }

    /// Send `command` if given and hand the terminal to the user.
    pub fn interact(mut self, command: Option<&[String]>) -> Result<i32, SpawnError> {
        if let Some(argv) = command.filter(|argv| !argv.is_empty()) {
            let line = self.adapter.command_line(argv);
            self.bridge.send_line(&line)?;
            self.advance(HandshakeState::CommandSent);
        }
        self.advance(HandshakeState::Interactive);
        Ok(self.bridge.interact()?)
    }

    /// Run `argv`, exit the shell with its status, and copy output to `out`.
    pub fn run_command<W: Write>(mut self, argv: &[String], out: &mut W) -> Result<i32, SpawnError> {
        let line = if argv.is_empty() {
            self.adapter.exit_statement()
        } else {
            format!("{}; {}", self.adapter.command_line(argv), self.adapter.exit_statement())
        };
        self.bridge.send_line(&line)?;
        self.advance(HandshakeState::CommandSent);
        self.advance(HandshakeState::Completed);
        Ok(self.bridge.relay_output(out)?)
    }

    pub fn finish(self, command: Option<&[String]>, handoff: Handoff) -> Result<i32, SpawnError> {
        match handoff {
            Handoff::Interactive => self.interact(command),
            Handoff::Completed => {
                let mut stdout = io::stdout().lock();
                self.run_command(command.unwrap_or(&[]), &mut stdout)
            }
        }
    }

    fn advance(&mut self, next: HandshakeState) {
        tracing::debug!(from = %self.state, to = %next, shell = self.adapter.name(), "handshake");
        self.state = next;
    }
}
