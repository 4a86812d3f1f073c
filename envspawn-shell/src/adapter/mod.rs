//! Shell adapters: one implementation per supported shell family.
//!
//! The [`ShellAdapter`] trait encapsulates everything that differs between
//! shells when spawning an activated session: script syntax, prompt
//! injection, executable and flags, and how a one-shot command is quoted.

mod cmd;
mod posix;
mod powershell;

pub use cmd::CmdExeShell;
pub use posix::PosixShell;
pub use powershell::PowerShell;

use crate::kind::ShellKind;
use envspawn_activate::{ActivationError, Activator, EnvironmentRef, ScriptSyntax};
use std::collections::BTreeMap;
use std::ffi::OsString;
use std::path::Path;

/// Variable set in every spawned session so callers can tell it apart.
pub const MARKER_VAR: &str = "ENVSPAWN";

/// How the handshake drives a shell.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transport {
    /// Spawn on a pseudo-terminal and type the activation line.
    Pty,
    /// Hand the shell a startup script and wait for it.
    StartupScript,
}

/// Everything the handshake needs to activate one session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ActivationPayload {
    /// Activation statements, without any prompt assignment.
    pub script_body: String,
    /// Statement that sets the prompt; empty when the prompt is left alone.
    pub prompt_injection: String,
    /// Extension for the staged script, without the dot.
    pub file_extension: String,
}

/// Shell-specific behavior for activated sessions.
pub trait ShellAdapter: Send + Sync {
    fn kind(&self) -> ShellKind;

    /// Shell name for display/logging (e.g. "bash", "zsh", "cmd.exe").
    fn name(&self) -> &str;

    fn syntax(&self) -> ScriptSyntax;

    fn transport(&self) -> Transport;

    /// The activation library used to generate scripts.
    fn activator(&self) -> &dyn Activator;

    /// Binary to spawn.
    fn executable(&self) -> &Path;

    /// Flags for an interactive session.
    fn args(&self) -> Vec<String>;

    /// Flags for a session that exits after its startup script.
    fn one_shot_args(&self) -> Vec<String> {
        self.args()
    }

    fn file_extension(&self) -> &str;

    /// Whether a line of the activation library's output assigns the prompt.
    fn is_prompt_statement(&self, line: &str) -> bool;

    /// Statement that prepends `prompt` to the shell's prompt.
    fn prompt_injection(&self, prompt: &str) -> String;

    /// Quote `argv` into one command line for this shell.
    fn command_line(&self, argv: &[String]) -> String;

    /// Statement printing `text` verbatim.
    fn echo_statement(&self, text: &str) -> String;

    /// How `line` is written into a startup script.
    fn script_statement(&self, line: &str) -> String {
        line.to_string()
    }

    /// Statement that exits the shell with the last command's status.
    fn exit_statement(&self) -> String;

    /// Line terminators to swallow after activation before the session is
    /// handed over.
    fn handoff_newlines(&self) -> usize {
        0
    }

    /// Environment for the child: the inherited one plus [`MARKER_VAR`].
    fn process_environment(&self) -> BTreeMap<OsString, OsString> {
        let mut env: BTreeMap<OsString, OsString> = std::env::vars_os().collect();
        env.insert(MARKER_VAR.into(), "1".into());
        env
    }

    /// Build the script and prompt for `env`.
    ///
    /// Prompt assignments emitted by the activation library are removed;
    /// the prompt is only ever set through `prompt_injection`.
    fn activation_payload(&self, env: &EnvironmentRef) -> Result<ActivationPayload, ActivationError> {
        let activator = self.activator();
        let script = activator.build_script(env)?;
        let name = activator.default_env_name(env);
        let prompt = activator.prompt_modifier(env, &name);

        let line_ending = self.syntax().line_ending();
        let mut script_body = self.syntax().export(MARKER_VAR, "1");
        script_body.push_str(line_ending);
        for line in script.split_inclusive('\n') {
            if self.is_prompt_statement(line.trim_start()) {
                tracing::trace!(shell = self.name(), line = line.trim_end(), "dropping prompt line");
                continue;
            }
            script_body.push_str(line);
        }

        let prompt_injection = if prompt.is_empty() {
            String::new()
        } else {
            self.prompt_injection(&prompt)
        };

        Ok(ActivationPayload {
            script_body,
            prompt_injection,
            file_extension: self.file_extension().to_string(),
        })
    }

    /// Text printed by `--hook`: the staged script followed by the prompt
    /// statement, for the caller to evaluate in their own shell.
    fn hook_script(&self, payload: &ActivationPayload) -> String {
        let mut script = payload.script_body.clone();
        if !payload.prompt_injection.is_empty() {
            script.push_str(&payload.prompt_injection);
            script.push_str(self.syntax().line_ending());
        }
        script
    }
}
