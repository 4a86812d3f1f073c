use super::{ShellAdapter, Transport};
use crate::kind::ShellKind;
use envspawn_activate::{Activator, ScriptSyntax};
use std::borrow::Cow;
use std::path::{Path, PathBuf};

/// bash, zsh, dash, ash or sh, driven through a pty.
pub struct PosixShell {
    name: String,
    executable: PathBuf,
    activator: Box<dyn Activator>,
}

impl PosixShell {
    pub fn new(executable: impl Into<PathBuf>, activator: Box<dyn Activator>) -> Self {
        let executable = executable.into();
        let name = executable
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "sh".to_string());
        Self {
            name,
            executable,
            activator,
        }
    }
}

impl ShellAdapter for PosixShell {
    fn kind(&self) -> ShellKind {
        ShellKind::PosixInteractive
    }

    fn name(&self) -> &str {
        &self.name
    }

    fn syntax(&self) -> ScriptSyntax {
        ScriptSyntax::Posix
    }

    fn transport(&self) -> Transport {
        Transport::Pty
    }

    fn activator(&self) -> &dyn Activator {
        self.activator.as_ref()
    }

    fn executable(&self) -> &Path {
        &self.executable
    }

    fn args(&self) -> Vec<String> {
        // Login + interactive, so the user's profile and rc files still apply
        // underneath the activation.
        vec!["-l".into(), "-i".into()]
    }

    fn file_extension(&self) -> &str {
        "sh"
    }

    fn is_prompt_statement(&self, line: &str) -> bool {
        line.starts_with("PS1=") || line.starts_with("export PS1=")
    }

    fn prompt_injection(&self, prompt: &str) -> String {
        format!("PS1=\"{}${{PS1:-}}\"", double_quote_escape(prompt))
    }

    fn command_line(&self, argv: &[String]) -> String {
        argv.iter()
            .map(|arg| shell_escape::unix::escape(Cow::Borrowed(arg.as_str())))
            .collect::<Vec<_>>()
            .join(" ")
    }

    fn echo_statement(&self, text: &str) -> String {
        format!(
            "printf '%s\\n' {}",
            shell_escape::unix::escape(Cow::Borrowed(text))
        )
    }

    fn exit_statement(&self) -> String {
        "exit $?".to_string()
    }

    fn handoff_newlines(&self) -> usize {
        // zsh's line editor emits one more line break after the activation
        // line has run.
        usize::from(self.name == "zsh")
    }
}

/// Escape text for a double-quoted POSIX string.
fn double_quote_escape(text: &str) -> String {
    let mut escaped = String::with_capacity(text.len());
    for ch in text.chars() {
        if matches!(ch, '"' | '\\' | '$' | '`') {
            escaped.push('\\');
        }
        escaped.push(ch);
    }
    escaped
}
