use super::{ShellAdapter, Transport};
use crate::kind::ShellKind;
use envspawn_activate::{Activator, ScriptSyntax};
use std::borrow::Cow;
use std::path::{Path, PathBuf};

/// cmd.exe, driven through a startup batch file.
pub struct CmdExeShell {
    executable: PathBuf,
    activator: Box<dyn Activator>,
}

impl CmdExeShell {
    pub fn new(executable: impl Into<PathBuf>, activator: Box<dyn Activator>) -> Self {
        Self {
            executable: executable.into(),
            activator,
        }
    }
}

impl ShellAdapter for CmdExeShell {
    fn kind(&self) -> ShellKind {
        ShellKind::WindowsBatch
    }

    fn name(&self) -> &str {
        "cmd.exe"
    }

    fn syntax(&self) -> ScriptSyntax {
        ScriptSyntax::Batch
    }

    fn transport(&self) -> Transport {
        Transport::StartupScript
    }

    fn activator(&self) -> &dyn Activator {
        self.activator.as_ref()
    }

    fn executable(&self) -> &Path {
        &self.executable
    }

    fn args(&self) -> Vec<String> {
        // /D skips AutoRun, /K keeps the shell open after the batch file.
        vec!["/D".into(), "/K".into()]
    }

    fn one_shot_args(&self) -> Vec<String> {
        vec!["/D".into(), "/C".into()]
    }

    fn file_extension(&self) -> &str {
        "bat"
    }

    fn is_prompt_statement(&self, line: &str) -> bool {
        let line = line.to_ascii_lowercase();
        line.starts_with("@set \"prompt=")
            || line.starts_with("set \"prompt=")
            || line.starts_with("@prompt ")
            || line.starts_with("prompt ")
    }

    fn prompt_injection(&self, prompt: &str) -> String {
        ScriptSyntax::Batch.set_prompt(prompt)
    }

    fn command_line(&self, argv: &[String]) -> String {
        argv.iter()
            .map(|arg| shell_escape::windows::escape(Cow::Borrowed(arg.as_str())))
            .collect::<Vec<_>>()
            .join(" ")
            .replace('%', "%%")
    }

    fn echo_statement(&self, text: &str) -> String {
        let mut escaped = String::with_capacity(text.len());
        for ch in text.chars() {
            if matches!(ch, '^' | '&' | '|' | '<' | '>' | '(' | ')') {
                escaped.push('^');
            }
            escaped.push(ch);
        }
        format!("@ECHO {escaped}")
    }

    fn script_statement(&self, line: &str) -> String {
        format!("@{line}")
    }

    fn exit_statement(&self) -> String {
        "@EXIT /B %ERRORLEVEL%".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use envspawn_activate::{ActivationSettings, EnvironmentRef, PrefixActivator};

    fn cmd() -> CmdExeShell {
        CmdExeShell::new(
            "cmd.exe",
            Box::new(PrefixActivator::new(
                ScriptSyntax::Batch,
                ActivationSettings::default(),
            )),
        )
    }

    #[test]
    fn test_batch_flags() {
        assert_eq!(cmd().args(), vec!["/D", "/K"]);
        assert_eq!(cmd().one_shot_args(), vec!["/D", "/C"]);
        assert_eq!(cmd().file_extension(), "bat");
    }

    #[test]
    fn test_payload_strips_prompt() {
        let env = EnvironmentRef::new("/opt/env").unwrap();
        let payload = cmd().activation_payload(&env).unwrap();
        assert!(payload.script_body.starts_with("@SET \"ENVSPAWN=1\"\r\n"));
        assert!(!payload.script_body.contains("PROMPT="));
        assert!(payload.prompt_injection.starts_with("@SET \"PROMPT="));
    }

    #[test]
    fn test_command_line_doubles_percent() {
        let argv = vec!["echo".to_string(), "%PATH%".to_string()];
        assert_eq!(cmd().command_line(&argv), "echo %%PATH%%");
    }

    #[test]
    fn test_echo_escapes_metacharacters() {
        assert_eq!(cmd().echo_statement("a & b"), "@ECHO a ^& b");
    }

    #[test]
    fn test_script_statement_is_silent() {
        assert_eq!(cmd().script_statement("SET"), "@SET");
    }
}
