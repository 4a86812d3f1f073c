use super::{ShellAdapter, Transport};
use crate::kind::ShellKind;
use envspawn_activate::{Activator, ScriptSyntax};
use std::path::{Path, PathBuf};

/// Windows PowerShell or pwsh, driven through a startup script.
pub struct PowerShell {
    name: String,
    executable: PathBuf,
    activator: Box<dyn Activator>,
}

impl PowerShell {
    pub fn new(executable: impl Into<PathBuf>, activator: Box<dyn Activator>) -> Self {
        let executable = executable.into();
        let name = executable
            .file_stem()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "powershell".to_string());
        Self {
            name,
            executable,
            activator,
        }
    }
}

fn quote(text: &str) -> String {
    format!("'{}'", text.replace('\'', "''"))
}

impl ShellAdapter for PowerShell {
    fn kind(&self) -> ShellKind {
        ShellKind::WindowsShell
    }

    fn name(&self) -> &str {
        &self.name
    }

    fn syntax(&self) -> ScriptSyntax {
        ScriptSyntax::PowerShell
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
        vec![
            "-NoLogo".into(),
            "-NoExit".into(),
            "-ExecutionPolicy".into(),
            "Bypass".into(),
            "-File".into(),
        ]
    }

    fn one_shot_args(&self) -> Vec<String> {
        vec![
            "-NoLogo".into(),
            "-ExecutionPolicy".into(),
            "Bypass".into(),
            "-File".into(),
        ]
    }

    fn file_extension(&self) -> &str {
        "ps1"
    }

    fn is_prompt_statement(&self, line: &str) -> bool {
        let line = line.to_ascii_lowercase();
        line.starts_with("function global:prompt") || line.starts_with("function prompt")
    }

    fn prompt_injection(&self, prompt: &str) -> String {
        format!(
            "$global:__envspawn_prompt = $function:prompt; \
             function global:prompt {{ {} + (& $global:__envspawn_prompt) }}",
            quote(prompt)
        )
    }

    fn command_line(&self, argv: &[String]) -> String {
        let quoted = argv.iter().map(|arg| quote(arg)).collect::<Vec<_>>();
        format!("& {}", quoted.join(" "))
    }

    fn echo_statement(&self, text: &str) -> String {
        format!("Write-Host {}", quote(text))
    }

    fn exit_statement(&self) -> String {
        "exit $LASTEXITCODE".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use envspawn_activate::{ActivationSettings, EnvironmentRef, PrefixActivator};

    fn powershell() -> PowerShell {
        PowerShell::new(
            "powershell.exe",
            Box::new(PrefixActivator::new(
                ScriptSyntax::PowerShell,
                ActivationSettings::default(),
            )),
        )
    }

    #[test]
    fn test_name_from_executable() {
        assert_eq!(powershell().name(), "powershell");
    }

    #[test]
    fn test_no_exit_only_for_interactive() {
        assert!(powershell().args().contains(&"-NoExit".to_string()));
        assert!(!powershell().one_shot_args().contains(&"-NoExit".to_string()));
        assert_eq!(powershell().args().last().map(String::as_str), Some("-File"));
    }

    #[test]
    fn test_payload_replaces_prompt_function() {
        let env = EnvironmentRef::new("/opt/env").unwrap();
        let payload = powershell().activation_payload(&env).unwrap();
        assert!(payload.script_body.starts_with("$Env:ENVSPAWN = '1'\r\n"));
        assert!(!payload.script_body.contains("function global:prompt"));
        assert!(payload.prompt_injection.contains("function global:prompt"));
    }

    #[test]
    fn test_command_line_uses_call_operator() {
        let argv = vec!["python".to_string(), "-c".to_string(), "print('x')".to_string()];
        assert_eq!(
            powershell().command_line(&argv),
            "& 'python' '-c' 'print(''x'')'"
        );
    }
}
