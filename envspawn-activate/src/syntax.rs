use std::borrow::Cow;

/// Statement syntax an activation script is written in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScriptSyntax {
    /// `sh`-compatible: bash, zsh, dash, ash.
    Posix,
    /// `cmd.exe` batch files.
    Batch,
    /// PowerShell scripts.
    PowerShell,
}

impl ScriptSyntax {
    pub fn line_ending(self) -> &'static str {
        match self {
            ScriptSyntax::Posix => "\n",
            ScriptSyntax::Batch | ScriptSyntax::PowerShell => "\r\n",
        }
    }

    /// Export `name=value` to child processes.
    pub fn export(self, name: &str, value: &str) -> String {
        match self {
            ScriptSyntax::Posix => format!("export {name}={}", posix_quote(value)),
            ScriptSyntax::Batch => format!("@SET \"{name}={}\"", batch_escape(value)),
            ScriptSyntax::PowerShell => format!("$Env:{name} = {}", powershell_quote(value)),
        }
    }

    /// Put `entries` in front of the existing `PATH`.
    pub fn prepend_path(self, entries: &[String]) -> String {
        match self {
            ScriptSyntax::Posix => format!(
                "export PATH={}\"${{PATH:+:${{PATH}}}}\"",
                posix_quote(&entries.join(":"))
            ),
            ScriptSyntax::Batch => {
                let joined = entries
                    .iter()
                    .map(|e| batch_escape(e))
                    .collect::<Vec<_>>()
                    .join(";");
                format!("@SET \"PATH={joined};%PATH%\"")
            }
            ScriptSyntax::PowerShell => format!(
                "$Env:PATH = {} + $Env:PATH",
                powershell_quote(&format!("{};", entries.join(";")))
            ),
        }
    }

    /// Prompt assignment as the activation library writes it. Shell
    /// adapters strip this line and inject the prompt themselves.
    pub fn set_prompt(self, modifier: &str) -> String {
        match self {
            ScriptSyntax::Posix => format!("PS1={}\"${{PS1:-}}\"", posix_quote(modifier)),
            ScriptSyntax::Batch => {
                let modifier = batch_escape(modifier).replace('$', "$$");
                format!("@SET \"PROMPT={modifier}$P$G\"")
            }
            ScriptSyntax::PowerShell => format!(
                "function global:prompt {{ {} + 'PS ' + (Get-Location) + '> ' }}",
                powershell_quote(modifier)
            ),
        }
    }
}

fn posix_quote(value: &str) -> String {
    shell_escape::unix::escape(Cow::Borrowed(value)).into_owned()
}

/// Escape a value for use inside `SET "..."` in a batch file.
fn batch_escape(value: &str) -> String {
    value.replace('%', "%%").replace('"', "")
}

fn powershell_quote(value: &str) -> String {
    format!("'{}'", value.replace('\'', "''"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_posix_export_quotes_spaces() {
        assert_eq!(
            ScriptSyntax::Posix.export("X", "a b"),
            "export X='a b'".to_string()
        );
    }

    #[test]
    fn test_batch_escapes_percent() {
        assert_eq!(
            ScriptSyntax::Batch.export("X", "100%"),
            "@SET \"X=100%%\"".to_string()
        );
    }

    #[test]
    fn test_powershell_doubles_single_quotes() {
        assert_eq!(
            ScriptSyntax::PowerShell.export("X", "it's"),
            "$Env:X = 'it''s'".to_string()
        );
    }

    #[test]
    fn test_batch_prompt_escapes_dollar() {
        assert_eq!(
            ScriptSyntax::Batch.set_prompt("($x) "),
            "@SET \"PROMPT=($$x) $P$G\"".to_string()
        );
    }
}
