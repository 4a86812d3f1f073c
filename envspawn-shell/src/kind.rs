use envspawn_activate::ScriptSyntax;
use std::path::Path;

/// Shell families envspawn knows about.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ShellKind {
    /// bash, zsh, dash, ash and plain sh, driven through a pty.
    PosixInteractive,
    /// cmd.exe, driven through a startup batch file.
    WindowsBatch,
    /// PowerShell, driven through a startup script.
    WindowsShell,
    /// Recognized but not implemented: csh, tcsh, fish, xonsh.
    Unsupported,
}

impl ShellKind {
    /// Classify a shell name or path. The basename is compared
    /// case-insensitively; `None` means the name is unknown.
    pub fn from_name(name: &str) -> Option<Self> {
        let base = Path::new(name.trim())
            .file_name()
            .map(|n| n.to_string_lossy().to_lowercase())?;
        let base = base.strip_prefix('-').unwrap_or(&base);
        match base {
            "posix" | "sh" | "bash" | "zsh" | "dash" | "ash" => Some(ShellKind::PosixInteractive),
            "cmd" | "cmd.exe" => Some(ShellKind::WindowsBatch),
            "powershell" | "powershell.exe" | "pwsh" | "pwsh.exe" => Some(ShellKind::WindowsShell),
            "csh" | "tcsh" | "fish" | "xonsh" => Some(ShellKind::Unsupported),
            _ => None,
        }
    }

    /// Whether an adapter for this kind can run on the current platform.
    pub fn is_available(self) -> bool {
        match self {
            ShellKind::PosixInteractive => cfg!(unix),
            ShellKind::WindowsBatch | ShellKind::WindowsShell => cfg!(windows),
            ShellKind::Unsupported => false,
        }
    }

    /// The activation script syntax for this kind.
    pub fn syntax(self) -> Option<ScriptSyntax> {
        match self {
            ShellKind::PosixInteractive => Some(ScriptSyntax::Posix),
            ShellKind::WindowsBatch => Some(ScriptSyntax::Batch),
            ShellKind::WindowsShell => Some(ScriptSyntax::PowerShell),
            ShellKind::Unsupported => None,
        }
    }

    /// The kind used when nothing better is known.
    pub fn platform_default() -> Self {
        if cfg!(windows) {
            ShellKind::WindowsBatch
        } else {
            ShellKind::PosixInteractive
        }
    }
}

impl std::fmt::Display for ShellKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ShellKind::PosixInteractive => write!(f, "posix"),
            ShellKind::WindowsBatch => write!(f, "cmd.exe"),
            ShellKind::WindowsShell => write!(f, "powershell"),
            ShellKind::Unsupported => write!(f, "unsupported"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_name_posix_family() {
        for name in ["bash", "zsh", "dash", "ash", "sh", "posix"] {
            assert_eq!(ShellKind::from_name(name), Some(ShellKind::PosixInteractive));
        }
    }

    #[test]
    fn test_from_name_accepts_paths_and_login_dash() {
        assert_eq!(
            ShellKind::from_name("/usr/bin/zsh"),
            Some(ShellKind::PosixInteractive)
        );
        assert_eq!(ShellKind::from_name("-bash"), Some(ShellKind::PosixInteractive));
        assert_eq!(ShellKind::from_name("CMD.EXE"), Some(ShellKind::WindowsBatch));
    }

    #[test]
    fn test_from_name_unsupported_and_unknown() {
        assert_eq!(ShellKind::from_name("fish"), Some(ShellKind::Unsupported));
        assert_eq!(ShellKind::from_name("tcsh"), Some(ShellKind::Unsupported));
        assert_eq!(ShellKind::from_name("nonexistent"), None);
        assert_eq!(ShellKind::from_name(""), None);
    }

    #[test]
    fn test_unsupported_has_no_syntax() {
        assert!(ShellKind::Unsupported.syntax().is_none());
        assert!(!ShellKind::Unsupported.is_available());
    }

    #[test]
    fn test_platform_default_is_available() {
        assert!(ShellKind::platform_default().is_available());
    }
}
