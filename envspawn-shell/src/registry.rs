//! Maps shell names to adapters.

use crate::adapter::{CmdExeShell, PosixShell, PowerShell, ShellAdapter};
use crate::detect::{AmbientShellDetector, ShellDetector};
use crate::kind::ShellKind;
use envspawn_activate::{ActivationSettings, PrefixActivator, ScriptSyntax};
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Used when `$SHELL` is unset or not a POSIX shell.
const POSIX_FALLBACK_SHELL: &str = "/bin/bash";

#[derive(Debug, Error, PartialEq, Eq)]
pub enum RegistryError {
    #[error("unknown shell '{0}'")]
    Unknown(String),
    #[error("shell '{0}' is recognized but not supported")]
    Unsupported(String),
    #[error("shell '{name}' ({kind}) is not available on this platform")]
    Unavailable { name: String, kind: ShellKind },
}

/// Resolves requested or detected shell names into adapters.
pub struct ShellRegistry {
    settings: ActivationSettings,
    detector: Box<dyn ShellDetector>,
}

impl ShellRegistry {
    pub fn new(settings: ActivationSettings) -> Self {
        Self {
            settings,
            detector: Box::new(AmbientShellDetector),
        }
    }

    pub fn with_detector(mut self, detector: Box<dyn ShellDetector>) -> Self {
        self.detector = detector;
        self
    }

    /// Adapter for `requested`, or for the detected shell when `None`.
    ///
    /// Never fails: unknown, unsupported or unavailable shells and failed
    /// detection all fall back to the platform default with a warning.
    pub fn resolve(&self, requested: Option<&str>) -> Box<dyn ShellAdapter> {
        let name = match requested {
            Some(name) => name.to_string(),
            None => match self.detector.detect() {
                Ok(name) => name,
                Err(e) => {
                    tracing::warn!("{e}, falling back to the default shell");
                    return self.platform_default();
                }
            },
        };

        match self.adapter_for_name(&name) {
            Ok(adapter) => {
                tracing::debug!(
                    shell = adapter.name(),
                    executable = %adapter.executable().display(),
                    "resolved shell"
                );
                adapter
            }
            Err(e) => {
                tracing::warn!("{e}, falling back to the default shell");
                self.platform_default()
            }
        }
    }

    /// Adapter for a shell name or path; fails for anything that cannot be
    /// spawned here.
    pub fn adapter_for_name(&self, name: &str) -> Result<Box<dyn ShellAdapter>, RegistryError> {
        let kind = ShellKind::from_name(name).ok_or_else(|| RegistryError::Unknown(name.to_string()))?;
        let executable = match kind {
            ShellKind::Unsupported => return Err(RegistryError::Unsupported(name.to_string())),
            _ if !kind.is_available() => {
                return Err(RegistryError::Unavailable {
                    name: name.to_string(),
                    kind,
                });
            }
            ShellKind::PosixInteractive => posix_executable(name),
            ShellKind::WindowsBatch => comspec(),
            ShellKind::WindowsShell => powershell_executable(name),
        };
        Ok(self.build(kind, executable))
    }

    /// `$SHELL` (or bash) on POSIX, `%COMSPEC%` on Windows.
    pub fn platform_default(&self) -> Box<dyn ShellAdapter> {
        let kind = ShellKind::platform_default();
        let executable = match kind {
            ShellKind::WindowsBatch => comspec(),
            _ => default_posix_shell(),
        };
        self.build(kind, executable)
    }

    fn build(&self, kind: ShellKind, executable: PathBuf) -> Box<dyn ShellAdapter> {
        let syntax = kind.syntax().unwrap_or(ScriptSyntax::Posix);
        let activator = Box::new(PrefixActivator::new(syntax, self.settings.clone()));
        match kind {
            ShellKind::WindowsBatch => Box::new(CmdExeShell::new(executable, activator)),
            ShellKind::WindowsShell => Box::new(PowerShell::new(executable, activator)),
            ShellKind::PosixInteractive | ShellKind::Unsupported => Box::new(PosixShell::new(executable, activator)),
        }
    }
}

fn default_posix_shell() -> PathBuf {
    if let Some(shell) = std::env::var_os("SHELL")
        && ShellKind::from_name(&shell.to_string_lossy()) == Some(ShellKind::PosixInteractive)
    {
        return PathBuf::from(shell);
    }
    if Path::new(POSIX_FALLBACK_SHELL).exists() {
        PathBuf::from(POSIX_FALLBACK_SHELL)
    } else {
        PathBuf::from("/bin/sh")
    }
}

fn posix_executable(name: &str) -> PathBuf {
    if name.contains('/') {
        return PathBuf::from(name);
    }
    if name == "posix" {
        return default_posix_shell();
    }
    if let Some(shell) = std::env::var_os("SHELL")
        && Path::new(&shell).file_name() == Some(std::ffi::OsStr::new(name))
    {
        return PathBuf::from(shell);
    }
    which::which(name).unwrap_or_else(|_| Path::new("/bin").join(name))
}

fn comspec() -> PathBuf {
    std::env::var_os("COMSPEC")
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from("cmd.exe"))
}

fn powershell_executable(name: &str) -> PathBuf {
    let path = Path::new(name);
    if path.is_absolute() {
        return path.to_path_buf();
    }
    which::which(name)
        .or_else(|_| which::which("pwsh"))
        .unwrap_or_else(|_| PathBuf::from("powershell.exe"))
}
