//! Best-effort detection of the shell envspawn was invoked from.

use crate::kind::ShellKind;
use thiserror::Error;

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum DetectError {
    #[error("could not determine the invoking shell")]
    NotFound,
}

/// Source of the ambient shell name.
pub trait ShellDetector: Send + Sync {
    fn detect(&self) -> Result<String, DetectError>;
}

/// Looks at the parent process first, then at `$SHELL` (`%COMSPEC%` on
/// Windows).
#[derive(Debug, Default, Clone, Copy)]
pub struct AmbientShellDetector;

impl ShellDetector for AmbientShellDetector {
    fn detect(&self) -> Result<String, DetectError> {
        if let Some(name) = parent_process_name()
            && ShellKind::from_name(&name).is_some()
        {
            tracing::debug!(shell = %name, "detected shell from parent process");
            return Ok(name);
        }

        let var = if cfg!(windows) { "COMSPEC" } else { "SHELL" };
        match std::env::var(var) {
            Ok(shell) if !shell.is_empty() => {
                tracing::debug!(shell = %shell, "detected shell from ${}", var);
                Ok(shell)
            }
            _ => Err(DetectError::NotFound),
        }
    }
}

#[cfg(target_os = "linux")]
fn parent_process_name() -> Option<String> {
    let ppid = std::os::unix::process::parent_id();
    let comm = std::fs::read_to_string(format!("/proc/{ppid}/comm")).ok()?;
    let comm = comm.trim();
    (!comm.is_empty()).then(|| comm.to_string())
}

#[cfg(not(target_os = "linux"))]
fn parent_process_name() -> Option<String> {
    None
}
