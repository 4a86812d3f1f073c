use envspawn_activate::ActivationError;
use miette::Diagnostic;
use std::io;
use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Error, Diagnostic)]
pub enum SpawnError {
    #[error(transparent)]
    #[diagnostic(code(envspawn::activation))]
    Activation(#[from] ActivationError),

    #[error("failed to stage the activation script")]
    #[diagnostic(code(envspawn::staging))]
    Staging(#[source] io::Error),

    #[error("failed to spawn {}: {reason}", executable.display())]
    #[diagnostic(code(envspawn::spawn), help("check that the shell exists and is executable"))]
    Spawn { executable: PathBuf, reason: String },

    #[error("shell '{shell}' cannot be spawned on this platform")]
    #[diagnostic(code(envspawn::unavailable))]
    Unavailable { shell: String },

    #[error("the shell did not finish activating within {0:?}")]
    #[diagnostic(
        code(envspawn::handshake_timeout),
        help("raise --handshake-timeout or check the shell's startup files")
    )]
    HandshakeTimeout(Duration),

    #[error("terminal error")]
    #[diagnostic(code(envspawn::terminal))]
    Bridge(#[source] BridgeError),

    #[error(transparent)]
    Io(#[from] io::Error),
}

/// Failures of the pty bridge.
#[derive(Debug, Error)]
pub enum BridgeError {
    #[error("failed to create PTY: {0}")]
    Create(String),
    #[error("failed to spawn {}: {reason}", executable.display())]
    Spawn { executable: PathBuf, reason: String },
    #[error("failed to get writer: {0}")]
    Writer(String),
    #[error("failed to resize PTY: {0}")]
    Resize(String),
    #[error("PTY master has no file descriptor")]
    NoFd,
    #[error("failed to wait for child: {0}")]
    Wait(String),
    #[error("IO error: {0}")]
    Io(#[from] io::Error),
}

#[cfg(unix)]
impl From<nix::errno::Errno> for BridgeError {
    fn from(errno: nix::errno::Errno) -> Self {
        BridgeError::Io(io::Error::from(errno))
    }
}

impl From<BridgeError> for SpawnError {
    fn from(err: BridgeError) -> Self {
        match err {
            BridgeError::Spawn { executable, reason } => SpawnError::Spawn { executable, reason },
            other => SpawnError::Bridge(other),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_activation_error_is_transparent() {
        let err: SpawnError = ActivationError::EmptyPrefix.into();
        assert_eq!(err.to_string(), ActivationError::EmptyPrefix.to_string());
    }

    #[test]
    fn test_timeout_message() {
        let err = SpawnError::HandshakeTimeout(Duration::from_secs(3));
        assert_eq!(err.to_string(), "the shell did not finish activating within 3s");
    }

    #[test]
    fn test_bridge_spawn_maps_to_spawn() {
        let err: SpawnError = BridgeError::Spawn {
            executable: PathBuf::from("/bin/nope"),
            reason: "missing".to_string(),
        }
        .into();
        assert!(matches!(err, SpawnError::Spawn { .. }));
        assert_eq!(err.to_string(), "failed to spawn /bin/nope: missing");
    }

    #[test]
    fn test_other_bridge_errors_are_wrapped() {
        let err: SpawnError = BridgeError::NoFd.into();
        assert!(matches!(err, SpawnError::Bridge(BridgeError::NoFd)));
    }
}
