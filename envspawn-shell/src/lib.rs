//! Spawning shells with an environment already activated.
//!
//! [`ShellRegistry`] picks a [`ShellAdapter`] for the requested or ambient
//! shell, and [`Handshake`] stages the activation script, spawns the shell
//! and hands it over once activation has finished.

pub mod adapter;
pub mod detect;
mod error;
pub mod handshake;
pub mod interrupt;
pub mod kind;
#[cfg(unix)]
pub mod pty;
pub mod registry;
#[cfg(unix)]
mod signals;
pub mod staging;
pub mod terminal;

pub use adapter::{ActivationPayload, MARKER_VAR, ShellAdapter, Transport};
pub use detect::{AmbientShellDetector, DetectError, ShellDetector};
pub use error::{BridgeError, SpawnError};
pub use handshake::{Handoff, Handshake, HandshakeState, SpawnOptions};
pub use interrupt::InterruptGuard;
#[cfg(unix)]
pub use handshake::{Activation, ActiveSession};
pub use kind::ShellKind;
#[cfg(unix)]
pub use pty::{ExpectOutcome, SizeSource, TerminalBridge};
pub use registry::{RegistryError, ShellRegistry};
pub use staging::StagedScript;
