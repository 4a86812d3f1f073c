use crate::log::Level;
use clap::{Parser, crate_version};
use envspawn_shell::Handoff;
use std::path::PathBuf;

#[derive(Clone, Debug, Parser)]
#[command(
    name = "envspawn",
    version,
    color = clap::ColorChoice::Auto,
    about = format!("envspawn {}: start a shell with an environment activated", crate_version!())
)]
pub struct Cli {
    #[arg(help = "Path of the environment prefix to activate.")]
    pub prefix: PathBuf,

    #[arg(
        last = true,
        value_name = "COMMAND",
        help = "Command to run inside the activated shell."
    )]
    pub command: Vec<String>,

    #[arg(
        short,
        long,
        env = "ENVSPAWN_SHELL",
        help = "Shell to spawn (bash, zsh, dash, sh, cmd, powershell). Detected when omitted."
    )]
    pub shell: Option<String>,

    #[arg(
        long,
        conflicts_with_all = ["command", "interactive"],
        help = "Print the activation script for the current shell instead of spawning one."
    )]
    pub hook: bool,

    #[arg(
        short,
        long,
        requires = "command",
        help = "Stay in the shell after COMMAND has run."
    )]
    pub interactive: bool,

    #[arg(
        long,
        value_name = "SECONDS",
        help = "Give up if the shell has not activated after this many seconds."
    )]
    pub handshake_timeout: Option<u64>,

    #[arg(
        short,
        long,
        env = "ENVSPAWN_CONFIG",
        value_name = "PATH",
        help = "Configuration file. Defaults to $XDG_CONFIG_HOME/envspawn/config.yaml."
    )]
    pub config: Option<PathBuf>,

    #[arg(short, long, help = "Enable debug logs.")]
    pub verbose: bool,

    #[arg(short, long, conflicts_with = "verbose", help = "Silence all logs.")]
    pub quiet: bool,
}

impl Cli {
    pub fn log_level(&self) -> Level {
        if self.verbose {
            Level::Debug
        } else if self.quiet {
            Level::Silent
        } else {
            Level::default()
        }
    }

    pub fn command(&self) -> Option<&[String]> {
        (!self.command.is_empty()).then_some(self.command.as_slice())
    }

    /// One-shot when a command is given, unless `--interactive` asks to stay.
    pub fn handoff(&self) -> Handoff {
        if self.command.is_empty() || self.interactive {
            Handoff::Interactive
        } else {
            Handoff::Completed
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_cli_is_consistent() {
        <Cli as CommandFactory>::command().debug_assert();
    }

    #[test]
    fn test_command_after_separator() {
        let cli = Cli::try_parse_from(["envspawn", "/opt/env", "--", "python", "-V"]).unwrap();
        assert_eq!(cli.prefix, PathBuf::from("/opt/env"));
        assert_eq!(cli.command(), Some(&["python".to_string(), "-V".to_string()][..]));
        assert_eq!(cli.handoff(), Handoff::Completed);
    }

    #[test]
    fn test_interactive_without_command() {
        let cli = Cli::try_parse_from(["envspawn", "/opt/env"]).unwrap();
        assert_eq!(cli.command(), None);
        assert_eq!(cli.handoff(), Handoff::Interactive);
    }

    #[test]
    fn test_interactive_flag_keeps_shell() {
        let cli = Cli::try_parse_from(["envspawn", "-i", "/opt/env", "--", "ls"]).unwrap();
        assert_eq!(cli.handoff(), Handoff::Interactive);
    }

    #[test]
    fn test_interactive_requires_command() {
        assert!(Cli::try_parse_from(["envspawn", "-i", "/opt/env"]).is_err());
    }

    #[test]
    fn test_hook_conflicts_with_command() {
        assert!(Cli::try_parse_from(["envspawn", "--hook", "/opt/env", "--", "ls"]).is_err());
    }

    #[test]
    fn test_log_levels() {
        let verbose = Cli::try_parse_from(["envspawn", "-v", "/opt/env"]).unwrap();
        assert!(verbose.log_level() == Level::Debug);
        let quiet = Cli::try_parse_from(["envspawn", "-q", "/opt/env"]).unwrap();
        assert!(quiet.log_level() == Level::Silent);
        assert!(Cli::try_parse_from(["envspawn", "-q", "-v", "/opt/env"]).is_err());
    }
}
