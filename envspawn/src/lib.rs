pub mod cli;
pub mod config;
pub mod log;

use cli::Cli;
use config::Config;
use envspawn_activate::{ActivationSettings, EnvironmentRef};
use envspawn_shell::{Handshake, ShellRegistry, SpawnError, SpawnOptions};
use miette::{IntoDiagnostic, Result};
use std::io::Write;

/// Run one invocation and return the exit code for the process.
pub fn run(cli: &Cli) -> Result<i32> {
    let config = Config::load(cli.config.as_deref())?;

    let mut settings = ActivationSettings::from_env();
    config.apply(&mut settings);

    let env = EnvironmentRef::new(&cli.prefix).map_err(SpawnError::from)?;
    let registry = ShellRegistry::new(settings);
    let requested = cli.shell.as_deref().or(config.shell.as_deref());
    let adapter = registry.resolve(requested);

    if cli.hook {
        let payload = adapter.activation_payload(&env).map_err(SpawnError::from)?;
        let mut stdout = std::io::stdout().lock();
        stdout
            .write_all(adapter.hook_script(&payload).as_bytes())
            .into_diagnostic()?;
        stdout.flush().into_diagnostic()?;
        return Ok(0);
    }

    let options = SpawnOptions {
        handshake_timeout: cli
            .handshake_timeout
            .map(std::time::Duration::from_secs)
            .or_else(|| config.handshake_timeout()),
        size: None,
    };
    tracing::debug!(
        prefix = %env,
        shell = adapter.name(),
        handoff = ?cli.handoff(),
        "spawning activated shell"
    );
    let code = Handshake::new(adapter.as_ref(), &env, options).run(cli.command(), cli.handoff())?;
    Ok(code)
}
