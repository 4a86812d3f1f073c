//! Activation script generation for envspawn.
//!
//! An [`Activator`] turns an [`EnvironmentRef`] into the statements a shell
//! has to evaluate for the environment to be active: exported variables,
//! `PATH` entries and a prompt line. The shell crate consumes this through
//! the trait so the generator can be swapped out.

mod syntax;

pub use syntax::ScriptSyntax;

use std::path::{Path, PathBuf};
use thiserror::Error;

/// Variable holding the activated prefix.
pub const PREFIX_VAR: &str = "ENVSPAWN_PREFIX";
/// Variable holding the short name of the active environment.
///
/// When already set in the invoking process it overrides the derived name.
pub const DEFAULT_ENV_VAR: &str = "ENVSPAWN_DEFAULT_ENV";
/// Variable holding the rendered prompt modifier.
pub const PROMPT_MODIFIER_VAR: &str = "ENVSPAWN_PROMPT_MODIFIER";

/// Default prompt template, rendered as `(name) `.
pub const DEFAULT_ENV_PROMPT: &str = "({default_env}) ";

#[derive(Debug, Error)]
pub enum ActivationError {
    #[error("environment prefix is empty")]
    EmptyPrefix,
    #[error("environment prefix is not valid UTF-8: {0}")]
    NonUtf8Prefix(PathBuf),
    #[error("failed to resolve environment prefix {path}: {source}")]
    Resolve {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Path naming the environment to activate.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EnvironmentRef {
    prefix: PathBuf,
}

impl EnvironmentRef {
    /// Build a reference from a path, making it absolute against the
    /// current directory. Symlinks are left alone.
    pub fn new(path: impl AsRef<Path>) -> Result<Self, ActivationError> {
        let path = path.as_ref();
        if path.as_os_str().is_empty() {
            return Err(ActivationError::EmptyPrefix);
        }
        let prefix = std::path::absolute(path).map_err(|source| ActivationError::Resolve {
            path: path.to_path_buf(),
            source,
        })?;
        if prefix.to_str().is_none() {
            return Err(ActivationError::NonUtf8Prefix(prefix));
        }
        Ok(Self { prefix })
    }

    pub fn prefix(&self) -> &Path {
        &self.prefix
    }

    /// The prefix as UTF-8; checked at construction.
    pub fn as_str(&self) -> &str {
        self.prefix.to_str().unwrap_or_default()
    }
}

impl std::fmt::Display for EnvironmentRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.prefix.display())
    }
}

/// Produces activation statements for an environment.
pub trait Activator: Send + Sync {
    /// Full activation script in the activator's syntax, including a
    /// prompt-setting line.
    fn build_script(&self, env: &EnvironmentRef) -> Result<String, ActivationError>;

    /// Short display name of the environment.
    fn default_env_name(&self, env: &EnvironmentRef) -> String;

    /// Text prepended to the shell prompt while the environment is active.
    fn prompt_modifier(&self, env: &EnvironmentRef, default_name: &str) -> String;
}

/// User-tunable parts of activation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ActivationSettings {
    /// Prompt template. `{default_env}`, `{name}` and `{prefix}` are substituted.
    pub env_prompt: String,
    /// Whether the prompt is modified at all.
    pub changeps1: bool,
    /// Overrides the derived environment name, see [`DEFAULT_ENV_VAR`].
    pub default_env_override: Option<String>,
}

impl Default for ActivationSettings {
    fn default() -> Self {
        Self {
            env_prompt: DEFAULT_ENV_PROMPT.to_string(),
            changeps1: true,
            default_env_override: None,
        }
    }
}

impl ActivationSettings {
    /// Default settings with the name override read from the process environment.
    pub fn from_env() -> Self {
        Self {
            default_env_override: std::env::var(DEFAULT_ENV_VAR)
                .ok()
                .filter(|name| !name.is_empty()),
            ..Self::default()
        }
    }
}

/// Activator for a plain directory prefix with its executables under
/// `bin` (POSIX) or the prefix root, `Library\bin` and `Scripts` (Windows).
#[derive(Debug, Clone)]
pub struct PrefixActivator {
    syntax: ScriptSyntax,
    settings: ActivationSettings,
}

impl PrefixActivator {
    pub fn new(syntax: ScriptSyntax, settings: ActivationSettings) -> Self {
        Self { syntax, settings }
    }

    fn path_entries(&self, env: &EnvironmentRef) -> Vec<String> {
        let prefix = env.as_str().trim_end_matches(['/', '\\']);
        match self.syntax {
            ScriptSyntax::Posix => vec![format!("{prefix}/bin")],
            ScriptSyntax::Batch | ScriptSyntax::PowerShell => vec![
                prefix.to_string(),
                format!("{prefix}\\Library\\bin"),
                format!("{prefix}\\Scripts"),
            ],
        }
    }
}

impl Activator for PrefixActivator {
    fn build_script(&self, env: &EnvironmentRef) -> Result<String, ActivationError> {
        let name = self.default_env_name(env);
        let prompt = self.prompt_modifier(env, &name);
        let syntax = self.syntax;

        let mut lines = vec![
            syntax.export(PREFIX_VAR, env.as_str()),
            syntax.export(DEFAULT_ENV_VAR, &name),
            syntax.export(PROMPT_MODIFIER_VAR, &prompt),
            syntax.prepend_path(&self.path_entries(env)),
        ];
        if self.settings.changeps1 {
            lines.push(syntax.set_prompt(&prompt));
        }
        tracing::debug!(prefix = %env, %name, "built activation script");

        let mut script = lines.join(syntax.line_ending());
        script.push_str(syntax.line_ending());
        Ok(script)
    }

    fn default_env_name(&self, env: &EnvironmentRef) -> String {
        if let Some(name) = &self.settings.default_env_override {
            return name.clone();
        }
        let prefix = env.prefix();
        let in_envs_dir = prefix
            .parent()
            .and_then(Path::file_name)
            .is_some_and(|dir| dir == "envs");
        match prefix.file_name() {
            Some(name) if in_envs_dir => name.to_string_lossy().into_owned(),
            _ => env.as_str().to_string(),
        }
    }

    fn prompt_modifier(&self, env: &EnvironmentRef, default_name: &str) -> String {
        if !self.settings.changeps1 {
            return String::new();
        }
        let name = env
            .prefix()
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| env.as_str().to_string());
        self.settings
            .env_prompt
            .replace("{default_env}", default_name)
            .replace("{name}", &name)
            .replace("{prefix}", env.as_str())
    }
}
