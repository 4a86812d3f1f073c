use envspawn_activate::ActivationSettings;
use miette::Diagnostic;
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

const APP_NAME: &str = "envspawn";
const CONFIG_FILE: &str = "config.yaml";

#[derive(Debug, Error, Diagnostic)]
pub enum ConfigError {
    #[error("failed to read config file {}", path.display())]
    #[diagnostic(code(envspawn::config::read))]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("invalid config file {}", path.display())]
    #[diagnostic(code(envspawn::config::parse))]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_yaml::Error,
    },
}

/// Contents of `config.yaml`. Every key is optional.
#[derive(Clone, Debug, Default, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Config {
    #[serde(default)]
    pub shell: Option<String>,
    #[serde(default)]
    pub env_prompt: Option<String>,
    #[serde(default)]
    pub changeps1: Option<bool>,
    /// Seconds.
    #[serde(default)]
    pub handshake_timeout: Option<u64>,
}

impl Config {
    /// Load `explicit`, or the XDG config file when there is one.
    pub fn load(explicit: Option<&Path>) -> Result<Self, ConfigError> {
        match explicit {
            Some(path) => Self::load_from(path),
            None => match default_path() {
                Some(path) => Self::load_from(&path),
                None => {
                    tracing::debug!("no config file found");
                    Ok(Self::default())
                }
            },
        }
    }

    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        tracing::debug!(path = %path.display(), "loaded config");
        Self::parse(&contents).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    fn parse(contents: &str) -> Result<Self, serde_yaml::Error> {
        if contents.trim().is_empty() {
            return Ok(Self::default());
        }
        serde_yaml::from_str(contents)
    }

    /// Overlay the prompt settings onto `settings`.
    pub fn apply(&self, settings: &mut ActivationSettings) {
        if let Some(env_prompt) = &self.env_prompt {
            settings.env_prompt = env_prompt.clone();
        }
        if let Some(changeps1) = self.changeps1 {
            settings.changeps1 = changeps1;
        }
    }

    pub fn handshake_timeout(&self) -> Option<Duration> {
        self.handshake_timeout.map(Duration::from_secs)
    }
}

/// `$XDG_CONFIG_HOME/envspawn/config.yaml` (or the first match in
/// `$XDG_CONFIG_DIRS`), if it exists.
pub fn default_path() -> Option<PathBuf> {
    let dirs = xdg::BaseDirectories::with_prefix(APP_NAME);
    dirs.find_config_file(CONFIG_FILE)
}
