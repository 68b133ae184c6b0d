use serde::{Deserialize, Serialize};
use std::fs;
use std::path::PathBuf;
use std::time::Duration;

use crate::{stlog_debug, Error, Result};

/// Default number of concurrent agent dispatches per stage.
pub const DEFAULT_MAX_PARALLEL: usize = 3;

/// Default per-task dispatch timeout in seconds.
pub const DEFAULT_TASK_TIMEOUT_SECS: u64 = 300;

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    pub max_parallel: Option<usize>,
    pub task_timeout_secs: Option<u64>,
    #[serde(default)]
    pub fail_fast: bool,
    pub session_dir: Option<String>,
    pub command: Option<String>,
}

impl Config {
    pub fn strata_dir() -> Result<PathBuf> {
        Ok(dirs::home_dir().ok_or(Error::NoHomeDir)?.join(".strata"))
    }

    pub fn config_path() -> Result<PathBuf> {
        Ok(Self::strata_dir()?.join("strata.toml"))
    }

    /// The session data directory, relative to the current project by default.
    pub fn effective_session_dir(&self) -> PathBuf {
        match &self.session_dir {
            Some(dir) => expand_tilde(dir),
            None => PathBuf::from(".strata/session"),
        }
    }

    pub fn effective_max_parallel(&self) -> usize {
        self.max_parallel.unwrap_or(DEFAULT_MAX_PARALLEL)
    }

    pub fn effective_task_timeout(&self) -> Duration {
        Duration::from_secs(self.task_timeout_secs.unwrap_or(DEFAULT_TASK_TIMEOUT_SECS))
    }

    pub fn effective_command(&self) -> &str {
        self.command.as_deref().unwrap_or("claude")
    }

    pub fn load() -> Result<Self> {
        let path = Self::config_path()?;
        stlog_debug!("Config::load path={}", path.display());
        if !path.exists() {
            stlog_debug!("Config file not found, using defaults");
            return Ok(Self::default());
        }
        let config: Self = toml::from_str(&fs::read_to_string(&path)?)?;
        stlog_debug!(
            "Config loaded: max_parallel={:?}, task_timeout_secs={:?}, fail_fast={}, session_dir={:?}",
            config.max_parallel,
            config.task_timeout_secs,
            config.fail_fast,
            config.session_dir
        );
        Ok(config)
    }

    pub fn save(&self) -> Result<()> {
        let strata_dir = Self::strata_dir()?;
        stlog_debug!("Config::save strata_dir={}", strata_dir.display());
        if !strata_dir.exists() {
            fs::create_dir_all(&strata_dir)?;
        }
        let path = Self::config_path()?;
        fs::write(&path, toml::to_string_pretty(self)?)?;
        stlog_debug!("Config saved to {}", path.display());
        Ok(())
    }
}

fn expand_tilde(path: &str) -> PathBuf {
    if let Some(rest) = path.strip_prefix("~/") {
        if let Some(home) = dirs::home_dir() {
            return home.join(rest);
        }
    }
    PathBuf::from(path)
}
