use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::app_dirs::AppDirs;
use crate::error::ConfigError;
use crate::language::Language;
use crate::session::SessionConfig;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct Config {
    pub language: Language,
    pub duration_secs: u64,
    pub words_per_line: usize,
    pub visible_lines: usize,
    pub low_water_mark: usize,
    pub fan_out: usize,
    pub tick_ms: u64,
    /// Base URL of a remote text endpoint; the bundled corpus when unset.
    pub text_endpoint: Option<String>,
    /// Base URL of a remote result endpoint; the local store when unset.
    pub results_endpoint: Option<String>,
    pub user_id: Option<String>,
    pub store_results: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            language: Language::Fr,
            duration_secs: 60,
            words_per_line: 6,
            visible_lines: 3,
            low_water_mark: 10,
            fan_out: 3,
            tick_ms: crate::TICK_RATE_MS,
            text_endpoint: None,
            results_endpoint: None,
            user_id: None,
            store_results: true,
        }
    }
}

impl Config {
    pub fn session_config(&self) -> SessionConfig {
        SessionConfig {
            language: self.language,
            duration: Duration::from_secs(self.duration_secs.max(1)),
            words_per_line: self.words_per_line.max(1),
            visible_lines: self.visible_lines.max(1),
            low_water_mark: self.low_water_mark,
            fan_out: self.fan_out.max(1),
            user_id: self.user_id.clone().filter(|id| !id.trim().is_empty()),
        }
    }

    pub fn tick_interval(&self) -> Duration {
        Duration::from_millis(self.tick_ms.max(10))
    }
}

pub trait ConfigStore {
    fn load(&self) -> Config;
    fn save(&self, cfg: &Config) -> Result<(), ConfigError>;
}

#[derive(Debug, Clone)]
pub struct FileConfigStore {
    path: PathBuf,
}

impl FileConfigStore {
    pub fn new() -> Self {
        Self {
            path: AppDirs::config_path(),
        }
    }

    pub fn with_path<P: AsRef<Path>>(p: P) -> Self {
        Self {
            path: p.as_ref().to_path_buf(),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Default for FileConfigStore {
    fn default() -> Self {
        Self::new()
    }
}

impl ConfigStore for FileConfigStore {
    fn load(&self) -> Config {
        let Ok(bytes) = fs::read(&self.path) else {
            return Config::default();
        };
        match serde_json::from_slice::<Config>(&bytes) {
            Ok(cfg) => cfg,
            Err(err) => {
                tracing::warn!(path = %self.path.display(), error = %err, "unreadable config, using defaults");
                Config::default()
            }
        }
    }

    fn save(&self, cfg: &Config) -> Result<(), ConfigError> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)?;
        }
        let data = serde_json::to_vec_pretty(cfg)?;
        fs::write(&self.path, data)?;
        Ok(())
    }
}
