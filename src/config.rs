use anyhow::Context;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::ingest::stability::{StabilityPolicy, DIR_AGE_THRESHOLD, RECENT_ACTIVITY_THRESHOLD};
use crate::state::library::Library;
use crate::sync::gate::DEFAULT_COOLDOWN;

/// Config file looked up in the working directory when none is given
pub const DEFAULT_CONFIG_FILE: &str = "pass-catalog.toml";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Directory the decoder writes pass directories into
    #[serde(default = "default_ingest_root")]
    pub ingest_root: PathBuf,

    /// SQLite catalog file, defaults to the platform data directory
    #[serde(default)]
    pub database: Option<PathBuf>,

    #[serde(default)]
    pub stability: StabilityConfig,

    #[serde(default)]
    pub watch: WatchConfig,

    #[serde(default)]
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StabilityConfig {
    /// A pass directory older than this is ingested without looking inside
    #[serde(default = "default_dir_age_secs")]
    pub dir_age_secs: u64,

    /// Any entry younger than this defers the pass
    #[serde(default = "default_recent_activity_secs")]
    pub recent_activity_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WatchConfig {
    /// Seconds between update runs in watch mode
    #[serde(default = "default_interval_secs")]
    pub interval_secs: u64,

    /// Minimum seconds between two successful updates
    #[serde(default = "default_cooldown_secs")]
    pub cooldown_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Write daily log files here in addition to stdout
    #[serde(default)]
    pub directory: Option<PathBuf>,
}

fn default_ingest_root() -> PathBuf {
    PathBuf::from("live_output")
}

fn default_dir_age_secs() -> u64 {
    DIR_AGE_THRESHOLD.as_secs()
}

fn default_recent_activity_secs() -> u64 {
    RECENT_ACTIVITY_THRESHOLD.as_secs()
}

fn default_interval_secs() -> u64 {
    300
}

fn default_cooldown_secs() -> u64 {
    DEFAULT_COOLDOWN.as_secs()
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for Config {
    fn default() -> Self {
        Self {
            ingest_root: default_ingest_root(),
            database: None,
            stability: StabilityConfig::default(),
            watch: WatchConfig::default(),
            logging: LoggingConfig::default(),
        }
    }
}

impl Default for StabilityConfig {
    fn default() -> Self {
        Self {
            dir_age_secs: default_dir_age_secs(),
            recent_activity_secs: default_recent_activity_secs(),
        }
    }
}

impl Default for WatchConfig {
    fn default() -> Self {
        Self {
            interval_secs: default_interval_secs(),
            cooldown_secs: default_cooldown_secs(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            directory: None,
        }
    }
}

impl Config {
    /// Load configuration from a TOML file
    pub fn load(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let path = path.as_ref();
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file '{}'", path.display()))?;

        Self::from_toml(&content)
            .with_context(|| format!("Failed to parse config file '{}'", path.display()))
    }

    pub fn from_toml(content: &str) -> anyhow::Result<Self> {
        Ok(toml::from_str(content)?)
    }

    /// Load `path` if given, else the default file if present, else defaults
    pub fn load_or_default(path: Option<&Path>) -> anyhow::Result<Self> {
        match path {
            Some(path) => Self::load(path),
            None if Path::new(DEFAULT_CONFIG_FILE).is_file() => Self::load(DEFAULT_CONFIG_FILE),
            None => Ok(Self::default()),
        }
    }

    /// Catalog file to open
    pub fn database_path(&self) -> anyhow::Result<PathBuf> {
        self.database
            .clone()
            .or_else(Library::default_db_path)
            .context("Could not determine a catalog location, set `database` in the config")
    }

    pub fn stability_policy(&self) -> StabilityPolicy {
        StabilityPolicy {
            dir_age: Duration::from_secs(self.stability.dir_age_secs),
            recent_activity: Duration::from_secs(self.stability.recent_activity_secs),
        }
    }

    pub fn watch_interval(&self) -> Duration {
        Duration::from_secs(self.watch.interval_secs.max(1))
    }

    pub fn update_cooldown(&self) -> Duration {
        Duration::from_secs(self.watch.cooldown_secs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_config_uses_defaults() {
        let config = Config::from_toml("").unwrap();
        assert_eq!(config.ingest_root, PathBuf::from("live_output"));
        assert_eq!(config.stability_policy(), StabilityPolicy::default());
        assert_eq!(config.update_cooldown(), Duration::from_secs(60));
        assert_eq!(config.logging.level, "info");
    }

    #[test]
    fn test_partial_sections() {
        let config = Config::from_toml(
            r#"
            ingest_root = "/srv/satdump/live_output"
            database = "/var/lib/passes.db"

            [stability]
            recent_activity_secs = 120

            [watch]
            interval_secs = 0
            "#,
        )
        .unwrap();

        assert_eq!(config.database_path().unwrap(), PathBuf::from("/var/lib/passes.db"));
        assert_eq!(config.stability.dir_age_secs, 900);
        assert_eq!(config.stability_policy().recent_activity, Duration::from_secs(120));
        assert_eq!(config.watch_interval(), Duration::from_secs(1));
        assert_eq!(config.watch.cooldown_secs, 60);
    }

    #[test]
    fn test_bad_config_is_rejected() {
        assert!(Config::from_toml("ingest_root = 5").is_err());
    }
}
