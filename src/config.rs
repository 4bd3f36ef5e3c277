use chrono::Duration;
use color_eyre::{eyre::eyre, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};

use crate::cache::{max_age_from_minutes, StalenessPolicy};

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
  #[serde(default)]
  pub api: ApiConfig,
  #[serde(default)]
  pub refresh: RefreshConfig,
  #[serde(default)]
  pub cache: CacheConfig,
  /// Where user preferences are stored (defaults to the config directory)
  pub preferences_path: Option<PathBuf>,
  /// Directory for rolling log files; logs only go to stderr when unset
  pub log_dir: Option<PathBuf>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ApiConfig {
  pub base_url: String,
  pub timeout_secs: u64,
  /// Menu language: "nl" or "en"
  pub language: String,
}

impl Default for ApiConfig {
  fn default() -> Self {
    Self {
      base_url: "https://hydra.ugent.be/api/2.0/".to_string(),
      timeout_secs: 10,
      language: "nl".to_string(),
    }
  }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct RefreshConfig {
  pub association_max_age_mins: i64,
  pub resto_max_age_mins: i64,
  pub schamper_max_age_mins: i64,
  /// Delay before the single retry of a failed fetch
  pub retry_delay_ms: u64,
}

impl Default for RefreshConfig {
  fn default() -> Self {
    Self {
      association_max_age_mins: 24 * 60,
      resto_max_age_mins: 24 * 60,
      schamper_max_age_mins: 60,
      retry_delay_ms: 500,
    }
  }
}

impl RefreshConfig {
  /// Fails unless every max age is a positive, representable number of
  /// minutes.
  pub fn policy(&self) -> Result<StalenessPolicy> {
    Ok(StalenessPolicy::new(
      max_age("association_max_age_mins", self.association_max_age_mins)?,
      max_age("resto_max_age_mins", self.resto_max_age_mins)?,
      max_age("schamper_max_age_mins", self.schamper_max_age_mins)?,
    ))
  }
}

fn max_age(name: &str, mins: i64) -> Result<Duration> {
  max_age_from_minutes(mins)
    .ok_or_else(|| eyre!("refresh.{} must be a positive number of minutes, got {}", name, mins))
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
  /// Keep the cache on disk; an in-memory cache is used otherwise
  pub persistent: bool,
  pub path: Option<PathBuf>,
}

impl Default for CacheConfig {
  fn default() -> Self {
    Self {
      persistent: true,
      path: None,
    }
  }
}

impl Config {
  /// Load configuration from file.
  ///
  /// Search order:
  /// 1. Explicit path if provided
  /// 2. ./hydra.yaml (current directory)
  /// 3. $XDG_CONFIG_HOME/hydra/config.yaml
  ///
  /// Falls back to defaults when no file is found. `HYDRA_API_URL`
  /// overrides the API base URL.
  pub fn load(explicit_path: Option<&Path>) -> Result<Self> {
    let path = if let Some(p) = explicit_path {
      if p.exists() {
        Some(p.to_path_buf())
      } else {
        return Err(eyre!("Config file not found: {}", p.display()));
      }
    } else {
      Self::find_config_file()
    };

    let config = match path {
      Some(p) => Self::load_from_path(&p)?,
      None => Config::default(),
    };

    Ok(config.with_env_overrides())
  }

  fn find_config_file() -> Option<PathBuf> {
    // Check current directory
    let local = PathBuf::from("hydra.yaml");
    if local.exists() {
      return Some(local);
    }

    // Check XDG config directory
    if let Some(config_dir) = dirs::config_dir() {
      let xdg_path = config_dir.join("hydra").join("config.yaml");
      if xdg_path.exists() {
        return Some(xdg_path);
      }
    }

    None
  }

  fn load_from_path(path: &Path) -> Result<Self> {
    let contents = std::fs::read_to_string(path)
      .map_err(|e| eyre!("Failed to read config file {}: {}", path.display(), e))?;

    let config = Self::parse(&contents)
      .map_err(|e| eyre!("Failed to parse config file {}: {}", path.display(), e))?;
    config
      .validate()
      .map_err(|e| eyre!("Invalid config file {}: {}", path.display(), e))?;
    Ok(config)
  }

  fn validate(&self) -> Result<()> {
    if self.api.timeout_secs == 0 {
      return Err(eyre!("api.timeout_secs must be at least 1"));
    }
    self.refresh.policy()?;
    Ok(())
  }

  fn parse(contents: &str) -> Result<Self, serde_yaml::Error> {
    // An empty file deserializes to null
    if contents.trim().is_empty() {
      return Ok(Config::default());
    }
    serde_yaml::from_str(contents)
  }

  fn with_env_overrides(mut self) -> Self {
    if let Ok(url) = std::env::var("HYDRA_API_URL") {
      if !url.trim().is_empty() {
        self.api.base_url = url;
      }
    }
    self
  }

  /// Location of the SQLite cache database.
  pub fn cache_path(&self) -> Result<PathBuf> {
    self
      .cache
      .path
      .clone()
      .or_else(crate::cache::SqliteStorage::default_path)
      .ok_or_else(|| eyre!("Could not determine data directory"))
  }

  /// Location of the preferences file.
  pub fn preferences_path(&self) -> Result<PathBuf> {
    self
      .preferences_path
      .clone()
      .or_else(|| dirs::config_dir().map(|dir| dir.join("hydra").join("preferences.yaml")))
      .ok_or_else(|| eyre!("Could not determine config directory"))
  }

  pub fn retry_delay(&self) -> std::time::Duration {
    std::time::Duration::from_millis(self.refresh.retry_delay_ms)
  }

  pub fn fetch_timeout(&self) -> std::time::Duration {
    std::time::Duration::from_secs(self.api.timeout_secs)
  }
}
