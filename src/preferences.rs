//! User preferences.
//!
//! The data store only reads preferences through [`PreferenceSource`]; the
//! [`PreferencesService`] owns the values and persists them as YAML.

use chrono::Duration;
use color_eyre::{eyre::eyre, Result};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};
use std::sync::RwLock;
use tracing::{debug, warn};

use crate::cache::{max_age_from_minutes, ResourceKind};

/// Read-only view of the preferences that affect refreshing.
pub trait PreferenceSource: Send + Sync {
  /// Whether stale content may be refreshed in the background.
  fn refresh_enabled(&self) -> bool;

  /// User override of the maximum age for a kind.
  fn max_age_override(&self, kind: ResourceKind) -> Option<Duration>;
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Preferences {
  pub show_resto_in_feed: bool,
  pub show_schamper_in_feed: bool,
  /// Only show content of `preferred_associations`
  pub filter_associations: bool,
  /// Internal names of the associations the user follows
  pub preferred_associations: BTreeSet<String>,
  /// Disable on metered connections
  pub refresh_enabled: bool,
  /// Maximum age in minutes, per kind
  pub max_age_overrides: BTreeMap<ResourceKind, i64>,
}

impl Default for Preferences {
  fn default() -> Self {
    Self {
      show_resto_in_feed: true,
      show_schamper_in_feed: true,
      filter_associations: false,
      preferred_associations: BTreeSet::new(),
      refresh_enabled: true,
      max_age_overrides: BTreeMap::new(),
    }
  }
}

impl Preferences {
  /// Flat name/value listing, used for display.
  pub fn entries(&self) -> Vec<(String, String)> {
    let mut entries = vec![
      (
        "show_resto_in_feed".to_string(),
        self.show_resto_in_feed.to_string(),
      ),
      (
        "show_schamper_in_feed".to_string(),
        self.show_schamper_in_feed.to_string(),
      ),
      (
        "filter_associations".to_string(),
        self.filter_associations.to_string(),
      ),
      (
        "preferred_associations".to_string(),
        self
          .preferred_associations
          .iter()
          .cloned()
          .collect::<Vec<_>>()
          .join(","),
      ),
      (
        "refresh_enabled".to_string(),
        self.refresh_enabled.to_string(),
      ),
    ];

    for kind in ResourceKind::ALL {
      let value = self
        .max_age_overrides
        .get(&kind)
        .map(|mins| mins.to_string())
        .unwrap_or_default();
      entries.push((format!("max_age.{}", kind), value));
    }

    entries
  }

  /// Drop max-age overrides that are not a usable number of minutes, e.g.
  /// from a hand-edited file.
  fn without_invalid_overrides(mut self) -> Self {
    self.max_age_overrides.retain(|kind, mins| {
      let valid = max_age_from_minutes(*mins).is_some();
      if !valid {
        warn!(%kind, mins = *mins, "ignoring invalid max age override");
      }
      valid
    });
    self
  }

  /// Set a preference by the name shown in [`Preferences::entries`].
  ///
  /// An empty value for `max_age.<kind>` removes the override.
  pub fn set(&mut self, name: &str, value: &str) -> Result<()> {
    match name {
      "show_resto_in_feed" => self.show_resto_in_feed = parse_bool(name, value)?,
      "show_schamper_in_feed" => self.show_schamper_in_feed = parse_bool(name, value)?,
      "filter_associations" => self.filter_associations = parse_bool(name, value)?,
      "refresh_enabled" => self.refresh_enabled = parse_bool(name, value)?,
      "preferred_associations" => {
        self.preferred_associations = value
          .split(',')
          .map(|s| s.trim().to_lowercase())
          .filter(|s| !s.is_empty())
          .collect();
      }
      _ => {
        let kind = name
          .strip_prefix("max_age.")
          .ok_or_else(|| eyre!("Unknown preference: {}", name))?
          .parse::<ResourceKind>()
          .map_err(|e| eyre!(e))?;

        if value.trim().is_empty() {
          self.max_age_overrides.remove(&kind);
        } else {
          let mins: i64 = value
            .trim()
            .parse()
            .map_err(|_| eyre!("{} expects a number of minutes, got '{}'", name, value))?;
          if max_age_from_minutes(mins).is_none() {
            return Err(eyre!("{} must be a positive number of minutes, got {}", name, mins));
          }
          self.max_age_overrides.insert(kind, mins);
        }
      }
    }
    Ok(())
  }
}

fn parse_bool(name: &str, value: &str) -> Result<bool> {
  match value.trim().to_lowercase().as_str() {
    "true" | "yes" | "on" | "1" => Ok(true),
    "false" | "no" | "off" | "0" => Ok(false),
    _ => Err(eyre!("{} expects true or false, got '{}'", name, value)),
  }
}

/// Owns the user's preferences, optionally backed by a file.
#[derive(Debug)]
pub struct PreferencesService {
  path: Option<PathBuf>,
  values: RwLock<Preferences>,
}

impl PreferencesService {
  /// Preferences that are never written to disk.
  pub fn in_memory(values: Preferences) -> Self {
    Self {
      path: None,
      values: RwLock::new(values),
    }
  }

  /// Load preferences from `path`, using defaults when the file is absent.
  pub fn load(path: &Path) -> Result<Self> {
    let values = if path.exists() {
      let contents = std::fs::read_to_string(path)
        .map_err(|e| eyre!("Failed to read preferences {}: {}", path.display(), e))?;
      if contents.trim().is_empty() {
        Preferences::default()
      } else {
        serde_yaml::from_str(&contents)
          .map_err(|e| eyre!("Failed to parse preferences {}: {}", path.display(), e))?
      }
    } else {
      Preferences::default()
    };

    Ok(Self {
      path: Some(path.to_path_buf()),
      values: RwLock::new(values.without_invalid_overrides()),
    })
  }

  /// Copy of the current values.
  pub fn snapshot(&self) -> Preferences {
    self.values.read().unwrap_or_else(|e| e.into_inner()).clone()
  }

  /// Apply a change and persist it. Values are left untouched when the
  /// change or the write fails.
  pub fn update(&self, change: impl FnOnce(&mut Preferences) -> Result<()>) -> Result<()> {
    let mut values = self.values.write().unwrap_or_else(|e| e.into_inner());
    let mut updated = values.clone();
    change(&mut updated)?;
    self.persist(&updated)?;
    *values = updated;
    Ok(())
  }

  pub fn set(&self, name: &str, value: &str) -> Result<()> {
    self.update(|prefs| prefs.set(name, value))?;
    debug!(name, value, "preference updated");
    Ok(())
  }

  /// Write to a temporary file and rename it over the old one.
  fn persist(&self, values: &Preferences) -> Result<()> {
    let Some(path) = &self.path else {
      return Ok(());
    };

    if let Some(parent) = path.parent() {
      std::fs::create_dir_all(parent)
        .map_err(|e| eyre!("Failed to create preferences directory: {}", e))?;
    }

    let contents =
      serde_yaml::to_string(values).map_err(|e| eyre!("Failed to serialize preferences: {}", e))?;
    let tmp = path.with_extension("yaml.tmp");
    std::fs::write(&tmp, contents)
      .map_err(|e| eyre!("Failed to write preferences {}: {}", tmp.display(), e))?;
    std::fs::rename(&tmp, path)
      .map_err(|e| eyre!("Failed to replace preferences {}: {}", path.display(), e))?;

    Ok(())
  }
}

impl Default for PreferencesService {
  fn default() -> Self {
    Self::in_memory(Preferences::default())
  }
}

impl PreferenceSource for PreferencesService {
  fn refresh_enabled(&self) -> bool {
    self
      .values
      .read()
      .unwrap_or_else(|e| e.into_inner())
      .refresh_enabled
  }

  fn max_age_override(&self, kind: ResourceKind) -> Option<Duration> {
    self
      .values
      .read()
      .unwrap_or_else(|e| e.into_inner())
      .max_age_overrides
      .get(&kind)
      .and_then(|mins| max_age_from_minutes(*mins))
  }
}
