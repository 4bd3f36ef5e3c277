//! Wiring of the app's services.
//!
//! Everything is constructed once here and passed down explicitly; there are
//! no global store instances.

use color_eyre::{eyre::eyre, Result};
use std::sync::Arc;
use tokio::runtime::Handle;
use tracing::info;

use crate::cache::{
  CacheStorage, DataStore, MemoryStorage, RefreshSettings, SqliteStorage, StalenessPolicy,
};
use crate::clock::{Clock, SystemClock};
use crate::config::Config;
use crate::fetch::{HttpFetcher, RemoteFetcher};
use crate::hydra::{
  AssociationStore, Associations, RestoMenus, RestoStore, SchamperArticles, SchamperStore,
};
use crate::preferences::PreferencesService;

/// Main application state
pub struct App {
  pub associations: AssociationStore,
  pub resto: RestoStore,
  pub schamper: SchamperStore,
  preferences: Arc<PreferencesService>,
  storage: Arc<dyn CacheStorage>,
  clock: Arc<dyn Clock>,
}

/// Collaborators the stores are built from.
pub struct AppParts {
  pub storage: Arc<dyn CacheStorage>,
  pub fetcher: Arc<dyn RemoteFetcher>,
  pub preferences: Arc<PreferencesService>,
  pub clock: Arc<dyn Clock>,
  pub policy: StalenessPolicy,
  pub settings: RefreshSettings,
  pub language: String,
}

impl App {
  /// Build the app from configuration: SQLite (or in-memory) cache, HTTP
  /// fetcher, file-backed preferences and the wall clock.
  pub fn new(config: &Config, runtime: Handle) -> Result<Self> {
    let storage: Arc<dyn CacheStorage> = if config.cache.persistent {
      let path = config.cache_path()?;
      info!(path = %path.display(), "opening cache");
      Arc::new(SqliteStorage::open(&path).map_err(|e| eyre!(e))?)
    } else {
      Arc::new(MemoryStorage::new())
    };

    let preferences = Arc::new(PreferencesService::load(&config.preferences_path()?)?);

    let parts = AppParts {
      storage,
      fetcher: Arc::new(HttpFetcher::new(&config.api)?),
      preferences,
      clock: Arc::new(SystemClock),
      policy: config.refresh.policy()?,
      settings: RefreshSettings {
        timeout: config.fetch_timeout(),
        retry_delay: config.retry_delay(),
        ..RefreshSettings::default()
      },
      language: config.api.language.clone(),
    };

    Ok(Self::from_parts(parts, runtime))
  }

  pub fn from_parts(parts: AppParts, runtime: Handle) -> Self {
    let AppParts {
      storage,
      fetcher,
      preferences,
      clock,
      policy,
      settings,
      language,
    } = parts;

    let associations = DataStore::builder(Associations, Arc::clone(&storage), Arc::clone(&fetcher))
      .clock(Arc::clone(&clock))
      .preferences(preferences.clone())
      .policy(policy)
      .settings(settings)
      .build(runtime.clone());

    let resto = DataStore::builder(
      RestoMenus::new(language),
      Arc::clone(&storage),
      Arc::clone(&fetcher),
    )
    .clock(Arc::clone(&clock))
    .preferences(preferences.clone())
    .policy(policy)
    .settings(settings)
    .build(runtime.clone());

    let schamper = DataStore::builder(SchamperArticles, Arc::clone(&storage), fetcher)
      .clock(Arc::clone(&clock))
      .preferences(preferences.clone())
      .policy(policy)
      .settings(settings)
      .build(runtime);

    Self {
      associations: AssociationStore::new(associations),
      resto: RestoStore::new(resto),
      schamper: SchamperStore::new(schamper),
      preferences,
      storage,
      clock,
    }
  }

  pub fn preferences(&self) -> &PreferencesService {
    &self.preferences
  }

  pub fn clock(&self) -> &dyn Clock {
    self.clock.as_ref()
  }

  /// Remove every cached record, e.g. on logout.
  pub fn clear_cache(&self) -> Result<()> {
    info!("clearing cache");
    self.storage.clear().map_err(|e| eyre!(e))
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::cache::ResourceKind;
  use crate::clock::ManualClock;
  use crate::testing::{content, ScriptedFetcher};
  use chrono::{NaiveDate, TimeZone, Utc};

  #[tokio::test]
  async fn test_stores_share_storage_but_not_keys() {
    let fetcher = Arc::new(ScriptedFetcher::new(vec![
      content(r#"{"date": "2024-05-01", "open": true}"#, "v1"),
      content("[]", "v1"),
    ]));
    let storage: Arc<dyn CacheStorage> = Arc::new(MemoryStorage::new());
    let app = App::from_parts(
      AppParts {
        storage: Arc::clone(&storage),
        fetcher: fetcher.clone(),
        preferences: Arc::new(PreferencesService::default()),
        clock: Arc::new(ManualClock::new(
          Utc.with_ymd_and_hms(2024, 5, 1, 9, 0, 0).unwrap(),
        )),
        policy: StalenessPolicy::default(),
        settings: RefreshSettings::default(),
        language: "nl".to_string(),
      },
      Handle::current(),
    );

    let day = NaiveDate::from_ymd_opt(2024, 5, 1).unwrap();
    app.resto.refresh_menu(day).await.unwrap();
    app.schamper.refresh().await.unwrap();

    assert_eq!(
      fetcher.resource_ids(),
      vec!["resto/menu/nl/2024/5/1.json", "schamper/daily.json"]
    );
    assert_eq!(storage.keys(ResourceKind::RestoMenu).unwrap().len(), 1);
    assert_eq!(storage.keys(ResourceKind::SchamperArticle).unwrap().len(), 1);

    app.clear_cache().unwrap();
    assert!(storage.keys(ResourceKind::RestoMenu).unwrap().is_empty());
    assert!(storage
      .keys(ResourceKind::SchamperArticle)
      .unwrap()
      .is_empty());
  }
}
