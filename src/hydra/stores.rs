//! Typed stores for the app's screens.
//!
//! Each store is a data store bound to one resource plus a couple of
//! convenience accessors. Caching, staleness and refresh coordination all
//! live in [`DataStore`].

use chrono::NaiveDate;

use crate::cache::{Cached, DataStore, RefreshOutcome, StoreEvent, SubscriptionId};
use crate::error::StoreError;
use crate::preferences::Preferences;

use super::resources::{Associations, RestoMenus, SchamperArticles};
use super::types::{Association, RestoMenu, SchamperArticle};

#[derive(Clone)]
pub struct AssociationStore {
  store: DataStore<Associations>,
}

impl AssociationStore {
  pub fn new(store: DataStore<Associations>) -> Self {
    Self { store }
  }

  pub fn associations(&self) -> Option<Cached<Vec<Association>>> {
    self.store.get_value(&self.store.key(None))
  }

  /// Associations the user follows, or all of them when filtering is off.
  pub fn preferred(&self, preferences: &Preferences) -> Option<Cached<Vec<Association>>> {
    let cached = self.associations()?;
    Some(cached.map(|all| Self::filter_preferred(all, preferences)))
  }

  pub fn filter_preferred(all: Vec<Association>, preferences: &Preferences) -> Vec<Association> {
    if !preferences.filter_associations {
      return all;
    }
    all
      .into_iter()
      .filter(|a| {
        preferences
          .preferred_associations
          .contains(&a.internal_name.to_lowercase())
      })
      .collect()
  }

  pub async fn refresh(&self) -> Result<Cached<Vec<Association>>, StoreError> {
    self.store.refresh_value(&self.store.key(None)).await
  }

  pub fn subscribe(&self, callback: impl Fn(&StoreEvent) + Send + Sync + 'static) -> SubscriptionId {
    self.store.subscribe(&self.store.key(None), callback)
  }

  pub fn data_store(&self) -> &DataStore<Associations> {
    &self.store
  }
}

#[derive(Clone)]
pub struct RestoStore {
  store: DataStore<RestoMenus>,
}

impl RestoStore {
  pub fn new(store: DataStore<RestoMenus>) -> Self {
    Self { store }
  }

  pub fn menu(&self, date: NaiveDate) -> Option<Cached<RestoMenu>> {
    self.store.get_value(&RestoMenus::key(date))
  }

  pub async fn refresh_menu(&self, date: NaiveDate) -> Result<Cached<RestoMenu>, StoreError> {
    self.store.refresh_value(&RestoMenus::key(date)).await
  }

  /// Cached menu if there is one, otherwise wait for the first fetch.
  pub async fn menu_or_fetch(&self, date: NaiveDate) -> Result<Cached<RestoMenu>, StoreError> {
    match self.menu(date) {
      Some(menu) => Ok(menu),
      None => self.refresh_menu(date).await,
    }
  }

  pub fn subscribe(
    &self,
    date: NaiveDate,
    callback: impl Fn(&StoreEvent) + Send + Sync + 'static,
  ) -> SubscriptionId {
    self.store.subscribe(&RestoMenus::key(date), callback)
  }

  pub fn data_store(&self) -> &DataStore<RestoMenus> {
    &self.store
  }
}

#[derive(Clone)]
pub struct SchamperStore {
  store: DataStore<SchamperArticles>,
}

impl SchamperStore {
  pub fn new(store: DataStore<SchamperArticles>) -> Self {
    Self { store }
  }

  /// Articles, newest first.
  pub fn articles(&self) -> Option<Cached<Vec<SchamperArticle>>> {
    self
      .store
      .get_value(&self.store.key(None))
      .map(|cached| cached.map(newest_first))
  }

  /// Look up a single cached article by its link.
  pub fn article(&self, link: &str) -> Option<SchamperArticle> {
    self
      .articles()?
      .data
      .into_iter()
      .find(|article| article.link == link)
  }

  pub async fn refresh(&self) -> Result<Cached<Vec<SchamperArticle>>, StoreError> {
    let cached = self.store.refresh_value(&self.store.key(None)).await?;
    Ok(cached.map(newest_first))
  }

  pub async fn force_refresh(&self) -> RefreshOutcome {
    self.store.force_refresh(&self.store.key(None)).await
  }

  pub fn subscribe(&self, callback: impl Fn(&StoreEvent) + Send + Sync + 'static) -> SubscriptionId {
    self.store.subscribe(&self.store.key(None), callback)
  }

  pub fn data_store(&self) -> &DataStore<SchamperArticles> {
    &self.store
  }
}

fn newest_first(mut articles: Vec<SchamperArticle>) -> Vec<SchamperArticle> {
  articles.sort_by(|a, b| b.pub_date.cmp(&a.pub_date));
  articles
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::cache::{CacheStorage, MemoryStorage, RefreshSettings};
  use crate::testing::{content, ScriptedFetcher};
  use std::collections::BTreeSet;
  use std::sync::Arc;
  use std::time::Duration;
  use tokio::runtime::Handle;

  const ASSOCIATIONS: &str = r#"[
    {"internal_name": "zeus", "display_name": "Zeus WPI", "parent_association": "wvk"},
    {"internal_name": "vtk", "display_name": "VTK", "full_name": "Vlaamse Technische Kring"}
  ]"#;

  const ARTICLES: &str = r#"[
    {"title": "Oud", "link": "https://schamper.ugent.be/a/1", "pub_date": "2024-04-01T10:00:00Z", "body": ""},
    {"title": "Nieuw", "link": "https://schamper.ugent.be/a/2", "pub_date": "2024-05-01T10:00:00Z", "body": ""}
  ]"#;

  fn storage() -> Arc<dyn CacheStorage> {
    Arc::new(MemoryStorage::new())
  }

  fn settings() -> RefreshSettings {
    RefreshSettings {
      retry_delay: Duration::from_millis(1),
      ..RefreshSettings::default()
    }
  }

  #[tokio::test]
  async fn test_association_filtering() {
    let fetcher = Arc::new(ScriptedFetcher::new(vec![content(ASSOCIATIONS, "v1")]));
    let store = AssociationStore::new(
      DataStore::builder(Associations, storage(), fetcher.clone())
        .settings(settings())
        .build(Handle::current()),
    );

    assert!(store.associations().is_none());
    let all = store.refresh().await.unwrap();
    assert_eq!(all.data.len(), 2);
    assert_eq!(fetcher.resource_ids(), vec!["association/associations.json"]);

    let mut prefs = Preferences::default();
    assert_eq!(store.preferred(&prefs).unwrap().data.len(), 2);

    prefs.filter_associations = true;
    prefs.preferred_associations = BTreeSet::from(["zeus".to_string()]);
    let preferred = store.preferred(&prefs).unwrap();
    assert_eq!(preferred.data.len(), 1);
    assert_eq!(preferred.data[0].display_name, "Zeus WPI");
  }

  #[tokio::test]
  async fn test_resto_menu_for_day() {
    let fetcher = Arc::new(ScriptedFetcher::new(vec![content(
      r#"{"date": "2024-05-01", "open": true, "meals": [], "vegetables": ["Erwten"]}"#,
      "\"abc\"",
    )]));
    let store = RestoStore::new(
      DataStore::builder(RestoMenus::new("en"), storage(), fetcher.clone())
        .settings(settings())
        .build(Handle::current()),
    );
    let day = NaiveDate::from_ymd_opt(2024, 5, 1).unwrap();

    let menu = store.menu_or_fetch(day).await.unwrap();
    assert_eq!(menu.data.vegetables, vec!["Erwten"]);
    assert_eq!(fetcher.resource_ids(), vec!["resto/menu/en/2024/5/1.json"]);

    // Served from cache the second time
    let again = store.menu_or_fetch(day).await.unwrap();
    assert_eq!(again.data, menu.data);
    assert_eq!(fetcher.calls(), 1);
  }

  #[tokio::test]
  async fn test_resto_refresh_failure_is_reported() {
    let fetcher = Arc::new(ScriptedFetcher::new(vec![
      Err(StoreError::Network("offline".to_string())),
      Err(StoreError::Network("offline".to_string())),
    ]));
    let store = RestoStore::new(
      DataStore::builder(RestoMenus::new("nl"), storage(), fetcher)
        .settings(settings())
        .build(Handle::current()),
    );
    let day = NaiveDate::from_ymd_opt(2024, 5, 2).unwrap();

    let err = store.refresh_menu(day).await.unwrap_err();
    assert_eq!(err, StoreError::Network("offline".to_string()));
    assert!(store.menu(day).is_none());
  }

  #[tokio::test]
  async fn test_schamper_articles_sorted() {
    let fetcher = Arc::new(ScriptedFetcher::new(vec![content(ARTICLES, "v1")]));
    let store = SchamperStore::new(
      DataStore::builder(SchamperArticles, storage(), fetcher)
        .settings(settings())
        .build(Handle::current()),
    );

    let refreshed = store.refresh().await.unwrap();
    let titles: Vec<_> = refreshed.data.iter().map(|a| a.title.as_str()).collect();
    assert_eq!(titles, vec!["Nieuw", "Oud"]);

    let cached = store.articles().unwrap();
    assert_eq!(cached.data[0].title, "Nieuw");
    assert_eq!(
      store.article("https://schamper.ugent.be/a/1").unwrap().title,
      "Oud"
    );
    assert!(store.article("https://example.org").is_none());
  }
}
