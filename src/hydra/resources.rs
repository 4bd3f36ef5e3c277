//! Resource bindings for Hydra API content.

use chrono::{Datelike, NaiveDate};

use crate::cache::{Resource, ResourceKey, ResourceKind};

use super::types::{Association, RestoMenu, SchamperArticle};

/// Format of the sub-id of resto menu keys.
pub const MENU_DATE_FORMAT: &str = "%Y-%m-%d";

/// The list of student associations.
#[derive(Debug, Clone, Default)]
pub struct Associations;

impl Resource for Associations {
  type Payload = Vec<Association>;

  const KIND: ResourceKind = ResourceKind::Association;

  fn resource_id(&self, _key: &ResourceKey) -> String {
    "association/associations.json".to_string()
  }
}

/// Daily resto menus in one language. Keys carry the date as sub-id.
#[derive(Debug, Clone)]
pub struct RestoMenus {
  language: String,
}

impl RestoMenus {
  pub fn new(language: impl Into<String>) -> Self {
    Self {
      language: language.into(),
    }
  }

  pub fn key(date: NaiveDate) -> ResourceKey {
    ResourceKey::with_id(ResourceKind::RestoMenu, date.format(MENU_DATE_FORMAT).to_string())
  }
}

impl Resource for RestoMenus {
  type Payload = RestoMenu;

  const KIND: ResourceKind = ResourceKind::RestoMenu;

  fn resource_id(&self, key: &ResourceKey) -> String {
    let sub_id = key.sub_id().unwrap_or_default();
    match NaiveDate::parse_from_str(sub_id, MENU_DATE_FORMAT) {
      // The API does not zero-pad month and day
      Ok(date) => format!(
        "resto/menu/{}/{}/{}/{}.json",
        self.language,
        date.year(),
        date.month(),
        date.day()
      ),
      Err(_) => format!("resto/menu/{}/{}.json", self.language, sub_id),
    }
  }
}

/// The Schamper daily article feed.
#[derive(Debug, Clone, Default)]
pub struct SchamperArticles;

impl Resource for SchamperArticles {
  type Payload = Vec<SchamperArticle>;

  const KIND: ResourceKind = ResourceKind::SchamperArticle;

  fn resource_id(&self, _key: &ResourceKey) -> String {
    "schamper/daily.json".to_string()
  }
}
