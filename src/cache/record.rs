//! Keys and records stored in the cache.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Category of cached content.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ResourceKind {
  /// Student association list
  Association,
  /// Daily restaurant menu
  RestoMenu,
  /// Schamper news articles
  SchamperArticle,
}

impl ResourceKind {
  pub const ALL: [ResourceKind; 3] = [
    ResourceKind::Association,
    ResourceKind::RestoMenu,
    ResourceKind::SchamperArticle,
  ];

  /// Stable name used in storage and in the key's display form.
  pub fn slug(self) -> &'static str {
    match self {
      ResourceKind::Association => "association",
      ResourceKind::RestoMenu => "resto-menu",
      ResourceKind::SchamperArticle => "schamper-article",
    }
  }
}

impl fmt::Display for ResourceKind {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(self.slug())
  }
}

impl FromStr for ResourceKind {
  type Err = String;

  fn from_str(s: &str) -> Result<Self, Self::Err> {
    match s.trim().to_lowercase().as_str() {
      "association" | "associations" => Ok(ResourceKind::Association),
      "resto-menu" | "resto" | "menu" => Ok(ResourceKind::RestoMenu),
      "schamper-article" | "schamper" | "news" => Ok(ResourceKind::SchamperArticle),
      other => Err(format!("Unknown resource kind: {}", other)),
    }
  }
}

/// Identifies one cached item: a kind plus an optional sub-identifier
/// (a menu date, an article id).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ResourceKey {
  kind: ResourceKind,
  sub_id: Option<String>,
}

impl ResourceKey {
  pub fn new(kind: ResourceKind, sub_id: Option<String>) -> Self {
    Self { kind, sub_id }
  }

  /// Key for a resource without sub-identifier.
  pub fn kind_only(kind: ResourceKind) -> Self {
    Self::new(kind, None)
  }

  pub fn with_id(kind: ResourceKind, sub_id: impl Into<String>) -> Self {
    Self::new(kind, Some(sub_id.into()))
  }

  pub fn kind(&self) -> ResourceKind {
    self.kind
  }

  pub fn sub_id(&self) -> Option<&str> {
    self.sub_id.as_deref()
  }
}

impl fmt::Display for ResourceKey {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match &self.sub_id {
      Some(id) => write!(f, "{}/{}", self.kind, id),
      None => write!(f, "{}", self.kind),
    }
  }
}

/// A cached payload and when it was fetched.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheRecord {
  pub key: ResourceKey,
  /// Raw response body as received from the server
  pub payload: Vec<u8>,
  pub fetched_at: DateTime<Utc>,
  /// ETag or content digest used for conditional fetches
  pub version: Option<String>,
}
