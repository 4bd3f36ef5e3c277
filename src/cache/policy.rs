//! Staleness policy: decides whether a cached record can be served as-is.

use chrono::{DateTime, Duration, Utc};

use super::record::{CacheRecord, ResourceKind};

/// Outcome of a staleness evaluation. Never persisted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StalenessVerdict {
  Fresh,
  Stale,
  Missing,
}

/// Maximum age from a number of minutes. `None` unless the count is positive
/// and fits in a `Duration`.
pub fn max_age_from_minutes(mins: i64) -> Option<Duration> {
  if mins <= 0 {
    return None;
  }
  Duration::try_minutes(mins)
}

/// Per-kind maximum ages.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StalenessPolicy {
  association: Duration,
  resto_menu: Duration,
  schamper_article: Duration,
}

impl Default for StalenessPolicy {
  fn default() -> Self {
    Self {
      association: Duration::hours(24),
      resto_menu: Duration::hours(24),
      schamper_article: Duration::hours(1),
    }
  }
}

impl StalenessPolicy {
  pub fn new(association: Duration, resto_menu: Duration, schamper_article: Duration) -> Self {
    Self {
      association,
      resto_menu,
      schamper_article,
    }
  }

  /// Replace the maximum age for one kind.
  pub fn with_max_age(mut self, kind: ResourceKind, max_age: Duration) -> Self {
    match kind {
      ResourceKind::Association => self.association = max_age,
      ResourceKind::RestoMenu => self.resto_menu = max_age,
      ResourceKind::SchamperArticle => self.schamper_article = max_age,
    }
    self
  }

  pub fn max_age(&self, kind: ResourceKind) -> Duration {
    match kind {
      ResourceKind::Association => self.association,
      ResourceKind::RestoMenu => self.resto_menu,
      ResourceKind::SchamperArticle => self.schamper_article,
    }
  }

  /// Pure: identical inputs always give the same verdict.
  ///
  /// A record exactly `max_age` old is still fresh; a record from the future
  /// (clock skew) is fresh as well.
  pub fn evaluate(
    &self,
    record: Option<&CacheRecord>,
    kind: ResourceKind,
    now: DateTime<Utc>,
  ) -> StalenessVerdict {
    match record {
      None => StalenessVerdict::Missing,
      Some(record) if now - record.fetched_at > self.max_age(kind) => StalenessVerdict::Stale,
      Some(_) => StalenessVerdict::Fresh,
    }
  }
}
