//! Core traits and types for the caching system.

use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;

use super::policy::StalenessVerdict;
use super::record::{ResourceKey, ResourceKind};
use crate::error::StoreError;
use crate::format;

/// A kind of remote content that can be cached.
///
/// Implementors bind a `ResourceKind` to the path it is fetched from and to
/// the type its payload decodes into. The value itself carries whatever the
/// path depends on, such as a menu language. Staleness and concurrency are
/// handled by the data store, never here.
pub trait Resource: Send + Sync + 'static {
  type Payload: DeserializeOwned + Send;

  const KIND: ResourceKind;

  /// Path of the resource relative to the API base URL.
  fn resource_id(&self, key: &ResourceKey) -> String;

  /// Decode a raw payload. A payload that fails here is never cached.
  fn decode(payload: &[u8]) -> Result<Self::Payload, StoreError> {
    Ok(serde_json::from_slice(payload)?)
  }
}

/// A decoded cached value together with metadata about its age.
#[derive(Debug, Clone)]
pub struct Cached<T> {
  /// The actual data
  pub data: T,
  /// When the data was fetched from the network
  pub fetched_at: DateTime<Utc>,
  /// Staleness at the time of the lookup
  pub verdict: StalenessVerdict,
}

impl<T> Cached<T> {
  pub fn is_stale(&self) -> bool {
    self.verdict == StalenessVerdict::Stale
  }

  /// Human readable age, e.g. "3 hours ago".
  pub fn age_display(&self, now: DateTime<Utc>) -> String {
    format::relative_to(self.fetched_at, now)
  }

  pub fn map<U>(self, f: impl FnOnce(T) -> U) -> Cached<U> {
    Cached {
      data: f(self.data),
      fetched_at: self.fetched_at,
      verdict: self.verdict,
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use chrono::{Duration, TimeZone};

  #[test]
  fn test_cached_age_and_map() {
    let now = Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap();
    let cached = Cached {
      data: vec![1, 2, 3],
      fetched_at: now - Duration::hours(3),
      verdict: StalenessVerdict::Stale,
    };

    assert!(cached.is_stale());
    assert_eq!(cached.age_display(now), "3 hours ago");

    let len = cached.map(|v| v.len());
    assert_eq!(len.data, 3);
    assert!(len.is_stale());
  }
}
