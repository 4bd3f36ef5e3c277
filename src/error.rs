//! Error taxonomy shared by the fetchers, the cache storage and the data store.

use std::time::Duration;

use thiserror::Error;

/// Everything that can go wrong while refreshing or persisting cached content.
///
/// The type is `Clone` so a single refresh outcome can be handed to every
/// caller waiting on the same refresh and to every subscriber.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StoreError {
  #[error("Network error: {0}")]
  Network(String),

  #[error("Request timed out after {0:?}")]
  Timeout(Duration),

  #[error("Server error: {0}")]
  Server(String),

  #[error("Failed to decode payload: {0}")]
  Decode(String),

  #[error("Cache I/O error: {0}")]
  CacheIo(String),
}

impl StoreError {
  /// Whether a failed fetch is worth a second attempt.
  pub fn is_retryable(&self) -> bool {
    matches!(
      self,
      StoreError::Network(_) | StoreError::Timeout(_) | StoreError::Server(_)
    )
  }
}

impl From<rusqlite::Error> for StoreError {
  fn from(e: rusqlite::Error) -> Self {
    StoreError::CacheIo(e.to_string())
  }
}

impl From<serde_json::Error> for StoreError {
  fn from(e: serde_json::Error) -> Self {
    StoreError::Decode(e.to_string())
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_transient_errors_are_retryable() {
    assert!(StoreError::Network("reset".into()).is_retryable());
    assert!(StoreError::Timeout(Duration::from_secs(1)).is_retryable());
    assert!(StoreError::Server("503".into()).is_retryable());
  }

  #[test]
  fn test_decode_and_io_errors_are_final() {
    assert!(!StoreError::Decode("eof".into()).is_retryable());
    assert!(!StoreError::CacheIo("disk full".into()).is_retryable());
  }
}
