//! Remote fetcher boundary.
//!
//! A fetcher performs exactly one network call per invocation. Timeouts,
//! retries and backoff are the data store's business, which keeps fetchers
//! trivial to replace in tests.

mod http;

pub use http::HttpFetcher;

use futures::future::BoxFuture;

use crate::error::StoreError;

/// Successful result of a fetch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FetchResponse {
  /// The server confirmed that the known version is current
  NotModified,
  /// New content, with the version marker to send next time
  Content {
    payload: Vec<u8>,
    version: Option<String>,
  },
}

pub type FetchResult = Result<FetchResponse, StoreError>;

pub trait RemoteFetcher: Send + Sync {
  /// Fetch `resource_id`, passing the version of the cached copy if any.
  fn fetch<'a>(
    &'a self,
    resource_id: &'a str,
    known_version: Option<&'a str>,
  ) -> BoxFuture<'a, FetchResult>;
}
