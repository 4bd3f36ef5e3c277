use color_eyre::{eyre::eyre, Result};
use futures::future::BoxFuture;
use futures::FutureExt;
use reqwest::header::{ETAG, IF_NONE_MATCH};
use reqwest::StatusCode;
use sha2::{Digest, Sha256};
use std::time::Duration;
use url::Url;

use super::{FetchResponse, FetchResult, RemoteFetcher};
use crate::config::ApiConfig;
use crate::error::StoreError;

const DIGEST_PREFIX: &str = "sha256:";

/// Fetcher for the Hydra JSON API.
#[derive(Clone)]
pub struct HttpFetcher {
  client: reqwest::Client,
  base_url: Url,
  timeout: Duration,
}

impl HttpFetcher {
  pub fn new(config: &ApiConfig) -> Result<Self> {
    let timeout = Duration::from_secs(config.timeout_secs);
    let client = reqwest::Client::builder()
      .user_agent(concat!("hydra/", env!("CARGO_PKG_VERSION")))
      .timeout(timeout)
      .build()
      .map_err(|e| eyre!("Failed to create HTTP client: {}", e))?;

    Ok(Self {
      client,
      base_url: parse_base_url(&config.base_url)?,
      timeout,
    })
  }

  fn url(&self, resource_id: &str) -> std::result::Result<Url, StoreError> {
    self
      .base_url
      .join(resource_id.trim_start_matches('/'))
      .map_err(|e| StoreError::Network(format!("Invalid resource path {}: {}", resource_id, e)))
  }

  async fn get(&self, resource_id: &str, known_version: Option<&str>) -> FetchResult {
    let url = self.url(resource_id)?;

    let mut request = self.client.get(url.clone());
    if let Some(etag) = known_version.filter(|v| is_etag(v)) {
      request = request.header(IF_NONE_MATCH, etag);
    }

    let response = request
      .send()
      .await
      .map_err(|e| self.classify(&url, e))?;

    let status = response.status();
    if status == StatusCode::NOT_MODIFIED {
      return Ok(FetchResponse::NotModified);
    }
    if !status.is_success() {
      return Err(StoreError::Server(format!("{} returned {}", url, status)));
    }

    let etag = response
      .headers()
      .get(ETAG)
      .and_then(|v| v.to_str().ok())
      .map(String::from);

    let payload = response
      .bytes()
      .await
      .map_err(|e| self.classify(&url, e))?
      .to_vec();

    Ok(versioned(payload, etag, known_version))
  }

  fn classify(&self, url: &Url, e: reqwest::Error) -> StoreError {
    if e.is_timeout() {
      StoreError::Timeout(self.timeout)
    } else {
      StoreError::Network(format!("Failed to fetch {}: {}", url, e))
    }
  }
}

impl RemoteFetcher for HttpFetcher {
  fn fetch<'a>(
    &'a self,
    resource_id: &'a str,
    known_version: Option<&'a str>,
  ) -> BoxFuture<'a, FetchResult> {
    self.get(resource_id, known_version).boxed()
  }
}

/// `Url::join` drops the last path segment unless the base ends in a slash.
fn parse_base_url(base: &str) -> Result<Url> {
  let mut base = base.trim().to_string();
  if !base.ends_with('/') {
    base.push('/');
  }
  Url::parse(&base).map_err(|e| eyre!("Invalid API base URL {}: {}", base, e))
}

fn is_etag(version: &str) -> bool {
  version.starts_with('"') || version.starts_with("W/\"")
}

fn content_digest(payload: &[u8]) -> String {
  let mut hasher = Sha256::new();
  hasher.update(payload);
  format!("{}{}", DIGEST_PREFIX, hex::encode(hasher.finalize()))
}

/// Attach a version to a freshly downloaded payload.
///
/// Servers without ETag support get a content digest instead, and an
/// unchanged digest is reported as not modified.
fn versioned(payload: Vec<u8>, etag: Option<String>, known_version: Option<&str>) -> FetchResponse {
  match etag {
    Some(etag) => FetchResponse::Content {
      payload,
      version: Some(etag),
    },
    None => {
      let digest = content_digest(&payload);
      if known_version == Some(digest.as_str()) {
        FetchResponse::NotModified
      } else {
        FetchResponse::Content {
          payload,
          version: Some(digest),
        }
      }
    }
  }
}
