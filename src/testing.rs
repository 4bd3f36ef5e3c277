//! Fakes shared by unit tests.

use futures::future::BoxFuture;
use futures::FutureExt;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::Semaphore;

use crate::cache::{CacheRecord, CacheStorage, MemoryStorage, ResourceKey, ResourceKind};
use crate::error::StoreError;
use crate::fetch::{FetchResponse, FetchResult, RemoteFetcher};

pub(crate) fn content(payload: &str, version: &str) -> FetchResult {
  Ok(FetchResponse::Content {
    payload: payload.as_bytes().to_vec(),
    version: Some(version.to_string()),
  })
}

/// Fetcher replaying a fixed list of responses and recording its calls.
#[derive(Default)]
pub(crate) struct ScriptedFetcher {
  responses: Mutex<VecDeque<FetchResult>>,
  calls: AtomicUsize,
  resource_ids: Mutex<Vec<String>>,
  versions: Mutex<Vec<Option<String>>>,
  gate: Option<Arc<Semaphore>>,
  delay: Option<Duration>,
}

impl ScriptedFetcher {
  pub fn new(responses: Vec<FetchResult>) -> Self {
    Self {
      responses: Mutex::new(responses.into()),
      ..Self::default()
    }
  }

  /// Every fetch waits until a permit is added to the returned semaphore.
  pub fn gated(responses: Vec<FetchResult>) -> (Self, Arc<Semaphore>) {
    let gate = Arc::new(Semaphore::new(0));
    let fetcher = Self {
      gate: Some(Arc::clone(&gate)),
      ..Self::new(responses)
    };
    (fetcher, gate)
  }

  pub fn slow(delay: Duration, responses: Vec<FetchResult>) -> Self {
    Self {
      delay: Some(delay),
      ..Self::new(responses)
    }
  }

  pub fn calls(&self) -> usize {
    self.calls.load(Ordering::SeqCst)
  }

  pub fn resource_ids(&self) -> Vec<String> {
    self.resource_ids.lock().unwrap().clone()
  }

  pub fn versions(&self) -> Vec<Option<String>> {
    self.versions.lock().unwrap().clone()
  }
}

impl RemoteFetcher for ScriptedFetcher {
  fn fetch<'a>(
    &'a self,
    resource_id: &'a str,
    known_version: Option<&'a str>,
  ) -> BoxFuture<'a, FetchResult> {
    async move {
      self.calls.fetch_add(1, Ordering::SeqCst);
      self
        .resource_ids
        .lock()
        .unwrap()
        .push(resource_id.to_string());
      self
        .versions
        .lock()
        .unwrap()
        .push(known_version.map(String::from));

      if let Some(gate) = &self.gate {
        // The permit goes straight back so later fetches pass too
        let _ = gate.acquire().await;
      }
      if let Some(delay) = self.delay {
        tokio::time::sleep(delay).await;
      }

      self
        .responses
        .lock()
        .unwrap()
        .pop_front()
        .unwrap_or_else(|| Err(StoreError::Network("no scripted response".to_string())))
    }
    .boxed()
  }
}

/// In-memory storage whose writes can be made to fail.
#[derive(Default)]
pub(crate) struct FlakyStorage {
  inner: MemoryStorage,
  fail_writes: AtomicBool,
}

impl FlakyStorage {
  pub fn fail_writes(&self, fail: bool) {
    self.fail_writes.store(fail, Ordering::SeqCst);
  }
}

impl CacheStorage for FlakyStorage {
  fn read(&self, key: &ResourceKey) -> Result<Option<CacheRecord>, StoreError> {
    self.inner.read(key)
  }

  fn write(&self, record: &CacheRecord) -> Result<(), StoreError> {
    if self.fail_writes.load(Ordering::SeqCst) {
      return Err(StoreError::CacheIo("disk full".to_string()));
    }
    self.inner.write(record)
  }

  fn delete(&self, key: &ResourceKey) -> Result<(), StoreError> {
    self.inner.delete(key)
  }

  fn keys(&self, kind: ResourceKind) -> Result<Vec<ResourceKey>, StoreError> {
    self.inner.keys(kind)
  }

  fn delete_kind(&self, kind: ResourceKind) -> Result<(), StoreError> {
    self.inner.delete_kind(kind)
  }

  fn clear(&self) -> Result<(), StoreError> {
    self.inner.clear()
  }
}
