//! Data store that orchestrates cache storage, fetching and staleness.
//!
//! Lookups never wait for the network: `get` answers from the cache and, when
//! the record is stale or missing, schedules a refresh in the background.
//!
//! At most one refresh runs per key. A refresh is represented by a ticket
//! (a shared future) kept in the `in_flight` map from the moment it is
//! scheduled until the refresh task retires it. Anyone asking for a refresh
//! while a ticket exists waits on that ticket instead of starting a second
//! network call.

use chrono::{DateTime, Utc};
use futures::future::{BoxFuture, FutureExt, Shared};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use tokio::runtime::Handle;
use tokio::sync::oneshot;
use tracing::{debug, info, warn};

use super::policy::{StalenessPolicy, StalenessVerdict};
use super::record::{CacheRecord, ResourceKey};
use super::storage::CacheStorage;
use super::traits::{Cached, Resource};
use crate::clock::{Clock, SystemClock};
use crate::error::StoreError;
use crate::fetch::{FetchResponse, FetchResult, RemoteFetcher};
use crate::preferences::{PreferenceSource, PreferencesService};

/// Result of one completed refresh.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RefreshOutcome {
  /// New content was fetched and stored
  Updated(CacheRecord),
  /// The server confirmed the cached content; only `fetched_at` moved
  NotModified(CacheRecord),
  /// The refresh failed and the cache was left untouched
  Failed(StoreError),
}

impl RefreshOutcome {
  pub fn record(&self) -> Option<&CacheRecord> {
    match self {
      RefreshOutcome::Updated(record) | RefreshOutcome::NotModified(record) => Some(record),
      RefreshOutcome::Failed(_) => None,
    }
  }

  pub fn error(&self) -> Option<&StoreError> {
    match self {
      RefreshOutcome::Failed(e) => Some(e),
      _ => None,
    }
  }

  pub fn is_success(&self) -> bool {
    !matches!(self, RefreshOutcome::Failed(_))
  }
}

/// Delivered to subscribers once per completed refresh.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoreEvent {
  pub key: ResourceKey,
  pub outcome: RefreshOutcome,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(u64);

/// Timeout and retry behaviour of refreshes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RefreshSettings {
  /// Bound on a single fetch
  pub timeout: Duration,
  /// Delay before a retry; doubled for every further attempt
  pub retry_delay: Duration,
  /// Total attempts including the first
  pub max_attempts: u32,
}

impl Default for RefreshSettings {
  fn default() -> Self {
    Self {
      timeout: Duration::from_secs(10),
      retry_delay: Duration::from_millis(500),
      max_attempts: 2,
    }
  }
}

type Callback = Arc<dyn Fn(&StoreEvent) + Send + Sync>;
type Ticket = Shared<BoxFuture<'static, RefreshOutcome>>;

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
  // Every critical section leaves the maps consistent, so a poisoned lock
  // is still safe to use.
  mutex.lock().unwrap_or_else(|e| e.into_inner())
}

struct Inner<R, S: ?Sized> {
  storage: Arc<S>,
  fetcher: Arc<dyn RemoteFetcher>,
  clock: Arc<dyn Clock>,
  preferences: Arc<dyn PreferenceSource>,
  policy: StalenessPolicy,
  settings: RefreshSettings,
  runtime: Handle,
  in_flight: Mutex<HashMap<ResourceKey, Ticket>>,
  subscribers: Mutex<HashMap<ResourceKey, Vec<(SubscriptionId, Callback)>>>,
  next_subscription: AtomicU64,
  resource: R,
}

/// Cache-first store for one resource kind.
pub struct DataStore<R, S: ?Sized = dyn CacheStorage> {
  inner: Arc<Inner<R, S>>,
}

impl<R, S: ?Sized> Clone for DataStore<R, S> {
  fn clone(&self) -> Self {
    Self {
      inner: Arc::clone(&self.inner),
    }
  }
}

pub struct DataStoreBuilder<R, S: ?Sized> {
  storage: Arc<S>,
  fetcher: Arc<dyn RemoteFetcher>,
  clock: Arc<dyn Clock>,
  preferences: Arc<dyn PreferenceSource>,
  policy: StalenessPolicy,
  settings: RefreshSettings,
  resource: R,
}

impl<R: Resource, S: CacheStorage + ?Sized + 'static> DataStoreBuilder<R, S> {
  pub fn clock(mut self, clock: Arc<dyn Clock>) -> Self {
    self.clock = clock;
    self
  }

  pub fn preferences(mut self, preferences: Arc<dyn PreferenceSource>) -> Self {
    self.preferences = preferences;
    self
  }

  pub fn policy(mut self, policy: StalenessPolicy) -> Self {
    self.policy = policy;
    self
  }

  pub fn settings(mut self, settings: RefreshSettings) -> Self {
    self.settings = settings;
    self
  }

  /// Background refreshes are spawned on `runtime`, so the store can be
  /// used from threads outside of it.
  pub fn build(self, runtime: Handle) -> DataStore<R, S> {
    DataStore {
      inner: Arc::new(Inner {
        storage: self.storage,
        fetcher: self.fetcher,
        clock: self.clock,
        preferences: self.preferences,
        policy: self.policy,
        settings: self.settings,
        runtime,
        in_flight: Mutex::new(HashMap::new()),
        subscribers: Mutex::new(HashMap::new()),
        next_subscription: AtomicU64::new(1),
        resource: self.resource,
      }),
    }
  }
}

impl<R: Resource, S: CacheStorage + ?Sized + 'static> DataStore<R, S> {
  pub fn builder(
    resource: R,
    storage: Arc<S>,
    fetcher: Arc<dyn RemoteFetcher>,
  ) -> DataStoreBuilder<R, S> {
    DataStoreBuilder {
      resource,
      storage,
      fetcher,
      clock: Arc::new(SystemClock),
      preferences: Arc::new(PreferencesService::default()),
      policy: StalenessPolicy::default(),
      settings: RefreshSettings::default(),
    }
  }

  /// Key of this store's kind.
  pub fn key(&self, sub_id: Option<String>) -> ResourceKey {
    ResourceKey::new(R::KIND, sub_id)
  }

  /// Policy with the user's max-age override applied.
  pub fn policy(&self) -> StalenessPolicy {
    self.inner.policy()
  }

  /// Current cache entry for `key`, possibly stale or absent.
  ///
  /// Never waits on the network and never fails. Schedules a background
  /// refresh when the entry is not fresh and none is running yet.
  pub fn get(&self, key: &ResourceKey) -> Option<CacheRecord> {
    self.lookup(key).0
  }

  /// Like [`DataStore::get`], decoded into the resource's payload type.
  pub fn get_value(&self, key: &ResourceKey) -> Option<Cached<R::Payload>> {
    let (record, verdict) = self.lookup(key);
    let record = record?;
    match R::decode(&record.payload) {
      Ok(data) => Some(Cached {
        data,
        fetched_at: record.fetched_at,
        verdict,
      }),
      Err(e) => {
        warn!(key = %key, error = %e, "cached payload no longer decodes");
        if self.inner.preferences.refresh_enabled() {
          let _ = self.ticket(key);
        }
        None
      }
    }
  }

  /// Refresh `key` regardless of staleness and wait for the outcome.
  ///
  /// Joins the running refresh when there is one.
  pub async fn force_refresh(&self, key: &ResourceKey) -> RefreshOutcome {
    self.ticket(key).await
  }

  /// [`DataStore::force_refresh`] followed by decoding.
  pub async fn refresh_value(&self, key: &ResourceKey) -> Result<Cached<R::Payload>, StoreError> {
    match self.force_refresh(key).await {
      RefreshOutcome::Updated(record) | RefreshOutcome::NotModified(record) => Ok(Cached {
        data: R::decode(&record.payload)?,
        fetched_at: record.fetched_at,
        verdict: StalenessVerdict::Fresh,
      }),
      RefreshOutcome::Failed(e) => Err(e),
    }
  }

  /// Get notified whenever a refresh of `key` completes.
  ///
  /// Callbacks run on the refresh task, after the store released its locks,
  /// so they may call back into the store.
  pub fn subscribe(
    &self,
    key: &ResourceKey,
    callback: impl Fn(&StoreEvent) + Send + Sync + 'static,
  ) -> SubscriptionId {
    let id = SubscriptionId(self.inner.next_subscription.fetch_add(1, Ordering::Relaxed));
    lock(&self.inner.subscribers)
      .entry(key.clone())
      .or_default()
      .push((id, Arc::new(callback)));
    id
  }

  /// Returns false if the subscription was already gone.
  pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
    let mut subscribers = lock(&self.inner.subscribers);
    let mut removed = false;
    subscribers.retain(|_, callbacks| {
      let before = callbacks.len();
      callbacks.retain(|(sub, _)| *sub != id);
      removed |= callbacks.len() != before;
      !callbacks.is_empty()
    });
    removed
  }

  /// Drop the cached record for `key`. A running refresh is not cancelled
  /// and will store its result when it completes.
  pub fn evict(&self, key: &ResourceKey) -> Result<(), StoreError> {
    info!(key = %key, "evicting cached record");
    self.inner.storage.delete(key)
  }

  /// Drop every cached record of this store's kind.
  pub fn evict_all(&self) -> Result<(), StoreError> {
    info!(kind = %R::KIND, "evicting all cached records");
    self.inner.storage.delete_kind(R::KIND)
  }

  /// When `key` was last fetched successfully.
  pub fn last_updated(&self, key: &ResourceKey) -> Option<DateTime<Utc>> {
    self.inner.read(key).map(|record| record.fetched_at)
  }

  /// Keys with a cached record.
  pub fn cached_keys(&self) -> Result<Vec<ResourceKey>, StoreError> {
    self.inner.storage.keys(R::KIND)
  }

  pub fn is_refreshing(&self, key: &ResourceKey) -> bool {
    lock(&self.inner.in_flight).contains_key(key)
  }

  fn lookup(&self, key: &ResourceKey) -> (Option<CacheRecord>, StalenessVerdict) {
    debug_assert_eq!(key.kind(), R::KIND, "key {} used on the wrong store", key);

    let record = self.inner.read(key);
    let verdict = self
      .inner
      .policy()
      .evaluate(record.as_ref(), key.kind(), self.inner.clock.now());
    debug!(key = %key, ?verdict, "cache lookup");

    if verdict != StalenessVerdict::Fresh {
      if self.inner.preferences.refresh_enabled() {
        // Dropping the ticket does not cancel the refresh task
        let _ = self.ticket(key);
      } else {
        debug!(key = %key, "background refresh disabled");
      }
    }

    (record, verdict)
  }

  /// The live ticket for `key`, creating and spawning one if needed.
  fn ticket(&self, key: &ResourceKey) -> Ticket {
    let mut in_flight = lock(&self.inner.in_flight);
    if let Some(ticket) = in_flight.get(key) {
      debug!(key = %key, "joining running refresh");
      return ticket.clone();
    }

    let (tx, rx) = oneshot::channel();
    let ticket = async move {
      rx.await.unwrap_or_else(|_| {
        RefreshOutcome::Failed(StoreError::Network(
          "refresh task stopped before completing".to_string(),
        ))
      })
    }
    .boxed()
    .shared();
    in_flight.insert(key.clone(), ticket.clone());
    drop(in_flight);

    // Spawned outside the lock: a task that cannot run is dropped on the
    // spot, and its guard takes the lock to retire the ticket.
    let mut guard = TicketGuard {
      inner: Arc::clone(&self.inner),
      key: key.clone(),
      retired: false,
    };
    self.inner.runtime.spawn(async move {
      let outcome = guard.inner.refresh(&guard.key).await;
      guard.retire();
      guard.inner.notify(&guard.key, &outcome);
      let _ = tx.send(outcome);
    });

    ticket
  }
}

/// Removes the ticket for `key` when the refresh ends, also if the refresh
/// task is dropped or panics.
struct TicketGuard<R, S: ?Sized> {
  inner: Arc<Inner<R, S>>,
  key: ResourceKey,
  retired: bool,
}

impl<R, S: ?Sized> TicketGuard<R, S> {
  fn retire(&mut self) {
    if !self.retired {
      lock(&self.inner.in_flight).remove(&self.key);
      self.retired = true;
    }
  }
}

impl<R, S: ?Sized> Drop for TicketGuard<R, S> {
  fn drop(&mut self) {
    self.retire();
  }
}

impl<R, S: CacheStorage + ?Sized + 'static> Inner<R, S> {
  fn policy(&self) -> StalenessPolicy
  where
    R: Resource,
  {
    match self.preferences.max_age_override(R::KIND) {
      Some(max_age) => self.policy.with_max_age(R::KIND, max_age),
      None => self.policy,
    }
  }

  /// Read errors are logged and reported as a miss.
  fn read(&self, key: &ResourceKey) -> Option<CacheRecord> {
    match self.storage.read(key) {
      Ok(record) => record,
      Err(e) => {
        warn!(key = %key, error = %e, "failed to read cache");
        None
      }
    }
  }

  async fn refresh(&self, key: &ResourceKey) -> RefreshOutcome
  where
    R: Resource,
  {
    let previous = self.read(key);
    // An unreadable copy must not be confirmed by a not-modified answer
    let known_version = previous
      .as_ref()
      .filter(|r| R::decode(&r.payload).is_ok())
      .and_then(|r| r.version.clone());
    let resource_id = self.resource.resource_id(key);
    info!(key = %key, resource_id = %resource_id, "refreshing");

    let response = match self
      .fetch_with_retry(key, &resource_id, known_version.as_deref())
      .await
    {
      Ok(response) => response,
      Err(e) => {
        warn!(key = %key, error = %e, "refresh failed, keeping cached copy");
        return RefreshOutcome::Failed(e);
      }
    };

    let now = self.clock.now();
    let (record, modified) = match response {
      FetchResponse::Content { payload, version } => {
        if let Err(e) = R::decode(&payload) {
          warn!(key = %key, error = %e, "refusing to cache malformed payload");
          return RefreshOutcome::Failed(e);
        }
        let record = CacheRecord {
          key: key.clone(),
          payload,
          fetched_at: now,
          version,
        };
        (record, true)
      }
      FetchResponse::NotModified => match previous {
        Some(previous) => {
          let record = CacheRecord {
            fetched_at: now,
            ..previous
          };
          (record, false)
        }
        None => {
          return RefreshOutcome::Failed(StoreError::Server(
            "not modified reported without a cached copy".to_string(),
          ))
        }
      },
    };

    if let Err(e) = self.storage.write(&record) {
      warn!(key = %key, error = %e, "failed to store refreshed record");
      return RefreshOutcome::Failed(e);
    }

    info!(key = %key, modified, "refresh complete");
    if modified {
      RefreshOutcome::Updated(record)
    } else {
      RefreshOutcome::NotModified(record)
    }
  }

  async fn fetch_with_retry(
    &self,
    key: &ResourceKey,
    resource_id: &str,
    known_version: Option<&str>,
  ) -> FetchResult {
    let settings = self.settings;
    let mut attempt = 1;
    let mut delay = settings.retry_delay;

    loop {
      let result = tokio::time::timeout(
        settings.timeout,
        self.fetcher.fetch(resource_id, known_version),
      )
      .await
      .unwrap_or(Err(StoreError::Timeout(settings.timeout)));

      match result {
        Err(e) if e.is_retryable() && attempt < settings.max_attempts => {
          warn!(key = %key, attempt, error = %e, "fetch failed, retrying");
          tokio::time::sleep(delay).await;
          delay *= 2;
          attempt += 1;
        }
        result => return result,
      }
    }
  }

  /// Invoke the callbacks for `key` without holding any lock.
  fn notify(&self, key: &ResourceKey, outcome: &RefreshOutcome) {
    let callbacks: Vec<Callback> = lock(&self.subscribers)
      .get(key)
      .map(|subs| subs.iter().map(|(_, cb)| Arc::clone(cb)).collect())
      .unwrap_or_default();

    if callbacks.is_empty() {
      return;
    }

    let event = StoreEvent {
      key: key.clone(),
      outcome: outcome.clone(),
    };
    for callback in callbacks {
      callback(&event);
    }
  }
}
