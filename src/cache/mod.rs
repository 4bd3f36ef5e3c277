//! Generic caching layer for offline-first data access.
//!
//! This module provides a content-agnostic caching mechanism that:
//! - Persists one record per key (kind + optional sub-id) that survives restarts
//! - Decides staleness per resource kind
//! - Serves cached content immediately and refreshes it in the background
//! - Runs at most one refresh per key and notifies subscribers when it ends

mod policy;
mod record;
mod storage;
mod store;
mod traits;

pub use policy::{max_age_from_minutes, StalenessPolicy, StalenessVerdict};
pub use record::{CacheRecord, ResourceKey, ResourceKind};
pub use storage::{CacheStorage, MemoryStorage, SqliteStorage};
pub use store::{
  DataStore, DataStoreBuilder, RefreshOutcome, RefreshSettings, StoreEvent, SubscriptionId,
};
pub use traits::{Cached, Resource};
