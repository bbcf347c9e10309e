//! Cache layer that orchestrates the caching strategies around network fetches.

use std::future::Future;
use std::sync::Arc;
use tracing::{debug, warn};

use super::snapshot::{CacheResult, RequestKey, ResponseSnapshot};
use super::storage::CacheStorage;
use crate::http::Response;
use crate::platform::NetworkError;

/// Names of the two live buckets for one build.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BucketNames {
  /// App shell and static assets
  pub static_name: String,
  /// API and runtime responses
  pub dynamic_name: String,
}

impl BucketNames {
  pub fn is_live(&self, name: &str) -> bool {
    name == self.static_name || name == self.dynamic_name
  }
}

/// Cache layer that manages caching logic and network fetching.
///
/// Lookups search the live static bucket, then the live dynamic bucket.
/// Storage failures degrade to a cache miss or a skipped write; they never
/// fail a request that the network could serve.
pub struct CacheLayer<S: CacheStorage> {
  storage: Arc<S>,
  buckets: BucketNames,
}

impl<S: CacheStorage> CacheLayer<S> {
  pub fn new(storage: Arc<S>, buckets: BucketNames) -> Self {
    Self { storage, buckets }
  }

  /// Exact-match lookup across the live buckets.
  pub fn lookup(&self, key: &RequestKey) -> Option<ResponseSnapshot> {
    for bucket in [&self.buckets.static_name, &self.buckets.dynamic_name] {
      match self.storage.get(bucket, key) {
        Ok(Some(snapshot)) => return Some(snapshot),
        Ok(None) => {}
        Err(e) => warn!(bucket = %bucket, key = key.description(), "cache read failed: {:#}", e),
      }
    }
    None
  }

  /// Snapshot a response if it is a 200 for a GET; returns whether it was stored.
  fn store(&self, bucket: &str, key: &RequestKey, response: &Response) -> bool {
    if !key.is_storable() || !response.is_ok() {
      return false;
    }

    match self
      .storage
      .put(bucket, key, &ResponseSnapshot::capture(response))
    {
      Ok(()) => {
        debug!(bucket, key = key.description(), "cached response");
        true
      }
      Err(e) => {
        warn!(bucket, key = key.description(), "cache write failed: {:#}", e);
        false
      }
    }
  }

  /// Cache-first for static assets.
  ///
  /// 1. Cache hit - return immediately, no network
  /// 2. Miss - fetch from network, snapshot a 200 into the static bucket
  /// 3. Miss and network failure - the error propagates
  pub async fn cache_first<F, Fut>(
    &self,
    key: &RequestKey,
    fetcher: F,
  ) -> Result<CacheResult<Response>, NetworkError>
  where
    F: FnOnce() -> Fut,
    Fut: Future<Output = Result<Response, NetworkError>>,
  {
    if let Some(cached) = self.lookup(key) {
      return Ok(CacheResult::from_cache(cached.to_response(), cached.cached_at));
    }

    let response = fetcher().await?;
    self.store(&self.buckets.static_name, key, &response);
    Ok(CacheResult::from_network(response))
  }

  /// Network-first with the same key as fallback.
  ///
  /// 1. Fetch from network, snapshot a 200 into the dynamic bucket
  /// 2. On network failure, return the cached snapshot (offline mode)
  /// 3. No snapshot - the error propagates
  pub async fn network_first<F, Fut>(
    &self,
    key: &RequestKey,
    fetcher: F,
  ) -> Result<CacheResult<Response>, NetworkError>
  where
    F: FnOnce() -> Fut,
    Fut: Future<Output = Result<Response, NetworkError>>,
  {
    match fetcher().await {
      Ok(response) => {
        self.store(&self.buckets.dynamic_name, key, &response);
        Ok(CacheResult::from_network(response))
      }
      Err(e) => match self.lookup(key) {
        Some(cached) => {
          debug!(key = key.description(), "network failed, serving cached response");
          Ok(CacheResult::offline(cached.to_response(), cached.cached_at))
        }
        None => Err(e),
      },
    }
  }

  /// Network without storing; on failure serve `fallback` from cache.
  pub async fn network_or_cached<F, Fut>(
    &self,
    fallback: &RequestKey,
    fetcher: F,
  ) -> Result<CacheResult<Response>, NetworkError>
  where
    F: FnOnce() -> Fut,
    Fut: Future<Output = Result<Response, NetworkError>>,
  {
    match fetcher().await {
      Ok(response) => Ok(CacheResult::from_network(response)),
      Err(e) => match self.lookup(fallback) {
        Some(cached) => Ok(CacheResult::offline(cached.to_response(), cached.cached_at)),
        None => Err(e),
      },
    }
  }
}
