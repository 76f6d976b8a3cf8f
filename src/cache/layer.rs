//! Cache layer that orchestrates caching strategies with network fetching.

use std::sync::Arc;

use super::traits::{CacheKey, CachePartitionStore, CachedResponse, Served};
use crate::net::{Fetcher, Request, Response};

/// Cache layer that manages caching logic and network fetching.
///
/// This layer sits between the intercepted request and the network,
/// providing the four caching strategies. None of them return an error:
/// every failure ends in a cached response or an offline placeholder.
pub struct CacheLayer {
  storage: Arc<dyn CachePartitionStore>,
  fetcher: Arc<dyn Fetcher>,
}

impl CacheLayer {
  /// Create a new cache layer over the given storage backend and network.
  pub fn new(storage: Arc<dyn CachePartitionStore>, fetcher: Arc<dyn Fetcher>) -> Self {
    Self { storage, fetcher }
  }

  /// Look up a cached entry. Storage errors count as a miss.
  fn lookup(&self, partition: &str, request: &Request) -> Option<CachedResponse> {
    match self.storage.match_request(partition, request) {
      Ok(cached) => cached,
      Err(e) => {
        tracing::warn!(partition, request = %request.description(), error = %e, "cache lookup failed");
        None
      }
    }
  }

  /// Store a copy of a 2xx response. Write failures are logged, never surfaced.
  fn store(&self, partition: &str, request: &Request, response: &Response) {
    store_success(self.storage.as_ref(), partition, request, response);
  }

  /// Cache-first.
  ///
  /// 1. Cached entry present - return it, no network call
  /// 2. Otherwise fetch, keep a copy of 2xx responses, return what the network said
  /// 3. Fetch failed - offline placeholder
  pub async fn cache_first(&self, partition: &str, request: &Request) -> Served {
    if let Some(cached) = self.lookup(partition, request) {
      return Served::from_cache(cached);
    }

    match self.fetcher.fetch(request).await {
      Ok(response) => {
        self.store(partition, request, &response);
        Served::from_network(response)
      }
      Err(e) => {
        tracing::info!(request = %request.description(), error = %e, "cache first failed");
        Served::offline(Response::offline())
      }
    }
  }

  /// Network-first.
  ///
  /// The network response is returned whatever its status; 2xx responses are
  /// copied into the partition. Only when the fetch itself fails do we fall
  /// back to the cached entry, then to the offline placeholder.
  pub async fn network_first(&self, partition: &str, request: &Request) -> Served {
    match self.fetcher.fetch(request).await {
      Ok(response) => {
        self.store(partition, request, &response);
        Served::from_network(response)
      }
      Err(e) => {
        tracing::info!(request = %request.description(), error = %e, "network first falling back to cache");
        match self.lookup(partition, request) {
          Some(cached) => Served::from_cache(cached),
          None => Served::offline(Response::offline()),
        }
      }
    }
  }

  /// Network-first with a JSON offline body and no partition.
  ///
  /// HTTP error statuses are passed through untouched; the JSON placeholder
  /// only replaces fetches that produced no response at all.
  pub async fn network_first_with_fallback(&self, request: &Request) -> Served {
    match self.fetcher.fetch(request).await {
      Ok(response) => Served::from_network(response),
      Err(e) => {
        tracing::info!(request = %request.description(), error = %e, "api call failed, returning offline response");
        Served::offline(Response::offline_json())
      }
    }
  }

  /// Stale-while-revalidate.
  ///
  /// With a cached entry, return it at once and refresh the partition in a
  /// spawned task whose handle travels with the result. Without one, wait
  /// for the network; if that fails too, serve the offline placeholder.
  pub async fn stale_while_revalidate(&self, partition: &str, request: &Request) -> Served {
    if let Some(cached) = self.lookup(partition, request) {
      let storage = Arc::clone(&self.storage);
      let fetcher = Arc::clone(&self.fetcher);
      let partition = partition.to_string();
      let request = request.clone();

      let handle = tokio::spawn(async move {
        match fetcher.fetch(&request).await {
          Ok(response) => store_success(storage.as_ref(), &partition, &request, &response),
          Err(e) => {
            tracing::debug!(request = %request.description(), error = %e, "revalidation failed, keeping stale entry")
          }
        }
      });

      let mut served = Served::from_cache(cached);
      served.revalidation = Some(handle);
      return served;
    }

    match self.fetcher.fetch(request).await {
      Ok(response) => {
        self.store(partition, request, &response);
        Served::from_network(response)
      }
      Err(e) => {
        tracing::info!(request = %request.description(), error = %e, "nothing cached and network failed");
        Served::offline(Response::offline())
      }
    }
  }
}

impl Clone for CacheLayer {
  fn clone(&self) -> Self {
    Self {
      storage: Arc::clone(&self.storage),
      fetcher: Arc::clone(&self.fetcher),
    }
  }
}

fn store_success(
  storage: &dyn CachePartitionStore,
  partition: &str,
  request: &Request,
  response: &Response,
) {
  if !response.is_success() {
    return;
  }
  if let Err(e) = storage.put(partition, request, response) {
    tracing::warn!(partition, request = %request.description(), error = %e, "failed to cache response");
  }
}
