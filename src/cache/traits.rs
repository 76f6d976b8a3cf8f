//! Core traits and types for the caching system.

use chrono::{DateTime, Utc};
use color_eyre::Result;
use sha2::{Digest, Sha256};
use tokio::task::JoinHandle;

use crate::net::{Request, Response};

/// Identity of a cacheable request.
pub trait CacheKey {
  /// Stable, fixed-length key for storage.
  fn cache_hash(&self) -> String;

  /// Human-readable form, for logs and status output.
  fn description(&self) -> String;
}

impl CacheKey for Request {
  fn cache_hash(&self) -> String {
    // Method + full URL, query included
    let mut hasher = Sha256::new();
    hasher.update(self.description().as_bytes());
    hex::encode(hasher.finalize())
  }

  fn description(&self) -> String {
    format!("{} {}", self.method, self.url)
  }
}

/// A response replayed from a partition.
#[derive(Debug, Clone)]
pub struct CachedResponse {
  pub response: Response,
  /// When the response was cached
  pub cached_at: DateTime<Utc>,
}

/// Named, versioned buckets of request → response entries.
pub trait CachePartitionStore: Send + Sync {
  /// Create the partition if it does not exist yet.
  fn open(&self, name: &str) -> Result<()>;

  /// Names of every existing partition.
  fn keys(&self) -> Result<Vec<String>>;

  /// Delete a partition and all its entries. Returns whether it existed.
  fn delete(&self, name: &str) -> Result<bool>;

  fn match_request(&self, name: &str, request: &Request) -> Result<Option<CachedResponse>>;

  /// Store one entry, opening the partition if needed.
  fn put(&self, name: &str, request: &Request, response: &Response) -> Result<()>;

  /// Store several entries at once; either all of them land or none do.
  fn put_all(&self, name: &str, entries: &[(Request, Response)]) -> Result<()>;

  fn entry_count(&self, name: &str) -> Result<usize>;
}

/// Indicates where a served response came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResponseSource {
  /// Fresh from the network
  Network,
  /// Replayed from a partition
  Cache,
  /// Synthetic placeholder, nothing else could answer
  Offline,
  /// Not intercepted, handed straight to the network
  Passthrough,
}

/// Result of handling one fetch, including data and metadata about the source.
#[derive(Debug)]
pub struct Served {
  pub response: Response,
  pub source: ResponseSource,
  /// When the replayed entry was stored, for cache hits
  pub cached_at: Option<DateTime<Utc>>,
  /// Background refresh still running after the response was handed back.
  /// The host must let it finish before shutting down.
  pub revalidation: Option<JoinHandle<()>>,
}

impl Served {
  pub fn from_network(response: Response) -> Self {
    Self {
      response,
      source: ResponseSource::Network,
      cached_at: None,
      revalidation: None,
    }
  }

  pub fn from_cache(cached: CachedResponse) -> Self {
    Self {
      response: cached.response,
      source: ResponseSource::Cache,
      cached_at: Some(cached.cached_at),
      revalidation: None,
    }
  }

  pub fn offline(response: Response) -> Self {
    Self {
      response,
      source: ResponseSource::Offline,
      cached_at: None,
      revalidation: None,
    }
  }

  pub fn passthrough(response: Response) -> Self {
    Self {
      response,
      source: ResponseSource::Passthrough,
      cached_at: None,
      revalidation: None,
    }
  }

  /// Wait for any background refresh to settle.
  pub async fn settle(&mut self) {
    if let Some(handle) = self.revalidation.take() {
      if let Err(e) = handle.await {
        tracing::warn!(error = %e, "background revalidation task failed");
      }
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use reqwest::Method;
  use url::Url;

  #[test]
  fn test_cache_hash_includes_query() {
    let a = Request::get(Url::parse("http://localhost/shop?page=1").unwrap());
    let b = Request::get(Url::parse("http://localhost/shop?page=2").unwrap());
    assert_ne!(a.cache_hash(), b.cache_hash());
    assert_eq!(a.cache_hash().len(), 64);
  }

  #[test]
  fn test_cache_hash_includes_method() {
    let url = Url::parse("http://localhost/shop").unwrap();
    let get = Request::get(url.clone());
    let head = Request::new(Method::HEAD, url);
    assert_ne!(get.cache_hash(), head.cache_hash());
    assert_eq!(get.description(), "GET http://localhost/shop");
  }
}
