//! Partition naming and the install/activate lifecycle.

use color_eyre::{eyre::eyre, Result};
use futures::future::try_join_all;
use std::sync::Arc;

use super::traits::CachePartitionStore;
use crate::config::Config;
use crate::net::{Fetcher, Request, Response};

/// Names of the partitions owned by the current version.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PartitionNames {
  pub static_assets: String,
  pub dynamic: String,
}

impl PartitionNames {
  pub fn new(prefix: &str, version: &str) -> Self {
    Self {
      static_assets: format!("{}-static-{}", prefix, version),
      dynamic: format!("{}-dynamic-{}", prefix, version),
    }
  }

  pub fn from_config(config: &Config) -> Self {
    Self::new(&config.cache.prefix, &config.cache.version)
  }

  pub fn is_current(&self, name: &str) -> bool {
    name == self.static_assets || name == self.dynamic
  }
}

/// Outcome of a successful install.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InstallReport {
  pub partition: String,
  pub cached: usize,
  /// The new version takes over without waiting for old clients to go away
  pub skip_waiting: bool,
}

/// Outcome of activation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ActivateReport {
  pub deleted: Vec<String>,
  /// Every open client is controlled by the new version right away
  pub clients_claimed: bool,
}

/// Owns partition lifecycle: pre-caching the app shell and retiring old versions.
pub struct PartitionManager {
  storage: Arc<dyn CachePartitionStore>,
  fetcher: Arc<dyn Fetcher>,
  names: PartitionNames,
  manifest: Vec<Request>,
}

impl PartitionManager {
  pub fn new(
    config: &Config,
    storage: Arc<dyn CachePartitionStore>,
    fetcher: Arc<dyn Fetcher>,
  ) -> Result<Self> {
    let manifest = config
      .cache
      .precache
      .iter()
      .map(|path| config.resolve(path).map(Request::get))
      .collect::<Result<Vec<_>>>()?;

    Ok(Self {
      storage,
      fetcher,
      names: PartitionNames::from_config(config),
      manifest,
    })
  }

  pub fn names(&self) -> &PartitionNames {
    &self.names
  }

  /// Pre-cache every manifest entry into the static partition.
  ///
  /// All entries are fetched before anything is written. A single failed
  /// fetch or non-2xx response fails the whole install and leaves the
  /// partition untouched.
  pub async fn install(&self) -> Result<InstallReport> {
    let partition = &self.names.static_assets;
    tracing::info!(partition = %partition, entries = self.manifest.len(), "installing");

    self.storage.open(partition)?;

    let fetches = self.manifest.iter().map(|request| self.precache_one(request));

    let entries = try_join_all(fetches)
      .await
      .map_err(|e| eyre!("Install failed, app shell is not available offline: {}", e))?;

    self.storage.put_all(partition, &entries)?;
    tracing::info!(partition = %partition, cached = entries.len(), "static assets cached");

    Ok(InstallReport {
      partition: partition.clone(),
      cached: entries.len(),
      skip_waiting: true,
    })
  }

  async fn precache_one(&self, request: &Request) -> Result<(Request, Response)> {
    let response = self.fetcher.fetch(request).await?;
    if !response.is_success() {
      return Err(eyre!(
        "Failed to pre-cache {}: HTTP {}",
        request.url,
        response.status
      ));
    }
    Ok((request.clone(), response))
  }

  /// Delete every partition that does not belong to the current version.
  pub fn activate(&self) -> Result<ActivateReport> {
    tracing::info!("activating");

    let mut deleted = Vec::new();
    for name in self.storage.keys()? {
      if self.names.is_current(&name) {
        continue;
      }
      tracing::info!(partition = %name, "deleting old cache");
      if self.storage.delete(&name)? {
        deleted.push(name);
      }
    }

    tracing::info!(deleted = deleted.len(), "activated");
    Ok(ActivateReport {
      deleted,
      clients_claimed: true,
    })
  }
}
