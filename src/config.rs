use color_eyre::{eyre::eyre, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use url::Url;

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Config {
  /// Origin the worker is installed on; relative paths resolve against it
  pub origin: String,
  pub cache: CacheConfig,
  pub routing: RoutingConfig,
  pub sync: SyncConfig,
  pub push: PushConfig,
  pub http: HttpConfig,
}

impl Default for Config {
  fn default() -> Self {
    Self {
      origin: "http://localhost:5173".to_string(),
      cache: CacheConfig::default(),
      routing: RoutingConfig::default(),
      sync: SyncConfig::default(),
      push: PushConfig::default(),
      http: HttpConfig::default(),
    }
  }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
  /// Partition name prefix (e.g. "prayan" gives "prayan-static-v2")
  pub prefix: String,
  /// Version suffix; bumping it retires every older partition on activate
  pub version: String,
  /// Application shell paths fetched on install and served cache-first
  pub precache: Vec<String>,
}

impl Default for CacheConfig {
  fn default() -> Self {
    Self {
      prefix: "prayan".to_string(),
      version: "v2".to_string(),
      precache: [
        "/",
        "/shop",
        "/my-orders",
        "/loyalty",
        "/referrals",
        "/return-policy",
        "/manifest.json",
        "/icons/icon-192x192.png",
        "/icons/icon-512x512.png",
      ]
      .iter()
      .map(|s| s.to_string())
      .collect(),
    }
  }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct RoutingConfig {
  /// Regular expressions matched against the request path for network-first content
  pub dynamic_patterns: Vec<String>,
  /// Path prefix of API calls that get the JSON offline fallback
  pub api_prefix: String,
}

impl Default for RoutingConfig {
  fn default() -> Self {
    Self {
      dynamic_patterns: vec![
        r"/product/\d+".to_string(),
        r"/api/".to_string(),
        r"\.(jpg|jpeg|png|gif|webp|svg)$".to_string(),
      ],
      api_prefix: "/api/".to_string(),
    }
  }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SyncConfig {
  pub orders_tag: String,
  pub cart_tag: String,
  /// Record store key holding the list of orders placed while offline
  pub orders_key: String,
  /// Record store key holding the latest cart snapshot
  pub cart_key: String,
  pub orders_endpoint: String,
  pub cart_endpoint: String,
  /// Drop each order from the queue as soon as it is accepted, instead of
  /// clearing the whole queue only after the full batch went through.
  pub acknowledge_each_order: bool,
}

impl Default for SyncConfig {
  fn default() -> Self {
    Self {
      orders_tag: "background-sync-orders".to_string(),
      cart_tag: "background-sync-cart".to_string(),
      orders_key: "pendingOrders".to_string(),
      cart_key: "cartData".to_string(),
      orders_endpoint: "/api/orders".to_string(),
      cart_endpoint: "/api/cart/sync".to_string(),
      acknowledge_each_order: false,
    }
  }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct PushConfig {
  pub analytics_endpoint: String,
  /// Where the "view" action lands when the notification carries no url
  pub view_fallback_url: String,
  pub default_url: String,
}

impl Default for PushConfig {
  fn default() -> Self {
    Self {
      analytics_endpoint: "/api/analytics/notification-close".to_string(),
      view_fallback_url: "/my-orders".to_string(),
      default_url: "/".to_string(),
    }
  }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct HttpConfig {
  pub timeout_secs: u64,
  pub user_agent: String,
}

impl Default for HttpConfig {
  fn default() -> Self {
    Self {
      timeout_secs: 30,
      user_agent: concat!("masale-sw/", env!("CARGO_PKG_VERSION")).to_string(),
    }
  }
}

impl Config {
  /// Load configuration from file.
  ///
  /// Search order:
  /// 1. Explicit path if provided
  /// 2. ./masale-sw.yaml (current directory)
  /// 3. $XDG_CONFIG_HOME/masale-sw/config.yaml
  ///
  /// Falls back to built-in defaults when no file is found.
  pub fn load(explicit_path: Option<&Path>) -> Result<Self> {
    let path = if let Some(p) = explicit_path {
      if p.exists() {
        Some(p.to_path_buf())
      } else {
        return Err(eyre!("Config file not found: {}", p.display()));
      }
    } else {
      Self::find_config_file()
    };

    match path {
      Some(p) => Self::load_from_path(&p),
      None => {
        tracing::debug!("no config file found, using defaults");
        Ok(Self::default())
      }
    }
  }

  fn find_config_file() -> Option<PathBuf> {
    // Check current directory
    let local = PathBuf::from("masale-sw.yaml");
    if local.exists() {
      return Some(local);
    }

    // Check XDG config directory
    if let Some(config_dir) = dirs::config_dir() {
      let xdg_path = config_dir.join("masale-sw").join("config.yaml");
      if xdg_path.exists() {
        return Some(xdg_path);
      }
    }

    None
  }

  fn load_from_path(path: &Path) -> Result<Self> {
    let contents = std::fs::read_to_string(path)
      .map_err(|e| eyre!("Failed to read config file {}: {}", path.display(), e))?;

    Self::from_yaml(&contents)
      .map_err(|e| eyre!("Failed to parse config file {}: {}", path.display(), e))
  }

  pub fn from_yaml(contents: &str) -> Result<Self> {
    let config: Config = serde_yaml::from_str(contents).map_err(|e| eyre!("{}", e))?;
    Ok(config)
  }

  /// The configured origin as a parsed URL.
  pub fn origin_url(&self) -> Result<Url> {
    Url::parse(&self.origin).map_err(|e| eyre!("Invalid origin {}: {}", self.origin, e))
  }

  /// Resolve a path such as "/api/orders" against the configured origin.
  pub fn resolve(&self, path: &str) -> Result<Url> {
    self
      .origin_url()?
      .join(path)
      .map_err(|e| eyre!("Invalid path {}: {}", path, e))
  }
}
