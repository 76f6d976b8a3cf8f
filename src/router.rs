//! Request classification.
//!
//! Rules are tried in order and the first match wins:
//! 1. exact static path            -> cache-first on the static partition
//! 2. dynamic pattern (regex)      -> network-first on the dynamic partition
//! 3. API prefix                   -> network-first with JSON offline fallback
//! 4. anything else                -> stale-while-revalidate on the dynamic partition
//!
//! Non-GET requests are never classified.

use color_eyre::{eyre::eyre, Result};
use regex::Regex;
use std::collections::HashSet;

use crate::cache::PartitionNames;
use crate::config::Config;
use crate::net::Request;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Strategy {
  CacheFirst,
  NetworkFirst,
  NetworkFirstWithFallback,
  StaleWhileRevalidate,
}

/// Which strategy handles a request, and against which partition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Route {
  pub strategy: Strategy,
  /// None for strategies that never touch a partition
  pub partition: Option<String>,
}

pub struct Router {
  static_paths: HashSet<String>,
  dynamic_patterns: Vec<Regex>,
  api_prefix: String,
  names: PartitionNames,
}

impl Router {
  pub fn new(config: &Config) -> Result<Self> {
    let dynamic_patterns = config
      .routing
      .dynamic_patterns
      .iter()
      .map(|p| Regex::new(p).map_err(|e| eyre!("Invalid dynamic pattern {:?}: {}", p, e)))
      .collect::<Result<Vec<_>>>()?;

    Ok(Self {
      static_paths: config.cache.precache.iter().cloned().collect(),
      dynamic_patterns,
      api_prefix: config.routing.api_prefix.clone(),
      names: PartitionNames::from_config(config),
    })
  }

  /// Pick the route for a request. `None` means the request is not
  /// intercepted and goes straight to the network.
  pub fn classify(&self, request: &Request) -> Option<Route> {
    if !request.is_get() {
      return None;
    }

    let path = request.path();

    let route = if self.static_paths.contains(path) {
      Route {
        strategy: Strategy::CacheFirst,
        partition: Some(self.names.static_assets.clone()),
      }
    } else if self.dynamic_patterns.iter().any(|re| re.is_match(path)) {
      Route {
        strategy: Strategy::NetworkFirst,
        partition: Some(self.names.dynamic.clone()),
      }
    } else if path.starts_with(&self.api_prefix) {
      Route {
        strategy: Strategy::NetworkFirstWithFallback,
        partition: None,
      }
    } else {
      Route {
        strategy: Strategy::StaleWhileRevalidate,
        partition: Some(self.names.dynamic.clone()),
      }
    };

    Some(route)
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::test_support::{get, url};
  use reqwest::Method;

  fn router() -> Router {
    Router::new(&Config::default()).unwrap()
  }

  fn strategy(router: &Router, path: &str) -> Strategy {
    router.classify(&get(path)).unwrap().strategy
  }

  #[test]
  fn test_static_paths_are_cache_first() {
    let router = router();
    let route = router.classify(&get("/shop")).unwrap();
    assert_eq!(route.strategy, Strategy::CacheFirst);
    assert_eq!(route.partition.as_deref(), Some("prayan-static-v2"));
    // Exact membership wins over the image pattern
    assert_eq!(strategy(&router, "/icons/icon-192x192.png"), Strategy::CacheFirst);
  }

  #[test]
  fn test_static_match_ignores_query() {
    assert_eq!(strategy(&router(), "/shop?sort=price"), Strategy::CacheFirst);
  }

  #[test]
  fn test_dynamic_patterns_are_network_first() {
    let router = router();
    for path in ["/product/12", "/api/products", "/images/garam-masala.webp"] {
      let route = router.classify(&get(path)).unwrap();
      assert_eq!(route.strategy, Strategy::NetworkFirst, "{}", path);
      assert_eq!(route.partition.as_deref(), Some("prayan-dynamic-v2"));
    }
  }

  #[test]
  fn test_non_numeric_product_path_falls_through() {
    assert_eq!(
      strategy(&router(), "/product/garam-masala"),
      Strategy::StaleWhileRevalidate
    );
  }

  #[test]
  fn test_api_prefix_gets_typed_fallback_when_not_dynamic() {
    let mut config = Config::default();
    config.routing.dynamic_patterns = vec![r"/product/\d+".to_string()];
    let router = Router::new(&config).unwrap();

    let route = router.classify(&get("/api/coupons")).unwrap();
    assert_eq!(route.strategy, Strategy::NetworkFirstWithFallback);
    assert_eq!(route.partition, None);
  }

  #[test]
  fn test_everything_else_is_stale_while_revalidate() {
    let route = router().classify(&get("/recipes/biryani")).unwrap();
    assert_eq!(route.strategy, Strategy::StaleWhileRevalidate);
    assert_eq!(route.partition.as_deref(), Some("prayan-dynamic-v2"));
  }

  #[test]
  fn test_non_get_is_not_intercepted() {
    let router = router();
    for method in [Method::POST, Method::PUT, Method::DELETE, Method::HEAD] {
      assert_eq!(router.classify(&Request::new(method, url("/shop"))), None);
    }
  }

  #[test]
  fn test_invalid_pattern_is_rejected() {
    let mut config = Config::default();
    config.routing.dynamic_patterns = vec!["/product/(".to_string()];
    assert!(Router::new(&config).is_err());
  }
}
