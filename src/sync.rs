//! Background sync: flush records staged while offline once connectivity returns.

use color_eyre::{eyre::eyre, Result};
use serde_json::Value;
use std::sync::Arc;
use url::Url;

use crate::config::{Config, SyncConfig};
use crate::db::RecordStore;
use crate::net::{Fetcher, Request};

/// The purpose a sync signal was registered for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncTag {
  Orders,
  Cart,
}

impl SyncTag {
  pub fn parse(tag: &str, config: &SyncConfig) -> Option<Self> {
    if tag == config.orders_tag {
      Some(Self::Orders)
    } else if tag == config.cart_tag {
      Some(Self::Cart)
    } else {
      None
    }
  }
}

/// What a sync run did. Failures are reported here, never as errors.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SyncOutcome {
  /// Nothing was queued under the key
  Idle,
  /// Every queued order was accepted and the queue was cleared
  OrdersSynced { sent: usize },
  /// The run stopped at the first rejected order; the queue stays for the next signal
  OrdersFailed { sent: usize, remaining: usize, error: String },
  CartSynced,
  CartFailed { error: String },
  /// Tag not registered by this worker
  Ignored,
}

pub struct SyncCoordinator {
  records: Arc<dyn RecordStore>,
  fetcher: Arc<dyn Fetcher>,
  config: SyncConfig,
  orders_url: Url,
  cart_url: Url,
}

impl SyncCoordinator {
  pub fn new(config: &Config, records: Arc<dyn RecordStore>, fetcher: Arc<dyn Fetcher>) -> Result<Self> {
    Ok(Self {
      records,
      fetcher,
      orders_url: config.resolve(&config.sync.orders_endpoint)?,
      cart_url: config.resolve(&config.sync.cart_endpoint)?,
      config: config.sync.clone(),
    })
  }

  /// React to a connectivity signal. Never fails: errors are logged and the
  /// data stays queued until the next signal.
  pub async fn handle(&self, tag: &str) -> SyncOutcome {
    tracing::info!(tag, "background sync triggered");

    match SyncTag::parse(tag, &self.config) {
      Some(SyncTag::Orders) => self.sync_orders().await,
      Some(SyncTag::Cart) => self.sync_cart().await,
      None => {
        tracing::warn!(tag, "unknown sync tag");
        SyncOutcome::Ignored
      }
    }
  }

  /// Submit queued orders one by one.
  ///
  /// Orders already accepted before a failure are submitted again on the
  /// next run unless `acknowledge_each_order` is set.
  pub async fn sync_orders(&self) -> SyncOutcome {
    let key = &self.config.orders_key;

    let orders = match self.load_orders() {
      Ok(orders) => orders,
      Err(e) => {
        tracing::warn!(key = %key, error = %e, "order sync failed");
        return SyncOutcome::OrdersFailed {
          sent: 0,
          remaining: 0,
          error: e.to_string(),
        };
      }
    };
    if orders.is_empty() {
      return SyncOutcome::Idle;
    }

    let total = orders.len();
    for (index, order) in orders.iter().enumerate() {
      if let Err(e) = self.submit(&self.orders_url, order).await {
        tracing::warn!(key = %key, sent = index, total, error = %e, "order sync failed");
        return SyncOutcome::OrdersFailed {
          sent: index,
          remaining: total - index,
          error: e.to_string(),
        };
      }

      if self.config.acknowledge_each_order {
        let rest = Value::Array(orders[index + 1..].to_vec());
        if let Err(e) = self.records.put(key, &rest) {
          tracing::warn!(key = %key, error = %e, "failed to acknowledge order");
        }
      }
    }

    if let Err(e) = self.records.delete(key) {
      // Everything went out but the queue survives; next run re-sends it.
      tracing::warn!(key = %key, error = %e, "failed to clear synced orders");
    }
    tracing::info!(sent = total, "orders synced successfully");
    SyncOutcome::OrdersSynced { sent: total }
  }

  /// Submit the cart snapshot. The record is kept as the local source of truth.
  pub async fn sync_cart(&self) -> SyncOutcome {
    let key = &self.config.cart_key;

    let cart = match self.records.get(key) {
      Ok(Some(cart)) if !cart.is_null() => cart,
      Ok(_) => return SyncOutcome::Idle,
      Err(e) => {
        tracing::warn!(key = %key, error = %e, "cart sync failed");
        return SyncOutcome::CartFailed {
          error: e.to_string(),
        };
      }
    };

    match self.submit(&self.cart_url, &cart).await {
      Ok(()) => {
        tracing::info!("cart synced successfully");
        SyncOutcome::CartSynced
      }
      Err(e) => {
        tracing::warn!(key = %key, error = %e, "cart sync failed");
        SyncOutcome::CartFailed {
          error: e.to_string(),
        }
      }
    }
  }

  fn load_orders(&self) -> Result<Vec<Value>> {
    let key = &self.config.orders_key;
    match self.records.get(key)? {
      None | Some(Value::Null) => Ok(Vec::new()),
      Some(Value::Array(orders)) => Ok(orders),
      Some(other) => Err(eyre!(
        "Record {} should hold a list of orders, found {}",
        key,
        other
      )),
    }
  }

  /// POST one record. A non-2xx status counts as a failed submission, so the
  /// record stays staged; the storefront's own worker only treated a network
  /// error as failure and would drop a record the server answered 500 to.
  async fn submit(&self, url: &Url, body: &Value) -> Result<()> {
    let request = Request::post_json(url.clone(), body)?;
    let response = self.fetcher.fetch(&request).await?;
    if !response.is_success() {
      return Err(eyre!("{} rejected with HTTP {}", url, response.status));
    }
    Ok(())
  }
}
