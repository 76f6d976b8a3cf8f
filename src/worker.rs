//! The worker: one stateless handler per lifecycle event.

use color_eyre::Result;
use serde_json::Value;
use std::sync::Arc;

use crate::cache::{
  ActivateReport, CacheLayer, CachePartitionStore, InstallReport, PartitionManager,
  PartitionNames, Served,
};
use crate::config::Config;
use crate::db::RecordStore;
use crate::event::WorkerEvent;
use crate::net::{Fetcher, Request};
use crate::push::{ClickOutcome, Notification, NotificationSink, PushHandler, WindowClients};
use crate::router::{Router, Strategy};
use crate::sync::{SyncCoordinator, SyncOutcome};

/// Result of handling one event.
#[derive(Debug)]
pub enum EventOutcome {
  Installed(InstallReport),
  Activated(ActivateReport),
  Fetched(Served),
  Synced(SyncOutcome),
  Displayed(Notification),
  Clicked(ClickOutcome),
  Closed { beacon_sent: bool },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PartitionStatus {
  pub name: String,
  pub entries: usize,
  pub current: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub struct WorkerStatus {
  pub partitions: Vec<PartitionStatus>,
  /// Staged records and a short summary of each
  pub records: Vec<(String, String)>,
}

/// Holds every component; nothing here outlives a single event except
/// what the stores persist.
pub struct Worker {
  partitions: PartitionManager,
  router: Router,
  cache: CacheLayer,
  sync: SyncCoordinator,
  push: PushHandler,
  storage: Arc<dyn CachePartitionStore>,
  records: Arc<dyn RecordStore>,
  fetcher: Arc<dyn Fetcher>,
}

impl Worker {
  pub fn new(
    config: &Config,
    storage: Arc<dyn CachePartitionStore>,
    records: Arc<dyn RecordStore>,
    fetcher: Arc<dyn Fetcher>,
    sink: Arc<dyn NotificationSink>,
    clients: Arc<dyn WindowClients>,
  ) -> Result<Self> {
    Ok(Self {
      partitions: PartitionManager::new(config, Arc::clone(&storage), Arc::clone(&fetcher))?,
      router: Router::new(config)?,
      cache: CacheLayer::new(Arc::clone(&storage), Arc::clone(&fetcher)),
      sync: SyncCoordinator::new(config, Arc::clone(&records), Arc::clone(&fetcher))?,
      push: PushHandler::new(config, Arc::clone(&fetcher), sink, clients)?,
      storage,
      records,
      fetcher,
    })
  }

  pub fn names(&self) -> &PartitionNames {
    self.partitions.names()
  }

  /// Run the handler for one event.
  ///
  /// Only install failures and errors from non-intercepted requests or the
  /// display surface come back as `Err`; everything else recovers locally.
  pub async fn dispatch(&self, event: WorkerEvent) -> Result<EventOutcome> {
    tracing::debug!(event = event.name(), "dispatching");

    match event {
      WorkerEvent::Install => Ok(EventOutcome::Installed(self.partitions.install().await?)),
      WorkerEvent::Activate => Ok(EventOutcome::Activated(self.partitions.activate()?)),
      WorkerEvent::Fetch(request) => Ok(EventOutcome::Fetched(self.handle_fetch(&request).await?)),
      WorkerEvent::Sync { tag } => Ok(EventOutcome::Synced(self.sync.handle(&tag).await)),
      WorkerEvent::Push { payload } => Ok(EventOutcome::Displayed(
        self.push.handle_push(payload.as_deref()).await?,
      )),
      WorkerEvent::NotificationClick {
        notification,
        action,
      } => Ok(EventOutcome::Clicked(
        self
          .push
          .handle_click(&notification, action.as_deref())
          .await?,
      )),
      WorkerEvent::NotificationClose { notification } => Ok(EventOutcome::Closed {
        beacon_sent: self.push.handle_close(&notification).await,
      }),
    }
  }

  /// Intercept a request. Non-GET requests go straight to the network and
  /// their failures are returned as-is; intercepted ones always get a response.
  pub async fn handle_fetch(&self, request: &Request) -> Result<Served> {
    let Some(route) = self.router.classify(request) else {
      tracing::debug!(method = %request.method, url = %request.url, "not intercepted");
      let response = self.fetcher.fetch(request).await?;
      return Ok(Served::passthrough(response));
    };

    tracing::debug!(url = %request.url, strategy = ?route.strategy, "routing request");

    let partition = route.partition.as_deref().unwrap_or_default();
    let served = match route.strategy {
      Strategy::CacheFirst => self.cache.cache_first(partition, request).await,
      Strategy::NetworkFirst => self.cache.network_first(partition, request).await,
      Strategy::NetworkFirstWithFallback => self.cache.network_first_with_fallback(request).await,
      Strategy::StaleWhileRevalidate => self.cache.stale_while_revalidate(partition, request).await,
    };

    Ok(served)
  }

  /// Snapshot of partitions and staged records.
  pub fn status(&self) -> Result<WorkerStatus> {
    let names = self.names();
    let partitions = self
      .storage
      .keys()?
      .into_iter()
      .map(|name| -> Result<PartitionStatus> {
        Ok(PartitionStatus {
          entries: self.storage.entry_count(&name)?,
          current: names.is_current(&name),
          name,
        })
      })
      .collect::<Result<Vec<_>>>()?;

    let records = self
      .records
      .keys()?
      .into_iter()
      .map(|key| -> Result<(String, String)> {
        let summary = match self.records.get(&key)? {
          Some(Value::Array(items)) => format!("{} queued", items.len()),
          Some(Value::Object(fields)) => format!("{} fields", fields.len()),
          Some(other) => other.to_string(),
          None => "missing".to_string(),
        };
        Ok((key, summary))
      })
      .collect::<Result<Vec<_>>>()?;

    Ok(WorkerStatus {
      partitions,
      records,
    })
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::cache::{ResponseSource, SqlitePartitionStore};
  use crate::db::{Database, SqliteRecordStore};
  use crate::net::Response;
  use crate::test_support::{get, url, RecordingHost, ScriptedFetcher};
  use reqwest::Method;
  use serde_json::json;

  struct Harness {
    worker: Worker,
    fetcher: Arc<ScriptedFetcher>,
    storage: Arc<SqlitePartitionStore>,
    records: Arc<SqliteRecordStore>,
  }

  fn harness() -> Harness {
    let db = Arc::new(Database::open_in_memory().unwrap());
    let storage = Arc::new(SqlitePartitionStore::new(db.clone()));
    let records = Arc::new(SqliteRecordStore::new(db));
    let fetcher = Arc::new(ScriptedFetcher::new());
    let host = Arc::new(RecordingHost::new());
    let worker = Worker::new(
      &Config::default(),
      storage.clone(),
      records.clone(),
      fetcher.clone(),
      host.clone(),
      host,
    )
    .unwrap();
    Harness {
      worker,
      fetcher,
      storage,
      records,
    }
  }

  async fn fetch(h: &Harness, path: &str) -> Served {
    match h.worker.dispatch(WorkerEvent::Fetch(get(path))).await.unwrap() {
      EventOutcome::Fetched(served) => served,
      other => panic!("unexpected outcome {:?}", other),
    }
  }

  #[tokio::test]
  async fn test_installed_shell_is_served_offline() {
    let h = harness();
    for path in &Config::default().cache.precache {
      h.fetcher.respond(path, Response::new(200, format!("shell {}", path)));
    }
    h.worker.dispatch(WorkerEvent::Install).await.unwrap();
    h.worker.dispatch(WorkerEvent::Activate).await.unwrap();

    for path in &Config::default().cache.precache {
      h.fetcher.fail(path);
    }
    let calls_before = h.fetcher.calls().len();

    let served = fetch(&h, "/loyalty").await;
    assert_eq!(served.source, ResponseSource::Cache);
    assert_eq!(served.response.text(), "shell /loyalty");
    assert_eq!(h.fetcher.calls().len(), calls_before);
  }

  #[tokio::test]
  async fn test_install_failure_is_an_error() {
    let h = harness();
    assert!(h.worker.dispatch(WorkerEvent::Install).await.is_err());
  }

  #[tokio::test]
  async fn test_product_page_cached_then_served_offline() {
    let h = harness();
    h.fetcher.respond("/product/3", Response::new(200, "kashmiri chilli"));
    assert_eq!(fetch(&h, "/product/3").await.source, ResponseSource::Network);

    h.fetcher.fail("/product/3");
    let served = fetch(&h, "/product/3").await;
    assert_eq!(served.source, ResponseSource::Cache);
    assert_eq!(served.response.text(), "kashmiri chilli");
  }

  #[tokio::test]
  async fn test_post_bypasses_every_strategy() {
    let h = harness();
    h.fetcher.respond("/api/orders", Response::new(201, "created"));

    let request = Request::post_json(url("/api/orders"), &json!({"id": 1})).unwrap();
    let served = h.worker.handle_fetch(&request).await.unwrap();
    assert_eq!(served.source, ResponseSource::Passthrough);
    assert!(h.storage.keys().unwrap().is_empty());

    // Not intercepted means no offline placeholder either
    h.fetcher.fail("/shop");
    let post = Request::new(Method::POST, url("/shop"));
    assert!(h.worker.handle_fetch(&post).await.is_err());
  }

  #[tokio::test]
  async fn test_default_route_revalidates() {
    let h = harness();
    h.fetcher.respond("/recipes", Response::new(200, "v1"));
    let mut first = fetch(&h, "/recipes").await;
    first.settle().await;
    assert_eq!(first.source, ResponseSource::Network);

    h.fetcher.respond("/recipes", Response::new(200, "v2"));
    let mut second = fetch(&h, "/recipes").await;
    assert_eq!(second.response.text(), "v1");
    second.settle().await;

    assert_eq!(fetch(&h, "/recipes").await.response.text(), "v2");
  }

  #[tokio::test]
  async fn test_sync_and_push_dispatch() {
    let h = harness();
    h.records.put("pendingOrders", &json!([{"id": 9}])).unwrap();
    h.fetcher.respond("/api/orders", Response::new(200, "{}"));

    let outcome = h
      .worker
      .dispatch(WorkerEvent::Sync {
        tag: "background-sync-orders".to_string(),
      })
      .await
      .unwrap();
    assert!(matches!(
      outcome,
      EventOutcome::Synced(SyncOutcome::OrdersSynced { sent: 1 })
    ));

    let outcome = h
      .worker
      .dispatch(WorkerEvent::Push {
        payload: Some(br#"{"body":"Sale today!"}"#.to_vec()),
      })
      .await
      .unwrap();
    match outcome {
      EventOutcome::Displayed(n) => assert_eq!(n.body, "Sale today!"),
      other => panic!("unexpected outcome {:?}", other),
    }
  }

  #[tokio::test]
  async fn test_status_reports_partitions_and_records() {
    let h = harness();
    h.storage.open("prayan-static-v1").unwrap();
    h.storage
      .put("prayan-dynamic-v2", &get("/product/1"), &Response::new(200, "x"))
      .unwrap();
    h.records.put("pendingOrders", &json!([{"id": 1}, {"id": 2}])).unwrap();

    let status = h.worker.status().unwrap();
    assert_eq!(
      status.partitions,
      vec![
        PartitionStatus {
          name: "prayan-dynamic-v2".to_string(),
          entries: 1,
          current: true,
        },
        PartitionStatus {
          name: "prayan-static-v1".to_string(),
          entries: 0,
          current: false,
        },
      ]
    );
    assert_eq!(
      status.records,
      vec![("pendingOrders".to_string(), "2 queued".to_string())]
    );
  }
}
