mod cache;
mod config;
mod db;
mod event;
mod host;
mod net;
mod push;
mod router;
mod sync;
#[cfg(test)]
mod test_support;
mod worker;

use clap::{Parser, Subcommand};
use color_eyre::{eyre::eyre, Result};
use reqwest::Method;
use serde_json::Value;
use std::path::{Path, PathBuf};
use std::sync::{Arc, OnceLock};

use crate::cache::SqlitePartitionStore;
use crate::db::{Database, RecordStore, SqliteRecordStore};
use crate::event::WorkerEvent;
use crate::host::HeadlessHost;
use crate::net::{HttpFetcher, Request};
use crate::push::Notification;
use crate::worker::{EventOutcome, Worker};

static LOG_GUARD: OnceLock<tracing_appender::non_blocking::WorkerGuard> = OnceLock::new();

#[derive(Parser, Debug)]
#[command(name = "masale-sw")]
#[command(about = "Offline caching, background sync and push worker for the Prayan Masale storefront")]
#[command(version)]
struct Args {
  /// Path to config file (default: $XDG_CONFIG_HOME/masale-sw/config.yaml)
  #[arg(short, long)]
  config: Option<PathBuf>,

  /// Path to the worker database (default: $XDG_DATA_HOME/masale-sw/worker.db)
  #[arg(long)]
  db: Option<PathBuf>,

  /// Write logs to this file instead of stderr
  #[arg(long)]
  log_file: Option<PathBuf>,

  #[command(subcommand)]
  command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
  /// Pre-cache the application shell for the configured version
  Install,
  /// Retire partitions left over from older versions
  Activate,
  /// Send a request through the worker
  Fetch {
    /// Absolute URL or path on the configured origin
    url: String,
    /// HTTP method (default: GET, or POST when --data is given)
    #[arg(short = 'X', long)]
    method: Option<String>,
    /// JSON body; not allowed on GET or HEAD
    #[arg(short, long)]
    data: Option<String>,
  },
  /// Deliver a background sync signal
  Sync {
    /// e.g. background-sync-orders, background-sync-cart
    tag: String,
  },
  /// Deliver a push message
  Push {
    /// Raw payload, usually JSON
    payload: Option<String>,
  },
  /// Deliver a notification click
  Click {
    /// Action button that was clicked (view, close)
    #[arg(short, long)]
    action: Option<String>,
    /// The notification's data url
    #[arg(short, long)]
    url: Option<String>,
  },
  /// Deliver a notification close
  Close {
    #[arg(short, long)]
    tag: Option<String>,
  },
  /// Stage a record for background sync, as the storefront does while offline
  Stage {
    #[command(subcommand)]
    record: StageCommand,
  },
  /// Show partitions and staged records
  Status,
}

#[derive(Subcommand, Debug)]
enum StageCommand {
  /// Append an order to the pending orders queue
  Order { json: String },
  /// Replace the cart snapshot
  Cart { json: String },
}

fn init_logging(log_file: Option<&Path>) -> Result<()> {
  let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
    .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));

  let (writer, guard, ansi) = match log_file {
    Some(path) => {
      let dir = path.parent().unwrap_or_else(|| Path::new("."));
      let name = path
        .file_name()
        .ok_or_else(|| eyre!("Invalid log file path: {}", path.display()))?;
      std::fs::create_dir_all(dir)
        .map_err(|e| eyre!("Failed to create log directory {}: {}", dir.display(), e))?;
      let (writer, guard) = tracing_appender::non_blocking(tracing_appender::rolling::never(dir, name));
      (writer, guard, false)
    }
    None => {
      let (writer, guard) = tracing_appender::non_blocking(std::io::stderr());
      (writer, guard, true)
    }
  };

  tracing_subscriber::fmt()
    .with_env_filter(env_filter)
    .with_target(false)
    .with_ansi(ansi)
    .with_writer(writer)
    .init();
  let _ = LOG_GUARD.set(guard);

  Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
  color_eyre::install()?;

  let args = Args::parse();
  init_logging(args.log_file.as_deref())?;

  // Load configuration
  let config = config::Config::load(args.config.as_deref())?;

  let db = Arc::new(Database::open(args.db.as_deref())?);
  let storage = Arc::new(SqlitePartitionStore::new(Arc::clone(&db)));
  let records = Arc::new(SqliteRecordStore::new(db));
  let fetcher = Arc::new(HttpFetcher::new(&config.http)?);
  let host = Arc::new(HeadlessHost);

  let worker = Worker::new(
    &config,
    storage,
    records.clone(),
    fetcher,
    host.clone(),
    host,
  )?;

  let event = match args.command {
    Command::Install => WorkerEvent::Install,
    Command::Activate => WorkerEvent::Activate,
    Command::Fetch { url, method, data } => {
      WorkerEvent::Fetch(build_request(&config, &url, method.as_deref(), data.as_deref())?)
    }
    Command::Sync { tag } => WorkerEvent::Sync { tag },
    Command::Push { payload } => WorkerEvent::Push {
      payload: payload.map(String::into_bytes),
    },
    Command::Click { action, url } => {
      let mut notification = Notification::default_template();
      notification.data.url = url;
      WorkerEvent::NotificationClick {
        notification,
        action,
      }
    }
    Command::Close { tag } => {
      let mut notification = Notification::default_template();
      notification.tag = tag;
      WorkerEvent::NotificationClose { notification }
    }
    Command::Stage { record } => {
      return stage(records.as_ref(), &config.sync, record);
    }
    Command::Status => {
      let status = worker.status()?;
      for p in &status.partitions {
        let marker = if p.current { "*" } else { " " };
        println!("{} {:<32} {:>6} entries", marker, p.name, p.entries);
      }
      for (key, summary) in &status.records {
        println!("  record {:<25} {}", key, summary);
      }
      return Ok(());
    }
  };

  match worker.dispatch(event).await? {
    EventOutcome::Installed(report) => {
      println!("installed {} entries into {}", report.cached, report.partition);
      println!("skip waiting: {}", report.skip_waiting);
    }
    EventOutcome::Activated(report) => {
      println!("activated, deleted {} old partitions", report.deleted.len());
      println!("clients claimed: {}", report.clients_claimed);
      for name in report.deleted {
        println!("  - {}", name);
      }
    }
    EventOutcome::Fetched(mut served) => {
      println!(
        "{} {} ({:?})",
        served.response.status,
        served.response.header("content-type").unwrap_or("-"),
        served.source
      );
      if let Some(cached_at) = served.cached_at {
        println!("cached at {}", cached_at.to_rfc3339());
      }
      println!("{}", served.response.text());
      // Keep the process alive until the background refresh settles
      served.settle().await;
    }
    EventOutcome::Synced(outcome) => println!("{:?}", outcome),
    EventOutcome::Displayed(notification) => {
      let json = serde_json::to_string_pretty(&notification)
        .map_err(|e| eyre!("Failed to serialize notification: {}", e))?;
      println!("{}", json);
    }
    EventOutcome::Clicked(outcome) => println!("{:?}", outcome),
    EventOutcome::Closed { beacon_sent } => println!("beacon sent: {}", beacon_sent),
  }

  Ok(())
}

fn build_request(
  config: &config::Config,
  target: &str,
  method: Option<&str>,
  data: Option<&str>,
) -> Result<Request> {
  let url = match url::Url::parse(target) {
    Ok(url) => url,
    Err(_) => config.resolve(target)?,
  };
  let method = match method {
    Some(m) => {
      Method::from_bytes(m.to_uppercase().as_bytes()).map_err(|e| eyre!("Invalid method {}: {}", m, e))?
    }
    None if data.is_some() => Method::POST,
    None => Method::GET,
  };
  if data.is_some() && (method == Method::GET || method == Method::HEAD) {
    return Err(eyre!("--data cannot be sent with a {} request", method));
  }

  match data {
    Some(json) => {
      let body: Value =
        serde_json::from_str(json).map_err(|e| eyre!("Invalid JSON body: {}", e))?;
      let mut request = Request::post_json(url, &body)?;
      request.method = method;
      Ok(request)
    }
    None => Ok(Request::new(method, url)),
  }
}

fn stage(records: &dyn RecordStore, sync: &config::SyncConfig, command: StageCommand) -> Result<()> {
  match command {
    StageCommand::Order { json } => {
      let order: Value =
        serde_json::from_str(&json).map_err(|e| eyre!("Invalid order JSON: {}", e))?;
      let mut queue = match records.get(&sync.orders_key)? {
        Some(Value::Array(orders)) => orders,
        None | Some(Value::Null) => Vec::new(),
        Some(_) => return Err(eyre!("Record {} is not a list of orders", sync.orders_key)),
      };
      queue.push(order);
      records.put(&sync.orders_key, &Value::Array(queue.clone()))?;
      println!("{} orders queued under {}", queue.len(), sync.orders_key);
    }
    StageCommand::Cart { json } => {
      let cart: Value = serde_json::from_str(&json).map_err(|e| eyre!("Invalid cart JSON: {}", e))?;
      records.put(&sync.cart_key, &cart)?;
      println!("cart snapshot stored under {}", sync.cart_key);
    }
  }
  Ok(())
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_data_defaults_to_post() {
    let config = config::Config::default();
    let request = build_request(&config, "/api/orders", None, Some(r#"{"id":1}"#)).unwrap();
    assert_eq!(request.method, Method::POST);
    assert_eq!(request.url.as_str(), "http://localhost:5173/api/orders");
    assert!(request.body.is_some());

    let request = build_request(&config, "/shop", None, None).unwrap();
    assert!(request.is_get());
    assert!(request.body.is_none());
  }

  #[test]
  fn test_data_on_get_is_rejected() {
    let config = config::Config::default();
    assert!(build_request(&config, "/shop", Some("get"), Some("{}")).is_err());
    assert!(build_request(&config, "/shop", Some("HEAD"), Some("{}")).is_err());

    let request = build_request(&config, "/api/cart/sync", Some("put"), Some("{}")).unwrap();
    assert_eq!(request.method, Method::PUT);
  }
}
