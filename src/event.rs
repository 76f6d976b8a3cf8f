use crate::net::Request;
use crate::push::Notification;

/// Lifecycle events the host delivers to the worker, one at a time.
#[derive(Debug)]
pub enum WorkerEvent {
  /// New version: pre-cache the app shell
  Install,
  /// New version takes control: retire old partitions
  Activate,
  /// Outgoing request to intercept
  Fetch(Request),
  /// Connectivity is back for the given sync tag
  Sync { tag: String },
  /// Push message arrived, with its raw payload if any
  Push { payload: Option<Vec<u8>> },
  /// User clicked the notification body or one of its actions
  NotificationClick {
    notification: Notification,
    action: Option<String>,
  },
  /// User dismissed the notification
  NotificationClose { notification: Notification },
}

impl WorkerEvent {
  pub fn name(&self) -> &'static str {
    match self {
      WorkerEvent::Install => "install",
      WorkerEvent::Activate => "activate",
      WorkerEvent::Fetch(_) => "fetch",
      WorkerEvent::Sync { .. } => "sync",
      WorkerEvent::Push { .. } => "push",
      WorkerEvent::NotificationClick { .. } => "notificationclick",
      WorkerEvent::NotificationClose { .. } => "notificationclose",
    }
  }
}
