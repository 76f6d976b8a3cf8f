//! Push notifications: decoding payloads, display, click routing and close analytics.

use async_trait::async_trait;
use chrono::Utc;
use color_eyre::{eyre::eyre, Result};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::sync::Arc;
use url::Url;

use crate::config::{Config, PushConfig};
use crate::net::{Fetcher, Request};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NotificationAction {
  pub action: String,
  pub title: String,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub icon: Option<String>,
}

impl NotificationAction {
  fn new(action: &str, title: &str, icon: &str) -> Self {
    Self {
      action: action.to_string(),
      title: title.to_string(),
      icon: Some(icon.to_string()),
    }
  }
}

/// Data bag attached to a notification.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct NotificationData {
  /// Where a click should take the user
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub url: Option<String>,
  #[serde(flatten)]
  pub extra: Map<String, Value>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Notification {
  pub title: String,
  pub body: String,
  pub icon: Option<String>,
  pub badge: Option<String>,
  pub image: Option<String>,
  pub vibrate: Vec<u32>,
  pub data: NotificationData,
  pub actions: Vec<NotificationAction>,
  pub tag: Option<String>,
  pub require_interaction: bool,
  pub silent: bool,
}

impl Notification {
  /// The template every push starts from.
  pub fn default_template() -> Self {
    let mut extra = Map::new();
    extra.insert(
      "dateOfArrival".to_string(),
      Value::from(Utc::now().timestamp_millis()),
    );
    extra.insert("primaryKey".to_string(), Value::from(1));

    Self {
      title: "Prayan Masale".to_string(),
      body: "New update from Prayan Masale!".to_string(),
      icon: Some("/icons/icon-192x192.png".to_string()),
      badge: Some("/icons/badge-72x72.png".to_string()),
      image: Some("/icons/notification-image.jpg".to_string()),
      vibrate: vec![100, 50, 100],
      data: NotificationData {
        url: Some("/".to_string()),
        extra,
      },
      actions: vec![
        NotificationAction::new("view", "View", "/icons/view-icon.png"),
        NotificationAction::new("close", "Close", "/icons/close-icon.png"),
      ],
      tag: None,
      require_interaction: false,
      silent: false,
    }
  }

  /// Build the notification for a push payload.
  ///
  /// A JSON payload is validated as a partial override and merged over the
  /// template, payload fields winning. Unrecognised fields are logged and
  /// dropped, and a JSON `null` overrides nothing. A payload that is not JSON,
  /// or whose known fields have the wrong shape, keeps the template and shows
  /// the raw payload text as the body.
  pub fn from_payload(payload: Option<&[u8]>) -> Self {
    let mut notification = Self::default_template();

    let Some(raw) = payload.filter(|p| !p.is_empty()) else {
      return notification;
    };

    let parsed = serde_json::from_slice::<Value>(raw).and_then(|value| match value {
      Value::Null => Ok(None),
      value => serde_json::from_value::<NotificationOverride>(value).map(Some),
    });

    match parsed {
      Ok(Some(patch)) => patch.apply(&mut notification),
      Ok(None) => {}
      Err(e) => {
        tracing::info!(error = %e, "push payload is not a notification override, using raw text");
        notification.body = String::from_utf8_lossy(raw).into_owned();
      }
    }

    notification
  }
}

/// Data bag as accepted from a push payload: `url` is mandatory.
#[derive(Debug, Deserialize)]
struct DataOverride {
  url: String,
  #[serde(flatten)]
  extra: Map<String, Value>,
}

/// Fields a push payload may override.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct NotificationOverride {
  title: Option<String>,
  body: Option<String>,
  icon: Option<String>,
  badge: Option<String>,
  image: Option<String>,
  vibrate: Option<Vec<u32>>,
  data: Option<DataOverride>,
  actions: Option<Vec<NotificationAction>>,
  tag: Option<String>,
  require_interaction: Option<bool>,
  silent: Option<bool>,
  #[serde(flatten)]
  unknown: Map<String, Value>,
}

impl NotificationOverride {
  fn apply(self, n: &mut Notification) {
    if !self.unknown.is_empty() {
      let keys: Vec<&str> = self.unknown.keys().map(String::as_str).collect();
      tracing::warn!(fields = ?keys, "ignoring unrecognised push payload fields");
    }
    if let Some(title) = self.title {
      n.title = title;
    }
    if let Some(body) = self.body {
      n.body = body;
    }
    if let Some(icon) = self.icon {
      n.icon = Some(icon);
    }
    if let Some(badge) = self.badge {
      n.badge = Some(badge);
    }
    if let Some(image) = self.image {
      n.image = Some(image);
    }
    if let Some(vibrate) = self.vibrate {
      n.vibrate = vibrate;
    }
    // Shallow: a payload data bag replaces the default one entirely
    if let Some(data) = self.data {
      n.data = NotificationData {
        url: Some(data.url),
        extra: data.extra,
      };
    }
    if let Some(actions) = self.actions {
      n.actions = actions;
    }
    if let Some(tag) = self.tag {
      n.tag = Some(tag);
    }
    if let Some(require_interaction) = self.require_interaction {
      n.require_interaction = require_interaction;
    }
    if let Some(silent) = self.silent {
      n.silent = silent;
    }
  }
}

/// Platform surface that puts a notification on screen.
#[async_trait]
pub trait NotificationSink: Send + Sync {
  async fn show(&self, notification: &Notification) -> Result<()>;
}

/// An open application window.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WindowClient {
  pub id: String,
  pub url: Url,
}

/// Platform surface over the application's open windows.
#[async_trait]
pub trait WindowClients: Send + Sync {
  async fn match_all(&self) -> Result<Vec<WindowClient>>;

  async fn navigate(&self, id: &str, url: &Url) -> Result<()>;

  async fn focus(&self, id: &str) -> Result<()>;

  async fn open_window(&self, url: &Url) -> Result<()>;
}

/// What a notification click led to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClickOutcome {
  /// The "close" action: nothing opened or focused
  Dismissed,
  /// An existing window was navigated and focused
  Focused { client: String, url: Url },
  /// No window was open, a new one was opened
  Opened { url: Url },
}

pub struct PushHandler {
  config: PushConfig,
  origin: Url,
  analytics_url: Url,
  fetcher: Arc<dyn Fetcher>,
  sink: Arc<dyn NotificationSink>,
  clients: Arc<dyn WindowClients>,
}

impl PushHandler {
  pub fn new(
    config: &Config,
    fetcher: Arc<dyn Fetcher>,
    sink: Arc<dyn NotificationSink>,
    clients: Arc<dyn WindowClients>,
  ) -> Result<Self> {
    Ok(Self {
      config: config.push.clone(),
      origin: config.origin_url()?,
      analytics_url: config.resolve(&config.push.analytics_endpoint)?,
      fetcher,
      sink,
      clients,
    })
  }

  /// Decode and display a push. Display must complete; its failure is an error.
  pub async fn handle_push(&self, payload: Option<&[u8]>) -> Result<Notification> {
    tracing::info!(bytes = payload.map(|p| p.len()).unwrap_or(0), "push notification received");

    let notification = Notification::from_payload(payload);
    self
      .sink
      .show(&notification)
      .await
      .map_err(|e| eyre!("Failed to show notification: {}", e))?;

    Ok(notification)
  }

  /// Where a click should land, or `None` for the "close" action.
  pub fn target_url(&self, notification: &Notification, action: Option<&str>) -> Option<String> {
    let url = notification.data.url.clone();
    match action {
      Some("view") => Some(url.unwrap_or_else(|| self.config.view_fallback_url.clone())),
      Some("close") => None,
      _ => Some(url.unwrap_or_else(|| self.config.default_url.clone())),
    }
  }

  /// Route a click: reuse an open window on our origin, or open a new one.
  pub async fn handle_click(
    &self,
    notification: &Notification,
    action: Option<&str>,
  ) -> Result<ClickOutcome> {
    tracing::info!(action = action.unwrap_or(""), "notification clicked");

    let Some(target) = self.target_url(notification, action) else {
      return Ok(ClickOutcome::Dismissed);
    };
    let url = self
      .origin
      .join(&target)
      .map_err(|e| eyre!("Invalid notification url {}: {}", target, e))?;

    let windows = self.clients.match_all().await?;
    if let Some(window) = windows
      .into_iter()
      .find(|w| w.url.origin() == self.origin.origin())
    {
      self.clients.navigate(&window.id, &url).await?;
      self.clients.focus(&window.id).await?;
      return Ok(ClickOutcome::Focused {
        client: window.id,
        url,
      });
    }

    self.clients.open_window(&url).await?;
    Ok(ClickOutcome::Opened { url })
  }

  /// Report the close to analytics. Best effort: returns whether the beacon
  /// was accepted, never fails.
  pub async fn handle_close(&self, notification: &Notification) -> bool {
    tracing::info!(tag = notification.tag.as_deref().unwrap_or(""), "notification closed");

    let beacon = serde_json::json!({
      "notificationId": notification.tag,
      "closedAt": Utc::now().timestamp_millis(),
    });

    let sent = match Request::post_json(self.analytics_url.clone(), &beacon) {
      Ok(request) => self.fetcher.fetch(&request).await,
      Err(e) => Err(e),
    };

    match sent {
      Ok(response) => response.is_success(),
      Err(e) => {
        tracing::debug!(error = %e, "close analytics failed");
        false
      }
    }
  }
}
