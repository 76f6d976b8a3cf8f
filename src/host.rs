//! Platform surfaces for running the worker from a terminal.

use async_trait::async_trait;
use color_eyre::{eyre::eyre, Result};
use url::Url;

use crate::push::{Notification, NotificationSink, WindowClient, WindowClients};

/// Host without a display: notifications go to the log and there are never
/// open application windows, so clicks always "open" a new one.
#[derive(Debug, Default, Clone)]
pub struct HeadlessHost;

#[async_trait]
impl NotificationSink for HeadlessHost {
  async fn show(&self, notification: &Notification) -> Result<()> {
    tracing::info!(
      title = %notification.title,
      body = %notification.body,
      tag = notification.tag.as_deref().unwrap_or(""),
      "showing notification"
    );
    Ok(())
  }
}

#[async_trait]
impl WindowClients for HeadlessHost {
  async fn match_all(&self) -> Result<Vec<WindowClient>> {
    Ok(Vec::new())
  }

  async fn navigate(&self, id: &str, _url: &Url) -> Result<()> {
    Err(eyre!("No window {} in a headless host", id))
  }

  async fn focus(&self, id: &str) -> Result<()> {
    Err(eyre!("No window {} in a headless host", id))
  }

  async fn open_window(&self, url: &Url) -> Result<()> {
    tracing::info!(url = %url, "open window");
    Ok(())
  }
}
