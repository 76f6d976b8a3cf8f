//! Test doubles for the network and the host platform.

use async_trait::async_trait;
use color_eyre::{eyre::eyre, Result};
use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;
use url::Url;

use crate::net::{Fetcher, Request, Response};
use crate::push::{Notification, NotificationSink, WindowClient, WindowClients};

pub const ORIGIN: &str = "http://localhost:5173";

/// GET request for a path on the test origin.
pub fn get(path: &str) -> Request {
  Request::get(url(path))
}

pub fn url(path: &str) -> Url {
  Url::parse(ORIGIN).unwrap().join(path).unwrap()
}

#[derive(Debug, Clone)]
pub enum Scripted {
  Respond(Response),
  Fail,
  /// Never completes
  Hang,
}

/// Fetcher answering from a per-path script. Unscripted paths fail as if offline.
///
/// Each path holds a queue of outcomes; the last one repeats once the others are used up.
#[derive(Default)]
pub struct ScriptedFetcher {
  scripts: Mutex<HashMap<String, VecDeque<Scripted>>>,
  calls: Mutex<Vec<Request>>,
}

impl ScriptedFetcher {
  pub fn new() -> Self {
    Self::default()
  }

  pub fn script(&self, path: &str, outcomes: Vec<Scripted>) {
    self
      .scripts
      .lock()
      .unwrap()
      .insert(path.to_string(), outcomes.into());
  }

  pub fn respond(&self, path: &str, response: Response) {
    self.script(path, vec![Scripted::Respond(response)]);
  }

  pub fn fail(&self, path: &str) {
    self.script(path, vec![Scripted::Fail]);
  }

  pub fn hang(&self, path: &str) {
    self.script(path, vec![Scripted::Hang]);
  }

  pub fn calls(&self) -> Vec<Request> {
    self.calls.lock().unwrap().clone()
  }

  pub fn call_count(&self, path: &str) -> usize {
    self
      .calls
      .lock()
      .unwrap()
      .iter()
      .filter(|r| r.url.path() == path)
      .count()
  }

  /// JSON bodies of every call made to `path`, in order.
  pub fn json_bodies(&self, path: &str) -> Vec<serde_json::Value> {
    self
      .calls
      .lock()
      .unwrap()
      .iter()
      .filter(|r| r.url.path() == path)
      .filter_map(|r| r.body.as_ref())
      .map(|b| serde_json::from_slice(b).unwrap())
      .collect()
  }

  fn next_outcome(&self, path: &str) -> Scripted {
    let mut scripts = self.scripts.lock().unwrap();
    match scripts.get_mut(path) {
      Some(queue) if queue.len() > 1 => queue.pop_front().unwrap(),
      Some(queue) => queue.front().cloned().unwrap_or(Scripted::Fail),
      None => Scripted::Fail,
    }
  }
}

#[async_trait]
impl Fetcher for ScriptedFetcher {
  async fn fetch(&self, request: &Request) -> Result<Response> {
    self.calls.lock().unwrap().push(request.clone());
    match self.next_outcome(request.url.path()) {
      Scripted::Respond(response) => Ok(response),
      Scripted::Fail => Err(eyre!("network unreachable: {}", request.url)),
      Scripted::Hang => std::future::pending::<Result<Response>>().await,
    }
  }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WindowAction {
  Navigate(String, String),
  Focus(String),
  Open(String),
}

/// Host recording every notification shown and every window operation.
#[derive(Default)]
pub struct RecordingHost {
  pub windows: Vec<WindowClient>,
  shown: Mutex<Vec<Notification>>,
  actions: Mutex<Vec<WindowAction>>,
}

impl RecordingHost {
  pub fn new() -> Self {
    Self::default()
  }

  pub fn with_window(mut self, id: &str, url: &str) -> Self {
    self.windows.push(WindowClient {
      id: id.to_string(),
      url: Url::parse(url).unwrap(),
    });
    self
  }

  pub fn shown(&self) -> Vec<Notification> {
    self.shown.lock().unwrap().clone()
  }

  pub fn actions(&self) -> Vec<WindowAction> {
    self.actions.lock().unwrap().clone()
  }
}

#[async_trait]
impl NotificationSink for RecordingHost {
  async fn show(&self, notification: &Notification) -> Result<()> {
    self.shown.lock().unwrap().push(notification.clone());
    Ok(())
  }
}

#[async_trait]
impl WindowClients for RecordingHost {
  async fn match_all(&self) -> Result<Vec<WindowClient>> {
    Ok(self.windows.clone())
  }

  async fn navigate(&self, id: &str, url: &Url) -> Result<()> {
    self
      .actions
      .lock()
      .unwrap()
      .push(WindowAction::Navigate(id.to_string(), url.to_string()));
    Ok(())
  }

  async fn focus(&self, id: &str) -> Result<()> {
    self
      .actions
      .lock()
      .unwrap()
      .push(WindowAction::Focus(id.to_string()));
    Ok(())
  }

  async fn open_window(&self, url: &Url) -> Result<()> {
    self
      .actions
      .lock()
      .unwrap()
      .push(WindowAction::Open(url.to_string()));
    Ok(())
  }
}
