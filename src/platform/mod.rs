//! Capabilities the host provides to the worker.
//!
//! Handlers are plain async functions over these traits, so the same code runs
//! against the real host (reqwest + SQLite) and against in-memory fakes.

mod host;
mod http;

pub use host::HostPlatform;
pub use http::HttpNetwork;

use color_eyre::Result;
use std::future::Future;
use url::Url;

use crate::http::{Request, Response};
use crate::lifecycle::LifecycleState;
use crate::push::Notification;
use crate::sync::ActionKind;

/// Transport-level failure; an HTTP error status is a response, not an error.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum NetworkError {
  #[error("connection failed: {0}")]
  Connection(String),
  #[error("request timed out")]
  Timeout,
  #[error("invalid request: {0}")]
  InvalidRequest(String),
}

/// Outgoing HTTP.
pub trait Network: Send + Sync {
  /// Issue a single request. Implementations must not retry.
  fn fetch(&self, request: &Request) -> impl Future<Output = Result<Response, NetworkError>> + Send;
}

/// Side effects on the host runtime.
pub trait Platform: Send + Sync {
  /// Take control without waiting for existing clients to close.
  fn skip_waiting(&self);

  /// Serve every open client from this instance.
  fn claim_clients(&self);

  /// Ask the host to fire `tag` once connectivity returns.
  fn register_sync(&self, tag: ActionKind) -> Result<()>;

  fn show_notification(&self, notification: &Notification) -> Result<()>;

  fn close_notification(&self, tag: &str);

  /// Open or focus a client window at `url`.
  fn open_window(&self, url: &Url) -> Result<()>;

  /// Last recorded lifecycle state of `version`, if it was ever registered.
  fn lifecycle_state(&self, version: &str) -> Result<Option<LifecycleState>>;

  fn record_lifecycle(&self, version: &str, state: LifecycleState) -> Result<()>;

  /// Versions currently recorded as active.
  fn active_versions(&self) -> Result<Vec<String>>;
}
