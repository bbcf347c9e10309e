//! Failure taxonomy of the worker's event handlers.

use crate::platform::NetworkError;

/// Errors surfaced by the router, lifecycle and sync handlers.
///
/// Strategy failures (`AssetUnavailable`, `ApiUnavailable`, `ShellUnavailable`,
/// `NetworkUnavailable`) reach the requesting page as ordinary failed fetches.
#[derive(Debug, thiserror::Error)]
pub enum WorkerError {
  #[error("static asset {url} is not cached and the network failed: {source}")]
  AssetUnavailable { url: String, source: NetworkError },

  #[error("API request {url} has no cached response and the network failed: {source}")]
  ApiUnavailable { url: String, source: NetworkError },

  #[error("navigation to {url} failed and no app shell is cached: {source}")]
  ShellUnavailable { url: String, source: NetworkError },

  #[error("request {url} has no cached response and the network failed: {source}")]
  NetworkUnavailable { url: String, source: NetworkError },

  #[error("replay of pending action {id} failed: {reason}")]
  SyncActionFailed { id: String, reason: String },

  #[error("app shell installation failed for {asset}: {reason}")]
  InstallationFailed { asset: String, reason: String },

  #[error("cannot {action} while {state}")]
  InvalidTransition { action: &'static str, state: String },

  #[error("unknown sync tag: {0}")]
  UnknownSyncTag(String),

  #[error("storage error: {0}")]
  Storage(String),

  #[error("platform error: {0}")]
  Platform(String),
}

impl WorkerError {
  /// Wrap a storage report, keeping the full eyre chain in the message.
  pub fn storage(report: color_eyre::Report) -> Self {
    Self::Storage(format!("{:#}", report))
  }

  pub fn platform(report: color_eyre::Report) -> Self {
    Self::Platform(format!("{:#}", report))
  }
}
