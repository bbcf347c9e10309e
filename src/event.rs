use crate::cache::CacheResult;
use crate::http::{Request, Response};
use crate::push::Notification;
use crate::sync::SyncReport;

/// Events the host dispatches to the worker
#[derive(Debug)]
pub enum WorkerEvent {
  /// New version registered; pre-cache the app shell
  Install,
  /// Take over from the previous version
  Activate,
  /// Intercepted client request
  Fetch(Request),
  /// Connectivity restored for a sync tag
  Sync(String),
  /// Push message with optional payload
  Push(Option<Vec<u8>>),
  /// User clicked a notification or one of its actions
  NotificationClick { tag: String, action: Option<String> },
}

/// What a handled event produced
#[derive(Debug)]
pub enum EventOutcome {
  /// Number of app-shell assets cached
  Installed(usize),
  /// Names of the stale buckets deleted
  Activated(Vec<String>),
  Response(CacheResult<Response>),
  Synced(SyncReport),
  Notified(Notification),
  /// Whether a client window was opened
  Clicked(bool),
}
