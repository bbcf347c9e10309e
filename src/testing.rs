//! In-memory fakes for the platform capabilities.

use color_eyre::Result;
use std::collections::{BTreeMap, HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;
use url::Url;
use uuid::Uuid;

use crate::cache::{CacheStorage, RequestKey, ResponseSnapshot};
use crate::http::{Request, Response};
use crate::lifecycle::LifecycleState;
use crate::platform::{Network, NetworkError, Platform};
use crate::push::Notification;
use crate::sync::{ActionKind, PendingAction, PendingStore};

/// Scripted network. Per-URL queued results are consumed first, then the
/// fixed response for the URL, then 404. When offline every fetch fails.
#[derive(Default)]
pub struct FakeNetwork {
  offline: AtomicBool,
  fixed: Mutex<HashMap<String, Response>>,
  scripted: Mutex<HashMap<String, VecDeque<Result<Response, NetworkError>>>>,
  requests: Mutex<Vec<Request>>,
}

impl FakeNetwork {
  pub fn offline() -> Self {
    let network = Self::default();
    network.go_offline();
    network
  }

  pub fn go_offline(&self) {
    self.offline.store(true, Ordering::SeqCst);
  }

  pub fn go_online(&self) {
    self.offline.store(false, Ordering::SeqCst);
  }

  /// Always answer `url` with `response`.
  pub fn respond(&self, url: Url, response: Response) {
    self.fixed.lock().unwrap().insert(url.to_string(), response);
  }

  /// Answer the next fetch of `url` with `result`.
  pub fn push(&self, url: Url, result: Result<Response, NetworkError>) {
    self
      .scripted
      .lock()
      .unwrap()
      .entry(url.to_string())
      .or_default()
      .push_back(result);
  }

  pub fn calls(&self) -> usize {
    self.requests.lock().unwrap().len()
  }

  pub fn requests(&self) -> Vec<Request> {
    self.requests.lock().unwrap().clone()
  }
}

impl Network for FakeNetwork {
  async fn fetch(&self, request: &Request) -> Result<Response, NetworkError> {
    self.requests.lock().unwrap().push(request.clone());

    if self.offline.load(Ordering::SeqCst) {
      return Err(NetworkError::Connection("network is offline".to_string()));
    }

    let url = request.url.to_string();
    if let Some(result) = self
      .scripted
      .lock()
      .unwrap()
      .get_mut(&url)
      .and_then(|queue| queue.pop_front())
    {
      return result;
    }

    Ok(
      self
        .fixed
        .lock()
        .unwrap()
        .get(&url)
        .cloned()
        .unwrap_or_else(|| Response::new(404, "not found")),
    )
  }
}

#[derive(Default)]
pub struct MemoryCacheStorage {
  buckets: Mutex<BTreeMap<String, BTreeMap<String, ResponseSnapshot>>>,
}

impl MemoryCacheStorage {
  /// Bodies in a bucket keyed by request hash.
  pub fn bodies(&self, bucket: &str) -> BTreeMap<String, Vec<u8>> {
    self
      .buckets
      .lock()
      .unwrap()
      .get(bucket)
      .map(|entries| {
        entries
          .iter()
          .map(|(k, v)| (k.clone(), v.body.clone()))
          .collect()
      })
      .unwrap_or_default()
  }
}

impl CacheStorage for MemoryCacheStorage {
  fn bucket_names(&self) -> Result<Vec<String>> {
    Ok(self.buckets.lock().unwrap().keys().cloned().collect())
  }

  fn open_bucket(&self, bucket: &str) -> Result<()> {
    self
      .buckets
      .lock()
      .unwrap()
      .entry(bucket.to_string())
      .or_default();
    Ok(())
  }

  fn delete_bucket(&self, bucket: &str) -> Result<bool> {
    Ok(self.buckets.lock().unwrap().remove(bucket).is_some())
  }

  fn put(&self, bucket: &str, key: &RequestKey, snapshot: &ResponseSnapshot) -> Result<()> {
    self.put_all(bucket, &[(key.clone(), snapshot.clone())])
  }

  fn put_all(&self, bucket: &str, entries: &[(RequestKey, ResponseSnapshot)]) -> Result<()> {
    let mut buckets = self.buckets.lock().unwrap();
    let target = buckets.entry(bucket.to_string()).or_default();
    for (key, snapshot) in entries {
      target.insert(key.hash().to_string(), snapshot.clone());
    }
    Ok(())
  }

  fn get(&self, bucket: &str, key: &RequestKey) -> Result<Option<ResponseSnapshot>> {
    Ok(
      self
        .buckets
        .lock()
        .unwrap()
        .get(bucket)
        .and_then(|entries| entries.get(key.hash()))
        .cloned(),
    )
  }

  fn entry_count(&self, bucket: &str) -> Result<usize> {
    Ok(
      self
        .buckets
        .lock()
        .unwrap()
        .get(bucket)
        .map_or(0, |entries| entries.len()),
    )
  }
}

#[derive(Default)]
pub struct MemoryPendingStore {
  actions: Mutex<Vec<PendingAction>>,
}

impl PendingStore for MemoryPendingStore {
  fn insert(&self, action: &PendingAction) -> Result<()> {
    self.actions.lock().unwrap().push(action.clone());
    Ok(())
  }

  fn list(&self, kind: ActionKind) -> Result<Vec<PendingAction>> {
    let mut actions: Vec<PendingAction> = self
      .actions
      .lock()
      .unwrap()
      .iter()
      .filter(|a| a.kind == kind)
      .cloned()
      .collect();
    actions.sort_by(|a, b| a.created_at.cmp(&b.created_at).then(a.id.cmp(&b.id)));
    Ok(actions)
  }

  fn delete(&self, id: Uuid) -> Result<bool> {
    let mut actions = self.actions.lock().unwrap();
    let before = actions.len();
    actions.retain(|a| a.id != id);
    Ok(actions.len() < before)
  }

  fn count(&self, kind: ActionKind) -> Result<usize> {
    Ok(
      self
        .actions
        .lock()
        .unwrap()
        .iter()
        .filter(|a| a.kind == kind)
        .count(),
    )
  }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PlatformCall {
  SkipWaiting,
  ClaimClients,
  RegisterSync(ActionKind),
  ShowNotification(Notification),
  CloseNotification(String),
  OpenWindow(Url),
}

/// Records every platform call in order. Lifecycle records are kept apart
/// from the call log.
#[derive(Default)]
pub struct RecordingPlatform {
  calls: Mutex<Vec<PlatformCall>>,
  versions: Mutex<BTreeMap<String, LifecycleState>>,
}

impl RecordingPlatform {
  pub fn calls(&self) -> Vec<PlatformCall> {
    self.calls.lock().unwrap().clone()
  }

  fn record(&self, call: PlatformCall) {
    self.calls.lock().unwrap().push(call);
  }
}

impl Platform for RecordingPlatform {
  fn skip_waiting(&self) {
    self.record(PlatformCall::SkipWaiting);
  }

  fn claim_clients(&self) {
    self.record(PlatformCall::ClaimClients);
  }

  fn register_sync(&self, tag: ActionKind) -> Result<()> {
    self.record(PlatformCall::RegisterSync(tag));
    Ok(())
  }

  fn show_notification(&self, notification: &Notification) -> Result<()> {
    self.record(PlatformCall::ShowNotification(notification.clone()));
    Ok(())
  }

  fn close_notification(&self, tag: &str) {
    self.record(PlatformCall::CloseNotification(tag.to_string()));
  }

  fn open_window(&self, url: &Url) -> Result<()> {
    self.record(PlatformCall::OpenWindow(url.clone()));
    Ok(())
  }

  fn lifecycle_state(&self, version: &str) -> Result<Option<LifecycleState>> {
    Ok(self.versions.lock().unwrap().get(version).copied())
  }

  fn record_lifecycle(&self, version: &str, state: LifecycleState) -> Result<()> {
    self
      .versions
      .lock()
      .unwrap()
      .insert(version.to_string(), state);
    Ok(())
  }

  fn active_versions(&self) -> Result<Vec<String>> {
    Ok(
      self
        .versions
        .lock()
        .unwrap()
        .iter()
        .filter(|(_, state)| **state == LifecycleState::Active)
        .map(|(version, _)| version.clone())
        .collect(),
    )
  }
}
