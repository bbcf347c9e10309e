//! The worker: event handlers over injected platform capabilities.

use color_eyre::Result;
use std::sync::{Arc, Mutex, MutexGuard};
use tracing::{debug, info, warn};
use url::Url;

use crate::cache::{CacheLayer, CacheResult, CacheStorage};
use crate::config::Config;
use crate::error::WorkerError;
use crate::event::{EventOutcome, WorkerEvent};
use crate::http::{Method, Request, Response};
use crate::lifecycle::{self, Lifecycle, LifecycleState};
use crate::platform::{Network, NetworkError, Platform};
use crate::push::PushHandler;
use crate::router::Router;
use crate::sync::{ActionKind, PendingStore, SyncQueue, SyncReport};

pub struct Worker<N: Network, S: CacheStorage, Q: PendingStore, P: Platform> {
  config: Config,
  lifecycle: Mutex<Lifecycle>,
  network: Arc<N>,
  storage: Arc<S>,
  router: Router<N, S>,
  queue: SyncQueue<N, Q>,
  push: PushHandler,
  platform: Arc<P>,
  shell_assets: Vec<Url>,
}

impl<N: Network, S: CacheStorage, Q: PendingStore, P: Platform> Worker<N, S, Q, P> {
  pub fn new(
    config: Config,
    network: Arc<N>,
    storage: Arc<S>,
    pending: Arc<Q>,
    platform: Arc<P>,
  ) -> Result<Self> {
    let shell_assets = config
      .shell_assets
      .iter()
      .map(|asset| config.resolve(asset))
      .collect::<Result<Vec<_>>>()?;

    let cache = CacheLayer::new(Arc::clone(&storage), config.buckets());
    let router = Router::new(
      config.router.clone(),
      config.resolve(&config.router.shell_document)?,
      Arc::clone(&network),
      cache,
    );
    let queue = SyncQueue::new(
      Arc::clone(&network),
      pending,
      config.resolve(&config.sync.message_endpoint)?,
      config.resolve(&config.sync.call_endpoint)?,
    );
    let push = PushHandler::new(config.push.clone(), config.resolve(&config.push.view_route)?);

    let lifecycle = match platform.lifecycle_state(&config.version)? {
      Some(state) => Lifecycle::restore(config.version.clone(), state),
      None => Lifecycle::new(config.version.clone()),
    };

    Ok(Self {
      lifecycle: Mutex::new(lifecycle),
      config,
      network,
      storage,
      router,
      queue,
      push,
      platform,
      shell_assets,
    })
  }

  pub fn config(&self) -> &Config {
    &self.config
  }

  pub fn storage(&self) -> &S {
    &self.storage
  }

  pub fn queue(&self) -> &SyncQueue<N, Q> {
    &self.queue
  }

  pub fn state(&self) -> LifecycleState {
    self.lifecycle().map(|l| l.state()).unwrap_or(LifecycleState::Redundant)
  }

  fn lifecycle(&self) -> Result<MutexGuard<'_, Lifecycle>, WorkerError> {
    self
      .lifecycle
      .lock()
      .map_err(|e| WorkerError::Platform(format!("lifecycle lock poisoned: {}", e)))
  }

  /// Apply one transition and record the new state with the host.
  fn advance(
    &self,
    step: impl FnOnce(&mut Lifecycle) -> Result<(), WorkerError>,
  ) -> Result<(), WorkerError> {
    let mut lifecycle = self.lifecycle()?;
    step(&mut lifecycle)?;
    self
      .platform
      .record_lifecycle(lifecycle.version(), lifecycle.state())
      .map_err(WorkerError::platform)
  }

  /// Route a host event to its handler.
  pub async fn dispatch(&self, event: WorkerEvent) -> Result<EventOutcome, WorkerError> {
    match event {
      WorkerEvent::Install => self.on_install().await.map(EventOutcome::Installed),
      WorkerEvent::Activate => self.on_activate().map(EventOutcome::Activated),
      WorkerEvent::Fetch(request) => self.on_fetch(&request).await.map(EventOutcome::Response),
      WorkerEvent::Sync(tag) => self.on_sync(&tag).await.map(EventOutcome::Synced),
      WorkerEvent::Push(data) => self
        .push
        .on_push(data.as_deref(), self.platform.as_ref())
        .map(EventOutcome::Notified)
        .map_err(WorkerError::platform),
      WorkerEvent::NotificationClick { tag, action } => self
        .push
        .on_notification_click(&tag, action.as_deref(), self.platform.as_ref())
        .map(EventOutcome::Clicked)
        .map_err(WorkerError::platform),
    }
  }

  /// Pre-cache the app shell. On failure the version becomes redundant and
  /// any previous version stays in control.
  pub async fn on_install(&self) -> Result<usize, WorkerError> {
    self.advance(Lifecycle::begin_install)?;

    let result = lifecycle::install(
      &self.config.buckets(),
      &self.shell_assets,
      self.network.as_ref(),
      self.storage.as_ref(),
    )
    .await;

    self.advance(|l| l.finish_install(result.is_ok()))?;
    let count = result?;

    self.platform.skip_waiting();
    Ok(count)
  }

  /// Drop stale buckets, retire the versions this one replaces and claim
  /// clients.
  pub fn on_activate(&self) -> Result<Vec<String>, WorkerError> {
    self.advance(Lifecycle::begin_activate)?;

    let result = lifecycle::activate(&self.config.buckets(), self.storage.as_ref());
    self.advance(|l| l.finish_activate(result.is_ok()))?;
    let deleted = result?;

    self.supersede_previous()?;
    self.platform.claim_clients();
    info!(version = %self.config.version, deleted = deleted.len(), "worker active");
    Ok(deleted)
  }

  fn supersede_previous(&self) -> Result<(), WorkerError> {
    let active = self
      .platform
      .active_versions()
      .map_err(WorkerError::platform)?;

    for version in active.into_iter().filter(|v| *v != self.config.version) {
      let mut previous = Lifecycle::restore(version, LifecycleState::Active);
      previous.supersede()?;
      self
        .platform
        .record_lifecycle(previous.version(), previous.state())
        .map_err(WorkerError::platform)?;
    }
    Ok(())
  }

  /// Serve an intercepted request.
  ///
  /// A POST to a replayable endpoint that cannot reach the network is queued
  /// and answered with `202 Accepted`; everything else goes through the router.
  pub async fn on_fetch(&self, request: &Request) -> Result<CacheResult<Response>, WorkerError> {
    let kind = match request.method {
      Method::Post => self.queue.kind_for(&request.url),
      _ => None,
    };

    let Some(kind) = kind else {
      return self.router.handle(request).await;
    };

    match self.network.fetch(request).await {
      Ok(response) => Ok(CacheResult::from_network(response)),
      Err(source) => {
        debug!(%kind, "write failed offline: {}", source);
        self.queue_write(kind, request, source)
      }
    }
  }

  /// Queue an offline write. Only a JSON body can be replayed as sent, so
  /// anything else fails like an unreachable API.
  fn queue_write(
    &self,
    kind: ActionKind,
    request: &Request,
    source: NetworkError,
  ) -> Result<CacheResult<Response>, WorkerError> {
    let payload = match request.json_body() {
      Ok(Some(payload)) => payload,
      Ok(None) => {
        warn!(%kind, "not queueing a write without a body");
        return Err(WorkerError::ApiUnavailable {
          url: request.url.to_string(),
          source,
        });
      }
      Err(e) => {
        warn!(%kind, "not queueing a write with a non-JSON body: {:#}", e);
        return Err(WorkerError::ApiUnavailable {
          url: request.url.to_string(),
          source,
        });
      }
    };

    let action = self.queue.enqueue(kind, payload, self.platform.as_ref())?;
    Ok(CacheResult::queued(Response::json(
      202,
      &serde_json::json!({ "queued": true, "id": action.id }),
    )))
  }

  /// Replay the queue behind a sync tag.
  pub async fn on_sync(&self, tag: &str) -> Result<SyncReport, WorkerError> {
    let kind: ActionKind = tag.parse()?;
    self.queue.drain(kind).await
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::cache::{CacheSource, RequestKey};
  use crate::testing::{
    FakeNetwork, MemoryCacheStorage, MemoryPendingStore, PlatformCall, RecordingPlatform,
  };

  type TestWorker = Worker<FakeNetwork, MemoryCacheStorage, MemoryPendingStore, RecordingPlatform>;

  fn url(path: &str) -> Url {
    Url::parse("http://localhost:3000").unwrap().join(path).unwrap()
  }

  fn worker(network: FakeNetwork) -> TestWorker {
    Worker::new(
      Config::default(),
      Arc::new(network),
      Arc::new(MemoryCacheStorage::default()),
      Arc::new(MemoryPendingStore::default()),
      Arc::new(RecordingPlatform::default()),
    )
    .unwrap()
  }

  fn shell_network() -> FakeNetwork {
    let network = FakeNetwork::default();
    for asset in &Config::default().shell_assets {
      network.respond(url(asset), Response::new(200, format!("asset {}", asset)));
    }
    network
  }

  #[tokio::test]
  async fn test_install_then_activate() {
    let worker = worker(shell_network());
    worker.storage().open_bucket("dialdeck-static-v0").unwrap();

    let count = worker.on_install().await.unwrap();
    assert_eq!(count, Config::default().shell_assets.len());
    assert_eq!(worker.state(), LifecycleState::Installed);

    let deleted = worker.on_activate().unwrap();
    assert_eq!(deleted, vec!["dialdeck-static-v0".to_string()]);
    assert_eq!(worker.state(), LifecycleState::Active);
    assert_eq!(
      worker.platform.calls(),
      vec![PlatformCall::SkipWaiting, PlatformCall::ClaimClients]
    );
  }

  fn versioned_worker(
    version: &str,
    network: Arc<FakeNetwork>,
    storage: Arc<MemoryCacheStorage>,
    platform: Arc<RecordingPlatform>,
  ) -> TestWorker {
    let config = Config {
      version: version.to_string(),
      ..Config::default()
    };
    Worker::new(
      config,
      network,
      storage,
      Arc::new(MemoryPendingStore::default()),
      platform,
    )
    .unwrap()
  }

  #[tokio::test]
  async fn test_waiting_version_activates_later_and_supersedes() {
    let network = Arc::new(shell_network());
    let storage = Arc::new(MemoryCacheStorage::default());
    let platform = Arc::new(RecordingPlatform::default());

    let v1 = versioned_worker("v1", Arc::clone(&network), Arc::clone(&storage), Arc::clone(&platform));
    v1.on_install().await.unwrap();
    v1.on_activate().unwrap();

    // Install v2 and stop while it waits
    let v2 = versioned_worker("v2", Arc::clone(&network), Arc::clone(&storage), Arc::clone(&platform));
    v2.on_install().await.unwrap();
    drop(v2);
    assert_eq!(
      platform.lifecycle_state("v2").unwrap(),
      Some(LifecycleState::Installed)
    );

    // A later run picks up the waiting version and activates it
    let v2 = versioned_worker("v2", network, Arc::clone(&storage), Arc::clone(&platform));
    assert_eq!(v2.state(), LifecycleState::Installed);
    let deleted = v2.on_activate().unwrap();

    assert_eq!(v2.state(), LifecycleState::Active);
    assert_eq!(
      deleted,
      vec!["dialdeck-dynamic-v1".to_string(), "dialdeck-static-v1".to_string()]
    );
    assert_eq!(
      platform.lifecycle_state("v1").unwrap(),
      Some(LifecycleState::Superseded)
    );
    assert_eq!(platform.active_versions().unwrap(), vec!["v2".to_string()]);
  }

  #[tokio::test]
  async fn test_fresh_worker_cannot_activate() {
    let worker = worker(shell_network());
    assert_eq!(worker.state(), LifecycleState::Registered);
    assert!(matches!(
      worker.on_activate(),
      Err(WorkerError::InvalidTransition { .. })
    ));
  }

  #[tokio::test]
  async fn test_failed_install_never_activates() {
    let worker = worker(FakeNetwork::offline());
    let result = worker.dispatch(WorkerEvent::Install).await;

    assert!(matches!(result, Err(WorkerError::InstallationFailed { .. })));
    assert_eq!(worker.state(), LifecycleState::Redundant);
    assert!(worker.on_activate().is_err());
    assert!(worker.platform.calls().is_empty());
  }

  #[tokio::test]
  async fn test_offline_shell_after_install() {
    let worker = worker(shell_network());
    worker.on_install().await.unwrap();
    worker.on_activate().unwrap();
    worker.network.go_offline();

    let result = worker
      .on_fetch(&Request::navigation(url("/numbers/buy")))
      .await
      .unwrap();
    assert_eq!(result.source, CacheSource::Offline);
    assert_eq!(result.data.text(), "asset /index.html");
  }

  // No prior cache and no network: the navigation fails.
  #[tokio::test]
  async fn test_scenario_a_shell_unavailable() {
    let worker = worker(FakeNetwork::offline());
    let result = worker
      .dispatch(WorkerEvent::Fetch(Request::navigation(url("/index.html"))))
      .await;
    assert!(matches!(result, Err(WorkerError::ShellUnavailable { .. })));
  }

  // Messages endpoint offline with nothing cached: synthesized payload.
  #[tokio::test]
  async fn test_scenario_b_offline_messages() {
    let worker = worker(FakeNetwork::offline());
    let outcome = worker
      .dispatch(WorkerEvent::Fetch(Request::get(url("/api/messages"))))
      .await
      .unwrap();

    let EventOutcome::Response(result) = outcome else {
      panic!("expected a response");
    };
    assert_eq!(result.data.status, 200);
    let body: serde_json::Value = serde_json::from_slice(&result.data.body).unwrap();
    assert_eq!(
      body,
      serde_json::json!({
        "messages": [],
        "offline": true,
        "message": Config::default().router.offline_message,
      })
    );
  }

  // Two queued messages; the origin accepts the first and rejects the second.
  #[tokio::test]
  async fn test_scenario_c_partial_sync() {
    let worker = worker(FakeNetwork::offline());
    let send = |text: &str| {
      Request::post_json(url("/api/messages"), &serde_json::json!({ "text": text })).unwrap()
    };

    let first = worker.on_fetch(&send("first")).await.unwrap();
    assert_eq!(first.source, CacheSource::Queued);
    assert_eq!(first.data.status, 202);
    worker.on_fetch(&send("second")).await.unwrap();

    let pending = worker.queue().store().list(ActionKind::SendMessage).unwrap();
    assert_eq!(pending.len(), 2);

    worker.network.go_online();
    worker
      .network
      .push(url("/api/messages"), Ok(Response::new(200, "")));
    worker
      .network
      .push(url("/api/messages"), Ok(Response::new(500, "")));

    let outcome = worker
      .dispatch(WorkerEvent::Sync("send-message".to_string()))
      .await
      .unwrap();
    let EventOutcome::Synced(report) = outcome else {
      panic!("expected a sync report");
    };
    assert_eq!(report.succeeded, 1);

    let remaining = worker.queue().store().list(ActionKind::SendMessage).unwrap();
    assert_eq!(remaining.len(), 1);
    assert_eq!(remaining[0].id, pending[1].id);
    assert_eq!(remaining[0].payload, pending[1].payload);
  }

  #[tokio::test]
  async fn test_queueing_registers_sync_tag() {
    let worker = worker(FakeNetwork::offline());
    let request =
      Request::post_json(url("/api/calls"), &serde_json::json!({ "to": "+15550100" })).unwrap();
    worker.on_fetch(&request).await.unwrap();

    assert_eq!(
      worker.platform.calls(),
      vec![PlatformCall::RegisterSync(ActionKind::MakeCall)]
    );
  }

  #[tokio::test]
  async fn test_offline_write_without_json_body_is_not_queued() {
    let worker = worker(FakeNetwork::offline());
    let mut form = Request::new(Method::Post, url("/api/messages"))
      .with_header("content-type", "application/x-www-form-urlencoded");
    form.body = Some(b"to=%2B15550100&text=hello".to_vec());
    let empty = Request::new(Method::Post, url("/api/calls"));

    let result = worker.on_fetch(&form).await;
    assert!(matches!(result, Err(WorkerError::ApiUnavailable { .. })));
    let result = worker.on_fetch(&empty).await;
    assert!(matches!(result, Err(WorkerError::ApiUnavailable { .. })));

    assert_eq!(worker.queue().store().count(ActionKind::SendMessage).unwrap(), 0);
    assert_eq!(worker.queue().store().count(ActionKind::MakeCall).unwrap(), 0);
    assert!(worker.platform.calls().is_empty());
  }

  #[tokio::test]
  async fn test_online_write_passes_through() {
    let network = FakeNetwork::default();
    network.respond(url("/api/calls"), Response::new(201, "{}"));
    let worker = worker(network);

    let request = Request::post_json(url("/api/calls"), &serde_json::json!({})).unwrap();
    let result = worker.on_fetch(&request).await.unwrap();
    assert_eq!(result.source, CacheSource::Network);
    assert_eq!(result.data.status, 201);
    assert_eq!(worker.queue().store().count(ActionKind::MakeCall).unwrap(), 0);
  }

  #[tokio::test]
  async fn test_unknown_sync_tag() {
    let worker = worker(FakeNetwork::default());
    let result = worker.dispatch(WorkerEvent::Sync("refresh".to_string())).await;
    assert!(matches!(result, Err(WorkerError::UnknownSyncTag(_))));
  }

  #[tokio::test]
  async fn test_concurrent_fetches_are_independent() {
    let network = FakeNetwork::default();
    network.respond(url("/api/numbers"), Response::new(200, "numbers"));
    network.respond(url("/api/analytics"), Response::new(200, "analytics"));
    let worker = worker(network);

    let numbers = Request::get(url("/api/numbers"));
    let analytics = Request::get(url("/api/analytics"));
    let (a, b) = tokio::join!(worker.on_fetch(&numbers), worker.on_fetch(&analytics));
    assert_eq!(a.unwrap().data.body, b"numbers");
    assert_eq!(b.unwrap().data.body, b"analytics");

    let dynamic = &worker.config().buckets().dynamic_name;
    assert!(worker
      .storage()
      .get(dynamic, &RequestKey::for_request(&numbers))
      .unwrap()
      .is_some());
    assert!(worker
      .storage()
      .get(dynamic, &RequestKey::for_request(&analytics))
      .unwrap()
      .is_some());
  }

  #[tokio::test]
  async fn test_push_and_click() {
    let worker = worker(FakeNetwork::default());
    let outcome = worker
      .dispatch(WorkerEvent::Push(Some(b"Incoming call".to_vec())))
      .await
      .unwrap();
    let EventOutcome::Notified(notification) = outcome else {
      panic!("expected a notification");
    };
    assert_eq!(notification.body, "Incoming call");

    let outcome = worker
      .dispatch(WorkerEvent::NotificationClick {
        tag: notification.tag.clone(),
        action: Some("view".to_string()),
      })
      .await
      .unwrap();
    assert!(matches!(outcome, EventOutcome::Clicked(true)));
    assert!(worker
      .platform
      .calls()
      .contains(&PlatformCall::OpenWindow(url("/messages"))));
  }
}
