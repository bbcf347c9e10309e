//! Background replay of pending actions.

use serde_json::Value;
use std::sync::Arc;
use tracing::{info, warn};
use url::Url;
use uuid::Uuid;

use super::action::{ActionKind, PendingAction};
use super::store::PendingStore;
use crate::error::WorkerError;
use crate::http::Request;
use crate::platform::{Network, Platform};

/// Outcome of one sync trigger for one action kind.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SyncReport {
  pub attempted: usize,
  pub succeeded: usize,
  /// Actions left in place for the next trigger
  pub failed: Vec<Uuid>,
}

impl SyncReport {
  pub fn is_drained(&self) -> bool {
    self.failed.is_empty()
  }
}

/// Sole owner of the pending-action store.
///
/// There is no backoff or retry counter: the host re-firing the sync tag is
/// the retry mechanism. Each replay carries the action id as an
/// `Idempotency-Key` so the origin can discard duplicates.
pub struct SyncQueue<N: Network, Q: PendingStore> {
  network: Arc<N>,
  store: Arc<Q>,
  message_url: Url,
  call_url: Url,
}

impl<N: Network, Q: PendingStore> SyncQueue<N, Q> {
  pub fn new(network: Arc<N>, store: Arc<Q>, message_url: Url, call_url: Url) -> Self {
    Self {
      network,
      store,
      message_url,
      call_url,
    }
  }

  pub fn store(&self) -> &Q {
    &self.store
  }

  /// Origin endpoint that accepts replays of `kind`.
  pub fn endpoint(&self, kind: ActionKind) -> &Url {
    match kind {
      ActionKind::SendMessage => &self.message_url,
      ActionKind::MakeCall => &self.call_url,
    }
  }

  /// The action kind whose endpoint is `url`, if any.
  pub fn kind_for(&self, url: &Url) -> Option<ActionKind> {
    ActionKind::ALL
      .into_iter()
      .find(|kind| same_endpoint(self.endpoint(*kind), url))
  }

  /// Persist a write made while offline and ask the host for a sync.
  pub fn enqueue<P: Platform>(
    &self,
    kind: ActionKind,
    payload: Value,
    platform: &P,
  ) -> Result<PendingAction, WorkerError> {
    let action = PendingAction::new(kind, payload);
    self.store.insert(&action).map_err(WorkerError::storage)?;

    // The action is durable; a later registration will still pick it up
    if let Err(e) = platform.register_sync(kind) {
      warn!(%kind, "failed to register background sync: {:#}", e);
    }

    info!(id = %action.id, %kind, "queued action for background sync");
    Ok(action)
  }

  /// Replay every pending action of `kind`, oldest first.
  ///
  /// Each action is attempted exactly once; a failure leaves that action
  /// queued and does not stop the rest of the batch.
  pub async fn drain(&self, kind: ActionKind) -> Result<SyncReport, WorkerError> {
    let pending = self.store.list(kind).map_err(WorkerError::storage)?;
    let mut report = SyncReport {
      attempted: pending.len(),
      ..SyncReport::default()
    };

    for action in pending {
      match self.replay(&action).await {
        Ok(()) => {
          if let Err(e) = self.store.delete(action.id) {
            warn!(id = %action.id, "replayed action could not be removed: {:#}", e);
          }
          report.succeeded += 1;
        }
        Err(e) => {
          warn!(%kind, "{}", e);
          report.failed.push(action.id);
        }
      }
    }

    info!(
      %kind,
      attempted = report.attempted,
      succeeded = report.succeeded,
      failed = report.failed.len(),
      "sync finished"
    );
    Ok(report)
  }

  async fn replay(&self, action: &PendingAction) -> Result<(), WorkerError> {
    let failed = |reason: String| WorkerError::SyncActionFailed {
      id: action.id.to_string(),
      reason,
    };

    let request = Request::post_json(self.endpoint(action.kind).clone(), &action.payload)
      .map_err(|e| failed(format!("{:#}", e)))?
      .with_header("idempotency-key", &action.id.to_string());

    let response = self
      .network
      .fetch(&request)
      .await
      .map_err(|e| failed(e.to_string()))?;

    if response.is_success() {
      Ok(())
    } else {
      Err(failed(format!("origin returned status {}", response.status)))
    }
  }
}

fn same_endpoint(endpoint: &Url, url: &Url) -> bool {
  endpoint.origin() == url.origin()
    && endpoint.path().trim_end_matches('/') == url.path().trim_end_matches('/')
}
