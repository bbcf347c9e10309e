//! Worker lifecycle: install, activate and bucket garbage collection.

use color_eyre::eyre::{eyre, Report};
use futures::future::try_join_all;
use std::fmt;
use std::str::FromStr;
use tracing::info;
use url::Url;

use crate::cache::{BucketNames, CacheStorage, RequestKey, ResponseSnapshot};
use crate::error::WorkerError;
use crate::http::Request;
use crate::platform::Network;

/// Lifecycle states of one worker version.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LifecycleState {
  /// Registered, install not started
  Registered,
  Installing,
  /// Installed, waiting to take control
  Installed,
  Activating,
  /// Serving clients
  Active,
  /// Replaced by a newer version
  Superseded,
  /// Install failed; never takes control
  Redundant,
}

impl fmt::Display for LifecycleState {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    let s = match self {
      LifecycleState::Registered => "registered",
      LifecycleState::Installing => "installing",
      LifecycleState::Installed => "installed",
      LifecycleState::Activating => "activating",
      LifecycleState::Active => "active",
      LifecycleState::Superseded => "superseded",
      LifecycleState::Redundant => "redundant",
    };
    f.write_str(s)
  }
}

impl FromStr for LifecycleState {
  type Err = Report;

  fn from_str(s: &str) -> Result<Self, Self::Err> {
    match s {
      "registered" => Ok(LifecycleState::Registered),
      "installing" => Ok(LifecycleState::Installing),
      "installed" => Ok(LifecycleState::Installed),
      "activating" => Ok(LifecycleState::Activating),
      "active" => Ok(LifecycleState::Active),
      "superseded" => Ok(LifecycleState::Superseded),
      "redundant" => Ok(LifecycleState::Redundant),
      _ => Err(eyre!("Unknown lifecycle state: {}", s)),
    }
  }
}

/// Explicit state machine for one worker version.
#[derive(Debug, Clone)]
pub struct Lifecycle {
  version: String,
  state: LifecycleState,
}

impl Lifecycle {
  pub fn new(version: impl Into<String>) -> Self {
    Self {
      version: version.into(),
      state: LifecycleState::Registered,
    }
  }

  /// Resume from a recorded state. A step interrupted mid-way resumes from
  /// where it started: installing from registered, activating from installed.
  pub fn restore(version: impl Into<String>, state: LifecycleState) -> Self {
    let state = match state {
      LifecycleState::Installing => LifecycleState::Registered,
      LifecycleState::Activating => LifecycleState::Installed,
      other => other,
    };
    Self {
      version: version.into(),
      state,
    }
  }

  pub fn state(&self) -> LifecycleState {
    self.state
  }

  pub fn version(&self) -> &str {
    &self.version
  }

  fn transition(
    &mut self,
    action: &'static str,
    allowed: &[LifecycleState],
    next: LifecycleState,
  ) -> Result<(), WorkerError> {
    if !allowed.contains(&self.state) {
      return Err(WorkerError::InvalidTransition {
        action,
        state: self.state.to_string(),
      });
    }
    info!(version = %self.version, from = %self.state, to = %next, "lifecycle transition");
    self.state = next;
    Ok(())
  }

  /// Installing again after success or failure is allowed; install is
  /// idempotent. A superseded version may be installed again to roll back.
  pub fn begin_install(&mut self) -> Result<(), WorkerError> {
    use LifecycleState::*;
    self.transition(
      "install",
      &[Registered, Installed, Redundant, Superseded],
      Installing,
    )
  }

  pub fn finish_install(&mut self, ok: bool) -> Result<(), WorkerError> {
    use LifecycleState::*;
    let next = if ok { Installed } else { Redundant };
    self.transition("finish install", &[Installing], next)
  }

  pub fn begin_activate(&mut self) -> Result<(), WorkerError> {
    use LifecycleState::*;
    self.transition("activate", &[Installed], Activating)
  }

  /// A failed activation leaves the version installed so it can be retried.
  pub fn finish_activate(&mut self, ok: bool) -> Result<(), WorkerError> {
    use LifecycleState::*;
    let next = if ok { Active } else { Installed };
    self.transition("finish activate", &[Activating], next)
  }

  /// A newer version has claimed this version's clients.
  pub fn supersede(&mut self) -> Result<(), WorkerError> {
    use LifecycleState::*;
    self.transition("supersede", &[Installed, Active], Superseded)
  }
}

/// Pre-cache the app shell into the static bucket.
///
/// Every asset is fetched before anything is written; one failed or non-200
/// asset fails the whole install and leaves storage untouched.
pub async fn install<N: Network, S: CacheStorage>(
  buckets: &BucketNames,
  assets: &[Url],
  network: &N,
  storage: &S,
) -> Result<usize, WorkerError> {
  let fetches = assets.iter().map(|url| async move {
    let request = Request::get(url.clone());
    let response = network
      .fetch(&request)
      .await
      .map_err(|e| WorkerError::InstallationFailed {
        asset: url.to_string(),
        reason: e.to_string(),
      })?;

    if !response.is_ok() {
      return Err(WorkerError::InstallationFailed {
        asset: url.to_string(),
        reason: format!("status {}", response.status),
      });
    }

    Ok((
      RequestKey::for_request(&request),
      ResponseSnapshot::capture(&response),
    ))
  });

  let entries = try_join_all(fetches).await?;

  storage
    .put_all(&buckets.static_name, &entries)
    .map_err(|e| WorkerError::InstallationFailed {
      asset: buckets.static_name.clone(),
      reason: format!("{:#}", e),
    })?;

  info!(bucket = %buckets.static_name, assets = entries.len(), "app shell cached");
  Ok(entries.len())
}

/// Delete every bucket that is not live for this build, then make sure both
/// live buckets exist. Returns the deleted names.
pub fn activate<S: CacheStorage>(
  buckets: &BucketNames,
  storage: &S,
) -> Result<Vec<String>, WorkerError> {
  let mut deleted = Vec::new();

  for name in storage.bucket_names().map_err(WorkerError::storage)? {
    if buckets.is_live(&name) {
      continue;
    }
    if storage.delete_bucket(&name).map_err(WorkerError::storage)? {
      info!(bucket = %name, "deleted stale cache bucket");
      deleted.push(name);
    }
  }

  for name in [&buckets.static_name, &buckets.dynamic_name] {
    storage.open_bucket(name).map_err(WorkerError::storage)?;
  }

  Ok(deleted)
}
