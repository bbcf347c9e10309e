use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

use crate::error::WorkerError;

/// Kind of offline write; doubles as its background sync tag.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ActionKind {
  SendMessage,
  MakeCall,
}

impl ActionKind {
  pub const ALL: [ActionKind; 2] = [ActionKind::SendMessage, ActionKind::MakeCall];

  /// Sync tag registered with the host.
  pub fn tag(&self) -> &'static str {
    match self {
      ActionKind::SendMessage => "send-message",
      ActionKind::MakeCall => "make-call",
    }
  }
}

impl fmt::Display for ActionKind {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(self.tag())
  }
}

impl FromStr for ActionKind {
  type Err = WorkerError;

  fn from_str(s: &str) -> Result<Self, Self::Err> {
    ActionKind::ALL
      .into_iter()
      .find(|kind| kind.tag() == s)
      .ok_or_else(|| WorkerError::UnknownSyncTag(s.to_string()))
  }
}

/// A write made while offline, awaiting replay.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PendingAction {
  pub id: Uuid,
  pub kind: ActionKind,
  /// Body of the original request, replayed verbatim
  pub payload: serde_json::Value,
  pub created_at: DateTime<Utc>,
}

impl PendingAction {
  pub fn new(kind: ActionKind, payload: serde_json::Value) -> Self {
    Self {
      id: Uuid::new_v4(),
      kind,
      payload,
      created_at: Utc::now(),
    }
  }
}
