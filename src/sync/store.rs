//! Durable store for pending actions.

use color_eyre::{eyre::eyre, Result};
use rusqlite::params;
use std::sync::Arc;
use uuid::Uuid;

use super::action::{ActionKind, PendingAction};
use crate::cache::parse_datetime;
use crate::db::Database;

/// Trait for pending-action backends. Only the sync queue writes through it.
pub trait PendingStore: Send + Sync {
  fn insert(&self, action: &PendingAction) -> Result<()>;

  /// Actions of one kind, ordered by creation time (then id).
  fn list(&self, kind: ActionKind) -> Result<Vec<PendingAction>>;

  /// Returns false if no such action existed.
  fn delete(&self, id: Uuid) -> Result<bool>;

  fn count(&self, kind: ActionKind) -> Result<usize>;
}

/// SQLite-based pending-action store.
pub struct SqlitePendingStore {
  db: Arc<Database>,
}

impl SqlitePendingStore {
  pub fn new(db: Arc<Database>) -> Self {
    Self { db }
  }
}

impl PendingStore for SqlitePendingStore {
  fn insert(&self, action: &PendingAction) -> Result<()> {
    let conn = self.db.conn()?;
    let payload = serde_json::to_string(&action.payload)
      .map_err(|e| eyre!("Failed to serialize payload: {}", e))?;

    conn
      .execute(
        "INSERT INTO pending_actions (id, kind, payload, created_at) VALUES (?, ?, ?, ?)",
        params![
          action.id.to_string(),
          action.kind.tag(),
          payload,
          action.created_at.to_rfc3339(),
        ],
      )
      .map_err(|e| eyre!("Failed to store pending action: {}", e))?;

    Ok(())
  }

  fn list(&self, kind: ActionKind) -> Result<Vec<PendingAction>> {
    let conn = self.db.conn()?;
    let mut stmt = conn
      .prepare(
        "SELECT id, payload, created_at FROM pending_actions
         WHERE kind = ?",
      )
      .map_err(|e| eyre!("Failed to prepare query: {}", e))?;

    let rows: Vec<(String, String, String)> = stmt
      .query_map(params![kind.tag()], |row| {
        Ok((row.get(0)?, row.get(1)?, row.get(2)?))
      })
      .map_err(|e| eyre!("Failed to query pending actions: {}", e))?
      .collect::<rusqlite::Result<_>>()
      .map_err(|e| eyre!("Failed to read pending action: {}", e))?;

    let mut actions = rows
      .into_iter()
      .map(|(id, payload, created_at)| {
        Ok(PendingAction {
          id: Uuid::parse_str(&id).map_err(|e| eyre!("Invalid action id '{}': {}", id, e))?,
          kind,
          payload: serde_json::from_str(&payload)
            .map_err(|e| eyre!("Failed to deserialize payload of {}: {}", id, e))?,
          created_at: parse_datetime(&created_at)?,
        })
      })
      .collect::<Result<Vec<_>>>()?;

    // Timestamps are compared as values, not as stored strings
    actions.sort_by(|a, b| a.created_at.cmp(&b.created_at).then(a.id.cmp(&b.id)));
    Ok(actions)
  }

  fn delete(&self, id: Uuid) -> Result<bool> {
    let conn = self.db.conn()?;
    let deleted = conn
      .execute(
        "DELETE FROM pending_actions WHERE id = ?",
        params![id.to_string()],
      )
      .map_err(|e| eyre!("Failed to delete pending action {}: {}", id, e))?;
    Ok(deleted > 0)
  }

  fn count(&self, kind: ActionKind) -> Result<usize> {
    let conn = self.db.conn()?;
    let count: i64 = conn
      .query_row(
        "SELECT COUNT(*) FROM pending_actions WHERE kind = ?",
        params![kind.tag()],
        |row| row.get(0),
      )
      .map_err(|e| eyre!("Failed to count pending actions: {}", e))?;
    Ok(count as usize)
  }
}
