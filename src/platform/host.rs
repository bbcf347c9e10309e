use color_eyre::{eyre::eyre, Result};
use rusqlite::{params, OptionalExtension};
use std::sync::Arc;
use tracing::info;
use url::Url;

use super::Platform;
use crate::db::Database;
use crate::lifecycle::LifecycleState;
use crate::push::Notification;
use crate::sync::ActionKind;

/// Host for command-line use.
///
/// Sync registrations are persisted so a later `sync` run can drain them;
/// notifications and window requests are reported through the log.
pub struct HostPlatform {
  db: Arc<Database>,
}

impl HostPlatform {
  pub fn new(db: Arc<Database>) -> Self {
    Self { db }
  }

  /// Tags registered and not yet cleared, oldest first.
  pub fn registered_tags(&self) -> Result<Vec<ActionKind>> {
    let conn = self.db.conn()?;
    let mut stmt = conn
      .prepare("SELECT tag FROM sync_registrations ORDER BY registered_at, tag")
      .map_err(|e| eyre!("Failed to prepare query: {}", e))?;

    let tags = stmt
      .query_map([], |row| row.get(0))
      .map_err(|e| eyre!("Failed to list sync registrations: {}", e))?
      .collect::<rusqlite::Result<Vec<String>>>()
      .map_err(|e| eyre!("Failed to read sync registration: {}", e))?;

    tags
      .iter()
      .map(|tag| {
        tag
          .parse::<ActionKind>()
          .map_err(|e| eyre!("Invalid sync registration: {}", e))
      })
      .collect()
  }

  /// Forget a registration once its queue has been fully drained.
  pub fn clear_registration(&self, tag: ActionKind) -> Result<()> {
    let conn = self.db.conn()?;
    conn
      .execute(
        "DELETE FROM sync_registrations WHERE tag = ?",
        params![tag.tag()],
      )
      .map_err(|e| eyre!("Failed to clear sync registration: {}", e))?;
    Ok(())
  }
}

impl Platform for HostPlatform {
  fn skip_waiting(&self) {
    info!("worker will take control without waiting");
  }

  fn claim_clients(&self) {
    info!("claimed open clients");
  }

  fn register_sync(&self, tag: ActionKind) -> Result<()> {
    let conn = self.db.conn()?;
    conn
      .execute(
        "INSERT OR IGNORE INTO sync_registrations (tag) VALUES (?)",
        params![tag.tag()],
      )
      .map_err(|e| eyre!("Failed to register sync tag {}: {}", tag, e))?;
    info!(%tag, "registered background sync");
    Ok(())
  }

  fn show_notification(&self, notification: &Notification) -> Result<()> {
    let actions: Vec<&str> = notification
      .actions
      .iter()
      .map(|a| a.action.as_str())
      .collect();
    info!(
      title = %notification.title,
      body = %notification.body,
      icon = %notification.icon,
      ?actions,
      "notification shown"
    );
    Ok(())
  }

  fn close_notification(&self, tag: &str) {
    info!(tag, "notification closed");
  }

  fn open_window(&self, url: &Url) -> Result<()> {
    info!(%url, "opening client window");
    Ok(())
  }

  fn lifecycle_state(&self, version: &str) -> Result<Option<LifecycleState>> {
    let conn = self.db.conn()?;
    let state: Option<String> = conn
      .query_row(
        "SELECT state FROM worker_versions WHERE version = ?",
        params![version],
        |row| row.get(0),
      )
      .optional()
      .map_err(|e| eyre!("Failed to read lifecycle of {}: {}", version, e))?;

    state.map(|s| s.parse::<LifecycleState>()).transpose()
  }

  fn record_lifecycle(&self, version: &str, state: LifecycleState) -> Result<()> {
    let conn = self.db.conn()?;
    conn
      .execute(
        "INSERT INTO worker_versions (version, state, updated_at) VALUES (?, ?, datetime('now'))
         ON CONFLICT(version) DO UPDATE SET state = excluded.state, updated_at = excluded.updated_at",
        params![version, state.to_string()],
      )
      .map_err(|e| eyre!("Failed to record lifecycle of {}: {}", version, e))?;
    Ok(())
  }

  fn active_versions(&self) -> Result<Vec<String>> {
    let conn = self.db.conn()?;
    let mut stmt = conn
      .prepare("SELECT version FROM worker_versions WHERE state = 'active' ORDER BY version")
      .map_err(|e| eyre!("Failed to prepare query: {}", e))?;

    let versions = stmt
      .query_map([], |row| row.get(0))
      .map_err(|e| eyre!("Failed to list active versions: {}", e))?
      .collect::<rusqlite::Result<Vec<String>>>()
      .map_err(|e| eyre!("Failed to read version: {}", e))?;

    Ok(versions)
  }
}
