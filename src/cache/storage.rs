//! Cache storage trait and SQLite implementation.

use chrono::{DateTime, Utc};
use color_eyre::{eyre::eyre, Result};
use rusqlite::{params, OptionalExtension};
use std::sync::Arc;

use super::snapshot::{RequestKey, ResponseSnapshot};
use crate::db::Database;

/// Trait for cache bucket backends.
///
/// Every mutation touches a single key, except `put_all` which writes a batch
/// atomically (used for the app shell).
pub trait CacheStorage: Send + Sync {
  /// Names of all existing buckets, sorted.
  fn bucket_names(&self) -> Result<Vec<String>>;

  /// Create the bucket if it does not exist.
  fn open_bucket(&self, bucket: &str) -> Result<()>;

  /// Delete a bucket and all its entries. Returns false if it did not exist.
  fn delete_bucket(&self, bucket: &str) -> Result<bool>;

  /// Store or overwrite a snapshot, creating the bucket if needed.
  fn put(&self, bucket: &str, key: &RequestKey, snapshot: &ResponseSnapshot) -> Result<()>;

  /// Store a batch of snapshots; either all are written or none.
  fn put_all(&self, bucket: &str, entries: &[(RequestKey, ResponseSnapshot)]) -> Result<()>;

  /// Exact-match lookup.
  fn get(&self, bucket: &str, key: &RequestKey) -> Result<Option<ResponseSnapshot>>;

  /// Number of entries in a bucket.
  fn entry_count(&self, bucket: &str) -> Result<usize>;
}

/// SQLite-based cache storage implementation.
pub struct SqliteStorage {
  db: Arc<Database>,
}

impl SqliteStorage {
  pub fn new(db: Arc<Database>) -> Self {
    Self { db }
  }
}

fn insert_entry(
  conn: &rusqlite::Connection,
  bucket: &str,
  key: &RequestKey,
  snapshot: &ResponseSnapshot,
) -> Result<()> {
  let headers = serde_json::to_string(&snapshot.headers)
    .map_err(|e| eyre!("Failed to serialize headers: {}", e))?;

  conn
    .execute(
      "INSERT OR IGNORE INTO cache_buckets (name) VALUES (?)",
      params![bucket],
    )
    .map_err(|e| eyre!("Failed to open bucket {}: {}", bucket, e))?;

  conn
    .execute(
      "INSERT OR REPLACE INTO cache_entries (bucket, request_hash, description, status, headers, body, cached_at)
       VALUES (?, ?, ?, ?, ?, ?, ?)",
      params![
        bucket,
        key.hash(),
        key.description(),
        snapshot.status,
        headers,
        snapshot.body,
        snapshot.cached_at.to_rfc3339(),
      ],
    )
    .map_err(|e| eyre!("Failed to store {}: {}", key.description(), e))?;

  Ok(())
}

impl CacheStorage for SqliteStorage {
  fn bucket_names(&self) -> Result<Vec<String>> {
    let conn = self.db.conn()?;
    let mut stmt = conn
      .prepare("SELECT name FROM cache_buckets ORDER BY name")
      .map_err(|e| eyre!("Failed to prepare query: {}", e))?;

    let names = stmt
      .query_map([], |row| row.get(0))
      .map_err(|e| eyre!("Failed to list buckets: {}", e))?
      .collect::<rusqlite::Result<Vec<String>>>()
      .map_err(|e| eyre!("Failed to read bucket name: {}", e))?;

    Ok(names)
  }

  fn open_bucket(&self, bucket: &str) -> Result<()> {
    let conn = self.db.conn()?;
    conn
      .execute(
        "INSERT OR IGNORE INTO cache_buckets (name) VALUES (?)",
        params![bucket],
      )
      .map_err(|e| eyre!("Failed to open bucket {}: {}", bucket, e))?;
    Ok(())
  }

  fn delete_bucket(&self, bucket: &str) -> Result<bool> {
    let conn = self.db.conn()?;
    let deleted = conn
      .execute("DELETE FROM cache_buckets WHERE name = ?", params![bucket])
      .map_err(|e| eyre!("Failed to delete bucket {}: {}", bucket, e))?;
    Ok(deleted > 0)
  }

  fn put(&self, bucket: &str, key: &RequestKey, snapshot: &ResponseSnapshot) -> Result<()> {
    let conn = self.db.conn()?;
    insert_entry(&conn, bucket, key, snapshot)
  }

  fn put_all(&self, bucket: &str, entries: &[(RequestKey, ResponseSnapshot)]) -> Result<()> {
    let mut conn = self.db.conn()?;
    let tx = conn
      .transaction()
      .map_err(|e| eyre!("Failed to begin transaction: {}", e))?;

    for (key, snapshot) in entries {
      insert_entry(&tx, bucket, key, snapshot)?;
    }

    // An empty batch still leaves the bucket behind
    tx.execute(
      "INSERT OR IGNORE INTO cache_buckets (name) VALUES (?)",
      params![bucket],
    )
    .map_err(|e| eyre!("Failed to open bucket {}: {}", bucket, e))?;

    tx.commit()
      .map_err(|e| eyre!("Failed to commit transaction: {}", e))?;
    Ok(())
  }

  fn get(&self, bucket: &str, key: &RequestKey) -> Result<Option<ResponseSnapshot>> {
    let conn = self.db.conn()?;
    let row: Option<(u16, String, Vec<u8>, String)> = conn
      .query_row(
        "SELECT status, headers, body, cached_at FROM cache_entries
         WHERE bucket = ? AND request_hash = ?",
        params![bucket, key.hash()],
        |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?, row.get(3)?)),
      )
      .optional()
      .map_err(|e| eyre!("Failed to look up {}: {}", key.description(), e))?;

    match row {
      Some((status, headers, body, cached_at)) => {
        let headers = serde_json::from_str(&headers)
          .map_err(|e| eyre!("Failed to deserialize headers: {}", e))?;
        Ok(Some(ResponseSnapshot {
          status,
          headers,
          body,
          cached_at: parse_datetime(&cached_at)?,
        }))
      }
      None => Ok(None),
    }
  }

  fn entry_count(&self, bucket: &str) -> Result<usize> {
    let conn = self.db.conn()?;
    let count: i64 = conn
      .query_row(
        "SELECT COUNT(*) FROM cache_entries WHERE bucket = ?",
        params![bucket],
        |row| row.get(0),
      )
      .map_err(|e| eyre!("Failed to count entries in {}: {}", bucket, e))?;
    Ok(count as usize)
  }
}

/// Parse an RFC 3339 timestamp written by this module.
pub(crate) fn parse_datetime(s: &str) -> Result<DateTime<Utc>> {
  DateTime::parse_from_rfc3339(s)
    .map(|dt| dt.with_timezone(&Utc))
    .map_err(|e| eyre!("Failed to parse datetime '{}': {}", s, e))
}
