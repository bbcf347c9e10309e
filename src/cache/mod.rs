//! Versioned cache buckets and the caching strategies built on them.
//!
//! This module provides:
//! - Request keys (method + URL, exact match) and immutable response snapshots
//! - A storage trait for named buckets, with a SQLite implementation
//! - Cache-first and network-first strategies with offline fallback

mod layer;
mod snapshot;
mod storage;

pub use layer::{BucketNames, CacheLayer};
pub use snapshot::{CacheResult, CacheSource, RequestKey, ResponseSnapshot};
pub use storage::{CacheStorage, SqliteStorage};

pub(crate) use storage::parse_datetime;
