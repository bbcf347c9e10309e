//! Durable queue of writes made while offline, replayed on sync triggers.

mod action;
mod queue;
mod store;

pub use action::{ActionKind, PendingAction};
pub use queue::{SyncQueue, SyncReport};
pub use store::{PendingStore, SqlitePendingStore};
