//! Notification persistence.
//!
//! A store assigns identifiers to incoming notifications, lists the
//! undelivered notifications of a channel and flips their delivered flag.
//! Two backends are provided: an in-memory map and SQLite.

mod backend;
mod memory_backend;
mod sqlite_backend;

use std::sync::Arc;

pub use backend::{NotificationStore, StoreError};
pub use memory_backend::MemoryNotificationStore;
pub use sqlite_backend::{SqliteNotificationStore, SQLITE_MEMORY};

/// Location value that selects the in-memory backend
pub const MEMORY_STORE: &str = "memory";

/// Open a notification store based on its location string.
///
/// - `"memory"`: a `MemoryNotificationStore`
/// - anything else: a `SqliteNotificationStore` at that path (`:memory:` for
///   a private in-memory SQLite database)
pub async fn open_store(location: &str) -> Result<Arc<dyn NotificationStore>, StoreError> {
    let location = location.trim();

    if location == MEMORY_STORE {
        tracing::info!(backend = "memory", "Creating in-memory notification store");
        return Ok(Arc::new(MemoryNotificationStore::new()));
    }

    tracing::info!(
        backend = "sqlite",
        location = %location,
        "Creating SQLite notification store"
    );
    Ok(Arc::new(SqliteNotificationStore::connect(location).await?))
}
