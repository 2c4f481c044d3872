//! Backend trait for notification storage.
//!
//! The dispatch path relies on two atomic operations from every backend:
//! inserting a notification and flipping its delivered flag exactly once.

use async_trait::async_trait;
use thiserror::Error;

use crate::notification::{Notification, StoredNotification};

/// Errors that can occur during store operations.
#[derive(Debug, Error)]
pub enum StoreError {
    /// SQLite operation failed
    #[error("SQLite error: {0}")]
    Sqlite(#[from] sqlx::Error),

    /// A persisted row could not be mapped back to a notification
    #[error("invalid notification row {id}: {reason}")]
    InvalidRow { id: i64, reason: String },
}

#[async_trait]
pub trait NotificationStore: Send + Sync {
    /// Backend type identifier
    fn backend_name(&self) -> &'static str;

    /// Persist a notification and return it with its assigned identifier.
    async fn insert(&self, notification: Notification) -> Result<StoredNotification, StoreError>;

    async fn get(&self, id: i64) -> Result<Option<StoredNotification>, StoreError>;

    /// Undelivered notifications of one channel, oldest first.
    async fn list_undelivered(&self, channel: &str) -> Result<Vec<StoredNotification>, StoreError>;

    /// Set the delivered flag and update timestamp of every listed notification
    /// that is not delivered yet. Returns how many rows changed.
    async fn mark_delivered(&self, ids: &[i64]) -> Result<u64, StoreError>;
}
