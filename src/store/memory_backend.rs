//! In-memory notification store using DashMap.
//!
//! Notifications are lost on restart; used for tests and dry runs.

use std::sync::atomic::{AtomicI64, Ordering};

use async_trait::async_trait;
use chrono::Utc;
use dashmap::DashMap;

use crate::notification::{Notification, StoredNotification};

use super::backend::{NotificationStore, StoreError};

/// In-memory notification store.
pub struct MemoryNotificationStore {
    notifications: DashMap<i64, StoredNotification>,
    next_id: AtomicI64,
}

impl MemoryNotificationStore {
    pub fn new() -> Self {
        Self {
            notifications: DashMap::new(),
            next_id: AtomicI64::new(1),
        }
    }

    pub fn len(&self) -> usize {
        self.notifications.len()
    }

    pub fn is_empty(&self) -> bool {
        self.notifications.is_empty()
    }
}

impl Default for MemoryNotificationStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl NotificationStore for MemoryNotificationStore {
    fn backend_name(&self) -> &'static str {
        "memory"
    }

    async fn insert(&self, notification: Notification) -> Result<StoredNotification, StoreError> {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let stored = StoredNotification { id, notification };
        self.notifications.insert(id, stored.clone());

        tracing::trace!(id = id, channel = %stored.channel(), "Notification stored in memory");
        Ok(stored)
    }

    async fn get(&self, id: i64) -> Result<Option<StoredNotification>, StoreError> {
        Ok(self.notifications.get(&id).map(|entry| entry.value().clone()))
    }

    async fn list_undelivered(&self, channel: &str) -> Result<Vec<StoredNotification>, StoreError> {
        let mut pending: Vec<StoredNotification> = self
            .notifications
            .iter()
            .filter(|entry| !entry.notification.delivered && entry.notification.channel == channel)
            .map(|entry| entry.value().clone())
            .collect();
        pending.sort_by_key(|stored| stored.id);
        Ok(pending)
    }

    async fn mark_delivered(&self, ids: &[i64]) -> Result<u64, StoreError> {
        let now = Utc::now();
        let mut updated = 0;

        for id in ids {
            if let Some(mut entry) = self.notifications.get_mut(id) {
                if !entry.notification.delivered {
                    entry.notification.delivered = true;
                    entry.notification.updated_at = now;
                    updated += 1;
                }
            }
        }

        Ok(updated)
    }
}
