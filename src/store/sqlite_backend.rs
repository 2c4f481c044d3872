//! SQLite-based notification store.
//!
//! Notifications live in a single `notifications` table. Tags are stored
//! comma-joined and priorities as their integer codes; `NotificationRow`
//! translates between that representation and the domain type.

use std::str::FromStr;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions};
use sqlx::FromRow;

use crate::notification::{Notification, Priority, StoredNotification};

use super::backend::{NotificationStore, StoreError};

/// Location value that selects a private in-memory SQLite database
pub const SQLITE_MEMORY: &str = ":memory:";

const CREATE_TABLE: &str = r#"
    CREATE TABLE IF NOT EXISTS notifications (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        subject TEXT NOT NULL,
        content TEXT NOT NULL,
        channel TEXT NOT NULL,
        origin TEXT NOT NULL,
        tags TEXT NOT NULL DEFAULT '',
        priority INTEGER NOT NULL,
        created_at INTEGER NOT NULL,
        updated_at INTEGER NOT NULL,
        delivered INTEGER NOT NULL DEFAULT 0
    )
"#;

const CREATE_INDEX: &str = r#"
    CREATE INDEX IF NOT EXISTS idx_notifications_channel_delivered
    ON notifications (channel, delivered)
"#;

/// Persisted shape of a notification
#[derive(Debug, Clone, FromRow)]
struct NotificationRow {
    id: i64,
    subject: String,
    content: String,
    channel: String,
    origin: String,
    tags: String,
    priority: i64,
    created_at: i64,
    updated_at: i64,
    delivered: bool,
}

impl NotificationRow {
    fn into_stored(self) -> Result<StoredNotification, StoreError> {
        let invalid = |reason: String| StoreError::InvalidRow {
            id: self.id,
            reason,
        };

        let priority = Priority::from_code(self.priority)
            .ok_or_else(|| invalid(format!("unknown priority code {}", self.priority)))?;
        let created_at = from_millis(self.created_at)
            .ok_or_else(|| invalid(format!("created_at out of range: {}", self.created_at)))?;
        let updated_at = from_millis(self.updated_at)
            .ok_or_else(|| invalid(format!("updated_at out of range: {}", self.updated_at)))?;

        Ok(StoredNotification {
            id: self.id,
            notification: Notification {
                subject: self.subject,
                content: self.content,
                channel: self.channel,
                origin: self.origin,
                tags: split_tags(&self.tags),
                priority,
                created_at,
                updated_at,
                delivered: self.delivered,
            },
        })
    }
}

fn join_tags(tags: &[String]) -> String {
    tags.join(",")
}

fn split_tags(tags: &str) -> Vec<String> {
    tags.split(',')
        .filter(|tag| !tag.is_empty())
        .map(str::to_string)
        .collect()
}

fn from_millis(millis: i64) -> Option<DateTime<Utc>> {
    DateTime::<Utc>::from_timestamp_millis(millis)
}

/// An in-memory database lives exactly as long as its one connection, so the
/// pool must neither reap nor recycle it.
fn memory_pool_options() -> SqlitePoolOptions {
    SqlitePoolOptions::new()
        .max_connections(1)
        .min_connections(1)
        .idle_timeout(None)
        .max_lifetime(None)
}

/// SQLite notification store.
pub struct SqliteNotificationStore {
    pool: SqlitePool,
}

impl SqliteNotificationStore {
    /// Open (creating if missing) the database at `location` and ensure the table exists.
    ///
    /// `:memory:` opens a private in-memory database on a single connection
    /// that the pool never closes.
    pub async fn connect(location: &str) -> Result<Self, StoreError> {
        let pool = if location == SQLITE_MEMORY {
            memory_pool_options()
                .connect_with(SqliteConnectOptions::from_str("sqlite::memory:")?)
                .await?
        } else {
            let options = SqliteConnectOptions::new()
                .filename(location)
                .create_if_missing(true);
            SqlitePoolOptions::new().connect_with(options).await?
        };

        let store = Self::with_pool(pool).await?;
        tracing::info!(location = %location, "SQLite notification store opened");
        Ok(store)
    }

    /// Wrap an existing pool, creating the table if needed.
    pub async fn with_pool(pool: SqlitePool) -> Result<Self, StoreError> {
        sqlx::query(CREATE_TABLE).execute(&pool).await?;
        sqlx::query(CREATE_INDEX).execute(&pool).await?;
        Ok(Self { pool })
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// Close the pool gracefully.
    pub async fn close(&self) {
        self.pool.close().await;
        tracing::info!("SQLite notification store closed");
    }
}

#[async_trait]
impl NotificationStore for SqliteNotificationStore {
    fn backend_name(&self) -> &'static str {
        "sqlite"
    }

    async fn insert(&self, notification: Notification) -> Result<StoredNotification, StoreError> {
        let result = sqlx::query(
            r#"
            INSERT INTO notifications
                (subject, content, channel, origin, tags, priority, created_at, updated_at, delivered)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&notification.subject)
        .bind(&notification.content)
        .bind(&notification.channel)
        .bind(&notification.origin)
        .bind(join_tags(&notification.tags))
        .bind(notification.priority.as_code())
        .bind(notification.created_at.timestamp_millis())
        .bind(notification.updated_at.timestamp_millis())
        .bind(notification.delivered)
        .execute(&self.pool)
        .await?;

        let id = result.last_insert_rowid();
        tracing::trace!(id = id, channel = %notification.channel, "Notification stored in SQLite");

        Ok(StoredNotification { id, notification })
    }

    async fn get(&self, id: i64) -> Result<Option<StoredNotification>, StoreError> {
        sqlx::query_as::<_, NotificationRow>("SELECT * FROM notifications WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?
            .map(NotificationRow::into_stored)
            .transpose()
    }

    async fn list_undelivered(&self, channel: &str) -> Result<Vec<StoredNotification>, StoreError> {
        let rows = sqlx::query_as::<_, NotificationRow>(
            "SELECT * FROM notifications WHERE channel = ? AND delivered = 0 ORDER BY id",
        )
        .bind(channel)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(NotificationRow::into_stored).collect()
    }

    async fn mark_delivered(&self, ids: &[i64]) -> Result<u64, StoreError> {
        if ids.is_empty() {
            return Ok(0);
        }

        let now = Utc::now().timestamp_millis();
        let mut tx = self.pool.begin().await?;
        let mut updated = 0;

        for id in ids {
            let result = sqlx::query(
                "UPDATE notifications SET delivered = 1, updated_at = ? WHERE id = ? AND delivered = 0",
            )
            .bind(now)
            .bind(id)
            .execute(&mut *tx)
            .await?;
            updated += result.rows_affected();
        }

        tx.commit().await?;
        Ok(updated)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn memory_store() -> SqliteNotificationStore {
        SqliteNotificationStore::connect(SQLITE_MEMORY).await.unwrap()
    }

    fn notification(channel: &str, subject: &str) -> Notification {
        Notification::builder(channel, "origin")
            .subject(subject)
            .content("content abc")
            .tags(["tag1", "tag2"])
            .priority(Priority::Urgent)
            .build()
    }

    #[test]
    fn test_memory_pool_never_drops_its_connection() {
        let options = memory_pool_options();
        assert_eq!(options.get_max_connections(), 1);
        assert_eq!(options.get_min_connections(), 1);
        assert_eq!(options.get_idle_timeout(), None);
        assert_eq!(options.get_max_lifetime(), None);
    }

    #[test]
    fn test_tag_mapping() {
        let tags = vec!["tag1".to_string(), "tag2".to_string()];
        assert_eq!(join_tags(&tags), "tag1,tag2");
        assert_eq!(split_tags("tag1,tag2"), tags);
        assert!(split_tags("").is_empty());
    }

    #[tokio::test]
    async fn test_insert_and_get_round_trip() {
        let store = memory_store().await;
        let stored = store.insert(notification("ops", "subject")).await.unwrap();

        let fetched = store.get(stored.id).await.unwrap().unwrap();
        assert_eq!(fetched.id, stored.id);
        assert_eq!(fetched.notification.subject, "subject");
        assert_eq!(fetched.notification.tags, vec!["tag1".to_string(), "tag2".to_string()]);
        assert_eq!(fetched.notification.priority, Priority::Urgent);
        assert_eq!(
            fetched.notification.created_at.timestamp_millis(),
            stored.notification.created_at.timestamp_millis()
        );
        assert!(!fetched.notification.delivered);

        assert!(store.get(stored.id + 100).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_list_undelivered_and_mark_delivered() {
        let store = memory_store().await;
        let first = store.insert(notification("ops", "a")).await.unwrap();
        let second = store.insert(notification("ops", "b")).await.unwrap();
        store.insert(notification("other", "c")).await.unwrap();

        let pending = store.list_undelivered("ops").await.unwrap();
        let ids: Vec<_> = pending.iter().map(|n| n.id).collect();
        assert_eq!(ids, [first.id, second.id]);

        assert_eq!(store.mark_delivered(&[first.id]).await.unwrap(), 1);
        assert_eq!(store.mark_delivered(&[first.id]).await.unwrap(), 0);

        let pending = store.list_undelivered("ops").await.unwrap();
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].id, second.id);
        assert!(store.get(first.id).await.unwrap().unwrap().notification.delivered);
    }

    #[tokio::test]
    async fn test_invalid_priority_row_is_reported() {
        let store = memory_store().await;
        let stored = store.insert(notification("ops", "a")).await.unwrap();

        sqlx::query("UPDATE notifications SET priority = 7 WHERE id = ?")
            .bind(stored.id)
            .execute(store.pool())
            .await
            .unwrap();

        let err = store.get(stored.id).await.unwrap_err();
        assert!(matches!(err, StoreError::InvalidRow { .. }));
    }

    #[tokio::test]
    async fn test_file_database_persists_across_connections() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("notifications.db");
        let location = path.to_str().unwrap();

        let store = SqliteNotificationStore::connect(location).await.unwrap();
        let stored = store.insert(notification("ops", "a")).await.unwrap();
        store.close().await;

        let reopened = SqliteNotificationStore::connect(location).await.unwrap();
        assert_eq!(reopened.list_undelivered("ops").await.unwrap()[0].id, stored.id);
    }
}
