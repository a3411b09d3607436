//! Notification sink.
//!
//! The engine emits discrete notify-user events. Delivery (push, e-mail) is
//! somebody else's job; the SQLite sink stores them in the `notifications`
//! table that clients read from.

use async_trait::async_trait;
use chrono::Utc;
use sqlx::SqlitePool;
use uuid::Uuid;

use crate::db::{parse_opt_uuid, parse_status, parse_timestamp, parse_uuid};
use crate::error::Result;
use crate::models::{NewNotification, Notification};

const TABLE: &str = "notifications";

#[async_trait]
pub trait NotificationSink: Send + Sync {
    async fn notify(&self, notification: NewNotification) -> Result<()>;
}

/// Stores notifications in SQLite.
#[derive(Clone)]
pub struct SqliteNotificationSink {
    pool: SqlitePool,
}

#[derive(sqlx::FromRow)]
struct NotificationRow {
    id: String,
    user_id: String,
    title: String,
    message: String,
    #[sqlx(rename = "type")]
    kind: String,
    related_offer_id: Option<String>,
    related_request_id: Option<String>,
    is_read: bool,
    created_at: String,
}

impl TryFrom<NotificationRow> for Notification {
    type Error = crate::error::ShareError;

    fn try_from(row: NotificationRow) -> Result<Self> {
        Ok(Notification {
            id: parse_uuid(TABLE, &row.id)?,
            content: NewNotification {
                user_id: parse_uuid(TABLE, &row.user_id)?,
                title: row.title,
                message: row.message,
                kind: parse_status(TABLE, &row.kind)?,
                related_offer_id: parse_opt_uuid(TABLE, row.related_offer_id.as_deref())?,
                related_request_id: parse_opt_uuid(TABLE, row.related_request_id.as_deref())?,
            },
            is_read: row.is_read,
            created_at: parse_timestamp(&row.created_at),
        })
    }
}

impl SqliteNotificationSink {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Notifications for `user_id`, newest first.
    pub async fn list_for_user(&self, user_id: Uuid, unread_only: bool) -> Result<Vec<Notification>> {
        let sql = if unread_only {
            "SELECT * FROM notifications WHERE user_id = ? AND is_read = 0 ORDER BY created_at DESC"
        } else {
            "SELECT * FROM notifications WHERE user_id = ? ORDER BY created_at DESC"
        };
        let rows: Vec<NotificationRow> = sqlx::query_as(sql)
            .bind(user_id.to_string())
            .fetch_all(&self.pool)
            .await?;
        rows.into_iter().map(Notification::try_from).collect()
    }

    /// Marks every notification of `user_id` as read. Returns how many changed.
    pub async fn mark_all_read(&self, user_id: Uuid) -> Result<u64> {
        let result = sqlx::query("UPDATE notifications SET is_read = 1 WHERE user_id = ? AND is_read = 0")
            .bind(user_id.to_string())
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected())
    }
}

#[async_trait]
impl NotificationSink for SqliteNotificationSink {
    async fn notify(&self, notification: NewNotification) -> Result<()> {
        let id = Uuid::new_v4();
        sqlx::query(
            r#"
            INSERT INTO notifications (id, user_id, title, message, type, related_offer_id, related_request_id, is_read, created_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, 0, ?)
            "#,
        )
        .bind(id.to_string())
        .bind(notification.user_id.to_string())
        .bind(&notification.title)
        .bind(&notification.message)
        .bind(notification.kind.as_str())
        .bind(notification.related_offer_id.map(|id| id.to_string()))
        .bind(notification.related_request_id.map(|id| id.to_string()))
        .bind(Utc::now().to_rfc3339())
        .execute(&self.pool)
        .await?;

        tracing::debug!(
            "Notified {} ({}): {}",
            notification.user_id,
            notification.kind,
            notification.title
        );
        Ok(())
    }
}

/// Only logs. Useful when no one reads notifications.
#[derive(Debug, Clone, Default)]
pub struct TracingNotificationSink;

#[async_trait]
impl NotificationSink for TracingNotificationSink {
    async fn notify(&self, notification: NewNotification) -> Result<()> {
        tracing::info!(
            user = %notification.user_id,
            kind = %notification.kind,
            "{}: {}",
            notification.title,
            notification.message
        );
        Ok(())
    }
}
