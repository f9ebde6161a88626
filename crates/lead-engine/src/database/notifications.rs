use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use super::{parse_column, SqliteRecordStore};
use crate::clock::{format_timestamp, parse_optional_timestamp, parse_timestamp};
use crate::error::Result;
use crate::store::NotificationStore;
use crate::types::{NewNotification, Notification, NotificationStatus};

const NOTIFICATION_COLUMNS: &str = "id, user_id, agent_id, channel, subject, message, \
     service_request_id, status, read, read_at, created_at";

#[derive(sqlx::FromRow)]
struct NotificationRow {
    id: String,
    user_id: String,
    agent_id: Option<String>,
    channel: String,
    subject: String,
    message: String,
    service_request_id: Option<String>,
    status: String,
    read: bool,
    read_at: Option<String>,
    created_at: String,
}

impl TryFrom<NotificationRow> for Notification {
    type Error = crate::Error;

    fn try_from(row: NotificationRow) -> Result<Self> {
        Ok(Notification {
            channel: parse_column("notifications.channel", &row.channel)?,
            status: parse_column("notifications.status", &row.status)?,
            read_at: parse_optional_timestamp(row.read_at)?,
            created_at: parse_timestamp(&row.created_at)?,
            id: row.id,
            user_id: row.user_id,
            agent_id: row.agent_id,
            subject: row.subject,
            message: row.message,
            service_request_id: row.service_request_id,
            read: row.read,
        })
    }
}

#[async_trait]
impl NotificationStore for SqliteRecordStore {
    async fn create_notification(&self, notification: NewNotification) -> Result<Notification> {
        let record = Notification {
            id: Uuid::new_v4().to_string(),
            user_id: notification.user_id,
            agent_id: notification.agent_id,
            channel: notification.channel,
            subject: notification.subject,
            message: notification.message,
            service_request_id: notification.service_request_id,
            status: NotificationStatus::Pending,
            read: false,
            read_at: None,
            created_at: crate::clock::to_stored_precision(notification.created_at),
        };

        sqlx::query(
            "INSERT INTO notifications (id, user_id, agent_id, channel, subject, message,
                                        service_request_id, status, read, created_at)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, 0, ?)",
        )
        .bind(&record.id)
        .bind(&record.user_id)
        .bind(&record.agent_id)
        .bind(record.channel.as_str())
        .bind(&record.subject)
        .bind(&record.message)
        .bind(&record.service_request_id)
        .bind(record.status.as_str())
        .bind(format_timestamp(record.created_at))
        .execute(self.pool())
        .await?;

        Ok(record)
    }

    async fn list_notifications_for_user(&self, user_id: &str) -> Result<Vec<Notification>> {
        let rows: Vec<NotificationRow> = sqlx::query_as(&format!(
            "SELECT {} FROM notifications WHERE user_id = ? ORDER BY created_at DESC, id",
            NOTIFICATION_COLUMNS
        ))
        .bind(user_id)
        .fetch_all(self.pool())
        .await?;
        rows.into_iter().map(Notification::try_from).collect()
    }

    async fn mark_notification_read(
        &self,
        id: &str,
        user_id: &str,
        at: DateTime<Utc>,
    ) -> Result<bool> {
        let result = sqlx::query(
            "UPDATE notifications
             SET read = 1, read_at = COALESCE(read_at, ?)
             WHERE id = ? AND user_id = ?",
        )
        .bind(format_timestamp(at))
        .bind(id)
        .bind(user_id)
        .execute(self.pool())
        .await?;
        Ok(result.rows_affected() > 0)
    }
}
