//! In-app notifications

use rusqlite::{params, Row};
use uuid::Uuid;

use super::database::{now, parse_col, parse_opt_col, required, ts, Database};
use super::error::{StorageError, StorageResult};
use crate::domain::{Notification, NotificationType};

const NOTIFICATION_COLUMNS: &str =
    "id, user_id, notification_type, title, message, is_read, related_id, created_at";

#[derive(Debug, Clone)]
pub struct NewNotification {
    pub user_id: Uuid,
    pub notification_type: NotificationType,
    pub title: String,
    pub message: String,
    pub related_id: Option<Uuid>,
}

fn notification_from_row(row: &Row<'_>) -> rusqlite::Result<Notification> {
    Ok(Notification {
        id: parse_col(row, 0)?,
        user_id: parse_col(row, 1)?,
        notification_type: parse_col(row, 2)?,
        title: row.get(3)?,
        message: row.get(4)?,
        is_read: row.get(5)?,
        related_id: parse_opt_col(row, 6)?,
        created_at: parse_col(row, 7)?,
    })
}

impl Database {
    pub fn create_notification(&self, new: &NewNotification) -> StorageResult<Notification> {
        let notification = Notification {
            id: Uuid::new_v4(),
            user_id: new.user_id,
            notification_type: new.notification_type,
            title: new.title.clone(),
            message: new.message.clone(),
            is_read: false,
            related_id: new.related_id,
            created_at: now(),
        };
        let conn = self.conn()?;
        conn.execute(
            &format!(
                "INSERT INTO notifications ({NOTIFICATION_COLUMNS}) \
                 VALUES (?1, ?2, ?3, ?4, ?5, 0, ?6, ?7)"
            ),
            params![
                notification.id.to_string(),
                notification.user_id.to_string(),
                notification.notification_type.as_str(),
                notification.title,
                notification.message,
                notification.related_id.map(|id| id.to_string()),
                ts(&notification.created_at),
            ],
        )?;
        Ok(notification)
    }

    pub fn get_notification(&self, id: Uuid) -> StorageResult<Notification> {
        let conn = self.conn()?;
        required(
            conn.query_row(
                &format!("SELECT {NOTIFICATION_COLUMNS} FROM notifications WHERE id = ?1"),
                [id.to_string()],
                notification_from_row,
            ),
            "Notification",
            id,
        )
    }

    /// Newest first
    pub fn list_notifications_for_user(&self, user_id: Uuid) -> StorageResult<Vec<Notification>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(&format!(
            "SELECT {NOTIFICATION_COLUMNS} FROM notifications WHERE user_id = ?1 \
             ORDER BY created_at DESC, rowid DESC"
        ))?;
        let notifications = stmt
            .query_map([user_id.to_string()], notification_from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(notifications)
    }

    pub fn mark_notification_read(&self, id: Uuid) -> StorageResult<()> {
        let conn = self.conn()?;
        let changed = conn.execute(
            "UPDATE notifications SET is_read = 1 WHERE id = ?1",
            [id.to_string()],
        )?;
        if changed == 0 {
            return Err(StorageError::not_found("Notification", id));
        }
        Ok(())
    }

    /// Returns how many notifications changed
    pub fn mark_all_notifications_read(&self, user_id: Uuid) -> StorageResult<usize> {
        let conn = self.conn()?;
        let changed = conn.execute(
            "UPDATE notifications SET is_read = 1 WHERE user_id = ?1 AND is_read = 0",
            [user_id.to_string()],
        )?;
        Ok(changed)
    }

    pub fn unread_notification_count(&self, user_id: Uuid) -> StorageResult<u64> {
        let conn = self.conn()?;
        let count: i64 = conn.query_row(
            "SELECT COUNT(*) FROM notifications WHERE user_id = ?1 AND is_read = 0",
            [user_id.to_string()],
            |row| row.get(0),
        )?;
        Ok(count.max(0) as u64)
    }
}
