//! Notification delivery
//!
//! Every notification is stored first, then pushed to the owner's
//! `notifications.<user_id>` topic for any open sockets.

use std::sync::Arc;
use uuid::Uuid;

use super::hub::ConnectionHub;
use super::messages::WsEvent;
use crate::domain::{Notification, NotificationType};
use crate::storage::{Database, NewNotification, StorageResult};

#[derive(Clone)]
pub struct NotificationService {
    db: Arc<Database>,
    hub: Arc<ConnectionHub>,
}

impl NotificationService {
    pub fn new(db: Arc<Database>, hub: Arc<ConnectionHub>) -> Self {
        Self { db, hub }
    }

    pub fn notify(&self, new: NewNotification) -> StorageResult<Notification> {
        let notification = self.db.create_notification(&new)?;
        tracing::debug!(
            user_id = %notification.user_id,
            notification_type = %notification.notification_type,
            "Notification created"
        );
        self.hub.publish(WsEvent::notification(&notification));
        Ok(notification)
    }

    /// Shorthand for [`notify`](Self::notify)
    pub fn send(
        &self,
        user_id: Uuid,
        notification_type: NotificationType,
        title: impl Into<String>,
        message: impl Into<String>,
        related_id: Option<Uuid>,
    ) -> StorageResult<Notification> {
        self.notify(NewNotification {
            user_id,
            notification_type,
            title: title.into(),
            message: message.into(),
            related_id,
        })
    }
}
