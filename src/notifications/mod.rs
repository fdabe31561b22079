use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use sea_orm::{ActiveModelTrait, ColumnTrait, DatabaseConnection, EntityTrait, QueryFilter, Set};
use serde::{Deserialize, Serialize};
use strum::{AsRefStr, Display, EnumString};
use std::sync::Arc;
use thiserror::Error;
use tracing::{info, instrument, warn};
use uuid::Uuid;

use crate::entities::{notification, user};
use crate::entities::user::Role;

/// Read notifications older than this are deleted by housekeeping
pub const READ_RETENTION_DAYS: i64 = 30;

/// Types of notifications
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display, EnumString, AsRefStr,
)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
pub enum NotificationKind {
    ApprovalPending,
    ApprovalApproved,
    ApprovalRejected,
    StockLow,
    DeliveryReceived,
    DamageReported,
    RelocationCompleted,
    SystemAlert,
    Reminder,
}

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display, EnumString, AsRefStr,
)]
#[serde(rename_all = "UPPERCASE")]
#[strum(serialize_all = "UPPERCASE")]
pub enum NotificationPriority {
    Low,
    Medium,
    High,
    Urgent,
}

/// The object a notification points at, e.g. `("request", "REQ-0001")`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RelatedObject {
    pub object_type: String,
    pub object_id: String,
}

impl RelatedObject {
    pub fn new(object_type: impl Into<String>, object_id: impl Into<String>) -> Self {
        Self {
            object_type: object_type.into(),
            object_id: object_id.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewNotification {
    pub user_id: Uuid,
    pub kind: NotificationKind,
    pub title: String,
    pub message: String,
    pub priority: NotificationPriority,
    pub related: Option<RelatedObject>,
}

/// Notification service errors
#[derive(Debug, Error)]
pub enum NotificationError {
    #[error("Database error: {0}")]
    Database(#[from] sea_orm::DbErr),
    #[error("Delivery failed: {0}")]
    Delivery(String),
}

/// Outbound notification channel
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn notify(&self, notification: NewNotification) -> Result<(), NotificationError>;
}

/// Stores notifications in the `notifications` table for the client to fetch.
pub struct DbNotifier {
    db: Arc<DatabaseConnection>,
}

impl DbNotifier {
    pub fn new(db: Arc<DatabaseConnection>) -> Self {
        Self { db }
    }
}

#[async_trait]
impl Notifier for DbNotifier {
    #[instrument(skip(self, notification), fields(user_id = %notification.user_id, kind = %notification.kind))]
    async fn notify(&self, notification: NewNotification) -> Result<(), NotificationError> {
        let (related_type, related_id) = match notification.related {
            Some(r) => (Some(r.object_type), Some(r.object_id)),
            None => (None, None),
        };

        notification::ActiveModel {
            user_id: Set(notification.user_id),
            kind: Set(notification.kind.to_string()),
            title: Set(notification.title),
            message: Set(notification.message),
            priority: Set(notification.priority.to_string()),
            related_object_type: Set(related_type),
            related_object_id: Set(related_id),
            is_read: Set(false),
            ..Default::default()
        }
        .insert(self.db.as_ref())
        .await?;
        Ok(())
    }
}

/// Sends notifications, logging and discarding any failure.
#[derive(Clone)]
pub struct NotificationDispatcher {
    db: Arc<DatabaseConnection>,
    notifier: Arc<dyn Notifier>,
}

impl NotificationDispatcher {
    pub fn new(db: Arc<DatabaseConnection>, notifier: Arc<dyn Notifier>) -> Self {
        Self { db, notifier }
    }

    pub async fn send(&self, notification: NewNotification) {
        let kind = notification.kind;
        let user_id = notification.user_id;
        if let Err(e) = self.notifier.notify(notification).await {
            warn!(%user_id, %kind, error = %e, "notification failed");
        }
    }

    /// Deletes read notifications created at or before `now` minus the
    /// retention period. Returns how many were removed.
    #[instrument(skip(self))]
    pub async fn cleanup_old_notifications(
        &self,
        now: DateTime<Utc>,
    ) -> Result<u64, NotificationError> {
        let cutoff = now - Duration::days(READ_RETENTION_DAYS);
        let deleted = notification::Entity::delete_many()
            .filter(notification::Column::IsRead.eq(true))
            .filter(notification::Column::CreatedAt.lte(cutoff))
            .exec(self.db.as_ref())
            .await?;
        info!(deleted = deleted.rows_affected, %cutoff, "old notifications cleaned up");
        Ok(deleted.rows_affected)
    }

    /// Notifies every active user holding one of `roles`. Returns how many were attempted.
    pub async fn send_to_roles(
        &self,
        roles: &[Role],
        kind: NotificationKind,
        title: &str,
        message: &str,
        priority: NotificationPriority,
        related: Option<RelatedObject>,
    ) -> usize {
        let role_names: Vec<String> = roles.iter().map(|r| r.to_string()).collect();
        let recipients = match user::Entity::find()
            .filter(user::Column::Role.is_in(role_names))
            .filter(user::Column::IsActive.eq(true))
            .all(self.db.as_ref())
            .await
        {
            Ok(users) => users,
            Err(e) => {
                warn!(%kind, error = %e, "could not resolve notification recipients");
                return 0;
            }
        };

        for recipient in &recipients {
            self.send(NewNotification {
                user_id: recipient.id,
                kind,
                title: title.to_string(),
                message: message.to_string(),
                priority,
                related: related.clone(),
            })
            .await;
        }
        recipients.len()
    }
}
