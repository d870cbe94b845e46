//! Local notification scheduling port.

use crate::error::NotifyError;
use async_trait::async_trait;
use chrono::{DateTime, Utc};

/// A local alarm request. `identifier` is stable so a pending request can
/// be replaced or cancelled; `thread_identifier` groups alarms with their
/// conversation in the notification UI.
#[derive(Debug, Clone)]
pub struct NotificationRequest {
    pub identifier: String,
    pub body: String,
    pub fire_at: DateTime<Utc>,
    pub thread_identifier: String,
    pub is_explosion_reminder: bool,
    pub is_explosion: bool,
}

#[async_trait]
pub trait UserNotificationCenter: Send + Sync {
    /// Schedule a local alarm. Replaces any pending request with the same
    /// identifier.
    async fn add(&self, request: NotificationRequest) -> Result<(), NotifyError>;

    /// Cancel pending alarms by identifier. Unknown identifiers are
    /// ignored.
    async fn remove(&self, identifiers: &[String]);
}
