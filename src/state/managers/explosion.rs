//! Scheduled explosion manager.
//!
//! For each conversation with a committed future expiry, keeps two local
//! alarms registered with the notification center: a reminder one lead
//! interval before the expiry (only when more than the lead remains) and
//! the explosion itself at the expiry. Alarms do not survive cold starts,
//! so the manager re-scans persisted conversations whenever the app
//! returns to the foreground.

use crate::error::RepoError;
use crate::events::ConversationEvent;
use crate::ports::{ConversationRepo, NotificationRequest, UserNotificationCenter};
use crate::types::ConversationId;
use chrono::{DateTime, Duration, Utc};
use std::sync::Arc;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

const EXPLOSION_BODY: &str = "Boom! This conversation has exploded";

/// The reminder text always states the actual lead time, so a tuned
/// `explosion_reminder_lead` never produces a notification that lies
/// about when the explosion lands. The default 1 h lead reads
/// "Will explode in 1h".
fn reminder_body(lead: Duration) -> String {
    let minutes = lead.num_minutes().max(1);
    if minutes % 60 == 0 {
        format!("Will explode in {}h", minutes / 60)
    } else {
        format!("Will explode in {minutes}m")
    }
}

fn reminder_identifier(conversation_id: &ConversationId) -> String {
    format!("explosion-reminder-{conversation_id}")
}

fn explosion_identifier(conversation_id: &ConversationId) -> String {
    format!("explosion-{conversation_id}")
}

/// Deadline-driven local alarms for exploding conversations.
pub struct ScheduledExplosionManager {
    notifications: Arc<dyn UserNotificationCenter>,
    conversations: Arc<dyn ConversationRepo>,
    reminder_lead: Duration,
}

impl ScheduledExplosionManager {
    pub fn new(
        notifications: Arc<dyn UserNotificationCenter>,
        conversations: Arc<dyn ConversationRepo>,
        reminder_lead: Duration,
    ) -> Arc<Self> {
        Arc::new(Self {
            notifications,
            conversations,
            reminder_lead,
        })
    }

    /// Register the alarms for one conversation's expiry.
    pub async fn schedule(&self, conversation_id: &ConversationId, expires_at: DateTime<Utc>) {
        let now = Utc::now();

        if expires_at - now > self.reminder_lead {
            let request = NotificationRequest {
                identifier: reminder_identifier(conversation_id),
                body: reminder_body(self.reminder_lead),
                fire_at: expires_at - self.reminder_lead,
                thread_identifier: conversation_id.to_string(),
                is_explosion_reminder: true,
                is_explosion: false,
            };
            if let Err(e) = self.notifications.add(request).await {
                warn!(conversation_id = %conversation_id, error = %e,
                      "failed to schedule explosion reminder");
            }
        }

        let request = NotificationRequest {
            identifier: explosion_identifier(conversation_id),
            body: EXPLOSION_BODY.to_string(),
            fire_at: expires_at,
            thread_identifier: conversation_id.to_string(),
            is_explosion_reminder: false,
            is_explosion: true,
        };
        match self.notifications.add(request).await {
            Ok(()) => {
                debug!(conversation_id = %conversation_id, expires_at = %expires_at,
                       "explosion alarms scheduled");
            }
            Err(e) => {
                warn!(conversation_id = %conversation_id, error = %e,
                      "failed to schedule explosion alarm");
            }
        }
    }

    /// Cancel both alarms for a conversation.
    pub async fn cancel(&self, conversation_id: &ConversationId) {
        self.notifications
            .remove(&[
                reminder_identifier(conversation_id),
                explosion_identifier(conversation_id),
            ])
            .await;
        debug!(conversation_id = %conversation_id, "explosion alarms cancelled");
    }

    /// Re-scan persisted conversations and reschedule every future expiry.
    /// Run on app foreground: pending alarms are lost on cold start.
    pub async fn reschedule_all(&self) -> Result<(), RepoError> {
        let upcoming = self.conversations.future_expirations(Utc::now()).await?;
        let count = upcoming.len();
        for (conversation_id, expires_at) in upcoming {
            self.schedule(&conversation_id, expires_at).await;
        }
        if count > 0 {
            info!(count, "rescheduled explosion alarms");
        }
        Ok(())
    }

    /// Drive the manager from the event bus and the app-lifecycle signal.
    pub fn spawn(
        self: &Arc<Self>,
        mut events: broadcast::Receiver<ConversationEvent>,
        mut foreground: broadcast::Receiver<()>,
    ) -> JoinHandle<()> {
        let manager = Arc::clone(self);
        tokio::spawn(async move {
            loop {
                tokio::select! {
                    event = events.recv() => match event {
                        Ok(ConversationEvent::ScheduledExplosion { conversation_id, expires_at }) => {
                            manager.schedule(&conversation_id, expires_at).await;
                        }
                        Ok(ConversationEvent::Expired { conversation_id }) => {
                            manager.cancel(&conversation_id).await;
                        }
                        Err(broadcast::error::RecvError::Lagged(missed)) => {
                            warn!(missed, "explosion manager lagged, re-scanning");
                            if let Err(e) = manager.reschedule_all().await {
                                warn!(error = %e, "re-scan after lag failed");
                            }
                        }
                        Err(broadcast::error::RecvError::Closed) => break,
                    },
                    signal = foreground.recv() => match signal {
                        Ok(()) => {
                            if let Err(e) = manager.reschedule_all().await {
                                warn!(error = %e, "foreground re-scan failed");
                            }
                        }
                        Err(broadcast::error::RecvError::Lagged(_)) => continue,
                        Err(broadcast::error::RecvError::Closed) => break,
                    },
                }
            }
        })
    }
}
