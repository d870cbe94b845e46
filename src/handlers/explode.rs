//! Explode-settings processing.
//!
//! An explode message commits a destruction deadline for a conversation.
//! The outcome is a tagged result rather than an error: senders learn
//! whether the request was their own echo, unauthorized, redundant,
//! scheduled for later, or applied immediately.

use crate::error::RepoError;
use crate::events::{ConversationEvent, EventBus};
use crate::ports::ConversationRepo;
use crate::types::{ConversationId, ExplodeSettings, InboxId};
use chrono::{DateTime, Utc};
use std::sync::Arc;
use tracing::{debug, info};

/// Outcome of processing one explode message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExplodeOutcome {
    /// The sender is this inbox; the echo carries nothing new.
    FromSelf,
    /// The sender is not a member, or is a plain member.
    Unauthorized,
    /// The conversation is missing or already carries an expiry.
    AlreadyExpired,
    /// A future deadline was committed.
    Scheduled(DateTime<Utc>),
    /// The deadline was already past; the conversation is expired now.
    Applied,
}

/// Applies explode settings against the local store and the event bus.
pub struct ExplodeProcessor {
    conversations: Arc<dyn ConversationRepo>,
    events: EventBus,
}

impl ExplodeProcessor {
    pub fn new(conversations: Arc<dyn ConversationRepo>, events: EventBus) -> Self {
        Self {
            conversations,
            events,
        }
    }

    /// Process one explode message.
    ///
    /// Authorization requires a privileged role (admin, super-admin, or
    /// creator). An existing expiry wins over everything but authorization:
    /// the first committed deadline is never moved.
    pub async fn process_explode_settings(
        &self,
        settings: &ExplodeSettings,
        conversation_id: &ConversationId,
        sender_inbox_id: &InboxId,
        current_inbox_id: &InboxId,
    ) -> Result<ExplodeOutcome, RepoError> {
        if sender_inbox_id == current_inbox_id {
            return Ok(ExplodeOutcome::FromSelf);
        }

        let Some(conversation) = self.conversations.fetch(conversation_id).await? else {
            debug!(conversation_id = %conversation_id, "explode for unknown conversation");
            return Ok(ExplodeOutcome::AlreadyExpired);
        };

        match self
            .conversations
            .member_role(conversation_id, sender_inbox_id)
            .await?
        {
            Some(role) if role.is_privileged() => {}
            _ => {
                debug!(conversation_id = %conversation_id, sender = %sender_inbox_id,
                       "explode from unprivileged sender");
                return Ok(ExplodeOutcome::Unauthorized);
            }
        }

        if conversation.expires_at.is_some() {
            return Ok(ExplodeOutcome::AlreadyExpired);
        }

        let now = Utc::now();
        self.conversations
            .set_expires_at(conversation_id, settings.expires_at)
            .await?;

        if settings.expires_at > now {
            info!(conversation_id = %conversation_id, expires_at = %settings.expires_at,
                  "explosion scheduled");
            self.events.publish(ConversationEvent::ScheduledExplosion {
                conversation_id: conversation_id.clone(),
                expires_at: settings.expires_at,
            });
            Ok(ExplodeOutcome::Scheduled(settings.expires_at))
        } else {
            info!(conversation_id = %conversation_id, "explosion applied immediately");
            self.events.publish(ConversationEvent::Expired {
                conversation_id: conversation_id.clone(),
            });
            Ok(ExplodeOutcome::Applied)
        }
    }
}
