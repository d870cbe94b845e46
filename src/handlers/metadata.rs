//! Conversation metadata writer: lock and unlock.
//!
//! Locking must stay coherent across three places at once: the backend's
//! add-member policy, the local database row, and the public invite. The
//! sequence is fixed: deny policy, rotate the invite tag, sync, update the
//! local row, regenerate the public invite. Member roles are never touched
//! by any step, so the creator's super-admin survives arbitrary
//! lock/unlock cycles.

use crate::codec::{self, CompactMetadata, ProfileEntry};
use crate::error::MetadataError;
use crate::ports::{ConversationRepo, InboxSession};
use crate::types::{AddMemberPolicy, Conversation, ConversationId};
use base64::Engine as _;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use rand::RngCore;
use std::sync::Arc;
use tracing::{debug, info};

/// Length of the random portion of an invite tag, pre-encoding.
const INVITE_TAG_BYTES: usize = 12;

/// Mint a fresh invite tag. Rotating the tag invalidates every
/// outstanding invite minted under the previous one.
pub fn new_invite_tag() -> String {
    let mut bytes = [0u8; INVITE_TAG_BYTES];
    rand::thread_rng().fill_bytes(&mut bytes);
    format!("t-{}", URL_SAFE_NO_PAD.encode(bytes))
}

/// Applies sensitive conversation-level state changes for the inbox that
/// owns the conversation.
pub struct ConversationMetadataWriter {
    conversations: Arc<dyn ConversationRepo>,
}

impl ConversationMetadataWriter {
    pub fn new(conversations: Arc<dyn ConversationRepo>) -> Self {
        Self { conversations }
    }

    /// Lock a conversation: nobody may add members, outstanding invites
    /// are invalidated, and a fresh public invite is published under the
    /// rotated tag. Idempotent on an already-locked conversation.
    pub async fn lock_conversation(
        &self,
        session: &Arc<dyn InboxSession>,
        conversation_id: &ConversationId,
    ) -> Result<(), MetadataError> {
        let conversation = self
            .conversations
            .fetch(conversation_id)
            .await?
            .ok_or_else(|| MetadataError::NotFound(conversation_id.clone()))?;

        if conversation.is_locked {
            debug!(conversation_id = %conversation_id, "already locked");
            return Ok(());
        }

        session
            .update_add_member_policy(conversation_id, AddMemberPolicy::Deny)
            .await?;

        let tag = new_invite_tag();
        session.rotate_invite_tag(conversation_id, &tag).await?;
        session.sync_conversation(conversation_id).await?;

        self.conversations
            .update_lock_state(conversation_id, true, &tag)
            .await?;
        self.refresh_metadata_blob(&conversation, &tag).await?;

        let slug = session.publish_invite(conversation_id, &tag).await?;
        info!(conversation_id = %conversation_id, invite = %slug, "conversation locked");
        Ok(())
    }

    /// Unlock a conversation: members may be added again. The invite tag
    /// is kept; regeneration on unlock is unnecessary because the tag was
    /// already rotated away from anything shared pre-lock.
    pub async fn unlock_conversation(
        &self,
        session: &Arc<dyn InboxSession>,
        conversation_id: &ConversationId,
    ) -> Result<(), MetadataError> {
        let conversation = self
            .conversations
            .fetch(conversation_id)
            .await?
            .ok_or_else(|| MetadataError::NotFound(conversation_id.clone()))?;

        if !conversation.is_locked {
            debug!(conversation_id = %conversation_id, "already unlocked");
            return Ok(());
        }

        session
            .update_add_member_policy(conversation_id, AddMemberPolicy::Allow)
            .await?;
        session.sync_conversation(conversation_id).await?;

        self.conversations
            .update_lock_state(conversation_id, false, &conversation.invite_tag)
            .await?;
        self.refresh_metadata_blob(&conversation, &conversation.invite_tag)
            .await?;

        info!(conversation_id = %conversation_id, "conversation unlocked");
        Ok(())
    }

    /// Rewrite the compact metadata blob after a tag change so wire
    /// payloads and the local row agree.
    async fn refresh_metadata_blob(
        &self,
        conversation: &Conversation,
        invite_tag: &str,
    ) -> Result<(), MetadataError> {
        let members = self.conversations.members(&conversation.id).await?;
        let metadata = CompactMetadata {
            profiles: members
                .into_iter()
                .map(|m| ProfileEntry {
                    inbox_id: m.inbox_id,
                    name: String::new(),
                    avatar_url: None,
                })
                .collect(),
            invite_tag: invite_tag.to_string(),
            expires_at: conversation.expires_at.map(|t| t.timestamp()),
        };
        let blob = codec::encode(&metadata)?;
        self.conversations
            .update_metadata_blob(&conversation.id, &blob)
            .await?;
        Ok(())
    }
}
