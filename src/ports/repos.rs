//! Repository ports.
//!
//! Read-through projections over the local relational store. The
//! lifecycle manager rebuilds its entire scheduling state from these at
//! launch; nothing scheduler-side is persisted. Writers (the metadata
//! writer, inbox deletion) go through the same surface using write
//! transactions in the adapter.

use crate::error::RepoError;
use crate::types::{
    ClientId, Conversation, ConversationId, ConversationMember, InboxActivity, InboxId,
    MemberRole, PendingInviteInfo,
};
use async_trait::async_trait;
use chrono::{DateTime, Utc};

/// Activity projections for every known inbox.
#[async_trait]
pub trait InboxActivityRepo: Send + Sync {
    async fn all(&self) -> Result<Vec<InboxActivity>, RepoError>;

    async fn for_client(&self, client_id: &ClientId)
    -> Result<Option<InboxActivity>, RepoError>;

    /// The `n` most recently active inboxes, most recent first. Inboxes
    /// with no activity sort last, newest `created_at` first among them.
    async fn top(&self, n: usize) -> Result<Vec<InboxActivity>, RepoError>;

    /// The least recently active inbox not in `excluding`, if any.
    async fn least_active_excluding(
        &self,
        excluding: &[ClientId],
    ) -> Result<Option<InboxActivity>, RepoError>;
}

/// Pending (draft) invite lookups.
#[async_trait]
pub trait PendingInviteRepo: Send + Sync {
    /// All inboxes holding at least one draft conversation.
    async fn pending_invites(&self) -> Result<Vec<PendingInviteInfo>, RepoError>;

    async fn has_pending_invites(&self, client_id: &ClientId) -> Result<bool, RepoError>;

    /// Clients with drafts whose inbox was created before `older_than`.
    async fn stale_pending_invite_client_ids(
        &self,
        older_than: DateTime<Utc>,
    ) -> Result<Vec<ClientId>, RepoError>;
}

/// Conversation reads and the narrow writes the core performs.
#[async_trait]
pub trait ConversationRepo: Send + Sync {
    async fn fetch(
        &self,
        conversation_id: &ConversationId,
    ) -> Result<Option<Conversation>, RepoError>;

    /// Every conversation belonging to one client, newest first.
    async fn detailed_query(&self, client_id: &ClientId)
    -> Result<Vec<Conversation>, RepoError>;

    async fn members(
        &self,
        conversation_id: &ConversationId,
    ) -> Result<Vec<ConversationMember>, RepoError>;

    async fn member_role(
        &self,
        conversation_id: &ConversationId,
        inbox_id: &InboxId,
    ) -> Result<Option<MemberRole>, RepoError>;

    /// Conversations with a committed future expiry, for alarm re-scans.
    async fn future_expirations(
        &self,
        now: DateTime<Utc>,
    ) -> Result<Vec<(ConversationId, DateTime<Utc>)>, RepoError>;

    async fn update_lock_state(
        &self,
        conversation_id: &ConversationId,
        is_locked: bool,
        invite_tag: &str,
    ) -> Result<(), RepoError>;

    async fn set_expires_at(
        &self,
        conversation_id: &ConversationId,
        expires_at: DateTime<Utc>,
    ) -> Result<(), RepoError>;

    async fn update_metadata_blob(
        &self,
        conversation_id: &ConversationId,
        blob: &[u8],
    ) -> Result<(), RepoError>;

    /// Remove every row belonging to a client (conversations, members,
    /// messages, inbox record). Used by inbox deletion.
    async fn delete_for_client(&self, client_id: &ClientId) -> Result<(), RepoError>;
}
