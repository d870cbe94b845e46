//! Messaging backend port.
//!
//! The protocol SDK (group creation, message publish/decode, key
//! management) stays behind this narrow surface. The runtime only ever
//! needs to mint identities, open per-inbox sessions, and drive the two
//! event streams plus the one-shot bulk sync.

use crate::error::BackendError;
use crate::types::{AddMemberPolicy, ClientId, ConversationId, DbEncryptionKey, InboxId};
use async_trait::async_trait;
use futures_util::stream::BoxStream;
use std::path::Path;
use std::sync::Arc;

/// A stream of backend events. The subscription handshake is complete once
/// the future producing the stream resolves; items after that are live.
pub type EventStream<T> = BoxStream<'static, Result<T, BackendError>>;

/// An incremental conversation change delivered by the backend.
#[derive(Debug, Clone)]
pub struct RemoteConversationEvent {
    pub conversation_id: ConversationId,
}

/// An incoming message delivered by the backend.
#[derive(Debug, Clone)]
pub struct RemoteMessageEvent {
    pub conversation_id: ConversationId,
    pub sender_inbox_id: InboxId,
    pub is_system: bool,
}

/// Factory surface of the messaging SDK.
#[async_trait]
pub trait MessagingBackend: Send + Sync {
    /// Mint a brand-new inbox identity, open its local encrypted database,
    /// and return a ready session.
    async fn create_inbox(
        &self,
        db_key: &DbEncryptionKey,
        db_directory: &Path,
    ) -> Result<Arc<dyn InboxSession>, BackendError>;

    /// Reopen an existing inbox from its local database.
    async fn open_inbox(
        &self,
        client_id: &ClientId,
        inbox_id: &InboxId,
        db_key: &DbEncryptionKey,
        db_directory: &Path,
    ) -> Result<Arc<dyn InboxSession>, BackendError>;

    /// Tear down an inbox's backend registration and local database.
    async fn delete_inbox(
        &self,
        client_id: &ClientId,
        inbox_id: &InboxId,
    ) -> Result<(), BackendError>;
}

/// A live per-inbox session: the API client plus its open local database.
#[async_trait]
pub trait InboxSession: Send + Sync {
    fn client_id(&self) -> ClientId;

    fn inbox_id(&self) -> InboxId;

    /// One-time full conversation catch-up. Run exactly once per
    /// successful coordinator activation; distinct from the streams.
    async fn sync_all_conversations(&self) -> Result<(), BackendError>;

    /// Subscribe to conversation changes.
    async fn stream_conversations(
        &self,
    ) -> Result<EventStream<RemoteConversationEvent>, BackendError>;

    /// Subscribe to incoming messages.
    async fn stream_messages(&self) -> Result<EventStream<RemoteMessageEvent>, BackendError>;

    /// Sync a single conversation's state with the network.
    async fn sync_conversation(&self, conversation_id: &ConversationId)
    -> Result<(), BackendError>;

    /// Change who may add members to a conversation.
    async fn update_add_member_policy(
        &self,
        conversation_id: &ConversationId,
        policy: AddMemberPolicy,
    ) -> Result<(), BackendError>;

    /// Commit a rotated invite tag for a conversation, invalidating every
    /// outstanding invite minted under the previous tag.
    async fn rotate_invite_tag(
        &self,
        conversation_id: &ConversationId,
        tag: &str,
    ) -> Result<(), BackendError>;

    /// Publish a fresh public invite for the given tag; returns the share
    /// URL slug.
    async fn publish_invite(
        &self,
        conversation_id: &ConversationId,
        tag: &str,
    ) -> Result<String, BackendError>;
}
