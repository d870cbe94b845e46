//! Pending (draft) invite queries.
//!
//! A pending invite is a draft conversation the inbox created but has not
//! yet published. Inboxes holding drafts are preferentially kept awake by
//! the scheduler so the draft can be completed.

use crate::error::RepoError;
use crate::ports::PendingInviteRepo;
use crate::types::{ClientId, ConversationId, InboxId, PendingInviteInfo};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::SqlitePool;

/// SQLite-backed pending-invite repository.
#[derive(Clone)]
pub struct SqliteInviteRepo {
    pool: SqlitePool,
}

impl SqliteInviteRepo {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl PendingInviteRepo for SqliteInviteRepo {
    async fn pending_invites(&self) -> Result<Vec<PendingInviteInfo>, RepoError> {
        let rows: Vec<(String, String, String)> = sqlx::query_as(
            "SELECT client_id, inbox_id, id FROM conversations
             WHERE is_draft = 1 ORDER BY client_id, created_at",
        )
        .fetch_all(&self.pool)
        .await?;

        let mut infos: Vec<PendingInviteInfo> = Vec::new();
        for (client_id, inbox_id, conversation_id) in rows {
            let client_id = ClientId::from(client_id);
            match infos.last_mut() {
                Some(info) if info.client_id == client_id => {
                    info.pending_conversation_ids
                        .push(ConversationId::from(conversation_id));
                }
                _ => infos.push(PendingInviteInfo {
                    client_id,
                    inbox_id: InboxId::from(inbox_id),
                    pending_conversation_ids: vec![ConversationId::from(conversation_id)],
                }),
            }
        }
        Ok(infos)
    }

    async fn has_pending_invites(&self, client_id: &ClientId) -> Result<bool, RepoError> {
        let exists: bool = sqlx::query_scalar(
            "SELECT EXISTS(SELECT 1 FROM conversations WHERE client_id = ? AND is_draft = 1)",
        )
        .bind(client_id.as_str())
        .fetch_one(&self.pool)
        .await?;
        Ok(exists)
    }

    async fn stale_pending_invite_client_ids(
        &self,
        older_than: DateTime<Utc>,
    ) -> Result<Vec<ClientId>, RepoError> {
        let rows: Vec<String> = sqlx::query_scalar(
            "SELECT DISTINCT i.client_id FROM inboxes i
             JOIN conversations c ON c.client_id = i.client_id AND c.is_draft = 1
             WHERE i.created_at < ? ORDER BY i.client_id",
        )
        .bind(older_than.timestamp())
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.into_iter().map(ClientId::from).collect())
    }
}
