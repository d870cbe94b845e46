//! Conversation queries and the narrow writes the core performs.

use super::ts_to_datetime;
use crate::error::RepoError;
use crate::ports::ConversationRepo;
use crate::types::{
    ClientId, Conversation, ConversationId, ConversationMember, InboxId, MemberRole,
};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{FromRow, SqlitePool};

#[derive(FromRow)]
struct ConversationRow {
    id: String,
    client_id: String,
    inbox_id: String,
    name: Option<String>,
    description: Option<String>,
    image_url: Option<String>,
    invite_tag: String,
    is_locked: i64,
    is_draft: i64,
    expires_at: Option<i64>,
    created_at: i64,
}

impl From<ConversationRow> for Conversation {
    fn from(row: ConversationRow) -> Self {
        Conversation {
            id: ConversationId::from(row.id),
            client_id: ClientId::from(row.client_id),
            inbox_id: InboxId::from(row.inbox_id),
            name: row.name,
            description: row.description,
            image_url: row.image_url,
            invite_tag: row.invite_tag,
            is_locked: row.is_locked != 0,
            is_draft: row.is_draft != 0,
            expires_at: row.expires_at.map(ts_to_datetime),
            created_at: ts_to_datetime(row.created_at),
        }
    }
}

const SELECT_SQL: &str = "SELECT id, client_id, inbox_id, name, description, image_url, \
     invite_tag, is_locked, is_draft, expires_at, created_at FROM conversations";

/// SQLite-backed conversation repository.
#[derive(Clone)]
pub struct SqliteConversationRepo {
    pool: SqlitePool,
}

impl SqliteConversationRepo {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Insert a conversation row. Used by the ingest path and tests.
    pub async fn insert(&self, conversation: &Conversation) -> Result<(), RepoError> {
        sqlx::query(
            "INSERT OR REPLACE INTO conversations
             (id, client_id, inbox_id, name, description, image_url,
              invite_tag, is_locked, is_draft, expires_at, created_at)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(conversation.id.as_str())
        .bind(conversation.client_id.as_str())
        .bind(conversation.inbox_id.as_str())
        .bind(&conversation.name)
        .bind(&conversation.description)
        .bind(&conversation.image_url)
        .bind(&conversation.invite_tag)
        .bind(conversation.is_locked as i64)
        .bind(conversation.is_draft as i64)
        .bind(conversation.expires_at.map(|t| t.timestamp()))
        .bind(conversation.created_at.timestamp())
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// Shorthand insert for tests and seeding.
    pub async fn seed_conversation(
        &self,
        id: &str,
        client_id: &str,
        inbox_id: &str,
        invite_tag: &str,
        is_draft: bool,
    ) -> Result<(), RepoError> {
        self.insert(&Conversation {
            id: ConversationId::from(id),
            client_id: ClientId::from(client_id),
            inbox_id: InboxId::from(inbox_id),
            name: None,
            description: None,
            image_url: None,
            invite_tag: invite_tag.to_string(),
            is_locked: false,
            is_draft,
            expires_at: None,
            created_at: Utc::now(),
        })
        .await
    }

    pub async fn add_member(
        &self,
        conversation_id: &ConversationId,
        inbox_id: &InboxId,
        role: MemberRole,
    ) -> Result<(), RepoError> {
        sqlx::query(
            "INSERT OR REPLACE INTO conversation_members (conversation_id, inbox_id, role)
             VALUES (?, ?, ?)",
        )
        .bind(conversation_id.as_str())
        .bind(inbox_id.as_str())
        .bind(role.as_str())
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    pub async fn record_message(
        &self,
        id: &str,
        conversation_id: &str,
        sender_inbox_id: &str,
        is_system: bool,
        sent_at: DateTime<Utc>,
    ) -> Result<(), RepoError> {
        sqlx::query(
            "INSERT INTO messages (id, conversation_id, sender_inbox_id, is_system, sent_at)
             VALUES (?, ?, ?, ?, ?)",
        )
        .bind(id)
        .bind(conversation_id)
        .bind(sender_inbox_id)
        .bind(is_system as i64)
        .bind(sent_at.timestamp())
        .execute(&self.pool)
        .await?;
        Ok(())
    }
}

#[async_trait]
impl ConversationRepo for SqliteConversationRepo {
    async fn fetch(
        &self,
        conversation_id: &ConversationId,
    ) -> Result<Option<Conversation>, RepoError> {
        let sql = format!("{SELECT_SQL} WHERE id = ?");
        let row: Option<ConversationRow> = sqlx::query_as(&sql)
            .bind(conversation_id.as_str())
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.map(Into::into))
    }

    async fn detailed_query(
        &self,
        client_id: &ClientId,
    ) -> Result<Vec<Conversation>, RepoError> {
        let sql = format!("{SELECT_SQL} WHERE client_id = ? ORDER BY created_at DESC");
        let rows: Vec<ConversationRow> = sqlx::query_as(&sql)
            .bind(client_id.as_str())
            .fetch_all(&self.pool)
            .await?;
        Ok(rows.into_iter().map(Into::into).collect())
    }

    async fn members(
        &self,
        conversation_id: &ConversationId,
    ) -> Result<Vec<ConversationMember>, RepoError> {
        let rows: Vec<(String, String)> = sqlx::query_as(
            "SELECT inbox_id, role FROM conversation_members WHERE conversation_id = ?
             ORDER BY inbox_id",
        )
        .bind(conversation_id.as_str())
        .fetch_all(&self.pool)
        .await?;
        Ok(rows
            .into_iter()
            .filter_map(|(inbox_id, role)| {
                MemberRole::parse(&role).map(|role| ConversationMember {
                    inbox_id: InboxId::from(inbox_id),
                    role,
                })
            })
            .collect())
    }

    async fn member_role(
        &self,
        conversation_id: &ConversationId,
        inbox_id: &InboxId,
    ) -> Result<Option<MemberRole>, RepoError> {
        let role: Option<String> = sqlx::query_scalar(
            "SELECT role FROM conversation_members WHERE conversation_id = ? AND inbox_id = ?",
        )
        .bind(conversation_id.as_str())
        .bind(inbox_id.as_str())
        .fetch_optional(&self.pool)
        .await?;
        Ok(role.as_deref().and_then(MemberRole::parse))
    }

    async fn future_expirations(
        &self,
        now: DateTime<Utc>,
    ) -> Result<Vec<(ConversationId, DateTime<Utc>)>, RepoError> {
        let rows: Vec<(String, i64)> = sqlx::query_as(
            "SELECT id, expires_at FROM conversations
             WHERE expires_at IS NOT NULL AND expires_at > ? ORDER BY expires_at",
        )
        .bind(now.timestamp())
        .fetch_all(&self.pool)
        .await?;
        Ok(rows
            .into_iter()
            .map(|(id, ts)| (ConversationId::from(id), ts_to_datetime(ts)))
            .collect())
    }

    async fn update_lock_state(
        &self,
        conversation_id: &ConversationId,
        is_locked: bool,
        invite_tag: &str,
    ) -> Result<(), RepoError> {
        let result = sqlx::query(
            "UPDATE conversations SET is_locked = ?, invite_tag = ? WHERE id = ?",
        )
        .bind(is_locked as i64)
        .bind(invite_tag)
        .bind(conversation_id.as_str())
        .execute(&self.pool)
        .await?;
        if result.rows_affected() == 0 {
            return Err(RepoError::NotFound(conversation_id.to_string()));
        }
        Ok(())
    }

    async fn set_expires_at(
        &self,
        conversation_id: &ConversationId,
        expires_at: DateTime<Utc>,
    ) -> Result<(), RepoError> {
        let result = sqlx::query("UPDATE conversations SET expires_at = ? WHERE id = ?")
            .bind(expires_at.timestamp())
            .bind(conversation_id.as_str())
            .execute(&self.pool)
            .await?;
        if result.rows_affected() == 0 {
            return Err(RepoError::NotFound(conversation_id.to_string()));
        }
        Ok(())
    }

    async fn update_metadata_blob(
        &self,
        conversation_id: &ConversationId,
        blob: &[u8],
    ) -> Result<(), RepoError> {
        sqlx::query("UPDATE conversations SET metadata_blob = ? WHERE id = ?")
            .bind(blob)
            .bind(conversation_id.as_str())
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn delete_for_client(&self, client_id: &ClientId) -> Result<(), RepoError> {
        let mut tx = self.pool.begin().await?;

        sqlx::query(
            "DELETE FROM messages WHERE conversation_id IN
             (SELECT id FROM conversations WHERE client_id = ?)",
        )
        .bind(client_id.as_str())
        .execute(&mut *tx)
        .await?;

        sqlx::query(
            "DELETE FROM conversation_members WHERE conversation_id IN
             (SELECT id FROM conversations WHERE client_id = ?)",
        )
        .bind(client_id.as_str())
        .execute(&mut *tx)
        .await?;

        sqlx::query("DELETE FROM conversations WHERE client_id = ?")
            .bind(client_id.as_str())
            .execute(&mut *tx)
            .await?;

        sqlx::query("DELETE FROM inboxes WHERE client_id = ?")
            .bind(client_id.as_str())
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;
        Ok(())
    }
}
