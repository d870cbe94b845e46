//! Inbox activity projection queries.
//!
//! `last_activity` is the most recent non-system message across all of an
//! inbox's conversations; `None` means nothing but system traffic has ever
//! been observed. `conversation_count` excludes drafts.

use super::ts_to_datetime;
use crate::error::RepoError;
use crate::ports::InboxActivityRepo;
use crate::types::{ClientId, InboxActivity, InboxId};
use async_trait::async_trait;
use sqlx::{FromRow, SqlitePool};

const PROJECTION_SQL: &str = "
    SELECT i.client_id, i.inbox_id, i.created_at,
           (SELECT MAX(m.sent_at) FROM messages m
              JOIN conversations c ON c.id = m.conversation_id
             WHERE c.client_id = i.client_id AND m.is_system = 0) AS last_activity,
           (SELECT COUNT(*) FROM conversations c
             WHERE c.client_id = i.client_id AND c.is_draft = 0) AS conversation_count
      FROM inboxes i";

#[derive(FromRow)]
struct ActivityRow {
    client_id: String,
    inbox_id: String,
    created_at: i64,
    last_activity: Option<i64>,
    conversation_count: i64,
}

impl From<ActivityRow> for InboxActivity {
    fn from(row: ActivityRow) -> Self {
        InboxActivity {
            client_id: ClientId::from(row.client_id),
            inbox_id: InboxId::from(row.inbox_id),
            last_activity: row.last_activity.map(ts_to_datetime),
            conversation_count: row.conversation_count.max(0) as u32,
            created_at: ts_to_datetime(row.created_at),
        }
    }
}

/// SQLite-backed activity repository.
#[derive(Clone)]
pub struct SqliteActivityRepo {
    pool: SqlitePool,
}

impl SqliteActivityRepo {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    async fn fetch_projection(&self) -> Result<Vec<InboxActivity>, RepoError> {
        let rows: Vec<ActivityRow> = sqlx::query_as(PROJECTION_SQL)
            .fetch_all(&self.pool)
            .await?;
        Ok(rows.into_iter().map(Into::into).collect())
    }
}

/// Most-recent-first ordering: active inboxes by recency, then inboxes
/// that have never seen a message, newest installation first.
fn sort_most_recent_first(rows: &mut [InboxActivity]) {
    rows.sort_by(|a, b| match (&b.last_activity, &a.last_activity) {
        (Some(x), Some(y)) => x.cmp(y),
        (Some(_), None) => std::cmp::Ordering::Greater,
        (None, Some(_)) => std::cmp::Ordering::Less,
        (None, None) => b.created_at.cmp(&a.created_at),
    });
}

#[async_trait]
impl InboxActivityRepo for SqliteActivityRepo {
    async fn all(&self) -> Result<Vec<InboxActivity>, RepoError> {
        self.fetch_projection().await
    }

    async fn for_client(
        &self,
        client_id: &ClientId,
    ) -> Result<Option<InboxActivity>, RepoError> {
        let sql = format!("{PROJECTION_SQL} WHERE i.client_id = ?");
        let row: Option<ActivityRow> = sqlx::query_as(&sql)
            .bind(client_id.as_str())
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.map(Into::into))
    }

    async fn top(&self, n: usize) -> Result<Vec<InboxActivity>, RepoError> {
        let mut rows = self.fetch_projection().await?;
        sort_most_recent_first(&mut rows);
        rows.truncate(n);
        Ok(rows)
    }

    async fn least_active_excluding(
        &self,
        excluding: &[ClientId],
    ) -> Result<Option<InboxActivity>, RepoError> {
        let mut rows = self.fetch_projection().await?;
        rows.retain(|r| !excluding.contains(&r.client_id));
        sort_most_recent_first(&mut rows);
        Ok(rows.pop())
    }
}
