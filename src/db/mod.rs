//! SQLite adapters for the repository ports.
//!
//! Provides async SQLite access using SQLx for:
//! - the inbox activity projection (lifecycle scheduling input)
//! - pending (draft) invite lookups
//! - conversation reads and the narrow writes the core performs
//!
//! The scheduler persists nothing here; these tables are the sole source
//! of truth for activity and are rebuilt into scheduler state at launch.

mod activity;
mod conversations;
mod invites;

pub use activity::SqliteActivityRepo;
pub use conversations::SqliteConversationRepo;
pub use invites::SqliteInviteRepo;

use crate::config::RuntimeConfig;
use crate::error::RepoError;
use crate::types::{ClientId, InboxId};
use chrono::{DateTime, TimeZone, Utc};
use sqlx::SqlitePool;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use std::path::Path;
use thiserror::Error;
use tracing::debug;

/// Database errors. Kept here for `sqlx` proximity; callers outside this
/// module see [`RepoError`].
#[derive(Debug, Error)]
pub enum DbError {
    #[error("database error: {0}")]
    Sqlx(#[from] sqlx::Error),
}

impl From<DbError> for RepoError {
    fn from(e: DbError) -> Self {
        RepoError::Storage(e.to_string())
    }
}

impl From<sqlx::Error> for RepoError {
    fn from(e: sqlx::Error) -> Self {
        RepoError::Storage(e.to_string())
    }
}

pub(crate) fn ts_to_datetime(ts: i64) -> DateTime<Utc> {
    Utc.timestamp_opt(ts, 0)
        .single()
        .unwrap_or(DateTime::<Utc>::UNIX_EPOCH)
}

/// Ephemeral store with default tunables, for the tests in this module
/// tree.
#[cfg(test)]
pub(crate) async fn memory_db() -> Result<Database, DbError> {
    Database::new(":memory:", &RuntimeConfig::default()).await
}

/// Database handle with connection pool.
#[derive(Clone)]
pub struct Database {
    pool: SqlitePool,
}

impl Database {
    /// Open an inbox's local store, creating the schema on first use.
    ///
    /// Pool sizing and the acquire deadline come from the runtime config:
    /// on a device the only concurrent users are the lifecycle manager's
    /// launch scan and a coordinator or two, so a handful of connections
    /// suffices and a stalled acquisition should fail fast rather than
    /// queue behind a wedged writer. Pass `":memory:"` for an ephemeral
    /// store (tests, previews).
    pub async fn new(path: &str, config: &RuntimeConfig) -> Result<Self, DbError> {
        let pool = SqlitePoolOptions::new()
            .max_connections(config.db_pool_size as u32)
            .acquire_timeout(config.db_acquire_timeout())
            .test_before_acquire(true)
            .connect_with(Self::connect_options(path))
            .await?;

        debug!(path = %path, pool_size = config.db_pool_size, "conversation store opened");

        Self::run_migrations(&pool).await?;
        Ok(Self { pool })
    }

    fn connect_options(path: &str) -> SqliteConnectOptions {
        if path == ":memory:" {
            // Shared cache so every pooled connection sees the same
            // ephemeral database.
            return SqliteConnectOptions::new()
                .filename("file::memory:")
                .shared_cache(true)
                .create_if_missing(true);
        }

        // The per-inbox directory may not exist before the first open.
        if let Some(parent) = Path::new(path).parent().filter(|p| !p.as_os_str().is_empty()) {
            if let Err(e) = std::fs::create_dir_all(parent) {
                tracing::warn!(path = %parent.display(), error = %e,
                               "could not create store directory");
            }
        }
        SqliteConnectOptions::new()
            .filename(path)
            .create_if_missing(true)
    }

    /// Get reference to the underlying connection pool.
    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// Activity projection repository.
    pub fn activity(&self) -> SqliteActivityRepo {
        SqliteActivityRepo::new(self.pool.clone())
    }

    /// Pending-invite repository.
    pub fn invites(&self) -> SqliteInviteRepo {
        SqliteInviteRepo::new(self.pool.clone())
    }

    /// Conversation repository.
    pub fn conversations(&self) -> SqliteConversationRepo {
        SqliteConversationRepo::new(self.pool.clone())
    }

    /// Record a local inbox installation.
    pub async fn register_inbox(
        &self,
        client_id: &ClientId,
        inbox_id: &InboxId,
        created_at: DateTime<Utc>,
    ) -> Result<(), DbError> {
        sqlx::query(
            "INSERT OR REPLACE INTO inboxes (client_id, inbox_id, created_at) VALUES (?, ?, ?)",
        )
        .bind(client_id.as_str())
        .bind(inbox_id.as_str())
        .bind(created_at.timestamp())
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// Run embedded migrations. All statements are idempotent.
    async fn run_migrations(pool: &SqlitePool) -> Result<(), DbError> {
        const SCHEMA: &[&str] = &[
            "CREATE TABLE IF NOT EXISTS inboxes (
                client_id TEXT PRIMARY KEY,
                inbox_id TEXT NOT NULL,
                created_at INTEGER NOT NULL
            )",
            "CREATE TABLE IF NOT EXISTS conversations (
                id TEXT PRIMARY KEY,
                client_id TEXT NOT NULL,
                inbox_id TEXT NOT NULL,
                name TEXT,
                description TEXT,
                image_url TEXT,
                invite_tag TEXT NOT NULL,
                is_locked INTEGER NOT NULL DEFAULT 0,
                is_draft INTEGER NOT NULL DEFAULT 0,
                expires_at INTEGER,
                metadata_blob BLOB,
                created_at INTEGER NOT NULL
            )",
            "CREATE INDEX IF NOT EXISTS idx_conversations_client ON conversations(client_id)",
            "CREATE TABLE IF NOT EXISTS conversation_members (
                conversation_id TEXT NOT NULL,
                inbox_id TEXT NOT NULL,
                role TEXT NOT NULL,
                PRIMARY KEY (conversation_id, inbox_id)
            )",
            "CREATE TABLE IF NOT EXISTS messages (
                id TEXT PRIMARY KEY,
                conversation_id TEXT NOT NULL,
                sender_inbox_id TEXT NOT NULL,
                is_system INTEGER NOT NULL DEFAULT 0,
                sent_at INTEGER NOT NULL
            )",
            "CREATE INDEX IF NOT EXISTS idx_messages_conversation
                ON messages(conversation_id, sent_at)",
        ];

        for statement in SCHEMA {
            sqlx::query(statement).execute(pool).await?;
        }
        Ok(())
    }
}
