//! Identity store port.
//!
//! Holds the `(client_id, inbox_id, db key)` triple for every local inbox
//! installation. Backed by secure storage in production; tests use an
//! in-memory map.

use crate::error::KeychainError;
use crate::types::{ClientId, DbEncryptionKey, InboxId};
use async_trait::async_trait;

/// A persisted inbox identity.
#[derive(Debug, Clone)]
pub struct StoredIdentity {
    pub client_id: ClientId,
    pub inbox_id: InboxId,
    pub db_key: DbEncryptionKey,
}

#[async_trait]
pub trait IdentityStore: Send + Sync {
    async fn save(&self, identity: StoredIdentity) -> Result<(), KeychainError>;

    async fn load(&self, client_id: &ClientId) -> Result<Option<StoredIdentity>, KeychainError>;

    async fn delete(&self, client_id: &ClientId) -> Result<(), KeychainError>;
}
