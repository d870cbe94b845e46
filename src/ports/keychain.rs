//! Keychain port for the unused-inbox marker.
//!
//! The marker is the only core-owned state that survives a process
//! restart. At most one exists; the cache owns it exclusively.

use crate::error::KeychainError;
use crate::types::{ClientId, InboxId};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// The persisted reservation marker: which identity is pre-warmed and
/// waiting to be consumed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UnusedInboxMarker {
    pub client_id: ClientId,
    pub inbox_id: InboxId,
}

#[async_trait]
pub trait KeychainService: Send + Sync {
    async fn load_marker(&self) -> Result<Option<UnusedInboxMarker>, KeychainError>;

    async fn store_marker(&self, marker: &UnusedInboxMarker) -> Result<(), KeychainError>;

    async fn delete_marker(&self) -> Result<(), KeychainError>;
}
