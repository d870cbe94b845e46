//! OS keychain adapters.
//!
//! Two secure-store ports are backed by the platform keychain through the
//! `keyring` crate: the single unused-inbox marker and the per-client
//! identity records. Keyring calls are blocking, so they run on the
//! blocking pool.

use crate::error::KeychainError;
use crate::ports::{IdentityStore, KeychainService, StoredIdentity, UnusedInboxMarker};
use crate::types::{ClientId, DbEncryptionKey, InboxId};
use async_trait::async_trait;
use base64::Engine as _;
use base64::engine::general_purpose::STANDARD as BASE64;
use serde::{Deserialize, Serialize};

const MARKER_ACCOUNT: &str = "unused-inbox";
const IDENTITY_ACCOUNT_PREFIX: &str = "identity-";

fn entry(service: &str, account: &str) -> Result<keyring::Entry, KeychainError> {
    keyring::Entry::new(service, account).map_err(|e| KeychainError::Access(e.to_string()))
}

fn read_entry(service: &str, account: &str) -> Result<Option<String>, KeychainError> {
    match entry(service, account)?.get_password() {
        Ok(raw) => Ok(Some(raw)),
        Err(keyring::Error::NoEntry) => Ok(None),
        Err(e) => Err(KeychainError::Access(e.to_string())),
    }
}

fn write_entry(service: &str, account: &str, value: &str) -> Result<(), KeychainError> {
    entry(service, account)?
        .set_password(value)
        .map_err(|e| KeychainError::Access(e.to_string()))
}

fn delete_entry(service: &str, account: &str) -> Result<(), KeychainError> {
    match entry(service, account)?.delete_credential() {
        Ok(()) | Err(keyring::Error::NoEntry) => Ok(()),
        Err(e) => Err(KeychainError::Access(e.to_string())),
    }
}

/// Marker store over the OS keychain.
pub struct OsKeychain {
    service: String,
}

impl OsKeychain {
    pub fn new(service: impl Into<String>) -> Self {
        Self {
            service: service.into(),
        }
    }
}

#[async_trait]
impl KeychainService for OsKeychain {
    async fn load_marker(&self) -> Result<Option<UnusedInboxMarker>, KeychainError> {
        let service = self.service.clone();
        let raw = tokio::task::spawn_blocking(move || read_entry(&service, MARKER_ACCOUNT))
            .await
            .map_err(|e| KeychainError::Access(e.to_string()))??;
        match raw {
            Some(raw) => Ok(Some(serde_json::from_str(&raw)?)),
            None => Ok(None),
        }
    }

    async fn store_marker(&self, marker: &UnusedInboxMarker) -> Result<(), KeychainError> {
        let service = self.service.clone();
        let raw = serde_json::to_string(marker)?;
        tokio::task::spawn_blocking(move || write_entry(&service, MARKER_ACCOUNT, &raw))
            .await
            .map_err(|e| KeychainError::Access(e.to_string()))?
    }

    async fn delete_marker(&self) -> Result<(), KeychainError> {
        let service = self.service.clone();
        tokio::task::spawn_blocking(move || delete_entry(&service, MARKER_ACCOUNT))
            .await
            .map_err(|e| KeychainError::Access(e.to_string()))?
    }
}

/// Serialized form of a stored identity. The key travels base64-encoded;
/// the decoded copy is zeroized on drop by `DbEncryptionKey`.
#[derive(Serialize, Deserialize)]
struct IdentityRecord {
    client_id: ClientId,
    inbox_id: InboxId,
    db_key: String,
}

/// Identity store over the OS keychain, one entry per client.
pub struct OsIdentityStore {
    service: String,
}

impl OsIdentityStore {
    pub fn new(service: impl Into<String>) -> Self {
        Self {
            service: service.into(),
        }
    }

    fn account(client_id: &ClientId) -> String {
        format!("{IDENTITY_ACCOUNT_PREFIX}{client_id}")
    }
}

#[async_trait]
impl IdentityStore for OsIdentityStore {
    async fn save(&self, identity: StoredIdentity) -> Result<(), KeychainError> {
        let record = IdentityRecord {
            client_id: identity.client_id.clone(),
            inbox_id: identity.inbox_id,
            db_key: BASE64.encode(identity.db_key.as_bytes()),
        };
        let raw = serde_json::to_string(&record)?;
        let service = self.service.clone();
        let account = Self::account(&identity.client_id);
        tokio::task::spawn_blocking(move || write_entry(&service, &account, &raw))
            .await
            .map_err(|e| KeychainError::Access(e.to_string()))?
    }

    async fn load(&self, client_id: &ClientId) -> Result<Option<StoredIdentity>, KeychainError> {
        let service = self.service.clone();
        let account = Self::account(client_id);
        let raw = tokio::task::spawn_blocking(move || read_entry(&service, &account))
            .await
            .map_err(|e| KeychainError::Access(e.to_string()))??;
        let Some(raw) = raw else { return Ok(None) };
        let record: IdentityRecord = serde_json::from_str(&raw)?;
        let key_bytes = BASE64
            .decode(&record.db_key)
            .map_err(|e| KeychainError::Access(format!("corrupt key material: {e}")))?;
        Ok(Some(StoredIdentity {
            client_id: record.client_id,
            inbox_id: record.inbox_id,
            db_key: DbEncryptionKey::from_bytes(key_bytes),
        }))
    }

    async fn delete(&self, client_id: &ClientId) -> Result<(), KeychainError> {
        let service = self.service.clone();
        let account = Self::account(client_id);
        tokio::task::spawn_blocking(move || delete_entry(&service, &account))
            .await
            .map_err(|e| KeychainError::Access(e.to_string()))?
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn marker_serialization_round_trip() {
        let marker = UnusedInboxMarker {
            client_id: ClientId::from("c-1"),
            inbox_id: InboxId::from("i-1"),
        };
        let raw = serde_json::to_string(&marker).unwrap();
        let back: UnusedInboxMarker = serde_json::from_str(&raw).unwrap();
        assert_eq!(back, marker);
    }

    #[test]
    fn identity_record_preserves_key_bytes() {
        let key = DbEncryptionKey::generate();
        let record = IdentityRecord {
            client_id: ClientId::from("c-1"),
            inbox_id: InboxId::from("i-1"),
            db_key: BASE64.encode(key.as_bytes()),
        };
        let raw = serde_json::to_string(&record).unwrap();
        let back: IdentityRecord = serde_json::from_str(&raw).unwrap();
        assert_eq!(BASE64.decode(back.db_key).unwrap(), key.as_bytes());
    }
}
