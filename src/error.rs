//! Unified error handling for the inbox runtime.
//!
//! Each stateful component has its own error enum with automatic
//! conversions and `error_code()` labels for structured logging.
//!
//! Invariant violations (duplicate consumption of the unused-inbox
//! reservation) are not represented here: they are corruption signals and
//! panic at the detection site rather than travel as values.

use crate::types::{ClientId, ConversationId};
use thiserror::Error;

// ============================================================================
// Backend errors (messaging SDK surface)
// ============================================================================

/// Errors surfaced by the messaging backend SDK.
///
/// Transient errors are retried inside coordinators; permanent errors
/// terminate the coordinator and surface through one-shot operations.
#[derive(Debug, Clone, Error)]
pub enum BackendError {
    #[error("transient backend failure: {0}")]
    Transient(String),

    #[error("permanent backend failure: {0}")]
    Permanent(String),
}

impl BackendError {
    #[inline]
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Transient(_))
    }

    /// Static error code for log labeling.
    #[inline]
    pub fn error_code(&self) -> &'static str {
        match self {
            Self::Transient(_) => "backend_transient",
            Self::Permanent(_) => "backend_permanent",
        }
    }
}

// ============================================================================
// Repository errors (port-level, storage-agnostic)
// ============================================================================

/// Errors from the repository ports. The SQLite adapters map `sqlx`
/// failures into `Storage`; fakes construct these directly.
#[derive(Debug, Clone, Error)]
pub enum RepoError {
    #[error("storage error: {0}")]
    Storage(String),

    #[error("not found: {0}")]
    NotFound(String),
}

impl RepoError {
    #[inline]
    pub fn error_code(&self) -> &'static str {
        match self {
            Self::Storage(_) => "repo_storage",
            Self::NotFound(_) => "repo_not_found",
        }
    }
}

// ============================================================================
// Secure store errors (keychain marker, identity keys)
// ============================================================================

/// Errors from the OS keychain and the identity store.
#[derive(Debug, Error)]
pub enum KeychainError {
    #[error("keychain access: {0}")]
    Access(String),

    #[error("marker encoding: {0}")]
    Encoding(#[from] serde_json::Error),
}

impl KeychainError {
    #[inline]
    pub fn error_code(&self) -> &'static str {
        match self {
            Self::Access(_) => "keychain_access",
            Self::Encoding(_) => "keychain_encoding",
        }
    }
}

// ============================================================================
// Coordinator errors
// ============================================================================

/// Errors from a per-inbox sync coordinator.
#[derive(Debug, Error)]
pub enum SyncError {
    #[error(transparent)]
    Backend(#[from] BackendError),

    #[error("operation cancelled by stop")]
    Cancelled,
}

impl SyncError {
    #[inline]
    pub fn error_code(&self) -> &'static str {
        match self {
            Self::Backend(e) => e.error_code(),
            Self::Cancelled => "cancelled",
        }
    }
}

// ============================================================================
// Unused-inbox cache errors
// ============================================================================

/// Errors from the unused-inbox cache.
#[derive(Debug, Error)]
pub enum CacheError {
    #[error(transparent)]
    Backend(#[from] BackendError),

    #[error(transparent)]
    Keychain(#[from] KeychainError),
}

impl CacheError {
    #[inline]
    pub fn error_code(&self) -> &'static str {
        match self {
            Self::Backend(e) => e.error_code(),
            Self::Keychain(e) => e.error_code(),
        }
    }
}

// ============================================================================
// Lifecycle manager errors
// ============================================================================

/// Errors from the inbox lifecycle manager. Only explicit user actions
/// (`wake`, `create_new_inbox`) surface these; rebalance logs and moves on.
#[derive(Debug, Error)]
pub enum LifecycleError {
    #[error("coordinator failed to start for {client_id}: {source}")]
    CoordinatorStart {
        client_id: ClientId,
        #[source]
        source: SyncError,
    },

    /// The inbox is the cache's current reservation; it becomes wakeable
    /// only after `consume_or_create` returns it.
    #[error("inbox {0} is reserved by the unused-inbox cache")]
    ReservedInbox(crate::types::InboxId),

    #[error("no stored identity for client {0}")]
    IdentityMissing(ClientId),

    #[error(transparent)]
    Backend(#[from] BackendError),

    #[error(transparent)]
    Cache(#[from] CacheError),

    #[error(transparent)]
    Keychain(#[from] KeychainError),

    #[error(transparent)]
    Repo(#[from] RepoError),
}

impl LifecycleError {
    #[inline]
    pub fn error_code(&self) -> &'static str {
        match self {
            Self::CoordinatorStart { .. } => "coordinator_start",
            Self::ReservedInbox(_) => "reserved_inbox",
            Self::IdentityMissing(_) => "identity_missing",
            Self::Backend(e) => e.error_code(),
            Self::Cache(e) => e.error_code(),
            Self::Keychain(e) => e.error_code(),
            Self::Repo(e) => e.error_code(),
        }
    }
}

// ============================================================================
// Metadata writer errors
// ============================================================================

/// Errors from conversation metadata operations (lock/unlock).
///
/// Authorization failures in the explode path are *not* errors; they are
/// tagged results (`ExplodeOutcome::Unauthorized`).
#[derive(Debug, Error)]
pub enum MetadataError {
    #[error("conversation not found: {0}")]
    NotFound(ConversationId),

    #[error(transparent)]
    Backend(#[from] BackendError),

    #[error(transparent)]
    Repo(#[from] RepoError),

    #[error("metadata encoding: {0}")]
    Codec(#[from] crate::codec::CodecError),
}

impl MetadataError {
    #[inline]
    pub fn error_code(&self) -> &'static str {
        match self {
            Self::NotFound(_) => "conversation_not_found",
            Self::Backend(e) => e.error_code(),
            Self::Repo(e) => e.error_code(),
            Self::Codec(_) => "metadata_codec",
        }
    }
}

// ============================================================================
// Notification scheduling errors
// ============================================================================

/// Errors from the local notification center port. Logged and discarded by
/// the explosion manager; alarms are best-effort.
#[derive(Debug, Clone, Error)]
pub enum NotifyError {
    #[error("notification center denied request: {0}")]
    Denied(String),
}
