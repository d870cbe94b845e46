//! Core identifier and entity types shared across the runtime.

use chrono::{DateTime, Utc};
use rand::RngCore;
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;
use zeroize::{Zeroize, ZeroizeOnDrop};

// ============================================================================
// Identifiers
// ============================================================================

macro_rules! opaque_id {
    ($(#[$doc:meta])* $name:ident) => {
        $(#[$doc])*
        #[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(String);

        impl $name {
            /// Mint a fresh random identifier.
            pub fn generate() -> Self {
                Self(Uuid::new_v4().to_string())
            }

            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl From<&str> for $name {
            fn from(s: &str) -> Self {
                Self(s.to_string())
            }
        }

        impl From<String> for $name {
            fn from(s: String) -> Self {
                Self(s)
            }
        }
    };
}

opaque_id! {
    /// Identifier for a local installation of an inbox. Tied to a local
    /// database file and a signing key pair; stable within the process
    /// lifetime of that installation.
    ClientId
}

opaque_id! {
    /// Protocol-level identity. Multiple `ClientId`s can share an `InboxId`
    /// only in edge cases (reinstall); the runtime treats the pair as the
    /// unit of identity.
    InboxId
}

opaque_id! {
    /// Identifier for a conversation. A conversation belongs to exactly one
    /// `InboxId`.
    ConversationId
}

// ============================================================================
// Wake reasons
// ============================================================================

/// Why an inbox is being woken. Informational only: admission and eviction
/// never depend on the reason (pending-invite protection comes from the
/// pending-invite set, not from the reason).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WakeReason {
    AppLaunch,
    UserInteraction,
    PushNotification,
    PendingInvite,
    ActivityRanking,
}

impl WakeReason {
    /// Static label for structured logging.
    #[inline]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::AppLaunch => "app_launch",
            Self::UserInteraction => "user_interaction",
            Self::PushNotification => "push_notification",
            Self::PendingInvite => "pending_invite",
            Self::ActivityRanking => "activity_ranking",
        }
    }
}

// ============================================================================
// Membership and policy
// ============================================================================

/// Role of an inbox within a conversation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MemberRole {
    Member,
    Admin,
    SuperAdmin,
    Creator,
}

impl MemberRole {
    /// Whether this role may change conversation-level settings
    /// (explode scheduling, locking).
    #[inline]
    pub fn is_privileged(&self) -> bool {
        !matches!(self, Self::Member)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Member => "member",
            Self::Admin => "admin",
            Self::SuperAdmin => "super_admin",
            Self::Creator => "creator",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "member" => Some(Self::Member),
            "admin" => Some(Self::Admin),
            "super_admin" => Some(Self::SuperAdmin),
            "creator" => Some(Self::Creator),
            _ => None,
        }
    }
}

/// Who may add members to a conversation. Locking a conversation sets the
/// policy to `Deny`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AddMemberPolicy {
    Allow,
    Deny,
}

// ============================================================================
// Entities
// ============================================================================

/// Read-only activity projection for one inbox, rebuilt from the
/// conversation and message tables.
///
/// `last_activity` is `None` iff no non-system message has ever been
/// observed for this inbox.
#[derive(Debug, Clone)]
pub struct InboxActivity {
    pub client_id: ClientId,
    pub inbox_id: InboxId,
    pub last_activity: Option<DateTime<Utc>>,
    pub conversation_count: u32,
    pub created_at: DateTime<Utc>,
}

/// Draft conversations an inbox has created but not yet published. The set
/// is non-empty by construction: inboxes without drafts have no entry.
#[derive(Debug, Clone)]
pub struct PendingInviteInfo {
    pub client_id: ClientId,
    pub inbox_id: InboxId,
    pub pending_conversation_ids: Vec<ConversationId>,
}

/// A conversation row as the core sees it.
#[derive(Debug, Clone)]
pub struct Conversation {
    pub id: ConversationId,
    pub client_id: ClientId,
    pub inbox_id: InboxId,
    pub name: Option<String>,
    pub description: Option<String>,
    pub image_url: Option<String>,
    pub invite_tag: String,
    pub is_locked: bool,
    pub is_draft: bool,
    pub expires_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

/// One member of a conversation.
#[derive(Debug, Clone)]
pub struct ConversationMember {
    pub inbox_id: InboxId,
    pub role: MemberRole,
}

/// Requested explosion settings carried by an explode message.
#[derive(Debug, Clone, Copy)]
pub struct ExplodeSettings {
    pub expires_at: DateTime<Utc>,
}

// ============================================================================
// Key material
// ============================================================================

/// Symmetric key protecting one inbox's local database. Wiped from memory
/// on drop.
#[derive(Clone, Zeroize, ZeroizeOnDrop)]
pub struct DbEncryptionKey(Vec<u8>);

impl DbEncryptionKey {
    pub const LEN: usize = 32;

    /// Generate a fresh random key.
    pub fn generate() -> Self {
        let mut bytes = vec![0u8; Self::LEN];
        rand::thread_rng().fill_bytes(&mut bytes);
        Self(bytes)
    }

    pub fn from_bytes(bytes: Vec<u8>) -> Self {
        Self(bytes)
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }
}

impl fmt::Debug for DbEncryptionKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // Key material never appears in logs.
        f.write_str("DbEncryptionKey(..)")
    }
}
