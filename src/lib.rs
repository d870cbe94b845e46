//! inboxd - Multi-inbox messaging client runtime.
//!
//! A user owns many independent inboxes, each a distinct cryptographic
//! identity with its own encrypted local database and streaming sessions.
//! Keeping every inbox streaming is infeasible on a constrained device, so
//! this crate decides which inboxes are *awake* (streaming, consuming
//! events) and which are *sleeping* (cold, zero background cost).
//!
//! The core is three cooperating actors:
//! - [`state::InboxLifecycleManager`]: capacity-bounded LRU scheduler over
//!   the awake/sleeping partition, with pinning for the active inbox,
//!   pending-invite inboxes, and newly created inboxes.
//! - [`state::UnusedInboxCache`]: a pre-warmed, single-consumer reservation
//!   of one ready-to-use inbox identity, persisted across restarts through
//!   a keychain marker.
//! - [`state::SyncCoordinator`]: a per-inbox state machine supervising two
//!   event streams and one initial bulk sync, treating network loss as
//!   pause rather than stop.
//!
//! External collaborators (the messaging SDK, secure stores, the network
//! monitor, the notification center) are reached through the capability
//! traits in [`ports`]; SQLite adapters for the read-side repositories live
//! in [`db`].

pub mod codec;
pub mod config;
pub mod db;
pub mod error;
pub mod events;
pub mod handlers;
pub mod keychain;
pub mod ports;
pub mod state;
pub mod types;

pub use config::RuntimeConfig;
pub use error::{
    BackendError, CacheError, KeychainError, LifecycleError, MetadataError, RepoError, SyncError,
};
pub use events::{ConversationEvent, EventBus};
pub use state::{
    InboxLifecycleManager, ScheduledExplosionManager, SessionManager, SyncCoordinator, SyncState,
    UnusedInboxCache,
};
pub use types::{ClientId, ConversationId, InboxId, WakeReason};
