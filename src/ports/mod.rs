//! Capability traits for every external collaborator.
//!
//! The core never reaches an external system except through one of these
//! traits. Tests substitute fakes honouring the same contracts; production
//! wires the messaging SDK, the OS keychain, and the SQLite adapters from
//! [`crate::db`].

mod app;
mod backend;
mod identity;
mod keychain;
mod network;
mod notify;
mod repos;

pub use app::AppLifecycle;
pub use backend::{
    EventStream, InboxSession, MessagingBackend, RemoteConversationEvent, RemoteMessageEvent,
};
pub use identity::{IdentityStore, StoredIdentity};
pub use keychain::{KeychainService, UnusedInboxMarker};
pub use network::{NetworkMonitor, NetworkPath, NetworkStatus};
pub use notify::{NotificationRequest, UserNotificationCenter};
pub use repos::{ConversationRepo, InboxActivityRepo, PendingInviteRepo};
