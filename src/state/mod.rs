//! Stateful core of the runtime.
//!
//! Three cooperating actors plus a thin orchestrator:
//! - [`InboxLifecycleManager`]: owns the awake/sleeping partition.
//! - [`UnusedInboxCache`]: owns the single pre-warmed reservation.
//! - [`SyncCoordinator`]: one per awake inbox, supervising its streams.
//! - [`SessionManager`]: routes notifications and user actions.
//!
//! Every actor is an async-mutex-guarded struct; methods serialize against
//! each other on the same actor, and no child task ever locks its owning
//! actor (the rule that keeps `stop()`-style joins deadlock-free).

pub mod coordinator;
pub mod machine;
pub mod managers;
pub mod session;

pub use coordinator::SyncCoordinator;
pub use machine::SyncState;
pub use managers::cache::{PreparedInbox, UnusedInboxCache};
pub use managers::explosion::ScheduledExplosionManager;
pub use managers::lifecycle::{InboxLifecycleManager, LifecycleStats, NewInbox};
pub use session::SessionManager;
