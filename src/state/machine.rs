//! Sync coordinator state machine types.
//!
//! ## State Machine
//!
//! ```text
//! ┌──────┐  start   ┌──────────┐  subscribed+synced  ┌───────┐
//! │ idle ├─────────►│ starting ├────────────────────►│ ready │
//! └──▲───┘          └────┬─────┘                     └──┬─▲──┘
//!    │                   │ stop                   pause │ │ resume
//!    │              ┌────▼─────┐                     ┌──▼─┴──┐
//!    └──────────────┤ stopping │◄────────────────────┤ paused │
//!      (internal)   └──────────┘        stop         └────────┘
//! ```
//!
//! Disconnection pauses; it never stops. A paused coordinator retains its
//! session handles, and resume respawns the streams without re-running the
//! bulk sync.

use std::fmt;

/// Externally observable coordinator state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncState {
    /// Cold. No session, no tasks.
    Idle,
    /// Streams spawning and (on first activation) bulk sync running.
    Starting,
    /// Both streams subscribed; bulk sync completed or failed.
    Ready,
    /// Streams cancelled on network loss; session retained.
    Paused,
    /// Tearing down tasks; next state is `Idle`.
    Stopping,
}

impl SyncState {
    /// Readiness contract: true iff both streams have completed their
    /// subscription handshake and the initial bulk sync has returned.
    #[inline]
    pub fn is_ready(&self) -> bool {
        matches!(self, Self::Ready)
    }

    /// Whether a `start` call in this state spawns a new activation.
    /// `Starting`/`Ready` with the same session ignore the call;
    /// `Stopping` completes first.
    #[inline]
    pub fn accepts_start(&self) -> bool {
        matches!(self, Self::Idle)
    }

    /// Whether `pause` has an immediate effect. During `Starting` the
    /// request is remembered and applied on entering `Ready` instead.
    #[inline]
    pub fn pausable(&self) -> bool {
        matches!(self, Self::Ready)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::Starting => "starting",
            Self::Ready => "ready",
            Self::Paused => "paused",
            Self::Stopping => "stopping",
        }
    }
}

impl fmt::Display for SyncState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
