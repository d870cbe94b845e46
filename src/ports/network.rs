//! Network reachability port.
//!
//! Connectivity transitions pause and resume coordinators; they never
//! change awake-set membership. The monitor exposes current state through
//! a `watch` channel so late subscribers see the latest status
//! immediately.

use tokio::sync::watch;

/// The physical path a connection is using.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NetworkPath {
    Wifi,
    Cellular,
    Other,
}

/// Reachability as reported by the platform.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NetworkStatus {
    Disconnected,
    Connecting,
    Connected(NetworkPath),
}

impl NetworkStatus {
    #[inline]
    pub fn is_connected(&self) -> bool {
        matches!(self, Self::Connected(_))
    }
}

pub trait NetworkMonitor: Send + Sync {
    /// Subscribe to reachability changes. The receiver's current value is
    /// the present status.
    fn subscribe(&self) -> watch::Receiver<NetworkStatus>;
}
