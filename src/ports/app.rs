//! Application lifecycle port.
//!
//! The runtime only cares about one signal: the app returning to the
//! foreground, which triggers an alarm re-scan (local alarms do not
//! survive cold starts).

use tokio::sync::broadcast;

pub trait AppLifecycle: Send + Sync {
    /// Subscribe to foreground transitions. One `()` per `didBecomeActive`.
    fn did_become_active(&self) -> broadcast::Receiver<()>;
}
