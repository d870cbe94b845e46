//! Observable conversation events.
//!
//! A small broadcast bus connects the explode processor to the scheduled
//! explosion manager and to any UI subscribers. Lagging subscribers miss
//! events; the bus never blocks publishers.

use crate::types::ConversationId;
use chrono::{DateTime, Utc};
use tokio::sync::broadcast;

/// Events observable by the rest of the application.
#[derive(Debug, Clone)]
pub enum ConversationEvent {
    /// A future explosion was committed for a conversation.
    ScheduledExplosion {
        conversation_id: ConversationId,
        expires_at: DateTime<Utc>,
    },
    /// A conversation reached (or arrived already past) its expiry.
    Expired { conversation_id: ConversationId },
}

/// Broadcast bus for [`ConversationEvent`]s.
#[derive(Clone)]
pub struct EventBus {
    tx: broadcast::Sender<ConversationEvent>,
}

impl EventBus {
    /// Capacity 64 buffers a burst of scheduling events without dropping
    /// them before slow subscribers catch up.
    pub fn new() -> Self {
        let (tx, _) = broadcast::channel(64);
        Self { tx }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<ConversationEvent> {
        self.tx.subscribe()
    }

    /// Publish an event. A send with no subscribers is not an error.
    pub fn publish(&self, event: ConversationEvent) {
        let _ = self.tx.send(event);
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}
