//! Session manager - thin routing layer over the lifecycle manager.
//!
//! Routes push notifications and user actions to the owning inbox,
//! suppresses self-notifications for the conversation the user is
//! currently viewing, and owns the background watchers that translate
//! network and app-lifecycle signals into coordinator pause/resume and
//! alarm re-scans.

use crate::error::LifecycleError;
use crate::events::EventBus;
use crate::ports::{
    AppLifecycle, ConversationRepo, IdentityStore, MessagingBackend, NetworkMonitor,
};
use crate::state::coordinator::SyncCoordinator;
use crate::state::managers::explosion::ScheduledExplosionManager;
use crate::state::managers::lifecycle::{InboxLifecycleManager, NewInbox};
use crate::types::{ClientId, ConversationId, InboxId};
use std::sync::Arc;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// Orchestrates the runtime's actors and routes external events.
pub struct SessionManager {
    lifecycle: Arc<InboxLifecycleManager>,
    conversations: Arc<dyn ConversationRepo>,
    backend: Arc<dyn MessagingBackend>,
    identities: Arc<dyn IdentityStore>,
    explosions: Arc<ScheduledExplosionManager>,
    events: EventBus,
    watchers: std::sync::Mutex<Vec<JoinHandle<()>>>,
}

impl SessionManager {
    pub fn new(
        lifecycle: Arc<InboxLifecycleManager>,
        conversations: Arc<dyn ConversationRepo>,
        backend: Arc<dyn MessagingBackend>,
        identities: Arc<dyn IdentityStore>,
        explosions: Arc<ScheduledExplosionManager>,
        events: EventBus,
    ) -> Arc<Self> {
        Arc::new(Self {
            lifecycle,
            conversations,
            backend,
            identities,
            explosions,
            events,
            watchers: std::sync::Mutex::new(Vec::new()),
        })
    }

    /// App-launch initialization: populate the awake set and start the
    /// network and app-lifecycle watchers.
    pub async fn initialize(
        self: &Arc<Self>,
        network: Arc<dyn NetworkMonitor>,
        app: Arc<dyn AppLifecycle>,
    ) -> Result<(), LifecycleError> {
        self.lifecycle.initialize_on_app_launch().await?;

        let explosion_loop = self
            .explosions
            .spawn(self.events.subscribe(), app.did_become_active());

        let network_loop = {
            let lifecycle = self.lifecycle.clone();
            let mut rx = network.subscribe();
            tokio::spawn(async move {
                let mut connected = rx.borrow().is_connected();
                while rx.changed().await.is_ok() {
                    let now_connected = rx.borrow().is_connected();
                    if now_connected == connected {
                        continue;
                    }
                    connected = now_connected;
                    // Connectivity never changes awake-set membership;
                    // coordinators pause in place and resume cheaply.
                    if connected {
                        info!("network restored, resuming coordinators");
                        lifecycle.resume_all().await;
                    } else {
                        info!("network lost, pausing coordinators");
                        lifecycle.pause_all().await;
                    }
                }
            })
        };

        let mut watchers = self.watchers.lock().expect("watcher list poisoned");
        watchers.push(explosion_loop);
        watchers.push(network_loop);
        Ok(())
    }

    /// Wake the inbox that owns a conversation (push-notification path).
    pub async fn wake_inbox_for_notification(
        self: &Arc<Self>,
        conversation_id: &ConversationId,
    ) -> Result<Option<Arc<SyncCoordinator>>, LifecycleError> {
        let Some(conversation) = self.conversations.fetch(conversation_id).await? else {
            debug!(conversation_id = %conversation_id, "notification for unknown conversation");
            return Ok(None);
        };
        let coordinator = self
            .lifecycle
            .get_or_wake(&conversation.client_id, &conversation.inbox_id)
            .await?;
        Ok(Some(coordinator))
    }

    /// Whether an incoming notification should be displayed.
    ///
    /// Suppressed only when the conversation belongs to the client the
    /// user is currently viewing; anything else (no active client, other
    /// inboxes, unknown conversations) is displayed.
    pub async fn should_display_notification(&self, conversation_id: &ConversationId) -> bool {
        let Some(active) = self.lifecycle.active_client_id().await else {
            return true;
        };
        match self.conversations.fetch(conversation_id).await {
            Ok(Some(conversation)) => conversation.client_id != active,
            Ok(None) => true,
            Err(e) => {
                warn!(conversation_id = %conversation_id, error = %e,
                      "conversation lookup failed, displaying notification");
                true
            }
        }
    }

    /// Create a new inbox from the pre-warmed reservation.
    pub async fn add_inbox(self: &Arc<Self>) -> Result<NewInbox, LifecycleError> {
        self.lifecycle.create_new_inbox().await
    }

    /// Remove an inbox completely: scheduler state, coordinator, backend
    /// registration, identity keys, and local rows.
    pub async fn delete_inbox(
        self: &Arc<Self>,
        client_id: &ClientId,
        inbox_id: &InboxId,
    ) -> Result<(), LifecycleError> {
        self.lifecycle.force_remove(client_id).await;
        self.backend.delete_inbox(client_id, inbox_id).await?;
        self.identities.delete(client_id).await?;
        self.conversations.delete_for_client(client_id).await?;
        info!(client_id = %client_id, inbox_id = %inbox_id, "inbox deleted");
        Ok(())
    }

    /// The shared event bus (explode processing publishes here).
    pub fn events(&self) -> &EventBus {
        &self.events
    }

    pub fn lifecycle(&self) -> &Arc<InboxLifecycleManager> {
        &self.lifecycle
    }
}

impl Drop for SessionManager {
    fn drop(&mut self) {
        if let Ok(watchers) = self.watchers.lock() {
            for watcher in watchers.iter() {
                watcher.abort();
            }
        }
    }
}
