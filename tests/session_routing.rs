//! Integration tests for the session manager: notification routing,
//! inbox creation/deletion, and network-driven pause/resume.

mod common;

use chrono::Duration as ChronoDuration;
use common::fakes::{FakeAppLifecycle, FakeConversationRepo, FakeNetworkMonitor, FakeNotificationCenter};
use common::{TestStack, stack, wait_for};
use inboxd::RuntimeConfig;
use inboxd::events::EventBus;
use inboxd::ports::{NetworkPath, NetworkStatus};
use inboxd::state::{ScheduledExplosionManager, SessionManager, SyncState};
use inboxd::types::{ClientId, ConversationId};
use std::sync::Arc;
use std::time::Duration;

struct Harness {
    stack: TestStack,
    conversations: Arc<FakeConversationRepo>,
    session: Arc<SessionManager>,
    network: Arc<FakeNetworkMonitor>,
    app: Arc<FakeAppLifecycle>,
}

async fn harness(config: RuntimeConfig) -> Harness {
    let stack = stack(config);
    let conversations = Arc::new(FakeConversationRepo::new());
    let events = EventBus::new();
    let explosions = ScheduledExplosionManager::new(
        Arc::new(FakeNotificationCenter::new()),
        conversations.clone(),
        ChronoDuration::hours(1),
    );
    let session = SessionManager::new(
        stack.manager.clone(),
        conversations.clone(),
        stack.backend.clone(),
        stack.identities.clone(),
        explosions,
        events,
    );
    let network = Arc::new(FakeNetworkMonitor::new(NetworkStatus::Connected(
        NetworkPath::Wifi,
    )));
    let app = Arc::new(FakeAppLifecycle::new());
    session
        .initialize(network.clone(), app.clone())
        .await
        .expect("initialize");
    Harness {
        stack,
        conversations,
        session,
        network,
        app,
    }
}

#[tokio::test]
async fn notifications_display_without_active_client() {
    let h = harness(RuntimeConfig::default()).await;
    h.conversations.insert_simple("conv-1", "a", "ia");

    assert!(h.session.should_display_notification(&ConversationId::from("conv-1")).await);
}

#[tokio::test]
async fn notifications_suppressed_only_for_active_clients_conversations() {
    let h = harness(RuntimeConfig::default()).await;
    h.conversations.insert_simple("mine", "a", "ia");
    h.conversations.insert_simple("other", "b", "ib");

    h.stack
        .manager
        .set_active_client(Some(ClientId::from("a")))
        .await;

    assert!(
        !h.session.should_display_notification(&ConversationId::from("mine")).await,
        "own conversation is suppressed while viewing"
    );
    assert!(
        h.session.should_display_notification(&ConversationId::from("other")).await,
        "another inbox's conversation still displays"
    );
    assert!(
        h.session.should_display_notification(&ConversationId::from("unknown")).await,
        "unknown conversations default to display"
    );
}

#[tokio::test]
async fn notification_wakes_owning_inbox() {
    let h = harness(RuntimeConfig::default()).await;
    h.stack.register_identity("a", "ia").await;
    h.conversations.insert_simple("conv-1", "a", "ia");

    let coordinator = h
        .session
        .wake_inbox_for_notification(&ConversationId::from("conv-1"))
        .await
        .unwrap();

    assert!(coordinator.is_some());
    assert!(h.stack.manager.is_awake(&ClientId::from("a")).await);

    // Unknown conversations resolve to no coordinator.
    let none = h
        .session
        .wake_inbox_for_notification(&ConversationId::from("missing"))
        .await
        .unwrap();
    assert!(none.is_none());
}

#[tokio::test]
async fn create_delete_create_yields_fresh_identity() {
    let h = harness(RuntimeConfig::default()).await;

    let first = h.session.add_inbox().await.unwrap();
    assert!(h.stack.manager.is_awake(&first.client_id).await);
    h.conversations
        .insert_simple("welcome", first.client_id.as_str(), first.inbox_id.as_str());

    h.session
        .delete_inbox(&first.client_id, &first.inbox_id)
        .await
        .unwrap();

    assert!(!h.stack.manager.is_awake(&first.client_id).await);
    assert!(!h.stack.manager.is_sleeping(&first.client_id).await);
    assert!(!h.stack.identities.contains(&first.client_id));
    assert!(h.conversations.get("welcome").is_none(), "local rows cleared");
    assert!(
        h.stack
            .backend
            .deleted
            .lock()
            .unwrap()
            .iter()
            .any(|(c, _)| c == &first.client_id),
        "backend teardown requested"
    );

    let second = h.session.add_inbox().await.unwrap();
    assert_ne!(second.inbox_id, first.inbox_id, "fresh identity expected");
    assert!(h.stack.manager.is_awake(&second.client_id).await);
    assert!(!h.stack.manager.is_awake(&first.client_id).await);
    assert!(!h.stack.manager.is_sleeping(&first.client_id).await);
}

#[tokio::test]
async fn network_loss_pauses_without_changing_membership() {
    let h = harness(RuntimeConfig::default()).await;
    h.stack.register_identity("a", "ia").await;
    let coordinator = h
        .stack
        .manager
        .wake(
            &ClientId::from("a"),
            &inboxd::types::InboxId::from("ia"),
            inboxd::types::WakeReason::UserInteraction,
        )
        .await
        .unwrap();
    assert!(
        wait_for(|| async { coordinator.is_sync_ready() }, Duration::from_secs(2)).await
    );

    h.network.set(NetworkStatus::Disconnected);
    assert!(
        wait_for(
            || async { coordinator.state() == SyncState::Paused },
            Duration::from_secs(2)
        )
        .await,
        "disconnection should pause the coordinator"
    );
    // Pause, not sleep: the client stays in the awake set.
    assert!(h.stack.manager.is_awake(&ClientId::from("a")).await);

    h.network.set(NetworkStatus::Connected(NetworkPath::Cellular));
    assert!(
        wait_for(|| async { coordinator.is_sync_ready() }, Duration::from_secs(2)).await,
        "reconnection should resume to ready"
    );

    // The bulk sync ran once for the activation; resume skipped it.
    let fake = h.stack.backend.session_for(&ClientId::from("a")).unwrap();
    assert_eq!(fake.sync_count(), 1);
}
