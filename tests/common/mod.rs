//! Integration test common infrastructure.
//!
//! Provides fake collaborators honouring the port contracts and a helper
//! for assembling a full runtime stack against them.

#![allow(dead_code)]

pub mod fakes;

#[allow(unused_imports)]
pub use fakes::{
    FakeActivityRepo, FakeAppLifecycle, FakeBackend, FakeConversationRepo, FakeInviteRepo,
    FakeNetworkMonitor, FakeNotificationCenter, MemoryIdentityStore, MemoryKeychain,
};

use inboxd::RuntimeConfig;
use inboxd::state::{InboxLifecycleManager, UnusedInboxCache};
use inboxd::types::{ClientId, DbEncryptionKey, InboxId};
use std::path::PathBuf;
use std::sync::{Arc, Once};
use std::time::Duration;

static TRACING: Once = Once::new();

/// Install the test tracing subscriber once per process. Filter with
/// `RUST_LOG`; quiet by default so assertion failures stay readable.
pub fn init_tracing() {
    TRACING.call_once(|| {
        let filter = tracing_subscriber::EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn"));
        let _ = tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_test_writer()
            .try_init();
    });
}

/// A complete runtime stack over fakes.
pub struct TestStack {
    pub backend: Arc<FakeBackend>,
    pub identities: Arc<MemoryIdentityStore>,
    pub keychain: Arc<MemoryKeychain>,
    pub activity: Arc<FakeActivityRepo>,
    pub invites: Arc<FakeInviteRepo>,
    pub cache: Arc<UnusedInboxCache>,
    pub manager: Arc<InboxLifecycleManager>,
}

pub fn stack(config: RuntimeConfig) -> TestStack {
    init_tracing();
    let backend = Arc::new(FakeBackend::new());
    let identities = Arc::new(MemoryIdentityStore::new());
    let keychain = Arc::new(MemoryKeychain::new());
    let activity = Arc::new(FakeActivityRepo::new());
    let invites = Arc::new(FakeInviteRepo::new());
    let cache = UnusedInboxCache::new(
        backend.clone(),
        identities.clone(),
        keychain.clone(),
        PathBuf::from("test-inboxes"),
    );
    let manager = InboxLifecycleManager::new(
        config,
        backend.clone(),
        identities.clone(),
        activity.clone(),
        invites.clone(),
        cache.clone(),
    );
    TestStack {
        backend,
        identities,
        keychain,
        activity,
        invites,
        cache,
        manager,
    }
}

impl TestStack {
    /// Register a wakeable identity (keys saved, no activity row).
    pub async fn register_identity(&self, client: &str, inbox: &str) {
        self.identities
            .save_identity(
                ClientId::from(client),
                InboxId::from(inbox),
                DbEncryptionKey::generate(),
            )
            .await;
    }
}

/// Poll until `predicate` returns true or the timeout lapses.
#[allow(dead_code)]
pub async fn wait_for<F, Fut>(mut predicate: F, timeout: Duration) -> bool
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = bool>,
{
    let deadline = tokio::time::Instant::now() + timeout;
    loop {
        if predicate().await {
            return true;
        }
        if tokio::time::Instant::now() >= deadline {
            return false;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
}
