//! Fake collaborators honouring the port contracts.

#![allow(dead_code)]

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use futures_util::StreamExt;
use inboxd::error::{BackendError, KeychainError, NotifyError, RepoError};
use inboxd::ports::{
    AppLifecycle, ConversationRepo, EventStream, IdentityStore, InboxActivityRepo, InboxSession,
    KeychainService, MessagingBackend, NetworkMonitor, NetworkStatus, NotificationRequest,
    PendingInviteRepo, RemoteConversationEvent, RemoteMessageEvent, StoredIdentity,
    UnusedInboxMarker, UserNotificationCenter,
};
use inboxd::types::{
    AddMemberPolicy, ClientId, Conversation, ConversationId, ConversationMember, DbEncryptionKey,
    InboxActivity, InboxId, MemberRole, PendingInviteInfo,
};
use std::collections::HashMap;
use std::path::Path;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::{broadcast, watch};

// ============================================================================
// Backend
// ============================================================================

/// A per-inbox session whose behavior tests can steer.
pub struct FakeSession {
    client_id: ClientId,
    inbox_id: InboxId,
    pub sync_calls: AtomicUsize,
    pub fail_sync: AtomicBool,
    pub sync_delay: Mutex<Duration>,
    pub subscribe_delay: Mutex<Duration>,
    /// When set, stream opens fail with this error.
    pub stream_failure: Mutex<Option<BackendError>>,
    pub policies: Mutex<Vec<(ConversationId, AddMemberPolicy)>>,
    pub rotated_tags: Mutex<Vec<(ConversationId, String)>>,
    pub synced: Mutex<Vec<ConversationId>>,
    pub published_invites: Mutex<Vec<(ConversationId, String)>>,
}

impl FakeSession {
    pub fn new(client_id: ClientId, inbox_id: InboxId) -> Arc<Self> {
        Arc::new(Self {
            client_id,
            inbox_id,
            sync_calls: AtomicUsize::new(0),
            fail_sync: AtomicBool::new(false),
            sync_delay: Mutex::new(Duration::ZERO),
            subscribe_delay: Mutex::new(Duration::ZERO),
            stream_failure: Mutex::new(None),
            policies: Mutex::new(Vec::new()),
            rotated_tags: Mutex::new(Vec::new()),
            synced: Mutex::new(Vec::new()),
            published_invites: Mutex::new(Vec::new()),
        })
    }

    pub fn sync_count(&self) -> usize {
        self.sync_calls.load(Ordering::SeqCst)
    }

    fn stream_delay(&self) -> Duration {
        *self.subscribe_delay.lock().unwrap()
    }

    async fn open_checked(&self) -> Result<(), BackendError> {
        let delay = self.stream_delay();
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
        if let Some(err) = self.stream_failure.lock().unwrap().clone() {
            return Err(err);
        }
        Ok(())
    }
}

#[async_trait]
impl InboxSession for FakeSession {
    fn client_id(&self) -> ClientId {
        self.client_id.clone()
    }

    fn inbox_id(&self) -> InboxId {
        self.inbox_id.clone()
    }

    async fn sync_all_conversations(&self) -> Result<(), BackendError> {
        let delay = *self.sync_delay.lock().unwrap();
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
        self.sync_calls.fetch_add(1, Ordering::SeqCst);
        if self.fail_sync.load(Ordering::SeqCst) {
            return Err(BackendError::Transient("sync failed".into()));
        }
        Ok(())
    }

    async fn stream_conversations(
        &self,
    ) -> Result<EventStream<RemoteConversationEvent>, BackendError> {
        self.open_checked().await?;
        Ok(futures_util::stream::pending().boxed())
    }

    async fn stream_messages(&self) -> Result<EventStream<RemoteMessageEvent>, BackendError> {
        self.open_checked().await?;
        Ok(futures_util::stream::pending().boxed())
    }

    async fn sync_conversation(
        &self,
        conversation_id: &ConversationId,
    ) -> Result<(), BackendError> {
        self.synced.lock().unwrap().push(conversation_id.clone());
        Ok(())
    }

    async fn update_add_member_policy(
        &self,
        conversation_id: &ConversationId,
        policy: AddMemberPolicy,
    ) -> Result<(), BackendError> {
        self.policies
            .lock()
            .unwrap()
            .push((conversation_id.clone(), policy));
        Ok(())
    }

    async fn rotate_invite_tag(
        &self,
        conversation_id: &ConversationId,
        tag: &str,
    ) -> Result<(), BackendError> {
        self.rotated_tags
            .lock()
            .unwrap()
            .push((conversation_id.clone(), tag.to_string()));
        Ok(())
    }

    async fn publish_invite(
        &self,
        conversation_id: &ConversationId,
        tag: &str,
    ) -> Result<String, BackendError> {
        let slug = format!("https://join.example.net/{tag}");
        self.published_invites
            .lock()
            .unwrap()
            .push((conversation_id.clone(), slug.clone()));
        Ok(slug)
    }
}

/// Fake messaging backend minting [`FakeSession`]s.
pub struct FakeBackend {
    pub created: AtomicUsize,
    pub opened: AtomicUsize,
    pub fail_open: AtomicBool,
    pub fail_create: AtomicBool,
    pub create_delay: Mutex<Duration>,
    pub sessions: Mutex<Vec<Arc<FakeSession>>>,
    pub deleted: Mutex<Vec<(ClientId, InboxId)>>,
    /// Configuration applied to every minted session.
    pub default_sync_delay: Mutex<Duration>,
    pub default_subscribe_delay: Mutex<Duration>,
    pub default_stream_failure: Mutex<Option<BackendError>>,
}

impl FakeBackend {
    pub fn new() -> Self {
        Self {
            created: AtomicUsize::new(0),
            opened: AtomicUsize::new(0),
            fail_open: AtomicBool::new(false),
            fail_create: AtomicBool::new(false),
            create_delay: Mutex::new(Duration::ZERO),
            sessions: Mutex::new(Vec::new()),
            deleted: Mutex::new(Vec::new()),
            default_sync_delay: Mutex::new(Duration::ZERO),
            default_subscribe_delay: Mutex::new(Duration::ZERO),
            default_stream_failure: Mutex::new(None),
        }
    }

    fn mint(&self, client_id: ClientId, inbox_id: InboxId) -> Arc<FakeSession> {
        let session = FakeSession::new(client_id, inbox_id);
        *session.sync_delay.lock().unwrap() = *self.default_sync_delay.lock().unwrap();
        *session.subscribe_delay.lock().unwrap() = *self.default_subscribe_delay.lock().unwrap();
        *session.stream_failure.lock().unwrap() =
            self.default_stream_failure.lock().unwrap().clone();
        self.sessions.lock().unwrap().push(session.clone());
        session
    }

    /// The most recently minted session for a client.
    pub fn session_for(&self, client_id: &ClientId) -> Option<Arc<FakeSession>> {
        self.sessions
            .lock()
            .unwrap()
            .iter()
            .rev()
            .find(|s| &s.client_id == client_id)
            .cloned()
    }
}

#[async_trait]
impl MessagingBackend for FakeBackend {
    async fn create_inbox(
        &self,
        _db_key: &DbEncryptionKey,
        _db_directory: &Path,
    ) -> Result<Arc<dyn InboxSession>, BackendError> {
        let delay = *self.create_delay.lock().unwrap();
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
        if self.fail_create.load(Ordering::SeqCst) {
            return Err(BackendError::Transient("create failed".into()));
        }
        self.created.fetch_add(1, Ordering::SeqCst);
        Ok(self.mint(ClientId::generate(), InboxId::generate()))
    }

    async fn open_inbox(
        &self,
        client_id: &ClientId,
        inbox_id: &InboxId,
        _db_key: &DbEncryptionKey,
        _db_directory: &Path,
    ) -> Result<Arc<dyn InboxSession>, BackendError> {
        if self.fail_open.load(Ordering::SeqCst) {
            return Err(BackendError::Transient("open failed".into()));
        }
        self.opened.fetch_add(1, Ordering::SeqCst);
        Ok(self.mint(client_id.clone(), inbox_id.clone()))
    }

    async fn delete_inbox(
        &self,
        client_id: &ClientId,
        inbox_id: &InboxId,
    ) -> Result<(), BackendError> {
        self.deleted
            .lock()
            .unwrap()
            .push((client_id.clone(), inbox_id.clone()));
        Ok(())
    }
}

// ============================================================================
// Secure stores
// ============================================================================

/// In-memory identity store.
pub struct MemoryIdentityStore {
    identities: Mutex<HashMap<ClientId, StoredIdentity>>,
}

impl MemoryIdentityStore {
    pub fn new() -> Self {
        Self {
            identities: Mutex::new(HashMap::new()),
        }
    }

    pub async fn save_identity(&self, client_id: ClientId, inbox_id: InboxId, key: DbEncryptionKey) {
        self.identities.lock().unwrap().insert(
            client_id.clone(),
            StoredIdentity {
                client_id,
                inbox_id,
                db_key: key,
            },
        );
    }

    pub fn contains(&self, client_id: &ClientId) -> bool {
        self.identities.lock().unwrap().contains_key(client_id)
    }
}

#[async_trait]
impl IdentityStore for MemoryIdentityStore {
    async fn save(&self, identity: StoredIdentity) -> Result<(), KeychainError> {
        self.identities
            .lock()
            .unwrap()
            .insert(identity.client_id.clone(), identity);
        Ok(())
    }

    async fn load(&self, client_id: &ClientId) -> Result<Option<StoredIdentity>, KeychainError> {
        Ok(self.identities.lock().unwrap().get(client_id).cloned())
    }

    async fn delete(&self, client_id: &ClientId) -> Result<(), KeychainError> {
        self.identities.lock().unwrap().remove(client_id);
        Ok(())
    }
}

/// In-memory keychain with a failure switch for the marker-delete path.
pub struct MemoryKeychain {
    marker: Mutex<Option<UnusedInboxMarker>>,
    pub fail_next_delete: AtomicBool,
}

impl MemoryKeychain {
    pub fn new() -> Self {
        Self {
            marker: Mutex::new(None),
            fail_next_delete: AtomicBool::new(false),
        }
    }

    pub fn marker(&self) -> Option<UnusedInboxMarker> {
        self.marker.lock().unwrap().clone()
    }

    pub fn set_marker(&self, marker: UnusedInboxMarker) {
        *self.marker.lock().unwrap() = Some(marker);
    }
}

#[async_trait]
impl KeychainService for MemoryKeychain {
    async fn load_marker(&self) -> Result<Option<UnusedInboxMarker>, KeychainError> {
        Ok(self.marker.lock().unwrap().clone())
    }

    async fn store_marker(&self, marker: &UnusedInboxMarker) -> Result<(), KeychainError> {
        *self.marker.lock().unwrap() = Some(marker.clone());
        Ok(())
    }

    async fn delete_marker(&self) -> Result<(), KeychainError> {
        if self.fail_next_delete.swap(false, Ordering::SeqCst) {
            return Err(KeychainError::Access("simulated delete failure".into()));
        }
        *self.marker.lock().unwrap() = None;
        Ok(())
    }
}

// ============================================================================
// Repositories
// ============================================================================

/// In-memory activity projection.
pub struct FakeActivityRepo {
    rows: Mutex<Vec<InboxActivity>>,
}

impl FakeActivityRepo {
    pub fn new() -> Self {
        Self {
            rows: Mutex::new(Vec::new()),
        }
    }

    pub fn push(&self, row: InboxActivity) {
        self.rows.lock().unwrap().push(row);
    }

    pub fn add(
        &self,
        client: &str,
        inbox: &str,
        last_activity: Option<DateTime<Utc>>,
        created_at: DateTime<Utc>,
    ) {
        self.push(InboxActivity {
            client_id: ClientId::from(client),
            inbox_id: InboxId::from(inbox),
            last_activity,
            conversation_count: 1,
            created_at,
        });
    }

    pub fn remove(&self, client_id: &ClientId) {
        self.rows.lock().unwrap().retain(|r| &r.client_id != client_id);
    }
}

fn sort_most_recent_first(rows: &mut [InboxActivity]) {
    rows.sort_by(|a, b| match (&b.last_activity, &a.last_activity) {
        (Some(x), Some(y)) => x.cmp(y),
        (Some(_), None) => std::cmp::Ordering::Greater,
        (None, Some(_)) => std::cmp::Ordering::Less,
        (None, None) => b.created_at.cmp(&a.created_at),
    });
}

#[async_trait]
impl InboxActivityRepo for FakeActivityRepo {
    async fn all(&self) -> Result<Vec<InboxActivity>, RepoError> {
        Ok(self.rows.lock().unwrap().clone())
    }

    async fn for_client(
        &self,
        client_id: &ClientId,
    ) -> Result<Option<InboxActivity>, RepoError> {
        Ok(self
            .rows
            .lock()
            .unwrap()
            .iter()
            .find(|r| &r.client_id == client_id)
            .cloned())
    }

    async fn top(&self, n: usize) -> Result<Vec<InboxActivity>, RepoError> {
        let mut rows = self.rows.lock().unwrap().clone();
        sort_most_recent_first(&mut rows);
        rows.truncate(n);
        Ok(rows)
    }

    async fn least_active_excluding(
        &self,
        excluding: &[ClientId],
    ) -> Result<Option<InboxActivity>, RepoError> {
        let mut rows = self.rows.lock().unwrap().clone();
        rows.retain(|r| !excluding.contains(&r.client_id));
        sort_most_recent_first(&mut rows);
        Ok(rows.pop())
    }
}

/// In-memory pending-invite repository.
pub struct FakeInviteRepo {
    infos: Mutex<Vec<PendingInviteInfo>>,
    stale: Mutex<Vec<ClientId>>,
}

impl FakeInviteRepo {
    pub fn new() -> Self {
        Self {
            infos: Mutex::new(Vec::new()),
            stale: Mutex::new(Vec::new()),
        }
    }

    pub fn add_pending(&self, client: &str, inbox: &str, draft: &str) {
        self.infos.lock().unwrap().push(PendingInviteInfo {
            client_id: ClientId::from(client),
            inbox_id: InboxId::from(inbox),
            pending_conversation_ids: vec![ConversationId::from(draft)],
        });
    }

    pub fn clear_pending(&self, client_id: &ClientId) {
        self.infos.lock().unwrap().retain(|i| &i.client_id != client_id);
    }

    pub fn set_stale(&self, clients: Vec<ClientId>) {
        *self.stale.lock().unwrap() = clients;
    }
}

#[async_trait]
impl PendingInviteRepo for FakeInviteRepo {
    async fn pending_invites(&self) -> Result<Vec<PendingInviteInfo>, RepoError> {
        Ok(self.infos.lock().unwrap().clone())
    }

    async fn has_pending_invites(&self, client_id: &ClientId) -> Result<bool, RepoError> {
        Ok(self
            .infos
            .lock()
            .unwrap()
            .iter()
            .any(|i| &i.client_id == client_id))
    }

    async fn stale_pending_invite_client_ids(
        &self,
        _older_than: DateTime<Utc>,
    ) -> Result<Vec<ClientId>, RepoError> {
        Ok(self.stale.lock().unwrap().clone())
    }
}

/// In-memory conversation repository.
pub struct FakeConversationRepo {
    conversations: Mutex<HashMap<ConversationId, Conversation>>,
    members: Mutex<HashMap<ConversationId, Vec<ConversationMember>>>,
    blobs: Mutex<HashMap<ConversationId, Vec<u8>>>,
}

impl FakeConversationRepo {
    pub fn new() -> Self {
        Self {
            conversations: Mutex::new(HashMap::new()),
            members: Mutex::new(HashMap::new()),
            blobs: Mutex::new(HashMap::new()),
        }
    }

    pub fn insert(&self, conversation: Conversation) {
        self.conversations
            .lock()
            .unwrap()
            .insert(conversation.id.clone(), conversation);
    }

    pub fn insert_simple(&self, id: &str, client: &str, inbox: &str) {
        self.insert(Conversation {
            id: ConversationId::from(id),
            client_id: ClientId::from(client),
            inbox_id: InboxId::from(inbox),
            name: None,
            description: None,
            image_url: None,
            invite_tag: "t-initial".to_string(),
            is_locked: false,
            is_draft: false,
            expires_at: None,
            created_at: Utc::now(),
        });
    }

    pub fn set_member(&self, conversation: &str, inbox: &str, role: MemberRole) {
        let id = ConversationId::from(conversation);
        let mut members = self.members.lock().unwrap();
        let list = members.entry(id).or_default();
        list.retain(|m| m.inbox_id.as_str() != inbox);
        list.push(ConversationMember {
            inbox_id: InboxId::from(inbox),
            role,
        });
    }

    pub fn get(&self, id: &str) -> Option<Conversation> {
        self.conversations
            .lock()
            .unwrap()
            .get(&ConversationId::from(id))
            .cloned()
    }

    pub fn role_of(&self, conversation: &str, inbox: &str) -> Option<MemberRole> {
        self.members
            .lock()
            .unwrap()
            .get(&ConversationId::from(conversation))?
            .iter()
            .find(|m| m.inbox_id.as_str() == inbox)
            .map(|m| m.role)
    }

    pub fn blob(&self, id: &str) -> Option<Vec<u8>> {
        self.blobs
            .lock()
            .unwrap()
            .get(&ConversationId::from(id))
            .cloned()
    }
}

#[async_trait]
impl ConversationRepo for FakeConversationRepo {
    async fn fetch(
        &self,
        conversation_id: &ConversationId,
    ) -> Result<Option<Conversation>, RepoError> {
        Ok(self.conversations.lock().unwrap().get(conversation_id).cloned())
    }

    async fn detailed_query(
        &self,
        client_id: &ClientId,
    ) -> Result<Vec<Conversation>, RepoError> {
        let mut rows: Vec<Conversation> = self
            .conversations
            .lock()
            .unwrap()
            .values()
            .filter(|c| &c.client_id == client_id)
            .cloned()
            .collect();
        rows.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(rows)
    }

    async fn members(
        &self,
        conversation_id: &ConversationId,
    ) -> Result<Vec<ConversationMember>, RepoError> {
        Ok(self
            .members
            .lock()
            .unwrap()
            .get(conversation_id)
            .cloned()
            .unwrap_or_default())
    }

    async fn member_role(
        &self,
        conversation_id: &ConversationId,
        inbox_id: &InboxId,
    ) -> Result<Option<MemberRole>, RepoError> {
        Ok(self
            .members
            .lock()
            .unwrap()
            .get(conversation_id)
            .and_then(|list| list.iter().find(|m| &m.inbox_id == inbox_id))
            .map(|m| m.role))
    }

    async fn future_expirations(
        &self,
        now: DateTime<Utc>,
    ) -> Result<Vec<(ConversationId, DateTime<Utc>)>, RepoError> {
        Ok(self
            .conversations
            .lock()
            .unwrap()
            .values()
            .filter_map(|c| c.expires_at.filter(|t| *t > now).map(|t| (c.id.clone(), t)))
            .collect())
    }

    async fn update_lock_state(
        &self,
        conversation_id: &ConversationId,
        is_locked: bool,
        invite_tag: &str,
    ) -> Result<(), RepoError> {
        let mut conversations = self.conversations.lock().unwrap();
        let conversation = conversations
            .get_mut(conversation_id)
            .ok_or_else(|| RepoError::NotFound(conversation_id.to_string()))?;
        conversation.is_locked = is_locked;
        conversation.invite_tag = invite_tag.to_string();
        Ok(())
    }

    async fn set_expires_at(
        &self,
        conversation_id: &ConversationId,
        expires_at: DateTime<Utc>,
    ) -> Result<(), RepoError> {
        let mut conversations = self.conversations.lock().unwrap();
        let conversation = conversations
            .get_mut(conversation_id)
            .ok_or_else(|| RepoError::NotFound(conversation_id.to_string()))?;
        conversation.expires_at = Some(expires_at);
        Ok(())
    }

    async fn update_metadata_blob(
        &self,
        conversation_id: &ConversationId,
        blob: &[u8],
    ) -> Result<(), RepoError> {
        self.blobs
            .lock()
            .unwrap()
            .insert(conversation_id.clone(), blob.to_vec());
        Ok(())
    }

    async fn delete_for_client(&self, client_id: &ClientId) -> Result<(), RepoError> {
        let mut conversations = self.conversations.lock().unwrap();
        let doomed: Vec<ConversationId> = conversations
            .values()
            .filter(|c| &c.client_id == client_id)
            .map(|c| c.id.clone())
            .collect();
        for id in &doomed {
            conversations.remove(id);
            self.members.lock().unwrap().remove(id);
            self.blobs.lock().unwrap().remove(id);
        }
        Ok(())
    }
}

// ============================================================================
// Platform signals
// ============================================================================

/// Notification center recording every add/remove.
pub struct FakeNotificationCenter {
    pub added: Mutex<Vec<NotificationRequest>>,
    pub removed: Mutex<Vec<String>>,
}

impl FakeNotificationCenter {
    pub fn new() -> Self {
        Self {
            added: Mutex::new(Vec::new()),
            removed: Mutex::new(Vec::new()),
        }
    }

    /// Identifiers added and not yet removed.
    pub fn pending(&self) -> Vec<String> {
        let removed = self.removed.lock().unwrap();
        self.added
            .lock()
            .unwrap()
            .iter()
            .map(|r| r.identifier.clone())
            .filter(|id| !removed.contains(id))
            .collect()
    }

    pub fn request(&self, identifier: &str) -> Option<NotificationRequest> {
        self.added
            .lock()
            .unwrap()
            .iter()
            .rev()
            .find(|r| r.identifier == identifier)
            .cloned()
    }
}

#[async_trait]
impl UserNotificationCenter for FakeNotificationCenter {
    async fn add(&self, request: NotificationRequest) -> Result<(), NotifyError> {
        self.added.lock().unwrap().push(request);
        Ok(())
    }

    async fn remove(&self, identifiers: &[String]) {
        self.removed.lock().unwrap().extend_from_slice(identifiers);
    }
}

/// Network monitor driven by the test.
pub struct FakeNetworkMonitor {
    tx: watch::Sender<NetworkStatus>,
}

impl FakeNetworkMonitor {
    pub fn new(initial: NetworkStatus) -> Self {
        let (tx, _) = watch::channel(initial);
        Self { tx }
    }

    pub fn set(&self, status: NetworkStatus) {
        self.tx.send_replace(status);
    }
}

impl NetworkMonitor for FakeNetworkMonitor {
    fn subscribe(&self) -> watch::Receiver<NetworkStatus> {
        self.tx.subscribe()
    }
}

/// App lifecycle driven by the test.
pub struct FakeAppLifecycle {
    tx: broadcast::Sender<()>,
}

impl FakeAppLifecycle {
    pub fn new() -> Self {
        let (tx, _) = broadcast::channel(8);
        Self { tx }
    }

    pub fn fire_did_become_active(&self) {
        let _ = self.tx.send(());
    }
}

impl AppLifecycle for FakeAppLifecycle {
    fn did_become_active(&self) -> broadcast::Receiver<()> {
        self.tx.subscribe()
    }
}
