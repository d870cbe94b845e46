//! Inbox lifecycle manager.
//!
//! Owns the awake/sleeping partition of all known inboxes under an overall
//! capacity (`max_awake_inboxes`) and a pending-invite sub-cap. Admission
//! evicts the least-recently-active eligible inbox; the active inbox,
//! inboxes holding pending invites (up to the sub-cap), and just-created
//! inboxes are pinned against eviction.
//!
//! The manager is an actor realized as an async-mutex-guarded partition:
//! every public method holds the lock for its whole body, including the
//! coordinator start/stop awaits, so operations serialize in submission
//! order. No child task of a coordinator ever locks the manager; the only
//! external task that does (the termination watcher) is never awaited by a
//! manager method, so the joins inside `sleep`/`stop_all` cannot deadlock.

use crate::config::RuntimeConfig;
use crate::error::LifecycleError;
use crate::ports::{
    IdentityStore, InboxActivityRepo, InboxSession, MessagingBackend, PendingInviteRepo,
};
use crate::state::coordinator::SyncCoordinator;
use crate::state::managers::cache::UnusedInboxCache;
use crate::types::{ClientId, InboxActivity, InboxId, PendingInviteInfo, WakeReason};
use chrono::{DateTime, Utc};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

/// An awake inbox: its coordinator and the live backend session.
struct AwakeEntry {
    inbox_id: InboxId,
    coordinator: Arc<SyncCoordinator>,
    session: Arc<dyn InboxSession>,
}

/// A sleeping inbox: cold but remembered, polled by the external sweeper.
struct SleepingEntry {
    inbox_id: InboxId,
    went_to_sleep_at: DateTime<Utc>,
}

#[derive(Default)]
struct Partition {
    awake: HashMap<ClientId, AwakeEntry>,
    sleeping: HashMap<ClientId, SleepingEntry>,
    active_client: Option<ClientId>,
    /// Just-created inboxes pinned for the construction window. Entries
    /// expire lazily against `Instant::now()`.
    in_construction: HashMap<ClientId, Instant>,
    /// Stale pending invites identified at launch. Deletion belongs to an
    /// external sweeper; the manager only flags.
    stale_pending_invites: Vec<ClientId>,
}

/// Result of `create_new_inbox`.
pub struct NewInbox {
    pub client_id: ClientId,
    pub inbox_id: InboxId,
    pub coordinator: Arc<SyncCoordinator>,
}

/// Snapshot of the partition for logging and diagnostics.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LifecycleStats {
    pub awake: usize,
    pub sleeping: usize,
    pub in_construction: usize,
    pub has_active: bool,
}

/// Capacity-bounded LRU scheduler over all known inboxes.
pub struct InboxLifecycleManager {
    state: Mutex<Partition>,
    config: RuntimeConfig,
    backend: Arc<dyn MessagingBackend>,
    identities: Arc<dyn IdentityStore>,
    activity: Arc<dyn InboxActivityRepo>,
    invites: Arc<dyn PendingInviteRepo>,
    cache: Arc<UnusedInboxCache>,
}

impl InboxLifecycleManager {
    pub fn new(
        config: RuntimeConfig,
        backend: Arc<dyn MessagingBackend>,
        identities: Arc<dyn IdentityStore>,
        activity: Arc<dyn InboxActivityRepo>,
        invites: Arc<dyn PendingInviteRepo>,
        cache: Arc<UnusedInboxCache>,
    ) -> Arc<Self> {
        Arc::new(Self {
            state: Mutex::new(Partition::default()),
            config,
            backend,
            identities,
            activity,
            invites,
            cache,
        })
    }

    // ========================================================================
    // Read accessors
    // ========================================================================

    pub async fn awake_client_ids(&self) -> Vec<ClientId> {
        self.state.lock().await.awake.keys().cloned().collect()
    }

    pub async fn sleeping_client_ids(&self) -> Vec<ClientId> {
        self.state.lock().await.sleeping.keys().cloned().collect()
    }

    pub async fn is_awake(&self, client_id: &ClientId) -> bool {
        self.state.lock().await.awake.contains_key(client_id)
    }

    pub async fn is_sleeping(&self, client_id: &ClientId) -> bool {
        self.state.lock().await.sleeping.contains_key(client_id)
    }

    pub async fn active_client_id(&self) -> Option<ClientId> {
        self.state.lock().await.active_client.clone()
    }

    /// When the client went to sleep, if it is sleeping.
    pub async fn sleep_time(&self, client_id: &ClientId) -> Option<DateTime<Utc>> {
        self.state
            .lock()
            .await
            .sleeping
            .get(client_id)
            .map(|e| e.went_to_sleep_at)
    }

    /// The coordinator currently serving a client, if awake.
    pub async fn coordinator_for(&self, client_id: &ClientId) -> Option<Arc<SyncCoordinator>> {
        self.state
            .lock()
            .await
            .awake
            .get(client_id)
            .map(|e| e.coordinator.clone())
    }

    /// The live backend session of an awake client. Conversation-level
    /// operations (lock/unlock) run against this handle.
    pub async fn session_for(&self, client_id: &ClientId) -> Option<Arc<dyn InboxSession>> {
        self.state
            .lock()
            .await
            .awake
            .get(client_id)
            .map(|e| e.session.clone())
    }

    /// Clients flagged at launch as holding stale pending invites, for the
    /// external sweeper.
    pub async fn stale_pending_invite_clients(&self) -> Vec<ClientId> {
        self.state.lock().await.stale_pending_invites.clone()
    }

    pub async fn stats(&self) -> LifecycleStats {
        let part = self.state.lock().await;
        LifecycleStats {
            awake: part.awake.len(),
            sleeping: part.sleeping.len(),
            in_construction: part.in_construction.len(),
            has_active: part.active_client.is_some(),
        }
    }

    // ========================================================================
    // Operations
    // ========================================================================

    /// Wake an inbox, evicting the least-recently-active eligible inbox if
    /// at capacity. Idempotent on an already-awake client.
    pub async fn wake(
        self: &Arc<Self>,
        client_id: &ClientId,
        inbox_id: &InboxId,
        reason: WakeReason,
    ) -> Result<Arc<SyncCoordinator>, LifecycleError> {
        let mut part = self.state.lock().await;
        self.wake_locked(&mut part, client_id, inbox_id, reason).await
    }

    /// Existing coordinator if awake, otherwise wake with the same
    /// eviction rules.
    pub async fn get_or_wake(
        self: &Arc<Self>,
        client_id: &ClientId,
        inbox_id: &InboxId,
    ) -> Result<Arc<SyncCoordinator>, LifecycleError> {
        let mut part = self.state.lock().await;
        if let Some(entry) = part.awake.get(client_id) {
            return Ok(entry.coordinator.clone());
        }
        self.wake_locked(&mut part, client_id, inbox_id, WakeReason::UserInteraction)
            .await
    }

    /// Move a client to the sleeping set, unless it is the active client
    /// or a pending-invite client still needed to satisfy the sub-cap.
    /// In either case the call is a no-op.
    pub async fn sleep(&self, client_id: &ClientId) {
        let mut part = self.state.lock().await;
        if !part.awake.contains_key(client_id) {
            return;
        }
        if !self.may_sleep(&part, client_id).await {
            debug!(client_id = %client_id, "sleep refused: pinned");
            return;
        }
        self.sleep_unchecked(&mut part, client_id).await;
    }

    /// Record (or clear) the foregrounded client. A non-nil active client
    /// is pinned awake and excluded from eviction.
    pub async fn set_active_client(&self, client_id: Option<ClientId>) {
        let mut part = self.state.lock().await;
        debug!(active = ?client_id, "active client changed");
        part.active_client = client_id;
    }

    /// Reconcile the awake/sleeping partition against the current target
    /// set (pinned clients plus recency fill).
    pub async fn rebalance(self: &Arc<Self>) -> Result<(), LifecycleError> {
        let mut part = self.state.lock().await;
        self.rebalance_locked(&mut part).await
    }

    /// App-launch initialization: flag stale pending invites, populate the
    /// awake set with no active client, and stamp `went_to_sleep_at` on
    /// every sleeping inbox so the external sweeper can poll them.
    pub async fn initialize_on_app_launch(self: &Arc<Self>) -> Result<(), LifecycleError> {
        let mut part = self.state.lock().await;

        let cutoff = Utc::now() - self.config.stale_pending_invite_interval();
        match self.invites.stale_pending_invite_client_ids(cutoff).await {
            Ok(stale) => {
                if !stale.is_empty() {
                    info!(count = stale.len(), "flagged stale pending invites");
                }
                part.stale_pending_invites = stale;
            }
            Err(e) => warn!(error = %e, "failed to identify stale pending invites"),
        }

        part.active_client = None;
        self.rebalance_locked(&mut part).await?;

        let now = Utc::now();
        for entry in part.sleeping.values_mut() {
            entry.went_to_sleep_at = now;
        }
        Ok(())
    }

    /// Consume (or create) the pre-warmed inbox, register it awake inside
    /// its construction window, and make it the active client.
    pub async fn create_new_inbox(self: &Arc<Self>) -> Result<NewInbox, LifecycleError> {
        let mut part = self.state.lock().await;

        let prepared = self.cache.consume_or_create().await?;
        let client_id = prepared.client_id();
        let inbox_id = prepared.inbox_id();

        let coordinator = Arc::new(SyncCoordinator::new());
        coordinator
            .start(prepared.session.clone())
            .await
            .map_err(|source| LifecycleError::CoordinatorStart {
                client_id: client_id.clone(),
                source,
            })?;

        // The construction window pins the newborn against a concurrent
        // rebalance evicting it while its activity row still reads as
        // null. Admission bypasses eviction; capacity may transiently
        // exceed the limit until the window lapses.
        part.in_construction.insert(client_id.clone(), Instant::now());
        part.sleeping.remove(&client_id);
        part.awake.insert(
            client_id.clone(),
            AwakeEntry {
                inbox_id: inbox_id.clone(),
                coordinator: coordinator.clone(),
                session: prepared.session,
            },
        );
        part.active_client = Some(client_id.clone());
        self.spawn_termination_watcher(client_id.clone(), &coordinator);

        info!(client_id = %client_id, inbox_id = %inbox_id, "new inbox created and active");
        Ok(NewInbox {
            client_id,
            inbox_id,
            coordinator,
        })
    }

    /// Unconditionally remove a client from both sets. Clears the active
    /// pin if it pointed at this client.
    pub async fn force_remove(&self, client_id: &ClientId) {
        let mut part = self.state.lock().await;
        if let Some(entry) = part.awake.remove(client_id) {
            entry.coordinator.stop().await;
        }
        part.sleeping.remove(client_id);
        part.in_construction.remove(client_id);
        if part.active_client.as_ref() == Some(client_id) {
            part.active_client = None;
        }
        info!(client_id = %client_id, "force removed");
    }

    /// Stop every coordinator and empty both sets.
    pub async fn stop_all(&self) {
        let mut part = self.state.lock().await;
        let awake = std::mem::take(&mut part.awake);
        for (client_id, entry) in awake {
            debug!(client_id = %client_id, "stopping coordinator");
            entry.coordinator.stop().await;
        }
        part.sleeping.clear();
        part.in_construction.clear();
        part.active_client = None;
        info!("all inboxes stopped");
    }

    /// Pause every awake coordinator (network loss). Membership in the
    /// awake set is untouched.
    pub async fn pause_all(&self) {
        let part = self.state.lock().await;
        for entry in part.awake.values() {
            entry.coordinator.pause().await;
        }
    }

    /// Resume every awake coordinator (network recovered).
    pub async fn resume_all(&self) {
        let part = self.state.lock().await;
        for entry in part.awake.values() {
            entry.coordinator.resume().await;
        }
    }

    // ========================================================================
    // Internals
    // ========================================================================

    async fn wake_locked(
        self: &Arc<Self>,
        part: &mut Partition,
        client_id: &ClientId,
        inbox_id: &InboxId,
        reason: WakeReason,
    ) -> Result<Arc<SyncCoordinator>, LifecycleError> {
        if let Some(entry) = part.awake.get(client_id) {
            debug!(client_id = %client_id, reason = reason.as_str(), "wake: already awake");
            return Ok(entry.coordinator.clone());
        }

        // The cache's reservation is invisible to the scheduler until
        // consumed; waking it would create dual tracking.
        if self.cache.is_unused_inbox(inbox_id).await {
            return Err(LifecycleError::ReservedInbox(inbox_id.clone()));
        }

        if part.awake.len() >= self.config.max_awake_inboxes {
            match self.select_victim(part).await? {
                Some(victim) => {
                    info!(victim = %victim, reason = reason.as_str(), "evicting for admission");
                    self.sleep_unchecked(part, &victim).await;
                }
                None => {
                    // Every awake client is pinned. Admission still
                    // succeeds; a later rebalance restores the capacity
                    // invariant once pins lapse.
                    warn!(
                        awake = part.awake.len(),
                        "no eviction candidate, exceeding capacity"
                    );
                }
            }
        }

        let identity = self
            .identities
            .load(client_id)
            .await?
            .ok_or_else(|| LifecycleError::IdentityMissing(client_id.clone()))?;
        let session = self
            .backend
            .open_inbox(client_id, inbox_id, &identity.db_key, &self.config.db_directory)
            .await?;

        let coordinator = Arc::new(SyncCoordinator::new());
        coordinator
            .start(session.clone())
            .await
            .map_err(|source| LifecycleError::CoordinatorStart {
                client_id: client_id.clone(),
                source,
            })?;

        part.sleeping.remove(client_id);
        part.awake.insert(
            client_id.clone(),
            AwakeEntry {
                inbox_id: inbox_id.clone(),
                coordinator: coordinator.clone(),
                session,
            },
        );
        self.spawn_termination_watcher(client_id.clone(), &coordinator);

        info!(client_id = %client_id, inbox_id = %inbox_id, reason = reason.as_str(),
              awake = part.awake.len(), "inbox awake");
        Ok(coordinator)
    }

    /// Sleep rules: the active client never sleeps; a pending-invite
    /// client only sleeps while the pending-invite awake count exceeds the
    /// sub-cap.
    async fn may_sleep(&self, part: &Partition, client_id: &ClientId) -> bool {
        if part.active_client.as_ref() == Some(client_id) {
            return false;
        }
        if in_construction_window(part, client_id, self.config.new_inbox_construction_window()) {
            return false;
        }
        match self.invites.has_pending_invites(client_id).await {
            Ok(true) => {
                let awake_pending = self.awake_pending_count(part).await;
                awake_pending > self.config.max_awake_pending_invites
            }
            Ok(false) => true,
            Err(e) => {
                // Cannot prove the client is safe to sleep; keep it awake.
                warn!(client_id = %client_id, error = %e, "pending-invite lookup failed");
                false
            }
        }
    }

    async fn awake_pending_count(&self, part: &Partition) -> usize {
        match self.invites.pending_invites().await {
            Ok(infos) => infos
                .iter()
                .filter(|info| part.awake.contains_key(&info.client_id))
                .count(),
            Err(e) => {
                warn!(error = %e, "pending-invite enumeration failed");
                0
            }
        }
    }

    /// Move a vetted client to the sleeping set and stop its coordinator.
    async fn sleep_unchecked(&self, part: &mut Partition, client_id: &ClientId) {
        let Some(entry) = part.awake.remove(client_id) else {
            return;
        };
        entry.coordinator.stop().await;
        part.sleeping.insert(
            client_id.clone(),
            SleepingEntry {
                inbox_id: entry.inbox_id,
                went_to_sleep_at: Utc::now(),
            },
        );
        info!(client_id = %client_id, "inbox sleeping");
    }

    /// Pick the eviction victim among awake, unpinned clients.
    async fn select_victim(
        &self,
        part: &Partition,
    ) -> Result<Option<ClientId>, LifecycleError> {
        let pinned = self.pinned_set(part).await?;
        let activity = self.activity.all().await?;
        let by_client: HashMap<&ClientId, &InboxActivity> =
            activity.iter().map(|a| (&a.client_id, a)).collect();

        let now = Utc::now();
        let candidates: Vec<InboxActivity> = part
            .awake
            .iter()
            .filter(|(client_id, _)| !pinned.contains(*client_id))
            .map(|(client_id, entry)| {
                by_client.get(client_id).copied().cloned().unwrap_or_else(|| {
                    // Not yet in the projection: behave like a newborn
                    // with no activity.
                    InboxActivity {
                        client_id: client_id.clone(),
                        inbox_id: entry.inbox_id.clone(),
                        last_activity: None,
                        conversation_count: 0,
                        created_at: now,
                    }
                })
            })
            .collect();

        Ok(select_eviction_victim(
            &candidates,
            self.config.new_inbox_protection_window(),
            now,
        ))
    }

    /// The pinned set: active client, construction-window members, and
    /// pending-invite clients up to the sub-cap by recency.
    async fn pinned_set(&self, part: &Partition) -> Result<HashSet<ClientId>, LifecycleError> {
        let mut pinned: HashSet<ClientId> = HashSet::new();
        if let Some(active) = &part.active_client {
            pinned.insert(active.clone());
        }
        let window = self.config.new_inbox_construction_window();
        for (client_id, since) in &part.in_construction {
            if since.elapsed() < window {
                pinned.insert(client_id.clone());
            }
        }
        let activity = self.activity.all().await?;
        let invites = self.invites.pending_invites().await?;
        for client_id in cap_pending_by_recency(
            &invites,
            &activity,
            self.config.max_awake_pending_invites,
        ) {
            pinned.insert(client_id);
        }
        Ok(pinned)
    }

    async fn rebalance_locked(
        self: &Arc<Self>,
        part: &mut Partition,
    ) -> Result<(), LifecycleError> {
        // Prune lapsed construction windows first; an expired pin must not
        // shape the target set.
        let window = self.config.new_inbox_construction_window();
        part.in_construction.retain(|_, since| since.elapsed() < window);

        let activity = self.activity.all().await?;
        let invites = self.invites.pending_invites().await?;
        let reserved = self.cache.reserved_inbox_id().await;

        let construction: HashSet<ClientId> = part.in_construction.keys().cloned().collect();
        let plan = compute_target_set(&TargetParams {
            activity: &activity,
            invites: &invites,
            active_client: part.active_client.as_ref(),
            in_construction: &construction,
            reserved_inbox: reserved.as_ref(),
            max_awake: self.config.max_awake_inboxes,
            max_awake_pending: self.config.max_awake_pending_invites,
            protection_window: self.config.new_inbox_protection_window(),
            now: Utc::now(),
        });

        // Sleep awake clients that fell out of the target, honouring the
        // sleep no-op rules.
        let to_sleep: Vec<ClientId> = part
            .awake
            .keys()
            .filter(|c| !plan.target.contains(*c))
            .cloned()
            .collect();
        for client_id in to_sleep {
            if self.may_sleep(part, &client_id).await {
                self.sleep_unchecked(part, &client_id).await;
            }
        }

        // Wake target members that are not yet awake. Failures here are
        // logged, not surfaced: rebalance is background reconciliation.
        let inbox_by_client: HashMap<&ClientId, &InboxId> = activity
            .iter()
            .map(|a| (&a.client_id, &a.inbox_id))
            .collect();
        let to_wake: Vec<ClientId> = plan
            .target
            .iter()
            .filter(|c| !part.awake.contains_key(*c))
            .cloned()
            .collect();
        for client_id in to_wake {
            let inbox_id = match inbox_by_client.get(&client_id) {
                Some(inbox_id) => (*inbox_id).clone(),
                None => match part.sleeping.get(&client_id) {
                    Some(entry) => entry.inbox_id.clone(),
                    None => continue,
                },
            };
            if let Err(e) = self
                .wake_locked(part, &client_id, &inbox_id, WakeReason::ActivityRanking)
                .await
            {
                warn!(client_id = %client_id, error = %e, code = e.error_code(),
                      "rebalance wake failed");
            }
        }

        // Adopt known inboxes that ended up in neither set: they are
        // sleeping from the sweeper's point of view. The cache's
        // reservation stays untracked until consumed.
        let now = Utc::now();
        for row in &activity {
            if part.awake.contains_key(&row.client_id)
                || part.sleeping.contains_key(&row.client_id)
            {
                continue;
            }
            if reserved.as_ref() == Some(&row.inbox_id) {
                continue;
            }
            part.sleeping.insert(
                row.client_id.clone(),
                SleepingEntry {
                    inbox_id: row.inbox_id.clone(),
                    went_to_sleep_at: now,
                },
            );
        }

        debug!(awake = part.awake.len(), sleeping = part.sleeping.len(), "rebalanced");
        Ok(())
    }

    /// Watch for the coordinator's termination signal. On death the client
    /// moves to absent (not sleeping); an explicit wake resurrects it.
    fn spawn_termination_watcher(
        self: &Arc<Self>,
        client_id: ClientId,
        coordinator: &Arc<SyncCoordinator>,
    ) {
        let mut terminated = coordinator.terminated();
        let manager = Arc::downgrade(self);
        let coordinator = Arc::downgrade(coordinator);
        tokio::spawn(async move {
            loop {
                if *terminated.borrow() {
                    break;
                }
                if terminated.changed().await.is_err() {
                    // Coordinator dropped without terminating.
                    return;
                }
            }
            let (Some(manager), Some(coordinator)) = (manager.upgrade(), coordinator.upgrade())
            else {
                return;
            };
            manager
                .handle_coordinator_termination(&client_id, &coordinator)
                .await;
        });
    }

    async fn handle_coordinator_termination(
        &self,
        client_id: &ClientId,
        coordinator: &Arc<SyncCoordinator>,
    ) {
        let mut part = self.state.lock().await;
        let matches = part
            .awake
            .get(client_id)
            .is_some_and(|entry| Arc::ptr_eq(&entry.coordinator, coordinator));
        if !matches {
            return;
        }
        warn!(client_id = %client_id, "coordinator died, removing inbox");
        if let Some(entry) = part.awake.remove(client_id) {
            entry.coordinator.stop().await;
        }
        part.in_construction.remove(client_id);
        if part.active_client.as_ref() == Some(client_id) {
            part.active_client = None;
        }
    }
}

fn in_construction_window(
    part: &Partition,
    client_id: &ClientId,
    window: std::time::Duration,
) -> bool {
    part.in_construction
        .get(client_id)
        .is_some_and(|since| since.elapsed() < window)
}

// ============================================================================
// Planning (pure)
// ============================================================================

/// Eviction recency key. Null activity sorts newest so fresh inboxes are
/// not evicted, except once the installation is older than the protection
/// window, when it sorts oldest.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
enum RecencyKey {
    ForcedOldest,
    At(DateTime<Utc>),
    NeverNewest,
}

fn recency_key(
    activity: &InboxActivity,
    protection_window: chrono::Duration,
    now: DateTime<Utc>,
) -> RecencyKey {
    match activity.last_activity {
        Some(t) => RecencyKey::At(t),
        None if activity.created_at < now - protection_window => RecencyKey::ForcedOldest,
        None => RecencyKey::NeverNewest,
    }
}

/// Choose the eviction victim: smallest recency key, ties broken by
/// smallest `created_at`, then lexicographically smallest client id.
fn select_eviction_victim(
    candidates: &[InboxActivity],
    protection_window: chrono::Duration,
    now: DateTime<Utc>,
) -> Option<ClientId> {
    candidates
        .iter()
        .min_by(|a, b| {
            recency_key(a, protection_window, now)
                .cmp(&recency_key(b, protection_window, now))
                .then_with(|| a.created_at.cmp(&b.created_at))
                .then_with(|| a.client_id.cmp(&b.client_id))
        })
        .map(|a| a.client_id.clone())
}

/// Pending-invite clients ordered by recency, truncated to the sub-cap.
fn cap_pending_by_recency(
    invites: &[PendingInviteInfo],
    activity: &[InboxActivity],
    cap: usize,
) -> Vec<ClientId> {
    let by_client: HashMap<&ClientId, &InboxActivity> =
        activity.iter().map(|a| (&a.client_id, a)).collect();
    let mut ranked: Vec<&PendingInviteInfo> = invites.iter().collect();
    // Most recent first; never-active drafts rank by installation age.
    ranked.sort_by(|a, b| {
        let ka = by_client
            .get(&a.client_id)
            .map(|x| (x.last_activity, x.created_at));
        let kb = by_client
            .get(&b.client_id)
            .map(|x| (x.last_activity, x.created_at));
        kb.cmp(&ka).then_with(|| a.client_id.cmp(&b.client_id))
    });
    ranked
        .into_iter()
        .take(cap)
        .map(|info| info.client_id.clone())
        .collect()
}

struct TargetParams<'a> {
    activity: &'a [InboxActivity],
    invites: &'a [PendingInviteInfo],
    active_client: Option<&'a ClientId>,
    in_construction: &'a HashSet<ClientId>,
    reserved_inbox: Option<&'a InboxId>,
    max_awake: usize,
    max_awake_pending: usize,
    protection_window: chrono::Duration,
    now: DateTime<Utc>,
}

struct TargetPlan {
    target: HashSet<ClientId>,
}

/// Compute the target awake set: the pinned set, then remaining capacity
/// filled by recency from the activity projection.
fn compute_target_set(params: &TargetParams<'_>) -> TargetPlan {
    let mut target: HashSet<ClientId> = HashSet::new();

    if let Some(active) = params.active_client {
        target.insert(active.clone());
    }
    for client_id in params.in_construction {
        target.insert(client_id.clone());
    }
    for client_id in cap_pending_by_recency(
        params.invites,
        params.activity,
        params.max_awake_pending,
    ) {
        target.insert(client_id);
    }

    // Pending-invite clients are admitted exclusively through the capped
    // pinned portion above; the recency fill never readmits the excess.
    let pending: HashSet<&ClientId> =
        params.invites.iter().map(|info| &info.client_id).collect();

    let mut ranked: Vec<&InboxActivity> = params.activity.iter().collect();
    ranked.sort_by(|a, b| {
        (b.last_activity, b.created_at).cmp(&(a.last_activity, a.created_at))
    });
    for activity in ranked {
        if target.len() >= params.max_awake {
            break;
        }
        if target.contains(&activity.client_id) || pending.contains(&activity.client_id) {
            continue;
        }
        if params.reserved_inbox == Some(&activity.inbox_id) {
            continue;
        }
        // Young inboxes with no activity are left asleep; they have
        // nothing to stream yet and would only displace real traffic.
        if activity.last_activity.is_none()
            && activity.created_at > params.now - params.protection_window
        {
            continue;
        }
        target.insert(activity.client_id.clone());
    }

    TargetPlan { target }
}
