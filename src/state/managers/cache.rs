//! Unused-inbox cache.
//!
//! Keeps at most one fully-initialized, never-used inbox reserved so that
//! creating a new inbox appears instantaneous. The reservation lives in
//! two stores: the ready session handle in memory and a `{client_id,
//! inbox_id}` marker in the keychain (the only core-owned state that
//! survives restarts).
//!
//! The single hard invariant is at-most-one-consumer: under N concurrent
//! `consume_or_create` calls, every call returns a distinct inbox. The
//! cache holds its mutex across the whole of `consume_or_create`, so
//! concurrent callers serialize; even the synchronous-create fallback runs
//! to completion before the next caller observes the post-state.

use crate::error::CacheError;
use crate::ports::{
    IdentityStore, InboxSession, KeychainService, MessagingBackend, StoredIdentity,
    UnusedInboxMarker,
};
use crate::types::{ClientId, DbEncryptionKey, InboxId};
use std::collections::HashSet;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

/// A ready-to-use inbox handed out by the cache. After `consume_or_create`
/// returns, ownership of the session transfers to the caller.
#[derive(Clone)]
pub struct PreparedInbox {
    pub session: Arc<dyn InboxSession>,
}

impl PreparedInbox {
    pub fn client_id(&self) -> ClientId {
        self.session.client_id()
    }

    pub fn inbox_id(&self) -> InboxId {
        self.session.inbox_id()
    }
}

struct Slot {
    /// In-memory reservation.
    ready: Option<PreparedInbox>,
    /// A background preparation is in flight.
    preparing: bool,
    /// Every inbox id ever handed out by this cache instance. Guards the
    /// at-most-one-consumer invariant; a repeat is state corruption.
    consumed: HashSet<InboxId>,
}

/// Single-consumer reservation of one pre-warmed inbox identity.
pub struct UnusedInboxCache {
    slot: Mutex<Slot>,
    backend: Arc<dyn MessagingBackend>,
    identities: Arc<dyn IdentityStore>,
    keychain: Arc<dyn KeychainService>,
    db_directory: PathBuf,
}

impl UnusedInboxCache {
    pub fn new(
        backend: Arc<dyn MessagingBackend>,
        identities: Arc<dyn IdentityStore>,
        keychain: Arc<dyn KeychainService>,
        db_directory: PathBuf,
    ) -> Arc<Self> {
        Arc::new(Self {
            slot: Mutex::new(Slot {
                ready: None,
                preparing: false,
                consumed: HashSet::new(),
            }),
            backend,
            identities,
            keychain,
            db_directory,
        })
    }

    /// Start a background preparation unless a reservation already exists
    /// in memory, in the keychain, or is already being prepared.
    pub async fn prepare_if_needed(self: &Arc<Self>) -> Result<(), CacheError> {
        let mut slot = self.slot.lock().await;
        if slot.ready.is_some() || slot.preparing {
            return Ok(());
        }
        if self.keychain.load_marker().await?.is_some() {
            // A reservation from a previous run is waiting in the
            // keychain; consume will hydrate it.
            return Ok(());
        }
        slot.preparing = true;
        drop(slot);

        let cache = Arc::clone(self);
        tokio::spawn(async move {
            let minted = cache.mint_inbox().await;

            // Commit under the slot lock so a concurrent consume can never
            // observe the marker without the memory slot (or vice versa).
            let mut slot = cache.slot.lock().await;
            slot.preparing = false;
            match minted {
                Ok(prepared) => {
                    let marker = UnusedInboxMarker {
                        client_id: prepared.client_id(),
                        inbox_id: prepared.inbox_id(),
                    };
                    match cache.keychain.store_marker(&marker).await {
                        Ok(()) => {
                            info!(inbox_id = %prepared.inbox_id(), "unused inbox prepared");
                            slot.ready = Some(prepared);
                        }
                        Err(e) => {
                            warn!(error = %e, code = e.error_code(),
                                  "failed to persist unused-inbox marker");
                        }
                    }
                }
                Err(e) => {
                    // Logged and discarded; the next consume falls back to
                    // a synchronous create.
                    warn!(error = %e, code = e.error_code(), "unused-inbox preparation failed");
                }
            }
        });
        Ok(())
    }

    /// Take the reservation, or create a fresh inbox if none is warm.
    ///
    /// Atomic from the caller's perspective: on return both the in-memory
    /// slot and the keychain marker for the returned inbox are cleared,
    /// and no concurrent call can observe the same reservation.
    pub async fn consume_or_create(self: &Arc<Self>) -> Result<PreparedInbox, CacheError> {
        let mut slot = self.slot.lock().await;

        let prepared = if let Some(prepared) = slot.ready.take() {
            if let Err(e) = self.keychain.delete_marker().await {
                // Leaving the marker behind while handing out the session
                // could double-assign the identity later. Put the
                // reservation back and surface the failure instead.
                slot.ready = Some(prepared);
                return Err(e.into());
            }
            debug!(inbox_id = %prepared.inbox_id(), "consumed in-memory reservation");
            prepared
        } else if let Some(marker) = self.keychain.load_marker().await? {
            match self.hydrate(&marker).await {
                Ok(prepared) => {
                    self.keychain.delete_marker().await?;
                    debug!(inbox_id = %prepared.inbox_id(), "consumed keychain reservation");
                    prepared
                }
                Err(e) => {
                    // A marker that no longer hydrates is dead weight;
                    // drop it and fall back to a fresh create.
                    warn!(error = %e, code = e.error_code(),
                          "stale unused-inbox marker, discarding");
                    self.keychain.delete_marker().await?;
                    self.mint_inbox().await?
                }
            }
        } else {
            debug!("no reservation warm, creating inbox synchronously");
            self.mint_inbox().await?
        };

        // Invariant: each consume returns a distinct inbox. A repeat means
        // the same identity would back two user-visible conversations.
        assert!(
            slot.consumed.insert(prepared.inbox_id()),
            "unused inbox {} consumed twice",
            prepared.inbox_id()
        );

        drop(slot);

        // Refill opportunistically; failures are logged inside.
        let cache = Arc::clone(self);
        tokio::spawn(async move {
            let _ = cache.prepare_if_needed().await;
        });

        Ok(prepared)
    }

    /// Drop the reservation from both stores without consuming it.
    pub async fn clear(&self) -> Result<(), CacheError> {
        let mut slot = self.slot.lock().await;
        slot.ready = None;
        self.keychain.delete_marker().await?;
        Ok(())
    }

    /// True iff `inbox_id` is the current reservation (memory or
    /// keychain). Rebalance consults this so the reserved identity is
    /// never woken before it is consumed.
    pub async fn is_unused_inbox(&self, inbox_id: &InboxId) -> bool {
        self.reserved_inbox_id().await.as_ref() == Some(inbox_id)
    }

    /// The reservation's inbox id, if one exists in either store.
    pub async fn reserved_inbox_id(&self) -> Option<InboxId> {
        let slot = self.slot.lock().await;
        if let Some(ready) = &slot.ready {
            return Some(ready.inbox_id());
        }
        drop(slot);
        match self.keychain.load_marker().await {
            Ok(marker) => marker.map(|m| m.inbox_id),
            Err(e) => {
                warn!(error = %e, "failed to read unused-inbox marker");
                None
            }
        }
    }

    pub async fn has_unused(&self) -> bool {
        self.reserved_inbox_id().await.is_some()
    }

    /// Mint a brand-new identity: fresh db key, backend registration, open
    /// database, identity saved for later reopening.
    async fn mint_inbox(&self) -> Result<PreparedInbox, CacheError> {
        let db_key = DbEncryptionKey::generate();
        let session = self.backend.create_inbox(&db_key, &self.db_directory).await?;
        self.identities
            .save(StoredIdentity {
                client_id: session.client_id(),
                inbox_id: session.inbox_id(),
                db_key,
            })
            .await?;
        Ok(PreparedInbox { session })
    }

    /// Reopen a reservation persisted by a previous run.
    async fn hydrate(&self, marker: &UnusedInboxMarker) -> Result<PreparedInbox, CacheError> {
        let identity = self
            .identities
            .load(&marker.client_id)
            .await?
            .ok_or_else(|| {
                crate::error::KeychainError::Access(format!(
                    "no identity for marker client {}",
                    marker.client_id
                ))
            })?;
        let session = self
            .backend
            .open_inbox(
                &marker.client_id,
                &marker.inbox_id,
                &identity.db_key,
                &self.db_directory,
            )
            .await?;
        Ok(PreparedInbox { session })
    }
}
