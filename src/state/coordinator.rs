//! Per-inbox sync coordinator.
//!
//! For one awake inbox, supervises the conversation stream, the message
//! stream, and the one-time bulk sync, exposing the readiness contract
//! consumed by UI gating and push delivery: `is_sync_ready` is true iff
//! both streams have completed their subscription handshake AND the
//! initial `sync_all_conversations` has returned (success or failure -
//! failure still unblocks readiness because the streams keep delivering
//! incrementally).
//!
//! Locking rule: child tasks never lock the coordinator. They communicate
//! through the activation's cancellation token, the shared state channel,
//! and atomics. Public methods may therefore hold the inner mutex across
//! awaits (including task joins) without risking deadlock.

use crate::error::{BackendError, SyncError};
use crate::ports::{EventStream, InboxSession};
use crate::state::machine::SyncState;
use crate::types::ClientId;
use std::future::Future;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tokio::sync::{Mutex, oneshot, watch};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

const INITIAL_BACKOFF: Duration = Duration::from_secs(1);
const MAX_BACKOFF: Duration = Duration::from_secs(60);

/// One running activation: its cancellation token and child tasks.
struct Activation {
    cancel: CancellationToken,
    handles: Vec<JoinHandle<()>>,
}

struct Inner {
    session: Option<Arc<dyn InboxSession>>,
    activation: Option<Activation>,
}

impl std::fmt::Debug for SyncCoordinator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SyncCoordinator")
            .field("state", &self.state())
            .finish()
    }
}

/// Supervisor for one inbox's streams and bulk sync.
pub struct SyncCoordinator {
    inner: Mutex<Inner>,
    state_tx: Arc<watch::Sender<SyncState>>,
    terminated_tx: Arc<watch::Sender<bool>>,
    /// Pause requested while starting; applied on entering ready.
    deferred_pause: Arc<AtomicBool>,
}

impl SyncCoordinator {
    pub fn new() -> Self {
        let (state_tx, _) = watch::channel(SyncState::Idle);
        let (terminated_tx, _) = watch::channel(false);
        Self {
            inner: Mutex::new(Inner {
                session: None,
                activation: None,
            }),
            state_tx: Arc::new(state_tx),
            terminated_tx: Arc::new(terminated_tx),
            deferred_pause: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Current state snapshot.
    pub fn state(&self) -> SyncState {
        *self.state_tx.borrow()
    }

    /// Subscribe to state transitions. The receiver's current value is the
    /// present state.
    pub fn watch_state(&self) -> watch::Receiver<SyncState> {
        self.state_tx.subscribe()
    }

    /// Readiness flag; see the module docs for the exact contract.
    pub fn is_sync_ready(&self) -> bool {
        self.state().is_ready()
    }

    /// Signals coordinator death (permanent stream failure). The lifecycle
    /// manager moves the client to absent on this signal; an explicit wake
    /// is required to resurrect it.
    pub fn terminated(&self) -> watch::Receiver<bool> {
        self.terminated_tx.subscribe()
    }

    /// The client this coordinator currently serves, if any.
    pub async fn current_client(&self) -> Option<ClientId> {
        self.inner
            .lock()
            .await
            .session
            .as_ref()
            .map(|s| s.client_id())
    }

    /// Start syncing for a session.
    ///
    /// Idempotent for the session already being served (no duplicate bulk
    /// sync). A different session stops the current one first, then starts
    /// fresh.
    pub async fn start(&self, session: Arc<dyn InboxSession>) -> Result<(), SyncError> {
        let mut inner = self.inner.lock().await;

        match self.state() {
            SyncState::Idle => {}
            SyncState::Starting | SyncState::Ready | SyncState::Paused => {
                let same = inner
                    .session
                    .as_ref()
                    .is_some_and(|s| s.client_id() == session.client_id());
                if same {
                    debug!(client_id = %session.client_id(), "start ignored: already serving this session");
                    return Ok(());
                }
                self.stop_locked(&mut inner).await;
            }
            // stop() completes under the lock, so Stopping is never
            // observable here; fall through defensively to a clean start.
            SyncState::Stopping => {
                self.stop_locked(&mut inner).await;
            }
        }

        info!(client_id = %session.client_id(), "coordinator starting");
        inner.session = Some(session.clone());
        self.activate(&mut inner, session, true);
        Ok(())
    }

    /// Pause stream consumption, retaining the session.
    ///
    /// In `Ready` the stream tasks are cancelled immediately. In
    /// `Starting` the request is remembered and applied when readiness
    /// would otherwise be reached. Elsewhere this is a no-op.
    pub async fn pause(&self) {
        let mut inner = self.inner.lock().await;
        match self.state() {
            SyncState::Ready => {
                debug!("coordinator pausing");
                Self::teardown_tasks(&mut inner).await;
                self.state_tx.send_replace(SyncState::Paused);
            }
            SyncState::Starting => {
                self.deferred_pause.store(true, Ordering::SeqCst);
            }
            _ => {}
        }
    }

    /// Resume a paused coordinator: respawn the streams only. The bulk
    /// sync is not re-run; it can take seconds and would stall the UI on
    /// every connectivity hiccup.
    pub async fn resume(&self) {
        let mut inner = self.inner.lock().await;
        match self.state() {
            SyncState::Paused => {
                let Some(session) = inner.session.clone() else {
                    return;
                };
                debug!(client_id = %session.client_id(), "coordinator resuming");
                // A deferred pause leaves its finished activation behind;
                // reap it before spawning the next one.
                Self::teardown_tasks(&mut inner).await;
                self.activate(&mut inner, session, false);
            }
            SyncState::Starting => {
                // Cancels a deferred pause.
                self.deferred_pause.store(false, Ordering::SeqCst);
            }
            _ => {}
        }
    }

    /// Stop the coordinator. Does not return until the state machine has
    /// reached `Idle`, so `stop(); start()` never overlaps activations.
    pub async fn stop(&self) {
        let mut inner = self.inner.lock().await;
        self.stop_locked(&mut inner).await;
    }

    async fn stop_locked(&self, inner: &mut Inner) {
        if self.state() == SyncState::Idle && inner.activation.is_none() {
            inner.session = None;
            return;
        }
        self.state_tx.send_replace(SyncState::Stopping);
        Self::teardown_tasks(inner).await;
        inner.session = None;
        self.deferred_pause.store(false, Ordering::SeqCst);
        self.state_tx.send_replace(SyncState::Idle);
    }

    /// Cancel and join the current activation's tasks, if any.
    async fn teardown_tasks(inner: &mut Inner) {
        if let Some(activation) = inner.activation.take() {
            activation.cancel.cancel();
            for handle in activation.handles {
                let _ = handle.await;
            }
        }
    }

    /// Spawn stream tasks and the supervisor for one activation.
    /// `run_bulk_sync` is true only when starting from idle; resume skips
    /// it.
    fn activate(&self, inner: &mut Inner, session: Arc<dyn InboxSession>, run_bulk_sync: bool) {
        debug_assert!(inner.activation.is_none());
        self.deferred_pause.store(false, Ordering::SeqCst);
        self.state_tx.send_replace(SyncState::Starting);

        let cancel = CancellationToken::new();
        let (conv_tx, conv_rx) = oneshot::channel();
        let (msg_tx, msg_rx) = oneshot::channel();
        let mut handles = Vec::with_capacity(3);

        {
            let session = session.clone();
            let cancel = cancel.clone();
            let terminated = self.terminated_tx.clone();
            handles.push(tokio::spawn(async move {
                let client_id = session.client_id();
                let open = {
                    let session = session.clone();
                    move || {
                        let session = session.clone();
                        async move { session.stream_conversations().await }
                    }
                };
                run_stream("conversations", client_id, open, cancel, conv_tx, terminated).await;
            }));
        }

        {
            let session = session.clone();
            let cancel = cancel.clone();
            let terminated = self.terminated_tx.clone();
            handles.push(tokio::spawn(async move {
                let client_id = session.client_id();
                let open = {
                    let session = session.clone();
                    move || {
                        let session = session.clone();
                        async move { session.stream_messages().await }
                    }
                };
                run_stream("messages", client_id, open, cancel, msg_tx, terminated).await;
            }));
        }

        {
            let cancel = cancel.clone();
            let state_tx = self.state_tx.clone();
            let deferred_pause = self.deferred_pause.clone();
            let stream_cancel = cancel.clone();
            handles.push(tokio::spawn(async move {
                supervise_activation(
                    session,
                    run_bulk_sync,
                    conv_rx,
                    msg_rx,
                    cancel,
                    stream_cancel,
                    state_tx,
                    deferred_pause,
                )
                .await;
            }));
        }

        inner.activation = Some(Activation { cancel, handles });
    }
}

impl Default for SyncCoordinator {
    fn default() -> Self {
        Self::new()
    }
}

/// Waits for both subscription handshakes and the bulk sync, then flips
/// the coordinator to ready (or paused, honouring a deferred pause).
#[allow(clippy::too_many_arguments)]
async fn supervise_activation(
    session: Arc<dyn InboxSession>,
    run_bulk_sync: bool,
    conv_rx: oneshot::Receiver<()>,
    msg_rx: oneshot::Receiver<()>,
    cancel: CancellationToken,
    stream_cancel: CancellationToken,
    state_tx: Arc<watch::Sender<SyncState>>,
    deferred_pause: Arc<AtomicBool>,
) {
    let client_id = session.client_id();

    if run_bulk_sync {
        tokio::select! {
            _ = cancel.cancelled() => return,
            result = session.sync_all_conversations() => {
                if let Err(e) = result {
                    // Readiness still transitions: the streams continue to
                    // deliver incrementally.
                    warn!(client_id = %client_id, error = %e, code = e.error_code(),
                          "bulk sync failed");
                }
            }
        }
    }

    tokio::select! {
        _ = cancel.cancelled() => return,
        result = conv_rx => {
            if result.is_err() {
                return; // stream task died before subscribing
            }
        }
    }
    tokio::select! {
        _ = cancel.cancelled() => return,
        result = msg_rx => {
            if result.is_err() {
                return;
            }
        }
    }

    if deferred_pause.swap(false, Ordering::SeqCst) {
        // A pause arrived while starting; land in paused instead of ready.
        // The streams are cancelled but the session is retained by the
        // coordinator, so resume is cheap.
        stream_cancel.cancel();
        state_tx.send_if_modified(|s| {
            if *s == SyncState::Starting {
                *s = SyncState::Paused;
                true
            } else {
                false
            }
        });
        info!(client_id = %client_id, "coordinator paused (deferred)");
        return;
    }

    let became_ready = state_tx.send_if_modified(|s| {
        if *s == SyncState::Starting {
            *s = SyncState::Ready;
            true
        } else {
            false
        }
    });
    if became_ready {
        info!(client_id = %client_id, "coordinator ready");
    }
}

/// Drive one backend stream with reconnect-and-backoff.
///
/// Transient errors retry with exponential backoff and never touch the
/// coordinator's state machine. A permanent error raises the termination
/// signal instead of retrying.
async fn run_stream<T, Open, Fut>(
    label: &'static str,
    client_id: ClientId,
    open: Open,
    cancel: CancellationToken,
    subscribed: oneshot::Sender<()>,
    terminated: Arc<watch::Sender<bool>>,
) where
    T: Send + 'static,
    Open: Fn() -> Fut + Send,
    Fut: Future<Output = Result<EventStream<T>, BackendError>> + Send,
{
    use futures_util::StreamExt;

    let mut subscribed = Some(subscribed);
    let mut backoff = INITIAL_BACKOFF;

    loop {
        let opened = tokio::select! {
            _ = cancel.cancelled() => return,
            result = open() => result,
        };

        match opened {
            Ok(mut stream) => {
                if let Some(tx) = subscribed.take() {
                    let _ = tx.send(());
                }
                backoff = INITIAL_BACKOFF;
                loop {
                    let item = tokio::select! {
                        _ = cancel.cancelled() => return,
                        item = stream.next() => item,
                    };
                    match item {
                        Some(Ok(_event)) => {
                            // The SDK's ingest pipeline writes the local
                            // store; the coordinator only supervises.
                            debug!(client_id = %client_id, stream = label, "event received");
                        }
                        Some(Err(e)) if e.is_transient() => {
                            warn!(client_id = %client_id, stream = label, error = %e,
                                  "stream error, resubscribing");
                            break;
                        }
                        Some(Err(e)) => {
                            error!(client_id = %client_id, stream = label, error = %e,
                                   "permanent stream failure, terminating coordinator");
                            terminated.send_replace(true);
                            return;
                        }
                        None => {
                            warn!(client_id = %client_id, stream = label,
                                  "stream ended, resubscribing");
                            break;
                        }
                    }
                }
            }
            Err(e) if e.is_transient() => {
                warn!(client_id = %client_id, stream = label, error = %e,
                      backoff_secs = backoff.as_secs(), "subscribe failed, retrying");
            }
            Err(e) => {
                error!(client_id = %client_id, stream = label, error = %e,
                       "permanent subscribe failure, terminating coordinator");
                terminated.send_replace(true);
                return;
            }
        }

        tokio::select! {
            _ = cancel.cancelled() => return,
            _ = tokio::time::sleep(backoff) => {}
        }
        backoff = (backoff * 2).min(MAX_BACKOFF);
    }
}
