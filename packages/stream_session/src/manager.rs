use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use serde_json::{Value, json};
use tokio::sync::{Mutex, broadcast};
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, error, info, warn};

use crate::config::ConnectionPolicy;
use crate::engine::{EngineHandle, MediaSurface, StreamEngine};
use crate::error::SessionError;
use crate::state::{ConnectionState, StateChange};

const EVENT_CAPACITY: usize = 64;

/// Owns the single remote session: opens it, watches its liveness, recovers
/// it when it silently dies, and broadcasts every state transition.
///
/// Construct one per process and share it by cloning (cheap, `Arc`-backed).
/// The session deliberately outlives any single view: detaching the video
/// surface never touches the connection, only [`disconnect`](Self::disconnect)
/// does.
#[derive(Clone)]
pub struct SessionManager {
    shared: Arc<Shared>,
}

struct Shared {
    engine: Arc<dyn StreamEngine>,
    policy: ConnectionPolicy,
    events: broadcast::Sender<StateChange>,
    inner: Mutex<Inner>,
    /// Serializes initialize/reconnect attempts so concurrent callers await
    /// the one in-flight attempt instead of opening a second handle.
    attempt_lock: Mutex<()>,
    /// Bumped on disconnect. Timers and tasks carry the generation they were
    /// spawned under and become no-ops once it moves on.
    generation: AtomicU64,
}

struct Inner {
    state: ConnectionState,
    session_id: Option<String>,
    handle: Option<Arc<dyn EngineHandle>>,
    last_activity: Instant,
    supervisor: Option<JoinHandle<()>>,
    pump: Option<JoinHandle<()>>,
    reconnect_pending: bool,
}

impl SessionManager {
    pub fn new(
        engine: Arc<dyn StreamEngine>,
        policy: ConnectionPolicy,
    ) -> Result<Self, SessionError> {
        policy.validate()?;
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        Ok(Self {
            shared: Arc::new(Shared {
                engine,
                policy,
                events,
                inner: Mutex::new(Inner {
                    state: ConnectionState::Disconnected,
                    session_id: None,
                    handle: None,
                    last_activity: Instant::now(),
                    supervisor: None,
                    pump: None,
                    reconnect_pending: false,
                }),
                attempt_lock: Mutex::new(()),
                generation: AtomicU64::new(0),
            }),
        })
    }

    /// Attach to the remote session identified by `session_id`.
    ///
    /// Idempotent: if a live connection for this identity already exists the
    /// handle is returned without side effects, and concurrent callers share
    /// the in-flight attempt. A different identity is torn down first. The
    /// wait for the first liveness signal is bounded by the policy's
    /// `connect_timeout`; expiry resolves anyway with the session still
    /// connecting in the background.
    ///
    /// Only outright handle construction failure is returned as an error.
    pub async fn initialize(
        &self,
        session_id: &str,
    ) -> Result<Arc<dyn EngineHandle>, SessionError> {
        let guard = self.shared.attempt_lock.lock().await;
        let generation = self.shared.generation.load(Ordering::SeqCst);

        let existing = {
            let inner = self.shared.inner.lock().await;
            match (&inner.handle, inner.session_id.as_deref()) {
                (Some(handle), Some(id)) if id == session_id => {
                    Some((handle.clone(), inner.state))
                }
                _ => None,
            }
        };
        if let Some((handle, state)) = existing {
            if state == ConnectionState::Connected {
                debug!(session = session_id, "already connected, reusing handle");
                return Ok(handle);
            }
            // An attempt for this identity is already underway; await it
            // instead of opening a second handle.
            drop(guard);
            self.shared.wait_for_liveness(generation).await;
            return Ok(handle);
        }

        let has_other = self.shared.inner.lock().await.handle.is_some();
        if has_other {
            info!(session = session_id, "session identity changed, tearing down previous session");
            self.shared.shutdown().await;
        }

        let generation = self.shared.generation.load(Ordering::SeqCst);
        let handle = match self.shared.connect_attempt(session_id, generation).await {
            Ok(handle) => handle,
            Err(err) => {
                let mut inner = self.shared.inner.lock().await;
                self.shared
                    .transition(&mut inner, ConnectionState::Disconnected);
                return Err(err);
            }
        };
        drop(guard);
        self.shared.wait_for_liveness(generation).await;
        Ok(handle)
    }

    /// Forward an interaction payload to the remote session.
    ///
    /// Returns `false` without performing any I/O unless the state is
    /// `Connected`. Never errors: a failed send is logged and reported as
    /// `false`, and the missing echo ages the activity clock toward the
    /// staleness threshold, which takes the normal reconnection path.
    pub async fn send_command(&self, payload: Value) -> bool {
        let handle = {
            let inner = self.shared.inner.lock().await;
            if inner.state != ConnectionState::Connected {
                return false;
            }
            match &inner.handle {
                Some(handle) => handle.clone(),
                None => return false,
            }
        };
        match handle.send_interaction(payload) {
            Ok(()) => {
                let mut inner = self.shared.inner.lock().await;
                inner.last_activity = Instant::now();
                true
            }
            Err(err) => {
                warn!("interaction send failed: {err:#}");
                false
            }
        }
    }

    /// Tear down the session: stop probing, cancel any scheduled reconnect,
    /// release the media resource and notify listeners. Idempotent.
    pub async fn disconnect(&self) {
        let _guard = self.shared.attempt_lock.lock().await;
        self.shared.shutdown().await;
    }

    /// Subscribe to state transitions. Dropping the receiver unsubscribes.
    /// No replay: callers needing the current state should query it.
    pub fn subscribe(&self) -> broadcast::Receiver<StateChange> {
        self.shared.events.subscribe()
    }

    pub async fn is_connected(&self) -> bool {
        self.shared.inner.lock().await.state.is_connected()
    }

    pub async fn state(&self) -> ConnectionState {
        self.shared.inner.lock().await.state
    }

    pub async fn session_id(&self) -> Option<String> {
        self.shared.inner.lock().await.session_id.clone()
    }

    /// Video surface of the current handle, if any. Used by the view binding
    /// layer; never affects the connection.
    pub async fn current_surface(&self) -> Option<MediaSurface> {
        let inner = self.shared.inner.lock().await;
        inner.handle.as_ref().and_then(|handle| handle.surface())
    }

    pub fn policy(&self) -> &ConnectionPolicy {
        &self.shared.policy
    }
}

impl Shared {
    /// Set the state and notify listeners, in that order. Same-state calls
    /// are dropped so subscribers never see a duplicated transition.
    fn transition(&self, inner: &mut Inner, next: ConnectionState) {
        if inner.state == next {
            return;
        }
        debug!("connection state {} -> {}", inner.state, next);
        inner.state = next;
        let _ = self.events.send(StateChange::new(next));
    }

    /// Open a handle for `session_id` and install it together with its pump
    /// and supervisor tasks. Transitions to `Connecting`; promotion to
    /// `Connected` is the supervisor's job.
    async fn connect_attempt(
        self: &Arc<Self>,
        session_id: &str,
        generation: u64,
    ) -> Result<Arc<dyn EngineHandle>, SessionError> {
        {
            let mut inner = self.inner.lock().await;
            self.transition(&mut inner, ConnectionState::Connecting);
        }

        let handle = match self.engine.open(session_id).await {
            Ok(handle) => handle,
            Err(err) => {
                error!(session = session_id, "failed to open remote session: {err:#}");
                return Err(SessionError::ConnectFailed(err.to_string()));
            }
        };

        if self.generation.load(Ordering::SeqCst) != generation {
            // Disconnected while the open was in flight; drop the orphan.
            if let Err(err) = handle.teardown() {
                warn!("teardown of orphaned session failed: {err:#}");
            }
            return Err(SessionError::ConnectFailed(
                "session torn down during connect".to_string(),
            ));
        }

        let mut inner = self.inner.lock().await;
        inner.session_id = Some(session_id.to_string());
        inner.handle = Some(handle.clone());
        inner.last_activity = Instant::now();
        inner.reconnect_pending = false;
        if let Some(task) = inner.pump.take() {
            task.abort();
        }
        if let Some(task) = inner.supervisor.take() {
            task.abort();
        }
        inner.pump = Some(self.spawn_pump(handle.clone(), generation));
        inner.supervisor = Some(self.spawn_supervisor(session_id.to_string(), generation));
        Ok(handle)
    }

    /// Bounded wait for the supervisor to observe the stream playing.
    /// Returns on `Connected`, on timeout (soft failure) or as soon as the
    /// generation moves on (disconnect during the wait). Mutates nothing.
    async fn wait_for_liveness(&self, generation: u64) {
        let deadline = Instant::now() + self.policy.connect_timeout;
        loop {
            if self.generation.load(Ordering::SeqCst) != generation {
                return;
            }
            if self.inner.lock().await.state.is_connected() {
                return;
            }
            if Instant::now() >= deadline {
                debug!("liveness wait timed out, session keeps connecting in the background");
                return;
            }
            tokio::time::sleep(self.policy.liveness_poll).await;
        }
    }

    /// Forwards inbound responses into the activity clock.
    fn spawn_pump(self: &Arc<Self>, handle: Arc<dyn EngineHandle>, generation: u64) -> JoinHandle<()> {
        let shared = Arc::clone(self);
        let mut responses = handle.responses();
        tokio::spawn(async move {
            loop {
                match responses.recv().await {
                    Ok(_) | Err(broadcast::error::RecvError::Lagged(_)) => {
                        // A lagged receiver still proves the session is alive.
                        if shared.generation.load(Ordering::SeqCst) != generation {
                            return;
                        }
                        shared.inner.lock().await.last_activity = Instant::now();
                    }
                    Err(broadcast::error::RecvError::Closed) => return,
                }
            }
        })
    }

    /// One supervisor per installed handle: promotes `Connecting` to
    /// `Connected` when the stream is observed playing, sends keepalive
    /// probes, and turns staleness into a single reconnection.
    fn spawn_supervisor(self: &Arc<Self>, session_id: String, generation: u64) -> JoinHandle<()> {
        let shared = Arc::clone(self);
        tokio::spawn(async move {
            let mut last_probe = Instant::now();
            loop {
                tokio::time::sleep(shared.policy.liveness_poll).await;
                if shared.generation.load(Ordering::SeqCst) != generation {
                    return;
                }
                let (state, handle, last_activity) = {
                    let inner = shared.inner.lock().await;
                    (inner.state, inner.handle.clone(), inner.last_activity)
                };
                let Some(handle) = handle else { return };

                match state {
                    ConnectionState::Connecting => {
                        if handle.is_playing() {
                            let mut inner = shared.inner.lock().await;
                            inner.last_activity = Instant::now();
                            shared.transition(&mut inner, ConnectionState::Connected);
                            info!(session = %session_id, "media stream playing, session connected");
                        } else if last_activity.elapsed() > shared.policy.staleness_threshold {
                            // Liveness never arrived; retry from scratch.
                            if shared.schedule_reconnect(&session_id, generation, false).await {
                                return;
                            }
                        }
                    }
                    ConnectionState::Connected => {
                        if last_probe.elapsed() >= shared.policy.probe_interval {
                            last_probe = Instant::now();
                            if let Err(err) = handle.send_interaction(keepalive_payload()) {
                                warn!("keepalive probe failed: {err:#}");
                            }
                        }
                        if last_activity.elapsed() > shared.policy.staleness_threshold {
                            warn!(
                                session = %session_id,
                                silent_for = ?last_activity.elapsed(),
                                "no inbound activity, reconnecting"
                            );
                            if shared.schedule_reconnect(&session_id, generation, true).await {
                                return;
                            }
                        }
                    }
                    // Recovery is owned by the reconnect task once scheduled.
                    ConnectionState::Stalled | ConnectionState::Reconnecting => {}
                    ConnectionState::Disconnected => return,
                }
            }
        })
    }

    /// Transition into the reconnection path and spawn the retry task.
    /// Returns whether a reconnect was actually scheduled; a second
    /// staleness detection while one is pending is dropped.
    async fn schedule_reconnect(
        self: &Arc<Self>,
        session_id: &str,
        generation: u64,
        via_stalled: bool,
    ) -> bool {
        {
            let mut inner = self.inner.lock().await;
            if inner.reconnect_pending {
                return false;
            }
            inner.reconnect_pending = true;
            if via_stalled {
                self.transition(&mut inner, ConnectionState::Stalled);
            }
            self.transition(&mut inner, ConnectionState::Reconnecting);
        }

        let shared = Arc::clone(self);
        let session_id = session_id.to_string();
        tokio::spawn(async move {
            let mut delay = shared.policy.reconnect_initial_delay;
            loop {
                tokio::time::sleep(delay).await;
                if shared.generation.load(Ordering::SeqCst) != generation {
                    return;
                }
                let _guard = shared.attempt_lock.lock().await;
                if shared.generation.load(Ordering::SeqCst) != generation {
                    return;
                }

                // Release the dead handle before dialing again.
                let stale = {
                    let mut inner = shared.inner.lock().await;
                    if let Some(task) = inner.pump.take() {
                        task.abort();
                    }
                    inner.handle.take()
                };
                if let Some(stale) = stale {
                    if let Err(err) = stale.teardown() {
                        warn!("teardown of stale session failed: {err:#}");
                    }
                }

                match shared.connect_attempt(&session_id, generation).await {
                    Ok(_) => {
                        debug!(session = %session_id, "reconnect attempt underway");
                        return;
                    }
                    Err(err) => {
                        delay = (delay * 2).min(shared.policy.reconnect_max_delay);
                        warn!(
                            session = %session_id,
                            retry_in = ?delay,
                            "reconnect attempt failed: {err}"
                        );
                        let mut inner = shared.inner.lock().await;
                        inner.reconnect_pending = true;
                        shared.transition(&mut inner, ConnectionState::Reconnecting);
                    }
                }
            }
        });
        true
    }

    /// Full teardown: invalidate timers first, then stop tasks, release the
    /// media resource and force `Disconnected` even when teardown fails.
    async fn shutdown(&self) {
        self.generation.fetch_add(1, Ordering::SeqCst);
        let (handle, supervisor, pump) = {
            let mut inner = self.inner.lock().await;
            inner.reconnect_pending = false;
            inner.session_id = None;
            (inner.handle.take(), inner.supervisor.take(), inner.pump.take())
        };
        if let Some(task) = supervisor {
            task.abort();
        }
        if let Some(task) = pump {
            task.abort();
        }
        if let Some(handle) = handle {
            if let Err(err) = handle.teardown() {
                error!("engine teardown failed: {err:#}");
            }
        }
        let mut inner = self.inner.lock().await;
        self.transition(&mut inner, ConnectionState::Disconnected);
    }
}

/// Lightweight no-op interaction used as a liveness probe.
fn keepalive_payload() -> Value {
    json!({ "action": "keepalive" })
}
