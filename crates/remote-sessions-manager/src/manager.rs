//! Session manager reconciling local session state with the server.

use std::{
    collections::{BTreeMap, HashMap},
    sync::{
        Arc, Mutex, MutexGuard, PoisonError, Weak,
        atomic::{AtomicBool, AtomicU64, Ordering},
    },
};

use futures::{FutureExt, future};
use remote_sessions_core::{
    ConnectOptions, ConnectionContext, ConnectionEvent, ConnectionFactory, KernelConnector,
    ManagerOptions, PollTask, Poller, PollerFactory, SessionApi, SessionConnection,
    SessionCreateOptions, SessionError, SessionId, SessionModel, Signal, Subscription,
};
use tokio::sync::watch;

use crate::connection::DefaultConnectionFactory;

/// Connection registered with the manager.
struct Tracked<C> {
    connection: Arc<C>,
    subscription: Subscription,
}

/// Local view of the server plus the live connection registry.
///
/// Guarded by a single mutex so each fetch is compared and applied
/// without another fetch interleaving.
struct State<C> {
    /// Last fetched models in server order, ids unique.
    models: Vec<SessionModel>,
    index: HashMap<SessionId, usize>,
    /// Keyed by registration order.
    connections: BTreeMap<u64, Tracked<C>>,
    /// Generation of the last fetch applied to `models`.
    applied: u64,
}

impl<C> State<C> {
    fn get(&self, id: &str) -> Option<&SessionModel> {
        self.index.get(id).map(|&idx| &self.models[idx])
    }

    fn matches(&self, fetched: &[SessionModel]) -> bool {
        fetched.len() == self.models.len() && fetched.iter().all(|m| self.get(&m.id) == Some(m))
    }

    fn replace(&mut self, models: Vec<SessionModel>) {
        self.index = models
            .iter()
            .enumerate()
            .map(|(idx, m)| (m.id.clone(), idx))
            .collect();
        self.models = models;
    }
}

/// Collapse repeated ids: the last model wins, keeping the first position.
fn dedupe(fetched: Vec<SessionModel>) -> Vec<SessionModel> {
    let mut positions: HashMap<SessionId, usize> = HashMap::with_capacity(fetched.len());
    let mut models: Vec<SessionModel> = Vec::with_capacity(fetched.len());
    for model in fetched {
        if let Some(&idx) = positions.get(&model.id) {
            tracing::warn!(session_id = %model.id, "Server listed a session twice");
            models[idx] = model;
        } else {
            positions.insert(model.id.clone(), models.len());
            models.push(model);
        }
    }
    models
}

/// Session manager keeping a local view of the server's sessions.
///
/// A poller periodically lists the server's sessions; every fetch that
/// differs from the local view replaces it wholesale, pushes the new
/// models into live connections, disposes connections whose session is
/// gone, and emits `running_changed`. Connection events feed back into
/// the poller, so local changes are always confirmed by the server.
pub struct SessionManager<F = DefaultConnectionFactory>
where
    F: ConnectionFactory,
{
    api: Arc<dyn SessionApi>,
    kernels: Arc<dyn KernelConnector>,
    factory: F,
    poller: Arc<dyn Poller>,
    state: Mutex<State<F::Connection>>,
    next_key: AtomicU64,
    /// Generation handed to each fetch before its list call.
    fetches: AtomicU64,
    running_changed: Signal<Vec<SessionModel>>,
    connection_failure: Signal<SessionError>,
    disposed_signal: Signal<()>,
    ready: watch::Receiver<bool>,
    disposing: AtomicBool,
    disposed: AtomicBool,
    this: Weak<Self>,
}

impl SessionManager<DefaultConnectionFactory> {
    /// Create a manager producing [`DefaultSessionConnection`]s.
    ///
    /// Must be called within a tokio runtime; the first poll starts
    /// immediately in the background.
    ///
    /// [`DefaultSessionConnection`]: crate::DefaultSessionConnection
    #[must_use]
    pub fn new(
        api: Arc<dyn SessionApi>,
        kernels: Arc<dyn KernelConnector>,
        pollers: &dyn PollerFactory,
        options: &ManagerOptions,
    ) -> Arc<Self> {
        Self::with_factory(api, kernels, DefaultConnectionFactory, pollers, options)
    }
}

impl<F> SessionManager<F>
where
    F: ConnectionFactory,
{
    /// Create a manager with a custom connection factory.
    #[must_use]
    pub fn with_factory(
        api: Arc<dyn SessionApi>,
        kernels: Arc<dyn KernelConnector>,
        factory: F,
        pollers: &dyn PollerFactory,
        options: &ManagerOptions,
    ) -> Arc<Self> {
        let (ready_tx, ready_rx) = watch::channel(false);

        let manager = Arc::new_cyclic(|this: &Weak<Self>| {
            let weak = this.clone();
            let task: PollTask = Arc::new(move || {
                let weak = weak.clone();
                async move {
                    match weak.upgrade() {
                        Some(manager) => manager.request_running().await,
                        None => Ok(()),
                    }
                }
                .boxed()
            });

            Self {
                api,
                kernels,
                factory,
                poller: pollers.create(&options.poll, task),
                state: Mutex::new(State {
                    models: Vec::new(),
                    index: HashMap::new(),
                    connections: BTreeMap::new(),
                    applied: 0,
                }),
                next_key: AtomicU64::new(0),
                fetches: AtomicU64::new(0),
                running_changed: Signal::new(),
                connection_failure: Signal::new(),
                disposed_signal: Signal::new(),
                ready: ready_rx,
                disposing: AtomicBool::new(false),
                disposed: AtomicBool::new(false),
                this: this.clone(),
            }
        });

        let poller = Arc::clone(&manager.poller);
        let kernels = Arc::clone(&manager.kernels);
        tokio::spawn(async move {
            poller.start().await;
            if let Err(e) = poller.tick().await {
                tracing::debug!(error = %e, "Initial session poll failed");
            }
            if kernels.is_active() {
                kernels.ready().await;
            }
            let _ = ready_tx.send(true);
        });

        manager
    }

    fn lock_state(&self) -> MutexGuard<'_, State<F::Connection>> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Whether the first poll has settled.
    #[must_use]
    pub fn is_ready(&self) -> bool {
        *self.ready.borrow()
    }

    /// Wait until the first poll has settled, successfully or not.
    pub async fn ready(&self) {
        let mut ready = self.ready.clone();
        let _ = ready.wait_for(|ready| *ready).await;
    }

    /// Whether [`dispose`](Self::dispose) has completed.
    #[must_use]
    pub fn is_disposed(&self) -> bool {
        self.disposed.load(Ordering::SeqCst)
    }

    /// Emitted with the full model list whenever the running sessions change.
    #[must_use]
    pub const fn running_changed(&self) -> &Signal<Vec<SessionModel>> {
        &self.running_changed
    }

    /// Emitted when a poll fails because the server is unreachable.
    #[must_use]
    pub const fn connection_failure(&self) -> &Signal<SessionError> {
        &self.connection_failure
    }

    /// Emitted once when the manager is disposed.
    #[must_use]
    pub const fn disposed(&self) -> &Signal<()> {
        &self.disposed_signal
    }

    /// Snapshot of the running sessions, in server order.
    #[must_use]
    pub fn running(&self) -> std::vec::IntoIter<SessionModel> {
        self.lock_state().models.clone().into_iter()
    }

    /// Number of live connections the manager tracks.
    #[must_use]
    pub fn connection_count(&self) -> usize {
        self.lock_state().connections.len()
    }

    /// Force a poll and wait for it to settle.
    ///
    /// # Errors
    /// Returns the error of the poll run, unchanged.
    pub async fn refresh_running(&self) -> Result<(), SessionError> {
        self.poller.refresh();
        self.poller.tick().await
    }

    /// Fetch the running sessions and reconcile local state with them.
    ///
    /// This is the poll task; callers normally go through
    /// [`refresh_running`](Self::refresh_running) so concurrent requests
    /// share one run. When runs overlap, a response whose list call began
    /// before that of an already applied response is dropped.
    ///
    /// # Errors
    /// Returns the list error unchanged. Local state is not touched on
    /// failure; unreachable-server failures are also emitted on
    /// `connection_failure`.
    pub async fn request_running(&self) -> Result<(), SessionError> {
        let generation = self.fetches.fetch_add(1, Ordering::SeqCst) + 1;
        let fetched = match self.api.list_running().await {
            Ok(models) => models,
            Err(e) => {
                if e.is_connection_failure() {
                    tracing::warn!(error = %e, "Session server is unreachable");
                    self.connection_failure.emit(e.clone());
                }
                return Err(e);
            }
        };

        if self.disposing.load(Ordering::SeqCst) {
            return Ok(());
        }

        let models = dedupe(fetched);
        let (changed, updates, stale) = {
            let mut state = self.lock_state();
            // `dispose` raises the flag under this lock, so a fetch that
            // passes here cannot refill the map after disposal.
            if self.disposing.load(Ordering::SeqCst) {
                return Ok(());
            }
            // Fetches may overlap; a response older than the one already
            // applied must not replace it.
            if generation < state.applied {
                tracing::debug!(
                    generation,
                    applied = state.applied,
                    "Discarding stale session list"
                );
                return Ok(());
            }
            state.applied = generation;

            let changed = !state.matches(&models);
            if changed {
                state.replace(models.clone());
            }

            // Connections whose session is absent are disposed even when the
            // list itself is unchanged, e.g. after `connect_to` on a bad id.
            let mut updates = Vec::new();
            let mut stale = Vec::new();
            for tracked in state.connections.values() {
                match state.get(&tracked.connection.id()) {
                    Some(model) if changed => {
                        updates.push((Arc::clone(&tracked.connection), model.clone()));
                    }
                    Some(_) => {}
                    None => stale.push(Arc::clone(&tracked.connection)),
                }
            }
            (changed, updates, stale)
        };

        for (connection, model) in updates {
            connection.update(model);
        }
        for connection in stale {
            tracing::debug!(
                session_id = %connection.id(),
                "Disposing connection to missing session"
            );
            connection.dispose();
        }

        if changed && !self.disposing.load(Ordering::SeqCst) {
            tracing::debug!(running = models.len(), "Running sessions changed");
            self.running_changed.emit(models);
        }
        Ok(())
    }

    /// Connect to a session, trusting the caller that it exists.
    ///
    /// If the session is not known locally, a background refresh
    /// verifies it and disposes the connection if the server disagrees.
    /// Once the manager is disposed the connection comes back disposed.
    pub fn connect_to(&self, model: SessionModel) -> Arc<F::Connection> {
        self.connect_with(model, ConnectOptions::default())
    }

    /// [`connect_to`](Self::connect_to) with explicit client identity.
    pub fn connect_with(&self, model: SessionModel, options: ConnectOptions) -> Arc<F::Connection> {
        let known = self.lock_state().get(&model.id).is_some();
        let context = ConnectionContext {
            api: Arc::clone(&self.api),
            kernels: Arc::clone(&self.kernels),
            options,
        };
        let connection = self.factory.connect(model, context);
        self.on_started(&connection);

        if !known {
            self.spawn_refresh("verify connected session");
        }
        connection
    }

    /// Start a session on the server and connect to it.
    ///
    /// # Errors
    /// Returns the start error, or the error of the following refresh.
    pub async fn start_new(
        &self,
        options: SessionCreateOptions,
        connect: ConnectOptions,
    ) -> Result<Arc<F::Connection>, SessionError> {
        let started = self.api.start_session(&options).await?;
        tracing::info!(session_id = %started.id, path = %started.path, "Started session");

        self.refresh_running().await?;
        let model = self.cached(&started.id).unwrap_or(started);
        Ok(self.connect_with(model, connect))
    }

    /// Stop a session on the server, then re-sync.
    ///
    /// The refresh runs even if the stop fails.
    ///
    /// # Errors
    /// Returns the stop error if it failed, otherwise the refresh error.
    pub async fn shutdown(&self, id: &SessionId) -> Result<(), SessionError> {
        let stopped = self.api.stop_session(id).await;
        match &stopped {
            Ok(()) => tracing::info!(session_id = %id, "Shut down session"),
            Err(e) => tracing::warn!(session_id = %id, error = %e, "Failed to shut down session"),
        }

        let refreshed = self.refresh_running().await;
        stopped?;
        refreshed
    }

    /// Stop every running session, then re-sync.
    ///
    /// All stops are attempted concurrently; one failing does not prevent
    /// the others.
    ///
    /// # Errors
    /// Returns `ShutdownAll` listing each failed stop, otherwise any
    /// refresh error.
    pub async fn shutdown_all(&self) -> Result<(), SessionError> {
        self.refresh_running().await?;

        let ids: Vec<SessionId> = self.lock_state().models.iter().map(|m| m.id.clone()).collect();
        let results = future::join_all(ids.iter().map(|id| self.api.stop_session(id))).await;
        let failures: Vec<(SessionId, SessionError)> = ids
            .into_iter()
            .zip(results)
            .filter_map(|(id, result)| result.err().map(|e| (id, e)))
            .collect();

        let refreshed = self.refresh_running().await;
        if !failures.is_empty() {
            tracing::warn!(failed = failures.len(), "Failed to shut down all sessions");
            return Err(SessionError::ShutdownAll { failures });
        }
        refreshed
    }

    /// Stop the session bound to `path`, if exactly one is.
    ///
    /// Best effort: every error is logged and discarded.
    pub async fn stop_if_needed(&self, path: &str) {
        let result = async {
            let sessions = self.api.list_running().await?;
            let matches: Vec<SessionId> = sessions
                .into_iter()
                .filter(|s| s.path == path)
                .map(|s| s.id)
                .collect();
            if let [id] = matches.as_slice() {
                self.shutdown(id).await?;
            }
            Ok::<_, SessionError>(())
        }
        .await;

        if let Err(e) = result {
            tracing::debug!(path, error = %e, "Ignoring failure to stop session");
        }
    }

    /// Find a session by id, refreshing once if it is not known locally.
    ///
    /// # Errors
    /// Returns the refresh error.
    pub async fn find_by_id(&self, id: &str) -> Result<Option<SessionModel>, SessionError> {
        if let Some(model) = self.cached(id) {
            return Ok(Some(model));
        }
        self.refresh_running().await?;
        Ok(self.cached(id))
    }

    /// Find a session by path, refreshing once if it is not known locally.
    ///
    /// # Errors
    /// Returns the refresh error.
    pub async fn find_by_path(&self, path: &str) -> Result<Option<SessionModel>, SessionError> {
        if let Some(model) = self.cached_path(path) {
            return Ok(Some(model));
        }
        self.refresh_running().await?;
        Ok(self.cached_path(path))
    }

    fn cached(&self, id: &str) -> Option<SessionModel> {
        self.lock_state().get(id).cloned()
    }

    fn cached_path(&self, path: &str) -> Option<SessionModel> {
        self.lock_state()
            .models
            .iter()
            .find(|m| m.path == path)
            .cloned()
    }

    fn on_started(&self, connection: &Arc<F::Connection>) {
        let key = self.next_key.fetch_add(1, Ordering::Relaxed);
        let weak = self.this.clone();
        let subscription = connection.subscribe(Box::new(move |event| {
            if let Some(manager) = weak.upgrade() {
                manager.on_connection_event(key, *event);
            }
        }));

        let tracked = Tracked {
            connection: Arc::clone(connection),
            subscription,
        };
        let rejected = {
            let mut state = self.lock_state();
            if self.disposing.load(Ordering::SeqCst) {
                Some(tracked)
            } else {
                state.connections.insert(key, tracked);
                None
            }
        };

        // A manager that is gone will never verify or dispose it.
        if let Some(Tracked {
            connection,
            subscription,
        }) = rejected
        {
            subscription.disconnect();
            tracing::debug!(session_id = %connection.id(), "Manager disposed, closing connection");
            connection.dispose();
        }
    }

    fn on_connection_event(&self, key: u64, event: ConnectionEvent) {
        match event {
            ConnectionEvent::Disposed => {
                let removed = self.lock_state().connections.remove(&key);
                drop(removed);
                self.spawn_refresh("session connection disposed");
            }
            ConnectionEvent::PropertyChanged(_) | ConnectionEvent::KernelChanged => {
                self.spawn_refresh("session connection changed");
            }
        }
    }

    fn spawn_refresh(&self, reason: &'static str) {
        if self.disposing.load(Ordering::SeqCst) {
            return;
        }
        let weak = self.this.clone();
        tokio::spawn(async move {
            let Some(manager) = weak.upgrade() else {
                return;
            };
            if let Err(e) = manager.refresh_running().await {
                tracing::debug!(reason, error = %e, "Background session refresh failed");
            }
        });
    }

    /// Dispose the manager and every connection it tracks.
    ///
    /// Idempotent. Connections disposed here do not trigger refreshes.
    pub fn dispose(&self) {
        let connections = {
            let mut state = self.lock_state();
            if self.disposing.swap(true, Ordering::SeqCst) {
                return;
            }
            state.replace(Vec::new());
            std::mem::take(&mut state.connections)
        };
        for Tracked {
            connection,
            subscription,
        } in connections.into_values()
        {
            subscription.disconnect();
            connection.dispose();
        }

        self.poller.dispose();
        self.disposed.store(true, Ordering::SeqCst);
        tracing::debug!("Session manager disposed");
        self.disposed_signal.emit(());
    }
}
