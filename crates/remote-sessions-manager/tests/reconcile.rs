//! Reconciliation behavior of the session manager against a scripted server.

use std::{
    collections::HashMap,
    sync::{
        Arc, Mutex,
        atomic::{AtomicUsize, Ordering},
    },
    time::Duration,
};

use async_trait::async_trait;
use remote_sessions_core::{
    BasicKernelConnector, ConnectOptions, ConnectionContext, ConnectionEvent, ConnectionFactory,
    KernelConnection, KernelConnector, KernelModel, ManagerOptions, SessionApi, SessionConnection,
    SessionCreateOptions, SessionError, SessionId, SessionModel, SessionPatch, Subscription,
};
use remote_sessions_manager::{
    DefaultSessionConnection, ImmediatePollerFactory, SessionManager, api::MemorySessionApi,
};
use tokio::sync::Notify;
use tokio_test::{assert_err, assert_ok};

/// Server wrapper with failure injection and call accounting.
#[derive(Default)]
struct ScriptedApi {
    server: MemorySessionApi,
    list_override: Mutex<Option<Vec<SessionModel>>>,
    list_error: Mutex<Option<SessionError>>,
    stop_errors: Mutex<HashMap<SessionId, SessionError>>,
    list_calls: AtomicUsize,
    stop_calls: Mutex<Vec<SessionId>>,
    list_gate: Mutex<Option<Arc<Notify>>>,
    list_held: Notify,
}

impl ScriptedApi {
    fn with_sessions(sessions: Vec<SessionModel>) -> Arc<Self> {
        Arc::new(Self {
            server: MemorySessionApi::with_sessions(sessions),
            ..Self::default()
        })
    }

    fn fail_list(&self, err: Option<SessionError>) {
        *self.list_error.lock().unwrap() = err;
    }

    fn fail_stop(&self, id: &str, err: SessionError) {
        self.stop_errors.lock().unwrap().insert(id.to_string(), err);
    }

    fn stop_calls(&self) -> Vec<SessionId> {
        self.stop_calls.lock().unwrap().clone()
    }

    /// Make the next list call read the server, then wait for the
    /// returned gate before answering.
    fn hold_next_list(&self) -> Arc<Notify> {
        let gate = Arc::new(Notify::new());
        *self.list_gate.lock().unwrap() = Some(Arc::clone(&gate));
        gate
    }
}

#[async_trait]
impl SessionApi for ScriptedApi {
    async fn list_running(&self) -> Result<Vec<SessionModel>, SessionError> {
        self.list_calls.fetch_add(1, Ordering::SeqCst);
        if let Some(err) = self.list_error.lock().unwrap().clone() {
            return Err(err);
        }
        let listed = self.list_override.lock().unwrap().clone();
        let models = match listed {
            Some(models) => models,
            None => self.server.list_running().await?,
        };

        let gate = self.list_gate.lock().unwrap().take();
        if let Some(gate) = gate {
            self.list_held.notify_one();
            gate.notified().await;
        }
        Ok(models)
    }

    async fn get_session(&self, id: &SessionId) -> Result<Option<SessionModel>, SessionError> {
        self.server.get_session(id).await
    }

    async fn start_session(
        &self,
        options: &SessionCreateOptions,
    ) -> Result<SessionModel, SessionError> {
        self.server.start_session(options).await
    }

    async fn update_session(
        &self,
        id: &SessionId,
        patch: &SessionPatch,
    ) -> Result<SessionModel, SessionError> {
        self.server.update_session(id, patch).await
    }

    async fn stop_session(&self, id: &SessionId) -> Result<(), SessionError> {
        self.stop_calls.lock().unwrap().push(id.clone());
        let injected = self.stop_errors.lock().unwrap().get(id).cloned();
        if let Some(err) = injected {
            return Err(err);
        }
        self.server.stop_session(id).await
    }
}

/// Connection counting the updates pushed into it.
struct Recording {
    inner: DefaultSessionConnection,
    updates: AtomicUsize,
}

impl Recording {
    fn updates(&self) -> usize {
        self.updates.load(Ordering::SeqCst)
    }
}

impl SessionConnection for Recording {
    fn id(&self) -> SessionId {
        self.inner.id()
    }

    fn model(&self) -> SessionModel {
        self.inner.model()
    }

    fn kernel(&self) -> Option<Arc<dyn KernelConnection>> {
        self.inner.kernel()
    }

    fn update(&self, model: SessionModel) {
        self.updates.fetch_add(1, Ordering::SeqCst);
        self.inner.update(model);
    }

    fn dispose(&self) {
        self.inner.dispose();
    }

    fn is_disposed(&self) -> bool {
        self.inner.is_disposed()
    }

    fn subscribe(&self, listener: Box<dyn Fn(&ConnectionEvent) + Send + Sync>) -> Subscription {
        self.inner.subscribe(listener)
    }
}

struct RecordingFactory;

impl ConnectionFactory for RecordingFactory {
    type Connection = Recording;

    fn connect(&self, model: SessionModel, context: ConnectionContext) -> Arc<Recording> {
        Arc::new(Recording {
            inner: DefaultSessionConnection::new(model, context),
            updates: AtomicUsize::new(0),
        })
    }
}

fn session(id: &str, path: &str) -> SessionModel {
    SessionModel::new(id, path).with_kernel(format!("k-{id}"), "python3")
}

async fn manager(api: &Arc<ScriptedApi>) -> Arc<SessionManager> {
    let manager = SessionManager::new(
        api.clone(),
        Arc::new(BasicKernelConnector),
        &ImmediatePollerFactory,
        &ManagerOptions::default(),
    );
    manager.ready().await;
    manager
}

async fn recording_manager(api: &Arc<ScriptedApi>) -> Arc<SessionManager<RecordingFactory>> {
    let manager = SessionManager::with_factory(
        api.clone(),
        Arc::new(BasicKernelConnector),
        RecordingFactory,
        &ImmediatePollerFactory,
        &ManagerOptions::default(),
    );
    manager.ready().await;
    manager
}

type Emissions = Arc<Mutex<Vec<Vec<SessionModel>>>>;

fn record_running<F: ConnectionFactory>(manager: &SessionManager<F>) -> (Emissions, Subscription) {
    let seen: Emissions = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&seen);
    let sub = manager
        .running_changed()
        .connect(move |models| sink.lock().unwrap().push(models.clone()));
    (seen, sub)
}

fn running_ids<F: ConnectionFactory>(manager: &SessionManager<F>) -> Vec<SessionId> {
    manager.running().map(|m| m.id).collect()
}

#[tokio::test]
async fn test_ready_after_first_poll() {
    let api = ScriptedApi::with_sessions(vec![session("s1", "a.ipynb")]);
    let manager = manager(&api).await;

    assert!(manager.is_ready());
    assert_eq!(running_ids(&manager), vec!["s1"]);
    assert_eq!(api.list_calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_ready_even_when_first_poll_fails() {
    let api = ScriptedApi::with_sessions(vec![session("s1", "a.ipynb")]);
    api.fail_list(Some(SessionError::Network("offline".into())));
    let manager = manager(&api).await;

    assert!(manager.is_ready());
    assert_eq!(manager.running().count(), 0);

    manager.ready().await;
    assert!(manager.is_ready());
}

struct SlowKernels {
    started: Notify,
}

#[async_trait]
impl KernelConnector for SlowKernels {
    fn connect_to(
        &self,
        kernel: &KernelModel,
        options: &ConnectOptions,
    ) -> Arc<dyn KernelConnection> {
        BasicKernelConnector.connect_to(kernel, options)
    }

    fn is_active(&self) -> bool {
        true
    }

    async fn ready(&self) {
        self.started.notified().await;
    }
}

#[tokio::test]
async fn test_ready_waits_for_active_kernel_connector() {
    let api = ScriptedApi::with_sessions(vec![]);
    let kernels = Arc::new(SlowKernels {
        started: Notify::new(),
    });
    let manager = SessionManager::new(
        api.clone(),
        kernels.clone(),
        &ImmediatePollerFactory,
        &ManagerOptions::default(),
    );

    let waited = tokio::time::timeout(Duration::from_millis(50), manager.ready()).await;
    assert!(waited.is_err());
    assert!(!manager.is_ready());

    kernels.started.notify_one();
    manager.ready().await;
    assert!(manager.is_ready());
}

#[tokio::test]
async fn test_refresh_twice_emits_once() {
    let api = ScriptedApi::with_sessions(vec![session("s1", "a.ipynb")]);
    let manager = manager(&api).await;
    let (seen, _sub) = record_running(&manager);

    assert_ok!(api.server.put(session("s2", "b.ipynb")));
    assert_ok!(manager.refresh_running().await);
    assert_ok!(manager.refresh_running().await);

    let seen = seen.lock().unwrap();
    assert_eq!(seen.len(), 1);
    assert_eq!(seen[0].len(), 2);
}

#[tokio::test]
async fn test_changed_models_update_and_dispose_connections() {
    let (a, b, c) = (
        session("a", "a.ipynb"),
        session("b", "b.ipynb"),
        session("c", "c.ipynb"),
    );
    let api = ScriptedApi::with_sessions(vec![a.clone(), b.clone(), c.clone()]);
    let manager = recording_manager(&api).await;
    let conn_a = manager.connect_to(a);
    let conn_b = manager.connect_to(b.clone());
    let conn_c = manager.connect_to(c);
    assert_eq!(manager.connection_count(), 3);
    let (seen, _sub) = record_running(&manager);

    let mut moved = session("a", "renamed.ipynb");
    moved.name = "renamed".into();
    assert_ok!(api.server.put(moved.clone()));
    assert_ok!(api.server.remove("c"));
    assert_ok!(manager.refresh_running().await);

    assert_eq!(*seen.lock().unwrap(), vec![vec![moved.clone(), b.clone()]]);
    assert_eq!(conn_a.model(), moved);
    assert_eq!(conn_a.updates(), 1);
    assert_eq!(conn_b.updates(), 1);
    assert!(conn_c.is_disposed());
    assert!(!conn_a.is_disposed());
    assert_eq!(manager.connection_count(), 2);

    // Feedback refreshes from the update and the disposal settle silently.
    assert_ok!(manager.refresh_running().await);
    assert_eq!(seen.lock().unwrap().len(), 1);
    assert_eq!(conn_a.updates(), 1);
}

#[tokio::test]
async fn test_duplicate_ids_keep_one_model() {
    let api = ScriptedApi::with_sessions(vec![session("a", "a.ipynb")]);
    let manager = recording_manager(&api).await;
    let conn = manager.connect_to(session("a", "a.ipynb"));
    let (seen, _sub) = record_running(&manager);

    let later = session("a", "later.ipynb");
    *api.list_override.lock().unwrap() = Some(vec![
        session("a", "first.ipynb"),
        session("b", "b.ipynb"),
        later.clone(),
    ]);
    assert_ok!(manager.refresh_running().await);

    let running: Vec<SessionModel> = manager.running().collect();
    assert_eq!(running, vec![later.clone(), session("b", "b.ipynb")]);
    assert_eq!(conn.updates(), 1);
    assert_eq!(conn.model(), later);

    // The same duplicated list again is not a change.
    assert_ok!(manager.refresh_running().await);
    assert_eq!(seen.lock().unwrap().len(), 1);
}

#[tokio::test]
async fn test_connect_to_unknown_session_is_disposed() {
    let api = ScriptedApi::with_sessions(vec![session("a", "a.ipynb")]);
    let manager = manager(&api).await;
    let (seen, _sub) = record_running(&manager);

    let conn = manager.connect_to(session("ghost", "ghost.ipynb"));
    assert!(!conn.is_disposed());

    assert_ok!(manager.refresh_running().await);
    assert!(conn.is_disposed());
    assert_eq!(manager.connection_count(), 0);
    assert!(seen.lock().unwrap().is_empty());
}

#[tokio::test]
async fn test_connect_to_session_confirmed_by_server() {
    let api = ScriptedApi::with_sessions(vec![]);
    let manager = manager(&api).await;

    let fresh = session("late", "late.ipynb");
    assert_ok!(api.server.put(fresh.clone()));
    let conn = manager.connect_to(fresh.clone());

    assert_ok!(manager.refresh_running().await);
    assert!(!conn.is_disposed());
    assert_eq!(conn.kernel().unwrap().id(), "k-late");
    assert_eq!(running_ids(&manager), vec!["late"]);
}

#[tokio::test]
async fn test_slow_fetch_cannot_restore_shut_down_session() {
    let api = ScriptedApi::with_sessions(vec![session("s1", "a.ipynb")]);
    let manager = manager(&api).await;
    let (seen, _sub) = record_running(&manager);

    let gate = api.hold_next_list();
    let background = tokio::spawn({
        let manager = Arc::clone(&manager);
        async move { manager.refresh_running().await }
    });
    api.list_held.notified().await;

    assert_ok!(manager.shutdown(&"s1".to_string()).await);
    assert!(running_ids(&manager).is_empty());

    gate.notify_one();
    assert_ok!(assert_ok!(background.await));

    assert!(running_ids(&manager).is_empty());
    assert_eq!(*seen.lock().unwrap(), vec![Vec::<SessionModel>::new()]);

    assert_ok!(manager.refresh_running().await);
    assert!(running_ids(&manager).is_empty());
    assert_eq!(seen.lock().unwrap().len(), 1);
}

#[tokio::test]
async fn test_overlapping_refreshes_apply_newest_list() {
    let api = ScriptedApi::with_sessions(vec![session("a", "a.ipynb")]);
    let manager = recording_manager(&api).await;
    let conn = manager.connect_to(session("a", "a.ipynb"));
    let (seen, _sub) = record_running(&manager);

    let gate = api.hold_next_list();
    let slow = tokio::spawn({
        let manager = Arc::clone(&manager);
        async move { manager.request_running().await }
    });
    api.list_held.notified().await;

    let moved = session("a", "moved.ipynb");
    assert_ok!(api.server.put(moved.clone()));
    assert_ok!(api.server.put(session("b", "b.ipynb")));
    assert_ok!(manager.request_running().await);

    gate.notify_one();
    assert_ok!(assert_ok!(slow.await));

    assert_eq!(running_ids(&manager), vec!["a", "b"]);
    assert_eq!(conn.model(), moved);
    assert_eq!(conn.updates(), 1);
    assert_eq!(
        *seen.lock().unwrap(),
        vec![vec![moved, session("b", "b.ipynb")]]
    );
}

#[tokio::test]
async fn test_dispose_during_fetch_keeps_map_empty() {
    let api = ScriptedApi::with_sessions(vec![session("a", "a.ipynb")]);
    let manager = manager(&api).await;
    let (seen, _sub) = record_running(&manager);
    assert_ok!(api.server.put(session("b", "b.ipynb")));

    let gate = api.hold_next_list();
    let fetch = tokio::spawn({
        let manager = Arc::clone(&manager);
        async move { manager.request_running().await }
    });
    api.list_held.notified().await;

    manager.dispose();
    gate.notify_one();
    assert_ok!(assert_ok!(fetch.await));

    assert_eq!(manager.running().count(), 0);
    assert!(seen.lock().unwrap().is_empty());
}

#[tokio::test]
async fn test_connect_after_dispose_is_not_tracked() {
    let api = ScriptedApi::with_sessions(vec![session("a", "a.ipynb")]);
    let manager = manager(&api).await;
    manager.dispose();

    let conn = manager.connect_to(session("a", "a.ipynb"));

    assert!(conn.is_disposed());
    assert!(conn.kernel().is_none());
    assert_eq!(manager.connection_count(), 0);
}

#[tokio::test]
async fn test_failed_fetch_keeps_local_state() {
    let api = ScriptedApi::with_sessions(vec![session("a", "a.ipynb")]);
    let manager = manager(&api).await;
    let failures = Arc::new(Mutex::new(Vec::new()));
    let _sub = {
        let failures = Arc::clone(&failures);
        manager
            .connection_failure()
            .connect(move |e: &SessionError| failures.lock().unwrap().push(e.clone()))
    };
    let (seen, _running_sub) = record_running(&manager);

    api.fail_list(Some(SessionError::Network("reset".into())));
    let err = assert_err!(manager.refresh_running().await);
    assert_eq!(err, SessionError::Network("reset".into()));

    let unavailable = SessionError::Http {
        status: 503,
        message: "starting".into(),
    };
    api.fail_list(Some(unavailable.clone()));
    assert_err!(manager.refresh_running().await);

    api.fail_list(Some(SessionError::Http {
        status: 500,
        message: "boom".into(),
    }));
    let err = assert_err!(manager.refresh_running().await);
    assert_eq!(err.status(), Some(500));

    assert_eq!(
        *failures.lock().unwrap(),
        vec![SessionError::Network("reset".into()), unavailable]
    );
    assert_eq!(running_ids(&manager), vec!["a"]);
    assert!(seen.lock().unwrap().is_empty());
}

#[tokio::test]
async fn test_start_new_connects_to_started_session() {
    let api = ScriptedApi::with_sessions(vec![]);
    let manager = manager(&api).await;

    let conn = assert_ok!(
        manager
            .start_new(
                SessionCreateOptions::new("nb.ipynb").with_kernel("python3"),
                ConnectOptions {
                    client_id: Some("client-1".into()),
                    username: None,
                },
            )
            .await
    );

    assert_eq!(conn.path(), "nb.ipynb");
    assert_eq!(conn.kernel().unwrap().name(), "python3");
    assert_eq!(running_ids(&manager), vec![conn.id()]);
    assert_eq!(manager.connection_count(), 1);

    let err = assert_err!(
        manager
            .start_new(SessionCreateOptions::default(), ConnectOptions::default())
            .await
    );
    assert_eq!(err.status(), Some(400));
}

#[tokio::test]
async fn test_shutdown_missing_session_is_ok() {
    let api = ScriptedApi::with_sessions(vec![session("a", "a.ipynb")]);
    let manager = manager(&api).await;

    assert_ok!(manager.shutdown(&"s1".to_string()).await);
    assert!(!running_ids(&manager).contains(&"s1".to_string()));
    assert_eq!(running_ids(&manager), vec!["a"]);
}

#[tokio::test]
async fn test_shutdown_disposes_connection() {
    let api = ScriptedApi::with_sessions(vec![session("a", "a.ipynb")]);
    let manager = manager(&api).await;
    let conn = manager.connect_to(session("a", "a.ipynb"));

    assert_ok!(manager.shutdown(&"a".to_string()).await);
    assert!(conn.is_disposed());
    assert_eq!(manager.running().count(), 0);
}

#[tokio::test]
async fn test_shutdown_failure_still_resyncs() {
    let api = ScriptedApi::with_sessions(vec![session("a", "a.ipynb")]);
    let manager = manager(&api).await;
    api.fail_stop("a", SessionError::Request("denied".into()));
    assert_ok!(api.server.put(session("b", "b.ipynb")));

    let err = assert_err!(manager.shutdown(&"a".to_string()).await);
    assert_eq!(err, SessionError::Request("denied".into()));
    assert_eq!(running_ids(&manager), vec!["a", "b"]);
}

#[tokio::test]
async fn test_shutdown_all_reports_partial_failure() {
    let api = ScriptedApi::with_sessions(vec![session("s1", "a.ipynb"), session("s2", "b.ipynb")]);
    let manager = manager(&api).await;
    api.fail_stop("s1", SessionError::Request("locked".into()));

    let err = assert_err!(manager.shutdown_all().await);
    match err {
        SessionError::ShutdownAll { failures } => {
            assert_eq!(
                failures,
                vec![("s1".to_string(), SessionError::Request("locked".into()))]
            );
        }
        other => panic!("unexpected error: {other}"),
    }

    let mut stopped = api.stop_calls();
    stopped.sort();
    assert_eq!(stopped, vec!["s1", "s2"]);
    assert_eq!(running_ids(&manager), vec!["s1"]);
}

#[tokio::test]
async fn test_shutdown_all_clears_everything() {
    let api = ScriptedApi::with_sessions(vec![session("s1", "a.ipynb"), session("s2", "b.ipynb")]);
    let manager = manager(&api).await;
    let conn = manager.connect_to(session("s2", "b.ipynb"));

    assert_ok!(manager.shutdown_all().await);
    assert_eq!(manager.running().count(), 0);
    assert!(conn.is_disposed());
}

#[tokio::test]
async fn test_stop_if_needed_skips_ambiguous_path() {
    let api = ScriptedApi::with_sessions(vec![
        session("s1", "/doc.ipynb"),
        session("s2", "/doc.ipynb"),
    ]);
    let manager = manager(&api).await;

    manager.stop_if_needed("/doc.ipynb").await;
    assert!(api.stop_calls().is_empty());
    assert_eq!(manager.running().count(), 2);
}

#[tokio::test]
async fn test_stop_if_needed_stops_single_match() {
    let api = ScriptedApi::with_sessions(vec![
        session("s1", "/doc.ipynb"),
        session("s2", "/other"),
    ]);
    let manager = manager(&api).await;

    manager.stop_if_needed("/doc.ipynb").await;
    assert_eq!(api.stop_calls(), vec!["s1"]);
    assert_eq!(running_ids(&manager), vec!["s2"]);
}

#[tokio::test]
async fn test_stop_if_needed_swallows_errors() {
    let api = ScriptedApi::with_sessions(vec![session("s1", "/doc.ipynb")]);
    let manager = manager(&api).await;
    api.fail_list(Some(SessionError::Network("offline".into())));

    manager.stop_if_needed("/doc.ipynb").await;
    assert!(api.stop_calls().is_empty());

    api.fail_list(None);
    api.fail_stop("s1", SessionError::Request("denied".into()));
    manager.stop_if_needed("/doc.ipynb").await;
    assert_eq!(api.stop_calls(), vec!["s1"]);
}

#[tokio::test]
async fn test_find_refreshes_once_on_miss() {
    let api = ScriptedApi::with_sessions(vec![session("a", "a.ipynb")]);
    let manager = manager(&api).await;

    let found = assert_ok!(manager.find_by_id("a").await);
    assert_eq!(found.unwrap().path, "a.ipynb");
    assert_eq!(api.list_calls.load(Ordering::SeqCst), 1);

    assert_ok!(api.server.put(session("b", "b.ipynb")));
    let found = assert_ok!(manager.find_by_path("b.ipynb").await);
    assert_eq!(found.unwrap().id, "b");
    assert_eq!(api.list_calls.load(Ordering::SeqCst), 2);

    assert!(assert_ok!(manager.find_by_id("nope").await).is_none());
    assert!(assert_ok!(manager.find_by_path("nope.ipynb").await).is_none());
    assert_eq!(api.list_calls.load(Ordering::SeqCst), 4);
}

#[tokio::test]
async fn test_find_propagates_refresh_error() {
    let api = ScriptedApi::with_sessions(vec![]);
    let manager = manager(&api).await;
    api.fail_list(Some(SessionError::Request("bad".into())));

    assert_err!(manager.find_by_id("a").await);
}

#[tokio::test]
async fn test_local_change_is_confirmed_by_refresh() {
    let api = ScriptedApi::with_sessions(vec![session("a", "a.ipynb")]);
    let manager = manager(&api).await;
    let conn = manager.connect_to(session("a", "a.ipynb"));
    let (seen, _sub) = record_running(&manager);

    assert_ok!(conn.set_path("moved.ipynb").await);
    assert_ok!(manager.refresh_running().await);

    let found = assert_ok!(manager.find_by_path("moved.ipynb").await);
    assert_eq!(found.unwrap().id, "a");
    assert_eq!(seen.lock().unwrap().len(), 1);
}

#[tokio::test]
async fn test_owner_dispose_unregisters_connection() {
    let api = ScriptedApi::with_sessions(vec![session("a", "a.ipynb")]);
    let manager = manager(&api).await;
    let first = manager.connect_to(session("a", "a.ipynb"));
    let second = manager.connect_to(session("a", "a.ipynb"));
    assert_eq!(manager.connection_count(), 2);

    first.dispose();
    assert_eq!(manager.connection_count(), 1);

    assert_ok!(manager.refresh_running().await);
    assert!(!second.is_disposed());
    assert_eq!(running_ids(&manager), vec!["a"]);
}

#[tokio::test]
async fn test_dispose_tears_everything_down() {
    let api = ScriptedApi::with_sessions(vec![session("a", "a.ipynb")]);
    let manager = manager(&api).await;
    let conn = manager.connect_to(session("a", "a.ipynb"));
    let disposals = Arc::new(AtomicUsize::new(0));
    let _sub = {
        let disposals = Arc::clone(&disposals);
        manager.disposed().connect(move |_| {
            disposals.fetch_add(1, Ordering::SeqCst);
        })
    };
    let (seen, _running_sub) = record_running(&manager);

    manager.dispose();
    manager.dispose();

    assert!(manager.is_disposed());
    assert!(conn.is_disposed());
    assert_eq!(manager.connection_count(), 0);
    assert_eq!(manager.running().count(), 0);
    assert_eq!(disposals.load(Ordering::SeqCst), 1);

    assert_ok!(api.server.put(session("b", "b.ipynb")));
    assert_ok!(manager.request_running().await);
    assert_ok!(manager.refresh_running().await);
    assert_eq!(manager.running().count(), 0);
    assert!(seen.lock().unwrap().is_empty());
}
