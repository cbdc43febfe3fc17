//! On-demand poller.

use std::sync::{
    Arc, Mutex, PoisonError,
    atomic::{AtomicBool, AtomicUsize, Ordering},
};

use async_trait::async_trait;
use futures::{
    FutureExt,
    future::{BoxFuture, Shared},
};
use remote_sessions_core::{PollOptions, PollTask, Poller, PollerFactory, SessionError};
use tokio::sync::Notify;

type Outcome = Shared<BoxFuture<'static, Result<(), SessionError>>>;

struct Run {
    started: Arc<AtomicBool>,
    outcome: Outcome,
}

/// Poller without a timer: the task runs only on `start` and `refresh`.
///
/// Each run is spawned on the current tokio runtime, so a refresh that
/// nobody awaits still executes. Every `tick` observes the same outcome.
pub struct ImmediatePoller {
    options: PollOptions,
    task: PollTask,
    latest: Mutex<Option<Run>>,
    runs: Arc<AtomicUsize>,
    running: AtomicBool,
    disposed: AtomicBool,
    on_dispose: Notify,
}

impl ImmediatePoller {
    #[must_use]
    pub fn new(options: PollOptions, task: PollTask) -> Self {
        Self {
            options,
            task,
            latest: Mutex::new(None),
            runs: Arc::new(AtomicUsize::new(0)),
            running: AtomicBool::new(false),
            disposed: AtomicBool::new(false),
            on_dispose: Notify::new(),
        }
    }

    /// Schedule the poller was configured with.
    #[must_use]
    pub const fn options(&self) -> &PollOptions {
        &self.options
    }

    /// Number of runs that have begun executing.
    #[must_use]
    pub fn run_count(&self) -> usize {
        self.runs.load(Ordering::SeqCst)
    }

    /// Whether the poller is started and not stopped.
    #[must_use]
    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    fn schedule(&self) {
        if self.is_disposed() {
            return;
        }
        let mut latest = self.latest.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(run) = latest.as_ref() {
            if !run.started.load(Ordering::SeqCst) {
                return;
            }
        }

        let started = Arc::new(AtomicBool::new(false));
        let flag = Arc::clone(&started);
        let runs = Arc::clone(&self.runs);
        let task = Arc::clone(&self.task);
        let outcome = async move {
            flag.store(true, Ordering::SeqCst);
            runs.fetch_add(1, Ordering::SeqCst);
            task().await
        }
        .boxed()
        .shared();

        tokio::spawn(outcome.clone().map(|_| ()));
        *latest = Some(Run { started, outcome });
    }
}

#[async_trait]
impl Poller for ImmediatePoller {
    async fn start(&self) {
        if self.is_disposed() || self.running.swap(true, Ordering::SeqCst) {
            return;
        }
        self.schedule();
    }

    fn refresh(&self) {
        self.schedule();
    }

    async fn tick(&self) -> Result<(), SessionError> {
        let disposed = self.on_dispose.notified();
        tokio::pin!(disposed);
        disposed.as_mut().enable();

        if self.is_disposed() {
            return Ok(());
        }
        let outcome = self
            .latest
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .as_ref()
            .map(|run| run.outcome.clone());
        let Some(outcome) = outcome else {
            return Ok(());
        };

        tokio::select! {
            result = outcome => result,
            () = disposed => Ok(()),
        }
    }

    fn stop(&self) {
        self.running.store(false, Ordering::SeqCst);
    }

    fn dispose(&self) {
        if self.disposed.swap(true, Ordering::SeqCst) {
            return;
        }
        self.running.store(false, Ordering::SeqCst);
        self.latest
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        self.on_dispose.notify_waiters();
    }

    fn is_disposed(&self) -> bool {
        self.disposed.load(Ordering::SeqCst)
    }
}

/// Factory for [`ImmediatePoller`]s.
#[derive(Debug, Default, Clone)]
pub struct ImmediatePollerFactory;

impl PollerFactory for ImmediatePollerFactory {
    fn create(&self, options: &PollOptions, task: PollTask) -> Arc<dyn Poller> {
        Arc::new(ImmediatePoller::new(options.clone(), task))
    }
}
