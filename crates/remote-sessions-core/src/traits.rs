//! Collaborator traits the session manager is built against.

use std::sync::Arc;

use async_trait::async_trait;
use futures::future::BoxFuture;

use crate::{
    ConnectOptions, KernelModel, PollOptions, SessionCreateOptions, SessionError, SessionId,
    SessionModel, SessionPatch, Subscription,
};

/// Remote session REST surface.
#[async_trait]
pub trait SessionApi: Send + Sync {
    /// List every session the server knows about.
    async fn list_running(&self) -> Result<Vec<SessionModel>, SessionError>;

    /// Fetch one session.
    async fn get_session(&self, id: &SessionId) -> Result<Option<SessionModel>, SessionError>;

    /// Start a session, or return the existing one bound to the same path.
    async fn start_session(
        &self,
        options: &SessionCreateOptions,
    ) -> Result<SessionModel, SessionError>;

    /// Patch a session and return the server's resulting model.
    async fn update_session(
        &self,
        id: &SessionId,
        patch: &SessionPatch,
    ) -> Result<SessionModel, SessionError>;

    /// Stop a session. Stopping an unknown session is not an error.
    async fn stop_session(&self, id: &SessionId) -> Result<(), SessionError>;
}

/// Work executed by a [`Poller`] on each run.
pub type PollTask = Arc<dyn Fn() -> BoxFuture<'static, Result<(), SessionError>> + Send + Sync>;

/// Scheduled, repeating task with an awaitable settle point.
#[async_trait]
pub trait Poller: Send + Sync {
    /// Begin polling. Runs the task once right away.
    async fn start(&self);

    /// Request an out-of-cycle run.
    ///
    /// Collapses onto a run that was requested but has not started yet.
    fn refresh(&self);

    /// Wait for the most recently requested run to settle and return its
    /// outcome. Resolves `Ok` once the poller is disposed.
    async fn tick(&self) -> Result<(), SessionError>;

    /// Suspend scheduled runs.
    fn stop(&self);

    /// Stop for good. Further refresh requests are ignored.
    fn dispose(&self);

    fn is_disposed(&self) -> bool;
}

/// Builds the poller a manager drives its refreshes through.
pub trait PollerFactory: Send + Sync {
    fn create(&self, options: &PollOptions, task: PollTask) -> Arc<dyn Poller>;
}

/// Property of a session connection that changed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Property {
    Name,
    Type,
    Path,
}

/// Lifecycle notification from a [`SessionConnection`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionEvent {
    /// The connection was disposed.
    Disposed,
    /// A session property changed.
    PropertyChanged(Property),
    /// The attached kernel appeared, vanished or was replaced.
    KernelChanged,
}

/// Live client-side handle on one session.
pub trait SessionConnection: Send + Sync {
    fn id(&self) -> SessionId;

    /// Current model as last applied.
    fn model(&self) -> SessionModel;

    /// Connection to the attached kernel, if any.
    fn kernel(&self) -> Option<Arc<dyn KernelConnection>>;

    /// Apply a fresh server model.
    fn update(&self, model: SessionModel);

    /// Dispose the connection. Idempotent.
    fn dispose(&self);

    fn is_disposed(&self) -> bool;

    /// Listen for lifecycle notifications.
    fn subscribe(&self, listener: Box<dyn Fn(&ConnectionEvent) + Send + Sync>) -> Subscription;
}

/// Collaborators handed to every new session connection.
#[derive(Clone)]
pub struct ConnectionContext {
    pub api: Arc<dyn SessionApi>,
    pub kernels: Arc<dyn KernelConnector>,
    pub options: ConnectOptions,
}

/// Builds session connections for a manager.
pub trait ConnectionFactory: Send + Sync + 'static {
    type Connection: SessionConnection + 'static;

    fn connect(&self, model: SessionModel, context: ConnectionContext) -> Arc<Self::Connection>;
}

/// Connection to the kernel attached to a session.
pub trait KernelConnection: Send + Sync {
    fn id(&self) -> String;
    fn name(&self) -> String;
    fn dispose(&self);
    fn is_disposed(&self) -> bool;
}

/// Opens kernel connections for session connections.
#[async_trait]
pub trait KernelConnector: Send + Sync {
    fn connect_to(
        &self,
        kernel: &KernelModel,
        options: &ConnectOptions,
    ) -> Arc<dyn KernelConnection>;

    /// Whether the connector has its own startup to wait for.
    fn is_active(&self) -> bool {
        false
    }

    /// Wait for the connector's startup to finish.
    async fn ready(&self) {}
}
