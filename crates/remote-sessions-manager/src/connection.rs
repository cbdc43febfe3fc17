//! Default session connection.

use std::sync::{
    Arc, Mutex, PoisonError,
    atomic::{AtomicBool, Ordering},
};

use remote_sessions_core::{
    ConnectionContext, ConnectionEvent, ConnectionFactory, KernelConnection, KernelModel,
    KernelSpec, Property, SessionConnection, SessionError, SessionId, SessionModel, SessionPatch,
    Signal, Subscription,
};

struct State {
    model: SessionModel,
    kernel: Option<Arc<dyn KernelConnection>>,
}

/// Session connection holding the latest model and a kernel connection.
///
/// Setters go through the server first and apply the model it returns,
/// so local state only ever reflects server answers.
pub struct DefaultSessionConnection {
    id: SessionId,
    context: ConnectionContext,
    state: Mutex<State>,
    events: Signal<ConnectionEvent>,
    disposed: AtomicBool,
}

impl DefaultSessionConnection {
    /// Create a connection for `model`, connecting to its kernel if any.
    #[must_use]
    pub fn new(model: SessionModel, context: ConnectionContext) -> Self {
        let kernel = model
            .kernel
            .as_ref()
            .map(|k| context.kernels.connect_to(k, &context.options));
        Self {
            id: model.id.clone(),
            context,
            state: Mutex::new(State { model, kernel }),
            events: Signal::new(),
            disposed: AtomicBool::new(false),
        }
    }

    fn state(&self) -> std::sync::MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Resource path the session is bound to.
    #[must_use]
    pub fn path(&self) -> String {
        self.state().model.path.clone()
    }

    /// Display name, empty if the server has none.
    #[must_use]
    pub fn name(&self) -> String {
        self.state().model.name.clone()
    }

    /// Session type as reported by the server (e.g. `notebook`).
    #[must_use]
    pub fn session_type(&self) -> String {
        self.state().model.session_type.clone()
    }

    /// Move the session to a new resource path.
    ///
    /// # Errors
    /// Returns the server's error; local state is left unchanged.
    pub async fn set_path(&self, path: impl Into<String>) -> Result<(), SessionError> {
        self.patch(SessionPatch {
            path: Some(path.into()),
            ..SessionPatch::default()
        })
        .await
    }

    /// Rename the session.
    ///
    /// # Errors
    /// Returns the server's error; local state is left unchanged.
    pub async fn set_name(&self, name: impl Into<String>) -> Result<(), SessionError> {
        self.patch(SessionPatch {
            name: Some(name.into()),
            ..SessionPatch::default()
        })
        .await
    }

    /// Change the session type.
    ///
    /// # Errors
    /// Returns the server's error; local state is left unchanged.
    pub async fn set_type(&self, session_type: impl Into<String>) -> Result<(), SessionError> {
        self.patch(SessionPatch {
            session_type: Some(session_type.into()),
            ..SessionPatch::default()
        })
        .await
    }

    /// Replace the session's kernel and return the new kernel connection.
    ///
    /// # Errors
    /// Returns the server's error; local state is left unchanged.
    pub async fn change_kernel(
        &self,
        spec: KernelSpec,
    ) -> Result<Option<Arc<dyn KernelConnection>>, SessionError> {
        self.patch(SessionPatch {
            kernel: Some(spec),
            ..SessionPatch::default()
        })
        .await?;
        Ok(self.kernel())
    }

    /// Stop the session on the server, then dispose this connection.
    ///
    /// # Errors
    /// Returns `Disposed` if already disposed, or the server's error.
    pub async fn shutdown(&self) -> Result<(), SessionError> {
        if self.is_disposed() {
            return Err(SessionError::Disposed);
        }
        self.context.api.stop_session(&self.id).await?;
        self.dispose();
        Ok(())
    }

    async fn patch(&self, patch: SessionPatch) -> Result<(), SessionError> {
        if self.is_disposed() {
            return Err(SessionError::Disposed);
        }
        let model = self.context.api.update_session(&self.id, &patch).await?;
        self.update(model);
        Ok(())
    }
}

impl std::fmt::Debug for DefaultSessionConnection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DefaultSessionConnection")
            .field("id", &self.id)
            .field("disposed", &self.is_disposed())
            .finish_non_exhaustive()
    }
}

fn same_kernel(current: Option<&Arc<dyn KernelConnection>>, next: Option<&KernelModel>) -> bool {
    match (current, next) {
        (None, None) => true,
        (Some(current), Some(next)) => current.id() == next.id,
        _ => false,
    }
}

impl SessionConnection for DefaultSessionConnection {
    fn id(&self) -> SessionId {
        self.id.clone()
    }

    fn model(&self) -> SessionModel {
        self.state().model.clone()
    }

    fn kernel(&self) -> Option<Arc<dyn KernelConnection>> {
        self.state().kernel.clone()
    }

    fn update(&self, model: SessionModel) {
        if self.is_disposed() {
            return;
        }

        let mut events = Vec::new();
        {
            let mut state = self.state();

            if !same_kernel(state.kernel.as_ref(), model.kernel.as_ref()) {
                if let Some(old) = state.kernel.take() {
                    old.dispose();
                }
                state.kernel = model
                    .kernel
                    .as_ref()
                    .map(|k| self.context.kernels.connect_to(k, &self.context.options));
                events.push(ConnectionEvent::KernelChanged);
            }

            let old = std::mem::replace(&mut state.model, model);
            if old.name != state.model.name {
                events.push(ConnectionEvent::PropertyChanged(Property::Name));
            }
            if old.session_type != state.model.session_type {
                events.push(ConnectionEvent::PropertyChanged(Property::Type));
            }
            if old.path != state.model.path {
                events.push(ConnectionEvent::PropertyChanged(Property::Path));
            }
        }

        for event in events {
            self.events.emit(event);
        }
    }

    fn dispose(&self) {
        if self.disposed.swap(true, Ordering::SeqCst) {
            return;
        }
        if let Some(kernel) = self.state().kernel.take() {
            kernel.dispose();
        }
        tracing::debug!(session_id = %self.id, "Disposed session connection");
        self.events.emit(ConnectionEvent::Disposed);
    }

    fn is_disposed(&self) -> bool {
        self.disposed.load(Ordering::SeqCst)
    }

    fn subscribe(&self, listener: Box<dyn Fn(&ConnectionEvent) + Send + Sync>) -> Subscription {
        self.events.connect(move |event| listener(event))
    }
}

/// Factory for [`DefaultSessionConnection`]s.
#[derive(Debug, Default, Clone)]
pub struct DefaultConnectionFactory;

impl ConnectionFactory for DefaultConnectionFactory {
    type Connection = DefaultSessionConnection;

    fn connect(&self, model: SessionModel, context: ConnectionContext) -> Arc<Self::Connection> {
        Arc::new(DefaultSessionConnection::new(model, context))
    }
}
