//! In-memory session API.

use std::sync::RwLock;

use async_trait::async_trait;
use remote_sessions_core::{
    KernelModel, KernelSpec, SessionApi, SessionCreateOptions, SessionError, SessionId,
    SessionModel, SessionPatch,
};
use uuid::Uuid;

/// In-memory session API implementation.
///
/// Behaves like a single server process: starting a session for a path
/// that already has one returns the existing session, and stopping an
/// unknown session succeeds. Sessions are listed in creation order.
pub struct MemorySessionApi {
    sessions: RwLock<Vec<SessionModel>>,
}

impl MemorySessionApi {
    /// Create an empty server.
    #[must_use]
    pub fn new() -> Self {
        Self {
            sessions: RwLock::new(Vec::new()),
        }
    }

    /// Create a server that already hosts `sessions`.
    #[must_use]
    pub fn with_sessions(sessions: Vec<SessionModel>) -> Self {
        Self {
            sessions: RwLock::new(sessions),
        }
    }

    /// Replace a hosted session out of band, as another client would.
    ///
    /// # Errors
    /// Returns `Request` if the lock is poisoned.
    pub fn put(&self, model: SessionModel) -> Result<(), SessionError> {
        let mut sessions = self
            .sessions
            .write()
            .map_err(|e| SessionError::Request(e.to_string()))?;

        match sessions.iter_mut().find(|s| s.id == model.id) {
            Some(existing) => *existing = model,
            None => sessions.push(model),
        }
        Ok(())
    }

    /// Drop a hosted session out of band.
    ///
    /// # Errors
    /// Returns `Request` if the lock is poisoned.
    pub fn remove(&self, id: &str) -> Result<Option<SessionModel>, SessionError> {
        let mut sessions = self
            .sessions
            .write()
            .map_err(|e| SessionError::Request(e.to_string()))?;

        Ok(sessions
            .iter()
            .position(|s| s.id == id)
            .map(|idx| sessions.remove(idx)))
    }
}

impl Default for MemorySessionApi {
    fn default() -> Self {
        Self::new()
    }
}

fn kernel_for(spec: &KernelSpec) -> KernelModel {
    KernelModel {
        id: spec
            .id
            .clone()
            .unwrap_or_else(|| Uuid::new_v4().to_string()),
        name: spec.name.clone(),
    }
}

#[async_trait]
impl SessionApi for MemorySessionApi {
    async fn list_running(&self) -> Result<Vec<SessionModel>, SessionError> {
        Ok(self
            .sessions
            .read()
            .map_err(|e| SessionError::Request(e.to_string()))?
            .clone())
    }

    async fn get_session(&self, id: &SessionId) -> Result<Option<SessionModel>, SessionError> {
        Ok(self
            .sessions
            .read()
            .map_err(|e| SessionError::Request(e.to_string()))?
            .iter()
            .find(|s| &s.id == id)
            .cloned())
    }

    async fn start_session(
        &self,
        options: &SessionCreateOptions,
    ) -> Result<SessionModel, SessionError> {
        if options.path.is_empty() {
            return Err(SessionError::Http {
                status: 400,
                message: "session path is required".to_string(),
            });
        }

        let mut sessions = self
            .sessions
            .write()
            .map_err(|e| SessionError::Request(e.to_string()))?;

        if let Some(existing) = sessions.iter().find(|s| s.path == options.path) {
            return Ok(existing.clone());
        }

        let model = SessionModel {
            id: Uuid::new_v4().to_string(),
            path: options.path.clone(),
            name: options.name.clone(),
            session_type: options.session_type.clone(),
            kernel: options.kernel.as_ref().map(kernel_for),
        };
        sessions.push(model.clone());

        Ok(model)
    }

    async fn update_session(
        &self,
        id: &SessionId,
        patch: &SessionPatch,
    ) -> Result<SessionModel, SessionError> {
        let mut sessions = self
            .sessions
            .write()
            .map_err(|e| SessionError::Request(e.to_string()))?;

        let session = sessions
            .iter_mut()
            .find(|s| &s.id == id)
            .ok_or_else(|| SessionError::Http {
                status: 404,
                message: format!("Session not found: {id}"),
            })?;

        if let Some(path) = &patch.path {
            session.path.clone_from(path);
        }
        if let Some(name) = &patch.name {
            session.name.clone_from(name);
        }
        if let Some(session_type) = &patch.session_type {
            session.session_type.clone_from(session_type);
        }
        if let Some(kernel) = &patch.kernel {
            session.kernel = Some(kernel_for(kernel));
        }

        Ok(session.clone())
    }

    async fn stop_session(&self, id: &SessionId) -> Result<(), SessionError> {
        if self.remove(id)?.is_none() {
            tracing::warn!(session_id = %id, "The session does not exist on the server");
        }
        Ok(())
    }
}
