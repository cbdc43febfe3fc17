//! Session and kernel models as reported by the server.

use serde::{Deserialize, Serialize};

use crate::SessionError;

/// Server-issued session identifier.
pub type SessionId = String;

/// Server-issued kernel identifier.
pub type KernelId = String;

/// Descriptor of the kernel attached to a session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KernelModel {
    /// Unique kernel identifier.
    pub id: KernelId,
    /// Kernel spec name (e.g. `python3`).
    pub name: String,
}

/// Point-in-time snapshot of one server session.
///
/// Only ever produced from a server response; the manager replaces
/// snapshots wholesale and never edits their fields.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionModel {
    /// Unique session identifier.
    pub id: SessionId,
    /// Path of the resource the session is bound to.
    pub path: String,
    /// Display name of the session.
    #[serde(default)]
    pub name: String,
    /// Session type (e.g. `notebook`, `console`).
    #[serde(rename = "type", default)]
    pub session_type: String,
    /// Attached kernel, if any.
    #[serde(default)]
    pub kernel: Option<KernelModel>,
}

impl SessionModel {
    /// Create a session model without a kernel.
    #[must_use]
    pub fn new(id: impl Into<SessionId>, path: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            path: path.into(),
            name: String::new(),
            session_type: String::new(),
            kernel: None,
        }
    }

    /// Attach a kernel descriptor.
    #[must_use]
    pub fn with_kernel(mut self, id: impl Into<KernelId>, name: impl Into<String>) -> Self {
        self.kernel = Some(KernelModel {
            id: id.into(),
            name: name.into(),
        });
        self
    }

    /// Check the invariants a server model must satisfy.
    ///
    /// # Errors
    /// Returns `InvalidModel` if the session or kernel id is empty.
    pub fn validate(&self) -> Result<(), SessionError> {
        if self.id.is_empty() {
            return Err(SessionError::InvalidModel(format!(
                "session at '{}' has an empty id",
                self.path
            )));
        }
        if let Some(kernel) = &self.kernel {
            if kernel.id.is_empty() {
                return Err(SessionError::InvalidModel(format!(
                    "kernel of session {} has an empty id",
                    self.id
                )));
            }
        }
        Ok(())
    }
}

/// Decode and validate a list of sessions from a server payload.
///
/// # Errors
/// Returns `Decode` for malformed JSON and `InvalidModel` for bad entries.
pub fn parse_session_list(payload: &[u8]) -> Result<Vec<SessionModel>, SessionError> {
    let models: Vec<SessionModel> =
        serde_json::from_slice(payload).map_err(|e| SessionError::Decode(e.to_string()))?;
    for model in &models {
        model.validate()?;
    }
    Ok(models)
}

/// Decode and validate a single session from a server payload.
///
/// # Errors
/// Returns `Decode` for malformed JSON and `InvalidModel` for a bad model.
pub fn parse_session(payload: &[u8]) -> Result<SessionModel, SessionError> {
    let model: SessionModel =
        serde_json::from_slice(payload).map_err(|e| SessionError::Decode(e.to_string()))?;
    model.validate()?;
    Ok(model)
}

/// Kernel requested when starting or changing a session.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct KernelSpec {
    /// Kernel spec name.
    pub name: String,
    /// Existing kernel to attach instead of starting a new one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<KernelId>,
}

/// Options for starting a new session.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionCreateOptions {
    /// Resource path to bind.
    pub path: String,
    /// Display name.
    #[serde(default)]
    pub name: String,
    /// Session type.
    #[serde(rename = "type", default)]
    pub session_type: String,
    /// Kernel to start or attach.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub kernel: Option<KernelSpec>,
}

impl SessionCreateOptions {
    /// Options for a session bound to `path` with no kernel preference.
    #[must_use]
    pub fn new(path: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            ..Self::default()
        }
    }

    /// Request a kernel by spec name.
    #[must_use]
    pub fn with_kernel(mut self, name: impl Into<String>) -> Self {
        self.kernel = Some(KernelSpec {
            name: name.into(),
            id: None,
        });
        self
    }
}

/// Partial update of a server session.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionPatch {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub session_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub kernel: Option<KernelSpec>,
}

/// Client identity threaded into kernel connections.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConnectOptions {
    #[serde(default)]
    pub client_id: Option<String>,
    #[serde(default)]
    pub username: Option<String>,
}
