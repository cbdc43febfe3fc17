//! Core abstractions for client-side remote session management.
//!
//! This crate provides the fundamental building blocks:
//! - `SessionModel` - Server snapshot of one session
//! - `Signal` - Ordered publish/subscribe with unsubscribe handles
//! - `SessionError` - Shared error type
//! - `SessionApi`, `Poller`, `SessionConnection`, `KernelConnector` traits

pub mod config;
pub mod error;
pub mod kernel;
pub mod model;
pub mod signal;
pub mod traits;

pub use config::{ManagerOptions, PollOptions, Standby};
pub use error::SessionError;
pub use kernel::{BasicKernelConnector, KernelHandle};
pub use model::{
    ConnectOptions, KernelId, KernelModel, KernelSpec, SessionCreateOptions, SessionId,
    SessionModel, SessionPatch, parse_session, parse_session_list,
};
pub use signal::{Signal, Subscription};
pub use traits::{
    ConnectionContext, ConnectionEvent, ConnectionFactory, KernelConnection, KernelConnector,
    PollTask, Poller, PollerFactory, Property, SessionApi, SessionConnection,
};
