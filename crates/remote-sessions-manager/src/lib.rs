//! Session reconciliation against a remote server.
//!
//! Provides:
//! - `SessionManager` - Keep a local view of the server's sessions in sync
//! - `DefaultSessionConnection` - Live handle on one session
//! - `ImmediatePoller` - Poller that runs only when asked
//! - Session API implementations (memory)

pub mod api;
pub mod connection;
pub mod manager;
pub mod poll;

pub use connection::{DefaultConnectionFactory, DefaultSessionConnection};
pub use manager::SessionManager;
pub use poll::{ImmediatePoller, ImmediatePollerFactory};
