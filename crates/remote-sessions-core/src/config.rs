//! Manager and polling configuration.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// When periodic polling is suspended.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Standby {
    /// Always poll.
    Never,
    /// Suspend while the consuming context is not visible.
    #[default]
    WhenHidden,
}

/// Polling schedule for the session list.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PollOptions {
    /// Base interval between polls, in milliseconds.
    pub interval_ms: u64,
    /// Upper bound for the backed-off interval, in milliseconds.
    pub max_interval_ms: u64,
    /// Grow the interval exponentially while polls fail.
    pub backoff: bool,
    /// Standby policy.
    pub standby: Standby,
}

impl Default for PollOptions {
    fn default() -> Self {
        Self {
            interval_ms: 10 * 1000,
            max_interval_ms: 300 * 1000,
            backoff: true,
            standby: Standby::WhenHidden,
        }
    }
}

impl PollOptions {
    #[must_use]
    pub const fn interval(&self) -> Duration {
        Duration::from_millis(self.interval_ms)
    }

    #[must_use]
    pub const fn max_interval(&self) -> Duration {
        Duration::from_millis(self.max_interval_ms)
    }
}

/// Session manager configuration.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ManagerOptions {
    /// Schedule of the session list poll.
    pub poll: PollOptions,
}

impl ManagerOptions {
    /// Override the standby policy.
    #[must_use]
    pub const fn with_standby(mut self, standby: Standby) -> Self {
        self.poll.standby = standby;
        self
    }
}
