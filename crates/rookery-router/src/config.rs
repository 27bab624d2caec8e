//! Router configuration.

use std::time::Duration;

use serde::Deserialize;

/// Default housekeeping period, in seconds.
pub const DEFAULT_HOUSEKEEPING_SECS: u64 = 3;

/// Dispatcher tuning.
///
/// Keep the housekeeping period at or above 1.5x the membership TTL to avoid
/// purging presences of nodes that are merely late on a keepalive.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct RouterConfig {
    /// Period of the leader-only presence garbage collection, in seconds.
    pub housekeeping_secs: u64,
}

impl Default for RouterConfig {
    fn default() -> Self {
        Self {
            housekeeping_secs: DEFAULT_HOUSEKEEPING_SECS,
        }
    }
}

impl RouterConfig {
    /// Housekeeping period as a [`Duration`].
    pub fn housekeeping_interval(&self) -> Duration {
        Duration::from_secs(self.housekeeping_secs.max(1))
    }
}
