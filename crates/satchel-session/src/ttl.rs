//! Expiration rules for live sessions.

use std::time::Duration;

use chrono::{DateTime, Utc};

/// Lifetime and idle-time limits applied by a GC sweep.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Expiry {
    /// Maximum time since creation.
    pub max_lifetime: Duration,

    /// Maximum time since last access.
    pub max_idle: Duration,
}

impl Expiry {
    pub fn new(max_lifetime: Duration, max_idle: Duration) -> Self {
        Self {
            max_lifetime,
            max_idle,
        }
    }

    /// A session is expired once either limit is strictly exceeded.
    pub fn is_expired(
        &self,
        created_at: DateTime<Utc>,
        accessed_at: DateTime<Utc>,
        now: DateTime<Utc>,
    ) -> bool {
        elapsed(created_at, now) > self.max_lifetime || elapsed(accessed_at, now) > self.max_idle
    }
}

/// Time from `since` to `now`; zero if the clock went backwards.
fn elapsed(since: DateTime<Utc>, now: DateTime<Utc>) -> Duration {
    (now - since).to_std().unwrap_or_default()
}
