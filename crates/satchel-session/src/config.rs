//! Configuration for the session manager.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Default provider name.
pub const DEFAULT_PROVIDER: &str = "sqlite";

/// Default maximum session lifetime (one hour).
pub const DEFAULT_MAX_LIFETIME: Duration = Duration::from_secs(3600);

/// Default maximum idle time (30 minutes). Also the GC interval.
pub const DEFAULT_MAX_IDLE: Duration = Duration::from_secs(1800);

/// How a GC sweep walks the recency index.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GcMode {
    /// Walk from the least recently touched end and stop at the first
    /// session still within both limits.
    #[default]
    StaleEnd,

    /// Check every live session.
    FullScan,
}

/// Configuration for the session manager.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ManagerConfig {
    /// Registered provider to use.
    pub provider: String,

    /// Sessions older than this are collected.
    #[serde(rename = "max_lifetime_secs", with = "duration_secs")]
    pub max_lifetime: Duration,

    /// Sessions untouched for this long are collected. Sweeps run at this
    /// interval.
    #[serde(rename = "max_idle_secs", with = "duration_secs")]
    pub max_idle: Duration,

    pub gc_mode: GcMode,
}

impl Default for ManagerConfig {
    fn default() -> Self {
        Self {
            provider: DEFAULT_PROVIDER.to_string(),
            max_lifetime: DEFAULT_MAX_LIFETIME,
            max_idle: DEFAULT_MAX_IDLE,
            gc_mode: GcMode::default(),
        }
    }
}

impl ManagerConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_provider(mut self, name: impl Into<String>) -> Self {
        self.provider = name.into();
        self
    }

    pub fn with_max_lifetime(mut self, max_lifetime: Duration) -> Self {
        self.max_lifetime = max_lifetime;
        self
    }

    pub fn with_max_idle(mut self, max_idle: Duration) -> Self {
        self.max_idle = max_idle;
        self
    }

    pub fn with_gc_mode(mut self, mode: GcMode) -> Self {
        self.gc_mode = mode;
        self
    }
}

mod duration_secs {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_u64(d.as_secs())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Duration, D::Error> {
        u64::deserialize(d).map(Duration::from_secs)
    }
}
