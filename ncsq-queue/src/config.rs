//! Queue configuration.

use crate::error::{QueueError, QueueResult};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::time::Duration;

/// Default key prefix.
pub const DEFAULT_PREFIX: &str = "ncsq";

/// Queue implementation selected at construction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum QueueMode {
    /// Plain FIFO list, no owners, no priorities, no positions
    Basic,
    /// Priority-scored queue with per-owner tracking (default)
    #[default]
    Priority,
}

impl FromStr for QueueMode {
    type Err = QueueError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "basic" | "fifo" => Ok(QueueMode::Basic),
            "priority" => Ok(QueueMode::Priority),
            other => Err(QueueError::Config(format!("unknown queue mode '{}'", other))),
        }
    }
}

impl fmt::Display for QueueMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            QueueMode::Basic => write!(f, "basic"),
            QueueMode::Priority => write!(f, "priority"),
        }
    }
}

/// Queue configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueueConfig {
    /// Prefix for every key
    pub key_prefix: String,

    /// Queue implementation
    #[serde(default)]
    pub mode: QueueMode,

    /// Write payload and both order-set entries in one atomic batch
    #[serde(default)]
    pub atomic_enqueue: bool,

    /// Minimum age before an unreferenced payload counts as orphaned
    #[serde(with = "duration_secs", default = "default_orphan_grace")]
    pub orphan_grace: Duration,
}

fn default_orphan_grace() -> Duration {
    Duration::from_secs(60)
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            key_prefix: DEFAULT_PREFIX.to_string(),
            mode: QueueMode::default(),
            atomic_enqueue: false,
            orphan_grace: default_orphan_grace(),
        }
    }
}

impl QueueConfig {
    /// Create a default configuration.
    pub fn new() -> Self {
        Self::default()
    }

    /// Load configuration from `NCSQ_*` environment variables.
    pub fn from_env() -> QueueResult<Self> {
        let mut config = Self::default();

        if let Ok(prefix) = std::env::var("NCSQ_PREFIX") {
            config = config.with_key_prefix(prefix);
        }

        if let Ok(mode) = std::env::var("NCSQ_MODE") {
            config = config.with_mode(mode.parse()?);
        }

        if let Ok(atomic) = std::env::var("NCSQ_ATOMIC_ENQUEUE") {
            config = config.with_atomic_enqueue(atomic == "1" || atomic.eq_ignore_ascii_case("true"));
        }

        if let Ok(grace) = std::env::var("NCSQ_ORPHAN_GRACE_SECS") {
            let secs = grace.parse().map_err(|_| {
                QueueError::Config(format!("NCSQ_ORPHAN_GRACE_SECS '{}' is not a number", grace))
            })?;
            config = config.with_orphan_grace(Duration::from_secs(secs));
        }

        Ok(config)
    }

    /// Set the key prefix.
    pub fn with_key_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.key_prefix = prefix.into();
        self
    }

    /// Set the queue mode.
    pub fn with_mode(mut self, mode: QueueMode) -> Self {
        self.mode = mode;
        self
    }

    /// Enable or disable atomic enqueue writes.
    pub fn with_atomic_enqueue(mut self, enabled: bool) -> Self {
        self.atomic_enqueue = enabled;
        self
    }

    /// Set the orphan grace period used by reconciliation.
    pub fn with_orphan_grace(mut self, grace: Duration) -> Self {
        self.orphan_grace = grace;
        self
    }

    /// Reject settings the queue cannot work with.
    pub fn validate(&self) -> QueueResult<()> {
        if self.key_prefix.trim_end_matches(':').is_empty() {
            return Err(QueueError::Config("key prefix must not be empty".to_string()));
        }
        Ok(())
    }
}

mod duration_secs {
    use serde::{Deserialize, Deserializer, Serialize, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        duration.as_secs().serialize(serializer)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        Ok(Duration::from_secs(u64::deserialize(deserializer)?))
    }
}
