// ncsq - A multi-tenant priority job queue on Redis
//
// This library combines the queue engine, its Redis connection layer and an
// opt-in tracing setup.

// Re-export the queue engine
pub use ncsq_queue::*;

// Re-export the connection layer
pub use ncsq_redis;
pub use ncsq_queue;

use tracing_subscriber::EnvFilter;
use tracing_subscriber::prelude::*;

/// Environment variable holding the log filter (falls back to `RUST_LOG`).
pub const LOG_LEVEL_ENV: &str = "NCSQ_LOG_LEVEL";

/// Filter used by [`init_tracing`]: `NCSQ_LOG_LEVEL`, then `RUST_LOG`, then `info`.
pub fn env_filter() -> EnvFilter {
    std::env::var(LOG_LEVEL_ENV)
        .ok()
        .and_then(|directives| EnvFilter::try_new(directives).ok())
        .or_else(|| EnvFilter::try_from_default_env().ok())
        .unwrap_or_else(|| EnvFilter::new("info"))
}

/// Create a tracing subscriber that respects `NCSQ_LOG_LEVEL`.
pub fn subscriber() -> impl tracing::Subscriber + Send + Sync {
    tracing_subscriber::registry()
        .with(env_filter())
        .with(tracing_subscriber::fmt::layer())
}

/// Install [`subscriber`] as the global default.
///
/// Fails if another global subscriber is already set.
pub fn init_tracing() -> Result<(), tracing_subscriber::util::TryInitError> {
    subscriber().try_init()
}

/// Prelude for common imports.
pub mod prelude {
    pub use ncsq_queue::prelude::*;
    pub use ncsq_redis::{RedisConfig, RedisService};
}
