//! # ncsq Redis
//!
//! Connection configuration and pooling for the ncsq job queue.
//!
//! ## Features
//!
//! - **Configuration**: URL or host/port, ACL credentials, database, TLS,
//!   loadable from `REDIS_*` environment variables
//! - **Connection Pooling**: bb8-managed multiplexed connections
//! - **Explicit handles**: a [`RedisService`] is constructed and passed to the
//!   queue store, there is no process-wide client
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use ncsq_redis::{RedisConfig, RedisService};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = RedisConfig::builder()
//!         .host_port("localhost", 6379)
//!         .pool_size(10)
//!         .build();
//!
//!     let redis = RedisService::new(config).await?;
//!     redis.health_check().await?;
//!
//!     let mut conn = redis.get().await?;
//!     let _: () = ncsq_redis::redis::cmd("SET")
//!         .arg("key")
//!         .arg("value")
//!         .query_async(&mut *conn)
//!         .await?;
//!
//!     Ok(())
//! }
//! ```

mod config;
mod error;
mod pool;
mod service;

pub use config::{DEFAULT_HOST, DEFAULT_PORT, RedisConfig, RedisConfigBuilder};
pub use error::{RedisError, Result};
pub use pool::{RedisConnection, RedisPool, RedisPoolBuilder};
pub use service::{PoolStats, RedisService};

// Re-export redis crate for convenience
pub use redis;

/// Prelude for common imports.
pub mod prelude {
    pub use crate::config::{RedisConfig, RedisConfigBuilder};
    pub use crate::error::{RedisError, Result};
    pub use crate::pool::{RedisConnection, RedisPool};
    pub use crate::service::RedisService;
}
