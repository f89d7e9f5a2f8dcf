//! Multi-tenant priority job queue over Redis sorted sets.
//!
//! Provides:
//! - ⭐ Five priority bands, FIFO within a band
//! - 👤 Per-owner tracking and queue positions
//! - 🔒 Race-free batch claims across any number of consumers
//! - 🧹 Reconciliation of records left behind by interrupted operations
//! - 👷 Polling workers
//!
//! ## Keys
//!
//! Every queue lives under `<prefix>:<queue>:` (default prefix `ncsq`):
//! an `id` counter, one `jobs:<id>` record per pending job, the global
//! `queue` order set and one `user:<owner>` order set per owner.
//!
//! ## Priorities
//!
//! ```
//! use ncsq_queue::{Priority, score};
//!
//! assert_eq!(Priority::from(1), Priority::HIGHEST);
//! assert_eq!(Priority::from(9), Priority::DEFAULT);
//! assert_eq!(Priority::from("abc"), Priority::DEFAULT);
//!
//! let now = 1_700_000_000_000;
//! assert!(score(Priority::HIGHEST, now + 60_000) < score(Priority::LOWEST, now));
//! ```
//!
//! ## Enqueue and Dequeue
//!
//! ```
//! use ncsq_queue::prelude::*;
//! use serde_json::json;
//! use std::sync::Arc;
//!
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() -> QueueResult<()> {
//! let queue = Queue::new(Arc::new(MemoryStore::new()), QueueConfig::default())?;
//!
//! queue.enqueue_with_priority("o", &json!("X"), 1, 1).await?;
//! queue.enqueue_with_priority("o", &json!("Y"), 2, 5).await?;
//! assert_eq!(queue.get_position("o", 2).await?, Some(2));
//!
//! assert_eq!(queue.dequeue("o", 2).await?, vec![json!("X"), json!("Y")]);
//! assert!(queue.dequeue("o", 5).await?.is_empty());
//! # Ok(())
//! # }
//! ```
//!
//! ## Against Redis
//!
//! ```no_run
//! use ncsq_queue::prelude::*;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), QueueError> {
//!     let queue = Queue::connect(RedisConfig::from_env().build(), QueueConfig::from_env()?).await?;
//!
//!     let id = queue
//!         .enqueue("emails", &serde_json::json!({"to": "user@example.com"}), 42)
//!         .await?;
//!     println!("queued job {id}");
//!
//!     let mut worker = Worker::new(queue, "emails");
//!     worker.register_handler(|data| async move {
//!         println!("sending {data}");
//!         Ok(())
//!     });
//!     worker.start().await?;
//!
//!     Ok(())
//! }
//! ```

pub mod config;
pub mod error;
pub mod id;
pub mod job;
pub mod keys;
pub mod queue;
pub mod score;
pub mod store;
pub mod worker;

pub use config::{DEFAULT_PREFIX, QueueConfig, QueueMode};
pub use error::{QueueError, QueueResult};
pub use id::IdAllocator;
pub use job::{IntoOwnerId, JobData, JobId, JobRecord, OwnerId, from_job_data, to_job_data};
pub use keys::KeySpace;
pub use queue::{BasicQueue, JobQueue, PriorityQueue, Queue, ReconcileReport};
pub use score::{BAND_WIDTH, Priority, score};
pub use store::{Command, MemoryStore, QueueStore, RedisStore, Reply, StoreError, StoreResult};
pub use worker::{JobHandler, Worker, WorkerConfig};

pub use ncsq_redis::RedisConfig;

/// Re-export commonly used types
pub mod prelude {
    pub use crate::config::{QueueConfig, QueueMode};
    pub use crate::error::{QueueError, QueueResult};
    pub use crate::job::{JobData, JobId, OwnerId};
    pub use crate::queue::{JobQueue, Queue, ReconcileReport};
    pub use crate::score::Priority;
    pub use crate::store::{MemoryStore, QueueStore, RedisStore};
    pub use crate::worker::{JobHandler, Worker, WorkerConfig};
    pub use ncsq_redis::RedisConfig;
}
