//! Queue engines.
//!
//! Two engines implement [`JobQueue`]:
//! - [`PriorityQueue`]: priority-scored order sets with per-owner tracking
//! - [`BasicQueue`]: a plain FIFO list
//!
//! [`Queue`] wraps either one, chosen by [`QueueConfig::mode`], and adds the
//! typed convenience layer callers normally use.

mod basic;
mod priority;

pub use self::basic::BasicQueue;
pub use self::priority::{PriorityQueue, ReconcileReport};

use crate::config::{QueueConfig, QueueMode};
use crate::error::{QueueError, QueueResult};
use crate::job::{IntoOwnerId, JobData, JobId, OwnerId, from_job_data, to_job_data};
use crate::score::Priority;
use crate::store::{QueueStore, RedisStore, StoreError};
use async_trait::async_trait;
use ncsq_redis::RedisConfig;
use serde::Serialize;
use serde::de::DeserializeOwned;
use std::sync::Arc;
use tracing::info;

/// Operations every queue engine provides.
#[async_trait]
pub trait JobQueue: Send + Sync {
    /// Store a payload. Priority mode returns the new job id, basic mode the
    /// queue length after the push.
    async fn enqueue_data(
        &self,
        queue: &str,
        data: JobData,
        owner: OwnerId,
        priority: Priority,
    ) -> QueueResult<u64>;

    /// Claim and remove up to `limit` payloads in service order.
    async fn dequeue(&self, queue: &str, limit: usize) -> QueueResult<Vec<JobData>>;

    /// Number of pending jobs.
    async fn count_jobs(&self, queue: &str) -> QueueResult<u64>;

    /// 1-based global position of the owner's next job.
    async fn get_position(&self, queue: &str, owner: OwnerId) -> QueueResult<Option<u64>>;
}

/// Reject queue names that cannot form a key.
pub(crate) fn validate_queue_name(queue: &str) -> QueueResult<()> {
    if queue.is_empty() {
        return Err(QueueError::InvalidArgument(
            "queue name must not be empty".to_string(),
        ));
    }
    Ok(())
}

/// Inclusive stop index for a range of `limit` elements from the head.
pub(crate) fn range_stop(limit: usize) -> isize {
    isize::try_from(limit - 1).unwrap_or(isize::MAX)
}

/// Next reply of an atomic batch.
pub(crate) fn next_reply(
    replies: &mut impl Iterator<Item = crate::store::Reply>,
    command: &'static str,
) -> Result<crate::store::Reply, StoreError> {
    replies.next().ok_or_else(|| StoreError::UnexpectedReply {
        command,
        reply: "missing".to_string(),
    })
}

/// Queue handle.
///
/// Cheap to clone; every clone shares the same store.
///
/// # Examples
///
/// ```
/// use ncsq_queue::prelude::*;
/// use serde_json::json;
/// use std::sync::Arc;
///
/// # async fn example() -> QueueResult<()> {
/// let queue = Queue::new(Arc::new(MemoryStore::new()), QueueConfig::default())?;
///
/// let id = queue.enqueue("orders", &json!({"sku": "A1"}), 42).await?;
/// assert_eq!(id, 1);
/// assert_eq!(queue.count_jobs("orders").await?, 1);
///
/// let jobs = queue.dequeue("orders", 1).await?;
/// assert_eq!(jobs, vec![json!({"sku": "A1"})]);
/// # Ok(())
/// # }
/// ```
#[derive(Clone)]
pub enum Queue {
    /// Priority mode
    Priority(PriorityQueue),
    /// Basic FIFO mode
    Basic(BasicQueue),
}

impl Queue {
    /// Create a queue over an existing store.
    pub fn new(store: Arc<dyn QueueStore>, config: QueueConfig) -> QueueResult<Self> {
        config.validate()?;

        info!(
            prefix = %config.key_prefix,
            mode = %config.mode,
            atomic_enqueue = config.atomic_enqueue,
            "Queue created"
        );

        Ok(match config.mode {
            QueueMode::Priority => Queue::Priority(PriorityQueue::new(store, &config)),
            QueueMode::Basic => Queue::Basic(BasicQueue::new(store, &config)),
        })
    }

    /// Connect to Redis and create a queue.
    pub async fn connect(redis: RedisConfig, config: QueueConfig) -> QueueResult<Self> {
        let store = RedisStore::connect(redis).await?;
        Self::new(Arc::new(store), config)
    }

    /// Active mode.
    pub fn mode(&self) -> QueueMode {
        match self {
            Queue::Priority(_) => QueueMode::Priority,
            Queue::Basic(_) => QueueMode::Basic,
        }
    }

    fn engine(&self) -> &dyn JobQueue {
        match self {
            Queue::Priority(engine) => engine,
            Queue::Basic(engine) => engine,
        }
    }

    /// Enqueue a payload at the default priority.
    pub async fn enqueue<T: Serialize + ?Sized>(
        &self,
        queue: &str,
        payload: &T,
        owner: impl IntoOwnerId,
    ) -> QueueResult<JobId> {
        self.enqueue_with_priority(queue, payload, owner, Priority::DEFAULT)
            .await
    }

    /// Enqueue a payload. Out-of-range priorities fall back to the default.
    pub async fn enqueue_with_priority<T: Serialize + ?Sized>(
        &self,
        queue: &str,
        payload: &T,
        owner: impl IntoOwnerId,
        priority: impl Into<Priority>,
    ) -> QueueResult<JobId> {
        validate_queue_name(queue)?;
        let owner = owner.into_owner_id()?;
        let data = to_job_data(payload)?;

        self.engine()
            .enqueue_data(queue, data, owner, priority.into())
            .await
    }

    /// Claim up to `limit` payloads. A `limit` of 0 is treated as 1.
    pub async fn dequeue(&self, queue: &str, limit: usize) -> QueueResult<Vec<JobData>> {
        self.engine().dequeue(queue, limit).await
    }

    /// Claim up to `limit` payloads and decode each into `T`.
    pub async fn dequeue_as<T: DeserializeOwned>(
        &self,
        queue: &str,
        limit: usize,
    ) -> QueueResult<Vec<T>> {
        self.dequeue(queue, limit)
            .await?
            .into_iter()
            .map(from_job_data)
            .collect()
    }

    /// Number of pending jobs.
    pub async fn count_jobs(&self, queue: &str) -> QueueResult<u64> {
        self.engine().count_jobs(queue).await
    }

    /// 1-based global position of the owner's next job, `None` when the
    /// owner has nothing pending. Always `None` in basic mode.
    pub async fn get_position(
        &self,
        queue: &str,
        owner: impl IntoOwnerId,
    ) -> QueueResult<Option<u64>> {
        let owner = owner.into_owner_id()?;
        self.engine().get_position(queue, owner).await
    }

    /// Repair orphaned payloads and stale owner entries. Basic mode has
    /// nothing to repair.
    pub async fn reconcile(&self, queue: &str) -> QueueResult<ReconcileReport> {
        match self {
            Queue::Priority(engine) => engine.reconcile(queue).await,
            Queue::Basic(_) => {
                validate_queue_name(queue)?;
                Ok(ReconcileReport::default())
            }
        }
    }
}
