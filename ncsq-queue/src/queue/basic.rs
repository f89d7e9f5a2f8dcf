//! Basic FIFO queue engine.

use super::{JobQueue, next_reply, range_stop, validate_queue_name};
use crate::config::QueueConfig;
use crate::error::{QueueError, QueueResult};
use crate::job::{JobData, OwnerId};
use crate::keys::KeySpace;
use crate::score::Priority;
use crate::store::{Command, QueueStore};
use async_trait::async_trait;
use std::sync::Arc;
use tracing::{debug, error};

/// FIFO list without owners, priorities or positions.
#[derive(Clone)]
pub struct BasicQueue {
    store: Arc<dyn QueueStore>,
    keys: KeySpace,
}

impl BasicQueue {
    /// Create an engine over a store.
    pub fn new(store: Arc<dyn QueueStore>, config: &QueueConfig) -> Self {
        Self {
            store,
            keys: KeySpace::new(config.key_prefix.clone()),
        }
    }
}

#[async_trait]
impl JobQueue for BasicQueue {
    /// Returns the list length after the push. Owner and priority are not
    /// stored.
    async fn enqueue_data(
        &self,
        queue: &str,
        data: JobData,
        _owner: OwnerId,
        _priority: Priority,
    ) -> QueueResult<u64> {
        validate_queue_name(queue)?;

        let payload =
            serde_json::to_string(&data).map_err(|e| QueueError::Serialization(e.to_string()))?;
        let len = self.store.rpush(&self.keys.list(queue), payload).await?;

        debug!(queue, len, "Job pushed");
        Ok(len)
    }

    async fn dequeue(&self, queue: &str, limit: usize) -> QueueResult<Vec<JobData>> {
        validate_queue_name(queue)?;

        let limit = limit.max(1);
        let key = self.keys.list(queue);

        let mut replies = self
            .store
            .atomic(vec![
                Command::LRange {
                    key: key.clone(),
                    start: 0,
                    stop: range_stop(limit),
                },
                Command::LTrim {
                    key,
                    start: isize::try_from(limit).unwrap_or(isize::MAX),
                    stop: -1,
                },
            ])
            .await?
            .into_iter();
        let raw = next_reply(&mut replies, "LRANGE")?.into_members("LRANGE")?;

        debug!(queue, limit, claimed = raw.len(), "Jobs popped");
        Ok(raw
            .into_iter()
            .filter_map(|item| match serde_json::from_str::<JobData>(&item) {
                Ok(data) => Some(data),
                Err(e) => {
                    error!(queue, error = %e, payload = %item, "Dropping undecodable list element");
                    None
                }
            })
            .collect())
    }

    async fn count_jobs(&self, queue: &str) -> QueueResult<u64> {
        validate_queue_name(queue)?;
        Ok(self.store.llen(&self.keys.list(queue)).await?)
    }

    async fn get_position(&self, queue: &str, _owner: OwnerId) -> QueueResult<Option<u64>> {
        validate_queue_name(queue)?;
        Ok(None)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;
    use serde_json::json;

    fn engine(store: Arc<MemoryStore>) -> BasicQueue {
        BasicQueue::new(store, &QueueConfig::default())
    }

    async fn push(queue: &BasicQueue, data: JobData) -> u64 {
        queue
            .enqueue_data("q", data, OwnerId::new(1), Priority::DEFAULT)
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn test_enqueue_returns_length() {
        let queue = engine(Arc::new(MemoryStore::new()));

        assert_eq!(push(&queue, json!({"n": 1})).await, 1);
        assert_eq!(push(&queue, json!({"n": 2})).await, 2);
        assert_eq!(queue.count_jobs("q").await.unwrap(), 2);
    }

    #[tokio::test]
    async fn test_fifo_ignores_priority() {
        let queue = engine(Arc::new(MemoryStore::new()));

        queue
            .enqueue_data("q", json!("first"), OwnerId::new(1), Priority::LOWEST)
            .await
            .unwrap();
        queue
            .enqueue_data("q", json!("second"), OwnerId::new(2), Priority::HIGHEST)
            .await
            .unwrap();

        assert_eq!(
            queue.dequeue("q", 5).await.unwrap(),
            vec![json!("first"), json!("second")]
        );
        assert!(queue.dequeue("q", 5).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_partial_dequeue_keeps_tail() {
        let store = Arc::new(MemoryStore::new());
        let queue = engine(store.clone());
        for n in 0..5 {
            push(&queue, json!(n)).await;
        }

        assert_eq!(queue.dequeue("q", 2).await.unwrap(), vec![json!(0), json!(1)]);
        assert_eq!(queue.count_jobs("q").await.unwrap(), 3);
        assert_eq!(queue.dequeue("q", 0).await.unwrap(), vec![json!(2)]);
        assert_eq!(
            store.lrange("ncsq:q:jobs", 0, -1).await.unwrap(),
            vec!["3".to_string(), "4".to_string()]
        );
    }

    #[tokio::test]
    async fn test_no_position_tracking() {
        let queue = engine(Arc::new(MemoryStore::new()));
        push(&queue, json!("a")).await;

        assert_eq!(queue.get_position("q", OwnerId::new(1)).await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_corrupt_element_is_dropped() {
        let store = Arc::new(MemoryStore::new());
        let queue = engine(store.clone());
        store.rpush("ncsq:q:jobs", "{oops".to_string()).await.unwrap();
        push(&queue, json!("ok")).await;

        assert_eq!(queue.dequeue("q", 2).await.unwrap(), vec![json!("ok")]);
        assert_eq!(queue.count_jobs("q").await.unwrap(), 0);
    }
}
