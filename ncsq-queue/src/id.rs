//! Per-queue job id allocation.

use crate::error::{QueueError, QueueResult};
use crate::job::JobId;
use crate::keys::KeySpace;
use crate::store::QueueStore;
use std::sync::Arc;

/// Allocates monotonically increasing ids from the store's atomic counter.
///
/// Ids are never handed back: an enqueue that fails after allocation leaves
/// a gap.
#[derive(Clone)]
pub struct IdAllocator {
    store: Arc<dyn QueueStore>,
    keys: KeySpace,
}

impl IdAllocator {
    /// Create an allocator.
    pub fn new(store: Arc<dyn QueueStore>, keys: KeySpace) -> Self {
        Self { store, keys }
    }

    /// Allocate the next id for `queue`. A fresh queue starts at 1.
    pub async fn next_id(&self, queue: &str) -> QueueResult<JobId> {
        let id = self.store.incr(&self.keys.counter(queue)).await?;
        JobId::try_from(id)
            .map_err(|_| QueueError::Config(format!("id counter for '{}' is negative", queue)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;

    #[tokio::test]
    async fn test_ids_start_at_one_and_increase() {
        let allocator = IdAllocator::new(Arc::new(MemoryStore::new()), KeySpace::default());

        assert_eq!(allocator.next_id("q").await.unwrap(), 1);
        assert_eq!(allocator.next_id("q").await.unwrap(), 2);
        assert_eq!(allocator.next_id("q").await.unwrap(), 3);
    }

    #[tokio::test]
    async fn test_queues_have_independent_counters() {
        let allocator = IdAllocator::new(Arc::new(MemoryStore::new()), KeySpace::default());

        assert_eq!(allocator.next_id("a").await.unwrap(), 1);
        assert_eq!(allocator.next_id("b").await.unwrap(), 1);
        assert_eq!(allocator.next_id("a").await.unwrap(), 2);
    }

    #[tokio::test]
    async fn test_negative_counter_is_rejected() {
        let store = Arc::new(MemoryStore::new());
        store.set("ncsq:q:id", "-5".into()).await.unwrap();
        let allocator = IdAllocator::new(store, KeySpace::default());

        assert!(matches!(
            allocator.next_id("q").await,
            Err(QueueError::Config(_))
        ));
    }
}
