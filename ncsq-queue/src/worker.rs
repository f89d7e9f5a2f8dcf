//! Worker implementation for processing jobs.

use crate::error::{QueueError, QueueResult};
use crate::job::JobData;
use crate::queue::Queue;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

/// Job handler function type.
pub type JobHandler =
    Arc<dyn Fn(JobData) -> Pin<Box<dyn Future<Output = QueueResult<()>> + Send>> + Send + Sync>;

/// Worker configuration.
#[derive(Debug, Clone)]
pub struct WorkerConfig {
    /// Number of polling tasks
    pub concurrency: usize,

    /// Maximum payloads claimed per dequeue
    pub batch_size: usize,

    /// Sleep between polls when the queue is empty or unreachable
    pub poll_interval: Duration,

    /// How long [`Worker::stop`] waits for in-flight batches
    pub shutdown_timeout: Duration,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            concurrency: 4,
            batch_size: 10,
            poll_interval: Duration::from_secs(1),
            shutdown_timeout: Duration::from_secs(30),
        }
    }
}

impl WorkerConfig {
    /// Set the number of polling tasks.
    pub fn with_concurrency(mut self, concurrency: usize) -> Self {
        self.concurrency = concurrency.max(1);
        self
    }

    /// Set the dequeue batch size.
    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size.max(1);
        self
    }

    /// Set the idle poll interval.
    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    /// Set how long a stop waits for in-flight batches.
    pub fn with_shutdown_timeout(mut self, timeout: Duration) -> Self {
        self.shutdown_timeout = timeout;
        self
    }
}

/// Polling consumer for one queue.
///
/// Each task dequeues a batch, runs the handler on every payload in order
/// and sleeps when there is nothing to do. A payload whose handler fails is
/// logged and dropped.
pub struct Worker {
    queue: Queue,
    queue_name: String,
    handler: Option<JobHandler>,
    config: WorkerConfig,
    running: Arc<RwLock<bool>>,
    handles: Vec<JoinHandle<()>>,
}

impl Worker {
    /// Create a new worker.
    pub fn new(queue: Queue, queue_name: impl Into<String>) -> Self {
        Self::with_config(queue, queue_name, WorkerConfig::default())
    }

    /// Create a worker with custom configuration.
    pub fn with_config(queue: Queue, queue_name: impl Into<String>, config: WorkerConfig) -> Self {
        Self {
            queue,
            queue_name: queue_name.into(),
            handler: None,
            config,
            running: Arc::new(RwLock::new(false)),
            handles: Vec::new(),
        }
    }

    /// Register the payload handler, replacing any previous one.
    ///
    /// # Examples
    ///
    /// ```no_run
    /// use ncsq_queue::prelude::*;
    ///
    /// # async fn example() -> QueueResult<()> {
    /// let queue = Queue::connect(RedisConfig::default(), QueueConfig::default()).await?;
    /// let mut worker = Worker::new(queue, "emails");
    ///
    /// worker.register_handler(|data| async move {
    ///     tracing::info!(?data, "sending email");
    ///     Ok(())
    /// });
    ///
    /// worker.start().await?;
    /// # Ok(())
    /// # }
    /// ```
    pub fn register_handler<F, Fut>(&mut self, handler: F)
    where
        F: Fn(JobData) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = QueueResult<()>> + Send + 'static,
    {
        let wrapped: JobHandler = Arc::new(
            move |data: JobData| -> Pin<Box<dyn Future<Output = QueueResult<()>> + Send>> {
                Box::pin(handler(data))
            },
        );
        self.handler = Some(wrapped);
    }

    /// Start the worker.
    pub async fn start(&mut self) -> QueueResult<()> {
        let handler = self
            .handler
            .clone()
            .ok_or_else(|| QueueError::NoHandler(self.queue_name.clone()))?;

        let mut running = self.running.write().await;
        if *running {
            return Err(QueueError::WorkerAlreadyRunning);
        }
        *running = true;
        drop(running);

        info!(
            queue = %self.queue_name,
            concurrency = self.config.concurrency,
            batch_size = self.config.batch_size,
            "Worker starting"
        );

        for worker in 0..self.config.concurrency.max(1) {
            let queue = self.queue.clone();
            let queue_name = self.queue_name.clone();
            let handler = handler.clone();
            let running = self.running.clone();
            let batch_size = self.config.batch_size;
            let poll_interval = self.config.poll_interval;

            let handle = tokio::spawn(async move {
                while *running.read().await {
                    match queue.dequeue(&queue_name, batch_size).await {
                        Ok(batch) if batch.is_empty() => {
                            tokio::time::sleep(poll_interval).await;
                        }
                        Ok(batch) => {
                            debug!(worker, queue = %queue_name, jobs = batch.len(), "Processing batch");
                            for data in batch {
                                if let Err(e) = handler(data).await {
                                    warn!(worker, queue = %queue_name, error = %e, "Job handler failed, dropping job");
                                }
                            }
                        }
                        Err(e) => {
                            error!(worker, queue = %queue_name, error = %e, "Failed to dequeue jobs");
                            tokio::time::sleep(poll_interval).await;
                        }
                    }
                }

                debug!(worker, queue = %queue_name, "Worker task stopped");
            });

            self.handles.push(handle);
        }

        Ok(())
    }

    /// Stop the worker.
    ///
    /// Tasks stop polling and finish the batch they already claimed. Claimed
    /// payloads are no longer in the store, so a task still busy after the
    /// shutdown timeout is aborted and the rest of its batch is lost.
    pub async fn stop(&mut self) -> QueueResult<()> {
        let mut running = self.running.write().await;
        if !*running {
            return Err(QueueError::WorkerNotRunning);
        }
        *running = false;
        drop(running);

        let deadline = tokio::time::Instant::now() + self.config.shutdown_timeout;
        for mut handle in self.handles.drain(..) {
            match tokio::time::timeout_at(deadline, &mut handle).await {
                Ok(Ok(())) => {}
                Ok(Err(e)) => {
                    error!(queue = %self.queue_name, error = %e, "Worker task failed");
                }
                Err(_) => {
                    warn!(
                        queue = %self.queue_name,
                        timeout = ?self.config.shutdown_timeout,
                        "Worker task still busy at shutdown, aborting its batch"
                    );
                    handle.abort();
                }
            }
        }

        info!(queue = %self.queue_name, "Worker stopped");
        Ok(())
    }

    /// Check if the worker is running.
    pub async fn is_running(&self) -> bool {
        *self.running.read().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::QueueConfig;
    use crate::store::MemoryStore;
    use serde_json::json;
    use std::sync::atomic::{AtomicU32, Ordering};
    use tokio::sync::Mutex;

    fn queue() -> Queue {
        Queue::new(Arc::new(MemoryStore::new()), QueueConfig::default()).unwrap()
    }

    fn fast() -> WorkerConfig {
        WorkerConfig::default()
            .with_concurrency(3)
            .with_batch_size(4)
            .with_poll_interval(Duration::from_millis(10))
    }

    #[test]
    fn test_worker_config() {
        let config = WorkerConfig::default();
        assert_eq!(config.concurrency, 4);
        assert_eq!(config.batch_size, 10);

        assert_eq!(config.shutdown_timeout, Duration::from_secs(30));

        let config = config.with_concurrency(0).with_batch_size(0);
        assert_eq!(config.concurrency, 1);
        assert_eq!(config.batch_size, 1);
    }

    #[tokio::test]
    async fn test_start_without_handler() {
        let mut worker = Worker::new(queue(), "emails");
        let err = worker.start().await.unwrap_err();

        assert!(matches!(err, QueueError::NoHandler(ref q) if q == "emails"));
        assert!(!worker.is_running().await);
    }

    #[tokio::test]
    async fn test_lifecycle_errors() {
        let mut worker = Worker::with_config(queue(), "q", fast());
        worker.register_handler(|_| async { Ok(()) });

        assert!(matches!(worker.stop().await, Err(QueueError::WorkerNotRunning)));

        worker.start().await.unwrap();
        assert!(worker.is_running().await);
        assert!(matches!(
            worker.start().await,
            Err(QueueError::WorkerAlreadyRunning)
        ));

        worker.stop().await.unwrap();
        assert!(!worker.is_running().await);
    }

    #[tokio::test]
    async fn test_every_job_delivered_once() {
        let queue = queue();
        for n in 0..20i64 {
            queue.enqueue("q", &json!(n), n % 3).await.unwrap();
        }

        let seen = Arc::new(Mutex::new(Vec::new()));
        let mut worker = Worker::with_config(queue.clone(), "q", fast());
        let sink = seen.clone();
        worker.register_handler(move |data| {
            let sink = sink.clone();
            async move {
                sink.lock().await.push(data.as_i64().unwrap_or(-1));
                Ok(())
            }
        });
        worker.start().await.unwrap();

        tokio::time::timeout(Duration::from_secs(5), async {
            while seen.lock().await.len() < 20 {
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .unwrap();
        worker.stop().await.unwrap();

        let mut seen = seen.lock().await.clone();
        seen.sort();
        assert_eq!(seen, (0..20).collect::<Vec<i64>>());
        assert_eq!(queue.count_jobs("q").await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_failed_jobs_are_dropped() {
        let queue = queue();
        for n in 0..6i64 {
            queue.enqueue("q", &json!(n), 1).await.unwrap();
        }

        let calls = Arc::new(AtomicU32::new(0));
        let mut worker = Worker::with_config(queue.clone(), "q", fast());
        let counter = calls.clone();
        worker.register_handler(move |_| {
            let counter = counter.clone();
            async move {
                counter.fetch_add(1, Ordering::SeqCst);
                Err(QueueError::InvalidArgument("boom".into()))
            }
        });
        worker.start().await.unwrap();

        tokio::time::timeout(Duration::from_secs(5), async {
            while calls.load(Ordering::SeqCst) < 6 {
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .unwrap();
        worker.stop().await.unwrap();

        assert_eq!(calls.load(Ordering::SeqCst), 6);
        assert_eq!(queue.count_jobs("q").await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_stop_finishes_claimed_batch() {
        let queue = queue();
        for n in 0..4i64 {
            queue.enqueue("q", &json!(n), 1).await.unwrap();
        }

        let done = Arc::new(AtomicU32::new(0));
        let mut worker = Worker::with_config(
            queue.clone(),
            "q",
            fast().with_concurrency(1).with_batch_size(4),
        );
        let counter = done.clone();
        worker.register_handler(move |_| {
            let counter = counter.clone();
            async move {
                tokio::time::sleep(Duration::from_millis(20)).await;
                counter.fetch_add(1, Ordering::SeqCst);
                Ok(())
            }
        });
        worker.start().await.unwrap();

        tokio::time::timeout(Duration::from_secs(5), async {
            while done.load(Ordering::SeqCst) < 1 {
                tokio::time::sleep(Duration::from_millis(2)).await;
            }
        })
        .await
        .unwrap();
        worker.stop().await.unwrap();

        assert_eq!(done.load(Ordering::SeqCst), 4);
        assert_eq!(queue.count_jobs("q").await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_stop_aborts_after_timeout() {
        let queue = queue();
        queue.enqueue("q", &json!("slow"), 1).await.unwrap();

        let started = Arc::new(AtomicU32::new(0));
        let mut worker = Worker::with_config(
            queue,
            "q",
            fast()
                .with_concurrency(1)
                .with_shutdown_timeout(Duration::from_millis(20)),
        );
        let flag = started.clone();
        worker.register_handler(move |_| {
            let flag = flag.clone();
            async move {
                flag.fetch_add(1, Ordering::SeqCst);
                tokio::time::sleep(Duration::from_secs(60)).await;
                Ok(())
            }
        });
        worker.start().await.unwrap();

        tokio::time::timeout(Duration::from_secs(5), async {
            while started.load(Ordering::SeqCst) == 0 {
                tokio::time::sleep(Duration::from_millis(2)).await;
            }
        })
        .await
        .unwrap();

        tokio::time::timeout(Duration::from_secs(5), worker.stop())
            .await
            .unwrap()
            .unwrap();
        assert!(!worker.is_running().await);
    }
}
