//! Priority queue engine.

use super::{JobQueue, next_reply, range_stop, validate_queue_name};
use crate::config::QueueConfig;
use crate::error::QueueResult;
use crate::id::IdAllocator;
use crate::job::{JobData, JobRecord, OwnerId};
use crate::keys::{self, KeySpace};
use crate::score::{self, Priority};
use crate::store::{Command, QueueStore};
use async_trait::async_trait;
use chrono::Utc;
use futures::future::join_all;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info, warn};

/// Outcome of [`PriorityQueue::reconcile`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReconcileReport {
    /// Payload records deleted because no pending entry referenced them
    pub orphaned_payloads: u64,
    /// Owner-set entries removed because their job no longer exists
    pub stale_owner_entries: u64,
    /// Records left alone because they could not be decoded
    pub skipped: u64,
}

/// Priority-scored queue with per-owner tracking.
///
/// Jobs are ordered by priority band, then submission time, then id.
#[derive(Clone)]
pub struct PriorityQueue {
    store: Arc<dyn QueueStore>,
    keys: KeySpace,
    ids: IdAllocator,
    atomic_enqueue: bool,
    orphan_grace: Duration,
}

impl PriorityQueue {
    /// Create an engine over a store.
    pub fn new(store: Arc<dyn QueueStore>, config: &QueueConfig) -> Self {
        let keys = KeySpace::new(config.key_prefix.clone());
        Self {
            ids: IdAllocator::new(store.clone(), keys.clone()),
            store,
            keys,
            atomic_enqueue: config.atomic_enqueue,
            orphan_grace: config.orphan_grace,
        }
    }

    /// Key layout in use.
    pub fn keys(&self) -> &KeySpace {
        &self.keys
    }

    /// Best-effort removal of dequeued jobs from their owner sets.
    async fn release_owner_entries(&self, queue: &str, records: &[JobRecord]) {
        let removals = records.iter().map(|record| {
            let key = self.keys.owner(queue, record.owner);
            let member = keys::member(record.id);
            async move { (record.id, self.store.zrem(&key, &member).await) }
        });

        for (id, result) in join_all(removals).await {
            if let Err(e) = result {
                warn!(queue, id, error = %e, "Failed to remove job from owner set");
            }
        }
    }

    /// Remove payload records nothing references and owner entries whose
    /// job is gone.
    ///
    /// Ids still in the global set are never touched. Payload removal takes
    /// two sweeps: the first one that finds a record unreferenced only marks
    /// it, and a later sweep deletes it once the mark is at least the orphan
    /// grace old and the record is still unreferenced. A dequeue between its
    /// claim and its fetch therefore keeps its payload as long as the grace
    /// exceeds that window. Payloads younger than the grace are treated as
    /// in-flight enqueues and not marked at all.
    pub async fn reconcile(&self, queue: &str) -> QueueResult<ReconcileReport> {
        validate_queue_name(queue)?;

        let global = self.keys.global(queue);
        let marks = self.keys.orphans(queue);
        let now = Utc::now().timestamp_millis();
        let grace = i64::try_from(self.orphan_grace.as_millis()).unwrap_or(i64::MAX);
        let mut candidates = HashSet::new();
        let mut report = ReconcileReport::default();

        for key in self.store.scan(&self.keys.job_pattern(queue)).await? {
            let Some(id) = self.keys.parse_job_key(queue, &key) else {
                continue;
            };
            let member = keys::member(id);
            if self.store.zrank(&global, &member).await?.is_some() {
                continue;
            }
            let Some(raw) = self.store.get(&key).await? else {
                continue;
            };

            match JobRecord::from_json(&raw) {
                Ok(record) if now.saturating_sub(record.enqueued_at) >= grace => {
                    candidates.insert(member.clone());
                    match self.store.zscore(&marks, &member).await? {
                        Some(seen) if now.saturating_sub(seen as i64) >= grace => {
                            report.orphaned_payloads += self.store.del(vec![key]).await?;
                            self.store.zrem(&marks, &member).await?;
                        }
                        Some(_) => {}
                        None => {
                            debug!(queue, id, "Marking unreferenced job record");
                            self.store.zadd(&marks, now as f64, &member).await?;
                        }
                    }
                }
                Ok(_) => {}
                Err(e) => {
                    warn!(queue, id, error = %e, "Leaving undecodable job record in place");
                    report.skipped += 1;
                }
            }
        }

        // Marks whose record was claimed, dequeued or re-referenced.
        for member in self.store.zrange(&marks, 0, -1).await? {
            if !candidates.contains(&member) {
                self.store.zrem(&marks, &member).await?;
            }
        }

        for owner_key in self.store.scan(&self.keys.owner_pattern(queue)).await? {
            if self.keys.parse_owner_key(queue, &owner_key).is_none() {
                continue;
            }
            for member in self.store.zrange(&owner_key, 0, -1).await? {
                if self.store.zrank(&global, &member).await?.is_some() {
                    continue;
                }
                if let Some(id) = keys::parse_member(&member)
                    && self.store.get(&self.keys.job(queue, id)).await?.is_some()
                {
                    continue;
                }
                report.stale_owner_entries += self.store.zrem(&owner_key, &member).await?;
            }
        }

        info!(
            queue,
            orphaned_payloads = report.orphaned_payloads,
            stale_owner_entries = report.stale_owner_entries,
            skipped = report.skipped,
            "Queue reconciled"
        );

        Ok(report)
    }
}

#[async_trait]
impl JobQueue for PriorityQueue {
    async fn enqueue_data(
        &self,
        queue: &str,
        data: JobData,
        owner: OwnerId,
        priority: Priority,
    ) -> QueueResult<u64> {
        validate_queue_name(queue)?;

        let id = self.ids.next_id(queue).await?;
        let enqueued_at = Utc::now().timestamp_millis();
        let record = JobRecord::new(id, data, owner, priority, enqueued_at).to_json()?;
        let score = score::score(priority, enqueued_at);
        let member = keys::member(id);

        let job_key = self.keys.job(queue, id);
        let owner_key = self.keys.owner(queue, owner);
        let global = self.keys.global(queue);

        if self.atomic_enqueue {
            self.store
                .atomic(vec![
                    Command::Set {
                        key: job_key,
                        value: record,
                    },
                    Command::ZAdd {
                        key: owner_key,
                        score,
                        member: member.clone(),
                    },
                    Command::ZAdd {
                        key: global,
                        score,
                        member,
                    },
                ])
                .await?;
        } else {
            self.store.set(&job_key, record).await?;
            self.store.zadd(&owner_key, score, &member).await?;
            self.store.zadd(&global, score, &member).await?;
        }

        debug!(queue, id, owner = %owner, priority = %priority, "Job enqueued");
        Ok(id)
    }

    async fn dequeue(&self, queue: &str, limit: usize) -> QueueResult<Vec<JobData>> {
        validate_queue_name(queue)?;

        let limit = limit.max(1);
        let stop = range_stop(limit);
        let global = self.keys.global(queue);

        let mut claim = self
            .store
            .atomic(vec![
                Command::ZRange {
                    key: global.clone(),
                    start: 0,
                    stop,
                },
                Command::ZRemRangeByRank {
                    key: global,
                    start: 0,
                    stop,
                },
            ])
            .await?
            .into_iter();
        let claimed = next_reply(&mut claim, "ZRANGE")?.into_members("ZRANGE")?;

        if claimed.is_empty() {
            return Ok(Vec::new());
        }

        let mut ids = Vec::with_capacity(claimed.len());
        for member in &claimed {
            match keys::parse_member(member) {
                Some(id) => ids.push(id),
                None => warn!(queue, member = %member, "Dropping malformed queue member"),
            }
        }
        if ids.is_empty() {
            return Ok(Vec::new());
        }
        let payload_keys: Vec<String> = ids.iter().map(|id| self.keys.job(queue, *id)).collect();

        let mut fetch = self
            .store
            .atomic(vec![
                Command::MGet {
                    keys: payload_keys.clone(),
                },
                Command::Del { keys: payload_keys },
            ])
            .await?
            .into_iter();
        let values = next_reply(&mut fetch, "MGET")?.into_values("MGET")?;

        // Claimed records are already gone from the store, so a corrupt one
        // is logged and dropped rather than failing its siblings.
        let mut records = Vec::with_capacity(values.len());
        for (id, value) in ids.iter().zip(values) {
            let Some(raw) = value else {
                warn!(queue, id, "Claimed job has no payload record, skipping");
                continue;
            };
            match JobRecord::from_json(&raw) {
                Ok(record) => records.push(record),
                Err(e) => {
                    error!(queue, id, error = %e, payload = %raw, "Dropping undecodable job record");
                }
            }
        }

        self.release_owner_entries(queue, &records).await;

        debug!(queue, limit, claimed = records.len(), "Jobs dequeued");
        Ok(records.into_iter().map(|record| record.data).collect())
    }

    async fn count_jobs(&self, queue: &str) -> QueueResult<u64> {
        validate_queue_name(queue)?;
        Ok(self
            .store
            .zcount(&self.keys.global(queue), f64::NEG_INFINITY, f64::INFINITY)
            .await?)
    }

    async fn get_position(&self, queue: &str, owner: OwnerId) -> QueueResult<Option<u64>> {
        validate_queue_name(queue)?;

        let head = self
            .store
            .zrange(&self.keys.owner(queue, owner), 0, 0)
            .await?
            .into_iter()
            .next();
        let Some(head) = head else {
            return Ok(None);
        };

        let rank = self.store.zrank(&self.keys.global(queue), &head).await?;
        Ok(rank.map(|rank| rank + 1))
    }
}
