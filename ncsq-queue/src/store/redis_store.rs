//! Redis-backed store.

use super::{Command, QueueStore, Reply, StoreError, StoreResult};
use async_trait::async_trait;
use ncsq_redis::{RedisConfig, RedisService};
use redis::Value;
use std::collections::BTreeSet;
use std::sync::Arc;
use tracing::{debug, warn};

const SCAN_COUNT: usize = 100;

/// Queue store over a pooled Redis connection.
///
/// Atomic batches are sent as `MULTI`/`EXEC` pipelines.
#[derive(Clone)]
pub struct RedisStore {
    redis: Arc<RedisService>,
}

impl RedisStore {
    /// Wrap an existing Redis service.
    pub fn new(redis: Arc<RedisService>) -> Self {
        Self { redis }
    }

    /// Connect to Redis and build a store.
    pub async fn connect(config: RedisConfig) -> StoreResult<Self> {
        let redis = RedisService::new(config).await?;
        Ok(Self::new(Arc::new(redis)))
    }

    /// Get the underlying Redis service.
    pub fn service(&self) -> &Arc<RedisService> {
        &self.redis
    }
}

/// Render a score the way Redis parses it.
fn score_arg(score: f64) -> String {
    if score == f64::INFINITY {
        "+inf".to_string()
    } else if score == f64::NEG_INFINITY {
        "-inf".to_string()
    } else {
        score.to_string()
    }
}

fn to_cmd(command: &Command) -> redis::Cmd {
    let mut cmd = redis::cmd(command.name());
    match command {
        Command::Incr { key } | Command::Get { key } | Command::LLen { key } => {
            cmd.arg(key);
        }
        Command::Set { key, value } | Command::RPush { key, value } => {
            cmd.arg(key).arg(value);
        }
        Command::MGet { keys } | Command::Del { keys } => {
            cmd.arg(keys);
        }
        Command::ZAdd { key, score, member } => {
            cmd.arg(key).arg(score_arg(*score)).arg(member);
        }
        Command::ZRange { key, start, stop }
        | Command::ZRemRangeByRank { key, start, stop }
        | Command::LRange { key, start, stop }
        | Command::LTrim { key, start, stop } => {
            cmd.arg(key).arg(*start).arg(*stop);
        }
        Command::ZRem { key, member }
        | Command::ZRank { key, member }
        | Command::ZScore { key, member } => {
            cmd.arg(key).arg(member);
        }
        Command::ZCount { key, min, max } => {
            cmd.arg(key).arg(score_arg(*min)).arg(score_arg(*max));
        }
    }
    cmd
}

fn unexpected(command: &Command, value: &Value) -> StoreError {
    StoreError::UnexpectedReply {
        command: command.name(),
        reply: format!("{:?}", value),
    }
}

fn string_of(command: &Command, value: Value) -> StoreResult<Option<String>> {
    match value {
        Value::Nil => Ok(None),
        Value::BulkString(bytes) => String::from_utf8(bytes).map(Some).map_err(|e| {
            StoreError::Command(format!("{} returned non-UTF-8 data: {}", command.name(), e))
        }),
        Value::SimpleString(s) => Ok(Some(s)),
        Value::Int(n) => Ok(Some(n.to_string())),
        other => Err(unexpected(command, &other)),
    }
}

fn from_value(command: &Command, value: Value) -> StoreResult<Reply> {
    match command {
        Command::Set { .. } | Command::LTrim { .. } => match value {
            Value::Okay => Ok(Reply::Ok),
            Value::SimpleString(ref s) if s == "OK" => Ok(Reply::Ok),
            other => Err(unexpected(command, &other)),
        },
        Command::Incr { .. }
        | Command::Del { .. }
        | Command::ZAdd { .. }
        | Command::ZRemRangeByRank { .. }
        | Command::ZRem { .. }
        | Command::ZCount { .. }
        | Command::RPush { .. }
        | Command::LLen { .. } => match value {
            Value::Int(n) => Ok(Reply::Integer(n)),
            other => Err(unexpected(command, &other)),
        },
        Command::Get { .. } => string_of(command, value).map(Reply::Value),
        Command::MGet { .. } => match value {
            Value::Array(items) => items
                .into_iter()
                .map(|item| string_of(command, item))
                .collect::<StoreResult<Vec<_>>>()
                .map(Reply::Values),
            other => Err(unexpected(command, &other)),
        },
        Command::ZRange { .. } | Command::LRange { .. } => match value {
            Value::Array(items) => items
                .into_iter()
                .map(|item| {
                    string_of(command, item)?.ok_or_else(|| StoreError::UnexpectedReply {
                        command: command.name(),
                        reply: "nil member".to_string(),
                    })
                })
                .collect::<StoreResult<Vec<_>>>()
                .map(Reply::Members),
            other => Err(unexpected(command, &other)),
        },
        Command::ZRank { .. } => match value {
            Value::Nil => Ok(Reply::Rank(None)),
            Value::Int(n) => Ok(Reply::Rank(u64::try_from(n).ok())),
            other => Err(unexpected(command, &other)),
        },
        Command::ZScore { .. } => match value {
            Value::Double(score) => Ok(Reply::Score(Some(score))),
            other => match string_of(command, other)? {
                None => Ok(Reply::Score(None)),
                Some(raw) => raw.parse::<f64>().map(|s| Reply::Score(Some(s))).map_err(|_| {
                    StoreError::UnexpectedReply {
                        command: command.name(),
                        reply: raw,
                    }
                }),
            },
        },
    }
}

#[async_trait]
impl QueueStore for RedisStore {
    async fn execute(&self, command: Command) -> StoreResult<Reply> {
        let mut conn = self.redis.get().await?;
        let value: Value = to_cmd(&command).query_async(&mut *conn).await?;
        from_value(&command, value)
    }

    async fn atomic(&self, commands: Vec<Command>) -> StoreResult<Vec<Reply>> {
        if commands.is_empty() {
            return Ok(Vec::new());
        }

        let mut pipe = redis::pipe();
        pipe.atomic();
        for command in &commands {
            pipe.add_command(to_cmd(command));
        }

        let mut conn = self.redis.get().await?;
        let values: Vec<Value> = pipe.query_async(&mut *conn).await?;

        if values.len() != commands.len() {
            warn!(
                expected = commands.len(),
                received = values.len(),
                "Atomic batch reply count mismatch"
            );
            return Err(StoreError::UnexpectedReply {
                command: "EXEC",
                reply: format!("{} replies for {} commands", values.len(), commands.len()),
            });
        }

        commands
            .iter()
            .zip(values)
            .map(|(command, value)| from_value(command, value))
            .collect()
    }

    async fn scan(&self, pattern: &str) -> StoreResult<Vec<String>> {
        let mut conn = self.redis.get().await?;
        let mut cursor: u64 = 0;
        // SCAN may repeat keys across iterations.
        let mut keys = BTreeSet::new();

        loop {
            let (next, batch): (u64, Vec<String>) = redis::cmd("SCAN")
                .arg(cursor)
                .arg("MATCH")
                .arg(pattern)
                .arg("COUNT")
                .arg(SCAN_COUNT)
                .query_async(&mut *conn)
                .await?;
            keys.extend(batch);
            if next == 0 {
                break;
            }
            cursor = next;
        }

        debug!(pattern, found = keys.len(), "Scanned keys");
        Ok(keys.into_iter().collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_score_arg() {
        assert_eq!(score_arg(f64::NEG_INFINITY), "-inf");
        assert_eq!(score_arg(f64::INFINITY), "+inf");
        assert_eq!(score_arg(3_001_700_000_000_000.0), "3001700000000000");
    }

    #[test]
    fn test_zrank_reply_mapping() {
        let cmd = Command::ZRank {
            key: "q".into(),
            member: "1".into(),
        };
        assert_eq!(from_value(&cmd, Value::Nil).unwrap(), Reply::Rank(None));
        assert_eq!(from_value(&cmd, Value::Int(4)).unwrap(), Reply::Rank(Some(4)));
    }

    #[test]
    fn test_zscore_reply_mapping() {
        let cmd = Command::ZScore {
            key: "q".into(),
            member: "1".into(),
        };
        assert_eq!(from_value(&cmd, Value::Nil).unwrap(), Reply::Score(None));
        assert_eq!(
            from_value(&cmd, Value::BulkString(b"1700000000000".to_vec())).unwrap(),
            Reply::Score(Some(1_700_000_000_000.0))
        );
        assert_eq!(from_value(&cmd, Value::Double(2.5)).unwrap(), Reply::Score(Some(2.5)));
        assert!(from_value(&cmd, Value::BulkString(b"nope".to_vec())).is_err());
    }

    #[test]
    fn test_mget_reply_mapping() {
        let cmd = Command::MGet {
            keys: vec!["a".into(), "b".into()],
        };
        let value = Value::Array(vec![Value::BulkString(b"x".to_vec()), Value::Nil]);
        assert_eq!(
            from_value(&cmd, value).unwrap(),
            Reply::Values(vec![Some("x".into()), None])
        );
    }

    #[test]
    fn test_status_reply_mapping() {
        let cmd = Command::Set {
            key: "k".into(),
            value: "v".into(),
        };
        assert_eq!(from_value(&cmd, Value::Okay).unwrap(), Reply::Ok);
        assert!(from_value(&cmd, Value::Int(1)).is_err());
    }

    #[tokio::test]
    #[ignore = "requires Redis"]
    async fn test_atomic_batch_against_redis() {
        let store = RedisStore::connect(RedisConfig::from_env().build())
            .await
            .unwrap();
        let key = "ncsq-test:store:atomic";
        store.del(vec![key.to_string()]).await.unwrap();

        store.zadd(key, 2.0, "b").await.unwrap();
        store.zadd(key, 1.0, "a").await.unwrap();

        let replies = store
            .atomic(vec![
                Command::ZRange {
                    key: key.into(),
                    start: 0,
                    stop: 0,
                },
                Command::ZRemRangeByRank {
                    key: key.into(),
                    start: 0,
                    stop: 0,
                },
            ])
            .await
            .unwrap();

        assert_eq!(replies[0], Reply::Members(vec!["a".into()]));
        assert_eq!(replies[1], Reply::Integer(1));
        assert_eq!(store.zcount(key, f64::NEG_INFINITY, f64::INFINITY).await.unwrap(), 1);

        store.del(vec![key.to_string()]).await.unwrap();
    }
}
