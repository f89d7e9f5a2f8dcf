//! Store abstraction used by the queue engine.
//!
//! The engine talks to its backing store through [`QueueStore`]: a single
//! `execute` entry point over a closed [`Command`] set, an `atomic` batch that
//! runs several commands with no interleaving from other batches, and a key
//! `scan` used by the reconciliation sweep. The typed helpers are default
//! methods so a backend only implements the three primitives.

mod memory;
mod redis_store;

pub use self::memory::MemoryStore;
pub use self::redis_store::RedisStore;

use async_trait::async_trait;
use thiserror::Error;

/// Result type for store operations.
pub type StoreResult<T> = Result<T, StoreError>;

/// Store errors.
#[derive(Debug, Error)]
pub enum StoreError {
    /// Transport, pool or server error from Redis
    #[error(transparent)]
    Redis(#[from] ncsq_redis::RedisError),

    /// Command rejected by the store (e.g. INCR on a non-integer)
    #[error("Command error: {0}")]
    Command(String),

    /// Key holds a different data type than the command expects
    #[error("WRONGTYPE key '{0}' holds the wrong kind of value")]
    WrongType(String),

    /// Reply shape did not match the command
    #[error("Unexpected reply to {command}: {reply}")]
    UnexpectedReply {
        /// Command name
        command: &'static str,
        /// Debug rendering of the reply
        reply: String,
    },

    /// Store cannot be reached
    #[error("Store unavailable: {0}")]
    Unavailable(String),
}

impl From<::redis::RedisError> for StoreError {
    fn from(err: ::redis::RedisError) -> Self {
        Self::Redis(ncsq_redis::RedisError::Redis(err))
    }
}

/// A single store command.
#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    /// `INCR key`
    Incr { key: String },
    /// `SET key value`
    Set { key: String, value: String },
    /// `GET key`
    Get { key: String },
    /// `MGET key [key ...]`
    MGet { keys: Vec<String> },
    /// `DEL key [key ...]`
    Del { keys: Vec<String> },
    /// `ZADD key score member`
    ZAdd {
        key: String,
        score: f64,
        member: String,
    },
    /// `ZRANGE key start stop`
    ZRange { key: String, start: isize, stop: isize },
    /// `ZREMRANGEBYRANK key start stop`
    ZRemRangeByRank { key: String, start: isize, stop: isize },
    /// `ZREM key member`
    ZRem { key: String, member: String },
    /// `ZRANK key member`
    ZRank { key: String, member: String },
    /// `ZSCORE key member`
    ZScore { key: String, member: String },
    /// `ZCOUNT key min max`
    ZCount { key: String, min: f64, max: f64 },
    /// `RPUSH key value`
    RPush { key: String, value: String },
    /// `LRANGE key start stop`
    LRange { key: String, start: isize, stop: isize },
    /// `LTRIM key start stop`
    LTrim { key: String, start: isize, stop: isize },
    /// `LLEN key`
    LLen { key: String },
}

impl Command {
    /// Redis command name.
    pub fn name(&self) -> &'static str {
        match self {
            Command::Incr { .. } => "INCR",
            Command::Set { .. } => "SET",
            Command::Get { .. } => "GET",
            Command::MGet { .. } => "MGET",
            Command::Del { .. } => "DEL",
            Command::ZAdd { .. } => "ZADD",
            Command::ZRange { .. } => "ZRANGE",
            Command::ZRemRangeByRank { .. } => "ZREMRANGEBYRANK",
            Command::ZRem { .. } => "ZREM",
            Command::ZRank { .. } => "ZRANK",
            Command::ZScore { .. } => "ZSCORE",
            Command::ZCount { .. } => "ZCOUNT",
            Command::RPush { .. } => "RPUSH",
            Command::LRange { .. } => "LRANGE",
            Command::LTrim { .. } => "LTRIM",
            Command::LLen { .. } => "LLEN",
        }
    }
}

/// Reply to a [`Command`].
#[derive(Debug, Clone, PartialEq)]
pub enum Reply {
    /// Status reply (`SET`, `LTRIM`)
    Ok,
    /// Integer reply
    Integer(i64),
    /// Single optional value (`GET`)
    Value(Option<String>),
    /// Values in key order (`MGET`)
    Values(Vec<Option<String>>),
    /// Members in range order (`ZRANGE`, `LRANGE`)
    Members(Vec<String>),
    /// Zero-based rank, `None` when the member is absent (`ZRANK`)
    Rank(Option<u64>),
    /// Score, `None` when the member is absent (`ZSCORE`)
    Score(Option<f64>),
}

impl Reply {
    fn unexpected(self, command: &'static str) -> StoreError {
        StoreError::UnexpectedReply {
            command,
            reply: format!("{:?}", self),
        }
    }

    /// Expect a status reply.
    pub fn into_ok(self, command: &'static str) -> StoreResult<()> {
        match self {
            Reply::Ok => Ok(()),
            other => Err(other.unexpected(command)),
        }
    }

    /// Expect an integer reply.
    pub fn into_integer(self, command: &'static str) -> StoreResult<i64> {
        match self {
            Reply::Integer(n) => Ok(n),
            other => Err(other.unexpected(command)),
        }
    }

    /// Expect a single optional value.
    pub fn into_value(self, command: &'static str) -> StoreResult<Option<String>> {
        match self {
            Reply::Value(v) => Ok(v),
            other => Err(other.unexpected(command)),
        }
    }

    /// Expect a list of optional values.
    pub fn into_values(self, command: &'static str) -> StoreResult<Vec<Option<String>>> {
        match self {
            Reply::Values(v) => Ok(v),
            other => Err(other.unexpected(command)),
        }
    }

    /// Expect a list of members.
    pub fn into_members(self, command: &'static str) -> StoreResult<Vec<String>> {
        match self {
            Reply::Members(m) => Ok(m),
            other => Err(other.unexpected(command)),
        }
    }

    /// Expect a rank.
    pub fn into_rank(self, command: &'static str) -> StoreResult<Option<u64>> {
        match self {
            Reply::Rank(r) => Ok(r),
            other => Err(other.unexpected(command)),
        }
    }

    /// Expect a score.
    pub fn into_score(self, command: &'static str) -> StoreResult<Option<f64>> {
        match self {
            Reply::Score(s) => Ok(s),
            other => Err(other.unexpected(command)),
        }
    }
}

fn count(n: i64) -> u64 {
    u64::try_from(n).unwrap_or(0)
}

/// Backing store for queues.
#[async_trait]
pub trait QueueStore: Send + Sync {
    /// Run one command.
    async fn execute(&self, command: Command) -> StoreResult<Reply>;

    /// Run commands as one atomic batch.
    ///
    /// Replies come back in command order. No other atomic batch observes or
    /// interleaves with an intermediate state of this one.
    async fn atomic(&self, commands: Vec<Command>) -> StoreResult<Vec<Reply>>;

    /// List keys matching a glob pattern (`*`, `?` and `\` escapes).
    async fn scan(&self, pattern: &str) -> StoreResult<Vec<String>>;

    // ========== Typed helpers ==========

    /// Increment a counter, creating it at 0 first if absent.
    async fn incr(&self, key: &str) -> StoreResult<i64> {
        self.execute(Command::Incr { key: key.to_string() })
            .await?
            .into_integer("INCR")
    }

    /// Set a string value.
    async fn set(&self, key: &str, value: String) -> StoreResult<()> {
        self.execute(Command::Set {
            key: key.to_string(),
            value,
        })
        .await?
        .into_ok("SET")
    }

    /// Get a string value.
    async fn get(&self, key: &str) -> StoreResult<Option<String>> {
        self.execute(Command::Get { key: key.to_string() })
            .await?
            .into_value("GET")
    }

    /// Get several string values, in input order.
    async fn mget(&self, keys: Vec<String>) -> StoreResult<Vec<Option<String>>> {
        if keys.is_empty() {
            return Ok(Vec::new());
        }
        self.execute(Command::MGet { keys })
            .await?
            .into_values("MGET")
    }

    /// Delete keys, returning how many existed.
    async fn del(&self, keys: Vec<String>) -> StoreResult<u64> {
        if keys.is_empty() {
            return Ok(0);
        }
        self.execute(Command::Del { keys })
            .await?
            .into_integer("DEL")
            .map(count)
    }

    /// Insert or re-score a sorted-set member.
    async fn zadd(&self, key: &str, score: f64, member: &str) -> StoreResult<u64> {
        self.execute(Command::ZAdd {
            key: key.to_string(),
            score,
            member: member.to_string(),
        })
        .await?
        .into_integer("ZADD")
        .map(count)
    }

    /// Members by ascending score within a rank range (inclusive, negative
    /// indices count from the end).
    async fn zrange(&self, key: &str, start: isize, stop: isize) -> StoreResult<Vec<String>> {
        self.execute(Command::ZRange {
            key: key.to_string(),
            start,
            stop,
        })
        .await?
        .into_members("ZRANGE")
    }

    /// Remove members within a rank range.
    async fn zremrangebyrank(&self, key: &str, start: isize, stop: isize) -> StoreResult<u64> {
        self.execute(Command::ZRemRangeByRank {
            key: key.to_string(),
            start,
            stop,
        })
        .await?
        .into_integer("ZREMRANGEBYRANK")
        .map(count)
    }

    /// Remove one member.
    async fn zrem(&self, key: &str, member: &str) -> StoreResult<u64> {
        self.execute(Command::ZRem {
            key: key.to_string(),
            member: member.to_string(),
        })
        .await?
        .into_integer("ZREM")
        .map(count)
    }

    /// Zero-based rank of a member.
    async fn zrank(&self, key: &str, member: &str) -> StoreResult<Option<u64>> {
        self.execute(Command::ZRank {
            key: key.to_string(),
            member: member.to_string(),
        })
        .await?
        .into_rank("ZRANK")
    }

    /// Score of a member.
    async fn zscore(&self, key: &str, member: &str) -> StoreResult<Option<f64>> {
        self.execute(Command::ZScore {
            key: key.to_string(),
            member: member.to_string(),
        })
        .await?
        .into_score("ZSCORE")
    }

    /// Number of members with `min <= score <= max`.
    async fn zcount(&self, key: &str, min: f64, max: f64) -> StoreResult<u64> {
        self.execute(Command::ZCount {
            key: key.to_string(),
            min,
            max,
        })
        .await?
        .into_integer("ZCOUNT")
        .map(count)
    }

    /// Append to a list, returning the new length.
    async fn rpush(&self, key: &str, value: String) -> StoreResult<u64> {
        self.execute(Command::RPush {
            key: key.to_string(),
            value,
        })
        .await?
        .into_integer("RPUSH")
        .map(count)
    }

    /// List elements within an index range.
    async fn lrange(&self, key: &str, start: isize, stop: isize) -> StoreResult<Vec<String>> {
        self.execute(Command::LRange {
            key: key.to_string(),
            start,
            stop,
        })
        .await?
        .into_members("LRANGE")
    }

    /// Keep only the elements within an index range.
    async fn ltrim(&self, key: &str, start: isize, stop: isize) -> StoreResult<()> {
        self.execute(Command::LTrim {
            key: key.to_string(),
            start,
            stop,
        })
        .await?
        .into_ok("LTRIM")
    }

    /// List length.
    async fn llen(&self, key: &str) -> StoreResult<u64> {
        self.execute(Command::LLen { key: key.to_string() })
            .await?
            .into_integer("LLEN")
            .map(count)
    }
}

/// Resolve an inclusive Redis-style index range against a length.
///
/// Returns `None` when the range selects nothing.
pub(crate) fn resolve_range(len: usize, start: isize, stop: isize) -> Option<(usize, usize)> {
    if len == 0 {
        return None;
    }
    let len = len as isize;
    let start = if start < 0 { (len + start).max(0) } else { start };
    let stop = if stop < 0 { len + stop } else { stop.min(len - 1) };
    if start > stop || start >= len {
        return None;
    }
    Some((start as usize, stop as usize))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resolve_range() {
        assert_eq!(resolve_range(0, 0, -1), None);
        assert_eq!(resolve_range(5, 0, -1), Some((0, 4)));
        assert_eq!(resolve_range(5, 0, 0), Some((0, 0)));
        assert_eq!(resolve_range(5, 0, 99), Some((0, 4)));
        assert_eq!(resolve_range(5, 3, 1), None);
        assert_eq!(resolve_range(5, 7, 9), None);
        assert_eq!(resolve_range(5, -2, -1), Some((3, 4)));
        assert_eq!(resolve_range(5, -99, 1), Some((0, 1)));
        assert_eq!(resolve_range(5, 2, -9), None);
    }

    #[test]
    fn test_reply_conversions() {
        assert_eq!(Reply::Integer(3).into_integer("INCR").unwrap(), 3);
        assert!(Reply::Ok.into_ok("SET").is_ok());
        assert_eq!(Reply::Rank(Some(2)).into_rank("ZRANK").unwrap(), Some(2));
        assert_eq!(Reply::Score(None).into_score("ZSCORE").unwrap(), None);

        let err = Reply::Ok.into_integer("INCR").unwrap_err();
        assert!(matches!(
            err,
            StoreError::UnexpectedReply { command: "INCR", .. }
        ));
    }

    #[test]
    fn test_command_names() {
        let cmd = Command::ZRemRangeByRank {
            key: "k".into(),
            start: 0,
            stop: 0,
        };
        assert_eq!(cmd.name(), "ZREMRANGEBYRANK");
        assert_eq!(Command::LLen { key: "k".into() }.name(), "LLEN");
    }
}
