//! In-process store with Redis semantics.
//!
//! Every command runs under one lock, so an atomic batch is simply a batch
//! executed while holding it. Empty sorted sets and lists are removed the way
//! Redis removes them.

use super::{Command, QueueStore, Reply, StoreError, StoreResult, resolve_range};
use async_trait::async_trait;
use std::cmp::Ordering;
use std::collections::{BTreeSet, HashMap, VecDeque};
use std::sync::Arc;
use tokio::sync::Mutex;

/// Sorted-set score with a total order.
#[derive(Debug, Clone, Copy)]
struct Score(f64);

impl PartialEq for Score {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for Score {}

impl PartialOrd for Score {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Score {
    fn cmp(&self, other: &Self) -> Ordering {
        self.0.total_cmp(&other.0)
    }
}

/// Members ordered by score, then lexicographically by member.
#[derive(Debug, Default)]
struct SortedSet {
    scores: HashMap<String, f64>,
    order: BTreeSet<(Score, String)>,
}

impl SortedSet {
    fn insert(&mut self, score: f64, member: String) -> bool {
        let added = match self.scores.insert(member.clone(), score) {
            Some(old) => {
                self.order.remove(&(Score(old), member.clone()));
                false
            }
            None => true,
        };
        self.order.insert((Score(score), member));
        added
    }

    fn remove(&mut self, member: &str) -> bool {
        match self.scores.remove(member) {
            Some(score) => {
                self.order.remove(&(Score(score), member.to_string()));
                true
            }
            None => false,
        }
    }

    fn len(&self) -> usize {
        self.order.len()
    }

    fn range(&self, start: isize, stop: isize) -> Vec<String> {
        match resolve_range(self.len(), start, stop) {
            Some((from, to)) => self
                .order
                .iter()
                .skip(from)
                .take(to - from + 1)
                .map(|(_, member)| member.clone())
                .collect(),
            None => Vec::new(),
        }
    }

    fn rank(&self, member: &str) -> Option<u64> {
        let score = *self.scores.get(member)?;
        self.order
            .range(..(Score(score), member.to_string()))
            .count()
            .try_into()
            .ok()
    }

    fn score(&self, member: &str) -> Option<f64> {
        self.scores.get(member).copied()
    }

    fn count(&self, min: f64, max: f64) -> usize {
        self.order
            .iter()
            .filter(|(score, _)| score.0 >= min && score.0 <= max)
            .count()
    }
}

#[derive(Debug)]
enum Entry {
    Str(String),
    ZSet(SortedSet),
    List(VecDeque<String>),
}

#[derive(Debug, Default)]
struct State {
    data: HashMap<String, Entry>,
}

impl State {
    fn string(&self, key: &str) -> StoreResult<Option<&String>> {
        match self.data.get(key) {
            None => Ok(None),
            Some(Entry::Str(value)) => Ok(Some(value)),
            Some(_) => Err(StoreError::WrongType(key.to_string())),
        }
    }

    fn zset(&self, key: &str) -> StoreResult<Option<&SortedSet>> {
        match self.data.get(key) {
            None => Ok(None),
            Some(Entry::ZSet(set)) => Ok(Some(set)),
            Some(_) => Err(StoreError::WrongType(key.to_string())),
        }
    }

    fn zset_mut(&mut self, key: &str) -> StoreResult<&mut SortedSet> {
        let entry = self
            .data
            .entry(key.to_string())
            .or_insert_with(|| Entry::ZSet(SortedSet::default()));
        match entry {
            Entry::ZSet(set) => Ok(set),
            _ => Err(StoreError::WrongType(key.to_string())),
        }
    }

    fn list(&self, key: &str) -> StoreResult<Option<&VecDeque<String>>> {
        match self.data.get(key) {
            None => Ok(None),
            Some(Entry::List(list)) => Ok(Some(list)),
            Some(_) => Err(StoreError::WrongType(key.to_string())),
        }
    }

    fn list_mut(&mut self, key: &str) -> StoreResult<&mut VecDeque<String>> {
        let entry = self
            .data
            .entry(key.to_string())
            .or_insert_with(|| Entry::List(VecDeque::new()));
        match entry {
            Entry::List(list) => Ok(list),
            _ => Err(StoreError::WrongType(key.to_string())),
        }
    }

    fn drop_if_empty(&mut self, key: &str) {
        let empty = match self.data.get(key) {
            Some(Entry::ZSet(set)) => set.len() == 0,
            Some(Entry::List(list)) => list.is_empty(),
            _ => false,
        };
        if empty {
            self.data.remove(key);
        }
    }

    fn apply(&mut self, command: Command) -> StoreResult<Reply> {
        match command {
            Command::Incr { key } => {
                let current = match self.string(&key)? {
                    Some(value) => value.parse::<i64>().map_err(|_| {
                        StoreError::Command("value is not an integer or out of range".to_string())
                    })?,
                    None => 0,
                };
                let next = current
                    .checked_add(1)
                    .ok_or_else(|| StoreError::Command("increment would overflow".to_string()))?;
                self.data.insert(key, Entry::Str(next.to_string()));
                Ok(Reply::Integer(next))
            }
            Command::Set { key, value } => {
                self.data.insert(key, Entry::Str(value));
                Ok(Reply::Ok)
            }
            Command::Get { key } => Ok(Reply::Value(self.string(&key)?.cloned())),
            Command::MGet { keys } => Ok(Reply::Values(
                keys.iter()
                    .map(|key| match self.data.get(key) {
                        Some(Entry::Str(value)) => Some(value.clone()),
                        _ => None,
                    })
                    .collect(),
            )),
            Command::Del { keys } => {
                let removed = keys
                    .iter()
                    .filter(|key| self.data.remove(key.as_str()).is_some())
                    .count();
                Ok(Reply::Integer(removed as i64))
            }
            Command::ZAdd { key, score, member } => {
                if score.is_nan() {
                    return Err(StoreError::Command("score is not a valid float".to_string()));
                }
                let added = self.zset_mut(&key)?.insert(score, member);
                Ok(Reply::Integer(i64::from(added)))
            }
            Command::ZRange { key, start, stop } => Ok(Reply::Members(
                self.zset(&key)?
                    .map(|set| set.range(start, stop))
                    .unwrap_or_default(),
            )),
            Command::ZRemRangeByRank { key, start, stop } => {
                let doomed = match self.zset(&key)? {
                    Some(set) => set.range(start, stop),
                    None => return Ok(Reply::Integer(0)),
                };
                let set = self.zset_mut(&key)?;
                for member in &doomed {
                    set.remove(member);
                }
                self.drop_if_empty(&key);
                Ok(Reply::Integer(doomed.len() as i64))
            }
            Command::ZRem { key, member } => {
                if self.zset(&key)?.is_none() {
                    return Ok(Reply::Integer(0));
                }
                let removed = self.zset_mut(&key)?.remove(&member);
                self.drop_if_empty(&key);
                Ok(Reply::Integer(i64::from(removed)))
            }
            Command::ZRank { key, member } => Ok(Reply::Rank(
                self.zset(&key)?.and_then(|set| set.rank(&member)),
            )),
            Command::ZScore { key, member } => Ok(Reply::Score(
                self.zset(&key)?.and_then(|set| set.score(&member)),
            )),
            Command::ZCount { key, min, max } => Ok(Reply::Integer(
                self.zset(&key)?.map_or(0, |set| set.count(min, max)) as i64,
            )),
            Command::RPush { key, value } => {
                let list = self.list_mut(&key)?;
                list.push_back(value);
                Ok(Reply::Integer(list.len() as i64))
            }
            Command::LRange { key, start, stop } => {
                let members = match self.list(&key)? {
                    Some(list) => match resolve_range(list.len(), start, stop) {
                        Some((from, to)) => list.range(from..=to).cloned().collect(),
                        None => Vec::new(),
                    },
                    None => Vec::new(),
                };
                Ok(Reply::Members(members))
            }
            Command::LTrim { key, start, stop } => {
                let len = match self.list(&key)? {
                    Some(list) => list.len(),
                    None => return Ok(Reply::Ok),
                };
                let list = self.list_mut(&key)?;
                match resolve_range(len, start, stop) {
                    Some((from, to)) => {
                        list.truncate(to + 1);
                        list.drain(..from);
                    }
                    None => list.clear(),
                }
                self.drop_if_empty(&key);
                Ok(Reply::Ok)
            }
            Command::LLen { key } => Ok(Reply::Integer(
                self.list(&key)?.map_or(0, |list| list.len()) as i64,
            )),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
enum Glob {
    Any,
    One,
    Literal(char),
}

fn compile_glob(pattern: &str) -> Vec<Glob> {
    let mut tokens = Vec::new();
    let mut chars = pattern.chars();
    while let Some(c) = chars.next() {
        tokens.push(match c {
            '*' => Glob::Any,
            '?' => Glob::One,
            '\\' => Glob::Literal(chars.next().unwrap_or('\\')),
            c => Glob::Literal(c),
        });
    }
    tokens
}

/// Glob match supporting `*`, `?` and `\` escapes.
fn glob_match(pattern: &str, text: &str) -> bool {
    let pattern = compile_glob(pattern);
    let text: Vec<char> = text.chars().collect();
    let (mut p, mut t) = (0, 0);
    let mut star: Option<(usize, usize)> = None;

    while t < text.len() {
        let step = match pattern.get(p) {
            Some(Glob::One) => true,
            Some(Glob::Literal(c)) => *c == text[t],
            _ => false,
        };
        if step {
            p += 1;
            t += 1;
        } else if pattern.get(p) == Some(&Glob::Any) {
            star = Some((p, t));
            p += 1;
        } else if let Some((sp, st)) = star {
            p = sp + 1;
            t = st + 1;
            star = Some((sp, st + 1));
        } else {
            return false;
        }
    }

    pattern[p..].iter().all(|token| *token == Glob::Any)
}

/// In-memory queue store.
///
/// Cloning shares the same data.
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    state: Arc<Mutex<State>>,
}

impl MemoryStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of keys currently held.
    pub async fn key_count(&self) -> usize {
        self.state.lock().await.data.len()
    }
}

#[async_trait]
impl QueueStore for MemoryStore {
    async fn execute(&self, command: Command) -> StoreResult<Reply> {
        self.state.lock().await.apply(command)
    }

    async fn atomic(&self, commands: Vec<Command>) -> StoreResult<Vec<Reply>> {
        let mut state = self.state.lock().await;
        commands
            .into_iter()
            .map(|command| state.apply(command))
            .collect()
    }

    async fn scan(&self, pattern: &str) -> StoreResult<Vec<String>> {
        let state = self.state.lock().await;
        let mut keys: Vec<String> = state
            .data
            .keys()
            .filter(|key| glob_match(pattern, key))
            .cloned()
            .collect();
        keys.sort();
        Ok(keys)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_glob_match() {
        assert!(glob_match("ncsq:q:jobs:*", "ncsq:q:jobs:12"));
        assert!(!glob_match("ncsq:q:jobs:*", "ncsq:q:jobs"));
        assert!(glob_match("ncsq:q:user:*", "ncsq:q:user:42"));
        assert!(glob_match("a?c", "abc"));
        assert!(!glob_match("a?c", "abbc"));
        assert!(glob_match("*", ""));
        assert!(glob_match("a*b*c", "axxbyyc"));
    }

    #[test]
    fn test_glob_escapes_match_literally() {
        assert!(glob_match("ncsq:a\\?:user:*", "ncsq:a?:user:1"));
        assert!(!glob_match("ncsq:a\\?:user:*", "ncsq:ab:user:1"));
        assert!(glob_match("x\\*y", "x*y"));
        assert!(!glob_match("x\\*y", "xzzy"));
        assert!(glob_match("a\\\\b", "a\\b"));
    }

    #[tokio::test]
    async fn test_incr_from_absent() {
        let store = MemoryStore::new();
        assert_eq!(store.incr("counter").await.unwrap(), 1);
        assert_eq!(store.incr("counter").await.unwrap(), 2);
        assert_eq!(store.get("counter").await.unwrap().as_deref(), Some("2"));
    }

    #[tokio::test]
    async fn test_incr_rejects_non_integer() {
        let store = MemoryStore::new();
        store.set("k", "abc".into()).await.unwrap();
        assert!(matches!(
            store.incr("k").await,
            Err(StoreError::Command(_))
        ));
    }

    #[tokio::test]
    async fn test_mget_and_del() {
        let store = MemoryStore::new();
        store.set("a", "1".into()).await.unwrap();
        store.set("c", "3".into()).await.unwrap();

        let values = store
            .mget(vec!["a".into(), "b".into(), "c".into()])
            .await
            .unwrap();
        assert_eq!(values, vec![Some("1".into()), None, Some("3".into())]);

        let removed = store
            .del(vec!["a".into(), "b".into(), "c".into()])
            .await
            .unwrap();
        assert_eq!(removed, 2);
        assert_eq!(store.key_count().await, 0);
    }

    #[tokio::test]
    async fn test_sorted_set_ordering_and_ties() {
        let store = MemoryStore::new();
        store.zadd("z", 2.0, "b").await.unwrap();
        store.zadd("z", 1.0, "c").await.unwrap();
        store.zadd("z", 2.0, "a").await.unwrap();

        assert_eq!(store.zrange("z", 0, -1).await.unwrap(), vec!["c", "a", "b"]);
        assert_eq!(store.zrank("z", "b").await.unwrap(), Some(2));
        assert_eq!(store.zrank("z", "missing").await.unwrap(), None);
        assert_eq!(store.zcount("z", 2.0, 2.0).await.unwrap(), 2);
        assert_eq!(store.zscore("z", "c").await.unwrap(), Some(1.0));
        assert_eq!(store.zscore("z", "missing").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_zadd_rescores_existing_member() {
        let store = MemoryStore::new();
        assert_eq!(store.zadd("z", 5.0, "m").await.unwrap(), 1);
        assert_eq!(store.zadd("z", 1.0, "m").await.unwrap(), 0);
        store.zadd("z", 3.0, "n").await.unwrap();

        assert_eq!(store.zrange("z", 0, -1).await.unwrap(), vec!["m", "n"]);
        assert_eq!(
            store.zcount("z", f64::NEG_INFINITY, f64::INFINITY).await.unwrap(),
            2
        );
    }

    #[tokio::test]
    async fn test_zremrangebyrank_drops_empty_set() {
        let store = MemoryStore::new();
        store.zadd("z", 1.0, "a").await.unwrap();
        store.zadd("z", 2.0, "b").await.unwrap();

        assert_eq!(store.zremrangebyrank("z", 0, 9).await.unwrap(), 2);
        assert_eq!(store.key_count().await, 0);
        assert_eq!(store.zremrangebyrank("z", 0, 9).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_zrem() {
        let store = MemoryStore::new();
        store.zadd("z", 1.0, "a").await.unwrap();

        assert_eq!(store.zrem("z", "missing").await.unwrap(), 0);
        assert_eq!(store.zrem("z", "a").await.unwrap(), 1);
        assert_eq!(store.zrem("absent", "a").await.unwrap(), 0);
        assert_eq!(store.key_count().await, 0);
    }

    #[tokio::test]
    async fn test_list_commands() {
        let store = MemoryStore::new();
        for v in ["a", "b", "c", "d"] {
            store.rpush("l", v.to_string()).await.unwrap();
        }

        assert_eq!(store.lrange("l", 0, 1).await.unwrap(), vec!["a", "b"]);
        store.ltrim("l", 2, -1).await.unwrap();
        assert_eq!(store.lrange("l", 0, -1).await.unwrap(), vec!["c", "d"]);
        assert_eq!(store.llen("l").await.unwrap(), 2);

        store.ltrim("l", 5, -1).await.unwrap();
        assert_eq!(store.llen("l").await.unwrap(), 0);
        assert_eq!(store.key_count().await, 0);
    }

    #[tokio::test]
    async fn test_wrong_type() {
        let store = MemoryStore::new();
        store.set("k", "v".into()).await.unwrap();

        assert!(matches!(
            store.zadd("k", 1.0, "m").await,
            Err(StoreError::WrongType(_))
        ));
        assert!(matches!(
            store.rpush("k", "x".into()).await,
            Err(StoreError::WrongType(_))
        ));
    }

    #[tokio::test]
    async fn test_atomic_batch_replies_in_order() {
        let store = MemoryStore::new();
        store.zadd("z", 1.0, "a").await.unwrap();
        store.zadd("z", 2.0, "b").await.unwrap();
        store.zadd("z", 3.0, "c").await.unwrap();

        let replies = store
            .atomic(vec![
                Command::ZRange {
                    key: "z".into(),
                    start: 0,
                    stop: 1,
                },
                Command::ZRemRangeByRank {
                    key: "z".into(),
                    start: 0,
                    stop: 1,
                },
            ])
            .await
            .unwrap();

        assert_eq!(replies[0], Reply::Members(vec!["a".into(), "b".into()]));
        assert_eq!(replies[1], Reply::Integer(2));
        assert_eq!(store.zrange("z", 0, -1).await.unwrap(), vec!["c"]);
    }

    #[tokio::test]
    async fn test_scan_matches_pattern() {
        let store = MemoryStore::new();
        store.set("ncsq:q:jobs:2", "x".into()).await.unwrap();
        store.set("ncsq:q:jobs:1", "x".into()).await.unwrap();
        store.set("ncsq:q:id", "2".into()).await.unwrap();

        assert_eq!(
            store.scan("ncsq:q:jobs:*").await.unwrap(),
            vec!["ncsq:q:jobs:1", "ncsq:q:jobs:2"]
        );
    }
}
