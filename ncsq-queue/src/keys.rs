//! Key-space layout.
//!
//! ```text
//! <prefix>:<queue>:id             counter
//! <prefix>:<queue>:jobs:<id>      serialized job record
//! <prefix>:<queue>:queue          global order set
//! <prefix>:<queue>:user:<owner>   per-owner order set
//! <prefix>:<queue>:jobs           basic-mode list
//! <prefix>:<queue>:orphans        reconcile candidates, scored by first sighting
//! ```

use crate::job::{JobId, OwnerId};

/// Width of an ordered-set member. Fixed width keeps the store's
/// lexicographic tie-break equal to numeric id order.
pub const MEMBER_WIDTH: usize = 20;

/// Key builder for one prefix.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeySpace {
    prefix: String,
}

impl KeySpace {
    /// Create a key space. A trailing `:` on the prefix is tolerated.
    pub fn new(prefix: impl Into<String>) -> Self {
        let prefix = prefix.into();
        let prefix = prefix.trim_end_matches(':').to_string();
        Self { prefix }
    }

    /// The prefix without separator.
    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    fn base(&self, queue: &str) -> String {
        format!("{}:{}", self.prefix, queue)
    }

    /// Id counter key.
    pub fn counter(&self, queue: &str) -> String {
        format!("{}:id", self.base(queue))
    }

    /// Payload key of one job.
    pub fn job(&self, queue: &str, id: JobId) -> String {
        format!("{}:jobs:{}", self.base(queue), id)
    }

    /// Glob matching every payload key of a queue. Glob metacharacters in
    /// the prefix or queue name match literally.
    pub fn job_pattern(&self, queue: &str) -> String {
        format!("{}:jobs:*", glob_escape(&self.base(queue)))
    }

    /// Global order set key.
    pub fn global(&self, queue: &str) -> String {
        format!("{}:queue", self.base(queue))
    }

    /// Owner order set key.
    pub fn owner(&self, queue: &str, owner: OwnerId) -> String {
        format!("{}:user:{}", self.base(queue), owner)
    }

    /// Glob matching every owner order set of a queue. The match can still
    /// include keys of other queues whose name extends this one, so check
    /// results with [`KeySpace::parse_owner_key`].
    pub fn owner_pattern(&self, queue: &str) -> String {
        format!("{}:user:*", glob_escape(&self.base(queue)))
    }

    /// Sorted set of payload ids seen unreferenced by a reconcile sweep.
    pub fn orphans(&self, queue: &str) -> String {
        format!("{}:orphans", self.base(queue))
    }

    /// List key used by the basic queue mode.
    pub fn list(&self, queue: &str) -> String {
        format!("{}:jobs", self.base(queue))
    }

    /// Extract the job id from a payload key produced by [`KeySpace::job`].
    pub fn parse_job_key(&self, queue: &str, key: &str) -> Option<JobId> {
        let head = format!("{}:jobs:", self.base(queue));
        key.strip_prefix(&head)?.parse().ok()
    }

    /// Extract the owner from a key produced by [`KeySpace::owner`].
    ///
    /// `ncsq:q:user:a:user:5` belongs to queue `q:user:a`, not `q`.
    pub fn parse_owner_key(&self, queue: &str, key: &str) -> Option<OwnerId> {
        let head = format!("{}:user:", self.base(queue));
        key.strip_prefix(&head)?.parse().ok().map(OwnerId::new)
    }
}

/// Escape Redis glob metacharacters so `s` matches only itself.
pub fn glob_escape(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        if matches!(c, '*' | '?' | '[' | ']' | '\\') {
            out.push('\\');
        }
        out.push(c);
    }
    out
}

impl Default for KeySpace {
    fn default() -> Self {
        Self::new(crate::config::DEFAULT_PREFIX)
    }
}

/// Encode a job id as an ordered-set member.
///
/// Members are zero-padded to [`MEMBER_WIDTH`] digits. Deployments that
/// wrote bare decimal ids (`"7"`) use a different wire format: their members
/// still parse, but share no ZRANK/ZREM identity with padded ones, so drain
/// such a queue before switching a shared prefix over.
pub fn member(id: JobId) -> String {
    format!("{:0width$}", id, width = MEMBER_WIDTH)
}

/// Decode an ordered-set member.
pub fn parse_member(member: &str) -> Option<JobId> {
    member.parse().ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_layout() {
        let keys = KeySpace::default();
        let owner = OwnerId::new(567);

        assert_eq!(keys.counter("test-queue"), "ncsq:test-queue:id");
        assert_eq!(keys.job("test-queue", 123), "ncsq:test-queue:jobs:123");
        assert_eq!(keys.global("test-queue"), "ncsq:test-queue:queue");
        assert_eq!(keys.owner("test-queue", owner), "ncsq:test-queue:user:567");
        assert_eq!(keys.list("test-queue"), "ncsq:test-queue:jobs");
    }

    #[test]
    fn test_custom_prefix_with_trailing_separator() {
        assert_eq!(KeySpace::new("prefix").prefix(), "prefix");
        assert_eq!(KeySpace::new("prefix:").counter("q"), "prefix:q:id");
    }

    #[test]
    fn test_parse_job_key() {
        let keys = KeySpace::default();
        assert_eq!(keys.parse_job_key("q", "ncsq:q:jobs:42"), Some(42));
        assert_eq!(keys.parse_job_key("q", "ncsq:q:jobs:abc"), None);
        assert_eq!(keys.parse_job_key("q", "ncsq:other:jobs:42"), None);
        assert_eq!(keys.parse_job_key("q", "ncsq:q:jobs"), None);
    }

    #[test]
    fn test_parse_owner_key() {
        let keys = KeySpace::default();
        assert_eq!(keys.parse_owner_key("q", "ncsq:q:user:42"), Some(OwnerId::new(42)));
        assert_eq!(keys.parse_owner_key("q", "ncsq:q:user:-3"), Some(OwnerId::new(-3)));
        assert_eq!(keys.parse_owner_key("q", "ncsq:q:user:a:user:5"), None);
        assert_eq!(keys.parse_owner_key("q", "ncsq:qq:user:5"), None);
        assert_eq!(keys.parse_owner_key("q", "ncsq:q:user:"), None);
    }

    #[test]
    fn test_patterns_escape_glob_characters() {
        let keys = KeySpace::default();
        assert_eq!(glob_escape("a?b*[c]\\"), "a\\?b\\*\\[c\\]\\\\");
        assert_eq!(keys.job_pattern("a?"), "ncsq:a\\?:jobs:*");
        assert_eq!(keys.owner_pattern("x*"), "ncsq:x\\*:user:*");
        assert_eq!(keys.owner_pattern("plain"), "ncsq:plain:user:*");
        assert_eq!(keys.orphans("q"), "ncsq:q:orphans");
    }

    #[test]
    fn test_legacy_bare_members_differ() {
        assert_ne!(member(7), "7");
        assert_eq!(parse_member("7"), Some(7));
    }

    #[test]
    fn test_member_encoding_preserves_numeric_order() {
        assert_eq!(member(7), "00000000000000000007");
        assert!(member(9) < member(10));
        assert!(member(99) < member(100));
        assert_eq!(parse_member(&member(12345)), Some(12345));
        assert_eq!(member(u64::MAX).len(), MEMBER_WIDTH);
    }
}
