//! Job records and identifiers.

use crate::error::{QueueError, QueueResult};
use crate::score::Priority;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Job identifier, unique within one queue.
pub type JobId = u64;

/// Job payload data.
pub type JobData = serde_json::Value;

/// Owner (user) of a job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct OwnerId(i64);

impl OwnerId {
    /// Wrap an owner id.
    pub fn new(id: i64) -> Self {
        Self(id)
    }

    /// Raw value.
    pub fn get(self) -> i64 {
        self.0
    }
}

impl fmt::Display for OwnerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for OwnerId {
    type Err = QueueError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        s.trim().parse::<i64>().map(OwnerId).map_err(|_| {
            QueueError::InvalidArgument(format!("owner id '{}' is not an integer", s))
        })
    }
}

impl From<i64> for OwnerId {
    fn from(id: i64) -> Self {
        Self(id)
    }
}

/// Conversion of caller input into a validated [`OwnerId`].
///
/// Integers always convert; text must parse as an integer or the call fails
/// with [`QueueError::InvalidArgument`].
pub trait IntoOwnerId {
    /// Validate and convert.
    fn into_owner_id(self) -> QueueResult<OwnerId>;
}

impl IntoOwnerId for OwnerId {
    fn into_owner_id(self) -> QueueResult<OwnerId> {
        Ok(self)
    }
}

macro_rules! owner_from_int {
    ($($t:ty),*) => {
        $(
            impl IntoOwnerId for $t {
                fn into_owner_id(self) -> QueueResult<OwnerId> {
                    i64::try_from(self).map(OwnerId).map_err(|_| {
                        QueueError::InvalidArgument(format!("owner id {} is out of range", self))
                    })
                }
            }
        )*
    };
}

owner_from_int!(i32, i64, u32, u64, usize);

impl IntoOwnerId for &str {
    fn into_owner_id(self) -> QueueResult<OwnerId> {
        self.parse()
    }
}

impl IntoOwnerId for String {
    fn into_owner_id(self) -> QueueResult<OwnerId> {
        self.parse()
    }
}

impl IntoOwnerId for &String {
    fn into_owner_id(self) -> QueueResult<OwnerId> {
        self.parse()
    }
}

/// Record stored under a job's payload key.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobRecord {
    /// Caller payload
    pub data: JobData,

    /// Owning user
    #[serde(rename = "user_id")]
    pub owner: OwnerId,

    /// Normalized priority band
    pub priority: Priority,

    /// Job id
    pub id: JobId,

    /// Submission time in milliseconds since the Unix epoch
    #[serde(default)]
    pub enqueued_at: i64,
}

impl JobRecord {
    /// Create a record.
    pub fn new(
        id: JobId,
        data: JobData,
        owner: OwnerId,
        priority: Priority,
        enqueued_at: i64,
    ) -> Self {
        Self {
            data,
            owner,
            priority,
            id,
            enqueued_at,
        }
    }

    /// Serialize for storage.
    pub fn to_json(&self) -> QueueResult<String> {
        serde_json::to_string(self).map_err(|e| QueueError::Serialization(e.to_string()))
    }

    /// Deserialize a stored record.
    pub fn from_json(json: &str) -> QueueResult<Self> {
        serde_json::from_str(json).map_err(|e| QueueError::Deserialization(e.to_string()))
    }
}

/// Encode a typed payload as [`JobData`].
pub fn to_job_data<T: Serialize + ?Sized>(payload: &T) -> QueueResult<JobData> {
    serde_json::to_value(payload).map_err(|e| QueueError::Serialization(e.to_string()))
}

/// Decode [`JobData`] into a typed payload.
pub fn from_job_data<T: serde::de::DeserializeOwned>(data: JobData) -> QueueResult<T> {
    serde_json::from_value(data).map_err(|e| QueueError::Deserialization(e.to_string()))
}
