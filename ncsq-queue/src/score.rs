//! Priority bands and ordering scores.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Width of one priority band in score units.
///
/// Millisecond timestamps stay far below this, so a lower band always sorts
/// before a higher one.
pub const BAND_WIDTH: i64 = 1_000_000_000_000_000;

/// Priority band, 1 (served first) to 5 (served last).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(from = "i64", into = "i64")]
pub struct Priority(u8);

impl Priority {
    /// Highest priority band.
    pub const HIGHEST: Priority = Priority(1);
    /// Band used for missing or invalid input.
    pub const DEFAULT: Priority = Priority(3);
    /// Lowest priority band.
    pub const LOWEST: Priority = Priority(5);

    /// Normalize a raw value; anything outside 1..=5 becomes 3.
    pub fn normalize(raw: i64) -> Self {
        match raw {
            1..=5 => Priority(raw as u8),
            _ => Self::DEFAULT,
        }
    }

    /// Normalize an optional value.
    pub fn from_option(raw: Option<i64>) -> Self {
        raw.map_or(Self::DEFAULT, Self::normalize)
    }

    /// Normalize textual input; non-numeric text becomes 3.
    pub fn parse_lenient(raw: &str) -> Self {
        raw.trim()
            .parse::<i64>()
            .map_or(Self::DEFAULT, Self::normalize)
    }

    /// Band number.
    pub fn value(self) -> u8 {
        self.0
    }
}

impl Default for Priority {
    fn default() -> Self {
        Self::DEFAULT
    }
}

impl fmt::Display for Priority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<i64> for Priority {
    fn from(raw: i64) -> Self {
        Self::normalize(raw)
    }
}

impl From<i32> for Priority {
    fn from(raw: i32) -> Self {
        Self::normalize(i64::from(raw))
    }
}

impl From<u8> for Priority {
    fn from(raw: u8) -> Self {
        Self::normalize(i64::from(raw))
    }
}

impl From<Option<i64>> for Priority {
    fn from(raw: Option<i64>) -> Self {
        Self::from_option(raw)
    }
}

impl From<&str> for Priority {
    fn from(raw: &str) -> Self {
        Self::parse_lenient(raw)
    }
}

impl From<Priority> for i64 {
    fn from(priority: Priority) -> Self {
        i64::from(priority.0)
    }
}

/// Ordering score for a job: `submitted_at_millis + priority * BAND_WIDTH`.
///
/// Lower scores are served first. Every score is an integer below 2^53, so
/// it survives the store's `f64` representation exactly.
pub fn score(priority: Priority, submitted_at_millis: i64) -> f64 {
    let band = i64::from(priority.value()) * BAND_WIDTH;
    (band + submitted_at_millis.clamp(0, BAND_WIDTH - 1)) as f64
}
