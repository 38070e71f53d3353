//! Small shared value types.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Milliseconds on the track's audio timeline.
pub type Millis = i64;

/// Half-open-agnostic `[start_ms, end_ms]` span on the track timeline.
///
/// Used both for matcher time hints and for planned aligner windows.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
pub struct TimeWindow {
    pub start_ms: Millis,
    pub end_ms: Millis,
}

impl TimeWindow {
    #[must_use]
    pub fn new(start_ms: Millis, end_ms: Millis) -> Self {
        Self { start_ms, end_ms }
    }

    #[must_use]
    pub fn duration_ms(&self) -> Millis {
        self.end_ms - self.start_ms
    }

    /// True when `[start, end]` lies fully inside this window.
    #[must_use]
    pub fn contains_span(&self, start_ms: Millis, end_ms: Millis) -> bool {
        start_ms >= self.start_ms && end_ms <= self.end_ms
    }

    #[must_use]
    pub fn overlaps(&self, other: &TimeWindow) -> bool {
        self.start_ms <= other.end_ms && other.start_ms <= self.end_ms
    }

    #[must_use]
    pub fn union(&self, other: &TimeWindow) -> TimeWindow {
        TimeWindow {
            start_ms: self.start_ms.min(other.start_ms),
            end_ms: self.end_ms.max(other.end_ms),
        }
    }
}

impl fmt::Display for TimeWindow {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}ms, {}ms]", self.start_ms, self.end_ms)
    }
}

/// Who last wrote a segment's word ownership.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Author {
    #[default]
    System,
    User,
}
