//! Tunable policy for boundary derivation, windowing, matching and quality gating.

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::constants::{
    DEFAULT_ALIGNER_TIMEOUT_MS, DEFAULT_CONFIDENCE_THRESHOLD, DEFAULT_COVERAGE_THRESHOLD,
    DEFAULT_GAP_MAX_MS, DEFAULT_GAP_MIN_MS, DEFAULT_MATCH_LOOKAHEAD_WORDS, DEFAULT_MAX_SEGMENT_CHARS,
    DEFAULT_MAX_WINDOW_MS, DEFAULT_MIN_SEGMENT_DURATION_MS, DEFAULT_WINDOW_PADDING_MS,
    DEFAULT_WORD_CONFIDENCE_FLOOR,
};
use crate::error::{Result, TimelineError};

use super::common::Millis;

/// Minimum duration and inter-segment gap rules.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GapPolicy {
    pub min_segment_duration_ms: Millis,
    pub gap_min_ms: Millis,
    /// Gaps above this are silence and left alone; kept for reporting.
    pub gap_max_ms: Millis,
}

impl Default for GapPolicy {
    fn default() -> Self {
        Self {
            min_segment_duration_ms: DEFAULT_MIN_SEGMENT_DURATION_MS,
            gap_min_ms: DEFAULT_GAP_MIN_MS,
            gap_max_ms: DEFAULT_GAP_MAX_MS,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct WindowPolicy {
    pub padding_ms: Millis,
    pub max_window_ms: Millis,
}

impl Default for WindowPolicy {
    fn default() -> Self {
        Self {
            padding_ms: DEFAULT_WINDOW_PADDING_MS,
            max_window_ms: DEFAULT_MAX_WINDOW_MS,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct QualityThresholds {
    pub coverage_threshold: f64,
    pub confidence_threshold: f64,
    pub word_confidence_floor: f64,
}

impl Default for QualityThresholds {
    fn default() -> Self {
        Self {
            coverage_threshold: DEFAULT_COVERAGE_THRESHOLD,
            confidence_threshold: DEFAULT_CONFIDENCE_THRESHOLD,
            word_confidence_floor: DEFAULT_WORD_CONFIDENCE_FLOOR,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct MatcherOptions {
    pub lookahead_words: usize,
}

impl Default for MatcherOptions {
    fn default() -> Self {
        Self {
            lookahead_words: DEFAULT_MATCH_LOOKAHEAD_WORDS,
        }
    }
}

/// What to do when some windows of one edit realign and others fail.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PartialWindowPolicy {
    /// Any failed window fails the whole edit; nothing is committed.
    #[default]
    AllOrNothing,
    /// Successful windows are committed and persisted; the edit reports a partial failure.
    KeepCommitted,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RealignOptions {
    pub aligner_timeout_ms: u64,
    pub partial_windows: PartialWindowPolicy,
    /// Split aligned words into heuristic syllables when the aligner returns none.
    pub generate_syllables: bool,
}

impl Default for RealignOptions {
    fn default() -> Self {
        Self {
            aligner_timeout_ms: DEFAULT_ALIGNER_TIMEOUT_MS,
            partial_windows: PartialWindowPolicy::AllOrNothing,
            generate_syllables: false,
        }
    }
}

/// Complete policy for one track. Every field has a serde default, so a
/// policy file only needs the values it overrides.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TimelinePolicy {
    pub gap: GapPolicy,
    pub window: WindowPolicy,
    pub quality: QualityThresholds,
    pub matcher: MatcherOptions,
    pub realign: RealignOptions,
    pub max_segment_chars: usize,
}

impl Default for TimelinePolicy {
    fn default() -> Self {
        Self {
            gap: GapPolicy::default(),
            window: WindowPolicy::default(),
            quality: QualityThresholds::default(),
            matcher: MatcherOptions::default(),
            realign: RealignOptions::default(),
            max_segment_chars: DEFAULT_MAX_SEGMENT_CHARS,
        }
    }
}

impl TimelinePolicy {
    /// Start a fluent builder for `TimelinePolicy`.
    #[must_use]
    pub fn builder() -> TimelinePolicyBuilder {
        TimelinePolicyBuilder::default()
    }

    pub fn from_json_str(payload: &str) -> Result<Self> {
        serde_json::from_str(payload).map_err(|err| TimelineError::json("parsing policy", err))
    }

    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self> {
        let payload = fs_err::read_to_string(path.as_ref())?;
        Self::from_json_str(&payload)
    }
}

#[derive(Debug, Clone, Default)]
pub struct TimelinePolicyBuilder {
    inner: TimelinePolicy,
}

impl TimelinePolicyBuilder {
    #[must_use]
    pub fn min_segment_duration_ms(mut self, value: Millis) -> Self {
        self.inner.gap.min_segment_duration_ms = value;
        self
    }

    #[must_use]
    pub fn gap_range_ms(mut self, min: Millis, max: Millis) -> Self {
        self.inner.gap.gap_min_ms = min;
        self.inner.gap.gap_max_ms = max;
        self
    }

    #[must_use]
    pub fn window_padding_ms(mut self, value: Millis) -> Self {
        self.inner.window.padding_ms = value;
        self
    }

    #[must_use]
    pub fn max_window_ms(mut self, value: Millis) -> Self {
        self.inner.window.max_window_ms = value;
        self
    }

    #[must_use]
    pub fn coverage_threshold(mut self, value: f64) -> Self {
        self.inner.quality.coverage_threshold = value;
        self
    }

    #[must_use]
    pub fn confidence_threshold(mut self, value: f64) -> Self {
        self.inner.quality.confidence_threshold = value;
        self
    }

    #[must_use]
    pub fn lookahead_words(mut self, value: usize) -> Self {
        self.inner.matcher.lookahead_words = value;
        self
    }

    #[must_use]
    pub fn aligner_timeout_ms(mut self, value: u64) -> Self {
        self.inner.realign.aligner_timeout_ms = value;
        self
    }

    #[must_use]
    pub fn partial_windows(mut self, policy: PartialWindowPolicy) -> Self {
        self.inner.realign.partial_windows = policy;
        self
    }

    #[must_use]
    pub fn generate_syllables(mut self, enabled: bool) -> Self {
        self.inner.realign.generate_syllables = enabled;
        self
    }

    #[must_use]
    pub fn max_segment_chars(mut self, value: usize) -> Self {
        self.inner.max_segment_chars = value;
        self
    }

    #[must_use]
    pub fn build(self) -> TimelinePolicy {
        self.inner
    }
}
