//! Default policy values and persisted-format constants.

/// File name of the per-track persisted timeline document.
pub const TIMELINE_FILENAME: &str = "word_timeline.json";

pub const DEFAULT_MIN_SEGMENT_DURATION_MS: i64 = 200;
pub const DEFAULT_GAP_MIN_MS: i64 = 20;
pub const DEFAULT_GAP_MAX_MS: i64 = 120;

pub const DEFAULT_WINDOW_PADDING_MS: i64 = 1_000;
pub const DEFAULT_MAX_WINDOW_MS: i64 = 30_000;

pub const DEFAULT_COVERAGE_THRESHOLD: f64 = 0.80;
pub const DEFAULT_CONFIDENCE_THRESHOLD: f64 = 0.55;
/// A word counts towards coverage when its confidence is strictly above this.
pub const DEFAULT_WORD_CONFIDENCE_FLOOR: f64 = 0.5;

/// How many candidate start positions the matcher inspects past its cursor.
pub const DEFAULT_MATCH_LOOKAHEAD_WORDS: usize = 64;

pub const DEFAULT_ALIGNER_TIMEOUT_MS: u64 = 120_000;

pub const DEFAULT_MAX_SEGMENT_CHARS: usize = 2_000;

/// Confidence assigned to word timings approximated from segment bounds.
pub const APPROXIMATED_WORD_CONFIDENCE: f64 = 0.5;

/// Provider tag for runs bootstrapped from pre-existing segment word timings.
pub const EXISTING_PROVIDER: &str = "existing";
pub const EXISTING_PROVIDER_VERSION: &str = "1.0";

/// Warning attached to a run whose window yielded no (or too few) confident words.
pub const LOW_COVERAGE_WARNING: &str = "low_coverage";

/// Tolerance for syllable spans summing to the parent word duration.
pub const SYLLABLE_SUM_TOLERANCE_MS: i64 = 1;

/// Warning attached to a bootstrap run that contains approximated word timings.
pub const APPROXIMATED_TIMING_WARNING: &str = "approximated_timing";
