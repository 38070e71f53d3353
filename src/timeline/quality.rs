//! Quality Gate / Metrics. Annotates runs and edits; never blocks them.

use crate::constants::LOW_COVERAGE_WARNING;
use crate::types::{EditMetrics, QualityThresholds, WordToken};

/// Coverage and confidence over a set of words.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct WordQuality {
    /// Fraction of words with confidence strictly above the floor.
    pub coverage: f64,
    pub avg_confidence: f64,
    pub word_count: usize,
    pub syllable_count: usize,
}

impl WordQuality {
    /// Measure `words`. An empty set measures `0.0` on both ratios.
    #[must_use]
    pub fn measure<'w, I>(words: I, floor: f64) -> Self
    where
        I: IntoIterator<Item = &'w WordToken>,
    {
        let mut quality = Self::default();
        let mut confident = 0usize;
        let mut confidence_sum = 0.0;
        for word in words {
            quality.word_count += 1;
            quality.syllable_count += word.syllables.len();
            confidence_sum += word.confidence;
            if word.confidence > floor {
                confident += 1;
            }
        }
        if quality.word_count > 0 {
            let count = quality.word_count as f64;
            quality.coverage = confident as f64 / count;
            quality.avg_confidence = confidence_sum / count;
        }
        quality
    }

    /// Below either threshold. A measurement without words is never low.
    #[must_use]
    pub fn is_low(&self, thresholds: &QualityThresholds) -> bool {
        self.word_count > 0
            && (self.coverage < thresholds.coverage_threshold
                || self.avg_confidence < thresholds.confidence_threshold)
    }
}

/// Warnings to attach to a freshly aligned run.
///
/// `expected_tokens` is the number of reference tokens the window was
/// supposed to contain.
#[must_use]
pub fn run_warnings(
    quality: &WordQuality,
    expected_tokens: usize,
    thresholds: &QualityThresholds,
) -> Vec<String> {
    let starved = quality.word_count == 0 && expected_tokens > 0;
    if starved || (quality.word_count > 0 && quality.coverage < thresholds.coverage_threshold) {
        vec![LOW_COVERAGE_WARNING.to_string()]
    } else {
        Vec::new()
    }
}

/// Assessment of one edit, ready to be folded into the response.
#[derive(Debug, Clone, PartialEq)]
pub struct EditAssessment {
    pub metrics: EditMetrics,
    pub confidence: f64,
    pub needs_review: bool,
}

/// Everything the gate looks at for one edit.
#[derive(Debug, Clone, Copy)]
pub struct EditQualityInput<'a> {
    pub words: &'a WordQuality,
    pub segment_count: usize,
    pub total_tokens: usize,
    pub bound_tokens: usize,
    pub realigned: bool,
    pub run_warnings: &'a [String],
}

#[must_use]
pub fn assess_edit(input: &EditQualityInput<'_>, thresholds: &QualityThresholds) -> EditAssessment {
    let confidence = if input.total_tokens == 0 {
        1.0
    } else {
        input.bound_tokens as f64 / input.total_tokens as f64
    };
    let low_coverage_run = input
        .run_warnings
        .iter()
        .any(|warning| warning == LOW_COVERAGE_WARNING);
    let needs_review = input.words.is_low(thresholds)
        || input.bound_tokens < input.total_tokens
        || low_coverage_run;

    if needs_review {
        tracing::warn!(
            edit.coverage = input.words.coverage,
            edit.avg_confidence = input.words.avg_confidence,
            edit.unbound_tokens = input.total_tokens - input.bound_tokens.min(input.total_tokens),
            edit.low_coverage_run = low_coverage_run,
            "edit flagged for review"
        );
    }

    EditAssessment {
        metrics: EditMetrics {
            coverage_pct: input.words.coverage,
            avg_confidence: input.words.avg_confidence,
            word_count: input.words.word_count,
            syllable_count: input.words.syllable_count,
            segment_count: input.segment_count,
            remap_only: !input.realigned,
            realign_needed: input.realigned,
        },
        confidence,
        needs_review,
    }
}
