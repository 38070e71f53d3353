//! Aligner calls and conversion of their output into alignment runs.
//!
//! Every call runs under a timeout budget and races the caller's
//! cancellation token. Windows of one batch are aligned concurrently; the
//! caller commits the resulting runs one by one in window order.

use std::time::Duration;

use futures_util::future::join_all;
use tokio_util::sync::CancellationToken;

use crate::error::{AlignerError, Result, TimelineError, WindowFailure};
use crate::text::normalize_token;
use crate::timeline::quality::{WordQuality, run_warnings};
use crate::timeline::store::validate_run;
use crate::timeline::syllables::generate_syllables;
use crate::types::{
    AlignRequest, AlignedWord, Aligner, AlignmentRun, QualityThresholds, SyllableToken, Syllables,
    TimeWindow, WordToken,
};

/// One window to send to the aligner.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WindowJob {
    pub window: TimeWindow,
    pub reference_text: Option<String>,
    /// Reference tokens the window is expected to contain.
    pub expected_tokens: usize,
}

/// Provenance and options shared by every run of one batch.
#[derive(Debug, Clone, Copy)]
pub struct RunContext<'a> {
    pub track_id: &'a str,
    pub provider: &'a str,
    pub provider_version: &'a str,
    pub thresholds: &'a QualityThresholds,
    pub generate_syllables: bool,
}

/// Outcome of aligning all windows of a batch.
#[derive(Debug, Default)]
pub struct AlignedBatch {
    /// Accepted runs with their jobs, in window order, not yet committed.
    pub runs: Vec<(WindowJob, AlignmentRun)>,
    pub failures: Vec<WindowFailure>,
}

/// Stable 16-hex-char hash of everything that determines an aligner run.
#[must_use]
pub fn params_hash(
    track_id: &str,
    provider: &str,
    provider_version: &str,
    window: TimeWindow,
    reference_text: Option<&str>,
) -> String {
    let mut hasher = blake3::Hasher::new();
    for part in [track_id, provider, provider_version] {
        hasher.update(part.as_bytes());
        hasher.update(&[0]);
    }
    hasher.update(&window.start_ms.to_le_bytes());
    hasher.update(&window.end_ms.to_le_bytes());
    hasher.update(reference_text.unwrap_or_default().as_bytes());
    let hex = hasher.finalize().to_hex();
    hex.as_str()[..16].to_string()
}

/// Run id for the `ordinal`-th run of a track.
#[must_use]
pub fn run_id(ordinal: usize, params_hash: &str) -> String {
    let short = params_hash.get(..8).unwrap_or(params_hash);
    format!("r{ordinal:03}-{short}")
}

/// Align every job concurrently and turn successes into validated runs.
///
/// Returns [`TimelineError::Cancelled`] if `cancel` fires before all calls
/// settle; no run from the batch is returned in that case.
#[tracing::instrument(level = "debug", skip_all, fields(track.id = ctx.track_id, realign.windows = jobs.len()))]
pub async fn align_windows(
    aligner: &dyn Aligner,
    ctx: &RunContext<'_>,
    jobs: Vec<WindowJob>,
    first_ordinal: usize,
    budget_ms: u64,
    cancel: &CancellationToken,
) -> Result<AlignedBatch> {
    let calls = jobs.iter().map(|job| {
        let request = AlignRequest {
            track_id: ctx.track_id.to_string(),
            window: job.window,
            reference_text: job.reference_text.clone(),
        };
        align_one(aligner, request, budget_ms, cancel)
    });
    let settled = join_all(calls).await;
    if cancel.is_cancelled() || settled.iter().any(Option::is_none) {
        tracing::warn!(track.id = ctx.track_id, "realign cancelled while aligner calls were in flight");
        return Err(TimelineError::Cancelled);
    }

    let mut batch = AlignedBatch::default();
    let mut ordinal = first_ordinal;
    for (job, result) in jobs.into_iter().zip(settled.into_iter().flatten()) {
        let converted = result.and_then(|words| build_run(ctx, &job, ordinal, words));
        match converted {
            Ok(run) => {
                ordinal += 1;
                batch.runs.push((job, run));
            }
            Err(error) => {
                tracing::warn!(
                    window.start_ms = job.window.start_ms,
                    window.end_ms = job.window.end_ms,
                    error = %error,
                    "aligner window failed"
                );
                batch.failures.push(WindowFailure {
                    window: job.window,
                    error,
                });
            }
        }
    }
    Ok(batch)
}

/// `None` when cancelled.
async fn align_one(
    aligner: &dyn Aligner,
    request: AlignRequest,
    budget_ms: u64,
    cancel: &CancellationToken,
) -> Option<std::result::Result<Vec<AlignedWord>, AlignerError>> {
    let window = request.window;
    tracing::debug!(
        window.start_ms = window.start_ms,
        window.end_ms = window.end_ms,
        reference = request.reference_text.is_some(),
        "calling aligner"
    );
    tokio::select! {
        biased;
        () = cancel.cancelled() => None,
        outcome = tokio::time::timeout(Duration::from_millis(budget_ms), aligner.align(request)) => {
            Some(outcome.unwrap_or_else(|_elapsed| Err(AlignerError::Timeout { budget_ms })))
        }
    }
}

/// Convert aligner output into a run; any invariant break is a malformed response.
pub fn build_run(
    ctx: &RunContext<'_>,
    job: &WindowJob,
    ordinal: usize,
    aligned: Vec<AlignedWord>,
) -> std::result::Result<AlignmentRun, AlignerError> {
    let hash = params_hash(
        ctx.track_id,
        ctx.provider,
        ctx.provider_version,
        job.window,
        job.reference_text.as_deref(),
    );
    let id = run_id(ordinal, &hash);

    let mut words = Vec::with_capacity(aligned.len());
    for word in aligned {
        let norm = normalize_token(&word.surface);
        if norm.is_empty() {
            continue;
        }
        let idx = u32::try_from(words.len())
            .map_err(|_| AlignerError::Malformed("too many words in one window".into()))?;
        let word_id = format!("{id}:w{idx:04}");
        let syllables = word
            .syllables
            .iter()
            .enumerate()
            .map(|(pos, syllable)| SyllableToken {
                syll_id: format!("{word_id}.s{pos}"),
                syll_index: u32::try_from(pos).unwrap_or(u32::MAX),
                text: syllable.text.clone(),
                start_ms: syllable.start_ms,
                end_ms: syllable.end_ms,
                confidence: syllable.confidence,
            })
            .collect::<Vec<_>>();
        let mut token = WordToken {
            word_id,
            idx_in_run: idx,
            surface: word.surface,
            norm,
            start_ms: word.start_ms,
            end_ms: word.end_ms,
            confidence: word.confidence,
            syllables: Syllables::from(syllables),
        };
        if ctx.generate_syllables && token.syllables.is_unsplit() && token.start_ms < token.end_ms {
            token.syllables = generate_syllables(&token);
        }
        words.push(token);
    }

    let quality = WordQuality::measure(&words, ctx.thresholds.word_confidence_floor);
    let warnings = run_warnings(&quality, job.expected_tokens, ctx.thresholds);
    if !warnings.is_empty() {
        tracing::warn!(
            run.id = %id,
            run.words = quality.word_count,
            run.expected = job.expected_tokens,
            run.coverage = quality.coverage,
            "low coverage in aligned window"
        );
    }
    let run = AlignmentRun {
        run_id: id,
        track_id: ctx.track_id.to_string(),
        window_start_ms: job.window.start_ms,
        window_end_ms: job.window.end_ms,
        provider: ctx.provider.to_string(),
        provider_version: ctx.provider_version.to_string(),
        params_hash: hash,
        coverage: quality.coverage,
        avg_confidence: quality.avg_confidence,
        warnings,
        words,
        retired_word_ids: Vec::new(),
    };
    validate_run(&run).map_err(AlignerError::Malformed)?;
    Ok(run)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::constants::LOW_COVERAGE_WARNING;

    fn ctx(thresholds: &QualityThresholds) -> RunContext<'_> {
        RunContext {
            track_id: "t1",
            provider: "fake",
            provider_version: "0.1",
            thresholds,
            generate_syllables: false,
        }
    }

    fn job(start: i64, end: i64) -> WindowJob {
        WindowJob {
            window: TimeWindow::new(start, end),
            reference_text: Some("Nur Deine".into()),
            expected_tokens: 2,
        }
    }

    #[test]
    fn params_hash_is_stable_and_sensitive() {
        let window = TimeWindow::new(0, 3000);
        let a = params_hash("t1", "fake", "0.1", window, Some("Nur Deine"));
        assert_eq!(a.len(), 16);
        assert_eq!(a, params_hash("t1", "fake", "0.1", window, Some("Nur Deine")));
        assert_ne!(a, params_hash("t1", "fake", "0.1", window, Some("Nur Meine")));
        assert!(run_id(3, &a).starts_with("r003-"));
    }

    #[test]
    fn builds_run_with_derived_ids_and_norms() {
        let thresholds = QualityThresholds::default();
        let run = build_run(&ctx(&thresholds), &job(0, 3000), 1, vec![
            AlignedWord::new("Nur", 10, 480, 0.9),
            AlignedWord::new("Deine,", 520, 1150, 0.8),
        ])
        .unwrap();
        assert_eq!(run.words.len(), 2);
        assert_eq!(run.words[1].norm, "deine");
        assert!(run.words[0].word_id.starts_with(&run.run_id));
        assert!(run.warnings.is_empty());
    }

    #[test]
    fn words_outside_window_are_malformed() {
        let thresholds = QualityThresholds::default();
        let err = build_run(&ctx(&thresholds), &job(0, 1000), 0, vec![AlignedWord::new(
            "Nur", 900, 1200, 0.9,
        )])
        .unwrap_err();
        assert!(matches!(err, AlignerError::Malformed(_)));
    }

    #[test]
    fn empty_output_is_a_low_coverage_run() {
        let thresholds = QualityThresholds::default();
        let run = build_run(&ctx(&thresholds), &job(0, 1000), 0, Vec::new()).unwrap();
        assert!(run.words.is_empty());
        assert_eq!(run.warnings, vec![LOW_COVERAGE_WARNING.to_string()]);
    }

    #[test]
    fn generates_syllables_when_asked() {
        let thresholds = QualityThresholds::default();
        let mut context = ctx(&thresholds);
        context.generate_syllables = true;
        let run = build_run(&context, &job(0, 3000), 0, vec![AlignedWord::new(
            "Regeln", 100, 900, 0.9,
        )])
        .unwrap();
        assert_eq!(run.syllable_count(), 2);
    }
}
