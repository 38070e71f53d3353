//! Build or rebuild a whole timeline from the current segment set.
//!
//! Two sources are supported. Segments that already carry word timings
//! (or only segment bounds) bootstrap a single `existing` run without any
//! aligner call. Alternatively every segment span is planned into windows
//! and sent to the aligner, which is the recovery path for a corrupted
//! timeline. Both are deterministic for identical input and `updated_at`.

use std::collections::HashSet;

use chrono::{DateTime, Utc};
use tokio_util::sync::CancellationToken;

use crate::constants::{
    APPROXIMATED_TIMING_WARNING, APPROXIMATED_WORD_CONFIDENCE, EXISTING_PROVIDER,
    EXISTING_PROVIDER_VERSION,
};
use crate::error::{Result, TimelineError};
use crate::text::{TextToken, join_surfaces, normalize_token, tokenize_segment, tokenize_words};
use crate::timeline::matcher::{BatchSegment, Matcher};
use crate::timeline::planner::plan_windows;
use crate::timeline::quality::{WordQuality, run_warnings};
use crate::timeline::realign::{RunContext, WindowJob, align_windows, params_hash, run_id};
use crate::timeline::segment_map::SegmentWordMaps;
use crate::timeline::store::WordTimelineStore;
use crate::timeline::syllables::{count_syllables, generate_syllables};
use crate::timeline::track::TrackTimeline;
use crate::types::{
    Aligner, AlignmentRun, Millis, SegmentWordMap, SourceSegment, Syllables, TimeWindow,
    TimelinePolicy, WordToken,
};

/// What a build produced, for logging and API responses.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct BuildReport {
    pub run_ids: Vec<String>,
    pub word_count: usize,
    /// Words whose timing was spread over segment bounds instead of measured.
    pub approximated_words: usize,
    /// Segment tokens that found no aligned word (aligner rebuild only).
    pub unbound_tokens: usize,
    pub warnings: Vec<String>,
}

#[derive(Debug)]
pub struct Built {
    pub timeline: TrackTimeline,
    pub report: BuildReport,
}

struct DraftWord {
    surface: String,
    norm: String,
    start_ms: Millis,
    end_ms: Millis,
    confidence: f64,
    segment: usize,
}

/// Bootstrap a timeline from segment word timings, approximating where absent.
#[tracing::instrument(level = "debug", skip_all, fields(track.id = track_id, build.segments = segments.len()))]
pub fn build_from_segments(
    track_id: &str,
    segments: &[SourceSegment],
    policy: &TimelinePolicy,
    track_duration_ms: Option<Millis>,
    updated_at: DateTime<Utc>,
) -> Result<Built> {
    let tokens = validate_sources(segments, policy.max_segment_chars)?;

    let mut drafts = Vec::new();
    let mut approximated_words = 0usize;
    for (pos, (segment, segment_tokens)) in segments.iter().zip(&tokens).enumerate() {
        if segment.words.is_empty() {
            let spread = approximate(segment, segment_tokens, pos);
            approximated_words += spread.len();
            drafts.extend(spread);
            continue;
        }
        drafts.extend(segment.words.iter().filter_map(|word| {
            let norm = normalize_token(&word.surface);
            (!norm.is_empty()).then(|| DraftWord {
                surface: word.surface.trim().to_string(),
                norm,
                start_ms: word.start_ms,
                end_ms: word.end_ms,
                confidence: word.confidence.clamp(0.0, 1.0),
                segment: pos,
            })
        }));
    }
    let repaired = repair_order(&mut drafts);

    let window = drafts.iter().fold(None::<TimeWindow>, |acc, word| {
        let span = TimeWindow::new(word.start_ms, word.end_ms);
        Some(acc.map_or(span, |w| w.union(&span)))
    });
    let window = window.unwrap_or_default();
    let reference = join_surfaces(segments.iter().map(|segment| segment.text.as_str()));
    let hash = params_hash(
        track_id,
        EXISTING_PROVIDER,
        EXISTING_PROVIDER_VERSION,
        window,
        Some(&reference),
    );
    let id = run_id(0, &hash);

    let mut words = Vec::with_capacity(drafts.len());
    let mut owned: Vec<Vec<String>> = vec![Vec::new(); segments.len()];
    for (idx, draft) in drafts.into_iter().enumerate() {
        let idx = u32::try_from(idx).map_err(|_| {
            TimelineError::invalid_request("too many words for a single bootstrap run")
        })?;
        let word_id = format!("{id}:w{idx:04}");
        owned[draft.segment].push(word_id.clone());
        let mut word = WordToken {
            word_id,
            idx_in_run: idx,
            surface: draft.surface,
            norm: draft.norm,
            start_ms: draft.start_ms,
            end_ms: draft.end_ms,
            confidence: draft.confidence,
            syllables: Syllables::Unsplit,
        };
        if policy.realign.generate_syllables {
            word.syllables = generate_syllables(&word);
        }
        words.push(word);
    }

    let quality = WordQuality::measure(&words, policy.quality.word_confidence_floor);
    let expected: usize = tokens.iter().map(Vec::len).sum();
    let mut warnings = run_warnings(&quality, expected, &policy.quality);
    if approximated_words > 0 {
        warnings.push(APPROXIMATED_TIMING_WARNING.to_string());
    }
    let run = AlignmentRun {
        run_id: id.clone(),
        track_id: track_id.to_string(),
        window_start_ms: window.start_ms,
        window_end_ms: window.end_ms,
        provider: EXISTING_PROVIDER.to_string(),
        provider_version: EXISTING_PROVIDER_VERSION.to_string(),
        params_hash: hash,
        coverage: quality.coverage,
        avg_confidence: quality.avg_confidence,
        warnings: warnings.clone(),
        words,
        retired_word_ids: Vec::new(),
    };

    let mut store = WordTimelineStore::new(track_id);
    store.commit_run(run)?;
    let maps = SegmentWordMaps::new(
        segments
            .iter()
            .zip(owned)
            .map(|(segment, word_ids)| SegmentWordMap::new(segment.segment_id.clone(), word_ids, updated_at))
            .collect(),
    )?;
    let timeline = TrackTimeline::from_parts(store, maps, track_duration_ms)?;

    tracing::info!(
        run.id = %id,
        build.words = quality.word_count,
        build.approximated = approximated_words,
        build.repaired = repaired,
        "timeline bootstrapped from existing segments"
    );
    Ok(Built {
        timeline,
        report: BuildReport {
            run_ids: vec![id],
            word_count: quality.word_count,
            approximated_words,
            unbound_tokens: 0,
            warnings,
        },
    })
}

/// Rebuild by aligning every segment span from scratch.
///
/// Any failed window fails the rebuild; nothing partial is returned.
#[tracing::instrument(level = "debug", skip_all, fields(track.id = track_id, build.segments = segments.len()))]
pub async fn rebuild_with_aligner(
    track_id: &str,
    segments: &[SourceSegment],
    aligner: &dyn Aligner,
    policy: &TimelinePolicy,
    track_duration_ms: Option<Millis>,
    cancel: &CancellationToken,
    updated_at: DateTime<Utc>,
) -> Result<Built> {
    let tokens = validate_sources(segments, policy.max_segment_chars)?;
    let hints: Vec<TimeWindow> = segments
        .iter()
        .zip(&tokens)
        .filter(|(_, segment_tokens)| !segment_tokens.is_empty())
        .map(|(segment, _)| TimeWindow::new(segment.start_ms, segment.end_ms))
        .collect();
    let windows = plan_windows(&hints, &policy.window, track_duration_ms);

    let jobs = windows
        .iter()
        .map(|window| {
            let reference = join_surfaces(
                segments
                    .iter()
                    .zip(&tokens)
                    .filter(|(segment, segment_tokens)| {
                        !segment_tokens.is_empty()
                            && window.overlaps(&TimeWindow::new(segment.start_ms, segment.end_ms))
                    })
                    .map(|(segment, _)| segment.text.as_str()),
            );
            WindowJob {
                window: *window,
                expected_tokens: tokenize_words(&reference).len(),
                reference_text: (!reference.is_empty()).then_some(reference),
            }
        })
        .collect();
    let ctx = RunContext {
        track_id,
        provider: aligner.provider(),
        provider_version: aligner.provider_version(),
        thresholds: &policy.quality,
        generate_syllables: policy.realign.generate_syllables,
    };
    let aligned = align_windows(aligner, &ctx, jobs, 0, policy.realign.aligner_timeout_ms, cancel).await?;
    if let Some(first) = aligned.failures.first() {
        return Err(TimelineError::Aligner {
            window: first.window,
            source: first.error.clone(),
        });
    }

    let mut store = WordTimelineStore::new(track_id);
    let mut report = BuildReport::default();
    for (_, run) in aligned.runs {
        report.run_ids.push(run.run_id.clone());
        report.word_count += run.words.len();
        for warning in &run.warnings {
            if !report.warnings.contains(warning) {
                report.warnings.push(warning.clone());
            }
        }
        store.commit_run(run)?;
    }

    let empty = SegmentWordMaps::new(
        segments
            .iter()
            .map(|segment| SegmentWordMap::new(segment.segment_id.clone(), Vec::new(), updated_at))
            .collect(),
    )?;
    let batch: Vec<BatchSegment> = segments
        .iter()
        .zip(tokens)
        .enumerate()
        .map(|(position, (segment, tokens))| BatchSegment {
            segment_id: segment.segment_id.clone(),
            position,
            tokens,
        })
        .collect();
    let binding = Matcher::new(&store, &empty, policy.matcher, track_duration_ms).bind_restricted(&batch);
    report.unbound_tokens = binding.missing_count();

    let maps = SegmentWordMaps::new(
        binding
            .bindings
            .into_iter()
            .map(|m| SegmentWordMap::new(m.segment_id, m.word_ids, updated_at))
            .collect(),
    )?;
    let timeline = TrackTimeline::from_parts(store, maps, track_duration_ms)?;
    tracing::info!(
        build.runs = report.run_ids.len(),
        build.words = report.word_count,
        build.unbound = report.unbound_tokens,
        "timeline rebuilt with aligner"
    );
    Ok(Built { timeline, report })
}

/// Reject unusable segment sets and tokenize their text.
fn validate_sources(segments: &[SourceSegment], max_chars: usize) -> Result<Vec<Vec<TextToken>>> {
    let mut seen = HashSet::with_capacity(segments.len());
    let mut tokens = Vec::with_capacity(segments.len());
    for segment in segments {
        if segment.segment_id.trim().is_empty() {
            return Err(TimelineError::invalid_request("segment without id"));
        }
        if !seen.insert(segment.segment_id.as_str()) {
            return Err(TimelineError::invalid_request(format!(
                "segment {} listed more than once",
                segment.segment_id
            )));
        }
        if segment.start_ms < 0 || segment.end_ms < segment.start_ms {
            return Err(TimelineError::invalid_request(format!(
                "segment {} has invalid bounds [{}, {}]",
                segment.segment_id, segment.start_ms, segment.end_ms
            )));
        }
        if let Some(word) = segment.words.iter().find(|w| w.start_ms < 0) {
            return Err(TimelineError::invalid_request(format!(
                "segment {} word {:?} starts before 0",
                segment.segment_id, word.surface
            )));
        }
        tokens.push(tokenize_segment(&segment.segment_id, &segment.text, max_chars)?);
    }
    Ok(tokens)
}

/// Spread a segment's span over its tokens, weighted by syllable count.
fn approximate(segment: &SourceSegment, tokens: &[TextToken], pos: usize) -> Vec<DraftWord> {
    let weights: Vec<Millis> = tokens
        .iter()
        .map(|token| Millis::try_from(count_syllables(&token.surface)).unwrap_or(1).max(1))
        .collect();
    let total: Millis = weights.iter().sum();
    let span = segment.end_ms - segment.start_ms;
    let mut cursor = segment.start_ms;
    let mut cumulative = 0;
    tokens
        .iter()
        .zip(&weights)
        .map(|(token, weight)| {
            cumulative += weight;
            let end = segment.start_ms + span * cumulative / total.max(1);
            let word = DraftWord {
                surface: token.surface.clone(),
                norm: token.norm.clone(),
                start_ms: cursor,
                end_ms: end,
                confidence: APPROXIMATED_WORD_CONFIDENCE,
                segment: pos,
            };
            cursor = end;
            word
        })
        .collect()
}

/// Nudge words so starts strictly increase and every word has a positive span.
///
/// Returns how many words were touched.
fn repair_order(words: &mut [DraftWord]) -> usize {
    let mut touched = 0;
    let mut previous_start: Option<Millis> = None;
    for word in words.iter_mut() {
        let mut changed = false;
        if let Some(prev) = previous_start {
            if word.start_ms <= prev {
                word.start_ms = prev + 1;
                changed = true;
            }
        }
        if word.end_ms <= word.start_ms {
            word.end_ms = word.start_ms + 1;
            changed = true;
        }
        if changed {
            touched += 1;
        }
        previous_start = Some(word.start_ms);
    }
    touched
}
