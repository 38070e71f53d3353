//! Edit flow: tokenize, match, then either remap or realign.
//!
//! Both paths end in the same place: rebind maps, re-validate the whole
//! timeline, derive boundaries and assess quality. Nothing here touches the
//! published state; the caller persists and publishes the returned timeline.

use std::collections::{HashMap, HashSet};

use chrono::{DateTime, Utc};
use tokio_util::sync::CancellationToken;

use crate::error::{Result, TimelineError, WindowFailure};
use crate::text::{TextToken, join_surfaces, tokenize_segment, tokenize_words};
use crate::timeline::matcher::{BatchSegment, MatchOutcome, Matcher, SegmentMatch, UnresolvedSegment};
use crate::timeline::planner::plan_windows;
use crate::timeline::quality::{EditQualityInput, WordQuality, assess_edit};
use crate::timeline::realign::{RunContext, WindowJob, align_windows};
use crate::timeline::track::TrackTimeline;
use crate::types::{
    Aligner, Author, EditAction, EditRequest, EditResponse, PartialWindowPolicy, TimeWindow,
    TimelinePolicy,
};

/// A fully computed edit, ready to persist.
#[derive(Debug)]
pub struct EditOutcome {
    pub timeline: TrackTimeline,
    pub response: EditResponse,
    /// Set when some windows failed and the policy kept the others.
    pub partial: Option<PartialFailure>,
}

#[derive(Debug, Clone)]
pub struct PartialFailure {
    pub committed: Vec<TimeWindow>,
    pub failed: Vec<WindowFailure>,
}

impl From<PartialFailure> for TimelineError {
    fn from(partial: PartialFailure) -> Self {
        Self::PartialRealign {
            committed: partial.committed,
            failed: partial.failed,
        }
    }
}

/// Validate and tokenize `request` against `current` into a reading-order batch.
pub fn prepare_batch(
    current: &TrackTimeline,
    request: &EditRequest,
    max_segment_chars: usize,
) -> Result<Vec<BatchSegment>> {
    if request.is_empty() {
        return Err(TimelineError::invalid_request("edit request names no segments"));
    }
    let unknown: Vec<&str> = request
        .edits()
        .iter()
        .filter(|edit| current.maps().position(&edit.segment_id).is_none())
        .map(|edit| edit.segment_id.as_str())
        .collect();
    if !unknown.is_empty() {
        return Err(TimelineError::invalid_request(format!(
            "unknown segment id(s): {}",
            unknown.join(", ")
        )));
    }

    let mut batch = Vec::with_capacity(request.edits().len());
    for edit in request.edits() {
        let tokens = tokenize_segment(&edit.segment_id, &edit.text, max_segment_chars)?;
        let position = current
            .maps()
            .position(&edit.segment_id)
            .ok_or_else(|| TimelineError::invalid_request(format!("unknown segment {}", edit.segment_id)))?;
        batch.push(BatchSegment {
            segment_id: edit.segment_id.clone(),
            position,
            tokens,
        });
    }
    batch.sort_by_key(|segment| segment.position);
    Ok(batch)
}

/// Run one edit against `current` and return the would-be next state.
pub async fn execute_edit(
    current: &TrackTimeline,
    request: &EditRequest,
    aligner: &dyn Aligner,
    policy: &TimelinePolicy,
    cancel: &CancellationToken,
    now: DateTime<Utc>,
) -> Result<EditOutcome> {
    let batch = prepare_batch(current, request, policy.max_segment_chars)?;
    let matcher = Matcher::new(
        current.store(),
        current.maps(),
        policy.matcher,
        current.track_duration_ms(),
    );
    match matcher.match_batch(&batch) {
        MatchOutcome::Full { matched } => remap(current, &batch, &matched, policy, now),
        MatchOutcome::Partial {
            matched,
            unresolved,
        } => realign(current, &batch, &matched, &unresolved, aligner, policy, cancel, now).await,
    }
}

fn remap(
    current: &TrackTimeline,
    batch: &[BatchSegment],
    matched: &[SegmentMatch],
    policy: &TimelinePolicy,
    now: DateTime<Utc>,
) -> Result<EditOutcome> {
    let mut next = current.clone();
    let changed = next.maps_mut().rebind(&to_bindings(matched), Author::User, now)?;
    next.validate()?;

    let total_tokens = batch.iter().map(|segment| segment.tokens.len()).sum();
    let response = respond(
        &next,
        batch,
        EditAction::Remap,
        total_tokens,
        total_tokens,
        Vec::new(),
        &[],
        policy,
    )?;
    tracing::info!(
        edit.action = "remap",
        edit.segments = batch.len(),
        edit.maps_changed = changed,
        "edit remapped onto existing words"
    );
    Ok(EditOutcome {
        timeline: next,
        response,
        partial: None,
    })
}

async fn realign(
    current: &TrackTimeline,
    batch: &[BatchSegment],
    matched: &[SegmentMatch],
    unresolved: &[UnresolvedSegment],
    aligner: &dyn Aligner,
    policy: &TimelinePolicy,
    cancel: &CancellationToken,
    now: DateTime<Utc>,
) -> Result<EditOutcome> {
    let hints: Vec<TimeWindow> = unresolved.iter().map(|segment| segment.time_hint).collect();
    let windows = plan_windows(&hints, &policy.window, current.track_duration_ms());
    tracing::info!(
        edit.unresolved = unresolved.len(),
        realign.windows = windows.len(),
        "edit needs realignment"
    );

    let jobs: Vec<WindowJob> = windows
        .iter()
        .map(|window| window_job(current, *window, matched, unresolved))
        .collect();
    let ctx = RunContext {
        track_id: current.track_id(),
        provider: aligner.provider(),
        provider_version: aligner.provider_version(),
        thresholds: &policy.quality,
        generate_syllables: policy.realign.generate_syllables,
    };
    let aligned = align_windows(
        aligner,
        &ctx,
        jobs,
        current.store().runs().len(),
        policy.realign.aligner_timeout_ms,
        cancel,
    )
    .await?;

    if !aligned.failures.is_empty() {
        let keep = policy.realign.partial_windows == PartialWindowPolicy::KeepCommitted;
        if !keep || aligned.runs.is_empty() {
            let first = &aligned.failures[0];
            return Err(TimelineError::Aligner {
                window: first.window,
                source: first.error.clone(),
            });
        }
    }
    if cancel.is_cancelled() {
        return Err(TimelineError::Cancelled);
    }

    let mut next = current.clone();
    next.maps_mut().rebind(&to_bindings(matched), Author::User, now)?;

    let mut retired: HashSet<String> = HashSet::new();
    let mut committed_windows = Vec::with_capacity(aligned.runs.len());
    let mut run_warnings = Vec::new();
    for (job, run) in aligned.runs {
        run_warnings.extend(run.warnings.iter().cloned());
        retired.extend(next.store_mut().commit_run(run)?);
        committed_windows.push(job.window);
    }

    let realigned_ids: HashSet<&str> = unresolved
        .iter()
        .filter(|segment| committed_windows.iter().any(|w| w.overlaps(&segment.time_hint)))
        .map(|segment| segment.segment_id.as_str())
        .collect();

    // Unresolved segments whose window failed keep their previous words,
    // minus the ones a matched segment of this batch now owns.
    let claimed: HashSet<&str> = matched
        .iter()
        .flat_map(|m| m.word_ids.iter().map(String::as_str))
        .collect();
    let kept: Vec<(String, Vec<String>)> = unresolved
        .iter()
        .filter(|segment| !realigned_ids.contains(segment.segment_id.as_str()))
        .filter_map(|segment| {
            let map = next.maps().get(&segment.segment_id)?;
            let remaining: Vec<String> = map
                .word_ids
                .iter()
                .filter(|word_id| !claimed.contains(word_id.as_str()))
                .cloned()
                .collect();
            (remaining.len() != map.word_ids.len()).then(|| (segment.segment_id.clone(), remaining))
        })
        .collect();
    next.maps_mut().rebind(&kept, Author::System, now)?;
    let batch_tokens: HashMap<&str, &[TextToken]> = batch
        .iter()
        .map(|segment| (segment.segment_id.as_str(), segment.tokens.as_slice()))
        .collect();

    let mut rebind: Vec<BatchSegment> = Vec::new();
    for (position, map) in next.maps().as_slice().iter().enumerate() {
        let owns_retired = map.word_ids.iter().any(|id| retired.contains(id));
        if !owns_retired && !realigned_ids.contains(map.segment_id.as_str()) {
            continue;
        }
        let tokens = match batch_tokens.get(map.segment_id.as_str()) {
            Some(tokens) => tokens.to_vec(),
            None => current_tokens(current, &map.segment_id)?,
        };
        rebind.push(BatchSegment {
            segment_id: map.segment_id.clone(),
            position,
            tokens,
        });
    }

    let restricted = Matcher::new(
        next.store(),
        next.maps(),
        policy.matcher,
        next.track_duration_ms(),
    )
    .bind_restricted(&rebind);

    let (user, system): (Vec<_>, Vec<_>) = to_bindings(&restricted.bindings)
        .into_iter()
        .partition(|(segment_id, _)| batch_tokens.contains_key(segment_id.as_str()));
    next.maps_mut().rebind(&user, Author::User, now)?;
    next.maps_mut().rebind(&system, Author::System, now)?;
    next.validate()?;

    let mut warnings = Vec::new();
    let mut unbound = 0usize;
    for (segment_id, surfaces) in &restricted.missing {
        if batch_tokens.contains_key(segment_id.as_str()) {
            unbound += surfaces.len();
        }
        warnings.push(format!(
            "segment {segment_id}: no aligned word for {}",
            join_surfaces(surfaces.iter().map(String::as_str))
        ));
    }
    for segment in unresolved {
        if !realigned_ids.contains(segment.segment_id.as_str()) {
            unbound += segment.tokens.len();
            warnings.push(format!("segment {}: window failed, previous timing kept", segment.segment_id));
        }
    }

    let total_tokens: usize = batch.iter().map(|segment| segment.tokens.len()).sum();
    let mut response = respond(
        &next,
        batch,
        EditAction::Realign,
        total_tokens,
        total_tokens.saturating_sub(unbound),
        warnings,
        &run_warnings,
        policy,
    )?;
    response.windows.clone_from(&committed_windows);

    let partial = (!aligned.failures.is_empty()).then(|| PartialFailure {
        committed: committed_windows,
        failed: aligned.failures,
    });
    tracing::info!(
        edit.action = "realign",
        edit.segments = batch.len(),
        edit.rebound = rebind.len(),
        edit.retired_words = retired.len(),
        edit.partial = partial.is_some(),
        "edit realigned"
    );
    Ok(EditOutcome {
        timeline: next,
        response,
        partial,
    })
}

/// Reference text for one window.
///
/// Unresolved segments contribute their new text; every other segment
/// contributes the surfaces of its words that the window will retire.
fn window_job(
    current: &TrackTimeline,
    window: TimeWindow,
    matched: &[SegmentMatch],
    unresolved: &[UnresolvedSegment],
) -> WindowJob {
    let mut parts: Vec<String> = Vec::new();
    for map in current.maps().as_slice() {
        if let Some(segment) = unresolved.iter().find(|u| u.segment_id == map.segment_id) {
            if window.overlaps(&segment.time_hint) && !segment.tokens.is_empty() {
                parts.push(join_surfaces(segment.tokens.iter().map(|t| t.surface.as_str())));
            }
            continue;
        }
        let word_ids = matched
            .iter()
            .find(|m| m.segment_id == map.segment_id)
            .map_or(map.word_ids.as_slice(), |m| m.word_ids.as_slice());
        let inside: Vec<&str> = word_ids
            .iter()
            .filter_map(|id| current.store().active_word(id))
            .filter(|word| window.contains_span(word.start_ms, word.end_ms))
            .map(|word| word.surface.as_str())
            .collect();
        if !inside.is_empty() {
            parts.push(join_surfaces(inside));
        }
    }
    let reference = join_surfaces(parts.iter().map(String::as_str));
    let expected_tokens = tokenize_words(&reference).len();
    WindowJob {
        window,
        reference_text: (!reference.is_empty()).then_some(reference),
        expected_tokens,
    }
}

/// Tokens of the text a segment currently shows, rebuilt from its words.
fn current_tokens(current: &TrackTimeline, segment_id: &str) -> Result<Vec<TextToken>> {
    let words = current.maps().owned_words(current.store(), segment_id)?;
    Ok(tokenize_words(&join_surfaces(
        words.iter().map(|word| word.surface.as_str()),
    )))
}

fn to_bindings(matched: &[SegmentMatch]) -> Vec<(String, Vec<String>)> {
    matched
        .iter()
        .map(|m| (m.segment_id.clone(), m.word_ids.clone()))
        .collect()
}

fn respond(
    next: &TrackTimeline,
    batch: &[BatchSegment],
    action: EditAction,
    total_tokens: usize,
    bound_tokens: usize,
    warnings: Vec<String>,
    run_warnings: &[String],
    policy: &TimelinePolicy,
) -> Result<EditResponse> {
    let mut words = Vec::new();
    for segment in batch {
        words.extend(next.maps().owned_words(next.store(), &segment.segment_id)?);
    }
    let quality = WordQuality::measure(words.iter().copied(), policy.quality.word_confidence_floor);
    let assessment = assess_edit(
        &EditQualityInput {
            words: &quality,
            segment_count: batch.len(),
            total_tokens,
            bound_tokens,
            realigned: action == EditAction::Realign,
            run_warnings,
        },
        &policy.quality,
    );

    let mut all_warnings = warnings;
    for warning in run_warnings {
        if !all_warnings.contains(warning) {
            all_warnings.push(warning.clone());
        }
    }

    Ok(EditResponse {
        action,
        confidence: assessment.confidence,
        needs_review: assessment.needs_review,
        metrics: assessment.metrics,
        windows: Vec::new(),
        warnings: all_warnings,
        segments: next.segment_timings(&policy.gap)?,
    })
}
