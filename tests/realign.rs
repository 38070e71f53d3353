//! Slow-path edits: new words force a local realignment.

mod common;

use std::time::Duration;

use common::{
    Behavior, ScriptedAligner, bounds, handle_for, heard, heard_nur_deine, segment, surfaces,
    two_segments, word,
};
use tokio_util::sync::CancellationToken;
use word_timeline_core::{
    AlignedWord, AlignerError, EditAction, EditRequest, PartialWindowPolicy, SourceSegment, TimeWindow,
    TimelineError, TimelinePolicy,
};

fn nur_deine() -> EditRequest {
    EditRequest::new([("0", "Nur Deine")]).unwrap()
}

/// [`two_segments`] plus a line a minute later.
fn with_far_segment() -> Vec<SourceSegment> {
    let mut segments = two_segments();
    segments.push(segment("2", "Weit weg", vec![
        word("Weit", 60_000, 60_400),
        word("weg", 60_400, 61_000),
    ]));
    segments
}

fn heard_far() -> Vec<AlignedWord> {
    let mut words = heard_nur_deine();
    words.push(heard("Weit", 60_000, 60_400));
    words.push(heard("fort", 60_400, 61_000));
    words
}

#[tokio::test]
async fn new_word_realigns_one_padded_window() {
    let handle = handle_for(&two_segments(), TimelinePolicy::default());
    let before = bounds(&handle);
    let aligner = ScriptedAligner::new(heard_nur_deine());

    let response = handle
        .apply_edit(&nur_deine(), &aligner, &CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(response.action, EditAction::Realign);
    assert!(response.metrics.realign_needed);
    assert!(!response.needs_review);
    assert_eq!(response.windows, vec![TimeWindow::new(0, 2200)]);
    assert_eq!(aligner.calls(), 1);
    assert_eq!(
        aligner.requests()[0].reference_text.as_deref(),
        Some("Nur Deine Regeln")
    );

    let snapshot = handle.snapshot();
    assert_eq!(snapshot.store().runs().len(), 2);
    assert_eq!(surfaces(&handle, "0"), vec!["Nur", "Deine"]);
    assert_eq!(surfaces(&handle, "1"), vec!["Regeln", "Bleiben.", "Die"]);
    assert_eq!(bounds(&handle), before);
}

#[tokio::test]
async fn only_words_fully_inside_the_window_are_replaced() {
    let handle = handle_for(&two_segments(), TimelinePolicy::default());
    let bootstrap_run = handle.snapshot().store().runs()[0].run_id.clone();
    let aligner = ScriptedAligner::new(heard_nur_deine());

    handle
        .apply_edit(&nur_deine(), &aligner, &CancellationToken::new())
        .await
        .unwrap();

    let snapshot = handle.snapshot();
    let new_run = snapshot.store().runs()[1].clone();
    assert!(new_run.run_id.starts_with("r001-"));
    assert_eq!(new_run.retired_word_ids.len(), 3);

    let owners: Vec<String> = handle
        .words_for_segment("1")
        .unwrap()
        .into_iter()
        .map(|w| w.word_id)
        .collect();
    assert!(owners[0].starts_with(&new_run.run_id));
    assert!(owners[1].starts_with(&bootstrap_run));
    assert!(owners[2].starts_with(&bootstrap_run));
    assert_eq!(handle.metrics().unowned_word_count, 0);
}

#[tokio::test]
async fn aligner_timeout_fails_the_whole_edit() {
    let policy = TimelinePolicy::builder().aligner_timeout_ms(50).build();
    let handle = handle_for(&two_segments(), policy);
    let before = handle.snapshot().to_document();
    let aligner = ScriptedAligner::new(heard_nur_deine()).with_behavior(Behavior::Hang);

    let err = handle
        .apply_edit(&nur_deine(), &aligner, &CancellationToken::new())
        .await
        .unwrap_err();

    match &err {
        TimelineError::Aligner { window, source } => {
            assert_eq!(*window, TimeWindow::new(0, 2200));
            assert_eq!(*source, AlignerError::Timeout { budget_ms: 50 });
        }
        other => panic!("expected aligner failure, got {other:?}"),
    }
    assert!(err.is_retryable());
    assert_eq!(handle.snapshot().to_document(), before);
    assert_eq!(handle.snapshot().store().runs().len(), 1);

    // The same edit goes through once the backend recovers.
    aligner.set_behavior(Behavior::Transcribe);
    let response = handle
        .apply_edit(&nur_deine(), &aligner, &CancellationToken::new())
        .await
        .unwrap();
    assert_eq!(response.action, EditAction::Realign);
    assert_eq!(handle.snapshot().store().runs().len(), 2);
}

#[tokio::test]
async fn transport_failure_leaves_track_untouched() {
    let handle = handle_for(&two_segments(), TimelinePolicy::default());
    let before = handle.snapshot().to_document();
    let aligner = ScriptedAligner::new(heard_nur_deine()).with_behavior(Behavior::Fail);

    let err = handle
        .apply_edit(&nur_deine(), &aligner, &CancellationToken::new())
        .await
        .unwrap_err();

    assert!(matches!(
        err,
        TimelineError::Aligner {
            source: AlignerError::Transport(_),
            ..
        }
    ));
    assert_eq!(handle.snapshot().to_document(), before);
}

#[tokio::test]
async fn cancellation_abandons_the_aligner_call() {
    let handle = handle_for(&two_segments(), TimelinePolicy::default());
    let before = handle.snapshot().to_document();
    let aligner = ScriptedAligner::new(heard_nur_deine()).with_behavior(Behavior::Hang);
    let cancel = CancellationToken::new();

    let trigger = cancel.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(20)).await;
        trigger.cancel();
    });

    let err = tokio::time::timeout(
        Duration::from_secs(5),
        handle.apply_edit(&nur_deine(), &aligner, &cancel),
    )
    .await
    .expect("cancelled edit returns promptly")
    .unwrap_err();

    assert!(matches!(err, TimelineError::Cancelled));
    assert_eq!(handle.snapshot().to_document(), before);
}

#[tokio::test]
async fn silent_window_is_low_coverage_not_an_error() {
    let handle = handle_for(&two_segments(), TimelinePolicy::default());
    let aligner = ScriptedAligner::new(heard_nur_deine()).with_behavior(Behavior::Silent);

    let response = handle
        .apply_edit(&nur_deine(), &aligner, &CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(response.action, EditAction::Realign);
    assert!(response.needs_review);
    assert!(response.confidence.abs() < f64::EPSILON);
    assert!(response.warnings.iter().any(|w| w == "low_coverage"));
    assert!(surfaces(&handle, "0").is_empty());
    assert_eq!(surfaces(&handle, "1"), vec!["Bleiben.", "Die"]);

    let run = handle.snapshot().store().runs()[1].clone();
    assert!(run.words.is_empty());
    assert_eq!(run.warnings, vec!["low_coverage".to_string()]);
}

#[tokio::test]
async fn distant_edits_get_separate_windows() {
    let handle = handle_for(&with_far_segment(), TimelinePolicy::default());
    let aligner = ScriptedAligner::new(heard_far());
    let request = EditRequest::new([("0", "Nur Deine"), ("2", "Weit fort")]).unwrap();

    let response = handle
        .apply_edit(&request, &aligner, &CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(response.action, EditAction::Realign);
    assert_eq!(response.windows, vec![
        TimeWindow::new(0, 2200),
        TimeWindow::new(59_000, 62_000)
    ]);
    assert_eq!(aligner.calls(), 2);
    assert_eq!(handle.snapshot().store().runs().len(), 3);
    assert_eq!(surfaces(&handle, "0"), vec!["Nur", "Deine"]);
    assert_eq!(surfaces(&handle, "1"), vec!["Regeln", "Bleiben.", "Die"]);
    assert_eq!(surfaces(&handle, "2"), vec!["Weit", "fort"]);
}

#[tokio::test]
async fn one_failed_window_fails_everything_by_default() {
    let handle = handle_for(&with_far_segment(), TimelinePolicy::default());
    let before = handle.snapshot().to_document();
    let aligner = ScriptedAligner::new(heard_far()).with_behavior(Behavior::FailFrom(50_000));
    let request = EditRequest::new([("0", "Nur Deine"), ("2", "Weit fort")]).unwrap();

    let err = handle
        .apply_edit(&request, &aligner, &CancellationToken::new())
        .await
        .unwrap_err();

    assert!(matches!(err, TimelineError::Aligner { window, .. } if window == TimeWindow::new(59_000, 62_000)));
    assert_eq!(handle.snapshot().to_document(), before);
}

#[tokio::test]
async fn keep_committed_policy_publishes_successful_windows() {
    let policy = TimelinePolicy::builder()
        .partial_windows(PartialWindowPolicy::KeepCommitted)
        .build();
    let handle = handle_for(&with_far_segment(), policy);
    let aligner = ScriptedAligner::new(heard_far()).with_behavior(Behavior::FailFrom(50_000));
    let request = EditRequest::new([("0", "Nur Deine"), ("2", "Weit fort")]).unwrap();

    let err = handle
        .apply_edit(&request, &aligner, &CancellationToken::new())
        .await
        .unwrap_err();

    match &err {
        TimelineError::PartialRealign { committed, failed } => {
            assert_eq!(committed, &vec![TimeWindow::new(0, 2200)]);
            assert_eq!(failed.len(), 1);
            assert_eq!(failed[0].window, TimeWindow::new(59_000, 62_000));
        }
        other => panic!("expected partial realign, got {other:?}"),
    }
    assert!(err.is_retryable());
    assert_eq!(handle.snapshot().store().runs().len(), 2);
    assert_eq!(surfaces(&handle, "0"), vec!["Nur", "Deine"]);
    assert_eq!(surfaces(&handle, "2"), vec!["Weit", "weg"]);

    // Retrying finishes the failed half without touching the committed one.
    aligner.set_behavior(Behavior::Transcribe);
    let response = handle
        .apply_edit(&request, &aligner, &CancellationToken::new())
        .await
        .unwrap();
    assert_eq!(response.action, EditAction::Realign);
    assert_eq!(surfaces(&handle, "2"), vec!["Weit", "fort"]);
}

#[tokio::test]
async fn failed_window_segment_releases_words_taken_by_a_sibling() {
    let policy = TimelinePolicy::builder()
        .partial_windows(PartialWindowPolicy::KeepCommitted)
        .build();
    let segments = vec![
        segment("0", "Nur Meine", vec![word("Nur", 0, 500), word("Meine", 500, 1200)]),
        segment("1", "Weit", vec![word("Weit", 60_000, 60_400)]),
        segment("2", "weg", vec![word("weg", 60_400, 61_000)]),
    ];
    let handle = handle_for(&segments, policy);
    let aligner = ScriptedAligner::new(vec![
        heard("Nur", 0, 500),
        heard("Deine", 500, 1200),
        heard("Weit", 60_000, 60_400),
        heard("weg", 60_400, 61_000),
        heard("fort", 61_000, 61_500),
    ])
    .with_behavior(Behavior::FailFrom(50_000));
    // Segment 1 takes "weg" from segment 2, whose own window then fails.
    let request = EditRequest::new([("0", "Nur Deine"), ("1", "Weit weg"), ("2", "fort")]).unwrap();

    let err = handle
        .apply_edit(&request, &aligner, &CancellationToken::new())
        .await
        .unwrap_err();

    match &err {
        TimelineError::PartialRealign { committed, failed } => {
            assert_eq!(committed, &vec![TimeWindow::new(0, 2200)]);
            assert_eq!(failed.len(), 1);
        }
        other => panic!("expected partial realign, got {other:?}"),
    }
    let snapshot = handle.snapshot();
    snapshot.validate().unwrap();
    assert_eq!(snapshot.store().runs().len(), 2);
    assert_eq!(surfaces(&handle, "0"), vec!["Nur", "Deine"]);
    assert_eq!(surfaces(&handle, "1"), vec!["Weit", "weg"]);
    assert!(surfaces(&handle, "2").is_empty());

    aligner.set_behavior(Behavior::Transcribe);
    let response = handle
        .apply_edit(&request, &aligner, &CancellationToken::new())
        .await
        .unwrap();
    assert_eq!(response.action, EditAction::Realign);
    assert_eq!(surfaces(&handle, "1"), vec!["Weit", "weg"]);
    assert_eq!(surfaces(&handle, "2"), vec!["fort"]);
}

#[tokio::test]
async fn keep_committed_with_no_success_is_a_plain_failure() {
    let policy = TimelinePolicy::builder()
        .partial_windows(PartialWindowPolicy::KeepCommitted)
        .build();
    let handle = handle_for(&two_segments(), policy);
    let aligner = ScriptedAligner::new(heard_nur_deine()).with_behavior(Behavior::Fail);

    let err = handle
        .apply_edit(&nur_deine(), &aligner, &CancellationToken::new())
        .await
        .unwrap_err();

    assert!(matches!(err, TimelineError::Aligner { .. }));
    assert_eq!(handle.snapshot().store().runs().len(), 1);
}

#[tokio::test]
async fn realigned_words_can_carry_generated_syllables() {
    let policy = TimelinePolicy::builder().generate_syllables(true).build();
    let handle = handle_for(&two_segments(), policy);
    let aligner = ScriptedAligner::new(heard_nur_deine());

    let response = handle
        .apply_edit(&nur_deine(), &aligner, &CancellationToken::new())
        .await
        .unwrap();

    let deine = handle.words_for_segment("0").unwrap().remove(1);
    assert_eq!(deine.surface, "Deine");
    assert_eq!(deine.syllables.len(), 2);
    assert_eq!(deine.syllables.first().unwrap().start_ms, deine.start_ms);
    assert_eq!(deine.syllables.last().unwrap().end_ms, deine.end_ms);
    assert!(response.metrics.syllable_count >= 2);
}
