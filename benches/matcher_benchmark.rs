//! Matcher and boundary derivation throughput on long synthetic tracks.
//!
//! # Benchmarks
//!
//! - `match_batch_remap`: re-match an edit batch that existing words explain
//! - `match_batch_unresolved`: batch with one new word, forcing a partial match
//! - `segment_timings`: derive exposed timing for every segment
//!
//! # Running
//!
//! ```bash
//! cargo bench --bench matcher_benchmark
//! ```

use std::hint::black_box;

use chrono::{TimeZone, Utc};
use criterion::{BenchmarkId, Criterion, criterion_group, criterion_main};
use word_timeline_core::text::tokenize_words;
use word_timeline_core::timeline::{BatchSegment, Matcher, build_from_segments};
use word_timeline_core::{SourceSegment, SourceWord, TimelinePolicy, TrackTimeline};

/// `segments` lines of eight words each, 300 ms per word.
fn synthetic_track(segments: usize) -> TrackTimeline {
    let mut cursor = 0;
    let sources: Vec<SourceSegment> = (0..segments)
        .map(|seg| {
            let words: Vec<SourceWord> = (0..8)
                .map(|i| {
                    let word = SourceWord {
                        surface: format!("wort{seg}x{i}"),
                        start_ms: cursor,
                        end_ms: cursor + 280,
                        confidence: 0.9,
                    };
                    cursor += 300;
                    word
                })
                .collect();
            cursor += 500;
            SourceSegment {
                segment_id: seg.to_string(),
                text: words
                    .iter()
                    .map(|w| w.surface.as_str())
                    .collect::<Vec<_>>()
                    .join(" "),
                start_ms: words[0].start_ms,
                end_ms: words[7].end_ms,
                words,
            }
        })
        .collect();
    let at = Utc.timestamp_opt(0, 0).single().unwrap();
    build_from_segments("bench", &sources, &TimelinePolicy::default(), None, at)
        .unwrap()
        .timeline
}

fn batch(track: &TrackTimeline, positions: &[usize], replace_first: bool) -> Vec<BatchSegment> {
    positions
        .iter()
        .map(|&position| {
            let map = &track.maps().as_slice()[position];
            let mut text: Vec<String> = track
                .words_for_segment(&map.segment_id)
                .unwrap()
                .into_iter()
                .map(|w| w.surface)
                .collect();
            if replace_first {
                text[0] = "neu".to_string();
            }
            BatchSegment {
                segment_id: map.segment_id.clone(),
                position,
                tokens: tokenize_words(&text.join(" ")),
            }
        })
        .collect()
}

fn bench_match(c: &mut Criterion) {
    let mut group = c.benchmark_group("match_batch_remap");
    for size in [100usize, 1_000, 5_000] {
        let track = synthetic_track(size);
        let positions: Vec<usize> = (size / 2..size / 2 + 4).collect();
        let edits = batch(&track, &positions, false);
        group.bench_with_input(BenchmarkId::from_parameter(size), &edits, |b, edits| {
            let matcher = Matcher::new(
                track.store(),
                track.maps(),
                Default::default(),
                track.track_duration_ms(),
            );
            b.iter(|| black_box(matcher.match_batch(edits)));
        });
    }
    group.finish();

    let track = synthetic_track(1_000);
    let edits = batch(&track, &[500], true);
    c.bench_function("match_batch_unresolved", |b| {
        let matcher = Matcher::new(track.store(), track.maps(), Default::default(), None);
        b.iter(|| black_box(matcher.match_batch(&edits)));
    });
}

fn bench_timings(c: &mut Criterion) {
    let track = synthetic_track(1_000);
    let policy = TimelinePolicy::default();
    c.bench_function("segment_timings", |b| {
        b.iter(|| black_box(track.segment_timings(&policy.gap).unwrap()));
    });
}

criterion_group!(benches, bench_match, bench_timings);
criterion_main!(benches);
