//! Window Planner: turn unresolved time hints into bounded aligner windows.

use crate::types::{Millis, TimeWindow, WindowPolicy};

/// Pad, clamp and merge `hints`, then split into windows no longer than
/// `policy.max_window_ms`.
///
/// The result is ordered by start time and no two windows share more than
/// a boundary instant. When the
/// padded union fits in one window, exactly one window is produced;
/// otherwise clusters are packed greedily and a single cluster that is
/// itself too long is cut into equal chunks.
#[must_use]
pub fn plan_windows(
    hints: &[TimeWindow],
    policy: &WindowPolicy,
    track_duration_ms: Option<Millis>,
) -> Vec<TimeWindow> {
    let max_len = policy.max_window_ms.max(1);
    let clusters = merge(
        hints
            .iter()
            .map(|hint| pad_and_clamp(*hint, policy.padding_ms, track_duration_ms))
            .collect(),
    );
    let Some((first, last)) = clusters.first().zip(clusters.last()) else {
        return Vec::new();
    };

    let union = TimeWindow::new(first.start_ms, last.end_ms);
    if union.duration_ms() <= max_len {
        return vec![union];
    }

    let mut windows: Vec<TimeWindow> = Vec::new();
    for cluster in clusters {
        if cluster.duration_ms() > max_len {
            windows.extend(split_evenly(cluster, max_len));
            continue;
        }
        match windows.last_mut() {
            Some(open) if cluster.end_ms - open.start_ms <= max_len => {
                open.end_ms = cluster.end_ms;
            }
            _ => windows.push(cluster),
        }
    }

    tracing::debug!(
        plan.hints = hints.len(),
        plan.windows = windows.len(),
        plan.max_window_ms = max_len,
        "split oversized realign span"
    );
    windows
}

fn pad_and_clamp(hint: TimeWindow, padding: Millis, track_duration: Option<Millis>) -> TimeWindow {
    let mut start = hint.start_ms.saturating_sub(padding).max(0);
    let mut end = hint.end_ms.saturating_add(padding);
    if let Some(duration) = track_duration {
        end = end.min(duration);
        start = start.min(end);
    }
    TimeWindow::new(start, end.max(start))
}

/// Sort and fuse overlapping or touching windows.
fn merge(mut windows: Vec<TimeWindow>) -> Vec<TimeWindow> {
    windows.sort();
    let mut merged: Vec<TimeWindow> = Vec::with_capacity(windows.len());
    for window in windows {
        match merged.last_mut() {
            Some(last) if window.start_ms <= last.end_ms => {
                last.end_ms = last.end_ms.max(window.end_ms);
            }
            _ => merged.push(window),
        }
    }
    merged
}

/// Cut `window` into the fewest equal pieces of at most `max_len`.
///
/// Pieces are contiguous: each one starts exactly where the previous one
/// ends, so every millisecond of `window` belongs to a piece.
fn split_evenly(window: TimeWindow, max_len: Millis) -> Vec<TimeWindow> {
    let total = window.duration_ms();
    let pieces = (total + max_len - 1) / max_len;
    let step = (total + pieces - 1) / pieces;
    let mut out = Vec::new();
    let mut start = window.start_ms;
    while start < window.end_ms {
        let end = (start + step).min(window.end_ms);
        out.push(TimeWindow::new(start, end));
        start = end;
    }
    out
}
