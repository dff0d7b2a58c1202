// Copyright 2026 Trialign Contributors
// SPDX-License-Identifier: Apache-2.0

//! Multi-event alignment: piecewise linear time-warping across an event
//! template.
//!
//! A template is an ordered sequence of event labels (cue → delay →
//! reward). Each maximal in-order run of those labels becomes one trial;
//! every inter-event segment is resampled to its configured bin count and
//! the segments are concatenated. Variable inter-event durations thus
//! land on a common axis with the event boundaries aligned across every
//! trial — the defining difference from single-event mode, which anchors
//! only one point per trial.
//!
//! A run the data ends before completing is structurally incomplete and
//! contributes no row (unlike out-of-range trials, which keep a flagged
//! row).

use super::{normalize_row, sample_at, Normalization, RunControl};
use crate::error::{Error, Result};
use crate::series::{AlignedMatrix, EventSeries, SignalSeries, TrialMeta};
use tracing::debug;

/// One matched template run: the boundary timestamps, in template order.
#[derive(Debug, Clone, PartialEq)]
struct TemplateRun {
    boundaries: Vec<f64>,
}

/// Scan the event stream for maximal in-order template runs.
///
/// A run opens at a `template[0]` event and advances one step per
/// matching label. A template label arriving out of order aborts the
/// current run (and immediately opens a new one if it is `template[0]`);
/// labels outside the template are ignored. A run still open when the
/// stream ends is discarded.
fn match_runs(events: &EventSeries, template: &[String]) -> Vec<TemplateRun> {
    let mut runs = Vec::new();
    let mut current: Vec<f64> = Vec::new();

    for event in &events.events {
        let expected = &template[current.len()];
        if event.label == *expected {
            current.push(event.timestamp);
            if current.len() == template.len() {
                runs.push(TemplateRun {
                    boundaries: std::mem::take(&mut current),
                });
            }
        } else if template.contains(&event.label) {
            current.clear();
            if event.label == template[0] {
                current.push(event.timestamp);
            }
        }
    }

    runs
}

pub(super) fn align(
    signal: &SignalSeries,
    events: &EventSeries,
    template: &[String],
    segment_bins: &[usize],
    normalization: Normalization,
    control: &dyn RunControl,
) -> Result<AlignedMatrix> {
    // Axis in segment units: segment j occupies [j, j+1), its bins at
    // j + i/bins_j. Event boundary k therefore sits at axis value k in
    // every trial.
    let axis: Vec<f64> = segment_bins
        .iter()
        .enumerate()
        .flat_map(|(j, &bins)| (0..bins).map(move |i| j as f64 + i as f64 / bins as f64))
        .collect();

    if signal.is_empty() || events.is_empty() {
        debug!("empty input, producing zero-trial matrix");
        return Ok(AlignedMatrix::empty(axis));
    }

    let runs = match_runs(events, template);
    let total = runs.len();
    let mut matrix = AlignedMatrix::empty(axis);

    for (done, run) in runs.into_iter().enumerate() {
        if control.is_cancelled() {
            return Err(Error::Cancelled(format!(
                "cancelled after {done}/{total} trials"
            )));
        }

        let mut row = Vec::with_capacity(matrix.bin_count());
        let mut valid = true;
        for (j, &bins) in segment_bins.iter().enumerate() {
            let (start, end) = (run.boundaries[j], run.boundaries[j + 1]);
            let step = (end - start) / bins as f64;
            for i in 0..bins {
                match sample_at(signal, start + i as f64 * step) {
                    Some(v) => row.push(v),
                    None => {
                        row.push(f64::NAN);
                        valid = false;
                    }
                }
            }
        }
        // Baseline for normalization is the first segment — the stretch
        // leading up to the second landmark.
        normalize_row(&mut row, 0..segment_bins[0], normalization);

        matrix.rows.push(row);
        matrix.trials.push(TrialMeta {
            anchor_timestamp: run.boundaries[0],
            event_label: template[0].clone(),
            valid,
        });
        control.on_progress((((done + 1) * 100) / total) as u8);
    }

    debug!(
        template = ?template,
        trials = matrix.trial_count(),
        bins = matrix.bin_count(),
        "multi-event alignment complete"
    );
    Ok(matrix)
}
