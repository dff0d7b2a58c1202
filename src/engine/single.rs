// Copyright 2026 Trialign Contributors
// SPDX-License-Identifier: Apache-2.0

//! Single-event alignment: one anchor per trial.
//!
//! Every occurrence of the trigger label becomes one matrix row. The
//! signal is resampled onto a fixed relative-time axis spanning
//! `[-pre_window, +post_window]` by linear interpolation. Trials whose
//! window leaves the recorded range keep their row — out-of-range bins
//! are NaN and the trial is flagged invalid — so row indices always
//! correspond to the trigger occurrence list.

use super::{normalize_row, sample_at, Normalization, RunControl};
use crate::error::{Error, Result};
use crate::series::{AlignedMatrix, EventSeries, SignalSeries, TrialMeta};
use tracing::debug;

/// Build the shared relative-time axis: `bin_count` evenly spaced points
/// from `-pre` to `+post`, both endpoints included. A single-bin axis
/// degenerates to the anchor itself.
fn relative_axis(pre: f64, post: f64, bin_count: usize) -> Vec<f64> {
    if bin_count == 1 {
        return vec![0.0];
    }
    let step = (pre + post) / (bin_count as f64 - 1.0);
    (0..bin_count).map(|i| -pre + i as f64 * step).collect()
}

#[allow(clippy::too_many_arguments)]
pub(super) fn align(
    signal: &SignalSeries,
    events: &EventSeries,
    trigger: &str,
    pre_window: f64,
    post_window: f64,
    bin_count: usize,
    normalization: Normalization,
    control: &dyn RunControl,
) -> Result<AlignedMatrix> {
    let axis = relative_axis(pre_window, post_window, bin_count);

    if signal.is_empty() || events.is_empty() {
        debug!(trigger, "empty input, producing zero-trial matrix");
        return Ok(AlignedMatrix::empty(axis));
    }

    let anchors: Vec<&crate::series::Event> = events
        .events
        .iter()
        .filter(|e| e.label == trigger)
        .collect();
    let total = anchors.len();
    // Bins strictly before the anchor; baseline statistics never include
    // the anchor bin or anything after it.
    let baseline_bins = axis.partition_point(|&t| t < 0.0);

    let mut matrix = AlignedMatrix::empty(axis);
    for (done, event) in anchors.into_iter().enumerate() {
        if control.is_cancelled() {
            return Err(Error::Cancelled(format!(
                "cancelled after {done}/{total} trials"
            )));
        }

        let mut row = Vec::with_capacity(bin_count);
        let mut valid = true;
        for &rel in &matrix.relative_time_axis {
            match sample_at(signal, event.timestamp + rel) {
                Some(v) => row.push(v),
                None => {
                    row.push(f64::NAN);
                    valid = false;
                }
            }
        }
        normalize_row(&mut row, 0..baseline_bins, normalization);

        matrix.rows.push(row);
        matrix.trials.push(TrialMeta {
            anchor_timestamp: event.timestamp,
            event_label: event.label.clone(),
            valid,
        });
        control.on_progress((((done + 1) * 100) / total) as u8);
    }

    debug!(
        trigger,
        trials = matrix.trial_count(),
        bins = matrix.bin_count(),
        "single-event alignment complete"
    );
    Ok(matrix)
}

#[cfg(test)]
mod tests {
    use crate::engine::{align, EngineConfig, Mode, NoControl, Normalization};
    use crate::series::{Event, EventSeries, SignalSeries};

    /// 10 Hz recording: `n` samples at 0.1 s spacing, values = index.
    fn recording(n: usize) -> SignalSeries {
        let timestamps: Vec<f64> = (0..n).map(|i| i as f64 * 0.1).collect();
        let values: Vec<f64> = (0..n).map(|i| i as f64).collect();
        SignalSeries::new(timestamps, values)
    }

    fn triggers(times: &[f64]) -> EventSeries {
        EventSeries::new(
            times
                .iter()
                .map(|&t| Event {
                    timestamp: t,
                    label: "lick".into(),
                })
                .collect(),
        )
    }

    fn config(pre: f64, post: f64, bins: usize, norm: Normalization) -> EngineConfig {
        EngineConfig {
            mode: Mode::SingleEvent {
                trigger: "lick".into(),
                pre_window: pre,
                post_window: post,
                bin_count: bins,
            },
            normalization: norm,
        }
    }

    #[test]
    fn test_all_inside_range_yields_fully_valid_rows() {
        let matrix = align(
            &recording(100),
            &triggers(&[3.0, 5.0]),
            &config(2.0, 2.0, 40, Normalization::None),
            &NoControl,
        )
        .unwrap();
        assert_eq!(matrix.trial_count(), 2);
        assert_eq!(matrix.relative_time_axis.len(), 40);
        for (row, meta) in matrix.rows.iter().zip(&matrix.trials) {
            assert!(meta.valid);
            assert!(row.iter().all(|v| v.is_finite()));
        }
    }

    #[test]
    fn test_ten_hz_scenario_marks_late_trigger_invalid() {
        // 100 samples (0..9.9 s), triggers at 3/5/8 s. The 8 s trial's
        // post-window reaches 10.0 s, past the last sample at 9.9 s.
        let matrix = align(
            &recording(100),
            &triggers(&[3.0, 5.0, 8.0]),
            &config(2.0, 2.0, 40, Normalization::None),
            &NoControl,
        )
        .unwrap();
        assert_eq!(matrix.trial_count(), 3);
        assert!(matrix.trials[0].valid);
        assert!(matrix.trials[1].valid);
        assert!(!matrix.trials[2].valid);
        // Row is present, with NaN only in the out-of-range tail.
        let late = &matrix.rows[2];
        assert_eq!(late.len(), 40);
        assert!(late.last().unwrap().is_nan());
        assert!(late[0].is_finite());
    }

    #[test]
    fn test_invalid_rows_are_kept_not_dropped() {
        let matrix = align(
            &recording(100),
            &triggers(&[0.5, 5.0]),
            &config(2.0, 2.0, 10, Normalization::None),
            &NoControl,
        )
        .unwrap();
        // The 0.5 s trigger's pre-window starts at -1.5 s: invalid but
        // still row 0, keeping index correspondence with the event list.
        assert_eq!(matrix.trial_count(), 2);
        assert!(!matrix.trials[0].valid);
        assert!(matrix.trials[1].valid);
        assert_eq!(matrix.trials[0].anchor_timestamp, 0.5);
    }

    #[test]
    fn test_interpolated_values_follow_the_ramp() {
        // Signal value is 10·t, so the aligned row around anchor a is
        // 10·(a + rel) at every bin.
        let matrix = align(
            &recording(100),
            &triggers(&[5.0]),
            &config(1.0, 1.0, 21, Normalization::None),
            &NoControl,
        )
        .unwrap();
        for (rel, v) in matrix.relative_time_axis.iter().zip(&matrix.rows[0]) {
            assert!((v - 10.0 * (5.0 + rel)).abs() < 1e-9);
        }
    }

    #[test]
    fn test_empty_events_is_zero_row_success() {
        let matrix = align(
            &recording(100),
            &EventSeries::default(),
            &config(2.0, 2.0, 40, Normalization::None),
            &NoControl,
        )
        .unwrap();
        assert_eq!(matrix.trial_count(), 0);
        assert_eq!(matrix.bin_count(), 40);
    }

    #[test]
    fn test_empty_signal_is_zero_row_success() {
        let matrix = align(
            &SignalSeries::default(),
            &triggers(&[1.0]),
            &config(1.0, 1.0, 8, Normalization::None),
            &NoControl,
        )
        .unwrap();
        assert_eq!(matrix.trial_count(), 0);
        assert_eq!(matrix.bin_count(), 8);
    }

    #[test]
    fn test_no_matching_trigger_label() {
        let events = EventSeries::new(vec![Event {
            timestamp: 5.0,
            label: "tone".into(),
        }]);
        let matrix = align(
            &recording(100),
            &events,
            &config(1.0, 1.0, 10, Normalization::None),
            &NoControl,
        )
        .unwrap();
        assert_eq!(matrix.trial_count(), 0);
    }

    #[test]
    fn test_zscore_baseline_from_pre_window_only() {
        // Flat pre-window (value 1.0 before t=5), step to 3.0 after.
        let timestamps: Vec<f64> = (0..100).map(|i| i as f64 * 0.1).collect();
        let values: Vec<f64> = timestamps
            .iter()
            .map(|&t| if t < 5.0 { 1.0 } else { 3.0 })
            .collect();
        let signal = SignalSeries::new(timestamps, values);
        let matrix = align(
            &signal,
            &triggers(&[5.0]),
            &config(2.0, 2.0, 41, Normalization::ZScore),
            &NoControl,
        )
        .unwrap();
        // Pre-window is constant, so std collapses to the mean-subtraction
        // fallback: pre bins → 0, post bins → 2.
        let row = &matrix.rows[0];
        assert!((row[0]).abs() < 1e-9);
        assert!((row[40] - 2.0).abs() < 1e-9);
    }

    #[test]
    fn test_percent_change_against_pre_window_mean() {
        let timestamps: Vec<f64> = (0..100).map(|i| i as f64 * 0.1).collect();
        let values: Vec<f64> = timestamps
            .iter()
            .map(|&t| if t < 5.0 { 2.0 } else { 3.0 })
            .collect();
        let signal = SignalSeries::new(timestamps, values);
        let matrix = align(
            &signal,
            &triggers(&[5.0]),
            &config(2.0, 2.0, 41, Normalization::PercentChange),
            &NoControl,
        )
        .unwrap();
        let row = &matrix.rows[0];
        assert!((row[0]).abs() < 1e-9);
        assert!((row[40] - 50.0).abs() < 1e-9);
    }

    #[test]
    fn test_summary_curves_present() {
        let matrix = align(
            &recording(100),
            &triggers(&[3.0, 5.0]),
            &config(1.0, 1.0, 11, Normalization::None),
            &NoControl,
        )
        .unwrap();
        assert_eq!(matrix.mean.len(), 11);
        // Two ramp trials at anchors 3 and 5 → mean at rel=0 is 10·4.
        let mid = matrix.relative_time_axis.iter().position(|&t| t == 0.0).unwrap();
        assert!((matrix.mean[mid] - 40.0).abs() < 1e-9);
    }
}
