// Copyright 2026 Trialign Contributors
// SPDX-License-Identifier: Apache-2.0

//! Alignment engine — pure numeric transformation from raw signal + event
//! streams into trial-aligned matrices.
//!
//! The engine does no I/O and knows nothing about jobs or concurrency; it
//! only polls the [`RunControl`] seam between trials so a registry can
//! cancel it cooperatively and observe progress. Two modes exist:
//!
//! - **single-event**: one anchor point per trial, fixed window around it
//!   ([`single`]);
//! - **multi-event**: a template of consecutive event labels, piecewise
//!   time-warping between landmarks ([`warp`]).
//!
//! All floating computation is `f64`; out-of-range bins carry `f64::NAN`.

pub mod single;
pub mod warp;

use crate::error::{Error, Result};
use crate::series::{AlignedMatrix, EventSeries, SignalSeries};
use serde::{Deserialize, Serialize};

/// Guard against division by a near-zero baseline spread.
const BASELINE_EPS: f64 = 1e-10;

/// Per-trial normalization choice. Baseline statistics always come from
/// the pre-anchor segment only, never the full trial, so event-driven
/// transients cannot leak into the baseline.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Normalization {
    /// Raw interpolated values.
    #[default]
    None,
    /// `(x - baseline_mean) / baseline_std`.
    ZScore,
    /// `(x - baseline_mean) / baseline_mean * 100`.
    PercentChange,
}

/// Which alignment algorithm to run.
#[derive(Debug, Clone, PartialEq)]
pub enum Mode {
    /// Anchor every occurrence of `trigger`, extract
    /// `[-pre_window, +post_window]` resampled to `bin_count` bins.
    SingleEvent {
        trigger: String,
        pre_window: f64,
        post_window: f64,
        bin_count: usize,
    },
    /// Match maximal in-order runs of `template` labels; resample each
    /// inter-event segment to its entry in `segment_bins`
    /// (`segment_bins.len() == template.len() - 1`).
    MultiEvent {
        template: Vec<String>,
        segment_bins: Vec<usize>,
    },
}

/// Full engine configuration. Validated once, before any data is touched
/// and before any job is created.
#[derive(Debug, Clone, PartialEq)]
pub struct EngineConfig {
    pub mode: Mode,
    pub normalization: Normalization,
}

impl EngineConfig {
    /// Fail fast on malformed parameters so user-input mistakes are never
    /// observed as `Failed` jobs.
    pub fn validate(&self) -> Result<()> {
        match &self.mode {
            Mode::SingleEvent {
                trigger,
                pre_window,
                post_window,
                bin_count,
            } => {
                if trigger.is_empty() {
                    return Err(Error::InvalidConfiguration(
                        "trigger event label must not be empty".into(),
                    ));
                }
                if !pre_window.is_finite() || *pre_window <= 0.0 {
                    return Err(Error::InvalidConfiguration(format!(
                        "preWindow must be positive, got {pre_window}"
                    )));
                }
                if !post_window.is_finite() || *post_window <= 0.0 {
                    return Err(Error::InvalidConfiguration(format!(
                        "postWindow must be positive, got {post_window}"
                    )));
                }
                if *bin_count == 0 {
                    return Err(Error::InvalidConfiguration(
                        "binCount must be a positive integer".into(),
                    ));
                }
            }
            Mode::MultiEvent {
                template,
                segment_bins,
            } => {
                if template.len() < 2 {
                    return Err(Error::InvalidConfiguration(format!(
                        "template needs at least 2 event labels, got {}",
                        template.len()
                    )));
                }
                if template.iter().any(|l| l.is_empty()) {
                    return Err(Error::InvalidConfiguration(
                        "template labels must not be empty".into(),
                    ));
                }
                if segment_bins.len() != template.len() - 1 {
                    return Err(Error::InvalidConfiguration(format!(
                        "expected {} segment bin counts for a {}-event template, got {}",
                        template.len() - 1,
                        template.len(),
                        segment_bins.len()
                    )));
                }
                if segment_bins.iter().any(|&b| b == 0) {
                    return Err(Error::InvalidConfiguration(
                        "segment bin counts must be positive integers".into(),
                    ));
                }
            }
        }
        Ok(())
    }
}

/// Cooperative control seam between the engine and whoever runs it.
///
/// The engine polls `is_cancelled` between trials (the only safe points —
/// a trial's numeric work is uninterruptible) and reports coarse progress
/// once per trial. Both hooks default to no-ops so pure-computation
/// callers and tests can pass [`NoControl`].
pub trait RunControl: Sync {
    fn is_cancelled(&self) -> bool {
        false
    }
    fn on_progress(&self, _percent: u8) {}
}

/// Inert control for direct engine invocation.
pub struct NoControl;

impl RunControl for NoControl {}

/// Run the configured alignment over one signal/event pair.
///
/// An empty signal or empty event stream yields a zero-row matrix over
/// the full relative-time axis — "no trials" is a valid outcome, not an
/// error. The configuration is re-validated here, so direct callers get
/// the same `InvalidConfiguration` errors as orchestrated ones.
pub fn align(
    signal: &SignalSeries,
    events: &EventSeries,
    config: &EngineConfig,
    control: &dyn RunControl,
) -> Result<AlignedMatrix> {
    config.validate()?;
    let mut matrix = match &config.mode {
        Mode::SingleEvent {
            trigger,
            pre_window,
            post_window,
            bin_count,
        } => single::align(
            signal,
            events,
            trigger,
            *pre_window,
            *post_window,
            *bin_count,
            config.normalization,
            control,
        )?,
        Mode::MultiEvent {
            template,
            segment_bins,
        } => warp::align(
            signal,
            events,
            template,
            segment_bins,
            config.normalization,
            control,
        )?,
    };
    matrix.compute_summary();
    Ok(matrix)
}

/// Linearly interpolate the signal at absolute time `t`.
///
/// Returns `None` outside `[first, last]`. A query landing exactly on a
/// raw sample resolves to the later bracketing segment (taking the sample
/// itself as its left endpoint), which is deterministic and yields the
/// sample value exactly.
pub(crate) fn sample_at(signal: &SignalSeries, t: f64) -> Option<f64> {
    let ts = &signal.timestamps;
    if ts.is_empty() {
        return None;
    }
    let idx = ts.partition_point(|&s| s <= t);
    if idx == 0 {
        return None; // before the recording starts
    }
    let left = idx - 1;
    if ts[left] == t {
        return Some(signal.values[left]);
    }
    if idx == ts.len() {
        return None; // past the recording end
    }
    let (t0, t1) = (ts[left], ts[idx]);
    let (v0, v1) = (signal.values[left], signal.values[idx]);
    let frac = (t - t0) / (t1 - t0);
    Some(v0 + frac * (v1 - v0))
}

/// Normalize one trial row in place against its baseline bins.
///
/// Baseline statistics use only the finite values inside
/// `baseline_range`; if none exist (fully out-of-range baseline), the row
/// is left untouched — it is already flagged invalid by the caller.
pub(crate) fn normalize_row(
    row: &mut [f64],
    baseline_range: std::ops::Range<usize>,
    norm: Normalization,
) {
    if norm == Normalization::None {
        return;
    }
    let baseline: Vec<f64> = row[baseline_range]
        .iter()
        .copied()
        .filter(|v| v.is_finite())
        .collect();
    if baseline.is_empty() {
        return;
    }
    let n = baseline.len() as f64;
    let mean = baseline.iter().sum::<f64>() / n;
    match norm {
        Normalization::None => unreachable!(),
        Normalization::ZScore => {
            let var = baseline.iter().map(|v| (v - mean) * (v - mean)).sum::<f64>() / n;
            let std = var.sqrt();
            for v in row.iter_mut() {
                *v = if std > BASELINE_EPS {
                    (*v - mean) / std
                } else {
                    *v - mean
                };
            }
        }
        Normalization::PercentChange => {
            for v in row.iter_mut() {
                *v = if mean.abs() > BASELINE_EPS {
                    (*v - mean) / mean * 100.0
                } else {
                    *v - mean
                };
            }
        }
    }
}

/// Subtract a scaled control channel from the signal channel.
///
/// Fits `signal ≈ k · control` by least squares over the first
/// `baseline_len` samples and returns `signal - k · control` on the same
/// timestamps. This is the isosbestic-control correction applied to
/// fluorescence recordings before alignment; it is optional preprocessing
/// and not part of [`EngineConfig`].
pub fn correct_with_control(
    signal: &SignalSeries,
    control: &SignalSeries,
    baseline_len: usize,
) -> Result<SignalSeries> {
    if signal.len() != control.len() {
        return Err(Error::InvalidConfiguration(format!(
            "signal and control lengths differ: {} vs {}",
            signal.len(),
            control.len()
        )));
    }
    if baseline_len < 2 || baseline_len > signal.len() {
        return Err(Error::InvalidConfiguration(format!(
            "control-fit baseline must cover 2..=len samples, got {baseline_len}"
        )));
    }

    let xs = &control.values[..baseline_len];
    let ys = &signal.values[..baseline_len];
    let n = baseline_len as f64;
    let mx = xs.iter().sum::<f64>() / n;
    let my = ys.iter().sum::<f64>() / n;
    let cov: f64 = xs.iter().zip(ys).map(|(x, y)| (x - mx) * (y - my)).sum();
    let var: f64 = xs.iter().map(|x| (x - mx) * (x - mx)).sum();
    let k = if var > BASELINE_EPS { cov / var } else { 1.0 };

    let values = signal
        .values
        .iter()
        .zip(&control.values)
        .map(|(s, c)| s - k * c)
        .collect();
    Ok(SignalSeries::new(signal.timestamps.clone(), values))
}
