// Copyright 2026 Trialign Contributors
// SPDX-License-Identifier: Apache-2.0

//! Core data shapes: raw input series and the aligned output matrix.
//!
//! The series types are produced by an external CSV-reading collaborator;
//! the engine assumes timestamps are already numeric and strictly
//! increasing and treats both series as read-only for its lifetime.

use serde::{Deserialize, Serialize};

/// One continuous recording channel: ordered `(timestamp, value)` pairs
/// with strictly increasing timestamps.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SignalSeries {
    pub timestamps: Vec<f64>,
    pub values: Vec<f64>,
}

impl SignalSeries {
    /// Build a series from parallel timestamp/value vectors.
    ///
    /// Callers upstream have already validated file format; this only
    /// guards the structural assumptions the interpolator relies on.
    pub fn new(timestamps: Vec<f64>, values: Vec<f64>) -> Self {
        debug_assert_eq!(timestamps.len(), values.len());
        debug_assert!(timestamps.windows(2).all(|w| w[0] < w[1]));
        Self { timestamps, values }
    }

    pub fn len(&self) -> usize {
        self.timestamps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.timestamps.is_empty()
    }

    /// Time span covered by the recording, if non-empty.
    pub fn span(&self) -> Option<(f64, f64)> {
        match (self.timestamps.first(), self.timestamps.last()) {
            (Some(&a), Some(&b)) => Some((a, b)),
            _ => None,
        }
    }
}

/// A single behavioral event: when it happened and what it was labeled.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Event {
    pub timestamp: f64,
    pub label: String,
}

/// Ordered behavioral event stream. Multiple event types may be
/// interleaved; spacing is irregular.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EventSeries {
    pub events: Vec<Event>,
}

impl EventSeries {
    pub fn new(events: Vec<Event>) -> Self {
        Self { events }
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }
}

/// Per-trial metadata attached to each matrix row.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TrialMeta {
    /// Absolute timestamp of the anchoring event (first template event in
    /// multi-event mode).
    pub anchor_timestamp: f64,
    /// Label of the anchoring event.
    pub event_label: String,
    /// False when any part of the extraction window fell outside the
    /// recorded signal; such rows keep their place but carry NaN bins.
    pub valid: bool,
}

/// Trial-aligned result matrix: `rows[trial][bin]`, a shared relative-time
/// axis, and per-trial metadata. Row count always equals `trials.len()` —
/// invalid trials are flagged, never dropped, so row indices stay in
/// correspondence with the event list.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AlignedMatrix {
    #[serde(rename = "matrix")]
    pub rows: Vec<Vec<f64>>,
    /// Relative-time axis shared by every row. Seconds relative to the
    /// anchor in single-event mode; segment units in multi-event mode.
    pub relative_time_axis: Vec<f64>,
    #[serde(rename = "perTrialMetadata")]
    pub trials: Vec<TrialMeta>,
    /// Per-bin mean across valid trials (NaN where no trial contributes).
    pub mean: Vec<f64>,
    /// Per-bin standard error of the mean across valid trials.
    pub sem: Vec<f64>,
}

impl AlignedMatrix {
    /// An empty (zero-trial) matrix over the given axis. "No trials" is a
    /// representable success, not a failure.
    pub fn empty(relative_time_axis: Vec<f64>) -> Self {
        let bins = relative_time_axis.len();
        Self {
            rows: Vec::new(),
            relative_time_axis,
            trials: Vec::new(),
            mean: vec![f64::NAN; bins],
            sem: vec![f64::NAN; bins],
        }
    }

    pub fn trial_count(&self) -> usize {
        self.rows.len()
    }

    pub fn bin_count(&self) -> usize {
        self.relative_time_axis.len()
    }

    /// Recompute the summary curves from the current rows. Only finite
    /// samples from valid trials contribute; bins with no contributors
    /// stay NaN.
    pub fn compute_summary(&mut self) {
        let bins = self.bin_count();
        let mut mean = vec![f64::NAN; bins];
        let mut sem = vec![f64::NAN; bins];

        for bin in 0..bins {
            let samples: Vec<f64> = self
                .rows
                .iter()
                .zip(&self.trials)
                .filter(|(_, meta)| meta.valid)
                .map(|(row, _)| row[bin])
                .filter(|v| v.is_finite())
                .collect();
            if samples.is_empty() {
                continue;
            }
            let n = samples.len() as f64;
            let m = samples.iter().sum::<f64>() / n;
            mean[bin] = m;
            if samples.len() > 1 {
                let var = samples.iter().map(|v| (v - m) * (v - m)).sum::<f64>() / n;
                sem[bin] = var.sqrt() / n.sqrt();
            } else {
                sem[bin] = 0.0;
            }
        }

        self.mean = mean;
        self.sem = sem;
    }
}
