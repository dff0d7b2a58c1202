// Copyright 2026 Trialign Contributors
// SPDX-License-Identifier: Apache-2.0

//! Analysis orchestrator — thin coordination between the selector, the
//! external data layer, the engine, and the job registry.
//!
//! A submission resolves the tag expression into concrete datasets,
//! loads their series through the [`DataProvider`] seam, and enqueues
//! one background job that aligns every selected dataset. Configuration
//! and expression errors are rejected synchronously, before a job id
//! exists, so the job state machine never carries user-input noise.

use crate::engine::{self, EngineConfig, Mode, Normalization, RunControl};
use crate::error::{Error, Result};
use crate::registry::{JobHandle, JobId, JobRegistry, JobStatus};
use crate::selector::{EntityId, TagExpression, TagId};
use crate::series::{AlignedMatrix, EventSeries, SignalSeries};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::sync::Arc;
use tracing::info;

/// Alignment parameters as they arrive on the wire.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "mode", rename_all = "kebab-case")]
pub enum AlignmentSpec {
    #[serde(rename_all = "camelCase")]
    SingleEvent {
        trigger: String,
        pre_window: f64,
        post_window: f64,
        bin_count: usize,
    },
    #[serde(rename_all = "camelCase")]
    MultiEvent {
        template: Vec<String>,
        segment_bins: Vec<usize>,
    },
}

/// One analysis submission as it arrives on the wire.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnalysisRequest {
    #[serde(flatten)]
    pub alignment: AlignmentSpec,
    #[serde(default)]
    pub normalization: Normalization,
    /// OR-of-ANDs tag selection; validated during deserialization.
    pub selection: TagExpression,
}

impl AnalysisRequest {
    /// Translate into a validated engine configuration. Fails with
    /// `InvalidConfiguration` before any job slot is consumed.
    pub fn engine_config(&self) -> Result<EngineConfig> {
        let mode = match &self.alignment {
            AlignmentSpec::SingleEvent {
                trigger,
                pre_window,
                post_window,
                bin_count,
            } => Mode::SingleEvent {
                trigger: trigger.clone(),
                pre_window: *pre_window,
                post_window: *post_window,
                bin_count: *bin_count,
            },
            AlignmentSpec::MultiEvent {
                template,
                segment_bins,
            } => Mode::MultiEvent {
                template: template.clone(),
                segment_bins: segment_bins.clone(),
            },
        };
        let config = EngineConfig {
            mode,
            normalization: self.normalization,
        };
        config.validate()?;
        Ok(config)
    }
}

/// The aligned matrix for one selected dataset.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DatasetResult {
    pub entity_id: EntityId,
    #[serde(flatten)]
    pub matrix: AlignedMatrix,
}

/// Full job payload: one result per selected dataset, in selection
/// order. Empty when the expression matched nothing — a valid outcome.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnalysisOutput {
    pub datasets: Vec<DatasetResult>,
}

/// External persistence/file collaborator. The core never touches
/// storage directly; it sees tag sets and pre-parsed numeric series.
#[async_trait]
pub trait DataProvider: Send + Sync {
    /// All candidate entities with their tag sets, already unique.
    async fn tagged_entities(&self) -> Result<Vec<(EntityId, HashSet<TagId>)>>;

    /// Load the signal/label pair for one entity. Timestamps are already
    /// numeric and strictly increasing (file-format validation happens
    /// upstream).
    async fn load_series(&self, entity: EntityId) -> Result<(SignalSeries, EventSeries)>;
}

/// Scales one dataset's 0–100 progress into its slice of the whole
/// job's range, and forwards cancellation unchanged.
struct ScaledControl<'a> {
    inner: &'a JobHandle<AnalysisOutput>,
    index: usize,
    total: usize,
}

impl RunControl for ScaledControl<'_> {
    fn is_cancelled(&self) -> bool {
        self.inner.is_cancel_requested()
    }

    fn on_progress(&self, percent: u8) {
        let overall = (self.index * 100 + percent as usize) / self.total;
        self.inner.report_progress(overall as u8);
    }
}

/// Coordinates analysis submissions end to end.
pub struct AnalysisOrchestrator<P> {
    provider: Arc<P>,
    registry: Arc<JobRegistry<AnalysisOutput>>,
}

impl<P: DataProvider + 'static> AnalysisOrchestrator<P> {
    pub fn new(provider: Arc<P>, registry: Arc<JobRegistry<AnalysisOutput>>) -> Self {
        Self { provider, registry }
    }

    /// Validate, resolve, load, and enqueue. Returns the job id as soon
    /// as the work is queued; the alignment itself runs in the
    /// background and is observed by polling [`status`].
    ///
    /// [`status`]: AnalysisOrchestrator::status
    pub async fn submit(&self, owner: &str, request: AnalysisRequest) -> Result<JobId> {
        // Fail fast: no job id is ever issued for malformed input.
        let config = request.engine_config()?;

        let entities = self.provider.tagged_entities().await?;
        let selected = request.selection.filter(&entities);
        info!(
            owner,
            candidates = entities.len(),
            selected = selected.len(),
            "resolved dataset selection"
        );

        let mut datasets: Vec<(EntityId, SignalSeries, EventSeries)> =
            Vec::with_capacity(selected.len());
        for entity in selected {
            let (signal, events) = self.provider.load_series(entity).await?;
            datasets.push((entity, signal, events));
        }

        let id = self.registry.submit(owner, move |handle| {
            let total = datasets.len().max(1);
            let mut results = Vec::with_capacity(datasets.len());
            for (index, (entity, signal, events)) in datasets.into_iter().enumerate() {
                let control = ScaledControl {
                    inner: handle,
                    index,
                    total,
                };
                let matrix = engine::align(&signal, &events, &config, &control)?;
                results.push(DatasetResult {
                    entity_id: entity,
                    matrix,
                });
            }
            handle.report_progress(100);
            Ok(AnalysisOutput { datasets: results })
        });
        Ok(id)
    }

    pub fn status(&self, id: JobId) -> Result<JobStatus> {
        self.registry.status(id)
    }

    pub fn result(&self, id: JobId) -> Result<Arc<AnalysisOutput>> {
        self.registry.result(id)
    }

    pub fn cancel(&self, id: JobId) -> Result<()> {
        self.registry.cancel(id)
    }
}
