// Copyright 2026 Trialign Contributors
// SPDX-License-Identifier: Apache-2.0

//! Best-effort JSON mirror of job status snapshots.
//!
//! The in-memory registry is the source of truth; this mirror exists so
//! an operator can inspect job state after a restart. It carries no
//! consistency obligation back into the registry: a failed write is
//! logged and forgotten, never surfaced to the job.

use crate::registry::JobStatus;
use anyhow::{Context, Result};
use std::path::PathBuf;
use tracing::warn;

pub(crate) struct Mirror {
    dir: PathBuf,
}

impl Mirror {
    pub(crate) fn new(dir: PathBuf) -> Self {
        Self { dir }
    }

    /// Write `<job-id>.json`, overwriting any previous snapshot of the
    /// same job. Errors are logged at warn and swallowed.
    pub(crate) fn record(&self, status: &JobStatus) {
        if let Err(e) = self.write(status) {
            warn!(job_id = %status.job_id, error = %e, "failed to mirror job snapshot");
        }
    }

    fn write(&self, status: &JobStatus) -> Result<()> {
        std::fs::create_dir_all(&self.dir)
            .with_context(|| format!("creating snapshot dir {}", self.dir.display()))?;
        let path = self.dir.join(format!("{}.json", status.job_id));
        let data = serde_json::to_vec_pretty(status).context("serializing job snapshot")?;
        std::fs::write(&path, data)
            .with_context(|| format!("writing snapshot {}", path.display()))?;
        Ok(())
    }
}
