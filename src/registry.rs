// Copyright 2026 Trialign Contributors
// SPDX-License-Identifier: Apache-2.0

//! Job registry — concurrent store of analysis-job state and the only
//! mutation path for it.
//!
//! Every submitted job lives in a `DashMap` keyed by its opaque id. The
//! mutation discipline is snapshot-replace: each transition builds the
//! complete successor [`Job`] under the entry lock and publishes it in
//! one assignment, so a concurrent `status`/`result` reader can never
//! observe a half-updated job (e.g. `Succeeded` with no payload yet).
//!
//! Work runs on `spawn_blocking` (the engine is CPU-bound); `submit`
//! returns the job id immediately and completion is detected by polling,
//! never by blocking. Cancellation is cooperative: a flag the engine
//! polls between trials via the [`RunControl`] seam.

use crate::engine::RunControl;
use crate::error::{Error, Result};
use crate::mirror::Mirror;
use chrono::{DateTime, Duration, Utc};
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

/// Opaque job identifier, generated at submission, immutable.
pub type JobId = Uuid;

/// Job lifecycle states. `Succeeded`, `Failed`, and `Cancelled` are
/// terminal: once reached, the job never mutates again (except removal by
/// retention cleanup).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobState {
    Queued,
    Running,
    Succeeded,
    Failed,
    Cancelled,
}

impl JobState {
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            JobState::Succeeded | JobState::Failed | JobState::Cancelled
        )
    }

    /// The legal transition graph. Everything else is a registry bug.
    fn can_transition(self, to: JobState) -> bool {
        matches!(
            (self, to),
            (JobState::Queued, JobState::Running)
                | (JobState::Queued, JobState::Cancelled)
                | (JobState::Running, JobState::Succeeded)
                | (JobState::Running, JobState::Failed)
                | (JobState::Running, JobState::Cancelled)
        )
    }
}

/// Terminal payload: either the computed output or the captured error.
#[derive(Debug)]
enum Payload<T> {
    Output(Arc<T>),
    Error(Error),
}

// Manual impl: cloning shares the Arc, so `T: Clone` is not required.
impl<T> Clone for Payload<T> {
    fn clone(&self) -> Self {
        match self {
            Payload::Output(out) => Payload::Output(Arc::clone(out)),
            Payload::Error(e) => Payload::Error(e.clone()),
        }
    }
}

/// One job's full state snapshot. Cloned wholesale on every transition.
#[derive(Debug)]
struct Job<T> {
    id: JobId,
    owner: String,
    state: JobState,
    progress: u8,
    created_at: DateTime<Utc>,
    started_at: Option<DateTime<Utc>>,
    finished_at: Option<DateTime<Utc>>,
    payload: Option<Payload<T>>,
}

impl<T> Clone for Job<T> {
    fn clone(&self) -> Self {
        Self {
            id: self.id,
            owner: self.owner.clone(),
            state: self.state,
            progress: self.progress,
            created_at: self.created_at,
            started_at: self.started_at,
            finished_at: self.finished_at,
            payload: self.payload.clone(),
        }
    }
}

/// Map entry: the current snapshot plus the cooperative cancel flag. The
/// flag lives outside the snapshot so `cancel` can request a stop without
/// a state transition.
struct JobCell<T> {
    job: Job<T>,
    cancel: Arc<AtomicBool>,
}

/// Externally visible job status snapshot.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JobStatus {
    pub job_id: JobId,
    pub owner: String,
    pub state: JobState,
    pub progress_percent: u8,
    pub created_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub finished_at: Option<DateTime<Utc>>,
    /// Present on failed jobs: the stored error descriptor, returned
    /// verbatim on every poll.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<crate::error::ErrorBody>,
}

/// Registry tuning knobs, overridable from the environment.
#[derive(Debug, Clone)]
pub struct RegistryConfig {
    /// Terminal jobs older than this are removed by [`cleanup`] /
    /// the cleanup loop.
    ///
    /// [`cleanup`]: JobRegistry::cleanup
    pub retention: Duration,
    /// Cleanup loop tick interval.
    pub cleanup_tick: std::time::Duration,
    /// Optional directory for best-effort JSON status mirroring.
    pub snapshot_dir: Option<PathBuf>,
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self {
            retention: Duration::hours(24),
            cleanup_tick: std::time::Duration::from_secs(300),
            snapshot_dir: None,
        }
    }
}

impl RegistryConfig {
    /// Defaults overridden by `TRIALIGN_RETENTION_SECS`,
    /// `TRIALIGN_CLEANUP_TICK_SECS`, and `TRIALIGN_SNAPSHOT_DIR`.
    pub fn from_env() -> Self {
        let mut cfg = Self::default();
        if let Some(secs) = read_env_u64("TRIALIGN_RETENTION_SECS") {
            cfg.retention = Duration::seconds(secs as i64);
        }
        if let Some(secs) = read_env_u64("TRIALIGN_CLEANUP_TICK_SECS") {
            cfg.cleanup_tick = std::time::Duration::from_secs(secs);
        }
        if let Ok(dir) = std::env::var("TRIALIGN_SNAPSHOT_DIR") {
            if !dir.trim().is_empty() {
                cfg.snapshot_dir = Some(PathBuf::from(dir.trim()));
            }
        }
        cfg
    }
}

fn read_env_u64(name: &str) -> Option<u64> {
    match std::env::var(name) {
        Ok(raw) => match raw.trim().parse() {
            Ok(v) => Some(v),
            Err(_) => {
                warn!("ignoring non-numeric {name}={raw}");
                None
            }
        },
        Err(_) => None,
    }
}

/// Concurrent registry of analysis jobs producing output `T`.
pub struct JobRegistry<T> {
    jobs: Arc<DashMap<JobId, JobCell<T>>>,
    mirror: Option<Arc<Mirror>>,
    config: RegistryConfig,
}

impl<T: Send + Sync + 'static> JobRegistry<T> {
    pub fn new(config: RegistryConfig) -> Self {
        let mirror = config.snapshot_dir.as_ref().map(|dir| {
            info!(dir = %dir.display(), "mirroring job snapshots");
            Arc::new(Mirror::new(dir.clone()))
        });
        Self {
            jobs: Arc::new(DashMap::new()),
            mirror,
            config,
        }
    }

    /// Enqueue a unit of work and return its job id immediately.
    ///
    /// The closure runs on a blocking thread; its `JobHandle` is the only
    /// way to report progress or observe cancellation, which is what
    /// restricts `report_progress` to the executing work itself.
    pub fn submit<F>(&self, owner: &str, work: F) -> JobId
    where
        F: FnOnce(&JobHandle<T>) -> Result<T> + Send + 'static,
    {
        let id = Uuid::new_v4();
        let cancel = Arc::new(AtomicBool::new(false));
        let job = Job {
            id,
            owner: owner.to_string(),
            state: JobState::Queued,
            progress: 0,
            created_at: Utc::now(),
            started_at: None,
            finished_at: None,
            payload: None,
        };
        self.mirror_job(&job);
        self.jobs.insert(
            id,
            JobCell {
                job,
                cancel: Arc::clone(&cancel),
            },
        );
        info!(job_id = %id, owner, "job queued");

        let jobs = Arc::clone(&self.jobs);
        let mirror = self.mirror.clone();
        tokio::spawn(async move {
            run_job(jobs, mirror, id, cancel, work).await;
        });
        id
    }

    /// Current status snapshot, or `NotFound`.
    pub fn status(&self, id: JobId) -> Result<JobStatus> {
        let cell = self
            .jobs
            .get(&id)
            .ok_or_else(|| Error::NotFound(id.to_string()))?;
        Ok(snapshot(&cell.job))
    }

    /// All known jobs' status snapshots, newest first.
    pub fn list(&self) -> Vec<JobStatus> {
        let mut all: Vec<JobStatus> = self.jobs.iter().map(|c| snapshot(&c.job)).collect();
        all.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        all
    }

    /// The computed output of a `Succeeded` job.
    ///
    /// `NotReady` while queued/running, the stored descriptor verbatim if
    /// failed, `Cancelled` if cancelled.
    pub fn result(&self, id: JobId) -> Result<Arc<T>> {
        let cell = self
            .jobs
            .get(&id)
            .ok_or_else(|| Error::NotFound(id.to_string()))?;
        match (&cell.job.state, &cell.job.payload) {
            (JobState::Succeeded, Some(Payload::Output(out))) => Ok(Arc::clone(out)),
            (JobState::Failed, Some(Payload::Error(e))) => Err(e.clone()),
            (JobState::Cancelled, _) => Err(Error::Cancelled(id.to_string())),
            (JobState::Queued | JobState::Running, _) => Err(Error::NotReady(id.to_string())),
            (state, payload) => {
                // A terminal state without its payload would mean a
                // snapshot was published half-built; the replace
                // discipline makes this unreachable.
                error!(job_id = %id, ?state, has_payload = payload.is_some(),
                       "terminal job with inconsistent payload");
                debug_assert!(false, "terminal job {id} missing payload");
                Err(Error::EngineFailure(format!(
                    "job {id} is in an inconsistent terminal state"
                )))
            }
        }
    }

    /// Best-effort cancellation. Queued jobs transition directly to
    /// `Cancelled`; running jobs get the cooperative flag raised and
    /// transition when the engine observes it. Terminal jobs: no-op.
    pub fn cancel(&self, id: JobId) -> Result<()> {
        let mut cell = self
            .jobs
            .get_mut(&id)
            .ok_or_else(|| Error::NotFound(id.to_string()))?;
        match cell.job.state {
            JobState::Queued => {
                cell.cancel.store(true, Ordering::SeqCst);
                let mut next = cell.job.clone();
                next.state = JobState::Cancelled;
                next.finished_at = Some(Utc::now());
                cell.job = next;
                info!(job_id = %id, "cancelled while queued");
                self.mirror_job(&cell.job);
            }
            JobState::Running => {
                cell.cancel.store(true, Ordering::SeqCst);
                info!(job_id = %id, "cancellation requested");
            }
            state => {
                debug!(job_id = %id, ?state, "cancel on terminal job is a no-op");
            }
        }
        Ok(())
    }

    /// Remove terminal jobs whose finish timestamp predates the cutoff.
    /// Non-terminal jobs are never touched, regardless of age. Returns
    /// the number of jobs removed.
    pub fn cleanup(&self, older_than: Duration) -> usize {
        let cutoff = Utc::now() - older_than;
        let before = self.jobs.len();
        self.jobs.retain(|_, cell| {
            !(cell.job.state.is_terminal()
                && cell.job.finished_at.map(|t| t < cutoff).unwrap_or(false))
        });
        let removed = before - self.jobs.len();
        if removed > 0 {
            info!(removed, "cleaned up expired jobs");
        }
        removed
    }

    pub fn len(&self) -> usize {
        self.jobs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.jobs.is_empty()
    }

    fn mirror_job(&self, job: &Job<T>) {
        if let Some(mirror) = &self.mirror {
            mirror.record(&snapshot(job));
        }
    }
}

/// Spawn the periodic retention sweep. Runs until the returned handle is
/// aborted or the runtime shuts down.
pub fn spawn_cleanup_loop<T: Send + Sync + 'static>(
    registry: Arc<JobRegistry<T>>,
) -> tokio::task::JoinHandle<()> {
    let tick = registry.config.cleanup_tick;
    let retention = registry.config.retention;
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(tick);
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
        loop {
            interval.tick().await;
            registry.cleanup(retention);
        }
    })
}

/// Handle passed to the executing unit of work. Implements the engine's
/// [`RunControl`] seam so alignment code stays ignorant of the registry.
pub struct JobHandle<T> {
    id: JobId,
    jobs: Arc<DashMap<JobId, JobCell<T>>>,
    cancel: Arc<AtomicBool>,
}

impl<T> JobHandle<T> {
    pub fn id(&self) -> JobId {
        self.id
    }

    /// True once cancellation has been requested.
    pub fn is_cancel_requested(&self) -> bool {
        self.cancel.load(Ordering::SeqCst)
    }

    /// Update progress, 0–100. Progress is monotone: a value lower than
    /// the published one is ignored (with a debug log), so no `status`
    /// poll can ever observe a regression.
    pub fn report_progress(&self, percent: u8) {
        let percent = percent.min(100);
        if let Some(mut cell) = self.jobs.get_mut(&self.id) {
            if cell.job.state != JobState::Running {
                return;
            }
            if percent < cell.job.progress {
                debug!(job_id = %self.id, from = cell.job.progress, to = percent,
                       "ignoring progress regression");
                return;
            }
            let mut next = cell.job.clone();
            next.progress = percent;
            cell.job = next;
        }
    }
}

impl<T: Send + Sync> RunControl for JobHandle<T> {
    fn is_cancelled(&self) -> bool {
        self.is_cancel_requested()
    }

    fn on_progress(&self, percent: u8) {
        self.report_progress(percent);
    }
}

fn snapshot<T>(job: &Job<T>) -> JobStatus {
    JobStatus {
        job_id: job.id,
        owner: job.owner.clone(),
        state: job.state,
        progress_percent: job.progress,
        created_at: job.created_at,
        started_at: job.started_at,
        finished_at: job.finished_at,
        error: match &job.payload {
            Some(Payload::Error(e)) => Some(e.to_body()),
            _ => None,
        },
    }
}

/// Drive one job from `Queued` to a terminal state. Never panics the
/// host: engine errors and work panics both land as stored descriptors.
async fn run_job<T, F>(
    jobs: Arc<DashMap<JobId, JobCell<T>>>,
    mirror: Option<Arc<Mirror>>,
    id: JobId,
    cancel: Arc<AtomicBool>,
    work: F,
) where
    T: Send + Sync + 'static,
    F: FnOnce(&JobHandle<T>) -> Result<T> + Send + 'static,
{
    // Queued → Running, unless a pre-start cancel won the race.
    if !apply_transition(&jobs, &mirror, id, JobState::Running, None) {
        debug!(job_id = %id, "job no longer queued, skipping execution");
        return;
    }

    let handle = JobHandle {
        id,
        jobs: Arc::clone(&jobs),
        cancel,
    };
    let joined = tokio::task::spawn_blocking(move || {
        let out = work(&handle);
        (handle, out)
    })
    .await;

    match joined {
        Ok((_, Ok(output))) => {
            apply_transition(
                &jobs,
                &mirror,
                id,
                JobState::Succeeded,
                Some(Payload::Output(Arc::new(output))),
            );
        }
        Ok((_, Err(Error::Cancelled(reason)))) => {
            debug!(job_id = %id, reason, "work observed cancellation");
            apply_transition(&jobs, &mirror, id, JobState::Cancelled, None);
        }
        Ok((_, Err(e))) => {
            warn!(job_id = %id, error = %e, "job failed");
            apply_transition(&jobs, &mirror, id, JobState::Failed, Some(Payload::Error(e)));
        }
        Err(join_err) => {
            // The work panicked. Classify and store, never propagate.
            let e = Error::EngineFailure(format!("unit of work panicked: {join_err}"));
            error!(job_id = %id, error = %e, "job panicked");
            apply_transition(&jobs, &mirror, id, JobState::Failed, Some(Payload::Error(e)));
        }
    }
}

/// Apply one transition with the snapshot-replace discipline. Returns
/// false when the job is gone or the transition is not legal from the
/// current state.
///
/// A completion racing a cancellation is expected and dropped quietly;
/// any other illegal transition is a registry bug and fails loudly.
fn apply_transition<T>(
    jobs: &DashMap<JobId, JobCell<T>>,
    mirror: &Option<Arc<Mirror>>,
    id: JobId,
    to: JobState,
    payload: Option<Payload<T>>,
) -> bool {
    let Some(mut cell) = jobs.get_mut(&id) else {
        debug!(job_id = %id, "transition target vanished (cleaned up?)");
        return false;
    };
    let from = cell.job.state;
    if !from.can_transition(to) {
        if from == JobState::Cancelled {
            debug!(job_id = %id, ?to, "dropping transition on cancelled job");
        } else {
            error!(job_id = %id, ?from, ?to, "illegal job state transition attempted");
            debug_assert!(false, "illegal transition {from:?} -> {to:?}");
        }
        return false;
    }

    let mut next = cell.job.clone();
    next.state = to;
    match to {
        JobState::Running => next.started_at = Some(Utc::now()),
        _ => next.finished_at = Some(Utc::now()),
    }
    if to == JobState::Succeeded {
        next.progress = 100;
    }
    if payload.is_some() {
        next.payload = payload;
    }
    cell.job = next;
    debug!(job_id = %id, ?from, ?to, "job transitioned");

    if let Some(mirror) = mirror {
        mirror.record(&snapshot(&cell.job));
    }
    true
}

#[cfg(test)]
mod tests {
    use super::*;

    fn registry() -> JobRegistry<u32> {
        JobRegistry::new(RegistryConfig::default())
    }

    /// Poll a job until it reaches a terminal state.
    async fn wait_terminal(reg: &JobRegistry<u32>, id: JobId) -> JobStatus {
        for _ in 0..500 {
            let st = reg.status(id).unwrap();
            if st.state.is_terminal() {
                return st;
            }
            tokio::time::sleep(std::time::Duration::from_millis(5)).await;
        }
        panic!("job {id} never reached a terminal state");
    }

    #[tokio::test]
    async fn test_submit_and_succeed() {
        let reg = registry();
        let id = reg.submit("alice", |h| {
            h.report_progress(50);
            Ok(7)
        });
        let st = wait_terminal(&reg, id).await;
        assert_eq!(st.state, JobState::Succeeded);
        assert_eq!(st.progress_percent, 100);
        assert!(st.started_at.is_some());
        assert!(st.finished_at.is_some());
        assert_eq!(*reg.result(id).unwrap(), 7);
    }

    #[tokio::test]
    async fn test_failure_is_captured_and_stable() {
        let reg = registry();
        let id = reg.submit("alice", |_| {
            Err(Error::EngineFailure("bad shape".into()))
        });
        let st = wait_terminal(&reg, id).await;
        assert_eq!(st.state, JobState::Failed);

        // Repeated polls return the identical descriptor.
        let e1 = reg.result(id).unwrap_err();
        let e2 = reg.result(id).unwrap_err();
        assert_eq!(e1.to_body(), e2.to_body());
        assert_eq!(e1.kind(), "EngineFailure");
    }

    #[tokio::test]
    async fn test_panic_becomes_failed_job() {
        let reg = registry();
        let id = reg.submit("alice", |_| -> Result<u32> { panic!("boom") });
        let st = wait_terminal(&reg, id).await;
        assert_eq!(st.state, JobState::Failed);
        assert_eq!(reg.result(id).unwrap_err().kind(), "EngineFailure");
    }

    #[tokio::test]
    async fn test_result_before_terminal_is_not_ready() {
        let reg = registry();
        let (tx, rx) = std::sync::mpsc::channel::<()>();
        let id = reg.submit("alice", move |_| {
            rx.recv().ok();
            Ok(1)
        });
        assert_eq!(reg.result(id).unwrap_err().kind(), "NotReady");
        tx.send(()).unwrap();
        wait_terminal(&reg, id).await;
        assert_eq!(*reg.result(id).unwrap(), 1);
    }

    #[tokio::test]
    async fn test_unknown_id_is_not_found() {
        let reg = registry();
        let ghost = Uuid::new_v4();
        assert_eq!(reg.status(ghost).unwrap_err().kind(), "NotFound");
        assert_eq!(reg.result(ghost).unwrap_err().kind(), "NotFound");
        assert_eq!(reg.cancel(ghost).unwrap_err().kind(), "NotFound");
    }

    #[tokio::test]
    async fn test_cancel_running_job_cooperatively() {
        let reg = registry();
        let (started_tx, started_rx) = std::sync::mpsc::channel::<()>();
        let id = reg.submit("alice", move |h| {
            started_tx.send(()).ok();
            // Simulated trial loop polling the cancel flag at safe points.
            for done in 0..1000 {
                if h.is_cancelled() {
                    return Err(Error::Cancelled(format!("after {done} trials")));
                }
                std::thread::sleep(std::time::Duration::from_millis(2));
            }
            Ok(0)
        });
        // Blocking recv would starve the current-thread test runtime.
        tokio::task::spawn_blocking(move || started_rx.recv())
            .await
            .unwrap()
            .unwrap();
        reg.cancel(id).unwrap();
        let st = wait_terminal(&reg, id).await;
        assert_eq!(st.state, JobState::Cancelled);
        assert_eq!(reg.result(id).unwrap_err().kind(), "Cancelled");
    }

    #[tokio::test]
    async fn test_double_cancel_is_idempotent() {
        let reg = registry();
        // Occupy the blocking pool long enough to cancel while queued is
        // not deterministic; instead cancel immediately after submit and
        // accept either Queued→Cancelled or cooperative cancel.
        let id = reg.submit("alice", |h| {
            for _ in 0..1000 {
                if h.is_cancelled() {
                    return Err(Error::Cancelled("flag".into()));
                }
                std::thread::sleep(std::time::Duration::from_millis(1));
            }
            Ok(0)
        });
        reg.cancel(id).unwrap();
        let st = wait_terminal(&reg, id).await;
        assert_eq!(st.state, JobState::Cancelled);

        // Second cancel: no-op, state unchanged, still Ok.
        reg.cancel(id).unwrap();
        assert_eq!(reg.status(id).unwrap().state, JobState::Cancelled);
    }

    #[tokio::test]
    async fn test_progress_is_monotone_under_polling() {
        let reg = registry();
        let id = reg.submit("alice", |h| {
            for pct in [10u8, 40, 30, 70, 100] {
                // 30 after 40 must be ignored, not published.
                h.report_progress(pct);
                std::thread::sleep(std::time::Duration::from_millis(3));
            }
            Ok(0)
        });
        let mut last = 0u8;
        loop {
            let st = reg.status(id).unwrap();
            assert!(st.progress_percent >= last, "progress regressed");
            last = st.progress_percent;
            if st.state.is_terminal() {
                break;
            }
            tokio::time::sleep(std::time::Duration::from_millis(1)).await;
        }
    }

    #[tokio::test]
    async fn test_cleanup_spares_non_terminal_jobs() {
        let reg = registry();
        let (tx, rx) = std::sync::mpsc::channel::<()>();
        let running = reg.submit("alice", move |_| {
            rx.recv().ok();
            Ok(1)
        });
        let done = reg.submit("alice", |_| Ok(2));
        wait_terminal(&reg, done).await;

        // Zero retention: every terminal job is expired immediately, but
        // the running job must survive regardless of age.
        let removed = reg.cleanup(Duration::zero());
        assert_eq!(removed, 1);
        assert!(reg.status(running).is_ok());
        assert_eq!(reg.status(done).unwrap_err().kind(), "NotFound");

        tx.send(()).unwrap();
        wait_terminal(&reg, running).await;
    }

    #[tokio::test]
    async fn test_list_reports_all_jobs() {
        let reg = registry();
        let a = reg.submit("alice", |_| Ok(1));
        let b = reg.submit("bob", |_| Ok(2));
        wait_terminal(&reg, a).await;
        wait_terminal(&reg, b).await;
        let all = reg.list();
        assert_eq!(all.len(), 2);
        assert!(all.iter().any(|s| s.owner == "alice"));
        assert!(all.iter().any(|s| s.owner == "bob"));
    }

    #[tokio::test]
    async fn test_cleanup_loop_sweeps_expired_jobs() {
        let reg = Arc::new(JobRegistry::new(RegistryConfig {
            retention: Duration::zero(),
            cleanup_tick: std::time::Duration::from_millis(20),
            snapshot_dir: None,
        }));
        let id = reg.submit("alice", |_| Ok(1u32));
        for _ in 0..500 {
            if reg.status(id).map(|s| s.state.is_terminal()).unwrap_or(true) {
                break;
            }
            tokio::time::sleep(std::time::Duration::from_millis(5)).await;
        }

        let sweeper = spawn_cleanup_loop(Arc::clone(&reg));
        for _ in 0..500 {
            if reg.is_empty() {
                break;
            }
            tokio::time::sleep(std::time::Duration::from_millis(5)).await;
        }
        assert!(reg.is_empty());
        sweeper.abort();
    }

    #[test]
    fn test_config_from_env() {
        std::env::set_var("TRIALIGN_RETENTION_SECS", "60");
        std::env::set_var("TRIALIGN_CLEANUP_TICK_SECS", "bogus");
        std::env::set_var("TRIALIGN_SNAPSHOT_DIR", " /tmp/snapshots ");
        let cfg = RegistryConfig::from_env();
        std::env::remove_var("TRIALIGN_RETENTION_SECS");
        std::env::remove_var("TRIALIGN_CLEANUP_TICK_SECS");
        std::env::remove_var("TRIALIGN_SNAPSHOT_DIR");

        assert_eq!(cfg.retention, Duration::seconds(60));
        // Non-numeric values fall back to the coded default.
        assert_eq!(cfg.cleanup_tick, std::time::Duration::from_secs(300));
        assert_eq!(cfg.snapshot_dir, Some(PathBuf::from("/tmp/snapshots")));
    }

    #[test]
    fn test_transition_graph() {
        use JobState::*;
        assert!(Queued.can_transition(Running));
        assert!(Queued.can_transition(Cancelled));
        assert!(Running.can_transition(Succeeded));
        assert!(Running.can_transition(Failed));
        assert!(Running.can_transition(Cancelled));

        assert!(!Queued.can_transition(Succeeded));
        assert!(!Succeeded.can_transition(Running));
        assert!(!Failed.can_transition(Running));
        assert!(!Cancelled.can_transition(Running));
        assert!(!Succeeded.can_transition(Failed));
    }

    #[test]
    fn test_status_wire_shape() {
        let st = JobStatus {
            job_id: Uuid::nil(),
            owner: "alice".into(),
            state: JobState::Running,
            progress_percent: 42,
            created_at: Utc::now(),
            started_at: Some(Utc::now()),
            finished_at: None,
            error: None,
        };
        let json = serde_json::to_value(&st).unwrap();
        assert_eq!(json["state"], "running");
        assert_eq!(json["progressPercent"], 42);
        assert!(json.get("jobId").is_some());
        assert!(json.get("createdAt").is_some());
        assert!(json.get("error").is_none());
    }
}
