//! Job Lifecycle Orchestrator
//!
//! Owns the externally visible job state: the record store, the result
//! store, and the submission path into the pipeline engine. Three
//! background tasks run for the orchestrator's lifetime:
//!
//! - feeder: moves accepted submissions into the engine's input stream and
//!   keeps the queue-depth and active-job counters honest
//! - drain: consumes the engine's completion stream and finalizes records —
//!   completed runs store their result, failed runs reach `Failed` with no
//!   result, so no job is ever stuck in a non-terminal status
//! - sweep: periodically evicts terminal records and results older than the
//!   retention TTL
//!
//! Terminal transitions are idempotent: once a record is `Completed` or
//! `Failed` it never changes again.

use crate::config::ServiceConfig;
use crate::pipeline::{
    GuardedStage, JobOutcome, MetricsSnapshot, PipelineEngine, PipelineMetrics,
};
use crate::types::{DiagnosticResult, JobRecord, JobStatus, ProcessingContext};
use chrono::Utc;
use dashmap::DashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use thiserror::Error;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use uuid::Uuid;

// ============================================================================
// Errors
// ============================================================================

#[derive(Debug, Error)]
pub enum SubmitError {
    /// The submission payload is unusable (rejected before a job exists).
    #[error("invalid input: {0}")]
    InvalidInput(&'static str),
    /// The service no longer accepts submissions.
    #[error("service is shutting down")]
    ShuttingDown,
}

// ============================================================================
// Orchestrator
// ============================================================================

pub struct Orchestrator {
    jobs: DashMap<Uuid, JobRecord>,
    results: DashMap<Uuid, DiagnosticResult>,
    submit_tx: mpsc::UnboundedSender<ProcessingContext>,
    queue_depth: AtomicUsize,
    active_jobs: AtomicUsize,
    accepting: AtomicBool,
    metrics: Arc<PipelineMetrics>,
    stages: Arc<Vec<GuardedStage>>,
    cancel: CancellationToken,
    background: Mutex<Vec<JoinHandle<()>>>,
}

impl Orchestrator {
    /// Start the orchestrator over a configured engine.
    ///
    /// Consumes the engine (its loop takes ownership of the input stream)
    /// and spawns the feeder, drain, and sweep tasks. Must be called from
    /// within a Tokio runtime.
    pub fn start(engine: PipelineEngine, config: &ServiceConfig) -> Arc<Self> {
        let (submit_tx, submit_rx) = mpsc::unbounded_channel();
        let (engine_tx, engine_rx) = mpsc::unbounded_channel();

        let metrics = engine.metrics();
        let stages = engine.stages();
        let cancel = engine.cancel_token();
        let outcomes = engine.execute(engine_rx);

        let orch = Arc::new(Self {
            jobs: DashMap::new(),
            results: DashMap::new(),
            submit_tx,
            queue_depth: AtomicUsize::new(0),
            active_jobs: AtomicUsize::new(0),
            accepting: AtomicBool::new(true),
            metrics,
            stages,
            cancel: cancel.clone(),
            background: Mutex::new(Vec::new()),
        });

        let feeder = tokio::spawn(feed_engine(
            Arc::clone(&orch),
            submit_rx,
            engine_tx,
            cancel.clone(),
        ));
        let drain = tokio::spawn(drain_outcomes(Arc::clone(&orch), outcomes));
        let sweep = tokio::spawn(retention_sweep(
            Arc::clone(&orch),
            config.retention.result_ttl(),
            config.retention.sweep_interval(),
            cancel,
        ));

        if let Ok(mut handles) = orch.background.lock() {
            handles.extend([feeder, drain, sweep]);
        }

        info!(
            max_concurrent = config.pipeline.max_concurrent_jobs,
            result_ttl_secs = config.retention.result_ttl_secs,
            "Orchestrator started"
        );
        orch
    }

    // ------------------------------------------------------------------------
    // Submission & queries
    // ------------------------------------------------------------------------

    /// Accept a blob for diagnosis. Returns the new job's id.
    ///
    /// Validation happens before any state is created: a rejected
    /// submission leaves no record behind. The record is created `Pending`
    /// and flipped to `Processing` as soon as the blob is enqueued.
    pub fn submit(&self, data: Vec<u8>) -> Result<Uuid, SubmitError> {
        if data.is_empty() {
            return Err(SubmitError::InvalidInput("empty payload"));
        }
        if !self.accepting.load(Ordering::SeqCst) {
            return Err(SubmitError::ShuttingDown);
        }

        let id = Uuid::new_v4();
        self.jobs.insert(id, JobRecord::new(id));
        self.queue_depth.fetch_add(1, Ordering::Relaxed);

        if self.submit_tx.send(ProcessingContext::new(id, data)).is_err() {
            // Feeder already gone; roll the record back.
            self.jobs.remove(&id);
            saturating_dec(&self.queue_depth);
            return Err(SubmitError::ShuttingDown);
        }
        if let Some(mut record) = self.jobs.get_mut(&id) {
            record.status = JobStatus::Processing;
        }

        // A shutdown that started mid-submit has already run its abandoned
        // scan; a record inserted behind that scan would dangle forever.
        if !self.accepting.load(Ordering::SeqCst) {
            self.jobs.remove(&id);
            saturating_dec(&self.queue_depth);
            return Err(SubmitError::ShuttingDown);
        }

        debug!(job_id = %id, "Job accepted");
        Ok(id)
    }

    /// Current record for a job, if it exists and has not been evicted.
    pub fn status(&self, id: Uuid) -> Option<JobRecord> {
        self.jobs.get(&id).map(|r| r.clone())
    }

    /// Diagnostic result for a completed job.
    pub fn result(&self, id: Uuid) -> Option<DiagnosticResult> {
        self.results.get(&id).map(|r| r.clone())
    }

    /// Jobs currently executing inside the engine.
    pub fn active_jobs(&self) -> usize {
        self.active_jobs.load(Ordering::Relaxed)
    }

    /// Submissions accepted but not yet handed to the engine.
    pub fn queue_depth(&self) -> usize {
        self.queue_depth.load(Ordering::Relaxed)
    }

    /// Whether submissions are still accepted (readiness signal).
    pub fn is_accepting(&self) -> bool {
        self.accepting.load(Ordering::SeqCst)
    }

    /// Point-in-time snapshot of the pipeline counters.
    pub fn metrics(&self) -> MetricsSnapshot {
        self.metrics.snapshot()
    }

    /// Guarded stage list, for the health surface.
    pub fn stages(&self) -> Arc<Vec<GuardedStage>> {
        Arc::clone(&self.stages)
    }

    // ------------------------------------------------------------------------
    // Shutdown
    // ------------------------------------------------------------------------

    /// Graceful shutdown: stop accepting, stop engine admission, wait for
    /// every in-flight outcome to be recorded, then fail whatever never
    /// reached the engine so no record is left non-terminal.
    pub async fn shutdown(&self) {
        if self.accepting.swap(false, Ordering::SeqCst) {
            info!("Orchestrator shutting down, submissions rejected from now on");
        }
        self.cancel.cancel();

        let handles: Vec<JoinHandle<()>> = self
            .background
            .lock()
            .map(|mut guard| guard.drain(..).collect())
            .unwrap_or_default();
        for handle in handles {
            if let Err(e) = handle.await {
                warn!("Orchestrator background task failed during shutdown: {e}");
            }
        }

        // Queued jobs abandoned by the cancelled engine get a terminal
        // status instead of dangling in Pending/Processing forever.
        let abandoned: Vec<Uuid> = self
            .jobs
            .iter()
            .filter(|r| !r.status.is_terminal())
            .map(|r| r.id)
            .collect();
        for id in &abandoned {
            self.finalize(*id, JobStatus::Failed);
        }
        if !abandoned.is_empty() {
            warn!(count = abandoned.len(), "Jobs abandoned by shutdown marked failed");
        }

        info!("Orchestrator shutdown complete");
    }

    // ------------------------------------------------------------------------
    // Internal state transitions
    // ------------------------------------------------------------------------

    /// Move a record to a terminal status. A record that is already
    /// terminal is left untouched.
    fn finalize(&self, id: Uuid, status: JobStatus) {
        if let Some(mut record) = self.jobs.get_mut(&id) {
            if record.status.is_terminal() {
                return;
            }
            record.status = status;
            record.completed_at = Some(Utc::now());
        }
    }

    /// Drop terminal records (and their results) older than the TTL.
    fn evict_expired(&self, ttl: chrono::Duration) {
        let cutoff = Utc::now() - ttl;
        let expired: Vec<Uuid> = self
            .jobs
            .iter()
            .filter(|r| {
                r.status.is_terminal()
                    && r.completed_at.is_some_and(|done| done < cutoff)
            })
            .map(|r| r.id)
            .collect();

        for id in &expired {
            self.jobs.remove(id);
            self.results.remove(id);
        }
        if !expired.is_empty() {
            info!(evicted = expired.len(), "Retention sweep evicted expired jobs");
        }
    }
}

// ============================================================================
// Background tasks
// ============================================================================

async fn feed_engine(
    orch: Arc<Orchestrator>,
    mut submit_rx: mpsc::UnboundedReceiver<ProcessingContext>,
    engine_tx: mpsc::UnboundedSender<ProcessingContext>,
    cancel: CancellationToken,
) {
    loop {
        let ctx = tokio::select! {
            _ = cancel.cancelled() => break,
            item = submit_rx.recv() => match item {
                Some(ctx) => ctx,
                None => break,
            },
        };

        saturating_dec(&orch.queue_depth);
        orch.active_jobs.fetch_add(1, Ordering::Relaxed);

        if engine_tx.send(ctx).is_err() {
            break;
        }
    }
    debug!("Submission feeder stopped");
}

async fn drain_outcomes(
    orch: Arc<Orchestrator>,
    mut outcomes: mpsc::Receiver<JobOutcome>,
) {
    while let Some(outcome) = outcomes.recv().await {
        saturating_dec(&orch.active_jobs);
        match outcome {
            JobOutcome::Completed(ctx) => {
                let id = ctx.job_id;
                // Result first, then the status flip: a client that
                // observes Completed always finds the result.
                orch.results.insert(id, ctx.into_result());
                orch.finalize(id, JobStatus::Completed);
                info!(job_id = %id, "Job completed");
            }
            JobOutcome::Failed { job_id, error } => {
                orch.finalize(job_id, JobStatus::Failed);
                warn!(job_id = %job_id, error = %error, "Job failed");
            }
        }
    }
    debug!("Completion drain stopped");
}

async fn retention_sweep(
    orch: Arc<Orchestrator>,
    ttl: chrono::Duration,
    interval: std::time::Duration,
    cancel: CancellationToken,
) {
    let mut ticker = tokio::time::interval(interval);
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
    // The first tick fires immediately; skip it so a fresh store isn't
    // swept at startup.
    ticker.tick().await;

    loop {
        tokio::select! {
            _ = cancel.cancelled() => break,
            _ = ticker.tick() => {}
        }
        orch.evict_expired(ttl);
    }
    debug!("Retention sweep stopped");
}

fn saturating_dec(counter: &AtomicUsize) {
    let _ = counter.fetch_update(Ordering::Relaxed, Ordering::Relaxed, |v| {
        v.checked_sub(1)
    });
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stages::{build_detectors, build_stages};
    use std::time::Duration;

    fn started() -> Arc<Orchestrator> {
        let config = ServiceConfig::default();
        let detectors = build_detectors(&config.detectors);
        let stages = build_stages(&config.pipeline, detectors);
        let engine = PipelineEngine::new(stages, 2, Duration::from_secs(5));
        Orchestrator::start(engine, &config)
    }

    async fn wait_terminal(orch: &Orchestrator, id: Uuid) -> JobRecord {
        for _ in 0..200 {
            if let Some(record) = orch.status(id) {
                if record.status.is_terminal() {
                    return record;
                }
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        panic!("job {id} never reached a terminal status");
    }

    #[tokio::test]
    async fn empty_submission_is_rejected_without_a_record() {
        let orch = started();
        let err = orch.submit(Vec::new()).unwrap_err();
        assert!(matches!(err, SubmitError::InvalidInput(_)));
        assert_eq!(orch.jobs.len(), 0);
        orch.shutdown().await;
    }

    #[tokio::test]
    async fn submitted_job_completes_with_a_result() {
        let orch = started();
        let id = orch.submit(vec![0u8; 64]).unwrap();
        let record = wait_terminal(&orch, id).await;
        assert_eq!(record.status, JobStatus::Completed);
        assert!(record.completed_at.is_some());
        let result = orch.result(id).expect("result stored");
        assert!(result.entropy_profile.is_some());
        orch.shutdown().await;
    }

    #[tokio::test]
    async fn shutdown_rejects_subsequent_submissions() {
        let orch = started();
        orch.shutdown().await;
        let err = orch.submit(vec![1, 2, 3]).unwrap_err();
        assert!(matches!(err, SubmitError::ShuttingDown));
    }

    #[tokio::test]
    async fn terminal_transitions_are_idempotent() {
        let orch = started();
        let id = Uuid::new_v4();
        orch.jobs.insert(id, JobRecord::new(id));

        orch.finalize(id, JobStatus::Failed);
        let first_done = orch.status(id).unwrap().completed_at;
        orch.finalize(id, JobStatus::Completed);

        let record = orch.status(id).unwrap();
        assert_eq!(record.status, JobStatus::Failed);
        assert_eq!(record.completed_at, first_done);
        orch.shutdown().await;
    }

    #[tokio::test]
    async fn eviction_drops_only_expired_terminal_jobs() {
        let orch = started();
        let old = Uuid::new_v4();
        let mut record = JobRecord::new(old);
        record.status = JobStatus::Completed;
        record.completed_at = Some(Utc::now() - chrono::Duration::hours(2));
        orch.jobs.insert(old, record);

        let fresh = Uuid::new_v4();
        orch.jobs.insert(fresh, JobRecord::new(fresh));

        orch.evict_expired(chrono::Duration::hours(1));
        assert!(orch.status(old).is_none());
        assert!(orch.status(fresh).is_some());
        orch.shutdown().await;
    }
}
