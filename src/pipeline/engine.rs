//! Pipeline Engine
//!
//! Bounded-concurrency streaming executor. The engine turns an unbounded
//! arrival stream of processing contexts into a capacity-limited set of
//! in-flight runs and a completion-ordered outcome stream:
//!
//! ```text
//! input (unbounded) -> [admission semaphore, C permits] -> one task per job
//!                      -> sequential guarded stage chain -> completion queue
//! ```
//!
//! Results are yielded strictly in completion order — two jobs admitted as
//! A, B may surface as B, A when B's stages finish first. Failed runs are
//! surfaced on the same stream as [`JobOutcome::Failed`] so the job
//! lifecycle layer can always reach a terminal status.

use crate::pipeline::metrics::PipelineMetrics;
use crate::pipeline::stage::{GuardedStage, StageError};
use crate::types::ProcessingContext;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::{mpsc, Semaphore};
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::config::defaults::COMPLETION_CHANNEL_CAPACITY;

/// Terminal outcome of one job's pipeline run.
#[derive(Debug)]
pub enum JobOutcome {
    /// All stages succeeded; the finished context carries the results.
    Completed(ProcessingContext),
    /// A stage failed (or its breaker rejected the call); the run was
    /// aborted at that stage.
    Failed { job_id: Uuid, error: StageError },
}

impl JobOutcome {
    pub fn job_id(&self) -> Uuid {
        match self {
            JobOutcome::Completed(ctx) => ctx.job_id,
            JobOutcome::Failed { job_id, .. } => *job_id,
        }
    }
}

/// Bounded-concurrency executor over an ordered stage list.
pub struct PipelineEngine {
    stages: Arc<Vec<GuardedStage>>,
    semaphore: Arc<Semaphore>,
    metrics: Arc<PipelineMetrics>,
    cancel: CancellationToken,
    shutdown_timeout: Duration,
}

impl PipelineEngine {
    pub fn new(
        stages: Vec<GuardedStage>,
        max_concurrent: usize,
        shutdown_timeout: Duration,
    ) -> Self {
        Self {
            stages: Arc::new(stages),
            semaphore: Arc::new(Semaphore::new(max_concurrent.max(1))),
            metrics: Arc::new(PipelineMetrics::new()),
            cancel: CancellationToken::new(),
            shutdown_timeout,
        }
    }

    /// Shared metric counters (engine keeps mutating them after `execute`).
    pub fn metrics(&self) -> Arc<PipelineMetrics> {
        Arc::clone(&self.metrics)
    }

    /// Shared stage list, for the health surface.
    pub fn stages(&self) -> Arc<Vec<GuardedStage>> {
        Arc::clone(&self.stages)
    }

    /// Token that stops admission when cancelled.
    pub fn cancel_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Run one context through the full stage chain, recording metrics.
    pub async fn run_one(
        &self,
        ctx: ProcessingContext,
    ) -> Result<ProcessingContext, StageError> {
        run_chain(&self.stages, &self.metrics, ctx).await
    }

    /// Start the long-running engine loop.
    ///
    /// Consumes the engine and the input stream; returns the completion
    /// stream. The loop admits one job per semaphore permit (waiting for a
    /// permit is the sole backpressure mechanism) and spawns an independent
    /// task per admitted job. On cancellation, admission stops — an item
    /// caught waiting for a permit is failed rather than run — and any task
    /// still running after the shutdown timeout is aborted. The returned
    /// channel closes once every task has settled, so consumers never hang
    /// on a draining engine.
    pub fn execute(
        self,
        mut input: mpsc::UnboundedReceiver<ProcessingContext>,
    ) -> mpsc::Receiver<JobOutcome> {
        let (out_tx, out_rx) = mpsc::channel(COMPLETION_CHANNEL_CAPACITY);
        let Self {
            stages,
            semaphore,
            metrics,
            cancel,
            shutdown_timeout,
        } = self;

        tokio::spawn(async move {
            let mut tasks: JoinSet<()> = JoinSet::new();

            loop {
                let ctx = tokio::select! {
                    _ = cancel.cancelled() => {
                        info!("Pipeline engine: shutdown signalled, admission stopped");
                        break;
                    }
                    // Reap finished job tasks so the set stays small.
                    Some(joined) = tasks.join_next(), if !tasks.is_empty() => {
                        if let Err(e) = joined {
                            if e.is_panic() {
                                warn!("Pipeline job task panicked: {e}");
                            }
                        }
                        continue;
                    }
                    item = input.recv() => match item {
                        Some(ctx) => ctx,
                        None => {
                            info!("Pipeline engine: input stream closed");
                            break;
                        }
                    },
                };

                // Waiting for a permit must stay cancellable: with every
                // permit held by stuck jobs, an un-cancellable acquire would
                // keep the drain phase (and stream closure) from ever
                // running. An item already read when shutdown wins the race
                // is failed, not silently dropped.
                let permit = tokio::select! {
                    _ = cancel.cancelled() => {
                        let job_id = ctx.job_id;
                        info!(job_id = %job_id, "Shutdown while waiting for admission, failing job");
                        let outcome = JobOutcome::Failed {
                            job_id,
                            error: StageError::failed("engine", "shut down before admission"),
                        };
                        if out_tx.send(outcome).await.is_err() {
                            warn!(job_id = %job_id, "Completion consumer gone, outcome dropped");
                        }
                        break;
                    }
                    permit = Arc::clone(&semaphore).acquire_owned() => match permit {
                        Ok(permit) => permit,
                        Err(_) => break,
                    },
                };

                let stages = Arc::clone(&stages);
                let metrics = Arc::clone(&metrics);
                let out = out_tx.clone();
                tasks.spawn(async move {
                    // Owned permit: released when this task exits on any
                    // path, including abort.
                    let _permit = permit;
                    let job_id = ctx.job_id;
                    let outcome = match run_chain(&stages, &metrics, ctx).await {
                        Ok(done) => JobOutcome::Completed(done),
                        Err(error) => {
                            debug!(job_id = %job_id, error = %error, "Job run failed");
                            JobOutcome::Failed { job_id, error }
                        }
                    };
                    if out.send(outcome).await.is_err() {
                        warn!(job_id = %job_id, "Completion consumer gone, outcome dropped");
                    }
                });
            }

            // Graceful drain: wait for in-flight jobs, then abort stragglers.
            let drained = tokio::time::timeout(shutdown_timeout, async {
                while tasks.join_next().await.is_some() {}
            })
            .await;

            if drained.is_err() {
                warn!(
                    remaining = tasks.len(),
                    "Engine shutdown timeout reached, aborting in-flight jobs"
                );
                tasks.shutdown().await;
            }

            info!("Pipeline engine: all tasks settled, closing completion stream");
            // out_tx drops here; the completion channel closes once the
            // last per-task clone is gone.
        });

        out_rx
    }
}

/// Execute the guarded stage chain over one context.
///
/// Aborts at the first stage failure — subsequent stages never run for
/// this job. Per-stage latency is accumulated for every stage that was
/// actually invoked (breaker rejections don't count; `process` never ran).
async fn run_chain(
    stages: &[GuardedStage],
    metrics: &PipelineMetrics,
    mut ctx: ProcessingContext,
) -> Result<ProcessingContext, StageError> {
    let started = Instant::now();

    for stage in stages {
        let stage_started = Instant::now();
        match stage.execute(ctx).await {
            Ok(next) => {
                metrics.record_stage_latency(stage.name(), stage_started.elapsed());
                ctx = next;
            }
            Err(err) => {
                if !matches!(err, StageError::CircuitOpen { .. }) {
                    metrics.record_stage_latency(stage.name(), stage_started.elapsed());
                }
                metrics.record_failure(started.elapsed());
                return Err(err);
            }
        }
    }

    metrics.record_success(started.elapsed());
    Ok(ctx)
}
