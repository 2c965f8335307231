//! Job executor - bounded worker pool with FIFO dispatch.
//!
//! Submitted jobs wait in a bounded queue and start in submission order.
//! At most `pool_size` jobs run at once; a semaphore permit is acquired
//! before a job is taken off the queue and travels with the worker task
//! until the job finishes.
//!
//! Every accepted job reaches `Completed` with a [`Reply`], no matter how
//! execution went: expected failures come back as the job's own reply,
//! infrastructure errors and panics are converted to [`Reply::Exception`].
//! Panics are contained by running each job in its own task and inspecting
//! the join error.

use super::{Job, JobContext, JobSnapshot, JobStatus};
use crate::events::Event;
use crate::reply::Reply;
use crate::types::{Error, ExecutorConfig, JobId, Result};
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, watch, Mutex, RwLock, Semaphore};
use tokio::task::JoinHandle;
use tokio::time::timeout;
use tokio_util::sync::CancellationToken;

/// Origin stamped on all events the executor publishes.
const EVENT_ORIGIN: &str = "executor";

// =============================================================================
// Job Records
// =============================================================================

/// Executor-owned state of one submitted job.
struct JobRecord {
    job: Arc<dyn Job>,
    status: JobStatus,
    result: Option<Reply>,
    submitted_at: DateTime<Utc>,
    started_at: Option<DateTime<Utc>>,
    completed_at: Option<DateTime<Utc>>,
    /// Flips to true exactly once, when the record completes.
    done: watch::Sender<bool>,
}

impl JobRecord {
    fn new(job: Arc<dyn Job>) -> Self {
        let (done, _) = watch::channel(false);
        Self {
            job,
            status: JobStatus::Unscheduled,
            result: None,
            submitted_at: Utc::now(),
            started_at: None,
            completed_at: None,
            done,
        }
    }

    /// Move to `next`, stamping timestamps. Invalid moves are rejected.
    fn transition(&mut self, next: JobStatus) -> Result<()> {
        if !self.status.can_transition_to(next) {
            return Err(Error::state_transition(format!(
                "job cannot move from {:?} to {:?}",
                self.status, next
            )));
        }
        self.status = next;
        match next {
            JobStatus::Running => self.started_at = Some(Utc::now()),
            JobStatus::Completed => self.completed_at = Some(Utc::now()),
            _ => {}
        }
        Ok(())
    }

    /// Terminal transition: store the reply and wake completion waiters.
    fn complete(&mut self, reply: Reply) -> Result<()> {
        self.transition(JobStatus::Completed)?;
        self.result = Some(reply);
        let _ = self.done.send(true);
        Ok(())
    }

    fn snapshot(&self, id: &JobId) -> JobSnapshot {
        JobSnapshot {
            identifier: id.clone(),
            name: self.job.name().to_string(),
            job_type: self.job.job_type().to_string(),
            status: self.status,
            result: self.result.clone(),
            submitted_at: self.submitted_at,
            started_at: self.started_at,
            completed_at: self.completed_at,
        }
    }
}

type RecordMap = Arc<RwLock<HashMap<JobId, JobRecord>>>;

// =============================================================================
// Job Executor
// =============================================================================

/// Schedules jobs onto a bounded worker pool and tracks their lifecycle.
pub struct JobExecutor {
    ctx: JobContext,
    records: RecordMap,
    queue_tx: mpsc::Sender<JobId>,
    workers: Arc<Semaphore>,
    pool_size: usize,
    drain_timeout: Duration,
    shutdown: CancellationToken,
    dispatcher: Mutex<Option<JoinHandle<()>>>,
}

impl JobExecutor {
    /// Create an executor and start its dispatcher task.
    pub fn new(config: &ExecutorConfig, ctx: JobContext) -> Self {
        let (queue_tx, queue_rx) = mpsc::channel(config.queue_capacity);
        let records: RecordMap = Arc::new(RwLock::new(HashMap::new()));
        let workers = Arc::new(Semaphore::new(config.pool_size));
        let shutdown = CancellationToken::new();

        let dispatcher = tokio::spawn(dispatch_loop(
            queue_rx,
            records.clone(),
            workers.clone(),
            ctx.clone(),
            shutdown.clone(),
        ));

        Self {
            ctx,
            records,
            queue_tx,
            workers,
            pool_size: config.pool_size,
            drain_timeout: config.drain_timeout,
            shutdown,
            dispatcher: Mutex::new(Some(dispatcher)),
        }
    }

    // =========================================================================
    // Submission
    // =========================================================================

    /// Accept a job for execution.
    ///
    /// Assigns a fresh [`JobId`], moves the job to `Scheduled`, and enqueues
    /// it. Fails with [`Error::Unavailable`] when the queue is full or the
    /// executor has shut down; a rejected job leaves no record behind.
    pub async fn schedule(&self, job: Arc<dyn Job>) -> Result<JobId> {
        if self.shutdown.is_cancelled() {
            return Err(Error::unavailable("executor is shut down"));
        }

        // Reserve queue space before creating the record so a full queue
        // rejects the job without ever marking it scheduled.
        let permit = self.queue_tx.try_reserve().map_err(|e| match e {
            mpsc::error::TrySendError::Full(()) => Error::unavailable("job queue is full"),
            mpsc::error::TrySendError::Closed(()) => Error::unavailable("executor is shut down"),
        })?;

        let id = JobId::new();
        let name = job.name().to_string();
        let job_type = job.job_type().to_string();

        {
            let mut records = self.records.write().await;
            let mut record = JobRecord::new(job);
            record.transition(JobStatus::Scheduled)?;
            records.insert(id.clone(), record);
        }

        tracing::debug!(job = %id, %job_type, "job scheduled");
        self.ctx
            .events
            .publish(Event::new(
                "job.scheduled",
                EVENT_ORIGIN,
                format!("job {id} ({name}) scheduled"),
            ))
            .await?;

        permit.send(id.clone());
        Ok(id)
    }

    /// Cancel a job that has not started yet.
    ///
    /// Returns `Ok(true)` if the job was still queued and is now completed
    /// with a failure reply. Running and finished jobs are left alone and
    /// yield `Ok(false)`.
    pub async fn abort(&self, id: &JobId) -> Result<bool> {
        let name = {
            let mut records = self.records.write().await;
            let record = records
                .get_mut(id)
                .ok_or_else(|| Error::not_found(format!("job {id}")))?;
            if record.status != JobStatus::Scheduled {
                return Ok(false);
            }
            record.complete(Reply::failure("aborted before start"))?;
            record.job.name().to_string()
        };

        tracing::info!(job = %id, "job aborted before start");
        self.ctx
            .events
            .publish(Event::new(
                "job.completed",
                EVENT_ORIGIN,
                format!("job {id} ({name}) completed: failure"),
            ))
            .await?;
        Ok(true)
    }

    // =========================================================================
    // Observation
    // =========================================================================

    /// Current view of one job, or `None` if the id is unknown.
    pub async fn snapshot(&self, id: &JobId) -> Option<JobSnapshot> {
        let records = self.records.read().await;
        records.get(id).map(|r| r.snapshot(id))
    }

    /// Snapshots of every known job, oldest submission first.
    pub async fn list(&self) -> Vec<JobSnapshot> {
        let records = self.records.read().await;
        let mut out: Vec<JobSnapshot> = records.iter().map(|(id, r)| r.snapshot(id)).collect();
        out.sort_by(|a, b| {
            a.submitted_at
                .cmp(&b.submitted_at)
                .then_with(|| a.identifier.as_str().cmp(b.identifier.as_str()))
        });
        out
    }

    /// Block until the job completes and return its reply.
    pub async fn wait_for_completion(&self, id: &JobId) -> Result<Reply> {
        let mut done_rx = {
            let records = self.records.read().await;
            let record = records
                .get(id)
                .ok_or_else(|| Error::not_found(format!("job {id}")))?;
            if let Some(reply) = &record.result {
                return Ok(reply.clone());
            }
            record.done.subscribe()
        };

        while !*done_rx.borrow() {
            done_rx
                .changed()
                .await
                .map_err(|_| Error::internal("job record dropped before completion"))?;
        }

        let records = self.records.read().await;
        records
            .get(id)
            .and_then(|r| r.result.clone())
            .ok_or_else(|| Error::internal("completed job has no result"))
    }

    // =========================================================================
    // Shutdown
    // =========================================================================

    /// Stop accepting jobs and wait up to `drain_timeout` for in-flight
    /// jobs to finish. Jobs still queued when the drain ends are completed
    /// with a failure reply so no observer waits on them forever.
    pub async fn shutdown(&self) -> Result<()> {
        self.shutdown.cancel();

        if let Some(handle) = self.dispatcher.lock().await.take() {
            let _ = handle.await;
        }

        // All permits home means no worker is still running.
        let drain = self.workers.acquire_many(self.pool_size as u32);
        match timeout(self.drain_timeout, drain).await {
            Ok(Ok(_permits)) => {}
            Ok(Err(_)) => {}
            Err(_) => {
                tracing::warn!(
                    timeout = ?self.drain_timeout,
                    "drain timed out, abandoning in-flight jobs"
                );
            }
        }

        let swept = {
            let mut records = self.records.write().await;
            let mut swept = Vec::new();
            for (id, record) in records.iter_mut() {
                if record.status == JobStatus::Scheduled
                    && record.complete(Reply::failure("executor shut down")).is_ok()
                {
                    swept.push((id.clone(), record.job.name().to_string()));
                }
            }
            swept
        };

        for (id, name) in swept {
            self.ctx
                .events
                .publish(Event::new(
                    "job.completed",
                    EVENT_ORIGIN,
                    format!("job {id} ({name}) completed: failure"),
                ))
                .await?;
        }

        tracing::info!("job executor shut down");
        Ok(())
    }
}

impl fmt::Debug for JobExecutor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("JobExecutor")
            .field("pool_size", &self.pool_size)
            .finish_non_exhaustive()
    }
}

// =============================================================================
// Dispatch Loop
// =============================================================================

/// Pull jobs off the queue in order, one worker slot at a time.
///
/// The permit is acquired *before* taking a job so queue order is start
/// order, and it moves into the worker task so the slot stays taken until
/// the job finishes.
async fn dispatch_loop(
    mut queue_rx: mpsc::Receiver<JobId>,
    records: RecordMap,
    workers: Arc<Semaphore>,
    ctx: JobContext,
    shutdown: CancellationToken,
) {
    loop {
        let permit = tokio::select! {
            _ = shutdown.cancelled() => break,
            permit = workers.clone().acquire_owned() => match permit {
                Ok(p) => p,
                Err(_) => break,
            },
        };

        let id = tokio::select! {
            _ = shutdown.cancelled() => break,
            maybe_id = queue_rx.recv() => match maybe_id {
                Some(id) => id,
                None => break,
            },
        };

        // Skip jobs aborted while they sat in the queue.
        let job = {
            let mut records_guard = records.write().await;
            let Some(record) = records_guard.get_mut(&id) else {
                continue;
            };
            if record.status != JobStatus::Scheduled {
                continue;
            }
            if let Err(e) = record.transition(JobStatus::Running) {
                tracing::error!(job = %id, error = %e, "failed to start job");
                continue;
            }
            record.job.clone()
        };

        let worker_records = records.clone();
        let worker_ctx = ctx.clone();
        tokio::spawn(async move {
            let _slot = permit;
            run_one(id, job, worker_records, worker_ctx).await;
        });
    }
}

/// Run a single job to completion and record its reply.
async fn run_one(id: JobId, job: Arc<dyn Job>, records: RecordMap, ctx: JobContext) {
    tracing::info!(job = %id, job_type = job.job_type(), "job started");
    let _ = ctx
        .events
        .publish(Event::new(
            "job.started",
            EVENT_ORIGIN,
            format!("job {} ({}) started", id, job.name()),
        ))
        .await;

    // The job runs in its own task so a panic unwinds that task, not the
    // worker, and surfaces here as a join error.
    let run_job = job.clone();
    let run_ctx = ctx.clone();
    let handle = tokio::spawn(async move { run_job.run(&run_ctx).await });

    let reply = match handle.await {
        Ok(Ok(reply)) => reply,
        Ok(Err(e)) => Reply::exception(e.to_string()),
        Err(join_err) if join_err.is_panic() => {
            let panic = join_err.into_panic();
            let message = panic
                .downcast_ref::<&str>()
                .map(|s| (*s).to_string())
                .or_else(|| panic.downcast_ref::<String>().cloned())
                .unwrap_or_else(|| "unknown panic".to_string());
            Reply::exception(format!("job panicked: {message}"))
        }
        Err(_) => Reply::exception("job task was cancelled"),
    };

    let outcome = reply.kind();
    {
        let mut records_guard = records.write().await;
        if let Some(record) = records_guard.get_mut(&id) {
            if let Err(e) = record.complete(reply) {
                tracing::error!(job = %id, error = %e, "failed to record job completion");
            }
        }
    }

    tracing::info!(job = %id, outcome, "job completed");
    let _ = ctx
        .events
        .publish(Event::new(
            "job.completed",
            EVENT_ORIGIN,
            format!("job {} ({}) completed: {}", id, job.name(), outcome),
        ))
        .await;
}
