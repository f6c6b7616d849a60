// SPDX-FileCopyrightText: 2026 Ticketflow Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Consumer side of the durable work queue.
//!
//! A [`Worker`] polls its queue on a fixed interval and runs jobs through
//! registered [`JobHandler`]s. Each job name carries its own concurrency
//! limit: names pinned to one never run two instances at once within the
//! worker, while independent send jobs fan out up to their limit.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use tokio::sync::{OwnedSemaphorePermit, Semaphore};
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use ticketflow_config::model::QueueConfig;
use ticketflow_core::types::{Job, JobStatus};
use ticketflow_core::TicketflowError;

use crate::queue::WorkQueue;

/// Executes one job. Returning an error consumes one attempt.
#[async_trait]
pub trait JobHandler: Send + Sync + 'static {
    async fn handle(&self, job: &Job) -> Result<(), TicketflowError>;
}

/// Polling and locking parameters for a [`Worker`].
#[derive(Debug, Clone, Copy)]
pub struct WorkerOptions {
    pub poll_interval: Duration,
    /// How long a dequeued job stays locked before it counts as stalled.
    pub lock_timeout: Duration,
}

impl From<&QueueConfig> for WorkerOptions {
    fn from(config: &QueueConfig) -> Self {
        Self {
            poll_interval: Duration::from_millis(config.poll_interval_ms.max(1)),
            lock_timeout: Duration::from_secs(config.lock_timeout_secs.max(1)),
        }
    }
}

impl Default for WorkerOptions {
    fn default() -> Self {
        Self::from(&QueueConfig::default())
    }
}

struct Registration {
    handler: Arc<dyn JobHandler>,
    permits: Arc<Semaphore>,
}

pub struct Worker {
    queue: Arc<WorkQueue>,
    options: WorkerOptions,
    handlers: HashMap<String, Registration>,
}

impl Worker {
    pub fn new(queue: Arc<WorkQueue>, options: WorkerOptions) -> Self {
        Self {
            queue,
            options,
            handlers: HashMap::new(),
        }
    }

    /// Registers `handler` for jobs named `name`, running at most
    /// `concurrency` of them at a time.
    pub fn register(
        mut self,
        name: impl Into<String>,
        handler: Arc<dyn JobHandler>,
        concurrency: usize,
    ) -> Self {
        self.handlers.insert(
            name.into(),
            Registration {
                handler,
                permits: Arc::new(Semaphore::new(concurrency.max(1))),
            },
        );
        self
    }

    pub fn job_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.handlers.keys().cloned().collect();
        names.sort();
        names
    }

    /// Polls until `cancel` fires, then waits for in-flight jobs.
    pub async fn run(self, cancel: CancellationToken) {
        let mut interval = tokio::time::interval(self.options.poll_interval);
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        let mut tasks = JoinSet::new();

        info!(
            queue = %self.queue.name(),
            jobs = ?self.job_names(),
            "worker started"
        );

        loop {
            tokio::select! {
                _ = interval.tick() => {
                    reap_finished(&mut tasks);
                    if let Err(e) = self.fill(&mut tasks).await {
                        warn!(queue = %self.queue.name(), error = %e, "worker poll failed");
                    }
                }
                _ = cancel.cancelled() => {
                    info!(in_flight = tasks.len(), "worker shutting down");
                    break;
                }
            }
        }

        let drain = async {
            while let Some(res) = tasks.join_next().await {
                log_join(res);
            }
        };
        if tokio::time::timeout(self.options.lock_timeout, drain)
            .await
            .is_err()
        {
            warn!("in-flight jobs did not finish before shutdown; they will be recovered as stalled");
        }
    }

    /// Runs every job that is runnable now, including jobs those jobs add
    /// with no delay, and returns how many ran.
    pub async fn run_until_idle(&self) -> Result<usize, TicketflowError> {
        let mut tasks = JoinSet::new();
        let mut total = 0;
        loop {
            let started = self.fill(&mut tasks).await?;
            if started == 0 && tasks.is_empty() {
                return Ok(total);
            }
            total += started;
            while let Some(res) = tasks.join_next().await {
                log_join(res);
            }
        }
    }

    /// Promotes due repeating jobs, then starts as many runnable jobs as
    /// the free concurrency slots allow.
    async fn fill(&self, tasks: &mut JoinSet<()>) -> Result<usize, TicketflowError> {
        match self.queue.promote_due().await {
            Ok(0) => {}
            Ok(n) => debug!(queue = %self.queue.name(), promoted = n, "repeating jobs promoted"),
            Err(e) => warn!(queue = %self.queue.name(), error = %e, "failed to promote repeating jobs"),
        }

        let mut started = 0;
        loop {
            let ready: Vec<String> = self
                .handlers
                .iter()
                .filter(|(_, reg)| reg.permits.available_permits() > 0)
                .map(|(name, _)| name.clone())
                .collect();
            if ready.is_empty() {
                break;
            }

            let now = self.queue.now();
            let lock_until = now
                + chrono::Duration::from_std(self.options.lock_timeout)
                    .unwrap_or(chrono::Duration::seconds(300));
            let Some(job) = self
                .queue
                .storage()
                .dequeue_job(self.queue.name(), &ready, now, lock_until)
                .await?
            else {
                break;
            };

            let Some(reg) = self.handlers.get(&job.name) else {
                // Only registered names are dequeued.
                continue;
            };
            let permit = reg
                .permits
                .clone()
                .acquire_owned()
                .await
                .map_err(|e| TicketflowError::Internal(format!("job semaphore closed: {e}")))?;
            tasks.spawn(execute(
                self.queue.clone(),
                reg.handler.clone(),
                job,
                permit,
            ));
            started += 1;
        }
        Ok(started)
    }
}

async fn execute(
    queue: Arc<WorkQueue>,
    handler: Arc<dyn JobHandler>,
    job: Job,
    _permit: OwnedSemaphorePermit,
) {
    let started = Instant::now();
    match handler.handle(&job).await {
        Ok(()) => match queue.storage().complete_job(job.id, queue.now()).await {
            Ok(()) => debug!(
                job_id = job.id,
                job = %job.name,
                elapsed_ms = started.elapsed().as_millis() as u64,
                "job completed"
            ),
            Err(e) => error!(job_id = job.id, job = %job.name, error = %e, "failed to mark job completed"),
        },
        Err(err) => {
            let attempt = job.attempts + 1;
            match queue
                .storage()
                .fail_job(job.id, &err.to_string(), queue.now())
                .await
            {
                Ok(JobStatus::Failed) => error!(
                    job_id = job.id,
                    job = %job.name,
                    attempt,
                    max_attempts = job.max_attempts,
                    error = %err,
                    "job failed permanently; left for inspection"
                ),
                Ok(_) => warn!(
                    job_id = job.id,
                    job = %job.name,
                    attempt,
                    max_attempts = job.max_attempts,
                    error = %err,
                    "job attempt failed; retrying with backoff"
                ),
                Err(e) => error!(job_id = job.id, job = %job.name, error = %e, "failed to record job failure"),
            }
        }
    }
}

fn reap_finished(tasks: &mut JoinSet<()>) {
    while let Some(res) = tasks.try_join_next() {
        log_join(res);
    }
}

fn log_join(res: Result<(), tokio::task::JoinError>) {
    if let Err(e) = res {
        if e.is_panic() {
            error!("job task panicked; the job will be recovered once its lock expires");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use ticketflow_core::types::{Backoff, JobOptions};
    use ticketflow_test_utils::TestHarness;

    struct Counting {
        runs: AtomicUsize,
        fail: bool,
    }

    impl Counting {
        fn new(fail: bool) -> Arc<Self> {
            Arc::new(Self {
                runs: AtomicUsize::new(0),
                fail,
            })
        }
    }

    #[async_trait]
    impl JobHandler for Counting {
        async fn handle(&self, _job: &Job) -> Result<(), TicketflowError> {
            self.runs.fetch_add(1, Ordering::SeqCst);
            if self.fail {
                Err(TicketflowError::transport("boom"))
            } else {
                Ok(())
            }
        }
    }

    /// Tracks the highest number of overlapping runs.
    struct Overlap {
        active: AtomicUsize,
        peak: AtomicUsize,
    }

    #[async_trait]
    impl JobHandler for Overlap {
        async fn handle(&self, _job: &Job) -> Result<(), TicketflowError> {
            let now = self.active.fetch_add(1, Ordering::SeqCst) + 1;
            self.peak.fetch_max(now, Ordering::SeqCst);
            tokio::time::sleep(Duration::from_millis(20)).await;
            self.active.fetch_sub(1, Ordering::SeqCst);
            Ok(())
        }
    }

    fn queue(harness: &TestHarness) -> Arc<WorkQueue> {
        Arc::new(WorkQueue::new(
            "test",
            harness.storage.clone(),
            harness.clock.clone(),
        ))
    }

    fn options(attempts: u32) -> JobOptions {
        JobOptions {
            delay_ms: 0,
            attempts,
            backoff: Backoff::Fixed { delay_ms: 1000 },
            remove_on_complete: false,
        }
    }

    #[tokio::test]
    async fn successful_job_is_completed() {
        let harness = TestHarness::new().await.unwrap();
        let q = queue(&harness);
        let handler = Counting::new(false);
        let worker = Worker::new(q.clone(), WorkerOptions::default()).register(
            "ok",
            handler.clone(),
            1,
        );

        q.add_raw("ok", "{}", options(3)).await.unwrap();
        assert_eq!(worker.run_until_idle().await.unwrap(), 1);
        assert_eq!(handler.runs.load(Ordering::SeqCst), 1);
        assert_eq!(q.jobs(Some(JobStatus::Completed)).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn failing_job_retries_after_backoff_then_fails() {
        let harness = TestHarness::new().await.unwrap();
        let q = queue(&harness);
        let handler = Counting::new(true);
        let worker = Worker::new(q.clone(), WorkerOptions::default()).register(
            "bad",
            handler.clone(),
            1,
        );

        q.add_raw("bad", "{}", options(2)).await.unwrap();
        worker.run_until_idle().await.unwrap();
        assert_eq!(handler.runs.load(Ordering::SeqCst), 1);
        let pending = q.jobs(Some(JobStatus::Pending)).await.unwrap();
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].last_error.as_deref(), Some("transport error: boom"));

        // Not runnable until the backoff has elapsed.
        assert_eq!(worker.run_until_idle().await.unwrap(), 0);
        harness.clock.advance(chrono::Duration::seconds(1));
        worker.run_until_idle().await.unwrap();

        assert_eq!(handler.runs.load(Ordering::SeqCst), 2);
        let failed = q.jobs(Some(JobStatus::Failed)).await.unwrap();
        assert_eq!(failed.len(), 1);
        assert_eq!(failed[0].attempts, 2);
    }

    #[tokio::test]
    async fn unregistered_names_are_left_alone() {
        let harness = TestHarness::new().await.unwrap();
        let q = queue(&harness);
        let worker = Worker::new(q.clone(), WorkerOptions::default()).register(
            "mine",
            Counting::new(false),
            1,
        );

        q.add_raw("someone_else", "{}", options(3)).await.unwrap();
        assert_eq!(worker.run_until_idle().await.unwrap(), 0);
        assert_eq!(q.jobs(Some(JobStatus::Pending)).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn concurrency_limit_is_respected_per_name() {
        let harness = TestHarness::new().await.unwrap();
        let q = queue(&harness);
        let pinned = Arc::new(Overlap {
            active: AtomicUsize::new(0),
            peak: AtomicUsize::new(0),
        });
        let wide = Arc::new(Overlap {
            active: AtomicUsize::new(0),
            peak: AtomicUsize::new(0),
        });
        let worker = Worker::new(q.clone(), WorkerOptions::default())
            .register("pinned", pinned.clone(), 1)
            .register("wide", wide.clone(), 3);

        for _ in 0..4 {
            q.add_raw("pinned", "{}", options(1)).await.unwrap();
            q.add_raw("wide", "{}", options(1)).await.unwrap();
        }
        assert_eq!(worker.run_until_idle().await.unwrap(), 8);
        assert_eq!(pinned.peak.load(Ordering::SeqCst), 1);
        assert!(wide.peak.load(Ordering::SeqCst) <= 3);
    }

    #[tokio::test]
    async fn run_stops_on_cancel() {
        let harness = TestHarness::new().await.unwrap();
        let q = queue(&harness);
        let handler = Counting::new(false);
        let worker = Worker::new(
            q.clone(),
            WorkerOptions {
                poll_interval: Duration::from_millis(10),
                lock_timeout: Duration::from_secs(5),
            },
        )
        .register("ok", handler.clone(), 1);

        q.add_raw("ok", "{}", options(1)).await.unwrap();
        let cancel = CancellationToken::new();
        let task = tokio::spawn(worker.run(cancel.clone()));

        tokio::time::timeout(Duration::from_secs(5), async {
            while handler.runs.load(Ordering::SeqCst) == 0 {
                tokio::time::sleep(Duration::from_millis(10)).await;
            }
        })
        .await
        .unwrap();

        cancel.cancel();
        tokio::time::timeout(Duration::from_secs(5), task)
            .await
            .unwrap()
            .unwrap();
    }
}
