// SPDX-FileCopyrightText: 2026 Ticketflow Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Named periodic jobs and their registration.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tracing::{debug, info, warn};

use ticketflow_config::TicketflowConfig;
use ticketflow_config::model::QueueConfig;
use ticketflow_core::types::{Backoff, Job, JobOptions};
use ticketflow_core::TicketflowError;

use crate::queue::WorkQueue;
use crate::worker::JobHandler;

pub const CLAIM_SCHEDULED_MESSAGES: &str = "claim_scheduled_messages";
pub const REAP_EXPIRED_SESSIONS: &str = "reap_expired_sessions";
pub const RECOVER_STALLED_JOBS: &str = "recover_stalled_jobs";
/// One-off job added per claimed schedule record.
pub const SEND_SCHEDULED_MESSAGE: &str = "send_scheduled_message";

const RECOVER_INTERVAL: Duration = Duration::from_secs(60);

/// A repeating job, its trigger interval and the options of each instance.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PeriodicJob {
    pub name: &'static str,
    pub every: Duration,
    pub options: JobOptions,
}

/// The housekeeping jobs with intervals and retry policy taken from
/// configuration.
pub fn periodic_jobs(config: &TicketflowConfig) -> Vec<PeriodicJob> {
    let options = periodic_job_options(&config.queue);
    vec![
        PeriodicJob {
            name: CLAIM_SCHEDULED_MESSAGES,
            every: Duration::from_secs(config.schedules.claim_interval_secs),
            options,
        },
        PeriodicJob {
            name: REAP_EXPIRED_SESSIONS,
            every: Duration::from_secs(config.sessions.reap_interval_secs),
            options,
        },
        PeriodicJob {
            name: RECOVER_STALLED_JOBS,
            every: RECOVER_INTERVAL,
            options,
        },
    ]
}

/// Options shared by every periodic job.
pub fn periodic_job_options(config: &QueueConfig) -> JobOptions {
    JobOptions {
        delay_ms: 0,
        attempts: config.default_attempts.max(1),
        backoff: Backoff::Exponential {
            base_ms: config.default_backoff_ms,
        },
        remove_on_complete: true,
    }
}

/// Registers each job, first clearing any repeating definition left by a
/// previous run so schedules do not pile up across restarts.
pub async fn register_periodic_jobs(
    queue: &WorkQueue,
    jobs: &[PeriodicJob],
) -> Result<(), TicketflowError> {
    for job in jobs {
        if queue.remove_repeatable(job.name).await? {
            debug!(job = job.name, "cleared previous repeating definition");
        }
        queue
            .add_repeatable(job.name, job.every, job.options)
            .await?;
        info!(
            queue = %queue.name(),
            job = job.name,
            every_secs = job.every.as_secs(),
            "periodic job registered"
        );
    }
    Ok(())
}

/// Returns jobs abandoned by a crashed worker to the queue.
pub struct RecoverStalledJobs {
    queue: Arc<WorkQueue>,
}

impl RecoverStalledJobs {
    pub fn new(queue: Arc<WorkQueue>) -> Self {
        Self { queue }
    }
}

#[async_trait]
impl JobHandler for RecoverStalledJobs {
    async fn handle(&self, _job: &Job) -> Result<(), TicketflowError> {
        let (requeued, failed) = self.queue.recover_stalled().await?;
        if failed > 0 {
            warn!(
                queue = %self.queue.name(),
                failed,
                "stalled jobs out of attempts; marked failed"
            );
        }
        if requeued > 0 {
            info!(queue = %self.queue.name(), requeued, "stalled jobs returned to the queue");
        } else if failed == 0 {
            debug!(queue = %self.queue.name(), "no stalled jobs");
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ticketflow_core::types::JobStatus;
    use ticketflow_test_utils::TestHarness;

    use crate::worker::{Worker, WorkerOptions};

    fn work_queue(harness: &TestHarness) -> Arc<WorkQueue> {
        Arc::new(WorkQueue::new(
            "ticketflow",
            harness.storage.clone(),
            harness.clock.clone(),
        ))
    }

    #[test]
    fn default_intervals_follow_config() {
        let jobs = periodic_jobs(&TicketflowConfig::default());
        let names: Vec<_> = jobs.iter().map(|j| j.name).collect();
        assert_eq!(
            names,
            vec![CLAIM_SCHEDULED_MESSAGES, REAP_EXPIRED_SESSIONS, RECOVER_STALLED_JOBS]
        );
        assert_eq!(jobs[0].every, Duration::from_secs(30));
        assert_eq!(jobs[1].every, Duration::from_secs(60));
    }

    #[test]
    fn retry_policy_follows_queue_config() {
        let mut config = TicketflowConfig::default();
        config.queue.default_attempts = 5;
        config.queue.default_backoff_ms = 250;

        for job in periodic_jobs(&config) {
            assert_eq!(job.options.attempts, 5);
            assert_eq!(job.options.backoff, Backoff::Exponential { base_ms: 250 });
            assert!(job.options.remove_on_complete);
        }
    }

    #[tokio::test]
    async fn reregistration_does_not_duplicate_definitions() {
        let harness = TestHarness::new().await.unwrap();
        let q = work_queue(&harness);
        let jobs = periodic_jobs(&harness.config);

        register_periodic_jobs(&q, &jobs).await.unwrap();
        register_periodic_jobs(&q, &jobs).await.unwrap();

        let defs = q.repeatables().await.unwrap();
        assert_eq!(defs.len(), 3);
        assert!(defs.iter().all(|d| d.options.remove_on_complete));
        assert!(defs.iter().all(|d| d.options.attempts == 3));
    }

    #[tokio::test]
    async fn periodic_instances_are_removed_on_completion() {
        let harness = TestHarness::new().await.unwrap();
        let q = work_queue(&harness);
        register_periodic_jobs(
            &q,
            &[PeriodicJob {
                name: RECOVER_STALLED_JOBS,
                every: RECOVER_INTERVAL,
                options: periodic_job_options(&harness.config.queue),
            }],
        )
        .await
        .unwrap();

        let worker = Worker::new(q.clone(), WorkerOptions::default()).register(
            RECOVER_STALLED_JOBS,
            Arc::new(RecoverStalledJobs::new(q.clone())),
            1,
        );
        assert_eq!(worker.run_until_idle().await.unwrap(), 1);
        assert!(q.jobs(None).await.unwrap().is_empty());

        // Next instance only after the interval.
        assert_eq!(worker.run_until_idle().await.unwrap(), 0);
        harness.clock.advance(chrono::Duration::seconds(60));
        assert_eq!(worker.run_until_idle().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn stalled_jobs_are_recovered() {
        let harness = TestHarness::new().await.unwrap();
        let q = work_queue(&harness);
        q.add_raw("send", "{}", JobOptions::default()).await.unwrap();

        // Simulate a worker that locked the job and died.
        let now = q.now();
        let locked = harness
            .storage
            .dequeue_job(
                "ticketflow",
                &["send".to_string()],
                now,
                now + chrono::Duration::seconds(30),
            )
            .await
            .unwrap();
        assert!(locked.is_some());

        let handler = RecoverStalledJobs::new(q.clone());
        let job = q.jobs(None).await.unwrap().remove(0);
        handler.handle(&job).await.unwrap();
        assert_eq!(q.jobs(Some(JobStatus::Processing)).await.unwrap().len(), 1);

        harness.clock.advance(chrono::Duration::seconds(31));
        handler.handle(&job).await.unwrap();
        let pending = q.jobs(Some(JobStatus::Pending)).await.unwrap();
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].attempts, 1);
    }

    #[tokio::test]
    async fn stalled_job_without_attempts_left_is_failed() {
        let harness = TestHarness::new().await.unwrap();
        let q = work_queue(&harness);
        let options = JobOptions {
            attempts: 1,
            ..JobOptions::default()
        };
        q.add_raw("send", "{}", options).await.unwrap();

        let now = q.now();
        harness
            .storage
            .dequeue_job(
                "ticketflow",
                &["send".to_string()],
                now,
                now + chrono::Duration::seconds(30),
            )
            .await
            .unwrap();
        harness.clock.advance(chrono::Duration::seconds(31));

        let handler = RecoverStalledJobs::new(q.clone());
        let job = q.jobs(None).await.unwrap().remove(0);
        handler.handle(&job).await.unwrap();

        assert!(q.jobs(Some(JobStatus::Pending)).await.unwrap().is_empty());
        let failed = q.jobs(Some(JobStatus::Failed)).await.unwrap();
        assert_eq!(failed.len(), 1);
        assert_eq!(failed[0].last_error.as_deref(), Some("lock expired"));
    }
}
