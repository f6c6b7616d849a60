// SPDX-FileCopyrightText: 2026 Ticketflow Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Claim-and-enqueue loop for due scheduled messages.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::{debug, error, info};

use ticketflow_config::model::SchedulesConfig;
use ticketflow_core::types::{Backoff, Job, JobOptions, ScheduledMessage};
use ticketflow_core::{Clock, StorageAdapter, TicketflowError};
use ticketflow_queue::{JobHandler, QueueHandle, SEND_SCHEDULED_MESSAGE};

const RESOLVE_ATTEMPTS: u32 = 3;
const RESOLVE_DELAY: Duration = Duration::from_millis(200);

/// Payload of a `send_scheduled_message` job.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SendScheduledMessage {
    pub schedule: ScheduledMessage,
    pub connection_id: i64,
}

/// Claim-loop tuning, taken from the `[schedules]` section.
#[derive(Debug, Clone, Copy)]
pub struct ClaimSettings {
    pub lookahead: chrono::Duration,
    pub batch_size: usize,
    pub send_options: JobOptions,
}

impl From<&SchedulesConfig> for ClaimSettings {
    fn from(config: &SchedulesConfig) -> Self {
        Self {
            lookahead: chrono::Duration::seconds(
                i64::try_from(config.lookahead_secs).unwrap_or(60),
            ),
            batch_size: config.batch_size,
            send_options: JobOptions {
                delay_ms: config.enqueue_delay_ms,
                attempts: config.send_attempts,
                backoff: Backoff::Exponential {
                    base_ms: config.send_backoff_ms,
                },
                remove_on_complete: false,
            },
        }
    }
}

/// Moves due schedules into the work queue.
pub struct ScheduleClaimer {
    storage: Arc<dyn StorageAdapter>,
    clock: Arc<dyn Clock>,
    queue: Arc<QueueHandle>,
    settings: ClaimSettings,
}

impl ScheduleClaimer {
    pub fn new(
        storage: Arc<dyn StorageAdapter>,
        clock: Arc<dyn Clock>,
        queue: Arc<QueueHandle>,
        settings: ClaimSettings,
    ) -> Self {
        Self {
            storage,
            clock,
            queue,
            settings,
        }
    }

    /// Claims every pending schedule due within the lookahead window and
    /// enqueues one send job per record. Returns how many were claimed.
    ///
    /// The queue is resolved before anything is claimed, so a cycle that
    /// cannot reach the queue leaves every record pending for the next one.
    pub async fn run_cycle(&self) -> Result<usize, TicketflowError> {
        let queue = self
            .queue
            .resolve_with_retry(RESOLVE_ATTEMPTS, RESOLVE_DELAY)
            .await
            .inspect_err(|e| error!(queue = %self.queue.name(), error = %e, "claim cycle aborted"))?;

        let now = self.clock.now();
        let cutoff = now + self.settings.lookahead;
        let claimed = self
            .storage
            .claim_due_schedules(cutoff, self.settings.batch_size, now)
            .await?;
        if claimed.is_empty() {
            debug!(cutoff = %cutoff, "no due schedules");
            return Ok(0);
        }

        let count = claimed.len();
        let mut first_error = None;
        for item in claimed {
            let schedule_id = item.schedule.id;
            let payload = SendScheduledMessage {
                connection_id: item.schedule.connection_id,
                schedule: item.schedule,
            };
            match queue
                .add(SEND_SCHEDULED_MESSAGE, &payload, self.settings.send_options)
                .await
            {
                Ok(job_id) => debug!(schedule_id, job_id, "scheduled message enqueued"),
                Err(e) => {
                    error!(schedule_id, error = %e, "failed to enqueue claimed schedule; left CLAIMED");
                    first_error.get_or_insert(e);
                }
            }
        }
        if let Some(e) = first_error {
            return Err(e);
        }

        info!(claimed = count, "due schedules claimed and enqueued");
        Ok(count)
    }
}

#[async_trait]
impl JobHandler for ScheduleClaimer {
    async fn handle(&self, _job: &Job) -> Result<(), TicketflowError> {
        self.run_cycle().await.map(|_| ())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;
    use ticketflow_core::types::{JobStatus, NewSchedule, Recurrence, ScheduleStatus};
    use ticketflow_queue::{QueueRegistry, WorkQueue, clear_process_queue};
    use ticketflow_test_utils::harness::{CONNECTION_ID, CONTACT_ID, TENANT_ID};
    use ticketflow_test_utils::TestHarness;

    async fn seed(h: &TestHarness, offsets_secs: &[i64]) -> Vec<i64> {
        let rows = offsets_secs
            .iter()
            .map(|s| NewSchedule {
                tenant_id: TENANT_ID,
                contact_id: CONTACT_ID,
                connection_id: CONNECTION_ID,
                body: "Hello".into(),
                media_path: None,
                send_at: h.now() + chrono::Duration::seconds(*s),
                recurrence: Recurrence::None,
                recurrence_end: None,
            })
            .collect();
        h.storage
            .insert_schedules(rows, h.now())
            .await
            .unwrap()
            .into_iter()
            .map(|s| s.id)
            .collect()
    }

    fn claimer(h: &TestHarness, handle: Arc<QueueHandle>) -> ScheduleClaimer {
        ScheduleClaimer::new(
            h.storage.clone(),
            h.clock.clone(),
            handle,
            ClaimSettings::from(&h.config.schedules),
        )
    }

    fn queue(h: &TestHarness) -> Arc<WorkQueue> {
        Arc::new(WorkQueue::new("scheduled", h.storage.clone(), h.clock.clone()))
    }

    #[tokio::test]
    async fn claims_within_lookahead_and_enqueues_once() {
        let h = TestHarness::new().await.unwrap();
        let ids = seed(&h, &[30, 59, 600]).await;
        let queue = queue(&h);
        let handle = Arc::new(QueueHandle::with_queue(queue.clone(), Arc::new(QueueRegistry::new())));
        let claimer = claimer(&h, handle);

        assert_eq!(claimer.run_cycle().await.unwrap(), 2);
        // A second cycle right away finds nothing pending.
        assert_eq!(claimer.run_cycle().await.unwrap(), 0);

        let jobs = queue.jobs(Some(JobStatus::Pending)).await.unwrap();
        assert_eq!(jobs.len(), 2);
        let payload: SendScheduledMessage = serde_json::from_str(&jobs[0].payload).unwrap();
        assert_eq!(payload.connection_id, CONNECTION_ID);
        assert_eq!(jobs[0].max_attempts, h.config.schedules.send_attempts);
        assert!(jobs.iter().all(|j| j.run_at > h.now()));

        let far = h.storage.get_schedule(ids[2]).await.unwrap().unwrap();
        assert_eq!(far.status, ScheduleStatus::Pending);
        let near = h.storage.get_schedule(ids[0]).await.unwrap().unwrap();
        assert_eq!(near.status, ScheduleStatus::Claimed);
    }

    #[tokio::test]
    async fn batch_size_bounds_one_cycle() {
        let h = TestHarness::new().await.unwrap();
        seed(&h, &[1, 2, 3, 4, 5]).await;
        let handle = Arc::new(QueueHandle::with_queue(queue(&h), Arc::new(QueueRegistry::new())));
        let claimer = ScheduleClaimer::new(
            h.storage.clone(),
            h.clock.clone(),
            handle,
            ClaimSettings {
                batch_size: 2,
                ..ClaimSettings::from(&h.config.schedules)
            },
        );

        assert_eq!(claimer.run_cycle().await.unwrap(), 2);
        assert_eq!(claimer.run_cycle().await.unwrap(), 2);
        assert_eq!(claimer.run_cycle().await.unwrap(), 1);
    }

    #[tokio::test]
    #[serial]
    async fn unavailable_queue_aborts_without_claiming() {
        clear_process_queue();
        let h = TestHarness::new().await.unwrap();
        let ids = seed(&h, &[10]).await;
        let handle = Arc::new(QueueHandle::new("scheduled", Arc::new(QueueRegistry::new())));

        let err = claimer(&h, handle).run_cycle().await.unwrap_err();
        assert!(matches!(err, TicketflowError::QueueUnavailable(_)));
        let record = h.storage.get_schedule(ids[0]).await.unwrap().unwrap();
        assert_eq!(record.status, ScheduleStatus::Pending);
    }

    #[tokio::test]
    #[serial]
    async fn lost_reference_recovers_from_registry() {
        clear_process_queue();
        let h = TestHarness::new().await.unwrap();
        seed(&h, &[10]).await;
        let registry = Arc::new(QueueRegistry::new());
        let queue = queue(&h);
        registry.insert(queue.clone());
        let handle = Arc::new(QueueHandle::with_queue(queue.clone(), registry));
        handle.clear();

        assert_eq!(claimer(&h, handle).run_cycle().await.unwrap(), 1);
        assert_eq!(queue.jobs(None).await.unwrap().len(), 1);
    }
}
