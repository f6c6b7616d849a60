// SPDX-FileCopyrightText: 2026 Ticketflow Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Producer side of the durable work queue.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::debug;

use ticketflow_core::types::{Job, JobOptions, JobStatus, RepeatableJob};
use ticketflow_core::{Clock, StorageAdapter, TicketflowError};

/// A named durable job queue backed by the storage adapter.
///
/// Jobs survive process restarts. A job is runnable once its `run_at` has
/// passed; failed attempts are rescheduled with the job's backoff until its
/// attempt budget is spent.
pub struct WorkQueue {
    name: String,
    storage: Arc<dyn StorageAdapter>,
    clock: Arc<dyn Clock>,
}

impl WorkQueue {
    pub fn new(
        name: impl Into<String>,
        storage: Arc<dyn StorageAdapter>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            name: name.into(),
            storage,
            clock,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn now(&self) -> DateTime<Utc> {
        self.clock.now()
    }

    pub(crate) fn storage(&self) -> &Arc<dyn StorageAdapter> {
        &self.storage
    }

    /// Adds a job whose payload is `payload` serialized as JSON.
    pub async fn add<T: Serialize + ?Sized>(
        &self,
        job_name: &str,
        payload: &T,
        options: JobOptions,
    ) -> Result<i64, TicketflowError> {
        let payload = serde_json::to_string(payload)?;
        self.add_raw(job_name, &payload, options).await
    }

    pub async fn add_raw(
        &self,
        job_name: &str,
        payload: &str,
        options: JobOptions,
    ) -> Result<i64, TicketflowError> {
        let id = self
            .storage
            .enqueue_job(&self.name, job_name, payload, options, self.now())
            .await?;
        debug!(queue = %self.name, job = job_name, job_id = id, delay_ms = options.delay_ms, "job added");
        Ok(id)
    }

    /// Registers a repeating job. The first instance is due immediately.
    ///
    /// Any prior definition with the same name is replaced together with the
    /// instances it left pending.
    pub async fn add_repeatable(
        &self,
        job_name: &str,
        every: Duration,
        options: JobOptions,
    ) -> Result<(), TicketflowError> {
        let every_ms = u64::try_from(every.as_millis()).unwrap_or(u64::MAX).max(1);
        let def = RepeatableJob {
            queue_name: self.name.clone(),
            name: job_name.to_string(),
            every_ms,
            options,
            next_run_at: self.now(),
        };
        self.storage.upsert_repeatable(&def).await
    }

    pub async fn remove_repeatable(&self, job_name: &str) -> Result<bool, TicketflowError> {
        self.storage.remove_repeatable(&self.name, job_name).await
    }

    pub async fn repeatables(&self) -> Result<Vec<RepeatableJob>, TicketflowError> {
        self.storage.list_repeatables(&self.name).await
    }

    /// Enqueues instances of repeating jobs that are due.
    pub async fn promote_due(&self) -> Result<usize, TicketflowError> {
        self.storage.promote_repeatables(&self.name, self.now()).await
    }

    /// Requeues or fails jobs whose worker lock expired. Returns
    /// `(requeued, failed)`.
    pub async fn recover_stalled(&self) -> Result<(u64, u64), TicketflowError> {
        self.storage.recover_stalled_jobs(self.now()).await
    }

    pub async fn jobs(&self, status: Option<JobStatus>) -> Result<Vec<Job>, TicketflowError> {
        self.storage.list_jobs(&self.name, status).await
    }
}

impl std::fmt::Debug for WorkQueue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WorkQueue").field("name", &self.name).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ticketflow_test_utils::TestHarness;

    fn queue(harness: &TestHarness) -> WorkQueue {
        WorkQueue::new("test", harness.storage.clone(), harness.clock.clone())
    }

    #[tokio::test]
    async fn add_serializes_payload() {
        let harness = TestHarness::new().await.unwrap();
        let q = queue(&harness);

        q.add("send", &serde_json::json!({"schedule_id": 7}), JobOptions::default())
            .await
            .unwrap();

        let jobs = q.jobs(Some(JobStatus::Pending)).await.unwrap();
        assert_eq!(jobs.len(), 1);
        assert_eq!(jobs[0].name, "send");
        let payload: serde_json::Value = serde_json::from_str(&jobs[0].payload).unwrap();
        assert_eq!(payload["schedule_id"], 7);
        assert_eq!(jobs[0].run_at, harness.now());
    }

    #[tokio::test]
    async fn repeatable_is_due_immediately_and_replaced_on_reregistration() {
        let harness = TestHarness::new().await.unwrap();
        let q = queue(&harness);

        q.add_repeatable("sweep", Duration::from_secs(60), JobOptions::default())
            .await
            .unwrap();
        assert_eq!(q.promote_due().await.unwrap(), 1);

        q.add_repeatable("sweep", Duration::from_secs(30), JobOptions::default())
            .await
            .unwrap();
        let defs = q.repeatables().await.unwrap();
        assert_eq!(defs.len(), 1);
        assert_eq!(defs[0].every_ms, 30_000);
        // The pending instance of the old definition went with it.
        assert!(q.jobs(Some(JobStatus::Pending)).await.unwrap().is_empty());
    }
}
