// SPDX-FileCopyrightText: 2026 Ticketflow Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Storage adapter trait for persistence backends (SQLite, etc.).

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::error::TicketflowError;
use crate::traits::adapter::PluginAdapter;
use crate::types::{
    Assistant, ChannelConnection, ClaimedSchedule, Contact, Conversation, ConversationSession,
    ExpiredSession, IntegrationBinding, Job, JobOptions, JobStatus, NewSchedule, Queue,
    RepeatableJob, ScheduledMessage, Tenant,
};

/// Adapter for storage and persistence backends.
///
/// Every conditional transition (claiming, marking sent, cancelling) is a
/// single guarded update so concurrent claimers never observe the same row
/// in the same state twice.
#[async_trait]
pub trait StorageAdapter: PluginAdapter {
    /// Initializes the storage backend (migrations, pragmas).
    async fn initialize(&self) -> Result<(), TicketflowError>;

    /// Closes the storage backend, flushing pending writes and releasing connections.
    async fn close(&self) -> Result<(), TicketflowError>;

    // --- Directory ---

    async fn get_tenant(&self, id: i64) -> Result<Option<Tenant>, TicketflowError>;
    async fn upsert_tenant(&self, tenant: &Tenant) -> Result<(), TicketflowError>;

    async fn get_queue(&self, id: i64) -> Result<Option<Queue>, TicketflowError>;
    async fn upsert_queue(&self, queue: &Queue) -> Result<(), TicketflowError>;
    /// Menu option ids configured under a queue, in display order.
    async fn queue_option_ids(&self, queue_id: i64) -> Result<Vec<i64>, TicketflowError>;
    async fn add_queue_option(
        &self,
        queue_id: i64,
        title: &str,
    ) -> Result<i64, TicketflowError>;

    async fn get_contact(&self, id: i64) -> Result<Option<Contact>, TicketflowError>;
    async fn upsert_contact(&self, contact: &Contact) -> Result<(), TicketflowError>;

    async fn get_connection(&self, id: i64)
    -> Result<Option<ChannelConnection>, TicketflowError>;
    async fn upsert_connection(&self, conn: &ChannelConnection) -> Result<(), TicketflowError>;
    /// The tenant's default connection, if one is flagged.
    async fn default_connection(
        &self,
        tenant_id: i64,
    ) -> Result<Option<ChannelConnection>, TicketflowError>;

    async fn get_conversation(&self, id: i64) -> Result<Option<Conversation>, TicketflowError>;
    /// Inserts or fully overwrites a conversation row.
    async fn save_conversation(&self, conversation: &Conversation)
    -> Result<(), TicketflowError>;

    async fn get_binding(&self, id: i64) -> Result<Option<IntegrationBinding>, TicketflowError>;
    async fn upsert_binding(&self, binding: &IntegrationBinding) -> Result<(), TicketflowError>;

    /// Resolves an active assistant for the tenant. When `assistant_id` is
    /// given only that assistant is considered.
    async fn find_active_assistant(
        &self,
        tenant_id: i64,
        assistant_id: Option<i64>,
    ) -> Result<Option<Assistant>, TicketflowError>;
    async fn upsert_assistant(&self, assistant: &Assistant) -> Result<(), TicketflowError>;

    // --- Conversation sessions ---

    /// Creates or replaces the session owned by `session.conversation_id`.
    async fn upsert_session(&self, session: &ConversationSession) -> Result<(), TicketflowError>;
    async fn get_session(
        &self,
        conversation_id: i64,
    ) -> Result<Option<ConversationSession>, TicketflowError>;
    async fn delete_session(&self, conversation_id: i64) -> Result<bool, TicketflowError>;
    /// Sessions with `expires_at < now`, joined with their conversation and contact.
    async fn list_expired_sessions(
        &self,
        now: DateTime<Utc>,
    ) -> Result<Vec<ExpiredSession>, TicketflowError>;

    // --- Scheduled messages ---

    /// Inserts all records in one transaction. Either every row is written or none.
    async fn insert_schedules(
        &self,
        records: Vec<NewSchedule>,
        now: DateTime<Utc>,
    ) -> Result<Vec<ScheduledMessage>, TicketflowError>;
    async fn get_schedule(&self, id: i64) -> Result<Option<ScheduledMessage>, TicketflowError>;
    async fn list_schedules(&self, tenant_id: i64)
    -> Result<Vec<ScheduledMessage>, TicketflowError>;
    /// Overwrites mutable fields only while the row is still PENDING.
    async fn update_pending_schedule(
        &self,
        schedule: &ScheduledMessage,
        now: DateTime<Utc>,
    ) -> Result<bool, TicketflowError>;
    /// Flips up to `limit` PENDING rows with `send_at <= cutoff` to CLAIMED and returns them.
    async fn claim_due_schedules(
        &self,
        cutoff: DateTime<Utc>,
        limit: usize,
        now: DateTime<Utc>,
    ) -> Result<Vec<ClaimedSchedule>, TicketflowError>;
    /// CLAIMED -> SENT. Returns `false` if the row was not CLAIMED.
    async fn mark_schedule_sent(
        &self,
        id: i64,
        sent_at: DateTime<Utc>,
    ) -> Result<bool, TicketflowError>;
    /// PENDING or CLAIMED -> CANCELLED.
    async fn cancel_schedule(&self, id: i64, now: DateTime<Utc>) -> Result<bool, TicketflowError>;

    // --- Durable jobs ---

    async fn enqueue_job(
        &self,
        queue: &str,
        name: &str,
        payload: &str,
        options: JobOptions,
        now: DateTime<Utc>,
    ) -> Result<i64, TicketflowError>;
    /// Locks the oldest runnable job whose name is in `names` until `lock_until`.
    async fn dequeue_job(
        &self,
        queue: &str,
        names: &[String],
        now: DateTime<Utc>,
        lock_until: DateTime<Utc>,
    ) -> Result<Option<Job>, TicketflowError>;
    async fn complete_job(&self, id: i64, now: DateTime<Utc>) -> Result<(), TicketflowError>;
    /// Records a failure. Reschedules with backoff while attempts remain,
    /// otherwise marks the job failed. Returns the resulting status.
    async fn fail_job(
        &self,
        id: i64,
        error: &str,
        now: DateTime<Utc>,
    ) -> Result<JobStatus, TicketflowError>;
    /// Counts an expired lock as a failed attempt. PROCESSING jobs whose lock
    /// expired go back to PENDING while attempts remain and are marked FAILED
    /// otherwise. Returns `(requeued, failed)`.
    async fn recover_stalled_jobs(
        &self,
        now: DateTime<Utc>,
    ) -> Result<(u64, u64), TicketflowError>;
    async fn list_jobs(
        &self,
        queue: &str,
        status: Option<JobStatus>,
    ) -> Result<Vec<Job>, TicketflowError>;

    /// Registers a repeatable definition, replacing any prior definition
    /// (and its pending instances) with the same queue and name.
    async fn upsert_repeatable(&self, job: &RepeatableJob) -> Result<(), TicketflowError>;
    async fn remove_repeatable(&self, queue: &str, name: &str) -> Result<bool, TicketflowError>;
    async fn list_repeatables(&self, queue: &str) -> Result<Vec<RepeatableJob>, TicketflowError>;
    /// Enqueues one instance of every repeatable due at `now` and advances its next run.
    /// Returns the number of instances enqueued.
    async fn promote_repeatables(
        &self,
        queue: &str,
        now: DateTime<Utc>,
    ) -> Result<usize, TicketflowError>;
}
