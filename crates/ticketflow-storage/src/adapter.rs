// SPDX-FileCopyrightText: 2026 Ticketflow Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! SQLite implementation of the StorageAdapter trait.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::OnceCell;
use tracing::debug;

use ticketflow_config::model::StorageConfig;
use ticketflow_core::types::{
    Assistant, ChannelConnection, ClaimedSchedule, Contact, Conversation, ConversationSession,
    ExpiredSession, IntegrationBinding, Job, JobOptions, JobStatus, NewSchedule, Queue,
    RepeatableJob, ScheduledMessage, Tenant,
};
use ticketflow_core::{AdapterType, HealthStatus, PluginAdapter, StorageAdapter, TicketflowError};

use crate::database::Database;
use crate::queries;

/// SQLite-backed storage adapter.
///
/// Wraps a [`Database`] handle and delegates to the typed query modules.
/// The database is opened on the first call to [`StorageAdapter::initialize`].
pub struct SqliteStorage {
    config: StorageConfig,
    db: OnceCell<Database>,
}

impl SqliteStorage {
    /// The database connection is not opened until `initialize` is called.
    pub fn new(config: StorageConfig) -> Self {
        Self {
            config,
            db: OnceCell::new(),
        }
    }

    fn db(&self) -> Result<&Database, TicketflowError> {
        self.db.get().ok_or_else(|| TicketflowError::Storage {
            source: "storage not initialized -- call initialize() first".into(),
        })
    }
}

#[async_trait]
impl PluginAdapter for SqliteStorage {
    fn name(&self) -> &str {
        "sqlite"
    }

    fn version(&self) -> semver::Version {
        semver::Version::new(0, 1, 0)
    }

    fn adapter_type(&self) -> AdapterType {
        AdapterType::Storage
    }

    async fn health_check(&self) -> Result<HealthStatus, TicketflowError> {
        let db = self.db()?;
        db.connection()
            .call(|conn| -> Result<i64, rusqlite::Error> {
                conn.query_row("SELECT 1", [], |row| row.get(0))
            })
            .await
            .map_err(crate::database::map_tr_err)?;
        Ok(HealthStatus::Healthy)
    }

    async fn shutdown(&self) -> Result<(), TicketflowError> {
        if let Some(db) = self.db.get() {
            db.checkpoint().await?;
            debug!("shutdown: WAL checkpoint complete");
        }
        Ok(())
    }
}

#[async_trait]
impl StorageAdapter for SqliteStorage {
    async fn initialize(&self) -> Result<(), TicketflowError> {
        let db = Database::open_with(&self.config.database_path, self.config.wal_mode).await?;
        self.db.set(db).map_err(|_| TicketflowError::Storage {
            source: "storage already initialized".into(),
        })?;
        debug!(path = %self.config.database_path, "SQLite storage initialized");
        Ok(())
    }

    async fn close(&self) -> Result<(), TicketflowError> {
        self.db()?.checkpoint().await?;
        debug!("WAL checkpoint complete");
        Ok(())
    }

    // --- Directory ---

    async fn get_tenant(&self, id: i64) -> Result<Option<Tenant>, TicketflowError> {
        queries::directory::get_tenant(self.db()?, id).await
    }

    async fn upsert_tenant(&self, tenant: &Tenant) -> Result<(), TicketflowError> {
        queries::directory::upsert_tenant(self.db()?, tenant).await
    }

    async fn get_queue(&self, id: i64) -> Result<Option<Queue>, TicketflowError> {
        queries::directory::get_queue(self.db()?, id).await
    }

    async fn upsert_queue(&self, queue: &Queue) -> Result<(), TicketflowError> {
        queries::directory::upsert_queue(self.db()?, queue).await
    }

    async fn queue_option_ids(&self, queue_id: i64) -> Result<Vec<i64>, TicketflowError> {
        queries::directory::queue_option_ids(self.db()?, queue_id).await
    }

    async fn add_queue_option(&self, queue_id: i64, title: &str) -> Result<i64, TicketflowError> {
        queries::directory::add_queue_option(self.db()?, queue_id, title).await
    }

    async fn get_contact(&self, id: i64) -> Result<Option<Contact>, TicketflowError> {
        queries::directory::get_contact(self.db()?, id).await
    }

    async fn upsert_contact(&self, contact: &Contact) -> Result<(), TicketflowError> {
        queries::directory::upsert_contact(self.db()?, contact).await
    }

    async fn get_connection(
        &self,
        id: i64,
    ) -> Result<Option<ChannelConnection>, TicketflowError> {
        queries::directory::get_connection(self.db()?, id).await
    }

    async fn upsert_connection(&self, conn: &ChannelConnection) -> Result<(), TicketflowError> {
        queries::directory::upsert_connection(self.db()?, conn).await
    }

    async fn default_connection(
        &self,
        tenant_id: i64,
    ) -> Result<Option<ChannelConnection>, TicketflowError> {
        queries::directory::default_connection(self.db()?, tenant_id).await
    }

    async fn get_conversation(&self, id: i64) -> Result<Option<Conversation>, TicketflowError> {
        queries::conversations::get_conversation(self.db()?, id).await
    }

    async fn save_conversation(&self, conversation: &Conversation) -> Result<(), TicketflowError> {
        queries::conversations::save_conversation(self.db()?, conversation).await
    }

    async fn get_binding(&self, id: i64) -> Result<Option<IntegrationBinding>, TicketflowError> {
        queries::bindings::get_binding(self.db()?, id).await
    }

    async fn upsert_binding(&self, binding: &IntegrationBinding) -> Result<(), TicketflowError> {
        queries::bindings::upsert_binding(self.db()?, binding).await
    }

    async fn find_active_assistant(
        &self,
        tenant_id: i64,
        assistant_id: Option<i64>,
    ) -> Result<Option<Assistant>, TicketflowError> {
        queries::bindings::find_active_assistant(self.db()?, tenant_id, assistant_id).await
    }

    async fn upsert_assistant(&self, assistant: &Assistant) -> Result<(), TicketflowError> {
        queries::bindings::upsert_assistant(self.db()?, assistant).await
    }

    // --- Conversation sessions ---

    async fn upsert_session(&self, session: &ConversationSession) -> Result<(), TicketflowError> {
        queries::sessions::upsert_session(self.db()?, session).await
    }

    async fn get_session(
        &self,
        conversation_id: i64,
    ) -> Result<Option<ConversationSession>, TicketflowError> {
        queries::sessions::get_session(self.db()?, conversation_id).await
    }

    async fn delete_session(&self, conversation_id: i64) -> Result<bool, TicketflowError> {
        queries::sessions::delete_session(self.db()?, conversation_id).await
    }

    async fn list_expired_sessions(
        &self,
        now: DateTime<Utc>,
    ) -> Result<Vec<ExpiredSession>, TicketflowError> {
        queries::sessions::list_expired_sessions(self.db()?, now).await
    }

    // --- Scheduled messages ---

    async fn insert_schedules(
        &self,
        records: Vec<NewSchedule>,
        now: DateTime<Utc>,
    ) -> Result<Vec<ScheduledMessage>, TicketflowError> {
        queries::schedules::insert_schedules(self.db()?, records, now).await
    }

    async fn get_schedule(&self, id: i64) -> Result<Option<ScheduledMessage>, TicketflowError> {
        queries::schedules::get_schedule(self.db()?, id).await
    }

    async fn list_schedules(
        &self,
        tenant_id: i64,
    ) -> Result<Vec<ScheduledMessage>, TicketflowError> {
        queries::schedules::list_schedules(self.db()?, tenant_id).await
    }

    async fn update_pending_schedule(
        &self,
        schedule: &ScheduledMessage,
        now: DateTime<Utc>,
    ) -> Result<bool, TicketflowError> {
        queries::schedules::update_pending_schedule(self.db()?, schedule, now).await
    }

    async fn claim_due_schedules(
        &self,
        cutoff: DateTime<Utc>,
        limit: usize,
        now: DateTime<Utc>,
    ) -> Result<Vec<ClaimedSchedule>, TicketflowError> {
        queries::schedules::claim_due_schedules(self.db()?, cutoff, limit, now).await
    }

    async fn mark_schedule_sent(
        &self,
        id: i64,
        sent_at: DateTime<Utc>,
    ) -> Result<bool, TicketflowError> {
        queries::schedules::mark_schedule_sent(self.db()?, id, sent_at).await
    }

    async fn cancel_schedule(&self, id: i64, now: DateTime<Utc>) -> Result<bool, TicketflowError> {
        queries::schedules::cancel_schedule(self.db()?, id, now).await
    }

    // --- Durable jobs ---

    async fn enqueue_job(
        &self,
        queue: &str,
        name: &str,
        payload: &str,
        options: JobOptions,
        now: DateTime<Utc>,
    ) -> Result<i64, TicketflowError> {
        queries::jobs::enqueue_job(self.db()?, queue, name, payload, options, now).await
    }

    async fn dequeue_job(
        &self,
        queue: &str,
        names: &[String],
        now: DateTime<Utc>,
        lock_until: DateTime<Utc>,
    ) -> Result<Option<Job>, TicketflowError> {
        queries::jobs::dequeue_job(self.db()?, queue, names, now, lock_until).await
    }

    async fn complete_job(&self, id: i64, now: DateTime<Utc>) -> Result<(), TicketflowError> {
        queries::jobs::complete_job(self.db()?, id, now).await
    }

    async fn fail_job(
        &self,
        id: i64,
        error: &str,
        now: DateTime<Utc>,
    ) -> Result<JobStatus, TicketflowError> {
        queries::jobs::fail_job(self.db()?, id, error, now).await
    }

    async fn recover_stalled_jobs(
        &self,
        now: DateTime<Utc>,
    ) -> Result<(u64, u64), TicketflowError> {
        queries::jobs::recover_stalled_jobs(self.db()?, now).await
    }

    async fn list_jobs(
        &self,
        queue: &str,
        status: Option<JobStatus>,
    ) -> Result<Vec<Job>, TicketflowError> {
        queries::jobs::list_jobs(self.db()?, queue, status).await
    }

    async fn upsert_repeatable(&self, job: &RepeatableJob) -> Result<(), TicketflowError> {
        queries::jobs::upsert_repeatable(self.db()?, job).await
    }

    async fn remove_repeatable(&self, queue: &str, name: &str) -> Result<bool, TicketflowError> {
        queries::jobs::remove_repeatable(self.db()?, queue, name).await
    }

    async fn list_repeatables(&self, queue: &str) -> Result<Vec<RepeatableJob>, TicketflowError> {
        queries::jobs::list_repeatables(self.db()?, queue).await
    }

    async fn promote_repeatables(
        &self,
        queue: &str,
        now: DateTime<Utc>,
    ) -> Result<usize, TicketflowError> {
        queries::jobs::promote_repeatables(self.db()?, queue, now).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn make_config(path: &str) -> StorageConfig {
        StorageConfig {
            database_path: path.to_string(),
            wal_mode: true,
        }
    }

    #[tokio::test]
    async fn sqlite_storage_implements_plugin_adapter() {
        let dir = tempdir().unwrap();
        let db_path = dir.path().join("test.db");
        let storage = SqliteStorage::new(make_config(db_path.to_str().unwrap()));

        assert_eq!(storage.name(), "sqlite");
        assert_eq!(storage.adapter_type(), AdapterType::Storage);
    }

    #[tokio::test]
    async fn initialize_twice_returns_error() {
        let dir = tempdir().unwrap();
        let db_path = dir.path().join("double_init.db");
        let storage = SqliteStorage::new(make_config(db_path.to_str().unwrap()));

        storage.initialize().await.unwrap();
        assert!(db_path.exists());
        assert!(storage.initialize().await.is_err());
    }

    #[tokio::test]
    async fn operations_fail_before_initialize() {
        let dir = tempdir().unwrap();
        let db_path = dir.path().join("no_init.db");
        let storage = SqliteStorage::new(make_config(db_path.to_str().unwrap()));

        assert!(storage.health_check().await.is_err());
        assert!(storage.get_tenant(1).await.is_err());
    }

    #[tokio::test]
    async fn health_check_and_shutdown() {
        let dir = tempdir().unwrap();
        let db_path = dir.path().join("health.db");
        let storage = SqliteStorage::new(make_config(db_path.to_str().unwrap()));

        storage.initialize().await.unwrap();
        assert_eq!(storage.health_check().await.unwrap(), HealthStatus::Healthy);
        storage.shutdown().await.unwrap();
    }
}
