// SPDX-FileCopyrightText: 2026 Ticketflow Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Test harness for end-to-end integration testing.
//!
//! `TestHarness` opens a temp SQLite database, seeds one tenant with a
//! contact, a connected default connection and an open conversation, and
//! exposes the mock transport and a manually driven clock.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use ticketflow_config::model::{StorageConfig, TicketflowConfig};
use ticketflow_core::types::{
    ChannelConnection, ConnectionStatus, Contact, Conversation, InboundMessage, ScheduleEntry,
    ScheduleMode, Tenant,
};
use ticketflow_core::{StorageAdapter, TicketflowError};
use ticketflow_storage::SqliteStorage;

use crate::clock::FixedClock;
use crate::mock_channel::MockChannel;

pub const TENANT_ID: i64 = 1;
pub const CONTACT_ID: i64 = 10;
pub const CONTACT_NUMBER: &str = "5511999990000";
pub const CONNECTION_ID: i64 = 100;
pub const CONVERSATION_ID: i64 = 1000;

/// Monday morning, inside typical business hours.
pub const DEFAULT_NOW: &str = "2026-03-02T10:00:00Z";

/// Builder for creating test environments with configurable options.
pub struct TestHarnessBuilder {
    now: String,
    schedule_mode: ScheduleMode,
    company_schedules: Vec<ScheduleEntry>,
    out_of_hours_message: Option<String>,
}

impl TestHarnessBuilder {
    fn new() -> Self {
        Self {
            now: DEFAULT_NOW.to_string(),
            schedule_mode: ScheduleMode::Disabled,
            company_schedules: Vec::new(),
            out_of_hours_message: None,
        }
    }

    /// Start the fixed clock at an RFC 3339 instant.
    pub fn with_clock_at(mut self, rfc3339: &str) -> Self {
        self.now = rfc3339.to_string();
        self
    }

    /// Set the seeded tenant's business-hours mode and company schedule.
    pub fn with_business_hours(
        mut self,
        mode: ScheduleMode,
        schedules: Vec<ScheduleEntry>,
        out_of_hours_message: Option<&str>,
    ) -> Self {
        self.schedule_mode = mode;
        self.company_schedules = schedules;
        self.out_of_hours_message = out_of_hours_message.map(str::to_string);
        self
    }

    /// Build the test harness and seed the directory tables.
    pub async fn build(self) -> Result<TestHarness, TicketflowError> {
        let temp_dir =
            tempfile::TempDir::new().map_err(|e| TicketflowError::Storage { source: e.into() })?;
        let db_path = temp_dir.path().join("test.db");

        let storage_config = StorageConfig {
            database_path: db_path.to_string_lossy().to_string(),
            wal_mode: true,
        };
        let storage = SqliteStorage::new(storage_config.clone());
        storage.initialize().await?;
        let storage: Arc<dyn StorageAdapter> = Arc::new(storage);

        let tenant = Tenant {
            id: TENANT_ID,
            name: "Acme".into(),
            schedule_mode: self.schedule_mode,
            schedules: self.company_schedules,
            out_of_hours_message: self.out_of_hours_message,
        };
        storage.upsert_tenant(&tenant).await?;

        let contact = Contact {
            id: CONTACT_ID,
            tenant_id: TENANT_ID,
            name: "Maria Silva".into(),
            number: Some(CONTACT_NUMBER.into()),
            email: Some("maria@example.com".into()),
        };
        storage.upsert_contact(&contact).await?;

        let connection = ChannelConnection {
            id: CONNECTION_ID,
            tenant_id: TENANT_ID,
            name: "main line".into(),
            status: ConnectionStatus::Connected,
            is_default: true,
        };
        storage.upsert_connection(&connection).await?;

        let conversation = Conversation {
            id: CONVERSATION_ID,
            tenant_id: TENANT_ID,
            contact_id: CONTACT_ID,
            connection_id: Some(CONNECTION_ID),
            queue_id: None,
            user_id: None,
            status: "pending".into(),
            is_bot: false,
            use_integration: false,
            integration_id: None,
            queue_option_id: None,
            automation_usage: 0,
            is_out_of_hour: Some(false),
        };
        storage.save_conversation(&conversation).await?;

        let config = TicketflowConfig {
            storage: storage_config,
            ..TicketflowConfig::default()
        };

        Ok(TestHarness {
            storage,
            channel: Arc::new(MockChannel::new()),
            clock: Arc::new(FixedClock::at(&self.now)),
            config,
            tenant,
            contact,
            connection,
            _temp_dir: temp_dir,
        })
    }
}

/// A seeded test environment with mock transport and temp storage.
pub struct TestHarness {
    /// SQLite storage adapter (temp DB, cleaned up on drop).
    pub storage: Arc<dyn StorageAdapter>,
    pub channel: Arc<MockChannel>,
    pub clock: Arc<FixedClock>,
    pub config: TicketflowConfig,
    pub tenant: Tenant,
    pub contact: Contact,
    pub connection: ChannelConnection,
    /// Temp directory kept alive for cleanup on drop.
    _temp_dir: tempfile::TempDir,
}

impl TestHarness {
    /// Create a new builder for configuring the test harness.
    pub fn builder() -> TestHarnessBuilder {
        TestHarnessBuilder::new()
    }

    /// Build a harness with default settings.
    pub async fn new() -> Result<Self, TicketflowError> {
        Self::builder().build().await
    }

    /// Current state of the seeded conversation.
    pub async fn conversation(&self) -> Result<Conversation, TicketflowError> {
        self.storage
            .get_conversation(CONVERSATION_ID)
            .await?
            .ok_or_else(|| TicketflowError::not_found("conversation", CONVERSATION_ID))
    }

    /// Apply `f` to the seeded conversation and persist the result.
    pub async fn update_conversation(
        &self,
        f: impl FnOnce(&mut Conversation),
    ) -> Result<Conversation, TicketflowError> {
        let mut conversation = self.conversation().await?;
        f(&mut conversation);
        self.storage.save_conversation(&conversation).await?;
        Ok(conversation)
    }

    /// Current instant of the harness clock.
    pub fn now(&self) -> DateTime<Utc> {
        use ticketflow_core::Clock;
        self.clock.now()
    }

    /// An inbound message from the seeded contact.
    pub fn inbound(&self, body: &str) -> InboundMessage {
        InboundMessage {
            id: uuid::Uuid::new_v4().to_string(),
            from: CONTACT_NUMBER.into(),
            body: body.into(),
            from_me: false,
            timestamp: self.now(),
            raw: None,
        }
    }
}
