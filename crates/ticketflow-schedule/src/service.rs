// SPDX-FileCopyrightText: 2026 Ticketflow Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Scheduled message store service.
//!
//! Validates user requests and persists one record per occurrence. Every
//! change is announced on the tenant's `tenant-{id}-schedules` room.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::info;

use ticketflow_core::types::{
    ConnectionStatus, NewSchedule, Recurrence, ScheduleStatus, ScheduledMessage,
};
use ticketflow_core::{Clock, EventPublisher, RealtimeEvent, StorageAdapter, TicketflowError};

use crate::recurrence;

/// A request to schedule a message.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct CreateSchedule {
    /// Callers scoped to a tenant by URL may omit it from the body.
    #[serde(default)]
    pub tenant_id: i64,
    pub contact_id: i64,
    #[serde(default)]
    pub connection_id: Option<i64>,
    #[serde(default)]
    pub body: String,
    #[serde(default)]
    pub media_path: Option<String>,
    pub send_at: DateTime<Utc>,
    #[serde(default)]
    pub recurrence: Recurrence,
    #[serde(default)]
    pub recurrence_end: Option<DateTime<Utc>>,
}

/// Fields that may change while a schedule is still pending.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct SchedulePatch {
    #[serde(default)]
    pub body: Option<String>,
    #[serde(default)]
    pub media_path: Option<String>,
    #[serde(default)]
    pub send_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub recurrence: Option<Recurrence>,
    #[serde(default)]
    pub recurrence_end: Option<DateTime<Utc>>,
}

/// Result of a create: one record, or one per occurrence when recurring.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum CreatedSchedules {
    Single(ScheduledMessage),
    Series(Vec<ScheduledMessage>),
}

impl CreatedSchedules {
    pub fn records(&self) -> &[ScheduledMessage] {
        match self {
            CreatedSchedules::Single(record) => std::slice::from_ref(record),
            CreatedSchedules::Series(records) => records,
        }
    }
}

pub struct ScheduleService {
    storage: Arc<dyn StorageAdapter>,
    clock: Arc<dyn Clock>,
    publisher: Arc<dyn EventPublisher>,
}

impl ScheduleService {
    pub fn new(
        storage: Arc<dyn StorageAdapter>,
        clock: Arc<dyn Clock>,
        publisher: Arc<dyn EventPublisher>,
    ) -> Self {
        Self {
            storage,
            clock,
            publisher,
        }
    }

    fn announce(&self, tenant_id: i64, event: &str, payload: serde_json::Value) {
        self.publisher.publish(RealtimeEvent::new(
            format!("tenant-{tenant_id}-schedules"),
            event,
            payload,
        ));
    }

    /// Validates and stores a schedule request.
    pub async fn create(&self, request: CreateSchedule) -> Result<CreatedSchedules, TicketflowError> {
        let now = self.clock.now();
        if request.body.trim().is_empty() && request.media_path.is_none() {
            return Err(TicketflowError::Validation(
                "a scheduled message needs a body or media".into(),
            ));
        }
        if request.send_at <= now {
            return Err(TicketflowError::Validation(
                "send time must be in the future".into(),
            ));
        }
        let connection_id = request.connection_id.ok_or_else(|| {
            TicketflowError::Validation("a channel connection is required".into())
        })?;
        self.check_connection(request.tenant_id, connection_id).await?;
        self.check_contact(request.tenant_id, request.contact_id).await?;

        let occurrences =
            recurrence::expand(request.send_at, request.recurrence, request.recurrence_end)?;
        let recurrence_end = request
            .recurrence
            .is_recurring()
            .then_some(request.recurrence_end)
            .flatten();
        let rows = occurrences
            .into_iter()
            .map(|send_at| NewSchedule {
                tenant_id: request.tenant_id,
                contact_id: request.contact_id,
                connection_id,
                body: request.body.clone(),
                media_path: request.media_path.clone(),
                send_at,
                recurrence: request.recurrence,
                recurrence_end,
            })
            .collect();

        let mut records = self.storage.insert_schedules(rows, now).await?;
        info!(
            tenant_id = request.tenant_id,
            contact_id = request.contact_id,
            recurrence = %request.recurrence,
            count = records.len(),
            "schedule created"
        );

        let created = if request.recurrence.is_recurring() {
            CreatedSchedules::Series(records)
        } else {
            match records.pop() {
                Some(record) => CreatedSchedules::Single(record),
                None => return Err(TicketflowError::Internal("schedule insert returned no rows".into())),
            }
        };
        self.announce(
            request.tenant_id,
            "schedule.created",
            serde_json::to_value(&created)?,
        );
        Ok(created)
    }

    /// Applies `patch` to a pending schedule owned by `tenant_id`.
    pub async fn update(
        &self,
        id: i64,
        tenant_id: i64,
        patch: SchedulePatch,
    ) -> Result<ScheduledMessage, TicketflowError> {
        let now = self.clock.now();
        let mut record = self.owned(id, tenant_id).await?;
        if record.status != ScheduleStatus::Pending {
            return Err(TicketflowError::Validation(format!(
                "schedule {id} is {} and can no longer be edited",
                record.status
            )));
        }

        if let Some(body) = patch.body {
            record.body = body;
        }
        if let Some(media_path) = patch.media_path {
            record.media_path = Some(media_path).filter(|p| !p.is_empty());
        }
        if let Some(send_at) = patch.send_at {
            if send_at <= now {
                return Err(TicketflowError::Validation(
                    "send time must be in the future".into(),
                ));
            }
            record.send_at = send_at;
        }
        if let Some(recurrence) = patch.recurrence {
            record.recurrence = recurrence;
        }
        if patch.recurrence_end.is_some() {
            record.recurrence_end = patch.recurrence_end;
        }
        if record.recurrence.is_recurring() {
            match record.recurrence_end {
                Some(end) if end > record.send_at => {}
                _ => {
                    return Err(TicketflowError::Validation(
                        "recurrence end date must be after the send time".into(),
                    ));
                }
            }
        } else {
            record.recurrence_end = None;
        }
        if record.body.trim().is_empty() && record.media_path.is_none() {
            return Err(TicketflowError::Validation(
                "a scheduled message needs a body or media".into(),
            ));
        }

        if !self.storage.update_pending_schedule(&record, now).await? {
            return Err(TicketflowError::Validation(format!(
                "schedule {id} was claimed before the edit could be saved"
            )));
        }
        record.updated_at = now;
        info!(schedule_id = id, tenant_id, "schedule updated");
        self.announce(tenant_id, "schedule.updated", serde_json::to_value(&record)?);
        Ok(record)
    }

    /// Cancels a schedule that has not been sent yet.
    pub async fn cancel(&self, id: i64, tenant_id: i64) -> Result<ScheduledMessage, TicketflowError> {
        let now = self.clock.now();
        self.owned(id, tenant_id).await?;
        if !self.storage.cancel_schedule(id, now).await? {
            return Err(TicketflowError::Validation(format!(
                "schedule {id} was already sent or cancelled"
            )));
        }
        let record = self
            .storage
            .get_schedule(id)
            .await?
            .ok_or_else(|| TicketflowError::not_found("schedule", id))?;
        info!(schedule_id = id, tenant_id, "schedule cancelled");
        self.announce(tenant_id, "schedule.cancelled", serde_json::to_value(&record)?);
        Ok(record)
    }

    pub async fn list(&self, tenant_id: i64) -> Result<Vec<ScheduledMessage>, TicketflowError> {
        self.storage.list_schedules(tenant_id).await
    }

    async fn owned(&self, id: i64, tenant_id: i64) -> Result<ScheduledMessage, TicketflowError> {
        self.storage
            .get_schedule(id)
            .await?
            .filter(|s| s.tenant_id == tenant_id)
            .ok_or_else(|| TicketflowError::not_found("schedule", id))
    }

    async fn check_connection(&self, tenant_id: i64, id: i64) -> Result<(), TicketflowError> {
        let connection = self
            .storage
            .get_connection(id)
            .await?
            .filter(|c| c.tenant_id == tenant_id)
            .ok_or_else(|| TicketflowError::not_found("connection", id))?;
        if connection.status != ConnectionStatus::Connected {
            return Err(TicketflowError::Validation(format!(
                "connection {id} is {}; reconnect it before scheduling",
                connection.status
            )));
        }
        Ok(())
    }

    async fn check_contact(&self, tenant_id: i64, id: i64) -> Result<(), TicketflowError> {
        self.storage
            .get_contact(id)
            .await?
            .filter(|c| c.tenant_id == tenant_id)
            .map(|_| ())
            .ok_or_else(|| TicketflowError::not_found("contact", id))
    }
}
