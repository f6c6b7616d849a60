// SPDX-FileCopyrightText: 2026 Ticketflow Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Common types used across adapter traits and the Ticketflow engine.

use std::path::PathBuf;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};

/// Step value that marks a multi-step dialog as finished.
pub const SESSION_STEP_DONE: &str = "done";

/// Unique identifier for a delivered message (delivery receipt).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct MessageId(pub String);

/// Health status reported by adapter health checks.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HealthStatus {
    /// Adapter is fully operational.
    Healthy,
    /// Adapter is operational but experiencing issues.
    Degraded(String),
    /// Adapter is not operational.
    Unhealthy(String),
}

/// Identifies the type of adapter.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString, Serialize, Deserialize,
)]
pub enum AdapterType {
    Channel,
    Storage,
    Handler,
}

// --- Tenants, queues, contacts, connections ---

/// How a tenant gates automation by business hours.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Default, Display, EnumString, Serialize, Deserialize,
)]
#[strum(serialize_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum ScheduleMode {
    /// One schedule for the whole tenant.
    Company,
    /// Each queue carries its own weekly schedule.
    Queue,
    /// Business hours are not enforced.
    #[default]
    Disabled,
}

/// One weekday row of a weekly schedule table.
///
/// Times are `HH:MM` strings. Empty strings are treated as "not configured".
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ScheduleEntry {
    /// Lowercase English weekday name (`monday` .. `sunday`).
    pub weekday: String,
    #[serde(default)]
    pub start_time: Option<String>,
    #[serde(default)]
    pub end_time: Option<String>,
    #[serde(default)]
    pub start_lunch_time: Option<String>,
    #[serde(default)]
    pub end_lunch_time: Option<String>,
}

/// A tenant (company) of the platform.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Tenant {
    pub id: i64,
    pub name: String,
    pub schedule_mode: ScheduleMode,
    /// Company-wide weekly schedule, used in [`ScheduleMode::Company`].
    pub schedules: Vec<ScheduleEntry>,
    pub out_of_hours_message: Option<String>,
}

/// A service queue (department) conversations can be assigned to.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Queue {
    pub id: i64,
    pub tenant_id: i64,
    pub name: String,
    pub greeting_message: Option<String>,
    pub out_of_hours_message: Option<String>,
    pub schedules: Vec<ScheduleEntry>,
}

/// An end user reachable over the messaging channel.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Contact {
    pub id: i64,
    pub tenant_id: i64,
    pub name: String,
    /// Destination address on the messaging channel.
    pub number: Option<String>,
    pub email: Option<String>,
}

/// Status of a channel connection.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Default, Display, EnumString, Serialize, Deserialize,
)]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ConnectionStatus {
    Connected,
    #[default]
    Disconnected,
    Pairing,
}

/// A tenant's connection to the messaging channel (one phone line, one bot account).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChannelConnection {
    pub id: i64,
    pub tenant_id: i64,
    pub name: String,
    pub status: ConnectionStatus,
    pub is_default: bool,
}

// --- Conversations ---

/// A conversation (ticket) with one contact.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Conversation {
    pub id: i64,
    pub tenant_id: i64,
    pub contact_id: i64,
    pub connection_id: Option<i64>,
    pub queue_id: Option<i64>,
    pub user_id: Option<i64>,
    pub status: String,
    /// The conversation is currently controlled by an automated handler.
    pub is_bot: bool,
    /// An integration handler has taken over the conversation.
    pub use_integration: bool,
    pub integration_id: Option<i64>,
    /// Selected menu option inside the assigned queue.
    pub queue_option_id: Option<i64>,
    /// How many times automation has handled this conversation.
    pub automation_usage: i64,
    /// Out-of-hours marker; `None` when the last evaluation failed.
    pub is_out_of_hour: Option<bool>,
}

impl Conversation {
    /// Clears every automation flag so a human can pick the conversation up.
    pub fn reset_automation(&mut self) {
        self.queue_id = None;
        self.is_bot = false;
        self.queue_option_id = None;
        self.automation_usage = 0;
    }
}

// --- Integrations ---

/// Automated handler family selected by a binding.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString, Serialize, Deserialize,
)]
#[strum(serialize_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum IntegrationKind {
    /// Scripted flow engine.
    FlowEngine,
    /// Generic JSON webhook.
    Webhook,
    /// Third-party bot platform.
    BotPlatform,
    /// External automation relay (fire-and-forget event POST).
    AutomationRelay,
    /// Conversational assistant.
    Assistant,
}

/// Tenant-scoped configuration selecting and parameterizing an automated handler.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IntegrationBinding {
    pub id: i64,
    pub tenant_id: i64,
    pub name: String,
    pub kind: IntegrationKind,
    /// Handler-specific payload (endpoint URL, credentials, assistant id).
    pub config: serde_json::Value,
}

/// A conversational assistant definition.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Assistant {
    pub id: i64,
    pub tenant_id: i64,
    pub name: String,
    pub active: bool,
    pub prompt: String,
    pub model: String,
}

// --- Messages ---

/// A message received from the messaging channel.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InboundMessage {
    pub id: String,
    /// Sender address.
    pub from: String,
    pub body: String,
    #[serde(default)]
    pub from_me: bool,
    pub timestamp: DateTime<Utc>,
    /// Raw transport event, forwarded verbatim to webhook-style handlers.
    #[serde(default)]
    pub raw: Option<serde_json::Value>,
}

impl InboundMessage {
    /// The JSON document forwarded to webhook-style handlers.
    pub fn raw_event(&self) -> serde_json::Value {
        match &self.raw {
            Some(raw) => raw.clone(),
            None => serde_json::to_value(self).unwrap_or(serde_json::Value::Null),
        }
    }
}

/// A message to be delivered through a channel connection.
#[derive(Debug, Clone, PartialEq)]
pub struct OutboundMessage {
    pub connection_id: i64,
    /// Destination address.
    pub to: String,
    pub body: String,
    /// Local path of an attached media file.
    pub media_path: Option<PathBuf>,
}

// --- Conversation sessions ---

/// In-progress state of a multi-step automated dialog.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConversationSession {
    /// Owning conversation; at most one session per conversation.
    pub conversation_id: i64,
    pub tenant_id: i64,
    pub step: String,
    pub expires_at: DateTime<Utc>,
    pub payload: serde_json::Value,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl ConversationSession {
    pub fn is_done(&self) -> bool {
        self.step == SESSION_STEP_DONE
    }
}

/// An expired session with its related conversation and contact, if they still exist.
#[derive(Debug, Clone)]
pub struct ExpiredSession {
    pub session: ConversationSession,
    pub conversation: Option<Conversation>,
    pub contact: Option<Contact>,
}

// --- Scheduled messages ---

/// Lifecycle of a scheduled message.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString, Serialize, Deserialize,
)]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ScheduleStatus {
    Pending,
    Claimed,
    Sent,
    Cancelled,
}

/// Recurrence rule for scheduled messages.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Display, EnumString, Serialize, Deserialize,
)]
#[strum(serialize_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum Recurrence {
    #[default]
    None,
    Daily,
    Weekly,
    Biweekly,
    Monthly,
    Quarterly,
    Semiannually,
    Yearly,
}

/// Distance between two occurrences of a recurrence rule.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecurrenceStep {
    Days(u64),
    Months(u32),
}

impl Recurrence {
    /// Step between occurrences, or `None` for a one-off send.
    pub fn step(self) -> Option<RecurrenceStep> {
        match self {
            Recurrence::None => None,
            Recurrence::Daily => Some(RecurrenceStep::Days(1)),
            Recurrence::Weekly => Some(RecurrenceStep::Days(7)),
            Recurrence::Biweekly => Some(RecurrenceStep::Days(14)),
            Recurrence::Monthly => Some(RecurrenceStep::Months(1)),
            Recurrence::Quarterly => Some(RecurrenceStep::Months(3)),
            Recurrence::Semiannually => Some(RecurrenceStep::Months(6)),
            Recurrence::Yearly => Some(RecurrenceStep::Months(12)),
        }
    }

    pub fn is_recurring(self) -> bool {
        self != Recurrence::None
    }
}

/// A one-off or recurring future send.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScheduledMessage {
    pub id: i64,
    pub tenant_id: i64,
    pub contact_id: i64,
    pub connection_id: i64,
    pub body: String,
    pub media_path: Option<String>,
    pub send_at: DateTime<Utc>,
    pub status: ScheduleStatus,
    pub recurrence: Recurrence,
    pub recurrence_end: Option<DateTime<Utc>>,
    pub sent_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Fields of a schedule row about to be inserted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewSchedule {
    pub tenant_id: i64,
    pub contact_id: i64,
    pub connection_id: i64,
    pub body: String,
    pub media_path: Option<String>,
    pub send_at: DateTime<Utc>,
    pub recurrence: Recurrence,
    pub recurrence_end: Option<DateTime<Utc>>,
}

/// A schedule record claimed by the claim loop, with its contact.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClaimedSchedule {
    pub schedule: ScheduledMessage,
    pub contact: Option<Contact>,
}

// --- Durable jobs ---

/// Lifecycle of a durable job.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString, Serialize, Deserialize,
)]
#[strum(serialize_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    Pending,
    Processing,
    Completed,
    Failed,
}

/// Retry delay policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Backoff {
    Fixed { delay_ms: u64 },
    Exponential { base_ms: u64 },
}

impl Backoff {
    /// Delay before retry number `attempt` (1-based count of failures so far).
    pub fn delay_ms(&self, attempt: u32) -> u64 {
        match *self {
            Backoff::Fixed { delay_ms } => delay_ms,
            Backoff::Exponential { base_ms } => {
                let exp = attempt.saturating_sub(1).min(20);
                base_ms.saturating_mul(1u64 << exp)
            }
        }
    }
}

/// Options applied when a job is added to the queue.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobOptions {
    /// Delay before the job becomes runnable.
    pub delay_ms: u64,
    /// Total attempts before the job is marked failed.
    pub attempts: u32,
    pub backoff: Backoff,
    /// Delete the job row once it completes.
    pub remove_on_complete: bool,
}

impl Default for JobOptions {
    fn default() -> Self {
        Self {
            delay_ms: 0,
            attempts: 3,
            backoff: Backoff::Exponential { base_ms: 1000 },
            remove_on_complete: false,
        }
    }
}

/// A durable job row.
#[derive(Debug, Clone, PartialEq)]
pub struct Job {
    pub id: i64,
    pub queue_name: String,
    pub name: String,
    pub payload: String,
    pub status: JobStatus,
    pub attempts: u32,
    pub max_attempts: u32,
    pub backoff: Backoff,
    pub remove_on_complete: bool,
    pub run_at: DateTime<Utc>,
    pub locked_until: Option<DateTime<Utc>>,
    pub last_error: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// A repeating job definition.
#[derive(Debug, Clone, PartialEq)]
pub struct RepeatableJob {
    pub queue_name: String,
    pub name: String,
    pub every_ms: u64,
    pub options: JobOptions,
    pub next_run_at: DateTime<Utc>,
}
