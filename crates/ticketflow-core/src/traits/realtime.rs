// SPDX-FileCopyrightText: 2026 Ticketflow Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Realtime event publishing.

use serde::{Deserialize, Serialize};

/// An event pushed to subscribers of a room (tenant-scoped channel).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RealtimeEvent {
    /// Target room, e.g. `tenant-1-schedules`.
    pub room: String,
    /// Event name, e.g. `schedule.updated`.
    pub event: String,
    pub payload: serde_json::Value,
}

impl RealtimeEvent {
    pub fn new(room: impl Into<String>, event: impl Into<String>, payload: serde_json::Value) -> Self {
        Self {
            room: room.into(),
            event: event.into(),
            payload,
        }
    }
}

/// Fan-out of realtime events. Publishing never fails the caller.
pub trait EventPublisher: Send + Sync + 'static {
    fn publish(&self, event: RealtimeEvent);
}
