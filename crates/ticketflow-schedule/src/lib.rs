// SPDX-FileCopyrightText: 2026 Ticketflow Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Scheduled outbound messages for the Ticketflow engine.
//!
//! [`ScheduleService`] validates requests and materializes one record per
//! occurrence. [`ScheduleClaimer`] periodically claims due records and hands
//! them to the work queue, where [`ScheduledSendJob`] delivers them.

pub mod claimer;
pub mod recurrence;
pub mod render;
pub mod send;
pub mod service;

pub use claimer::{ClaimSettings, ScheduleClaimer, SendScheduledMessage};
pub use recurrence::{MAX_OCCURRENCES, expand};
pub use render::PlaceholderRenderer;
pub use send::ScheduledSendJob;
pub use service::{CreateSchedule, CreatedSchedules, SchedulePatch, ScheduleService};
