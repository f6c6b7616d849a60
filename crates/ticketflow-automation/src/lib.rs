// SPDX-FileCopyrightText: 2026 Ticketflow Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Conversation automation for the Ticketflow engine.
//!
//! - [`IntegrationDispatcher`] routes an inbound message to the automated
//!   handler bound to its conversation.
//! - [`BusinessHoursGate`] suppresses automation outside opening hours and
//!   sends a debounced out-of-office notice.
//! - [`SessionStore`] and [`SessionReaper`] keep multi-step dialog state and
//!   sweep it once it expires.
//! - [`InboundPipeline`] serializes processing per conversation and runs the
//!   gate before the dispatcher.

pub mod business_hours;
pub mod debounce;
pub mod dispatcher;
pub mod pipeline;
pub mod reaper;
pub mod sessions;
pub mod webhook;

pub use business_hours::{BusinessHoursGate, DayWindow};
pub use debounce::{DebounceList, DebouncedSender};
pub use dispatcher::{Handlers, IntegrationDispatcher};
pub use pipeline::{InboundPipeline, PipelineOutcome};
pub use reaper::{ReapReport, SessionReaper, SkipReason};
pub use sessions::SessionStore;
pub use webhook::WebhookClient;
