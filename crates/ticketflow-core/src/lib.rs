// SPDX-FileCopyrightText: 2026 Ticketflow Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Core library for the Ticketflow automation engine.
//!
//! This crate provides the trait definitions, error types, and domain types
//! shared by the storage, queue, automation and scheduling crates. Every
//! pluggable backend implements a trait defined here.

pub mod bus;
pub mod clock;
pub mod error;
pub mod traits;
pub mod types;

// Re-export key items at crate root for ergonomic imports.
pub use bus::EventBus;
pub use clock::{Clock, SystemClock};
pub use error::TicketflowError;
pub use types::*;

pub use traits::{
    AssistantHandler, BotPlatformListener, ChannelAdapter, EventPublisher, FlowEngine,
    HandlerContext, PluginAdapter, RealtimeEvent, StorageAdapter, TemplateRenderer,
};
