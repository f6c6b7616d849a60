// SPDX-FileCopyrightText: 2026 Ticketflow Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Adapter and handler trait definitions.
//!
//! Backends extend the [`PluginAdapter`] base trait and use
//! `#[async_trait]` for dynamic dispatch compatibility.

pub mod adapter;
pub mod channel;
pub mod handlers;
pub mod realtime;
pub mod render;
pub mod storage;

pub use adapter::PluginAdapter;
pub use channel::ChannelAdapter;
pub use handlers::{AssistantHandler, BotPlatformListener, FlowEngine, HandlerContext};
pub use realtime::{EventPublisher, RealtimeEvent};
pub use render::TemplateRenderer;
pub use storage::StorageAdapter;
