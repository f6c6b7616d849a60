// SPDX-FileCopyrightText: 2026 Ticketflow Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Automated handler traits invoked by the integration dispatcher.
//!
//! Each trait returns `Ok(true)` when the handler took ownership of the
//! inbound message and `Ok(false)` when it declined.

use async_trait::async_trait;

use crate::error::TicketflowError;
use crate::types::{
    Assistant, Contact, Conversation, InboundMessage, IntegrationBinding,
};

/// Everything a handler needs to act on one inbound message.
#[derive(Debug, Clone)]
pub struct HandlerContext {
    pub message: InboundMessage,
    pub conversation: Conversation,
    pub contact: Contact,
    pub binding: IntegrationBinding,
}

/// Scripted flow engine.
#[async_trait]
pub trait FlowEngine: Send + Sync + 'static {
    async fn run(&self, ctx: &HandlerContext) -> Result<bool, TicketflowError>;
}

/// Third-party bot platform listener.
#[async_trait]
pub trait BotPlatformListener: Send + Sync + 'static {
    /// Forwards the message together with the queue's menu option ids.
    async fn listen(
        &self,
        ctx: &HandlerContext,
        queue_options: &[i64],
    ) -> Result<bool, TicketflowError>;
}

/// Conversational assistant handler.
#[async_trait]
pub trait AssistantHandler: Send + Sync + 'static {
    async fn handle(
        &self,
        ctx: &HandlerContext,
        assistant: &Assistant,
    ) -> Result<bool, TicketflowError>;
}
