// SPDX-FileCopyrightText: 2026 Ticketflow Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Messaging transport trait.

use async_trait::async_trait;

use crate::error::TicketflowError;
use crate::traits::adapter::PluginAdapter;
use crate::types::{MessageId, OutboundMessage};

/// Adapter for the messaging transport that delivers outbound messages.
///
/// One adapter serves every channel connection; the connection to use is
/// carried on each [`OutboundMessage`].
#[async_trait]
pub trait ChannelAdapter: PluginAdapter {
    /// Sends a message through the given connection and returns the delivery receipt.
    async fn send(&self, msg: OutboundMessage) -> Result<MessageId, TicketflowError>;

    /// Returns whether the connection is currently able to deliver messages.
    async fn is_available(&self, connection_id: i64) -> Result<bool, TicketflowError>;
}
