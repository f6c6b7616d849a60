// SPDX-FileCopyrightText: 2026 Ticketflow Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Mock messaging transport for deterministic testing.
//!
//! `MockChannel` implements `ChannelAdapter`, captures every outbound
//! message for assertions, and lets tests take connections offline or
//! script send failures.

use std::collections::HashSet;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use tokio::sync::Mutex;

use ticketflow_core::traits::adapter::PluginAdapter;
use ticketflow_core::traits::channel::ChannelAdapter;
use ticketflow_core::types::{AdapterType, HealthStatus, MessageId, OutboundMessage};
use ticketflow_core::TicketflowError;

/// A mock messaging transport for testing.
///
/// Every connection is available unless marked otherwise with
/// [`MockChannel::set_available`].
pub struct MockChannel {
    sent: Arc<Mutex<Vec<OutboundMessage>>>,
    offline: Arc<Mutex<HashSet<i64>>>,
    failures_left: AtomicUsize,
}

impl MockChannel {
    /// Create a new mock channel with every connection online.
    pub fn new() -> Self {
        Self {
            sent: Arc::new(Mutex::new(Vec::new())),
            offline: Arc::new(Mutex::new(HashSet::new())),
            failures_left: AtomicUsize::new(0),
        }
    }

    /// Get all messages that were sent through `send()`.
    pub async fn sent_messages(&self) -> Vec<OutboundMessage> {
        self.sent.lock().await.clone()
    }

    /// Get the count of sent messages.
    pub async fn sent_count(&self) -> usize {
        self.sent.lock().await.len()
    }

    /// Clear all sent messages.
    pub async fn clear_sent(&self) {
        self.sent.lock().await.clear();
    }

    /// Mark a connection as online or offline.
    pub async fn set_available(&self, connection_id: i64, available: bool) {
        let mut offline = self.offline.lock().await;
        if available {
            offline.remove(&connection_id);
        } else {
            offline.insert(connection_id);
        }
    }

    /// Make the next `n` calls to `send()` fail with a transport error.
    pub fn fail_next(&self, n: usize) {
        self.failures_left.store(n, Ordering::SeqCst);
    }

    fn take_failure(&self) -> bool {
        self.failures_left
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok()
    }
}

impl Default for MockChannel {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl PluginAdapter for MockChannel {
    fn name(&self) -> &str {
        "mock-channel"
    }

    fn version(&self) -> semver::Version {
        semver::Version::new(0, 1, 0)
    }

    fn adapter_type(&self) -> AdapterType {
        AdapterType::Channel
    }

    async fn health_check(&self) -> Result<HealthStatus, TicketflowError> {
        Ok(HealthStatus::Healthy)
    }

    async fn shutdown(&self) -> Result<(), TicketflowError> {
        Ok(())
    }
}

#[async_trait]
impl ChannelAdapter for MockChannel {
    async fn send(&self, msg: OutboundMessage) -> Result<MessageId, TicketflowError> {
        if self.take_failure() {
            return Err(TicketflowError::transport("mock send failure"));
        }
        if self.offline.lock().await.contains(&msg.connection_id) {
            return Err(TicketflowError::transport(format!(
                "connection {} is offline",
                msg.connection_id
            )));
        }
        let id = format!("mock-msg-{}", uuid::Uuid::new_v4());
        self.sent.lock().await.push(msg);
        Ok(MessageId(id))
    }

    async fn is_available(&self, connection_id: i64) -> Result<bool, TicketflowError> {
        Ok(!self.offline.lock().await.contains(&connection_id))
    }
}
