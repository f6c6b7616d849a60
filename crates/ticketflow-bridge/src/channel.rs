// SPDX-FileCopyrightText: 2026 Ticketflow Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Messaging transport reached through the bridge HTTP API.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::debug;

use ticketflow_core::types::{AdapterType, HealthStatus, MessageId, OutboundMessage};
use ticketflow_core::{ChannelAdapter, PluginAdapter, TicketflowError};

use crate::client::BridgeClient;

#[derive(Serialize)]
struct SendRequest<'a> {
    to: &'a str,
    body: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    media_path: Option<String>,
}

#[derive(Deserialize)]
struct SendResponse {
    id: String,
}

#[derive(Deserialize)]
struct StatusResponse {
    connected: bool,
}

/// [`ChannelAdapter`] backed by the bridge service.
///
/// `POST /connections/{id}/messages` sends, `GET /connections/{id}/status`
/// reports availability.
pub struct HttpChannel {
    client: BridgeClient,
}

impl HttpChannel {
    pub fn new(client: BridgeClient) -> Self {
        Self { client }
    }
}

#[async_trait]
impl PluginAdapter for HttpChannel {
    fn name(&self) -> &str {
        "http-bridge"
    }

    fn version(&self) -> semver::Version {
        semver::Version::new(0, 1, 0)
    }

    fn adapter_type(&self) -> AdapterType {
        AdapterType::Channel
    }

    async fn health_check(&self) -> Result<HealthStatus, TicketflowError> {
        match self.client.get::<serde_json::Value>("/health").await {
            Ok(_) => Ok(HealthStatus::Healthy),
            Err(e) => Ok(HealthStatus::Unhealthy(e.to_string())),
        }
    }

    async fn shutdown(&self) -> Result<(), TicketflowError> {
        Ok(())
    }
}

#[async_trait]
impl ChannelAdapter for HttpChannel {
    async fn send(&self, msg: OutboundMessage) -> Result<MessageId, TicketflowError> {
        let request = SendRequest {
            to: &msg.to,
            body: &msg.body,
            media_path: msg
                .media_path
                .as_ref()
                .map(|p| p.to_string_lossy().into_owned()),
        };
        let response: SendResponse = self
            .client
            .post(&format!("/connections/{}/messages", msg.connection_id), &request)
            .await?;
        debug!(connection_id = msg.connection_id, message_id = %response.id, "message handed to bridge");
        Ok(MessageId(response.id))
    }

    async fn is_available(&self, connection_id: i64) -> Result<bool, TicketflowError> {
        let status: StatusResponse = self
            .client
            .get(&format!("/connections/{connection_id}/status"))
            .await?;
        Ok(status.connected)
    }
}
