// SPDX-FileCopyrightText: 2026 Ticketflow Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Outbound JSON POSTs for webhook-style integrations.

use std::time::Duration;

use reqwest::header::{HeaderMap, HeaderValue};
use tracing::debug;

use ticketflow_core::TicketflowError;

#[derive(Debug, Clone)]
pub struct WebhookClient {
    client: reqwest::Client,
}

impl WebhookClient {
    pub fn new(timeout: Duration) -> Result<Self, TicketflowError> {
        let mut headers = HeaderMap::new();
        headers.insert("content-type", HeaderValue::from_static("application/json"));

        let client = reqwest::Client::builder()
            .default_headers(headers)
            .timeout(timeout)
            .build()
            .map_err(|e| TicketflowError::Transport {
                message: format!("failed to build HTTP client: {e}"),
                source: Some(Box::new(e)),
            })?;
        Ok(Self { client })
    }

    /// POSTs `body` to `url`. Non-2xx responses are transport errors.
    pub async fn post(&self, url: &str, body: &serde_json::Value) -> Result<(), TicketflowError> {
        let response = self
            .client
            .post(url)
            .json(body)
            .send()
            .await
            .map_err(|e| TicketflowError::Transport {
                message: format!("POST {url} failed: {e}"),
                source: Some(Box::new(e)),
            })?;

        let status = response.status();
        debug!(url, status = %status, "webhook response received");
        if status.is_success() {
            return Ok(());
        }
        let text = response.text().await.unwrap_or_default();
        Err(TicketflowError::transport(format!(
            "POST {url} returned {status}: {text}"
        )))
    }
}
