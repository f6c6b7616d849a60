// SPDX-FileCopyrightText: 2026 Ticketflow Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Shared HTTP client for the bridge service.

use std::time::Duration;

use reqwest::header::{AUTHORIZATION, HeaderMap, HeaderValue};
use reqwest::{Method, RequestBuilder};
use serde::Serialize;
use serde::de::DeserializeOwned;
use tracing::debug;

use ticketflow_config::model::BridgeConfig;
use ticketflow_core::TicketflowError;

/// JSON client bound to the bridge base URL, with the bearer token applied
/// to every request.
#[derive(Debug, Clone)]
pub struct BridgeClient {
    client: reqwest::Client,
    base_url: String,
}

impl BridgeClient {
    pub fn new(config: &BridgeConfig) -> Result<Self, TicketflowError> {
        let mut headers = HeaderMap::new();
        headers.insert("content-type", HeaderValue::from_static("application/json"));
        if let Some(token) = config.api_token.as_deref().filter(|t| !t.is_empty()) {
            let mut value = HeaderValue::from_str(&format!("Bearer {token}")).map_err(|e| {
                TicketflowError::Config(format!("invalid bridge api_token header value: {e}"))
            })?;
            value.set_sensitive(true);
            headers.insert(AUTHORIZATION, value);
        }

        let client = reqwest::Client::builder()
            .default_headers(headers)
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| TicketflowError::Transport {
                message: format!("failed to build HTTP client: {e}"),
                source: Some(Box::new(e)),
            })?;

        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
        })
    }

    fn request(&self, method: Method, path: &str) -> RequestBuilder {
        self.client.request(method, format!("{}{path}", self.base_url))
    }

    pub async fn get<R: DeserializeOwned>(&self, path: &str) -> Result<R, TicketflowError> {
        self.execute(self.request(Method::GET, path), path).await
    }

    pub async fn post<B: Serialize + ?Sized, R: DeserializeOwned>(
        &self,
        path: &str,
        body: &B,
    ) -> Result<R, TicketflowError> {
        self.execute(self.request(Method::POST, path).json(body), path)
            .await
    }

    async fn execute<R: DeserializeOwned>(
        &self,
        request: RequestBuilder,
        path: &str,
    ) -> Result<R, TicketflowError> {
        let response = request.send().await.map_err(|e| TicketflowError::Transport {
            message: format!("bridge request {path} failed: {e}"),
            source: Some(Box::new(e)),
        })?;

        let status = response.status();
        debug!(path, status = %status, "bridge response received");
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(TicketflowError::transport(format!(
                "bridge {path} returned {status}: {body}"
            )));
        }

        response.json::<R>().await.map_err(|e| TicketflowError::Transport {
            message: format!("failed to decode bridge response from {path}: {e}"),
            source: Some(Box::new(e)),
        })
    }
}
